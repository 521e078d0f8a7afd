//! Concurrent access integration tests.

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use crate::{TestClient, cleanup_bucket, create_test_bucket};

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore = "requires running server"]
    async fn test_should_never_observe_torn_writes() {
        let client = TestClient::new();
        let bucket = create_test_bucket(&client, "torn").await;

        let size = 256 * 1024;
        client.put(&bucket, "hot", "application/octet-stream", vec![0u8; size]).await;

        let mut writers = Vec::new();
        for fill in 1..=8u8 {
            let client = client.clone();
            let bucket = bucket.clone();
            writers.push(tokio::spawn(async move {
                let resp = client.put(&bucket, "hot", "application/octet-stream", vec![fill; size]).await;
                assert_eq!(resp.status(), StatusCode::OK);
            }));
        }

        let mut readers = Vec::new();
        for _ in 0..8 {
            let client = client.clone();
            let bucket = bucket.clone();
            readers.push(tokio::spawn(async move {
                let (status, data) = client.get_bytes(&bucket, "hot").await;
                assert_eq!(status, StatusCode::OK);
                assert_eq!(data.len(), size);
                let first = data[0];
                assert!(data.iter().all(|b| *b == first), "observed a torn write");
            }));
        }

        for task in writers.into_iter().chain(readers) {
            task.await.expect("task join");
        }

        cleanup_bucket(&client, &bucket).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore = "requires running server"]
    async fn test_should_keep_appends_intact() {
        let client = TestClient::new();
        let bucket = create_test_bucket(&client, "appends").await;
        client.put(&bucket, "journal", "text/plain", Vec::new()).await;

        let mut tasks = Vec::new();
        for i in 0..16u8 {
            let client = client.clone();
            let bucket = bucket.clone();
            tasks.push(tokio::spawn(async move {
                let line = vec![b'a' + i; 64];
                let resp = client
                    .http()
                    .post(client.object_url(&bucket, "journal"))
                    .body(line)
                    .send()
                    .await
                    .expect("append");
                assert_eq!(resp.status(), StatusCode::OK);
            }));
        }
        for task in tasks {
            task.await.expect("task join");
        }

        let (_, data) = client.get_bytes(&bucket, "journal").await;
        assert_eq!(data.len(), 16 * 64);
        for chunk in data.chunks(64) {
            assert!(chunk.iter().all(|b| *b == chunk[0]), "interleaved append");
        }

        cleanup_bucket(&client, &bucket).await;
    }
}
