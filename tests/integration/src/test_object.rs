//! Object CRUD integration tests.

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use crate::{TestClient, cleanup_bucket, create_test_bucket};

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_put_and_get_object() {
        let client = TestClient::new();
        let bucket = create_test_bucket(&client, "putget").await;

        let body = b"hello, restorage!".to_vec();
        let put = client.put(&bucket, "greeting.txt", "text/plain", body.clone()).await;
        assert_eq!(put.status(), StatusCode::OK);
        let result: serde_json::Value = put.json().await.expect("put json");
        assert_eq!(result["bytesReceived"], 17);

        let resp = client
            .http()
            .get(client.object_url(&bucket, "greeting.txt"))
            .send()
            .await
            .expect("get object");
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get("content-type").and_then(|v| v.to_str().ok()),
            Some("text/plain")
        );
        assert_eq!(resp.content_length(), Some(17));
        let data = resp.bytes().await.expect("collect body");
        assert_eq!(data.as_ref(), body.as_slice());

        cleanup_bucket(&client, &bucket).await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_round_trip_large_payload() {
        let client = TestClient::new();
        let bucket = create_test_bucket(&client, "large").await;

        let body: Vec<u8> = (0..10 * 1024 * 1024u32).map(|i| (i % 251) as u8).collect();
        client.put(&bucket, "big.bin", "application/octet-stream", body.clone()).await;

        let (status, data) = client.get_bytes(&bucket, "big.bin").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(data.len(), body.len());
        assert!(data.as_ref() == body.as_slice(), "payload mismatch");

        cleanup_bucket(&client, &bucket).await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_carry_metadata_headers() {
        let client = TestClient::new();
        let bucket = create_test_bucket(&client, "meta").await;

        client
            .http()
            .put(client.object_url(&bucket, "photo.jpg"))
            .header("content-type", "image/jpeg")
            .header("X-ReStorage-Object-Meta-Camera", "x100")
            .body(vec![1u8, 2, 3])
            .send()
            .await
            .expect("put object");

        let head = client
            .http()
            .head(client.object_url(&bucket, "photo.jpg"))
            .send()
            .await
            .expect("head object");
        assert_eq!(head.status(), StatusCode::OK);
        assert_eq!(
            head.headers()
                .get("x-restorage-object-meta-camera")
                .and_then(|v| v.to_str().ok()),
            Some("x100")
        );
        assert!(head.headers().get("last-modified").is_some());

        let meta: serde_json::Value = client
            .http()
            .get(format!("{}/meta", client.object_url(&bucket, "photo.jpg")))
            .send()
            .await
            .expect("get meta")
            .json()
            .await
            .expect("meta json");
        assert_eq!(meta["contentType"], "image/jpeg");
        assert_eq!(meta["objectSize"], 3);
        assert_eq!(meta["other"]["camera"], "x100");

        cleanup_bucket(&client, &bucket).await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_get_byte_range() {
        let client = TestClient::new();
        let bucket = create_test_bucket(&client, "range").await;

        let body: Vec<u8> = (0..=255u8).collect();
        client.put(&bucket, "bytes", "application/octet-stream", body.clone()).await;

        let resp = client
            .http()
            .get(client.object_url(&bucket, "bytes"))
            .header("range", "bytes=16-31")
            .send()
            .await
            .expect("ranged get");
        assert_eq!(resp.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(
            resp.headers().get("content-range").and_then(|v| v.to_str().ok()),
            Some("bytes 16-31/256")
        );
        let data = resp.bytes().await.expect("collect body");
        assert_eq!(data.as_ref(), &body[16..32]);

        cleanup_bucket(&client, &bucket).await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_append_hash_and_delete() {
        let client = TestClient::new();
        let bucket = create_test_bucket(&client, "append").await;

        client.put(&bucket, "log", "text/plain", b"hello ".to_vec()).await;
        let appended = client
            .http()
            .post(client.object_url(&bucket, "log"))
            .body(b"world".to_vec())
            .send()
            .await
            .expect("append");
        assert_eq!(appended.status(), StatusCode::OK);

        let (_, data) = client.get_bytes(&bucket, "log").await;
        assert_eq!(data.as_ref(), b"hello world");

        let hash: serde_json::Value = client
            .http()
            .get(format!("{}/hash", client.object_url(&bucket, "log")))
            .send()
            .await
            .expect("get hash")
            .json()
            .await
            .expect("hash json");
        assert!(hash["digest"].as_str().is_some_and(|d| !d.is_empty()));

        let deleted: serde_json::Value = client
            .http()
            .delete(client.object_url(&bucket, "log"))
            .send()
            .await
            .expect("delete")
            .json()
            .await
            .expect("delete json");
        assert_eq!(deleted["deleted"], 11);

        let (status, _) = client.get_bytes(&bucket, "log").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        cleanup_bucket(&client, &bucket).await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_accept_encoded_keys() {
        let client = TestClient::new();
        let bucket = create_test_bucket(&client, "keys").await;

        let key = "dir%2Fsub%20dir%2Ffile.txt";
        client.put(&bucket, key, "text/plain", b"nested".to_vec()).await;
        let (status, data) = client.get_bytes(&bucket, key).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(data.as_ref(), b"nested");

        let meta: serde_json::Value = client
            .http()
            .get(format!("{}/meta", client.object_url(&bucket, key)))
            .send()
            .await
            .expect("get meta")
            .json()
            .await
            .expect("meta json");
        assert_eq!(meta["key"], "dir/sub dir/file.txt");

        cleanup_bucket(&client, &bucket).await;
    }
}
