//! Bucket lifecycle integration tests.

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use crate::{TestClient, cleanup_bucket, create_test_bucket, test_bucket_name};

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_create_and_describe_bucket() {
        let client = TestClient::new();
        let bucket = create_test_bucket(&client, "describe").await;

        let resp = client
            .http()
            .get(client.bucket_url(&bucket))
            .send()
            .await
            .expect("get bucket");
        assert_eq!(resp.status(), StatusCode::OK);
        let info: serde_json::Value = resp.json().await.expect("bucket json");
        assert_eq!(info["name"], bucket.as_str());
        assert!(info["id"].as_u64().is_some_and(|id| id > 0));
        assert!(info["timestamp"].as_i64().is_some_and(|ts| ts > 0));

        let head = client
            .http()
            .head(client.bucket_url(&bucket))
            .send()
            .await
            .expect("head bucket");
        assert_eq!(head.status(), StatusCode::OK);

        cleanup_bucket(&client, &bucket).await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_reject_duplicate_bucket() {
        let client = TestClient::new();
        let bucket = create_test_bucket(&client, "dup").await;

        let resp = client
            .http()
            .post(client.bucket_url(&bucket))
            .send()
            .await
            .expect("create again");
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let err: serde_json::Value = resp.json().await.expect("error json");
        assert_eq!(err["errorCode"], 1001);

        cleanup_bucket(&client, &bucket).await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_assign_fresh_id_after_recreate() {
        let client = TestClient::new();
        let bucket = test_bucket_name("recreate");

        let first: serde_json::Value = client
            .http()
            .post(client.bucket_url(&bucket))
            .send()
            .await
            .expect("create")
            .json()
            .await
            .expect("bucket json");
        client.put(&bucket, "k", "text/plain", b"old".to_vec()).await;

        let deleted = client
            .http()
            .delete(client.bucket_url(&bucket))
            .send()
            .await
            .expect("delete bucket");
        assert_eq!(deleted.status(), StatusCode::NO_CONTENT);

        let second: serde_json::Value = client
            .http()
            .post(client.bucket_url(&bucket))
            .send()
            .await
            .expect("recreate")
            .json()
            .await
            .expect("bucket json");
        assert!(second["id"].as_u64() > first["id"].as_u64());

        // Objects written under the old id are not visible.
        let (status, _) = client.get_bytes(&bucket, "k").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        cleanup_bucket(&client, &bucket).await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_report_missing_bucket() {
        let client = TestClient::new();
        let bucket = test_bucket_name("missing");

        let head = client
            .http()
            .head(client.bucket_url(&bucket))
            .send()
            .await
            .expect("head bucket");
        assert_eq!(head.status(), StatusCode::NOT_FOUND);

        let delete = client
            .http()
            .delete(client.bucket_url(&bucket))
            .send()
            .await
            .expect("delete bucket");
        assert_eq!(delete.status(), StatusCode::NOT_FOUND);
    }
}
