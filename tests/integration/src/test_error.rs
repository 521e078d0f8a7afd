//! Error response integration tests.

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use crate::{TestClient, cleanup_bucket, create_test_bucket, test_bucket_name};

    async fn error_body(resp: reqwest::Response) -> serde_json::Value {
        resp.json().await.expect("error json")
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_return_json_errors() {
        let client = TestClient::new();
        let missing = test_bucket_name("nobucket");

        let resp = client.put(&missing, "k", "text/plain", b"x".to_vec()).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let err = error_body(resp).await;
        assert_eq!(err["statusCode"], 404);
        assert_eq!(err["errorCode"], 1002);
        assert!(err["message"].as_str().is_some_and(|m| m.contains(&missing)));
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_reject_missing_key_and_bad_ranges() {
        let client = TestClient::new();
        let bucket = create_test_bucket(&client, "errors").await;

        let resp = client
            .http()
            .get(client.object_url(&bucket, "absent"))
            .send()
            .await
            .expect("get object");
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(error_body(resp).await["errorCode"], 1003);

        client.put(&bucket, "small", "text/plain", b"0123456789".to_vec()).await;
        for range in ["bytes=-3", "bytes=50-", "bytes=8-2"] {
            let resp = client
                .http()
                .get(client.object_url(&bucket, "small"))
                .header("range", range)
                .send()
                .await
                .expect("ranged get");
            assert_eq!(resp.status(), StatusCode::RANGE_NOT_SATISFIABLE, "{range}");
            assert_eq!(error_body(resp).await["errorCode"], 1004, "{range}");
        }

        cleanup_bucket(&client, &bucket).await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_reject_oversized_metadata() {
        let client = TestClient::new();
        let bucket = create_test_bucket(&client, "bigmeta").await;

        let resp = client
            .http()
            .put(client.object_url(&bucket, "k"))
            .header("x-restorage-object-meta-blob", "v".repeat(2048))
            .body(b"payload".to_vec())
            .send()
            .await
            .expect("put object");
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_body(resp).await["errorCode"], 1005);

        cleanup_bucket(&client, &bucket).await;
    }

    #[tokio::test]
    #[ignore = "requires running server"]
    async fn test_should_reject_invalid_bucket_name() {
        let client = TestClient::new();
        let resp = client
            .http()
            .post(client.bucket_url("bad%20name"))
            .send()
            .await
            .expect("create bucket");
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_body(resp).await["errorCode"], 1008);
    }
}
