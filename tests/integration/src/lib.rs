//! Integration tests for the ReStorage server.
//!
//! These tests require a running server at `localhost:7000`.
//! They are marked `#[ignore]` so they don't run during normal `cargo test`.
//!
//! Run them with:
//! ```text
//! cargo test -p restorage-integration -- --ignored
//! ```

use std::sync::Once;

static INIT: Once = Once::new();

/// Initialize tracing (once).
fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// Base URL of the server under test.
#[must_use]
pub fn endpoint_url() -> String {
    std::env::var("RESTORAGE_ENDPOINT_URL").unwrap_or_else(|_| "http://localhost:7000".to_owned())
}

/// A thin client over the REST routes.
#[derive(Debug, Clone)]
pub struct TestClient {
    http: reqwest::Client,
    base: String,
}

impl TestClient {
    /// Client pointing at [`endpoint_url`].
    #[must_use]
    pub fn new() -> Self {
        init_tracing();
        Self {
            http: reqwest::Client::new(),
            base: endpoint_url(),
        }
    }

    /// URL of a bucket resource.
    #[must_use]
    pub fn bucket_url(&self, bucket: &str) -> String {
        format!("{}/buckets/{bucket}", self.base)
    }

    /// URL of an object resource; `key` must already be percent-encoded.
    #[must_use]
    pub fn object_url(&self, bucket: &str, key: &str) -> String {
        format!("{}/objects/{bucket}/{key}", self.base)
    }

    /// Underlying HTTP client.
    #[must_use]
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// `PUT` an object with a content type.
    pub async fn put(&self, bucket: &str, key: &str, content_type: &str, data: Vec<u8>) -> reqwest::Response {
        self.http
            .put(self.object_url(bucket, key))
            .header("content-type", content_type)
            .body(data)
            .send()
            .await
            .unwrap_or_else(|e| panic!("failed to put {bucket}/{key}: {e}"))
    }

    /// `GET` an object's full payload.
    pub async fn get_bytes(&self, bucket: &str, key: &str) -> (reqwest::StatusCode, bytes::Bytes) {
        let resp = self
            .http
            .get(self.object_url(bucket, key))
            .send()
            .await
            .unwrap_or_else(|e| panic!("failed to get {bucket}/{key}: {e}"));
        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .unwrap_or_else(|e| panic!("failed to read {bucket}/{key}: {e}"));
        (status, body)
    }
}

impl Default for TestClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate a unique bucket name for a test.
#[must_use]
pub fn test_bucket_name(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().to_string()[..8].to_owned();
    format!("test-{prefix}-{id}")
}

/// Create a bucket and return its name. Caller is responsible for cleanup.
pub async fn create_test_bucket(client: &TestClient, prefix: &str) -> String {
    let name = test_bucket_name(prefix);
    let resp = client
        .http()
        .post(client.bucket_url(&name))
        .send()
        .await
        .unwrap_or_else(|e| panic!("failed to create bucket {name}: {e}"));
    assert_eq!(resp.status(), reqwest::StatusCode::OK, "create bucket {name}");
    name
}

/// Delete a bucket, ignoring failures.
pub async fn cleanup_bucket(client: &TestClient, bucket: &str) {
    let _ = client.http().delete(client.bucket_url(bucket)).send().await;
}

mod test_bucket;
mod test_concurrency;
mod test_error;
mod test_object;
