//! ReStorage HTTP service implementing the hyper `Service` trait.

use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use http_body::Body;
use hyper::body::Incoming;

use restorage_core::ObjectStore;

use crate::body::RestorageBody;
use crate::dispatch::dispatch_route;
use crate::response::{REQUEST_ID_HEADER, error_to_response};
use crate::router::resolve_route;

/// Tuning for the HTTP layer.
#[derive(Debug, Clone)]
pub struct RestorageHttpConfig {
    /// Chunks buffered between a connection and its blocking engine task.
    pub channel_depth: usize,
    /// Read size used when streaming object payloads out.
    pub chunk_size: usize,
}

impl Default for RestorageHttpConfig {
    fn default() -> Self {
        Self {
            channel_depth: 16,
            chunk_size: 64 * 1024,
        }
    }
}

/// Hyper `Service` over an [`ObjectStore`].
#[derive(Debug, Clone)]
pub struct RestorageHttpService {
    store: Arc<dyn ObjectStore>,
    config: Arc<RestorageHttpConfig>,
}

impl RestorageHttpService {
    /// Create a new service.
    pub fn new(store: Arc<dyn ObjectStore>, config: RestorageHttpConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
        }
    }
}

impl hyper::service::Service<http::Request<Incoming>> for RestorageHttpService {
    type Response = http::Response<RestorageBody>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: http::Request<Incoming>) -> Self::Future {
        let store = Arc::clone(&self.store);
        let config = Arc::clone(&self.config);
        let request_id = uuid::Uuid::new_v4().to_string();

        Box::pin(async move { Ok(handle_request(store, &config, req, &request_id).await) })
    }
}

/// Route, dispatch, and format a single request.
///
/// Generic over the request body so it can be driven without a socket.
pub async fn handle_request<B>(
    store: Arc<dyn ObjectStore>,
    config: &RestorageHttpConfig,
    req: http::Request<B>,
    request_id: &str,
) -> http::Response<RestorageBody>
where
    B: Body<Data = Bytes> + Send,
    B::Error: fmt::Display,
{
    let (parts, body) = req.into_parts();
    tracing::debug!(
        method = %parts.method,
        uri = %parts.uri,
        request_id,
        "received request",
    );

    let result = match resolve_route(&parts.method, parts.uri.path()) {
        Ok(route) => dispatch_route(store, config, route, &parts.headers, body).await,
        Err(err) => Err(err),
    };

    let mut response = match result {
        Ok(response) => response,
        Err(err) => {
            if err.status_code().is_server_error() {
                tracing::warn!(error = %err, request_id, "request failed");
            } else {
                tracing::debug!(error = %err, request_id, "request rejected");
            }
            error_to_response(&err, request_id)
        }
    };

    if parts.method == http::Method::HEAD {
        *response.body_mut() = RestorageBody::empty();
    }
    add_common_headers(response, request_id)
}

fn add_common_headers(
    mut response: http::Response<RestorageBody>,
    request_id: &str,
) -> http::Response<RestorageBody> {
    let headers = response.headers_mut();
    if let Ok(hv) = http::HeaderValue::from_str(request_id) {
        headers.entry(REQUEST_ID_HEADER).or_insert(hv);
    }
    headers.insert("server", http::HeaderValue::from_static("ReStorage"));
    response
}
