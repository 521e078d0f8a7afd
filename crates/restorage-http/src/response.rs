//! Response construction and error formatting.

use http::{HeaderValue, Method, StatusCode};
use serde::Serialize;

use restorage_core::StoreError;

use crate::body::RestorageBody;

/// Content type for JSON responses.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Header carrying the per-request id.
pub const REQUEST_ID_HEADER: &str = "x-restorage-request-id";

/// Errors surfaced by the HTTP layer.
///
/// Engine errors keep their own status and code; the remaining variants
/// cover request shapes the engine never sees.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// An error reported by the storage engine.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The request is malformed (bad header value, undecodable path).
    #[error("{0}")]
    BadRequest(String),

    /// No route matches the request path.
    #[error("No route for {method} {path}")]
    RouteNotFound {
        /// Request method.
        method: Method,
        /// Request path.
        path: String,
    },

    /// The path exists but does not accept this method.
    #[error("Method {method} is not allowed on {path}")]
    MethodNotAllowed {
        /// Request method.
        method: Method,
        /// Request path.
        path: String,
    },

    /// The `Range` header uses a form the engine cannot serve.
    #[error("Unsatisfiable range: {0}")]
    RangeNotSatisfiable(String),

    /// A failure outside the engine, e.g. a panicked blocking task.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// Create an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// HTTP status for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Store(err) => {
                StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Self::RangeNotSatisfiable(_) => StatusCode::RANGE_NOT_SATISFIABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Numeric error code reported to clients.
    #[must_use]
    pub fn error_code(&self) -> u32 {
        match self {
            Self::Store(err) => err.error_code(),
            Self::Internal(_) => 1000,
            Self::RangeNotSatisfiable(_) => 1004,
            Self::BadRequest(_) => 1100,
            Self::RouteNotFound { .. } => 1101,
            Self::MethodNotAllowed { .. } => 1102,
        }
    }
}

/// Serialize an error into the JSON error body.
///
/// ```json
/// {"message": "Bucket not found: photos", "statusCode": 404, "errorCode": 1002}
/// ```
#[must_use]
pub fn error_to_json(error: &ApiError) -> Vec<u8> {
    serde_json::json!({
        "message": error.to_string(),
        "statusCode": error.status_code().as_u16(),
        "errorCode": error.error_code(),
    })
    .to_string()
    .into_bytes()
}

/// Convert an [`ApiError`] into a complete HTTP error response.
#[must_use]
pub fn error_to_response(error: &ApiError, request_id: &str) -> http::Response<RestorageBody> {
    let mut response = with_body(error.status_code(), RestorageBody::from_bytes(error_to_json(error)));
    set_header(&mut response, http::header::CONTENT_TYPE, JSON_CONTENT_TYPE);
    set_header(&mut response, REQUEST_ID_HEADER, request_id);
    response
}

/// Build a JSON response from a serializable value.
pub fn json_response<T: Serialize>(
    status: StatusCode,
    value: &T,
) -> Result<http::Response<RestorageBody>, ApiError> {
    let json = serde_json::to_vec(value)
        .map_err(|e| ApiError::internal(format!("Failed to encode response: {e}")))?;
    let mut response = with_body(status, RestorageBody::from_bytes(json));
    set_header(&mut response, http::header::CONTENT_TYPE, JSON_CONTENT_TYPE);
    Ok(response)
}

/// A response with the given status and no body.
#[must_use]
pub fn empty_response(status: StatusCode) -> http::Response<RestorageBody> {
    with_body(status, RestorageBody::empty())
}

/// A response with the given status and body.
#[must_use]
pub fn with_body(status: StatusCode, body: RestorageBody) -> http::Response<RestorageBody> {
    let mut response = http::Response::new(body);
    *response.status_mut() = status;
    response
}

/// Insert a header, skipping values that are not valid header text.
pub fn set_header<K>(response: &mut http::Response<RestorageBody>, name: K, value: &str)
where
    K: http::header::IntoHeaderName,
{
    match HeaderValue::from_str(value) {
        Ok(hv) => {
            response.headers_mut().insert(name, hv);
        }
        Err(_) => tracing::warn!(value, "dropping invalid header value"),
    }
}
