//! Request routing by method and path shape.
//!
//! Bucket names and keys are single path segments; each is percent-decoded
//! independently, so a key may contain an encoded `/` (`%2F`) without
//! changing the route.

use http::Method;
use percent_encoding::percent_decode_str;

use crate::response::ApiError;

/// A resolved REST operation with its decoded path parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// `GET /_health`
    Health,
    /// `POST /buckets/{bucket}`
    CreateBucket {
        /// Bucket name.
        bucket: String,
    },
    /// `GET /buckets/{bucket}`
    GetBucket {
        /// Bucket name.
        bucket: String,
    },
    /// `HEAD /buckets/{bucket}`
    HeadBucket {
        /// Bucket name.
        bucket: String,
    },
    /// `DELETE /buckets/{bucket}`
    DeleteBucket {
        /// Bucket name.
        bucket: String,
    },
    /// `PUT /objects/{bucket}/{key}`
    PutObject {
        /// Bucket name.
        bucket: String,
        /// Object key.
        key: String,
    },
    /// `POST /objects/{bucket}/{key}`
    AppendObject {
        /// Bucket name.
        bucket: String,
        /// Object key.
        key: String,
    },
    /// `GET /objects/{bucket}/{key}`
    GetObject {
        /// Bucket name.
        bucket: String,
        /// Object key.
        key: String,
    },
    /// `HEAD /objects/{bucket}/{key}`
    HeadObject {
        /// Bucket name.
        bucket: String,
        /// Object key.
        key: String,
    },
    /// `DELETE /objects/{bucket}/{key}`
    DeleteObject {
        /// Bucket name.
        bucket: String,
        /// Object key.
        key: String,
    },
    /// `GET /objects/{bucket}/{key}/meta`
    GetObjectMeta {
        /// Bucket name.
        bucket: String,
        /// Object key.
        key: String,
    },
    /// `GET /objects/{bucket}/{key}/hash`
    GetObjectHash {
        /// Bucket name.
        bucket: String,
        /// Object key.
        key: String,
    },
}

impl Route {
    /// Operation name used in logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Health => "Health",
            Self::CreateBucket { .. } => "CreateBucket",
            Self::GetBucket { .. } => "GetBucket",
            Self::HeadBucket { .. } => "HeadBucket",
            Self::DeleteBucket { .. } => "DeleteBucket",
            Self::PutObject { .. } => "PutObject",
            Self::AppendObject { .. } => "AppendObject",
            Self::GetObject { .. } => "GetObject",
            Self::HeadObject { .. } => "HeadObject",
            Self::DeleteObject { .. } => "DeleteObject",
            Self::GetObjectMeta { .. } => "GetObjectMeta",
            Self::GetObjectHash { .. } => "GetObjectHash",
        }
    }
}

/// Resolve a request to a [`Route`].
///
/// Unknown path shapes yield [`ApiError::RouteNotFound`]; known shapes with
/// an unsupported method yield [`ApiError::MethodNotAllowed`].
pub fn resolve_route(method: &Method, path: &str) -> Result<Route, ApiError> {
    let not_found = || ApiError::RouteNotFound {
        method: method.clone(),
        path: path.to_owned(),
    };
    let not_allowed = || ApiError::MethodNotAllowed {
        method: method.clone(),
        path: path.to_owned(),
    };

    let raw: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    if raw.iter().any(|s| s.is_empty()) {
        return Err(not_found());
    }

    match raw.as_slice() {
        ["_health"] => match *method {
            Method::GET | Method::HEAD => Ok(Route::Health),
            _ => Err(not_allowed()),
        },
        ["buckets", bucket] => {
            let bucket = decode_segment(bucket)?;
            match *method {
                Method::POST => Ok(Route::CreateBucket { bucket }),
                Method::GET => Ok(Route::GetBucket { bucket }),
                Method::HEAD => Ok(Route::HeadBucket { bucket }),
                Method::DELETE => Ok(Route::DeleteBucket { bucket }),
                _ => Err(not_allowed()),
            }
        }
        ["objects", bucket, key] => {
            let bucket = decode_segment(bucket)?;
            let key = decode_segment(key)?;
            match *method {
                Method::PUT => Ok(Route::PutObject { bucket, key }),
                Method::POST => Ok(Route::AppendObject { bucket, key }),
                Method::GET => Ok(Route::GetObject { bucket, key }),
                Method::HEAD => Ok(Route::HeadObject { bucket, key }),
                Method::DELETE => Ok(Route::DeleteObject { bucket, key }),
                _ => Err(not_allowed()),
            }
        }
        ["objects", bucket, key, suffix @ ("meta" | "hash")] => {
            if *method != Method::GET {
                return Err(not_allowed());
            }
            let bucket = decode_segment(bucket)?;
            let key = decode_segment(key)?;
            if *suffix == "meta" {
                Ok(Route::GetObjectMeta { bucket, key })
            } else {
                Ok(Route::GetObjectHash { bucket, key })
            }
        }
        _ => Err(not_found()),
    }
}

fn decode_segment(segment: &str) -> Result<String, ApiError> {
    percent_decode_str(segment)
        .decode_utf8()
        .map(std::borrow::Cow::into_owned)
        .map_err(|_| ApiError::BadRequest(format!("Path segment is not valid UTF-8: {segment}")))
}
