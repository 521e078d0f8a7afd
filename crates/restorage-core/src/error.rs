//! Storage engine error types.
//!
//! Defines [`StoreError`], the domain error enum surfaced by every engine
//! operation. Each variant carries a stable numeric error code and the HTTP
//! status the REST layer reports for it, so the mapping lives next to the
//! error rather than being re-derived by every caller.
//!
//! # Usage
//!
//! ```
//! use restorage_core::error::StoreError;
//!
//! let err = StoreError::BucketNotFound {
//!     bucket: "photos".to_owned(),
//! };
//! assert_eq!(err.status_code(), 404);
//! assert_eq!(err.error_code(), 1002);
//! ```

/// Storage engine error type.
///
/// Domain variants are returned directly to the caller; the engine never
/// retries. [`StoreError::Internal`] wraps unclassified I/O failures (disk
/// full, permission denied, corrupt files) and is treated as fatal at the
/// engine boundary.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    // -----------------------------------------------------------------------
    // Bucket errors
    // -----------------------------------------------------------------------
    /// A bucket with this name already exists.
    #[error("Bucket already exists: {bucket}")]
    BucketAlreadyExists {
        /// The bucket name that already exists.
        bucket: String,
    },

    /// The specified bucket does not exist.
    #[error("Bucket not found: {bucket}")]
    BucketNotFound {
        /// The bucket name that was not found.
        bucket: String,
    },

    /// The bucket name contains characters outside `[A-Za-z0-9_\-.=]`.
    #[error("Invalid bucket name: {name}: {reason}")]
    InvalidBucketName {
        /// The rejected bucket name.
        name: String,
        /// The reason for the rejection.
        reason: String,
    },

    // -----------------------------------------------------------------------
    // Object errors
    // -----------------------------------------------------------------------
    /// The specified key does not exist in the bucket.
    #[error("Key not found: {bucket}:{key}")]
    KeyNotFound {
        /// The bucket that was searched.
        bucket: String,
        /// The key that was not found.
        key: String,
    },

    /// The requested byte range is malformed or unsatisfiable.
    #[error("Invalid range request: start: {start:?} and end: {end:?}")]
    InvalidRangeRequest {
        /// Requested first byte (inclusive).
        start: Option<i64>,
        /// Requested last byte (inclusive).
        end: Option<i64>,
    },

    /// The encoded metadata record does not fit in the fixed header.
    #[error("Metadata is too large: {bucket}:{key} ({size} bytes, limit {limit})")]
    MetaDataTooLarge {
        /// Bucket of the rejected write.
        bucket: String,
        /// Key of the rejected write.
        key: String,
        /// Encoded record size in bytes.
        size: usize,
        /// Header capacity in bytes.
        limit: usize,
    },

    /// The key has reached its tombstone limit and cannot be deleted again.
    #[error("Can not delete file with bucket: {bucket} and key: {key}")]
    LimitedDeleteAccess {
        /// Bucket of the rejected delete.
        bucket: String,
        /// Key of the rejected delete.
        key: String,
    },

    // -----------------------------------------------------------------------
    // Internal / catch-all
    // -----------------------------------------------------------------------
    /// Unclassified failure, usually I/O, with context.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl StoreError {
    /// HTTP status code the REST layer reports for this error.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::BucketAlreadyExists { .. } => 409,
            Self::BucketNotFound { .. } | Self::KeyNotFound { .. } => 404,
            Self::InvalidRangeRequest { .. } => 416,
            Self::MetaDataTooLarge { .. } | Self::InvalidBucketName { .. } => 400,
            Self::LimitedDeleteAccess { .. } => 403,
            Self::Internal(_) => 500,
        }
    }

    /// Stable numeric error code, shared with REST clients.
    #[must_use]
    pub fn error_code(&self) -> u32 {
        match self {
            Self::Internal(_) => 1000,
            Self::BucketAlreadyExists { .. } => 1001,
            Self::BucketNotFound { .. } => 1002,
            Self::KeyNotFound { .. } => 1003,
            Self::InvalidRangeRequest { .. } => 1004,
            Self::MetaDataTooLarge { .. } => 1005,
            Self::LimitedDeleteAccess { .. } => 1006,
            Self::InvalidBucketName { .. } => 1008,
        }
    }

    pub(crate) fn bucket_not_found(bucket: &str) -> Self {
        Self::BucketNotFound {
            bucket: bucket.to_owned(),
        }
    }

    pub(crate) fn key_not_found(bucket: &str, key: &str) -> Self {
        Self::KeyNotFound {
            bucket: bucket.to_owned(),
            key: key.to_owned(),
        }
    }
}

/// Convenience result type for storage engine operations.
pub type StoreResult<T> = Result<T, StoreError>;
