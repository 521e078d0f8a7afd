//! The engine contract.
//!
//! [`ObjectStore`] is object-safe so the HTTP layer can hold an
//! `Arc<dyn ObjectStore>`. Every method blocks on disk I/O; async callers
//! run them on a blocking thread pool.

use std::fmt;
use std::io::Read;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::bucket::BucketInfo;
use crate::checksums::HashAlgorithm;
use crate::error::StoreResult;
use crate::metadata::{ObjectAttributes, ObjectInfo};

/// Outcome of `put` or `append`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PutResult {
    /// Bucket written to.
    pub bucket: String,
    /// Key written to.
    pub key: String,
    /// Payload bytes consumed from the caller in this call.
    pub bytes_received: u64,
    /// Content type supplied with the call, if any.
    pub content_type: Option<String>,
    /// File modification time after the write.
    pub last_modified: DateTime<Utc>,
}

/// Outcome of `get`: metadata plus a stream over the selected bytes.
///
/// The stream keeps the object's shared locks alive; drop it promptly.
pub struct GetResult {
    /// Metadata, with `content_length` set to the number of bytes in `body`.
    pub info: ObjectInfo,
    /// Payload stream bounded to the requested range.
    pub body: Box<dyn Read + Send>,
}

impl fmt::Debug for GetResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GetResult")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// Object storage engine.
pub trait ObjectStore: Send + Sync + fmt::Debug {
    /// Create a bucket.
    fn create_bucket(&self, name: &str) -> StoreResult<BucketInfo>;

    /// Resolve a bucket by name.
    fn get_bucket_info(&self, name: &str) -> StoreResult<Option<BucketInfo>>;

    /// Delete a bucket, waiting for in-flight object operations on it.
    fn delete_bucket(&self, name: &str) -> StoreResult<()>;

    /// Create or fully replace an object.
    fn put(
        &self,
        bucket: &str,
        key: &str,
        data: &mut dyn Read,
        attrs: &ObjectAttributes,
    ) -> StoreResult<PutResult>;

    /// Append to an existing object, merging `attrs` into its metadata.
    fn append(
        &self,
        bucket: &str,
        key: &str,
        data: &mut dyn Read,
        attrs: &ObjectAttributes,
    ) -> StoreResult<PutResult>;

    /// Read an object's metadata and derived attributes.
    fn get_meta(&self, bucket: &str, key: &str) -> StoreResult<ObjectInfo>;

    /// Stream an object's payload, optionally limited to `[start, end]`.
    fn get(
        &self,
        bucket: &str,
        key: &str,
        start: Option<i64>,
        end: Option<i64>,
    ) -> StoreResult<GetResult>;

    /// Delete an object, returning its payload size.
    fn delete(&self, bucket: &str, key: &str) -> StoreResult<u64>;

    /// Hex digest of an object's payload.
    fn compute_hash(&self, bucket: &str, key: &str) -> StoreResult<String>;

    /// Whether an object file exists for `(bucket, key)`.
    fn object_exists(&self, bucket: &str, key: &str) -> StoreResult<bool>;

    /// Per-object directory for derived artifacts, created on demand.
    fn derived_dir(&self, bucket: &str, key: &str) -> StoreResult<PathBuf>;

    /// Algorithm used by [`ObjectStore::compute_hash`].
    fn hash_algorithm(&self) -> HashAlgorithm;
}
