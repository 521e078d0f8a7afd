//! Filesystem-backed object storage engine for ReStorage.
//!
//! This crate maps `(bucket, key)` pairs to byte blobs with metadata. Every
//! object lives in exactly one file: a fixed-size JSON metadata header
//! followed by the raw payload. Files are placed in a two-level directory
//! tree derived from the SHA-256 of the key, so no directory ever holds more
//! than a bounded share of the key space.
//!
//! # Architecture
//!
//! ```text
//! caller (HTTP layer)
//!        |
//!        v
//! ObjectStore trait  <-- FileSystemStore
//!        |
//!        +--> BucketMetaDataStore (descriptors, id counter, audit log, TTL cache)
//!        +--> LockRegistry        (per-bucket / per-key shared + exclusive locks)
//!        +--> DirectoryCalculator (sha256 -> root/aa/bb/rest)
//!        +--> RangeStream         (bounded payload reads)
//! ```
//!
//! All I/O is synchronous. Callers running on an async runtime are expected to
//! move engine calls onto a blocking thread pool.

pub mod bucket;
pub mod cache;
pub mod checksums;
pub mod config;
pub mod error;
pub mod fs;
pub mod layout;
pub mod lock;
pub mod metadata;
pub mod range;
pub mod store;
pub mod validation;

pub use bucket::{BucketInfo, BucketMetaDataStore};
pub use checksums::HashAlgorithm;
pub use config::{DeleteMode, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use fs::{FileSystemStore, ObjectReader};
pub use metadata::{META_HEADER_SIZE, ObjectAttributes, ObjectInfo, ObjectMetadata};
pub use store::{GetResult, ObjectStore, PutResult};
