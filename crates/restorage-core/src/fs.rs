//! Filesystem-backed [`ObjectStore`].
//!
//! An object is a single file at `hash_path(key) + ".{bucketId}.object"`: a
//! [`META_HEADER_SIZE`](crate::metadata::META_HEADER_SIZE) header followed by
//! the payload. `put` builds the replacement in a temp file in the same leaf
//! directory and renames it over the old one, so a failed write never leaves
//! a torn object behind. `append` writes in place and truncates back to the
//! previous size, restoring the old header, when it fails.
//!
//! # Locking
//!
//! Every object operation first takes its bucket's lock in shared mode (via
//! [`BucketLease`]), then the key's lock: exclusive for `put`, `append` and
//! `delete`, shared for `get` and `get_meta`. Locks are never taken in the
//! other order and no operation acquires a second key lock, so there is no
//! lock cycle. `get` hands both guards to the returned stream.

use std::ffi::OsStr;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::bucket::{BucketInfo, BucketLease, BucketMetaDataStore};
use crate::checksums::{self, HashAlgorithm};
use crate::config::{DeleteMode, StoreConfig};
use crate::error::{StoreError, StoreResult};
use crate::layout;
use crate::lock::{LockGuard, LockRegistry};
use crate::metadata::{META_HEADER_SIZE, ObjectAttributes, ObjectInfo, ObjectMetadata, PAYLOAD_OFFSET};
use crate::range::{RangeStream, check_bounds, resolve_range};
use crate::store::{GetResult, ObjectStore, PutResult};

/// Buffer size for payload reads.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Trailing component of every tombstone file name.
const TOMBSTONE_SUFFIX: &str = ".deleted";

type KeyLock = (u64, String);

/// Payload stream returned by `get`.
///
/// Holds the key lock and the bucket lock in shared mode until dropped.
#[derive(Debug)]
pub struct ObjectReader {
    // Drop order matters: file first, then key lock, then bucket lock.
    stream: RangeStream<BufReader<File>>,
    _key_guard: LockGuard<KeyLock>,
    _bucket_guard: LockGuard<u64>,
}

impl ObjectReader {
    /// Bytes not yet read.
    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.stream.remaining()
    }
}

impl Read for ObjectReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

/// Object store rooted at a local directory.
///
/// # Examples
///
/// ```no_run
/// use restorage_core::{FileSystemStore, ObjectAttributes, ObjectStore, StoreConfig};
///
/// let store = FileSystemStore::open(&StoreConfig::default()).unwrap();
/// store.create_bucket("media").unwrap();
/// store
///     .put("media", "a.txt", &mut &b"hello"[..], &ObjectAttributes::new())
///     .unwrap();
/// ```
#[derive(Debug)]
pub struct FileSystemStore {
    root: PathBuf,
    buckets: BucketMetaDataStore,
    key_locks: LockRegistry<KeyLock>,
    delete_mode: DeleteMode,
    max_tombstones: usize,
    hash_algorithm: HashAlgorithm,
    sync_writes: bool,
}

impl FileSystemStore {
    /// Open the store at `config.root_dir`, creating the directory layout on
    /// first use.
    pub fn open(config: &StoreConfig) -> StoreResult<Self> {
        let buckets = BucketMetaDataStore::open(config)?;
        info!(
            root = %config.root_dir.display(),
            delete_mode = %config.delete_mode,
            hash = %config.hash_algorithm,
            "object store opened"
        );
        Ok(Self {
            root: config.root_dir.clone(),
            buckets,
            key_locks: LockRegistry::new(),
            delete_mode: config.delete_mode,
            max_tombstones: config.max_tombstones,
            hash_algorithm: config.hash_algorithm,
            sync_writes: config.sync_writes,
        })
    }

    /// The bucket registry.
    #[must_use]
    pub fn buckets(&self) -> &BucketMetaDataStore {
        &self.buckets
    }

    /// Storage root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the object file for `key` in bucket `bucket_id`.
    #[must_use]
    pub fn object_path(&self, bucket_id: u64, key: &str) -> PathBuf {
        layout::with_suffix(
            &layout::hash_path(&self.root, key),
            &format!(".{bucket_id}.object"),
        )
    }

    fn lease(&self, bucket: &str) -> StoreResult<BucketLease> {
        self.buckets.lease(bucket)
    }

    fn tombstone_path(&self, bucket: &str, key: &str, path: &Path) -> StoreResult<PathBuf> {
        let file_name = path
            .file_name()
            .and_then(OsStr::to_str)
            .context("object path has no file name")?;
        let dir = path.parent().context("object path has no parent")?;
        let prefix = format!("{file_name}.");

        let retained = fs::read_dir(dir)
            .with_context(|| format!("failed to list {}", dir.display()))?
            .filter_map(Result::ok)
            .filter(|entry| {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                name.starts_with(&prefix) && name.ends_with(TOMBSTONE_SUFFIX)
            })
            .count();
        if retained >= self.max_tombstones {
            return Err(StoreError::LimitedDeleteAccess {
                bucket: bucket.to_owned(),
                key: key.to_owned(),
            });
        }

        let mut millis = Utc::now().timestamp_millis();
        loop {
            let candidate = layout::with_suffix(path, &format!(".{millis}{TOMBSTONE_SUFFIX}"));
            if !candidate.exists() {
                return Ok(candidate);
            }
            millis += 1;
        }
    }

    /// Merge `attrs` into the header and write `data` past the current end.
    fn extend_object(
        &self,
        file: &mut File,
        path: &Path,
        header: &[u8],
        data: &mut dyn Read,
        attrs: &ObjectAttributes,
    ) -> StoreResult<u64> {
        if !attrs.is_empty() {
            let header = ObjectMetadata::decode_header(header)?
                .merged(attrs)
                .encode_header()?;
            file.seek(SeekFrom::Start(0))
                .and_then(|_| file.write_all(&header))
                .map_err(|e| io_error(e, "rewrite header of", path))?;
        }

        file.seek(SeekFrom::End(0))
            .map_err(|e| io_error(e, "seek", path))?;
        let appended = io::copy(data, file).context("failed to append object payload")?;
        if self.sync_writes {
            file.sync_all().context("failed to sync object")?;
        }
        Ok(appended)
    }
}

impl ObjectStore for FileSystemStore {
    fn create_bucket(&self, name: &str) -> StoreResult<BucketInfo> {
        self.buckets.create_bucket(name)
    }

    fn get_bucket_info(&self, name: &str) -> StoreResult<Option<BucketInfo>> {
        self.buckets.get_bucket_info(name)
    }

    fn delete_bucket(&self, name: &str) -> StoreResult<()> {
        self.buckets.delete_bucket(name)
    }

    fn put(
        &self,
        bucket: &str,
        key: &str,
        data: &mut dyn Read,
        attrs: &ObjectAttributes,
    ) -> StoreResult<PutResult> {
        let lease = self.lease(bucket)?;
        let header = ObjectMetadata::new(bucket, key, attrs).encode_header()?;
        let path = self.object_path(lease.id(), key);
        let _guard = self.key_locks.exclusive((lease.id(), key.to_owned()));

        let dir = path.parent().context("object path has no parent")?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
        tmp.write_all(&header)
            .context("failed to write object header")?;
        let received = io::copy(data, &mut tmp).context("failed to write object payload")?;
        if self.sync_writes {
            tmp.as_file().sync_all().context("failed to sync object")?;
        }
        let file = tmp
            .persist(&path)
            .map_err(|e| io_error(e.error, "replace", &path))?;
        let (_, last_modified) = stat(&file, &path)?;

        debug!(bucket, key, bytes = received, "object stored");
        Ok(PutResult {
            bucket: bucket.to_owned(),
            key: key.to_owned(),
            bytes_received: received,
            content_type: attrs.content_type.clone(),
            last_modified,
        })
    }

    fn append(
        &self,
        bucket: &str,
        key: &str,
        data: &mut dyn Read,
        attrs: &ObjectAttributes,
    ) -> StoreResult<PutResult> {
        let lease = self.lease(bucket)?;
        let path = self.object_path(lease.id(), key);
        let _guard = self.key_locks.exclusive((lease.id(), key.to_owned()));

        let mut file = open_object(OpenOptions::new().read(true).write(true), &path, bucket, key)?;
        let original_len = file.metadata().map_err(|e| io_error(e, "stat", &path))?.len();
        let mut original_header = [0u8; META_HEADER_SIZE];
        file.read_exact(&mut original_header)
            .context("object file is shorter than its metadata header")?;

        let appended = match self.extend_object(&mut file, &path, &original_header, data, attrs) {
            Ok(appended) => appended,
            Err(err) => {
                if let Err(rollback) = restore_object(&mut file, original_len, &original_header) {
                    warn!(bucket, key, error = %rollback, "failed to roll back partial append");
                }
                return Err(err);
            }
        };
        let (_, last_modified) = stat(&file, &path)?;

        debug!(bucket, key, bytes = appended, "object appended");
        Ok(PutResult {
            bucket: bucket.to_owned(),
            key: key.to_owned(),
            bytes_received: appended,
            content_type: attrs.content_type.clone(),
            last_modified,
        })
    }

    fn get_meta(&self, bucket: &str, key: &str) -> StoreResult<ObjectInfo> {
        let lease = self.lease(bucket)?;
        let path = self.object_path(lease.id(), key);
        let _guard = self.key_locks.shared((lease.id(), key.to_owned()));

        let mut file = open_object(OpenOptions::new().read(true), &path, bucket, key)?;
        let metadata = ObjectMetadata::read_header(&mut file)?;
        let (object_size, last_modified) = stat(&file, &path)?;

        Ok(ObjectInfo {
            metadata,
            object_size,
            content_length: object_size,
            last_modified,
        })
    }

    fn get(
        &self,
        bucket: &str,
        key: &str,
        start: Option<i64>,
        end: Option<i64>,
    ) -> StoreResult<GetResult> {
        let lease = self.lease(bucket)?;
        check_bounds(start, end)?;
        let path = self.object_path(lease.id(), key);
        let key_guard = self.key_locks.shared((lease.id(), key.to_owned()));

        let mut file = open_object(OpenOptions::new().read(true), &path, bucket, key)?;
        let metadata = ObjectMetadata::read_header(&mut file)?;
        let (object_size, last_modified) = stat(&file, &path)?;
        let range = resolve_range(start, end, object_size)?;

        file.seek(SeekFrom::Start(PAYLOAD_OFFSET + range.offset))
            .map_err(|e| io_error(e, "seek", &path))?;

        debug!(bucket, key, offset = range.offset, length = range.length, "object read");
        let body = ObjectReader {
            stream: RangeStream::new(
                BufReader::with_capacity(READ_BUFFER_SIZE, file),
                range.length,
            ),
            _key_guard: key_guard,
            _bucket_guard: lease.into_guard(),
        };

        Ok(GetResult {
            info: ObjectInfo {
                metadata,
                object_size,
                content_length: range.length,
                last_modified,
            },
            body: Box::new(body),
        })
    }

    fn delete(&self, bucket: &str, key: &str) -> StoreResult<u64> {
        let lease = self.lease(bucket)?;
        let path = self.object_path(lease.id(), key);
        let _guard = self.key_locks.exclusive((lease.id(), key.to_owned()));

        let size = match fs::metadata(&path) {
            Ok(meta) => meta.len().saturating_sub(PAYLOAD_OFFSET),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::key_not_found(bucket, key));
            }
            Err(e) => return Err(io_error(e, "stat", &path)),
        };

        match self.delete_mode {
            DeleteMode::Unlink => {
                fs::remove_file(&path).map_err(|e| io_error(e, "remove", &path))?;
            }
            DeleteMode::Tombstone => {
                let tombstone = self.tombstone_path(bucket, key, &path)?;
                fs::rename(&path, &tombstone).map_err(|e| io_error(e, "rename", &path))?;
            }
        }

        debug!(bucket, key, bytes = size, mode = %self.delete_mode, "object deleted");
        Ok(size)
    }

    fn compute_hash(&self, bucket: &str, key: &str) -> StoreResult<String> {
        let result = self.get(bucket, key, None, None)?;
        let digest = checksums::hash_reader(self.hash_algorithm, result.body)
            .with_context(|| format!("failed to hash {bucket}:{key}"))?;
        Ok(digest)
    }

    fn object_exists(&self, bucket: &str, key: &str) -> StoreResult<bool> {
        let lease = self.lease(bucket)?;
        let path = self.object_path(lease.id(), key);
        match fs::metadata(&path) {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(e, "stat", &path)),
        }
    }

    fn derived_dir(&self, bucket: &str, key: &str) -> StoreResult<PathBuf> {
        let lease = self.lease(bucket)?;
        let id = lease.id();
        let _guard = self.key_locks.shared((id, key.to_owned()));

        if !self.object_path(id, key).is_file() {
            return Err(StoreError::key_not_found(bucket, key));
        }
        let dir = layout::with_suffix(&layout::hash_path(&self.root, key), &format!(".{id}.hls"));
        fs::create_dir_all(&dir).map_err(|e| io_error(e, "create", &dir))?;
        Ok(dir)
    }

    fn hash_algorithm(&self) -> HashAlgorithm {
        self.hash_algorithm
    }
}

/// Put an object back to its size and header from before a failed append.
fn restore_object(file: &mut File, len: u64, header: &[u8]) -> io::Result<()> {
    file.set_len(len)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(header)?;
    file.sync_all()
}

fn open_object(options: &OpenOptions, path: &Path, bucket: &str, key: &str) -> StoreResult<File> {
    options.open(path).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            StoreError::key_not_found(bucket, key)
        } else {
            io_error(e, "open", path)
        }
    })
}

fn stat(file: &File, path: &Path) -> StoreResult<(u64, DateTime<Utc>)> {
    let meta = file.metadata().map_err(|e| io_error(e, "stat", path))?;
    let modified = meta.modified().map_err(|e| io_error(e, "stat", path))?;
    Ok((
        meta.len().saturating_sub(PAYLOAD_OFFSET),
        DateTime::<Utc>::from(modified),
    ))
}

fn io_error(e: io::Error, action: &str, path: &Path) -> StoreError {
    StoreError::Internal(anyhow::Error::new(e).context(format!(
        "failed to {action} {}",
        path.display()
    )))
}
