//! Bucket descriptors, id allocation, and the bucket lookup cache.
//!
//! Each bucket is a small JSON descriptor stored at the sharded path of its
//! name with a `.bucket` suffix. Ids come from a durable counter in
//! `lastBucket.id`; every create and delete is appended to `buckets.log`.
//!
//! Create and delete run under one namespace mutex. Object operations never
//! take that mutex: they obtain a [`BucketLease`], which holds the bucket's
//! lock in shared mode, so `delete_bucket` (exclusive) waits for in-flight
//! object operations and blocks new ones. `delete_bucket` takes the bucket
//! lock before the namespace mutex, so a long-lived lease on one bucket
//! never stalls create or delete of another.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Context;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::cache::TtlCache;
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::layout;
use crate::lock::{LockGuard, LockRegistry};
use crate::validation::validate_bucket_name;

/// File holding the last allocated bucket id, as decimal text.
pub const LAST_BUCKET_ID_FILE: &str = "lastBucket.id";

/// Append-only audit log of bucket lifecycle operations.
pub const BUCKET_LOG_FILE: &str = "buckets.log";

/// Suffix appended to the sharded path of a bucket name.
const DESCRIPTOR_SUFFIX: &str = ".bucket";

/// Identity of a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketInfo {
    /// Immutable id, never reused.
    pub id: u64,
    /// Unique bucket name.
    pub name: String,
    /// Creation time in milliseconds since the Unix epoch.
    pub timestamp: i64,
}

/// Bucket lifecycle operations recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BucketOp {
    Create,
    Delete,
}

impl BucketOp {
    fn as_str(self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Delete => "DELETE",
        }
    }
}

/// A verified bucket plus its shared lock.
///
/// While a lease is alive the bucket cannot be deleted.
#[derive(Debug)]
pub struct BucketLease {
    info: BucketInfo,
    guard: LockGuard<u64>,
}

impl BucketLease {
    /// The leased bucket.
    #[must_use]
    pub fn info(&self) -> &BucketInfo {
        &self.info
    }

    /// Bucket id shorthand.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.info.id
    }

    /// Give up the bucket identity and keep only the lock.
    #[must_use]
    pub fn into_guard(self) -> LockGuard<u64> {
        self.guard
    }
}

/// Durable bucket registry with a read-through lookup cache.
#[derive(Debug)]
pub struct BucketMetaDataStore {
    root: PathBuf,
    cache: TtlCache<String, Option<BucketInfo>>,
    /// Bumped whenever create or delete updates the cache; a lookup that
    /// raced with one of them does not publish what it read from disk.
    cache_epoch: RwLock<u64>,
    last_id: AtomicU64,
    namespace: Mutex<()>,
    locks: LockRegistry<u64>,
    sync_writes: bool,
}

impl BucketMetaDataStore {
    /// Open (or initialize) the registry rooted at `config.root_dir`.
    ///
    /// The id counter resumes from `lastBucket.id`, raised to the highest id
    /// in `buckets.log` if the counter file lags behind the log.
    pub fn open(config: &StoreConfig) -> StoreResult<Self> {
        let root = config.root_dir.clone();
        layout::ensure_layout(&root)
            .with_context(|| format!("failed to prepare storage root {}", root.display()))?;

        let counter = read_counter(&root.join(LAST_BUCKET_ID_FILE));
        let logged = max_logged_id(&root.join(BUCKET_LOG_FILE))?;
        let last_id = counter.max(logged);
        if logged > counter {
            warn!(counter, logged, "bucket id counter lags the audit log; using log maximum");
        }
        write_atomic(
            &root.join(LAST_BUCKET_ID_FILE),
            last_id.to_string().as_bytes(),
            config.sync_writes,
        )
        .context("failed to persist bucket id counter")?;

        info!(root = %root.display(), last_id, "bucket registry opened");

        Ok(Self {
            cache: TtlCache::new(config.bucket_cache_capacity, config.bucket_cache_ttl()),
            cache_epoch: RwLock::new(0),
            root,
            last_id: AtomicU64::new(last_id),
            namespace: Mutex::new(()),
            locks: LockRegistry::new(),
            sync_writes: config.sync_writes,
        })
    }

    /// Create a bucket and assign it the next id.
    pub fn create_bucket(&self, name: &str) -> StoreResult<BucketInfo> {
        validate_bucket_name(name)?;
        let _namespace = self.namespace.lock();

        if self.get_bucket_info(name)?.is_some() {
            return Err(StoreError::BucketAlreadyExists {
                bucket: name.to_owned(),
            });
        }

        let id = self.last_id.load(Ordering::SeqCst) + 1;
        write_atomic(
            &self.root.join(LAST_BUCKET_ID_FILE),
            id.to_string().as_bytes(),
            self.sync_writes,
        )
        .context("failed to persist bucket id counter")?;
        self.last_id.store(id, Ordering::SeqCst);

        let info = BucketInfo {
            id,
            name: name.to_owned(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        let descriptor = serde_json::to_vec(&info).context("failed to encode bucket descriptor")?;
        write_atomic(&self.descriptor_path(name), &descriptor, self.sync_writes)
            .with_context(|| format!("failed to write descriptor for bucket {name}"))?;

        self.publish(name, Some(info.clone()));
        self.log_operation(BucketOp::Create, &info)?;

        info!(bucket = name, id, "bucket created");
        Ok(info)
    }

    /// Resolve a bucket by name.
    ///
    /// Lookups (including misses) are cached for the configured TTL. Names
    /// that fail validation resolve to `None` without touching the disk.
    pub fn get_bucket_info(&self, name: &str) -> StoreResult<Option<BucketInfo>> {
        if validate_bucket_name(name).is_err() {
            return Ok(None);
        }

        let key = name.to_owned();
        if let Some(cached) = self.cache.get(&key) {
            trace!(bucket = name, hit = cached.is_some(), "bucket cache hit");
            return Ok(cached);
        }

        let epoch = *self.cache_epoch.read();
        let loaded = self.read_descriptor(name)?;
        let current = self.cache_epoch.read();
        if *current == epoch {
            self.cache.insert(key, loaded.clone());
        }
        Ok(loaded)
    }

    /// Delete a bucket's descriptor.
    ///
    /// Waits until no object operation holds the bucket, and blocks new ones
    /// until the descriptor is gone. Object files are left in place; they are
    /// unreachable because ids are never reused.
    pub fn delete_bucket(&self, name: &str) -> StoreResult<()> {
        let info = self
            .get_bucket_info(name)?
            .ok_or_else(|| StoreError::bucket_not_found(name))?;

        // Drain leases before entering the namespace, then confirm the name
        // still maps to the id we waited on.
        let _exclusive = self.locks.exclusive(info.id);
        let _namespace = self.namespace.lock();
        match self.read_descriptor(name)? {
            Some(current) if current.id == info.id => {}
            current => {
                debug!(bucket = name, id = info.id, "bucket changed while waiting to delete");
                self.publish(name, current);
                return Err(StoreError::bucket_not_found(name));
            }
        }

        match fs::remove_file(self.descriptor_path(name)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.publish(name, None);
                return Err(StoreError::bucket_not_found(name));
            }
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("failed to remove descriptor for bucket {name}"))
                    .into());
            }
        }
        self.publish(name, None);
        self.log_operation(BucketOp::Delete, &info)?;

        info!(bucket = name, id = info.id, "bucket deleted");
        Ok(())
    }

    /// Resolve `name`, take its lock in shared mode, and re-check that the
    /// bucket still exists with the same id.
    pub fn lease(&self, name: &str) -> StoreResult<BucketLease> {
        let info = self
            .get_bucket_info(name)?
            .ok_or_else(|| StoreError::bucket_not_found(name))?;

        let guard = self.locks.shared(info.id);

        match self.get_bucket_info(name)? {
            Some(current) if current.id == info.id => Ok(BucketLease { info, guard }),
            _ => {
                debug!(bucket = name, id = info.id, "bucket vanished while acquiring lease");
                Err(StoreError::bucket_not_found(name))
            }
        }
    }

    /// Last id handed out.
    #[must_use]
    pub fn last_bucket_id(&self) -> u64 {
        self.last_id.load(Ordering::SeqCst)
    }

    /// Storage root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn publish(&self, name: &str, info: Option<BucketInfo>) {
        let mut epoch = self.cache_epoch.write();
        *epoch += 1;
        match info {
            Some(info) => self.cache.insert(name.to_owned(), Some(info)),
            None => self.cache.invalidate(&name.to_owned()),
        }
    }

    fn descriptor_path(&self, name: &str) -> PathBuf {
        layout::with_suffix(&layout::hash_path(&self.root, name), DESCRIPTOR_SUFFIX)
    }

    fn read_descriptor(&self, name: &str) -> StoreResult<Option<BucketInfo>> {
        let path = self.descriptor_path(name);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("failed to read descriptor {}", path.display()))
                    .into());
            }
        };
        let info: BucketInfo = serde_json::from_slice(&bytes)
            .with_context(|| format!("corrupt bucket descriptor {}", path.display()))?;
        Ok(Some(info))
    }

    fn log_operation(&self, op: BucketOp, info: &BucketInfo) -> StoreResult<()> {
        let path = self.root.join(BUCKET_LOG_FILE);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        writeln!(file, "{}\t{}\t{}", op.as_str(), info.id, info.name)
            .context("failed to append to bucket log")?;
        if self.sync_writes {
            file.sync_data().context("failed to sync bucket log")?;
        }
        Ok(())
    }
}

/// Write `bytes` to a temp file beside `path`, then rename it into place.
fn write_atomic(path: &Path, bytes: &[u8], sync: bool) -> io::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no parent"))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    if sync {
        tmp.as_file().sync_all()?;
    }
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn read_counter(path: &Path) -> u64 {
    match fs::read_to_string(path) {
        Ok(text) => text.trim().parse().unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "unreadable bucket id counter");
            0
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read bucket id counter");
            0
        }
    }
}

fn max_logged_id(path: &Path) -> StoreResult<u64> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => {
            return Err(anyhow::Error::new(e)
                .context(format!("failed to read {}", path.display()))
                .into());
        }
    };
    Ok(text
        .lines()
        .filter_map(|line| line.split('\t').nth(1))
        .filter_map(|id| id.parse::<u64>().ok())
        .max()
        .unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;

    fn open_store(dir: &TempDir) -> BucketMetaDataStore {
        let config = StoreConfig::builder()
            .root_dir(dir.path().to_path_buf())
            .build();
        BucketMetaDataStore::open(&config).unwrap_or_else(|e| panic!("open failed: {e}"))
    }

    #[test]
    fn test_should_create_and_resolve_bucket() {
        let dir = tempfile::tempdir().expect("test tempdir");
        let store = open_store(&dir);

        let created = store.create_bucket("photos").expect("test create");
        assert_eq!(created.id, 1);
        assert_eq!(created.name, "photos");

        let found = store
            .get_bucket_info("photos")
            .expect("test lookup")
            .expect("bucket should exist");
        assert_eq!(found, created);

        let second = store.create_bucket("videos").expect("test create");
        assert_eq!(second.id, 2);
        assert_eq!(store.last_bucket_id(), 2);
    }

    #[test]
    fn test_should_reject_duplicate_and_invalid_names() {
        let dir = tempfile::tempdir().expect("test tempdir");
        let store = open_store(&dir);

        store.create_bucket("dup").expect("test create");
        assert!(matches!(
            store.create_bucket("dup"),
            Err(StoreError::BucketAlreadyExists { .. })
        ));
        assert!(matches!(
            store.create_bucket("has space"),
            Err(StoreError::InvalidBucketName { .. })
        ));
        assert_eq!(store.last_bucket_id(), 1);
    }

    #[test]
    fn test_should_persist_descriptor_counter_and_log() {
        let dir = tempfile::tempdir().expect("test tempdir");
        {
            let store = open_store(&dir);
            store.create_bucket("a").expect("test create");
            store.create_bucket("b").expect("test create");
            store.delete_bucket("a").expect("test delete");
        }

        let counter = fs::read_to_string(dir.path().join(LAST_BUCKET_ID_FILE)).expect("test read");
        assert_eq!(counter.trim(), "2");
        let log = fs::read_to_string(dir.path().join(BUCKET_LOG_FILE)).expect("test read");
        assert_eq!(log, "CREATE\t1\ta\nCREATE\t2\tb\nDELETE\t1\ta\n");

        let descriptor = layout::with_suffix(&layout::hash_path(dir.path(), "b"), ".bucket");
        let json: serde_json::Value =
            serde_json::from_slice(&fs::read(descriptor).expect("test read")).expect("test json");
        assert_eq!(json["id"], 2);
        assert_eq!(json["name"], "b");
        assert!(json["timestamp"].is_i64());

        let reopened = open_store(&dir);
        assert!(reopened.get_bucket_info("a").expect("test lookup").is_none());
        assert_eq!(
            reopened
                .get_bucket_info("b")
                .expect("test lookup")
                .map(|b| b.id),
            Some(2)
        );
        // Ids are never reused after a restart.
        assert_eq!(reopened.create_bucket("a").expect("test create").id, 3);
    }

    #[test]
    fn test_should_recover_counter_from_log() {
        let dir = tempfile::tempdir().expect("test tempdir");
        {
            let store = open_store(&dir);
            for name in ["a", "b", "c"] {
                store.create_bucket(name).expect("test create");
            }
        }
        fs::write(dir.path().join(LAST_BUCKET_ID_FILE), "1").expect("test write");

        let store = open_store(&dir);
        assert_eq!(store.last_bucket_id(), 3);
        assert_eq!(store.create_bucket("d").expect("test create").id, 4);
    }

    #[test]
    fn test_should_fail_deleting_missing_bucket() {
        let dir = tempfile::tempdir().expect("test tempdir");
        let store = open_store(&dir);
        assert!(matches!(
            store.delete_bucket("ghost"),
            Err(StoreError::BucketNotFound { .. })
        ));
    }

    #[test]
    fn test_should_cache_negative_lookup_until_create() {
        let dir = tempfile::tempdir().expect("test tempdir");
        let store = open_store(&dir);

        assert!(store.get_bucket_info("late").expect("test lookup").is_none());
        store.create_bucket("late").expect("test create");
        assert!(store.get_bucket_info("late").expect("test lookup").is_some());
    }

    #[test]
    fn test_should_refuse_lease_on_missing_bucket() {
        let dir = tempfile::tempdir().expect("test tempdir");
        let store = open_store(&dir);
        assert!(matches!(
            store.lease("nope"),
            Err(StoreError::BucketNotFound { .. })
        ));

        store.create_bucket("here").expect("test create");
        let lease = store.lease("here").expect("test lease");
        assert_eq!(lease.id(), 1);
        assert_eq!(lease.info().name, "here");
    }

    #[test]
    fn test_should_wait_for_leases_before_deleting() {
        let dir = tempfile::tempdir().expect("test tempdir");
        let store = Arc::new(open_store(&dir));
        store.create_bucket("busy").expect("test create");

        let lease = store.lease("busy").expect("test lease");

        let (tx, rx) = mpsc::channel();
        let deleter = Arc::clone(&store);
        let handle = thread::spawn(move || {
            let result = deleter.delete_bucket("busy");
            tx.send(result.is_ok()).expect("test send");
        });

        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        drop(lease);
        assert!(rx.recv_timeout(Duration::from_secs(5)).expect("delete should finish"));
        handle.join().expect("test join");

        assert!(matches!(
            store.lease("busy"),
            Err(StoreError::BucketNotFound { .. })
        ));
    }

    #[test]
    fn test_should_create_other_buckets_while_delete_waits() {
        let dir = tempfile::tempdir().expect("test tempdir");
        let store = Arc::new(open_store(&dir));
        store.create_bucket("busy").expect("test create");
        store.create_bucket("idle").expect("test create");
        let lease = store.lease("busy").expect("test lease");

        let (tx, rx) = mpsc::channel();
        let deleter = Arc::clone(&store);
        let handle = thread::spawn(move || {
            tx.send(deleter.delete_bucket("busy").is_ok()).expect("test send");
        });
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

        let (other_tx, other_rx) = mpsc::channel();
        let worker = Arc::clone(&store);
        let other = thread::spawn(move || {
            let created = worker.create_bucket("fresh").is_ok();
            let deleted = worker.delete_bucket("idle").is_ok();
            other_tx.send(created && deleted).expect("test send");
        });
        assert!(
            other_rx
                .recv_timeout(Duration::from_secs(5))
                .expect("namespace should stay available")
        );
        other.join().expect("test join");

        drop(lease);
        assert!(rx.recv_timeout(Duration::from_secs(5)).expect("delete should finish"));
        handle.join().expect("test join");
        assert!(store.get_bucket_info("fresh").expect("test lookup").is_some());
        assert!(store.get_bucket_info("busy").expect("test lookup").is_none());
    }

    #[test]
    fn test_should_delete_bucket_only_once_under_contention() {
        let dir = tempfile::tempdir().expect("test tempdir");
        let store = Arc::new(open_store(&dir));
        store.create_bucket("b").expect("test create");
        let lease = store.lease("b").expect("test lease");

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || store.delete_bucket("b"))
            })
            .collect();
        thread::sleep(Duration::from_millis(50));
        drop(lease);

        let results: Vec<_> = handles
            .into_iter()
            .map(|h| h.join().expect("test join"))
            .collect();
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.iter().any(|r| matches!(r, Err(StoreError::BucketNotFound { .. }))));
    }
}
