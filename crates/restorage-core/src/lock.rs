//! Lock registry for buckets and keys.
//!
//! Locks are provisioned lazily per lock key (a bucket id, or a
//! `(bucket id, key)` pair) and reclaimed as soon as nobody holds or waits for
//! them. A guard owns a reference-counted handle to its lock, so it is
//! `'static` and can travel with a payload stream out of the call that
//! acquired it.
//!
//! Reclamation uses the [`Arc`] strong count under the map's shard lock:
//! a waiter always holds a clone of the lock before it blocks, which keeps the
//! entry alive until it has acquired and released it.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{RawRwLock, RwLock};
use tracing::trace;

type Slot = Arc<RwLock<()>>;

/// Registry of shared/exclusive locks keyed by `K`.
pub struct LockRegistry<K>
where
    K: Eq + Hash,
{
    slots: Arc<DashMap<K, Slot>>,
}

impl<K> fmt::Debug for LockRegistry<K>
where
    K: Eq + Hash,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockRegistry")
            .field("live", &self.slots.len())
            .finish()
    }
}

impl<K> Default for LockRegistry<K>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> LockRegistry<K>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
        }
    }

    /// Acquire the lock for `key` in shared mode, blocking until available.
    #[must_use]
    pub fn shared(&self, key: K) -> LockGuard<K> {
        let slot = self.slot(&key);
        trace!(?key, "acquiring shared lock");
        let held = Held::Shared(slot.read_arc());
        self.guard(key, held)
    }

    /// Acquire the lock for `key` in exclusive mode, blocking until available.
    #[must_use]
    pub fn exclusive(&self, key: K) -> LockGuard<K> {
        let slot = self.slot(&key);
        trace!(?key, "acquiring exclusive lock");
        let held = Held::Exclusive(slot.write_arc());
        self.guard(key, held)
    }

    /// Number of live lock entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no lock entry is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn slot(&self, key: &K) -> Slot {
        // The shard guard returned by `entry` is dropped at the end of this
        // statement, before the caller blocks on the lock itself.
        Arc::clone(self.slots.entry(key.clone()).or_default().value())
    }

    fn guard(&self, key: K, held: Held) -> LockGuard<K> {
        LockGuard {
            held: Some(held),
            key,
            slots: Arc::clone(&self.slots),
        }
    }
}

enum Held {
    Shared(ArcRwLockReadGuard<RawRwLock, ()>),
    Exclusive(ArcRwLockWriteGuard<RawRwLock, ()>),
}

/// RAII guard for a lock taken from a [`LockRegistry`].
///
/// Dropping the guard releases the lock and reclaims the registry entry when
/// it was the last holder.
pub struct LockGuard<K>
where
    K: Eq + Hash,
{
    held: Option<Held>,
    key: K,
    slots: Arc<DashMap<K, Slot>>,
}

impl<K> LockGuard<K>
where
    K: Eq + Hash,
{
    /// Whether this guard holds the lock exclusively.
    #[must_use]
    pub fn is_exclusive(&self) -> bool {
        matches!(self.held, Some(Held::Exclusive(_)))
    }

    /// The lock key this guard protects.
    #[must_use]
    pub fn key(&self) -> &K {
        &self.key
    }
}

impl<K> fmt::Debug for LockGuard<K>
where
    K: Eq + Hash + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard")
            .field("key", &self.key)
            .field("exclusive", &self.is_exclusive())
            .finish()
    }
}

impl<K> Drop for LockGuard<K>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        drop(self.held.take());
        self.slots
            .remove_if(&self.key, |_, slot| Arc::strong_count(slot) == 1);
    }
}
