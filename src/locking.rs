//! In-process lock coordination for booking operations.
//!
//! The [`LockRegistry`] serializes same-resource operations before they reach
//! the database, shrinking the window of row-level contention there. It is an
//! injected component owned by the engine, never process-global state, and it
//! is strictly process-local: correctness across multiple service instances
//! rests on the store's own row locking, for which this registry is only a
//! fast-path optimization.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use ahash::AHashMap as HashMap;
use log::debug;
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};

use crate::errors::{BookingError, Result};
use crate::model::{BookingId, RoomNumber};

type OwnedLock = ArcMutexGuard<RawMutex, ()>;

/// The kinds of resources that can be locked, with a total order so that
/// composite acquisition always walks keys in the same global sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    Room,
    Booking,
    Sequence,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResourceKind::Room => "room",
            ResourceKind::Booking => "booking",
            ResourceKind::Sequence => "sequence",
        })
    }
}

/// Composite key naming one lockable resource.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LockKey {
    pub kind: ResourceKind,
    pub id: String,
}

impl LockKey {
    pub fn room(room: RoomNumber) -> Self {
        Self {
            kind: ResourceKind::Room,
            id: room.to_string(),
        }
    }

    pub fn booking(id: &BookingId) -> Self {
        Self {
            kind: ResourceKind::Booking,
            id: id.as_str().to_string(),
        }
    }

    pub fn sequence(year: i32) -> Self {
        Self {
            kind: ResourceKind::Sequence,
            id: year.to_string(),
        }
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// One named lock plus the number of holders and waiters referencing it.
/// Slots are created lazily and removed once the refcount drops to zero.
struct Slot {
    mutex: Arc<Mutex<()>>,
    refs: usize,
}

#[derive(Default)]
struct RegistryInner {
    table: Mutex<HashMap<LockKey, Slot>>,
}

impl RegistryInner {
    fn checkout(&self, key: &LockKey) -> Arc<Mutex<()>> {
        let mut table = self.table.lock();
        let slot = table.entry(key.clone()).or_insert_with(|| Slot {
            mutex: Arc::new(Mutex::new(())),
            refs: 0,
        });
        slot.refs += 1;
        Arc::clone(&slot.mutex)
    }

    fn checkin(&self, key: &LockKey) {
        let mut table = self.table.lock();
        if let Some(slot) = table.get_mut(key) {
            slot.refs -= 1;
            if slot.refs == 0 {
                table.remove(key);
            }
        }
    }
}

/// Registry of named mutual-exclusion locks keyed by resource kind + id.
#[derive(Clone, Default)]
pub struct LockRegistry {
    inner: Arc<RegistryInner>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until the named lock is free or `timeout` elapses.
    ///
    /// On timeout the calling operation receives
    /// [`BookingError::LockTimeout`] and nothing is left held; other
    /// operations queued on the same resource are unaffected.
    pub fn acquire(&self, key: LockKey, timeout: Duration) -> Result<LockGuard> {
        let mutex = self.inner.checkout(&key);
        match mutex.try_lock_arc_for(timeout) {
            Some(owned) => {
                debug!("acquired lock {key}");
                Ok(LockGuard {
                    registry: Arc::clone(&self.inner),
                    key,
                    owned: Some(owned),
                })
            }
            None => {
                self.inner.checkin(&key);
                debug!("lock {key} not acquired within {timeout:?}");
                Err(BookingError::LockTimeout(key))
            }
        }
    }

    /// Acquires several locks as one logical unit.
    ///
    /// Keys are sorted into the global `(kind, id)` order before acquisition
    /// so two operations needing the same pair can never circular-wait. If
    /// any acquisition fails, the guards taken so far drop before the error
    /// returns.
    pub fn acquire_many(&self, mut keys: Vec<LockKey>, timeout: Duration) -> Result<Vec<LockGuard>> {
        keys.sort();
        keys.dedup();
        let mut guards = Vec::with_capacity(keys.len());
        for key in keys {
            guards.push(self.acquire(key, timeout)?);
        }
        Ok(guards)
    }

    /// Whether the named lock is currently held. Intended for assertions.
    pub fn held(&self, key: &LockKey) -> bool {
        self.inner
            .table
            .lock()
            .get(key)
            .map(|slot| slot.mutex.is_locked())
            .unwrap_or(false)
    }

    /// Number of live lock slots. Zero means no holders and no waiters.
    pub fn slot_count(&self) -> usize {
        self.inner.table.lock().len()
    }
}

/// RAII guard for one acquired lock.
///
/// Dropping the guard releases the lock and retires the slot when it was the
/// last reference, on every exit path including unwinding.
pub struct LockGuard {
    registry: Arc<RegistryInner>,
    key: LockKey,
    owned: Option<OwnedLock>,
}

impl LockGuard {
    pub fn key(&self) -> &LockKey {
        &self.key
    }
}

impl fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard").field("key", &self.key).finish()
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // Unlock before touching the table so a queued waiter is admitted
        // ahead of slot retirement.
        self.owned.take();
        self.registry.checkin(&self.key);
        debug!("released lock {}", self.key);
    }
}
