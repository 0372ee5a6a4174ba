//! Per-location concurrency gate (spec §4.5, §5): exactly one orchestrator
//! turn may run per location at a time. Adapted from the teacher's
//! `SessionLockMap` (`Semaphore(1)` per key), but §5 requires an inbound
//! message for a busy location to be *dropped*, never queued — so this
//! uses `try_acquire_owned()` only and never awaits a permit.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Tracks which locations currently have an in-flight turn.
pub struct SessionLockMap {
    locks: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl Default for SessionLockMap {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionLockMap {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Try to acquire exclusive access to `location`. Returns `None`
    /// immediately if a turn is already in progress there — the caller
    /// drops the inbound message rather than queueing (§4.5 concurrency
    /// gate, §5 "drop-not-queue").
    pub fn try_acquire(&self, location: &str) -> Option<OwnedSemaphorePermit> {
        let sem = {
            let mut locks = self.locks.lock();
            locks
                .entry(location.to_owned())
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .clone()
        };
        sem.try_acquire_owned().ok()
    }

    /// Number of tracked locations (including idle ones not yet pruned).
    pub fn location_count(&self) -> usize {
        self.locks.lock().len()
    }

    /// Whether `location` currently has an in-flight turn.
    pub fn is_busy(&self, location: &str) -> bool {
        self.locks
            .lock()
            .get(location)
            .map(|sem| sem.available_permits() == 0)
            .unwrap_or(false)
    }

    /// Drop map entries for locations with no in-flight turn, so the map
    /// doesn't grow unboundedly over the process lifetime.
    pub fn prune_idle(&self) {
        let mut locks = self.locks.lock();
        locks.retain(|_, sem| sem.available_permits() == 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_caller_acquires_second_is_dropped() {
        let map = SessionLockMap::new();
        let permit1 = map.try_acquire("loc-1");
        assert!(permit1.is_some());

        let permit2 = map.try_acquire("loc-1");
        assert!(permit2.is_none(), "second caller must be dropped, not queued");
    }

    #[test]
    fn different_locations_are_independent() {
        let map = SessionLockMap::new();
        let p1 = map.try_acquire("loc-1");
        let p2 = map.try_acquire("loc-2");
        assert!(p1.is_some());
        assert!(p2.is_some());
    }

    #[test]
    fn releasing_permit_allows_reacquire() {
        let map = SessionLockMap::new();
        let permit = map.try_acquire("loc-1").unwrap();
        drop(permit);
        assert!(map.try_acquire("loc-1").is_some());
    }

    #[test]
    fn is_busy_reflects_held_permit() {
        let map = SessionLockMap::new();
        assert!(!map.is_busy("loc-1"));
        let permit = map.try_acquire("loc-1").unwrap();
        assert!(map.is_busy("loc-1"));
        drop(permit);
        assert!(!map.is_busy("loc-1"));
    }

    #[test]
    fn prune_idle_removes_unheld_entries() {
        let map = SessionLockMap::new();
        let permit = map.try_acquire("loc-1").unwrap();
        map.try_acquire("loc-2"); // acquired then immediately dropped (unbound temporary)
        map.prune_idle();
        assert_eq!(map.location_count(), 1);
        drop(permit);
    }
}
