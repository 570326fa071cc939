//! Bounded recency cache of advertising devices.
//!
//! [`DeviceCache`] keeps at most `capacity` entries, one per `device_id`,
//! ordered from most to least recently updated. Storage comes from a
//! [`BlockPool`]; the recency order is an intrusive doubly linked list whose
//! links are block handles rather than pointers.
//!
//! ## Architecture
//!
//! ```text
//!   newest                                          oldest
//!     |                                               |
//!     v                                               v
//!   [id 3] <-older/newer-> [id 1] <-older/newer-> [id 2]
//! ```
//!
//! ## Behavior
//! - Merge: a known `device_id` gets its rssi and `last_seen_ms` refreshed
//!   and moves to the newest end. Other fields are stable and not rewritten.
//! - Insert: an unknown `device_id` is stored at the newest end, evicting
//!   the oldest entry first when the cache is full.
//! - Re-observing a cached device never evicts anything.
//!
//! ## Performance
//! - lookup: O(n) scan by identity, n <= capacity
//! - reposition, insert, evict: O(1)
//! - signal strength snapshot: O(n log n), stable

use std::cmp::Reverse;

use thiserror::Error;
use tracing::{debug, error, trace, warn};

use crate::pool::{BlockId, BlockPool, PoolError, PoolStats};
use crate::types::{Entry, Observation};

/// Number of devices tracked by [`DeviceCache::new`].
pub const DEFAULT_CAPACITY: usize = 32;

/// Internal bookkeeping failures of the cache.
///
/// Reaching any of these means the cache's own accounting is wrong. They are
/// never produced by well-formed input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The backing allocator refused an operation.
    #[error("Device cache allocator failure: {0}")]
    Allocator(#[from] PoolError),

    /// A recency link points at a block that is not live.
    #[error("Device cache recency link to block {index} is dangling")]
    DanglingLink {
        /// Slot index of the dangling handle.
        index: usize,
    },
}

/// Result alias for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// What [`DeviceCache::record_observation`] did with an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The device was already cached; its entry was refreshed.
    Merged,

    /// The device was new and there was room for it.
    Inserted,

    /// The device was new and the oldest entry was evicted to make room.
    Replaced {
        /// Identity of the evicted device.
        evicted: u32,
    },
}

/// Counters describing cache activity since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Live entries.
    pub len: usize,
    /// Maximum number of live entries.
    pub capacity: usize,
    /// Observations of previously unseen devices.
    pub inserts: u64,
    /// Observations of already cached devices.
    pub merges: u64,
    /// Entries dropped to make room for new devices.
    pub evictions: u64,
    /// Times the entry count was found above capacity and trimmed.
    pub overflow_repairs: u64,
    /// Backing allocator counters.
    pub pool: PoolStats,
}

#[derive(Debug)]
struct Node {
    entry: Entry,
    newer: Option<BlockId>,
    older: Option<BlockId>,
}

/// Fixed-capacity, identity-deduplicated, recency-ordered device cache.
#[derive(Debug)]
pub struct DeviceCache {
    pool: BlockPool<Node>,
    newest: Option<BlockId>,
    oldest: Option<BlockId>,
    len: usize,
    capacity: usize,
    inserts: u64,
    merges: u64,
    evictions: u64,
    overflow_repairs: u64,
}

impl Default for DeviceCache {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceCache {
    /// Create an empty cache holding up to [`DEFAULT_CAPACITY`] devices.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create an empty cache holding up to `capacity` devices.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "device cache capacity must be at least 1");
        Self {
            pool: BlockPool::new(capacity),
            newest: None,
            oldest: None,
            len: 0,
            capacity,
            inserts: 0,
            merges: 0,
            evictions: 0,
            overflow_repairs: 0,
        }
    }

    /// Record one advertisement seen at `now_ms`.
    ///
    /// # Errors
    ///
    /// Only on internal bookkeeping failure (see [`CacheError`]). The error
    /// is logged before it is returned.
    pub fn record_observation(
        &mut self,
        observation: &Observation,
        now_ms: u64,
    ) -> CacheResult<RecordOutcome> {
        let result = self.record_inner(observation, now_ms);
        if let Err(err) = &result {
            error!(
                device_id = observation.device_id,
                len = self.len,
                capacity = self.capacity,
                error = %err,
                "Device cache bookkeeping failure"
            );
        }
        result
    }

    fn record_inner(
        &mut self,
        observation: &Observation,
        now_ms: u64,
    ) -> CacheResult<RecordOutcome> {
        if let Some(id) = self.find(observation.device_id) {
            let node = self.node_mut(id)?;
            node.entry.observation.rssi = observation.rssi;
            node.entry.last_seen_ms = now_ms;
            if self.newest != Some(id) {
                self.detach(id)?;
                self.attach_newest(id)?;
            }
            self.merges += 1;
            trace!(
                device_id = observation.device_id,
                rssi = observation.rssi,
                "Refreshed cached device"
            );
            return Ok(RecordOutcome::Merged);
        }

        self.repair_overflow()?;

        let evicted = if self.len >= self.capacity {
            let entry = self.pop_oldest()?;
            self.evictions += 1;
            entry.map(|e| e.device_id())
        } else {
            None
        };

        let id = self.pool.allocate(Node {
            entry: Entry {
                observation: *observation,
                last_seen_ms: now_ms,
            },
            newer: None,
            older: None,
        })?;
        self.attach_newest(id)?;
        self.len += 1;
        self.inserts += 1;

        Ok(match evicted {
            Some(evicted) => {
                debug!(
                    device_id = observation.device_id,
                    evicted, "Cached new device, evicted oldest"
                );
                RecordOutcome::Replaced { evicted }
            }
            None => {
                debug!(device_id = observation.device_id, "Cached new device");
                RecordOutcome::Inserted
            }
        })
    }

    /// Trim the cache back to capacity if the entry count ever exceeds it.
    fn repair_overflow(&mut self) -> CacheResult<()> {
        if self.len <= self.capacity {
            return Ok(());
        }
        warn!(
            len = self.len,
            capacity = self.capacity,
            "Device cache above capacity, evicting oldest entries"
        );
        while self.len > self.capacity {
            if self.pop_oldest()?.is_none() {
                break;
            }
            self.evictions += 1;
        }
        self.len = self.pool.allocated();
        self.overflow_repairs += 1;
        Ok(())
    }

    /// Entries from most to least recently updated.
    #[must_use]
    pub fn snapshot_by_time(&self) -> Vec<Entry> {
        self.iter().copied().collect()
    }

    /// Entries by rssi, strongest first.
    ///
    /// The sort is stable over the recency order, so equal rssi values come
    /// out most recently updated first.
    #[must_use]
    pub fn snapshot_by_signal_strength(&self) -> Vec<Entry> {
        let mut entries = self.snapshot_by_time();
        entries.sort_by_key(|entry| Reverse(entry.rssi()));
        entries
    }

    /// Borrowing iterator from most to least recently updated.
    #[must_use]
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            cache: self,
            cursor: self.newest,
            remaining: self.len,
        }
    }

    /// Look up the entry for `device_id`.
    #[must_use]
    pub fn get(&self, device_id: u32) -> Option<&Entry> {
        self.iter().find(|entry| entry.device_id() == device_id)
    }

    /// Whether `device_id` is cached.
    #[must_use]
    pub fn contains(&self, device_id: u32) -> bool {
        self.get(device_id).is_some()
    }

    /// The most recently updated entry.
    #[must_use]
    pub fn newest(&self) -> Option<&Entry> {
        self.newest
            .and_then(|id| self.pool.get(id))
            .map(|node| &node.entry)
    }

    /// The least recently updated entry, next in line for eviction.
    #[must_use]
    pub fn oldest(&self) -> Option<&Entry> {
        self.oldest
            .and_then(|id| self.pool.get(id))
            .map(|node| &node.entry)
    }

    /// Evict every entry and return its storage to the allocator.
    ///
    /// # Errors
    ///
    /// Only on internal bookkeeping failure.
    pub fn clear(&mut self) -> CacheResult<()> {
        let cleared = self.len;
        while self.pop_oldest()?.is_some() {}
        self.len = 0;
        debug!(cleared, "Cleared device cache");
        Ok(())
    }

    /// Number of cached devices.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether no device is cached.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Maximum number of cached devices.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Activity counters and allocator state.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            len: self.len,
            capacity: self.capacity,
            inserts: self.inserts,
            merges: self.merges,
            evictions: self.evictions,
            overflow_repairs: self.overflow_repairs,
            pool: self.pool.stats(),
        }
    }

    fn find(&self, device_id: u32) -> Option<BlockId> {
        let mut cursor = self.newest;
        while let Some(id) = cursor {
            let node = self.pool.get(id)?;
            if node.entry.device_id() == device_id {
                return Some(id);
            }
            cursor = node.older;
        }
        None
    }

    fn node(&self, id: BlockId) -> CacheResult<&Node> {
        self.pool
            .get(id)
            .ok_or(CacheError::DanglingLink { index: id.index() })
    }

    fn node_mut(&mut self, id: BlockId) -> CacheResult<&mut Node> {
        self.pool
            .get_mut(id)
            .ok_or(CacheError::DanglingLink { index: id.index() })
    }

    /// Unlink `id` from the recency list. Does not touch `len`.
    fn detach(&mut self, id: BlockId) -> CacheResult<()> {
        let (newer, older) = {
            let node = self.node(id)?;
            (node.newer, node.older)
        };
        match newer {
            Some(newer_id) => self.node_mut(newer_id)?.older = older,
            None => self.newest = older,
        }
        match older {
            Some(older_id) => self.node_mut(older_id)?.newer = newer,
            None => self.oldest = newer,
        }
        let node = self.node_mut(id)?;
        node.newer = None;
        node.older = None;
        Ok(())
    }

    /// Link a detached `id` in at the newest end. Does not touch `len`.
    fn attach_newest(&mut self, id: BlockId) -> CacheResult<()> {
        let previous = self.newest;
        {
            let node = self.node_mut(id)?;
            node.newer = None;
            node.older = previous;
        }
        match previous {
            Some(previous_id) => self.node_mut(previous_id)?.newer = Some(id),
            None => self.oldest = Some(id),
        }
        self.newest = Some(id);
        Ok(())
    }

    /// Remove the oldest entry and release its block.
    fn pop_oldest(&mut self) -> CacheResult<Option<Entry>> {
        let Some(id) = self.oldest else {
            return Ok(None);
        };
        self.detach(id)?;
        let node = self.pool.release(id)?;
        self.len = self.len.saturating_sub(1);
        Ok(Some(node.entry))
    }

    /// Assert the structural invariants of the cache.
    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        assert!(self.len <= self.capacity);
        assert_eq!(self.len, self.pool.allocated());
        self.pool.debug_validate_invariants();

        let mut forward = Vec::new();
        let mut previous = None;
        let mut cursor = self.newest;
        while let Some(id) = cursor {
            let node = self.pool.get(id).expect("live link");
            assert_eq!(node.newer, previous);
            forward.push(node.entry.device_id());
            previous = Some(id);
            cursor = node.older;
        }
        assert_eq!(previous, self.oldest);
        assert_eq!(forward.len(), self.len);

        let mut ids = forward.clone();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), forward.len(), "duplicate device ids cached");
    }
}

/// Iterator over cached entries, most recently updated first.
#[derive(Debug)]
pub struct Iter<'a> {
    cache: &'a DeviceCache,
    cursor: Option<BlockId>,
    remaining: usize,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Entry;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let node = self.cache.pool.get(self.cursor?)?;
        self.cursor = node.older;
        self.remaining -= 1;
        Some(&node.entry)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}

impl<'a> IntoIterator for &'a DeviceCache {
    type Item = &'a Entry;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(device_id: u32, rssi: u8) -> Observation {
        Observation::new(device_id, rssi)
    }

    fn ids(entries: &[Entry]) -> Vec<u32> {
        entries.iter().map(Entry::device_id).collect()
    }

    #[test]
    fn test_new_cache_is_empty() {
        let cache = DeviceCache::new();
        assert!(cache.is_empty());
        assert_eq!(cache.capacity(), DEFAULT_CAPACITY);
        assert!(cache.snapshot_by_time().is_empty());
        assert!(cache.snapshot_by_signal_strength().is_empty());
        assert!(cache.newest().is_none());
        assert!(cache.oldest().is_none());
    }

    #[test]
    #[should_panic(expected = "capacity must be at least 1")]
    fn test_zero_capacity_panics() {
        let _ = DeviceCache::with_capacity(0);
    }

    #[test]
    fn test_outcomes() {
        let mut cache = DeviceCache::with_capacity(2);
        assert_eq!(
            cache.record_observation(&obs(1, 10), 0).unwrap(),
            RecordOutcome::Inserted
        );
        assert_eq!(
            cache.record_observation(&obs(2, 10), 1).unwrap(),
            RecordOutcome::Inserted
        );
        assert_eq!(
            cache.record_observation(&obs(1, 20), 2).unwrap(),
            RecordOutcome::Merged
        );
        assert_eq!(
            cache.record_observation(&obs(3, 30), 3).unwrap(),
            RecordOutcome::Replaced { evicted: 2 }
        );
        cache.debug_validate_invariants();
    }

    #[test]
    fn test_merge_of_newest_keeps_order() {
        let mut cache = DeviceCache::with_capacity(4);
        cache.record_observation(&obs(1, 10), 0).unwrap();
        cache.record_observation(&obs(2, 10), 1).unwrap();
        cache.record_observation(&obs(2, 55), 2).unwrap();

        assert_eq!(ids(&cache.snapshot_by_time()), vec![2, 1]);
        assert_eq!(cache.newest().unwrap().rssi(), 55);
        cache.debug_validate_invariants();
    }

    #[test]
    fn test_merge_of_oldest_moves_tail() {
        let mut cache = DeviceCache::with_capacity(4);
        for id in 1..=3 {
            cache.record_observation(&obs(id, 10), u64::from(id)).unwrap();
        }
        cache.record_observation(&obs(1, 10), 10).unwrap();

        assert_eq!(cache.oldest().unwrap().device_id(), 2);
        assert_eq!(cache.newest().unwrap().device_id(), 1);
        cache.debug_validate_invariants();
    }

    #[test]
    fn test_merge_does_not_rewrite_stable_fields() {
        let mut cache = DeviceCache::with_capacity(2);
        cache
            .record_observation(&obs(7, 10).with_name("first").with_rf_address(1), 0)
            .unwrap();
        cache
            .record_observation(&obs(7, 90).with_name("second").with_rf_address(2), 5)
            .unwrap();

        let entry = cache.get(7).unwrap();
        assert_eq!(entry.observation.name_lossy(), "first");
        assert_eq!(entry.observation.rf_address, 1);
        assert_eq!(entry.rssi(), 90);
        assert_eq!(entry.last_seen_ms, 5);
    }

    #[test]
    fn test_single_slot_cache_replaces_on_every_new_device() {
        let mut cache = DeviceCache::with_capacity(1);
        cache.record_observation(&obs(1, 1), 0).unwrap();
        assert_eq!(
            cache.record_observation(&obs(2, 2), 1).unwrap(),
            RecordOutcome::Replaced { evicted: 1 }
        );
        assert_eq!(
            cache.record_observation(&obs(2, 3), 2).unwrap(),
            RecordOutcome::Merged
        );
        assert_eq!(cache.len(), 1);
        cache.debug_validate_invariants();
    }

    #[test]
    fn test_eviction_reuses_pool_blocks() {
        let mut cache = DeviceCache::with_capacity(3);
        for id in 0..20 {
            cache.record_observation(&obs(id, 0), u64::from(id)).unwrap();
        }
        let stats = cache.stats();
        assert_eq!(stats.pool.capacity, 3);
        assert_eq!(stats.pool.allocated, 3);
        assert_eq!(stats.pool.peak_allocated, 3);
        assert_eq!(stats.evictions, 17);
        assert_eq!(stats.inserts, 20);
        cache.debug_validate_invariants();
    }

    #[test]
    fn test_overflow_guard_repairs_and_succeeds() {
        let mut cache = DeviceCache::with_capacity(4);
        for id in 1..=4 {
            cache.record_observation(&obs(id, 10), u64::from(id)).unwrap();
        }
        // Corrupt the counter the way a bookkeeping bug would.
        cache.len = 5;

        let outcome = cache.record_observation(&obs(9, 10), 10).unwrap();
        assert_eq!(outcome, RecordOutcome::Inserted);
        assert_eq!(ids(&cache.snapshot_by_time()), vec![9, 4, 3, 2]);
        assert_eq!(cache.stats().overflow_repairs, 1);
        cache.debug_validate_invariants();
    }

    #[test]
    fn test_allocator_exhaustion_is_returned() {
        let mut cache = DeviceCache::with_capacity(4);
        for id in 1..=4 {
            cache.record_observation(&obs(id, 10), u64::from(id)).unwrap();
        }
        // Counter below the allocator's count: the cache thinks it has room.
        cache.len = 3;

        let err = cache.record_observation(&obs(9, 10), 10).unwrap_err();
        assert_eq!(
            err,
            CacheError::Allocator(PoolError::PoolExhausted { capacity: 4 })
        );

        let stats = cache.stats();
        assert_eq!(stats.inserts, 4);
        assert_eq!(stats.evictions, 0);
        assert_eq!(stats.pool.allocated, 4);
        assert!(!cache.contains(9));

        // The recency list itself was not touched.
        cache.len = 4;
        cache.debug_validate_invariants();
        assert_eq!(ids(&cache.snapshot_by_time()), vec![4, 3, 2, 1]);
        assert_eq!(
            cache.record_observation(&obs(1, 50), 11).unwrap(),
            RecordOutcome::Merged
        );
    }

    #[test]
    fn test_clear_releases_everything() {
        let mut cache = DeviceCache::with_capacity(4);
        for id in 1..=4 {
            cache.record_observation(&obs(id, 10), 0).unwrap();
        }
        cache.clear().unwrap();

        assert!(cache.is_empty());
        assert_eq!(cache.stats().pool.free, 4);
        assert_eq!(cache.stats().evictions, 0);
        cache.debug_validate_invariants();

        cache.record_observation(&obs(5, 10), 1).unwrap();
        assert_eq!(ids(&cache.snapshot_by_time()), vec![5]);
    }

    #[test]
    fn test_iter_matches_snapshot() {
        let mut cache = DeviceCache::with_capacity(8);
        for id in [4, 8, 15, 16, 23, 42] {
            cache.record_observation(&obs(id, 1), 0).unwrap();
        }
        let borrowed: Vec<u32> = (&cache).into_iter().map(Entry::device_id).collect();
        assert_eq!(borrowed, ids(&cache.snapshot_by_time()));
        assert!(cache.contains(15));
        assert!(!cache.contains(16_000));
    }

    #[test]
    fn test_error_display() {
        let err = CacheError::from(PoolError::PoolExhausted { capacity: 32 });
        assert!(err.to_string().contains("all 32 blocks"));
    }
}
