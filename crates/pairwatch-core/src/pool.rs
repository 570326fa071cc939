//! Fixed-capacity block allocator.
//!
//! A [`BlockPool`] pre-sizes an arena of identically shaped slots once and
//! never grows it. Free slots form a singly linked stack threaded through the
//! slots themselves, so both [`BlockPool::allocate`] and
//! [`BlockPool::release`] are O(1) and no heap traffic happens after
//! construction.
//!
//! ## Layout
//!
//! ```text
//!   slots:     [ Occupied(a) | Free(next: 3) | Occupied(b) | Free(next: -) ]
//!   free_head: 1
//! ```
//!
//! Initialization links the free list in index order, so the first
//! allocations come out in address order. After that, reuse is LIFO.
//!
//! Handles are [`BlockId`] values carrying the issuing pool's epoch and a
//! per-slot generation counter. A handle that outlived its block (released
//! and reallocated, or issued before a [`BlockPool::reinit`]) or that came
//! from another pool is rejected instead of aliasing the current occupant.

use std::sync::atomic::{AtomicU32, Ordering};

use thiserror::Error;

/// Source of pool epochs. Every `new` and `reinit` takes a fresh one.
static NEXT_EPOCH: AtomicU32 = AtomicU32::new(0);

fn next_epoch() -> u32 {
    NEXT_EPOCH.fetch_add(1, Ordering::Relaxed)
}

/// Errors reported by [`BlockPool`].
///
/// All of these are contract violations by the caller or by the bookkeeping
/// layered on top of the pool; none of them is a recoverable business state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PoolError {
    /// Every block is currently allocated.
    #[error("Block pool exhausted: all {capacity} blocks are allocated")]
    PoolExhausted {
        /// Number of blocks the pool was initialized with.
        capacity: usize,
    },

    /// The handle does not name a live block of this pool.
    #[error("Invalid block handle {index}#{generation}")]
    InvalidBlock {
        /// Slot index carried by the handle.
        index: usize,
        /// Generation carried by the handle.
        generation: u32,
    },

    /// The block was already released and has not been allocated since.
    #[error("Double release of block {index}")]
    DoubleRelease {
        /// Slot index carried by the handle.
        index: usize,
    },

    /// The pool was destroyed and can no longer be used.
    #[error("Block pool has been destroyed")]
    Destroyed,
}

/// Result alias for pool operations.
pub type PoolResult<T> = std::result::Result<T, PoolError>;

/// Handle to an allocated block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId {
    epoch: u32,
    index: u32,
    generation: u32,
}

impl BlockId {
    /// Slot index within the arena.
    #[must_use]
    pub const fn index(self) -> usize {
        self.index as usize
    }

    /// Generation of the slot when this handle was issued.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

#[derive(Debug)]
enum SlotState<T> {
    Free { next_free: Option<u32> },
    Occupied(T),
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    state: SlotState<T>,
}

/// Point-in-time allocator counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Total number of blocks in the arena.
    pub capacity: usize,
    /// Blocks currently handed out.
    pub allocated: usize,
    /// Blocks on the free list.
    pub free: usize,
    /// Highest simultaneous allocation count since init.
    pub peak_allocated: usize,
}

/// Fixed-capacity arena of uniformly sized blocks.
#[derive(Debug)]
pub struct BlockPool<T> {
    epoch: u32,
    slots: Box<[Slot<T>]>,
    free_head: Option<u32>,
    allocated: usize,
    peak_allocated: usize,
    destroyed: bool,
}

impl<T> BlockPool<T> {
    /// Create a pool holding exactly `capacity` blocks, all free.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` does not fit in a `u32`.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            epoch: next_epoch(),
            slots: Self::build_slots(capacity),
            free_head: if capacity == 0 { None } else { Some(0) },
            allocated: 0,
            peak_allocated: 0,
            destroyed: false,
        }
    }

    fn build_slots(capacity: usize) -> Box<[Slot<T>]> {
        let capacity = u32::try_from(capacity).expect("block pool capacity exceeds u32::MAX");
        (0..capacity)
            .map(|i| Slot {
                generation: 0,
                state: SlotState::Free {
                    next_free: (i + 1 < capacity).then_some(i + 1),
                },
            })
            .collect()
    }

    /// Drop every block and start over with `capacity` free blocks.
    ///
    /// Also revives a destroyed pool. Handles issued before the call are
    /// invalid afterwards.
    pub fn reinit(&mut self, capacity: usize) {
        *self = Self::new(capacity);
    }

    /// Invalidate the arena. Later allocate/release calls fail with
    /// [`PoolError::Destroyed`].
    pub fn destroy(&mut self) {
        self.slots = Box::default();
        self.free_head = None;
        self.allocated = 0;
        self.destroyed = true;
    }

    /// Whether [`destroy`](Self::destroy) has been called.
    #[must_use]
    pub const fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Take a free block and move `value` into it.
    ///
    /// # Errors
    ///
    /// [`PoolError::PoolExhausted`] when no block is free,
    /// [`PoolError::Destroyed`] after [`destroy`](Self::destroy).
    pub fn allocate(&mut self, value: T) -> PoolResult<BlockId> {
        if self.destroyed {
            return Err(PoolError::Destroyed);
        }
        let index = self.free_head.ok_or(PoolError::PoolExhausted {
            capacity: self.slots.len(),
        })?;

        let slot = &mut self.slots[index as usize];
        let SlotState::Free { next_free } = slot.state else {
            // The free list only ever links free slots.
            unreachable!("free list points at occupied slot {index}");
        };
        self.free_head = next_free;
        slot.state = SlotState::Occupied(value);

        self.allocated += 1;
        self.peak_allocated = self.peak_allocated.max(self.allocated);

        Ok(BlockId {
            epoch: self.epoch,
            index,
            generation: slot.generation,
        })
    }

    /// Return a block to the free list, handing back its contents.
    ///
    /// # Errors
    ///
    /// [`PoolError::InvalidBlock`] for a handle from another pool or from
    /// before the last [`reinit`](Self::reinit), or an out-of-range or stale
    /// one, [`PoolError::DoubleRelease`] if the block is already free,
    /// [`PoolError::Destroyed`] after [`destroy`](Self::destroy).
    pub fn release(&mut self, id: BlockId) -> PoolResult<T> {
        if self.destroyed {
            return Err(PoolError::Destroyed);
        }
        let invalid = PoolError::InvalidBlock {
            index: id.index(),
            generation: id.generation,
        };
        if id.epoch != self.epoch {
            return Err(invalid);
        }
        let slot = self.slots.get_mut(id.index()).ok_or(invalid)?;

        if matches!(slot.state, SlotState::Free { .. }) {
            return Err(PoolError::DoubleRelease { index: id.index() });
        }
        if slot.generation != id.generation {
            return Err(invalid);
        }

        let state = std::mem::replace(
            &mut slot.state,
            SlotState::Free {
                next_free: self.free_head,
            },
        );
        slot.generation = slot.generation.wrapping_add(1);
        self.free_head = Some(id.index);
        self.allocated -= 1;

        match state {
            SlotState::Occupied(value) => Ok(value),
            SlotState::Free { .. } => unreachable!("slot checked occupied above"),
        }
    }

    /// Borrow the contents of a live block.
    #[must_use]
    pub fn get(&self, id: BlockId) -> Option<&T> {
        if id.epoch != self.epoch {
            return None;
        }
        match self.slots.get(id.index()) {
            Some(Slot {
                generation,
                state: SlotState::Occupied(value),
            }) if *generation == id.generation => Some(value),
            _ => None,
        }
    }

    /// Mutably borrow the contents of a live block.
    #[must_use]
    pub fn get_mut(&mut self, id: BlockId) -> Option<&mut T> {
        if id.epoch != self.epoch {
            return None;
        }
        match self.slots.get_mut(id.index()) {
            Some(Slot {
                generation,
                state: SlotState::Occupied(value),
            }) if *generation == id.generation => Some(value),
            _ => None,
        }
    }

    /// Number of blocks in the arena.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of blocks currently allocated.
    #[must_use]
    pub const fn allocated(&self) -> usize {
        self.allocated
    }

    /// Number of free blocks, counted by walking the free list.
    #[must_use]
    pub fn free_count(&self) -> usize {
        let mut count = 0;
        let mut cursor = self.free_head;
        while let Some(index) = cursor {
            count += 1;
            cursor = match self.slots[index as usize].state {
                SlotState::Free { next_free } => next_free,
                SlotState::Occupied(_) => None,
            };
        }
        count
    }

    /// Snapshot of the allocator counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            capacity: self.capacity(),
            allocated: self.allocated,
            free: self.free_count(),
            peak_allocated: self.peak_allocated,
        }
    }

    /// Assert that the free list and the occupied slots account for every block.
    #[cfg(any(test, debug_assertions))]
    pub fn debug_validate_invariants(&self) {
        assert_eq!(self.free_count() + self.allocated, self.capacity());
        let occupied = self
            .slots
            .iter()
            .filter(|slot| matches!(slot.state, SlotState::Occupied(_)))
            .count();
        assert_eq!(occupied, self.allocated);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocates_in_index_order_after_init() {
        let mut pool = BlockPool::new(4);
        let ids: Vec<usize> = (0..4)
            .map(|v| pool.allocate(v).unwrap().index())
            .collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
        pool.debug_validate_invariants();
    }

    #[test]
    fn test_exhaustion_and_reuse() {
        let mut pool = BlockPool::new(3);
        let ids: Vec<BlockId> = (0..3).map(|v| pool.allocate(v).unwrap()).collect();

        assert_eq!(
            pool.allocate(99),
            Err(PoolError::PoolExhausted { capacity: 3 })
        );

        assert_eq!(pool.release(ids[1]).unwrap(), 1);
        let reused = pool.allocate(7).unwrap();
        assert_eq!(reused.index(), 1);
        assert_eq!(pool.get(reused), Some(&7));
        pool.debug_validate_invariants();
    }

    #[test]
    fn test_release_is_lifo() {
        let mut pool = BlockPool::new(3);
        let a = pool.allocate('a').unwrap();
        let b = pool.allocate('b').unwrap();
        pool.release(a).unwrap();
        pool.release(b).unwrap();
        assert_eq!(pool.allocate('c').unwrap().index(), b.index());
        assert_eq!(pool.allocate('d').unwrap().index(), a.index());
    }

    #[test]
    fn test_double_release_is_detected() {
        let mut pool = BlockPool::new(2);
        let id = pool.allocate("x").unwrap();
        pool.release(id).unwrap();
        assert_eq!(
            pool.release(id),
            Err(PoolError::DoubleRelease { index: id.index() })
        );
        assert_eq!(pool.allocated(), 0);
        assert_eq!(pool.free_count(), 2);
        pool.debug_validate_invariants();
    }

    #[test]
    fn test_stale_handle_is_invalid() {
        let mut pool = BlockPool::new(1);
        let stale = pool.allocate(1).unwrap();
        pool.release(stale).unwrap();
        let fresh = pool.allocate(2).unwrap();
        assert_eq!(stale.index(), fresh.index());

        assert!(matches!(
            pool.release(stale),
            Err(PoolError::InvalidBlock { .. })
        ));
        assert_eq!(pool.get(stale), None);
        assert_eq!(pool.get(fresh), Some(&2));
    }

    #[test]
    fn test_foreign_handle_is_invalid() {
        let mut big = BlockPool::new(8);
        let mut small = BlockPool::<u8>::new(2);
        let mut last = None;
        for v in 0..8 {
            last = Some(big.allocate(v).unwrap());
        }
        let err = small.release(last.unwrap()).unwrap_err();
        assert_eq!(
            err,
            PoolError::InvalidBlock {
                index: 7,
                generation: 0
            }
        );
    }

    #[test]
    fn test_handle_from_other_pool_is_invalid() {
        let mut a = BlockPool::new(2);
        let mut b = BlockPool::new(2);
        let from_a = a.allocate(1).unwrap();
        let owned_by_b = b.allocate(2).unwrap();
        assert_eq!(from_a.index(), owned_by_b.index());

        assert!(matches!(
            b.release(from_a),
            Err(PoolError::InvalidBlock { index: 0, .. })
        ));
        assert_eq!(b.get(from_a), None);
        assert_eq!(b.get(owned_by_b), Some(&2));
        assert_eq!(a.get(from_a), Some(&1));
        b.debug_validate_invariants();
    }

    #[test]
    fn test_handle_from_before_reinit_is_invalid() {
        let mut pool = BlockPool::new(2);
        let stale = pool.allocate("old").unwrap();
        pool.reinit(2);
        let fresh = pool.allocate("new").unwrap();
        assert_eq!(stale.index(), fresh.index());
        assert_eq!(stale.generation(), fresh.generation());

        assert_eq!(pool.get(stale), None);
        assert!(matches!(
            pool.release(stale),
            Err(PoolError::InvalidBlock { .. })
        ));
        assert_eq!(pool.get(fresh), Some(&"new"));
        assert_eq!(pool.allocated(), 1);
        pool.debug_validate_invariants();
    }

    #[test]
    fn test_destroy_rejects_further_use() {
        let mut pool = BlockPool::new(2);
        let id = pool.allocate(1).unwrap();
        pool.destroy();
        assert!(pool.is_destroyed());
        assert_eq!(pool.allocate(2), Err(PoolError::Destroyed));
        assert_eq!(pool.release(id), Err(PoolError::Destroyed));
        assert_eq!(pool.capacity(), 0);
    }

    #[test]
    fn test_reinit_resets_state() {
        let mut pool = BlockPool::new(2);
        pool.allocate(1).unwrap();
        pool.destroy();
        pool.reinit(5);
        assert!(!pool.is_destroyed());
        assert_eq!(pool.stats().free, 5);
        assert_eq!(pool.allocate(3).unwrap().index(), 0);
    }

    #[test]
    fn test_zero_capacity_pool_is_always_exhausted() {
        let mut pool = BlockPool::new(0);
        assert_eq!(
            pool.allocate(()),
            Err(PoolError::PoolExhausted { capacity: 0 })
        );
    }

    #[test]
    fn test_stats_track_peak() {
        let mut pool = BlockPool::new(4);
        let a = pool.allocate(0).unwrap();
        let b = pool.allocate(1).unwrap();
        pool.release(a).unwrap();
        pool.release(b).unwrap();
        pool.allocate(2).unwrap();

        let stats = pool.stats();
        assert_eq!(stats.capacity, 4);
        assert_eq!(stats.allocated, 1);
        assert_eq!(stats.free, 3);
        assert_eq!(stats.peak_allocated, 2);
    }

    #[test]
    fn test_get_mut_updates_in_place() {
        let mut pool = BlockPool::new(1);
        let id = pool.allocate(10).unwrap();
        *pool.get_mut(id).unwrap() += 5;
        assert_eq!(pool.release(id).unwrap(), 15);
    }
}
