//! Working-set policy: a fixed-capacity LRU over disjoint hot key ranges.
//!
//! The policy decides which ranges of the key space are hot enough to absorb
//! their writes in the hot cache, and which range to purge back into the
//! tree when capacity runs out.
//!
//! # Concurrency Model
//!
//! Structural state (the range map and slot endpoints) lives behind a short
//! internal mutex. The per-slot recency stamps are plain atomics updated
//! outside the mutex; two touches racing on the same slot can write their
//! stamps out of order, which costs at most mild LRU imprecision and never a
//! correctness violation. Slot recycling ([`WorkingSet::remove`]) only
//! happens under the coordinator's structure-wide writer lock, while every
//! `touch` holds the reader side, so no slot is recycled out from under a
//! touch in flight.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize};

use parking_lot::Mutex;

use crate::ordering::{READ_ORD, RELAXED, WRITE_ORD};
use crate::rangemap::RangeMap;

// ============================================================================
//  Temperature
// ============================================================================

/// Outcome of a [`WorkingSet::touch`]: is the touched range hot?
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Temperature {
    /// The range is (now) in the working set; writes should go to the cache.
    Hot,

    /// The range was rejected; writes should go to the tree.
    Cold,
}

// ============================================================================
//  WorkingSet
// ============================================================================

/// Structural state guarded by the internal mutex.
struct Slots<K, const N: usize> {
    /// Range -> slot index, for point lookup.
    map: RangeMap<K, usize>,

    /// Per-slot low endpoints; `None` while the slot is free.
    lo: [Option<K>; N],

    /// Per-slot high endpoints.
    hi: [Option<K>; N],
}

/// Bounded LRU of at most `N` disjoint hot ranges.
pub struct WorkingSet<K, const N: usize> {
    slots: Mutex<Slots<K, N>>,

    /// Per-slot recency stamp; `0` marks a free slot.
    ctr: [AtomicU64; N],

    /// Monotonic MRU stamp source, starts at 1 so `0` stays reserved.
    next: AtomicU64,

    /// Mirror of `slots.map.len()` for lock-free `needs_purge` checks.
    len: AtomicUsize,

    /// Set when a touch arrives while the set is full.
    needs_purge: AtomicBool,
}

impl<K: Ord + Copy, const N: usize> WorkingSet<K, N> {
    /// Create an empty working set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(Slots {
                map: RangeMap::new(),
                lo: [None; N],
                hi: [None; N],
            }),
            ctr: std::array::from_fn(|_| AtomicU64::new(0)),
            next: AtomicU64::new(1),
            len: AtomicUsize::new(0),
            needs_purge: AtomicBool::new(false),
        }
    }

    /// Register a touch of key `k`, proposing `[lo, hi)` as its hot range.
    ///
    /// - If `k` already lies in a tracked range, that range becomes MRU and
    ///   the touch is [`Temperature::Hot`]; the proposed endpoints are
    ///   ignored. A cold verdict therefore proves `k` is in no tracked range
    ///   (and so cannot be sitting in the cache).
    /// - If the set is full, the purge flag is raised and the touch is
    ///   [`Temperature::Cold`].
    /// - If `[lo, hi)` is degenerate, does not contain `k`, or overlaps a
    ///   tracked range (all possible for the synthetic edge ranges), the
    ///   touch is rejected as [`Temperature::Cold`] rather than installing a
    ///   range that would break the set's disjointness or mis-scope `k`.
    /// - Otherwise `[lo, hi)` is installed in a free slot and the touch is
    ///   [`Temperature::Hot`].
    pub fn touch(&self, lo: K, hi: K, k: K) -> Temperature {
        let mut slots = self.slots.lock();

        if let Some(&slot) = slots.map.find(k) {
            drop(slots);

            // MRU bump outside the mutex. Racing stamps are tolerated.
            let stamp: u64 = self.next.fetch_add(1, RELAXED);
            self.ctr[slot].store(stamp, RELAXED);
            return Temperature::Hot;
        }

        if slots.map.len() == N {
            self.needs_purge.store(true, WRITE_ORD);
            return Temperature::Cold;
        }

        if lo >= hi || k < lo || k >= hi || slots.map.overlaps(lo, hi) {
            return Temperature::Cold;
        }

        let Some(slot) = (0..N).find(|&i| self.ctr[i].load(RELAXED) == 0) else {
            return Temperature::Cold;
        };

        slots.lo[slot] = Some(lo);
        slots.hi[slot] = Some(hi);
        slots.map.insert(lo, hi, slot);
        self.len.store(slots.map.len(), WRITE_ORD);

        let stamp: u64 = self.next.fetch_add(1, RELAXED);
        self.ctr[slot].store(stamp, RELAXED);

        Temperature::Hot
    }

    /// True iff the set is full and a touch has been rejected since the last
    /// purge. The coordinator checks this under its structure lock.
    #[must_use]
    pub fn needs_purge(&self) -> bool {
        self.len.load(READ_ORD) == N && self.needs_purge.load(READ_ORD)
    }

    /// Select the least-recently-touched range as the purge victim.
    ///
    /// Returns `None` only when the set is empty.
    #[must_use]
    pub fn purge_range(&self) -> Option<(K, K)> {
        let slots = self.slots.lock();

        let mut victim: Option<(usize, u64)> = None;
        for i in 0..N {
            let stamp: u64 = self.ctr[i].load(RELAXED);
            if stamp > 0 && victim.is_none_or(|(_, best)| stamp < best) {
                victim = Some((i, stamp));
            }
        }

        let (slot, _) = victim?;
        match (slots.lo[slot], slots.hi[slot]) {
            (Some(lo), Some(hi)) => Some((lo, hi)),
            _ => None,
        }
    }

    /// Drop the range `[lo, hi)` from the set and clear the purge flag.
    ///
    /// Called by the coordinator after the range's keys have been moved back
    /// into the tree, while it still holds the structure-wide writer lock.
    pub fn remove(&self, lo: K, hi: K) {
        let mut slots = self.slots.lock();

        let Some(slot) = slots.map.remove(lo, hi) else {
            return;
        };

        slots.lo[slot] = None;
        slots.hi[slot] = None;
        self.ctr[slot].store(0, RELAXED);
        self.len.store(slots.map.len(), WRITE_ORD);
        self.needs_purge.store(false, WRITE_ORD);
    }

    /// Number of ranges currently tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len.load(READ_ORD)
    }

    /// True iff no range is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True iff `k` lies inside some tracked range.
    #[must_use]
    pub fn is_hot(&self, k: K) -> bool {
        self.slots.lock().map.find(k).is_some()
    }
}

impl<K: Ord + Copy, const N: usize> Default for WorkingSet<K, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, const N: usize> std::fmt::Debug for WorkingSet<K, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkingSet")
            .field("capacity", &N)
            .field("len", &self.len.load(READ_ORD))
            .field("needs_purge", &self.needs_purge.load(READ_ORD))
            .finish_non_exhaustive()
    }
}

// ============================================================================
//  Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touch_installs_and_reports_hot() {
        let ws: WorkingSet<u64, 4> = WorkingSet::new();

        assert_eq!(ws.touch(0, 10, 5), Temperature::Hot);
        assert!(ws.is_hot(5));
        assert!(!ws.is_hot(10));
        assert_eq!(ws.len(), 1);
    }

    #[test]
    fn repeat_touch_is_hot_without_growth() {
        let ws: WorkingSet<u64, 4> = WorkingSet::new();

        assert_eq!(ws.touch(0, 10, 5), Temperature::Hot);
        for _ in 0..20 {
            assert_eq!(ws.touch(0, 10, 7), Temperature::Hot);
        }
        assert_eq!(ws.len(), 1);
    }

    #[test]
    fn overlapping_install_is_rejected() {
        let ws: WorkingSet<u64, 4> = WorkingSet::new();

        assert_eq!(ws.touch(0, 10, 5), Temperature::Hot);
        // [5, 15) overlaps [0, 10) but 12 is not inside the tracked range.
        assert_eq!(ws.touch(5, 15, 12), Temperature::Cold);
        assert_eq!(ws.len(), 1);
    }

    #[test]
    fn full_set_raises_purge_flag() {
        const N: usize = 4;
        let ws: WorkingSet<u64, N> = WorkingSet::new();

        for i in 0..N as u64 {
            assert_eq!(ws.touch(i * 10, i * 10 + 10, i * 10), Temperature::Hot);
        }
        assert!(!ws.needs_purge());

        assert_eq!(ws.touch(100, 110, 100), Temperature::Cold);
        assert!(ws.needs_purge());
    }

    #[test]
    fn purge_victim_is_least_recently_touched() {
        const N: usize = 10;
        let ws: WorkingSet<u64, N> = WorkingSet::new();

        // Touch [0,10), [10,20), ..., [90,100) once each in order.
        for i in 0..N as u64 {
            assert_eq!(ws.touch(i * 10, i * 10 + 10, i * 10), Temperature::Hot);
        }

        assert_eq!(ws.touch(100, 110, 100), Temperature::Cold);
        assert!(ws.needs_purge());
        assert_eq!(ws.purge_range(), Some((0, 10)));

        ws.remove(0, 10);
        assert!(!ws.needs_purge());
        assert!(!ws.is_hot(5));

        // Re-touch [10,20) to make it MRU; install [110,120) in the freed
        // slot. The LRU victim is now [20,30).
        assert_eq!(ws.touch(10, 20, 15), Temperature::Hot);
        assert_eq!(ws.touch(110, 120, 110), Temperature::Hot);
        assert_eq!(ws.purge_range(), Some((20, 30)));
    }

    #[test]
    fn remove_frees_a_slot_for_reuse() {
        let ws: WorkingSet<u64, 2> = WorkingSet::new();

        assert_eq!(ws.touch(0, 10, 0), Temperature::Hot);
        assert_eq!(ws.touch(10, 20, 10), Temperature::Hot);
        assert_eq!(ws.touch(20, 30, 20), Temperature::Cold);

        ws.remove(0, 10);
        assert_eq!(ws.touch(20, 30, 20), Temperature::Hot);
        assert_eq!(ws.len(), 2);
    }

    #[test]
    fn purge_range_on_empty_set() {
        let ws: WorkingSet<u64, 4> = WorkingSet::new();
        assert_eq!(ws.purge_range(), None);
    }

    #[test]
    fn degenerate_range_is_rejected() {
        let ws: WorkingSet<u64, 4> = WorkingSet::new();
        assert_eq!(ws.touch(10, 10, 10), Temperature::Cold);
        assert_eq!(ws.len(), 0);
    }

    #[test]
    fn range_not_containing_key_is_rejected() {
        let ws: WorkingSet<u64, 4> = WorkingSet::new();

        assert_eq!(ws.touch(0, 10, 10), Temperature::Cold);
        assert_eq!(ws.touch(0, 10, 42), Temperature::Cold);
        assert_eq!(ws.len(), 0);

        // But a tracked key stays hot whatever endpoints are proposed.
        assert_eq!(ws.touch(0, 10, 5), Temperature::Hot);
        assert_eq!(ws.touch(999, 1000, 5), Temperature::Hot);
    }
}
