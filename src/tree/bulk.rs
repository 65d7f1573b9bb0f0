//! Bulk insertion and the purge path.
//!
//! A purge moves an entire hot range from the cache back into the tree.
//! Re-inserting those keys one by one would pay the leaf shift cost per key;
//! instead the sorted batch is merged into each destination leaf in a single
//! right-to-left pass, so every entry moves exactly once. Splits still
//! happen the ordinary way: whenever the batch outgrows a leaf (or crosses
//! its key boundary), one ordinary insert re-descends, triggers whatever
//! splits are needed, and the bulk loop resumes on the next leaf.

use std::cmp::Ordering;
use std::ptr;

use super::{HybridTree, restart_backoff};
use crate::key::IndexKey;
use crate::node::{LeafNode, NodeBase, NodeKind};
use crate::optlock::{Attempt, Restart};
use crate::tracing_helpers::debug_log;

impl<K, V, const WS_CAP: usize, const LEAF_CAP: usize, const INNER_CAP: usize>
    HybridTree<K, V, WS_CAP, LEAF_CAP, INNER_CAP>
where
    K: IndexKey,
    V: Copy + Send + Sync,
{
    /// Pre-load sorted data through the bulk path.
    ///
    /// `pairs` must be sorted ascending by key. Intended for construction
    /// time (benchmark bulk-load phases, restoring a snapshot); it is safe
    /// to run concurrently with other operations, but unlike [`Self::insert`]
    /// it writes straight to the tree, so a value cached for a currently hot
    /// key would keep shadowing the bulk-loaded one until the next purge.
    pub fn bulk_load(&self, pairs: &[(K, V)]) {
        debug_assert!(
            pairs.windows(2).all(|w| w[0].0 < w[1].0),
            "bulk_load input must be sorted by strictly ascending key",
        );
        self.bulk_insert(pairs);
    }

    /// Merge sorted `pairs` into the tree, batch by batch.
    pub(crate) fn bulk_insert(&self, pairs: &[(K, V)]) {
        let mut it: usize = 0;

        while it < pairs.len() {
            let (leaf_ptr, leaf_max) = self.bulk_traverse(pairs[it].0);
            // SAFETY: bulk_traverse returns a write-locked leaf of this tree.
            let leaf: &LeafNode<K, V, LEAF_CAP> = unsafe { Self::as_leaf(leaf_ptr) };

            // Take as many consecutive pairs as free slots allow, stopping
            // at the leaf's key boundary. Duplicate keys only shrink the
            // merge, so counting them against the free space is safe.
            let free: usize = LEAF_CAP - leaf.count();
            let mut end: usize = it;
            while end < pairs.len() && end - it < free {
                if leaf_max.is_some_and(|m| pairs[end].0 >= m) {
                    break;
                }
                end += 1;
            }

            Self::merge_into_leaf(leaf, &pairs[it..end]);
            // SAFETY: releasing the lock bulk_traverse acquired.
            unsafe { (*leaf_ptr).lock.write_unlock() };
            it = end;

            // The next pair needs a split or belongs past the boundary: one
            // ordinary insert makes room, then the loop re-traverses.
            if it < pairs.len() {
                self.insert_routed(pairs[it].0, pairs[it].1, true);
                it += 1;
            }
        }
    }

    fn bulk_traverse(&self, k: K) -> (*mut NodeBase, Option<K>) {
        let mut attempt: u32 = 0;
        loop {
            if attempt > 0 {
                restart_backoff(attempt);
            }
            attempt += 1;

            if let Ok(found) = self.bulk_traverse_attempt(k) {
                return found;
            }
        }
    }

    /// Descend to the leaf owning `k`, splitting full nodes on the way, and
    /// return it write-locked together with its exclusive upper key bound.
    ///
    /// The bound is the tightest separator passed on the way down — every
    /// key of the leaf compares `<= bound` and any key `>= bound` belongs to
    /// a different leaf. `None` on the rightmost spine, where no separator
    /// constrains the leaf from above.
    fn bulk_traverse_attempt(&self, k: K) -> Attempt<(*mut NodeBase, Option<K>)> {
        let mut node: *mut NodeBase = self.root_ptr();
        // SAFETY: nodes are never freed while the tree is shared.
        let mut version: u64 = unsafe { (*node).lock.read_lock()? };
        if !ptr::eq(node, self.root_ptr()) {
            return Err(Restart);
        }

        let mut parent: Option<(*mut NodeBase, u64)> = None;
        let mut subtree_max: Option<K> = None;

        // SAFETY: same validation discipline as the insert descent. The
        // separator feeding `subtree_max` is read before the level's
        // validation, so a validated descent implies a correct bound; later
        // splits can only loosen it, never invalidate it.
        unsafe {
            while (*node).kind() == NodeKind::Inner {
                let inner = Self::as_inner(node);

                if inner.is_full() {
                    return Err(self.split_child(parent, node, version));
                }

                if let Some((p, pv)) = parent {
                    (*p).lock.read_validate(pv)?;
                }
                parent = Some((node, version));

                let idx: usize = inner.lower_bound(k);
                if idx < inner.count() {
                    subtree_max = Some(inner.key(idx));
                }

                let child: *mut NodeBase = inner.child(idx);
                inner.base().lock.read_validate(version)?;

                version = (*child).lock.read_lock()?;
                node = child;
            }

            if Self::as_leaf(node).is_full() {
                return Err(self.split_child(parent, node, version));
            }

            (*node).lock.upgrade(version)?;

            if let Some((p, pv)) = parent {
                if (*p).lock.read_validate(pv).is_err() {
                    (*node).lock.write_unlock();
                    return Err(Restart);
                }
            }

            Ok((node, subtree_max))
        }
    }

    /// Merge the sorted `batch` into the write-locked `leaf`, from the
    /// right.
    ///
    /// Destination indices run from the final count downwards and stay `>=`
    /// both source cursors throughout, so each surviving entry is written
    /// exactly once and nothing is clobbered before it moves. A batch key
    /// equal to an existing key overwrites it in place (upsert) instead of
    /// duplicating it — the dual scan up front counts those so the final
    /// count is exact.
    fn merge_into_leaf(leaf: &LeafNode<K, V, LEAF_CAP>, batch: &[(K, V)]) {
        if batch.is_empty() {
            return;
        }

        let old_count: usize = leaf.count();

        let mut dups: usize = 0;
        {
            let mut i: usize = 0;
            let mut j: usize = 0;
            while i < old_count && j < batch.len() {
                match leaf.key(i).cmp(&batch[j].0) {
                    Ordering::Less => i += 1,
                    Ordering::Greater => j += 1,
                    Ordering::Equal => {
                        dups += 1;
                        i += 1;
                        j += 1;
                    }
                }
            }
        }

        let new_count: usize = old_count + batch.len() - dups;
        debug_assert!(new_count <= LEAF_CAP, "merge overflows the leaf");

        let mut dst: usize = new_count;
        let mut i: usize = old_count; // live existing entries are [0, i)
        let mut j: usize = batch.len(); // pending batch entries are [0, j)

        while j > 0 {
            let (bk, bv): (K, V) = batch[j - 1];

            if i > 0 && leaf.key(i - 1) > bk {
                dst -= 1;
                leaf.move_slot(i - 1, dst);
                i -= 1;
            } else if i > 0 && leaf.key(i - 1) == bk {
                dst -= 1;
                leaf.write_slot(dst, bk, bv);
                i -= 1;
                j -= 1;
            } else {
                dst -= 1;
                leaf.write_slot(dst, bk, bv);
                j -= 1;
            }
        }

        debug_assert_eq!(dst, i, "merge left a gap");
        leaf.base().set_count(new_count);
    }

    /// Evict the least-recently-used hot range.
    ///
    /// Caller holds the structure writer lock. The ordering is load-bearing:
    /// the range's entries are bulk-inserted into the tree *before* they are
    /// erased from the cache, so a concurrent lookup that misses the cache
    /// is guaranteed to find the key in the tree.
    pub(crate) fn purge(&self) {
        let Some((lo, hi)) = self.ws.purge_range() else {
            return;
        };

        let mut pairs: Vec<(K, V)> = self.hc.collect_range(&lo, &hi);
        pairs.sort_unstable_by(|a, b| a.0.cmp(&b.0));

        debug_log!(?lo, ?hi, entries = pairs.len(), "purging hot range");

        self.bulk_insert(&pairs);
        self.ws.remove(lo, hi);
        for (k, _) in &pairs {
            self.hc.erase(k);
        }
    }
}
