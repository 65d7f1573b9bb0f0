//! Insert protocol: eager top-down splitting plus the cache coordinator.
//!
//! A writer descends as a reader, splitting every full node it meets, so the
//! eventual leaf insert can never propagate a split back up and at most two
//! node locks are held at any instant. At the leaf the coordinator decides
//! between the tree and the hot cache:
//!
//! 1. Root-leaf and bulk-path inserts go straight to the leaf.
//! 2. Otherwise the structure read lock is taken. If the policy wants a
//!    purge, the lock is upgraded to the write side, the purge runs, and the
//!    whole insert restarts.
//! 3. Otherwise the leaf's estimated key range is offered to the policy; a
//!    hot verdict sends the value to the cache (race-free against purge by
//!    the read lock), a cold verdict falls back to the plain leaf insert.
//!
//! The structure lock is always released before any node write lock is
//! taken, so the two lock families never interleave in conflicting order.

use std::ptr;

use super::{HybridTree, restart_backoff};
use crate::key::IndexKey;
use crate::node::{NodeBase, NodeKind};
use crate::optlock::{Attempt, Restart};
use crate::policy::Temperature;
use crate::tracing_helpers::trace_log;

impl<K, V, const WS_CAP: usize, const LEAF_CAP: usize, const INNER_CAP: usize>
    HybridTree<K, V, WS_CAP, LEAF_CAP, INNER_CAP>
where
    K: IndexKey,
    V: Copy + Send + Sync,
{
    /// Insert `(k, v)`, overwriting any existing value for `k` (upsert).
    pub fn insert(&self, k: K, v: V) {
        self.insert_routed(k, v, false);
    }

    /// Insert with routing control: the bulk path pins inserts to the tree
    /// so a purge can never re-enter the cache it is draining.
    pub(crate) fn insert_routed(&self, k: K, v: V, in_bulk: bool) {
        let mut attempt: u32 = 0;
        loop {
            if attempt > 0 {
                restart_backoff(attempt);
            }
            attempt += 1;

            if self.insert_attempt(k, v, in_bulk).is_ok() {
                return;
            }
        }
    }

    fn insert_attempt(&self, k: K, v: V, in_bulk: bool) -> Attempt<()> {
        let mut node: *mut NodeBase = self.root_ptr();
        // SAFETY: nodes are never freed while the tree is shared.
        let mut version: u64 = unsafe { (*node).lock.read_lock()? };
        if !ptr::eq(node, self.root_ptr()) {
            return Err(Restart);
        }

        let mut parent: Option<(*mut NodeBase, u64)> = None;
        let mut range_est: Option<(K, K)> = None;
        let mut leftmost: bool = true;
        let mut rightmost: bool = true;

        // SAFETY: the descent validates every node version before trusting
        // what was read from it, exactly as in lookup.
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
                let count: usize = inner.count();

                if idx + 1 < count {
                    rightmost = false;
                } else if idx > 0 {
                    leftmost = false;
                }

                // Candidate hot range for the policy, re-derived at each
                // level so the leaf's parent wins. Edge descents fabricate a
                // bound, since the true one is infinite.
                range_est = Some(if rightmost {
                    let anchor: K = inner.key(if idx < count { idx } else { count - 1 });
                    (anchor, anchor.advance(LEAF_CAP))
                } else if leftmost {
                    let anchor: K = inner.key(idx);
                    (anchor.retreat(LEAF_CAP), anchor)
                } else {
                    (inner.key(idx), inner.key(idx + 1))
                });

                let child: *mut NodeBase = inner.child(idx);
                inner.base().lock.read_validate(version)?;

                version = (*child).lock.read_lock()?;
                node = child;
            }

            if Self::as_leaf(node).is_full() {
                return Err(self.split_child(parent, node, version));
            }

            let Some((mut lo, mut hi)) = range_est else {
                // Root leaf: no policy involvement, keep it simple.
                return self.plain_leaf_insert(parent, node, version, k, v);
            };

            if in_bulk {
                return self.plain_leaf_insert(parent, node, version, k, v);
            }

            // Re-anchor fabricated bounds around keys they missed; keys the
            // saturated key space still cannot cover stay cold.
            if k < lo {
                lo = k.retreat(LEAF_CAP);
                hi = k.advance(1);
            } else if k >= hi {
                lo = k;
                hi = k.advance(LEAF_CAP);
            }

            {
                let guard = self.structure.read();

                if self.ws.needs_purge() {
                    drop(guard);

                    let wguard = self.structure.write();
                    if self.ws.needs_purge() {
                        self.purge();
                    }
                    drop(wguard);

                    return Err(Restart);
                }

                // The policy ignores the proposed range when `k` is already
                // tracked, so a key with a cached value always comes back
                // hot here and never leaves a stale cache entry behind.
                if self.ws.touch(lo, hi, k) == Temperature::Hot {
                    trace_log!(?k, "hot insert absorbed by cache");
                    self.hc.insert(k, v);
                    return Ok(());
                }
            }

            self.plain_leaf_insert(parent, node, version, k, v)
        }
    }

    /// Upgrade the leaf to its write lock, re-validate the parent, insert.
    ///
    /// # Safety
    ///
    /// `leaf_ptr` points at a non-full leaf of this tree whose version
    /// `leaf_version` was observed by the caller; `parent`, if present, is
    /// the inner node the descent arrived through.
    unsafe fn plain_leaf_insert(
        &self,
        parent: Option<(*mut NodeBase, u64)>,
        leaf_ptr: *mut NodeBase,
        leaf_version: u64,
        k: K,
        v: V,
    ) -> Attempt<()> {
        // SAFETY: per contract; an upgrade success proves the leaf is
        // unchanged since it was observed non-full.
        unsafe {
            (*leaf_ptr).lock.upgrade(leaf_version)?;

            if let Some((p, pv)) = parent {
                if (*p).lock.read_validate(pv).is_err() {
                    (*leaf_ptr).lock.write_unlock();
                    return Err(Restart);
                }
            }

            Self::as_leaf(leaf_ptr).insert_sorted(k, v);
            (*leaf_ptr).lock.write_unlock();
        }

        Ok(())
    }

    /// Split a full node met during descent, then restart the operation.
    ///
    /// Locks parent before child; any upgrade failure releases whatever was
    /// acquired, in reverse order. After a successful split both locks are
    /// released and the caller redescends on the updated structure.
    ///
    /// # Safety
    ///
    /// `node` is a node of this tree observed full at `version`; `parent`,
    /// if present, is the inner node directly above it on the descent path.
    pub(super) unsafe fn split_child(
        &self,
        parent: Option<(*mut NodeBase, u64)>,
        node: *mut NodeBase,
        version: u64,
    ) -> Restart {
        // SAFETY: per contract; all structural edits happen between the
        // upgrades below and the unlocks at the end.
        unsafe {
            if let Some((p, pv)) = parent {
                if (*p).lock.upgrade(pv).is_err() {
                    return Restart;
                }
            }

            if (*node).lock.upgrade(version).is_err() {
                if let Some((p, _)) = parent {
                    (*p).lock.write_unlock();
                }
                return Restart;
            }

            if parent.is_none() && !ptr::eq(node, self.root_ptr()) {
                // A new root grew above this node while we descended.
                (*node).lock.write_unlock();
                return Restart;
            }

            let (new_node, sep): (*mut NodeBase, K) = match (*node).kind() {
                NodeKind::Leaf => {
                    let (right, sep) = Self::as_leaf(node).split();
                    (Box::into_raw(right).cast::<NodeBase>(), sep)
                }
                NodeKind::Inner => {
                    let (right, sep) = Self::as_inner(node).split();
                    (Box::into_raw(right).cast::<NodeBase>(), sep)
                }
            };

            trace_log!(?sep, "eager split");

            match parent {
                Some((p, _)) => Self::as_inner(p).insert(sep, new_node),
                None => self.make_root(sep, node, new_node),
            }

            (*node).lock.write_unlock();
            if let Some((p, _)) = parent {
                (*p).lock.write_unlock();
            }

            Restart
        }
    }
}
