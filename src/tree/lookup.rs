//! Optimistic point lookup and forward range scan.
//!
//! Both operations descend without taking any lock: each node's version is
//! observed before its fields are read and validated afterwards, with the
//! parent's version re-checked at every hand-off (lock coupling, minus the
//! locks). Any validation failure unwinds to the restart loop.

use std::ptr;

use super::{HybridTree, restart_backoff};
use crate::key::IndexKey;
use crate::node::{LeafNode, NodeBase, NodeKind};
use crate::optlock::{Attempt, Restart};

impl<K, V, const WS_CAP: usize, const LEAF_CAP: usize, const INNER_CAP: usize>
    HybridTree<K, V, WS_CAP, LEAF_CAP, INNER_CAP>
where
    K: IndexKey,
    V: Copy + Send + Sync,
{
    /// Look up the value for `k`.
    ///
    /// The hot cache is consulted first; a miss falls through to an
    /// optimistic descent of the tree. Lookups never block on writers and
    /// never touch the coordinator's structure lock — the purge protocol
    /// writes evicted entries into the tree before erasing them from the
    /// cache, so a cache miss is always authoritative.
    #[must_use]
    pub fn lookup(&self, k: K) -> Option<V> {
        if let Some(v) = self.hc.find(&k) {
            return Some(v);
        }

        let mut attempt: u32 = 0;
        loop {
            if attempt > 0 {
                restart_backoff(attempt);
            }
            attempt += 1;

            if let Ok(result) = self.lookup_attempt(k) {
                return result;
            }
        }
    }

    fn lookup_attempt(&self, k: K) -> Attempt<Option<V>> {
        let mut node: *mut NodeBase = self.root_ptr();
        // SAFETY: nodes are never freed while the tree is shared; see the
        // module docs of `node` for the read protocol.
        let mut version: u64 = unsafe { (*node).lock.read_lock()? };
        if !ptr::eq(node, self.root_ptr()) {
            return Err(Restart);
        }

        let mut parent: Option<(*mut NodeBase, u64)> = None;

        // SAFETY: as above; every pointer chased here is validated against
        // the version of the node it was read from before being trusted.
        unsafe {
            while (*node).kind() == NodeKind::Inner {
                let inner = Self::as_inner(node);

                if let Some((p, pv)) = parent {
                    (*p).lock.read_validate(pv)?;
                }
                parent = Some((node, version));

                let child: *mut NodeBase = inner.child(inner.lower_bound(k));
                inner.base().lock.read_validate(version)?;

                version = (*child).lock.read_lock()?;
                node = child;
            }

            let leaf: &LeafNode<K, V, LEAF_CAP> = Self::as_leaf(node);
            let pos: usize = leaf.lower_bound(k);

            let mut result: Option<V> = None;
            if pos < leaf.count() && leaf.key(pos) == k {
                result = Some(leaf.value(pos));
            }

            if let Some((p, pv)) = parent {
                (*p).lock.read_validate(pv)?;
            }
            (*node).lock.read_validate(version)?;

            Ok(result)
        }
    }

    /// Scan forward from the smallest key `>= k`, copying values into `out`.
    ///
    /// Returns the number of values written, which may be less than
    /// `out.len()` even when more matching entries exist — the scan stops at
    /// the end of the leaf it lands in. Callers wanting more repeat the call
    /// with the next boundary key until nothing is returned.
    ///
    /// The hot cache is not consulted: entries of a hot range that have not
    /// been purged yet are invisible to `scan`. Workloads that mix scans
    /// with hot-range writes should size `WS_CAP` accordingly or accept the
    /// lag.
    pub fn scan(&self, k: K, out: &mut [V]) -> usize {
        let mut attempt: u32 = 0;
        loop {
            if attempt > 0 {
                restart_backoff(attempt);
            }
            attempt += 1;

            if let Ok(copied) = self.scan_attempt(k, out) {
                return copied;
            }
        }
    }

    fn scan_attempt(&self, k: K, out: &mut [V]) -> Attempt<usize> {
        let mut node: *mut NodeBase = self.root_ptr();
        // SAFETY: as in `lookup_attempt`.
        let mut version: u64 = unsafe { (*node).lock.read_lock()? };
        if !ptr::eq(node, self.root_ptr()) {
            return Err(Restart);
        }

        let mut parent: Option<(*mut NodeBase, u64)> = None;

        // SAFETY: as in `lookup_attempt`; the copies into `out` are plain
        // `Copy` data and are only reported to the caller after validation.
        unsafe {
            while (*node).kind() == NodeKind::Inner {
                let inner = Self::as_inner(node);

                if let Some((p, pv)) = parent {
                    (*p).lock.read_validate(pv)?;
                }
                parent = Some((node, version));

                let child: *mut NodeBase = inner.child(inner.lower_bound(k));
                inner.base().lock.read_validate(version)?;

                version = (*child).lock.read_lock()?;
                node = child;
            }

            let leaf: &LeafNode<K, V, LEAF_CAP> = Self::as_leaf(node);
            let count: usize = leaf.count();
            let mut pos: usize = leaf.lower_bound(k);

            let mut copied: usize = 0;
            while pos < count && copied < out.len() {
                out[copied] = leaf.value(pos);
                copied += 1;
                pos += 1;
            }

            if let Some((p, pv)) = parent {
                (*p).lock.read_validate(pv)?;
            }
            (*node).lock.read_validate(version)?;

            Ok(copied)
        }
    }
}
