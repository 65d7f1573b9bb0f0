//! `HybridTree` — a concurrent B+tree with a range-scoped hot cache.
//!
//! The tree proper is a classic optimistic-lock-coupled B+tree: readers
//! descend lock-free and validate versions, writers hold at most two node
//! locks and split full nodes eagerly on the way down. Layered on top sits a
//! working-set policy ([`WorkingSet`]) that tracks up to `WS_CAP` hot key
//! ranges, and a hot cache ([`HotCache`]) that absorbs writes to those
//! ranges. When the policy evicts a range, its cached entries are bulk
//! merged back into the tree before they leave the cache, so every key is
//! retrievable from the cache or the tree at every moment in between.
//!
//! # Lock ordering
//!
//! Writers take node locks parent-before-child and release everything they
//! hold before retrying a restarted operation. The structure-wide
//! reader/writer lock (`structure`) orders cache-bound inserts against
//! purges; it is never held across a node write lock acquisition on the hot
//! path, and lookups never touch it at all.

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::AtomicPtr;

use parking_lot::RwLock;

use crate::cache::HotCache;
use crate::key::IndexKey;
use crate::node::{
    DEFAULT_INNER_CAP, DEFAULT_LEAF_CAP, InnerNode, LeafNode, NodeBase, NodeKind,
};
use crate::ordering::{READ_ORD, WRITE_ORD};
use crate::policy::WorkingSet;

mod bulk;
mod insert;
mod lookup;


/// Default number of hot ranges tracked by the working-set policy.
pub const DEFAULT_WS_CAP: usize = 10;

// ============================================================================
//  HybridTree
// ============================================================================

/// A thread-safe ordered map from `K` to `V`.
///
/// Point inserts, point lookups, and forward range scans may run from any
/// number of threads concurrently. Repeated insertion of a key overwrites
/// its value (upsert); deletion is not supported.
///
/// # Type Parameters
///
/// * `K` — key type, see [`IndexKey`]
/// * `V` — value type, any `Copy` data
/// * `WS_CAP` — hot-range capacity of the working-set policy
/// * `LEAF_CAP` / `INNER_CAP` — node fan-out; the defaults fill a 4 KiB page
///   for 8-byte keys and values, other widths pass
///   [`leaf_capacity`](crate::node::leaf_capacity) /
///   [`inner_capacity`](crate::node::inner_capacity) explicitly
///
/// # Example
///
/// ```rust
/// use hybtree::HybridTree;
///
/// let tree: HybridTree<u64, u64> = HybridTree::new();
/// tree.insert(7, 700);
/// assert_eq!(tree.lookup(7), Some(700));
/// assert_eq!(tree.lookup(8), None);
/// ```
pub struct HybridTree<
    K,
    V,
    const WS_CAP: usize = { DEFAULT_WS_CAP },
    const LEAF_CAP: usize = { DEFAULT_LEAF_CAP },
    const INNER_CAP: usize = { DEFAULT_INNER_CAP },
> where
    K: IndexKey,
    V: Copy + Send + Sync,
{
    /// The root node. Replaced only while holding the old root's write lock.
    root: AtomicPtr<NodeBase>,

    /// Hot-range admission and eviction policy.
    ws: WorkingSet<K, WS_CAP>,

    /// Cached entries for keys inside hot ranges.
    hc: HotCache<K, V>,

    /// Structure-wide lock: inserts that consult the policy hold the read
    /// side, a purge holds the write side. Lookups never take it.
    structure: RwLock<()>,

    _marker: PhantomData<(K, V)>,
}

// SAFETY: all shared node state is mutated under per-node write locks or
// read under version validation; the policy and cache are internally
// synchronized. K and V are plain copy data.
unsafe impl<K, V, const WS_CAP: usize, const LEAF_CAP: usize, const INNER_CAP: usize> Send
    for HybridTree<K, V, WS_CAP, LEAF_CAP, INNER_CAP>
where
    K: IndexKey,
    V: Copy + Send + Sync,
{
}
unsafe impl<K, V, const WS_CAP: usize, const LEAF_CAP: usize, const INNER_CAP: usize> Sync
    for HybridTree<K, V, WS_CAP, LEAF_CAP, INNER_CAP>
where
    K: IndexKey,
    V: Copy + Send + Sync,
{
}

impl<K, V, const WS_CAP: usize, const LEAF_CAP: usize, const INNER_CAP: usize>
    HybridTree<K, V, WS_CAP, LEAF_CAP, INNER_CAP>
where
    K: IndexKey,
    V: Copy + Send + Sync,
{
    /// Create an empty tree: a single empty leaf as root.
    #[must_use]
    pub fn new() -> Self {
        let root: *mut LeafNode<K, V, LEAF_CAP> = Box::into_raw(LeafNode::new());

        Self {
            root: AtomicPtr::new(root.cast::<NodeBase>()),
            ws: WorkingSet::new(),
            hc: HotCache::new(),
            structure: RwLock::new(()),
            _marker: PhantomData,
        }
    }

    /// Load the current root pointer.
    #[inline]
    pub(crate) fn root_ptr(&self) -> *mut NodeBase {
        self.root.load(READ_ORD)
    }

    // ========================================================================
    //  Node Casts
    // ========================================================================

    /// Reborrow a node pointer as a leaf.
    ///
    /// # Safety
    ///
    /// `node` must have been observed with `kind() == Leaf` and stem from
    /// this tree. Nodes are never freed while the tree is shared, so the
    /// reference stays valid for any caller-chosen lifetime within the
    /// tree's own.
    #[inline]
    pub(crate) unsafe fn as_leaf<'a>(node: *mut NodeBase) -> &'a LeafNode<K, V, LEAF_CAP> {
        debug_assert!(!node.is_null());
        // SAFETY: per contract; LeafNode is #[repr(C)] with NodeBase first.
        unsafe { &*node.cast::<LeafNode<K, V, LEAF_CAP>>() }
    }

    /// Reborrow a node pointer as an inner node.
    ///
    /// # Safety
    ///
    /// As [`Self::as_leaf`], with `kind() == Inner`.
    #[inline]
    pub(crate) unsafe fn as_inner<'a>(node: *mut NodeBase) -> &'a InnerNode<K, INNER_CAP> {
        debug_assert!(!node.is_null());
        // SAFETY: per contract; InnerNode is #[repr(C)] with NodeBase first.
        unsafe { &*node.cast::<InnerNode<K, INNER_CAP>>() }
    }

    // ========================================================================
    //  Root Publication
    // ========================================================================

    /// Publish a fresh inner root with `left` and `right` as children.
    ///
    /// Called from the split path while the caller holds the write lock on
    /// `left` (the old root), so no competing root replacement can race.
    pub(crate) fn make_root(&self, sep: K, left: *mut NodeBase, right: *mut NodeBase) {
        let inner: Box<InnerNode<K, INNER_CAP>> = InnerNode::new();
        inner.set_key(0, sep);
        inner.set_child(0, left);
        inner.set_child(1, right);
        inner.base().set_count(1);

        crate::tracing_helpers::debug_log!(?sep, "publishing new root");
        self.root.store(Box::into_raw(inner).cast::<NodeBase>(), WRITE_ORD);
    }

    // ========================================================================
    //  Introspection (tests and diagnostics)
    // ========================================================================

    /// Number of entries currently absorbed by the hot cache.
    #[must_use]
    pub fn cached_len(&self) -> usize {
        self.hc.len()
    }

    /// Number of hot ranges currently tracked by the policy.
    #[must_use]
    pub fn hot_range_count(&self) -> usize {
        self.ws.len()
    }

    /// Tree depth (1 for a lone root leaf). Quiescent callers only.
    #[must_use]
    pub fn depth(&self) -> usize {
        let mut depth: usize = 1;
        let mut node: *mut NodeBase = self.root_ptr();

        // SAFETY: quiescent access per the doc contract.
        unsafe {
            while (*node).kind() == NodeKind::Inner {
                node = Self::as_inner(node).child(0);
                depth += 1;
            }
        }

        depth
    }

    unsafe fn free_subtree(node: *mut NodeBase) {
        // SAFETY: exclusive access during drop; every node was allocated by
        // Box::into_raw with the concrete type its kind tag names.
        unsafe {
            match (*node).kind() {
                NodeKind::Leaf => {
                    drop(Box::from_raw(node.cast::<LeafNode<K, V, LEAF_CAP>>()));
                }
                NodeKind::Inner => {
                    let inner: &InnerNode<K, INNER_CAP> = Self::as_inner(node);
                    let children: Vec<*mut NodeBase> =
                        (0..=inner.count()).map(|i| inner.child(i)).collect();
                    for child in children {
                        Self::free_subtree(child);
                    }
                    drop(Box::from_raw(node.cast::<InnerNode<K, INNER_CAP>>()));
                }
            }
        }
    }
}

impl<K, V, const WS_CAP: usize, const LEAF_CAP: usize, const INNER_CAP: usize> Default
    for HybridTree<K, V, WS_CAP, LEAF_CAP, INNER_CAP>
where
    K: IndexKey,
    V: Copy + Send + Sync,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, const WS_CAP: usize, const LEAF_CAP: usize, const INNER_CAP: usize> Drop
    for HybridTree<K, V, WS_CAP, LEAF_CAP, INNER_CAP>
where
    K: IndexKey,
    V: Copy + Send + Sync,
{
    fn drop(&mut self) {
        let root: *mut NodeBase = *self.root.get_mut();

        // SAFETY: `&mut self` excludes all concurrent operations; K and V
        // are Copy so freeing nodes runs no user destructors.
        unsafe { Self::free_subtree(root) };
    }
}

impl<K, V, const WS_CAP: usize, const LEAF_CAP: usize, const INNER_CAP: usize> fmt::Debug
    for HybridTree<K, V, WS_CAP, LEAF_CAP, INNER_CAP>
where
    K: IndexKey,
    V: Copy + Send + Sync,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HybridTree")
            .field("ws", &self.ws)
            .finish_non_exhaustive()
    }
}

// ============================================================================
//  Restart Backoff
// ============================================================================

/// Back off between restart attempts: spin-pause for the first few, then
/// yield to the OS scheduler.
#[inline]
pub(crate) fn restart_backoff(attempt: u32) {
    if attempt > 3 {
        std::thread::yield_now();
    } else {
        std::hint::spin_loop();
    }
}
