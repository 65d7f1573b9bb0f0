//! # hybtree
//!
//! A concurrent, in-memory ordered index: a B+tree under Optimistic Lock
//! Coupling, augmented with a bounded set of LRU-managed hot key ranges
//! whose writes are absorbed by a concurrent cache.
//!
//! ## Design
//!
//! - Readers descend lock-free, validating a per-node version word at every
//!   hand-off; writers hold at most two fine-grained node locks and split
//!   full nodes eagerly on the way down.
//! - A working-set policy tracks up to `N` disjoint hot ranges. Inserts that
//!   land in a hot range go to the hot cache instead of the tree; when the
//!   policy evicts a range, its entries are bulk merged back into the tree
//!   before they leave the cache.
//! - Every key ever inserted is retrievable from the cache or the tree (or
//!   both) at every observable moment, across arbitrary interleavings of
//!   inserts, lookups, and purges.
//!
//! ## Example
//!
//! ```rust
//! use hybtree::HybridTree;
//!
//! let tree: HybridTree<u64, u64> = HybridTree::new();
//! tree.insert(1, 10);
//! tree.insert(2, 20);
//!
//! assert_eq!(tree.lookup(1), Some(10));
//!
//! let mut out = [0u64; 8];
//! let n = tree.scan(1, &mut out);
//! assert!(n >= 1);
//! ```

pub mod cache;
pub mod key;
pub mod node;
pub mod optlock;
pub mod ordering;
pub mod policy;
pub mod rangemap;
pub mod tree;

pub(crate) mod tracing_helpers;

pub use key::IndexKey;
pub use policy::{Temperature, WorkingSet};
pub use tree::{DEFAULT_WS_CAP, HybridTree};
