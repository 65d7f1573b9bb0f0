//! Standard memory orderings for concurrent node access.
//!
//! These constants keep ordering usage consistent across the crate and make
//! the intent clear at each access point.

use std::sync::atomic::Ordering;

/// Ordering for reading node fields and the root pointer during optimistic
/// traversal. Pairs with a writer's Release stores.
pub const READ_ORD: Ordering = Ordering::Acquire;

/// Ordering for publishing node fields and the root pointer under lock.
/// Pairs with a reader's Acquire loads.
pub const WRITE_ORD: Ordering = Ordering::Release;

/// Ordering for lock-word read-modify-write operations. The lock word is both
/// an acquire point (upgrade) and a release point (unlock), so CAS and the
/// unlock increments use `AcqRel`.
pub const LOCK_RMW: Ordering = Ordering::AcqRel;

/// Ordering for a failed lock-word CAS. Only needs to observe the current
/// value for the retry decision.
pub const CAS_FAILURE: Ordering = Ordering::Acquire;

/// Ordering for accesses that carry no synchronization on their own, such as
/// the working-set recency stamps. Validity comes from a surrounding lock or
/// from version validation, never from these loads/stores.
pub const RELAXED: Ordering = Ordering::Relaxed;
