//! Optimistic lock for tree nodes.
//!
//! [`OptLock`] packs lock state, an obsolete marker, and a version counter
//! into a single 64-bit atomic word. Readers validate by version and never
//! block writers; writers hold the lock only for the handful of stores that
//! mutate a node.
//!
//! # Concurrency Model
//!
//! 1. Readers: call [`OptLock::read_lock`] to observe a version, perform the
//!    read, then call [`OptLock::read_validate`] with the observed version.
//!    A changed version means the snapshot may be torn and the operation must
//!    restart.
//! 2. Writers: call [`OptLock::upgrade`] with a previously observed version.
//!    A successful CAS grants exclusive rights until [`OptLock::write_unlock`],
//!    which also bumps the version so every in-flight reader fails validation.
//!
//! Every failure path surfaces as [`Restart`]. Callers drive a restart loop:
//! release any locks still held (deepest first) and retry the whole
//! operation from the root.
//!
//! # Word Layout
//!
//! ```text
//! bit 0      obsolete — the node has been unlinked; any observation is stale
//! bit 1      locked   — a writer holds the lock
//! bits 2..64 version  — bumped by every write_unlock
//! ```
//!
//! The layout is a deliberate contract: `write_unlock` is a single
//! `fetch_add(LOCKED_BIT)` that simultaneously clears the lock bit and
//! carries into the version field.

use std::sync::atomic::AtomicU64;

use crate::ordering::{CAS_FAILURE, LOCK_RMW, READ_ORD};


// ============================================================================
//  Restart
// ============================================================================

/// Control signal raised when an optimistic snapshot is stale.
///
/// Never surfaced to callers of the public API; always recovered inside an
/// operation's restart loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Restart;

/// Result of one attempt of an optimistically-locked operation.
pub type Attempt<T> = Result<T, Restart>;

// ============================================================================
//  OptLock
// ============================================================================

/// Obsolete marker: the node was removed from the tree.
const OBSOLETE_BIT: u64 = 0b01;

/// Lock bit: a writer holds the lock.
const LOCKED_BIT: u64 = 0b10;

/// A versioned optimistic lock.
///
/// # Example
///
/// ```rust
/// use hybtree::optlock::OptLock;
///
/// let lock = OptLock::new();
/// let v = lock.read_lock().unwrap();
///
/// // ... read node fields ...
///
/// assert!(lock.read_validate(v).is_ok());
/// ```
#[derive(Debug)]
pub struct OptLock {
    /// `{version:62, locked:1, obsolete:1}`, version starts at 1.
    word: AtomicU64,
}

impl OptLock {
    /// Create an unlocked, non-obsolete lock with version 1.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            word: AtomicU64::new(0b100),
        }
    }

    /// Check whether `version` carries the locked bit.
    #[inline]
    #[must_use]
    pub const fn is_locked(version: u64) -> bool {
        version & LOCKED_BIT == LOCKED_BIT
    }

    /// Check whether `version` carries the obsolete bit.
    #[inline]
    #[must_use]
    pub const fn is_obsolete(version: u64) -> bool {
        version & OBSOLETE_BIT == OBSOLETE_BIT
    }

    // ========================================================================
    //  Reader Protocol
    // ========================================================================

    /// Observe the current version for an optimistic read.
    ///
    /// Restarts if the word is locked or obsolete. The returned version must
    /// be handed back to [`OptLock::read_validate`] after the read.
    #[inline]
    pub fn read_lock(&self) -> Attempt<u64> {
        let version: u64 = self.word.load(READ_ORD);

        if Self::is_locked(version) || Self::is_obsolete(version) {
            std::hint::spin_loop();
            return Err(Restart);
        }

        Ok(version)
    }

    /// Validate that the version is still `version`.
    ///
    /// A successful validation proves that everything read since the matching
    /// [`OptLock::read_lock`] forms a coherent snapshot, because every writer
    /// bumps the version on release.
    #[inline]
    pub fn read_validate(&self, version: u64) -> Attempt<()> {
        if self.word.load(READ_ORD) == version {
            Ok(())
        } else {
            Err(Restart)
        }
    }

    // ========================================================================
    //  Writer Protocol
    // ========================================================================

    /// Upgrade an observed version to the write lock.
    ///
    /// On success the caller holds exclusive rights until
    /// [`OptLock::write_unlock`]; the returned value is the locked word.
    /// Fails (with [`Restart`]) if any writer intervened since `version` was
    /// observed.
    #[inline]
    pub fn upgrade(&self, version: u64) -> Attempt<u64> {
        match self
            .word
            .compare_exchange(version, version + LOCKED_BIT, LOCK_RMW, CAS_FAILURE)
        {
            Ok(_) => Ok(version + LOCKED_BIT),
            Err(_) => {
                std::hint::spin_loop();
                Err(Restart)
            }
        }
    }

    /// Observe the current version and immediately upgrade it.
    #[inline]
    pub fn write_lock(&self) -> Attempt<u64> {
        let version: u64 = self.read_lock()?;
        self.upgrade(version)
    }

    /// Release the write lock and bump the version.
    ///
    /// Must only be called by the writer that holds the lock. The carry out
    /// of the locked bit increments the version field, so every reader that
    /// observed the pre-lock version fails validation.
    #[inline]
    pub fn write_unlock(&self) {
        self.word.fetch_add(LOCKED_BIT, LOCK_RMW);
    }

    /// Release the write lock, bump the version, and mark the word obsolete.
    ///
    /// Used when the locked node is being unlinked from the structure; any
    /// reader still holding a pointer to it will restart on its next
    /// `read_lock` or `read_validate`.
    #[inline]
    pub fn write_unlock_obsolete(&self) {
        self.word.fetch_add(LOCKED_BIT + OBSOLETE_BIT, LOCK_RMW);
    }

    /// Raw word value, for assertions and diagnostics.
    #[inline]
    #[must_use]
    pub fn value(&self) -> u64 {
        self.word.load(READ_ORD)
    }
}

impl Default for OptLock {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
//  Tests
// ============================================================================
