//! Striped per-identity locks.
//!
//! Every decision is a read-check-write over several store entries. Two
//! requests for the same identity must not interleave inside that sequence,
//! or both could see "below limit" and both be admitted, or both escalate the
//! same ban. Requests for different identities should not wait on each other.
//!
//! ```text
//!     identity ──► ahash ──► stripe index ──► Mutex<()>
//!
//!     "10.0.0.1" ─┐
//!                 ├──► stripe 3   (same identity, same stripe)
//!     "10.0.0.1" ─┘
//!     "10.0.0.2" ────► stripe 17
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Stripes allocated per available core.
const STRIPES_PER_CORE: usize = 16;

/// Upper bound on the stripe table.
const MAX_STRIPES: usize = 1024;

/// Fixed table of mutexes selected by identity hash.
pub(crate) struct IdentityLocks {
    stripes: Box<[Mutex<()>]>,
    hasher: ahash::RandomState,
    mask: usize,
}

impl IdentityLocks {
    /// Sizes the table from the number of cores.
    pub(crate) fn new() -> Self {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(8);
        Self::with_stripes(cores.saturating_mul(STRIPES_PER_CORE))
    }

    /// Creates a table with `count` stripes, rounded up to a power of two.
    pub(crate) fn with_stripes(count: usize) -> Self {
        let count = count.clamp(1, MAX_STRIPES).next_power_of_two();
        let stripes = (0..count).map(|_| Mutex::new(())).collect::<Vec<_>>();

        Self {
            stripes: stripes.into_boxed_slice(),
            hasher: ahash::RandomState::new(),
            mask: count - 1,
        }
    }

    /// Blocks until the stripe owning `identity` is held.
    ///
    /// A panic inside another critical section does not wedge the identity:
    /// the guarded data is `()`, so a poisoned stripe is simply taken over.
    pub(crate) fn lock(&self, identity: &str) -> MutexGuard<'_, ()> {
        self.stripes[self.stripe_of(identity)]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    #[inline]
    fn stripe_of(&self, identity: &str) -> usize {
        (self.hasher.hash_one(identity) as usize) & self.mask
    }

    pub(crate) fn stripe_count(&self) -> usize {
        self.stripes.len()
    }
}

impl std::fmt::Debug for IdentityLocks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityLocks")
            .field("stripes", &self.stripe_count())
            .finish()
    }
}
