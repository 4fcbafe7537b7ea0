//! # Limiter Statistics
//!
//! Lifetime counters for the admission engine, readable at any time without
//! taking any identity lock.
//!
//! ```text
//!     Limiter Dashboard:
//!     ┌─────────────────────────────────────┐
//!     │  Decisions: 1200 allowed / 30 denied│
//!     │  Bans issued: 4                     │
//!     │  Store: 812 entries                 │
//!     │  Sweeper: 97 swept, 0 evicted       │
//!     └─────────────────────────────────────┘
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Relaxed lifetime counters updated on the request and sweep paths.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    allowed: AtomicU64,
    denied: AtomicU64,
    bans_issued: AtomicU64,
    swept: AtomicU64,
    evicted: AtomicU64,
}

impl Counters {
    #[inline]
    pub(crate) fn on_allowed(&self) {
        self.allowed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn on_denied(&self) {
        self.denied.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn on_ban_issued(&self) {
        self.bans_issued.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn on_swept(&self, n: u64) {
        self.swept.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn on_evicted(&self, n: u64) {
        self.evicted.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, entries: usize, max_entries: usize) -> LimiterStats {
        LimiterStats {
            allowed: self.allowed.load(Ordering::Relaxed),
            denied: self.denied.load(Ordering::Relaxed),
            bans_issued: self.bans_issued.load(Ordering::Relaxed),
            swept: self.swept.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            entries,
            max_entries,
        }
    }
}

/// Point-in-time view of the limiter's counters.
///
/// ## Metrics Explained
///
/// - **allowed / denied**: admission decisions since startup
/// - **bans_issued**: escalation steps taken (one per violation)
/// - **swept**: entries reclaimed by routine sweeps
/// - **evicted**: entries removed by forced eviction under capacity pressure
/// - **entries / max_entries**: current store size against the eviction trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimiterStats {
    /// Requests admitted.
    pub allowed: u64,
    /// Requests denied, including those denied by an active ban.
    pub denied: u64,
    /// Bans created or escalated.
    pub bans_issued: u64,
    /// Entries removed by routine sweeps.
    pub swept: u64,
    /// Entries removed by forced eviction.
    pub evicted: u64,
    /// Entries currently stored, expired ones included.
    pub entries: usize,
    /// Store size above which forced eviction runs.
    pub max_entries: usize,
}

impl LimiterStats {
    /// Fraction of decisions that were denials (0.0 to 1.0).
    pub fn denial_rate(&self) -> f64 {
        let total = self.allowed + self.denied;
        if total == 0 {
            0.0
        } else {
            self.denied as f64 / total as f64
        }
    }

    /// Whether the next sweep will evict instead of sweeping.
    pub fn is_over_capacity(&self) -> bool {
        self.entries > self.max_entries
    }

    /// Returns a human-readable summary of the statistics.
    pub fn summary(&self) -> String {
        format!(
            "Progressive Rate Limiter Stats:\n\
             ├─ Decisions:\n\
             │  ├─ Allowed: {}\n\
             │  ├─ Denied: {}\n\
             │  ├─ Denial Rate: {:.2}%\n\
             │  └─ Bans Issued: {}\n\
             └─ Store:\n\
                ├─ Entries: {}/{}\n\
                ├─ Swept: {}\n\
                └─ Evicted: {}",
            self.allowed,
            self.denied,
            self.denial_rate() * 100.0,
            self.bans_issued,
            self.entries,
            self.max_entries,
            self.swept,
            self.evicted
        )
    }
}

impl fmt::Display for LimiterStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}
