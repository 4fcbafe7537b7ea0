//! # Time Sources (clock.rs)
//!
//! Every decision the engine makes is a comparison between "now" and a stored
//! millisecond timestamp. This module provides the single place those
//! timestamps come from.
//!
//! ```text
//!     Clock implementations:
//!
//!     SystemClock ──► wall-clock epoch captured once,
//!                     advanced by a monotonic Instant
//!
//!     ManualClock ──► shared atomic counter, moved by
//!                     tests and simulations
//! ```
//!
//! Both the TTL store (lazy expiry) and the sweeper read the same clock, so a
//! test that advances a [`ManualClock`] moves both of them at once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

// Wall-clock epoch milliseconds at first use, advanced with a monotonic
// Instant so a system clock jump never moves ban expiries backwards.
static START_TIME_BASE: OnceLock<(Instant, u64)> = OnceLock::new();

/// Returns the current time in milliseconds since UNIX epoch.
///
/// # Example
///
/// ```rust
/// use rampart::current_time_ms;
///
/// let now = current_time_ms();
/// assert!(now > 0);
/// ```
#[inline(always)]
pub fn current_time_ms() -> u64 {
    let (start, base_ms) = START_TIME_BASE.get_or_init(|| {
        let epoch_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        (Instant::now(), epoch_ms)
    });
    base_ms.saturating_add(start.elapsed().as_millis() as u64)
}

/// Source of "now" for the engine, in milliseconds since UNIX epoch.
///
/// Implementors must be cheap to clone and thread-safe: the limiter hands a
/// clone to its store and to the background sweeper.
pub trait Clock: Clone + Send + Sync + 'static {
    /// Current time in milliseconds since UNIX epoch.
    fn now_ms(&self) -> u64;
}

/// Production clock backed by [`current_time_ms`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline(always)]
    fn now_ms(&self) -> u64 {
        current_time_ms()
    }
}

/// Controllable clock for tests and simulations.
///
/// Clones share the same underlying time, so advancing one handle is
/// observed by the limiter, its store and its sweeper.
///
/// # Example
///
/// ```rust
/// use rampart::{Clock, ManualClock};
///
/// let clock = ManualClock::new(1_000);
/// let observer = clock.clone();
///
/// clock.advance_ms(250);
/// assert_eq!(observer.now_ms(), 1_250);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_ms: Arc<AtomicU64>,
}

impl ManualClock {
    /// Creates a clock frozen at `start_ms`.
    pub fn new(start_ms: u64) -> Self {
        Self {
            now_ms: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    /// Moves time forward by `ms` milliseconds.
    pub fn advance_ms(&self, ms: u64) {
        self.now_ms.fetch_add(ms, Ordering::AcqRel);
    }

    /// Jumps to an absolute time.
    pub fn set_ms(&self, ms: u64) {
        self.now_ms.store(ms, Ordering::Release);
    }
}

impl Clock for ManualClock {
    #[inline(always)]
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::Acquire)
    }
}
