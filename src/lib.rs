//! # Rampart - Progressive Rate Limiting for Rust
//!
//! A per-client request limiter that punishes repeat offenders harder. Each
//! client gets a sliding window of admitted requests; going over it earns a
//! temporary ban, and every further violation within the escalation window
//! climbs one rung up a ladder of longer bans.
//!
//! ## Progressive Bans
//!
//! ```text
//!     Client 203.0.113.7, limit 50 requests / minute:
//!
//!     10:00  req 1..50   ✅ allowed            window fills up
//!     10:00  req 51      ⛔ ban level 1         1 minute
//!     10:01  req 1..50   ✅ allowed            ban over, fresh window
//!     10:01  req 51      ⛔ ban level 2         5 minutes
//!     10:06  ...         ⛔ ban level 3        15 minutes
//!     ...
//!     quiet for 7 days   violation memory expires, next ban is level 1 again
//! ```
//!
//! ## Features
//!
//! - 🪟 **Sliding Window** - Exact per-request timestamps, no bucket edges
//! - 📈 **Escalating Bans** - Configurable ladder, capped at a ceiling level
//! - 🧠 **Violation Memory** - Escalation resets after a quiet period
//! - 🧹 **Background Sweeper** - Prunes stale state and evicts under pressure
//! - 🛡️ **Thread-Safe** - Per-identity decisions are atomic across threads
//! - 🌐 **Middleware Adapter** - Headers, 429 bodies and path scoping, framework-free
//!
//! ## Quick Start
//!
//! ### Basic Admission
//!
//! ```rust
//! use rampart::{ProgressiveRateLimiter, RateLimitConfig};
//!
//! // 100 requests per rolling minute per client, default ban ladder
//! let limiter = ProgressiveRateLimiter::new(RateLimitConfig::new(60_000, 100)).unwrap();
//!
//! let decision = limiter.check_rate_limit("203.0.113.7");
//! if decision.allowed {
//!     println!("✅ {} requests left in this window", decision.remaining);
//! } else {
//!     println!("⛔ {}", decision.message.unwrap_or_default());
//! }
//!
//! limiter.destroy();
//! ```
//!
//! ### Builder
//!
//! ```rust
//! use rampart::ProgressiveRateLimiterBuilder;
//!
//! let limiter = ProgressiveRateLimiterBuilder::new()
//!     .window_ms(10_000)                        // 10 second window
//!     .max_requests(20)                         // 20 requests per window
//!     .ban_levels(vec![0, 30_000, 120_000])     // two rungs: 30s, 2m
//!     .escalation_window_ms(3_600_000)          // forget after an hour
//!     .build();
//!
//! assert_eq!(limiter.config().max_ban_level, 2);
//! ```
//!
//! ### Environment Configuration
//!
//! ```rust,no_run
//! use rampart::ProgressiveRateLimiter;
//!
//! // Reads RATE_LIMIT_WINDOW_MS, RATE_LIMIT_MAX_REQUESTS, BAN_LEVEL_1..6, ...
//! let limiter = ProgressiveRateLimiter::from_env().unwrap();
//! ```
//!
//! ### Middleware
//!
//! ```rust
//! use rampart::{client_identity, Admission, AdmissionGate, PathScope, ProgressiveRateLimiter, RateLimitConfig};
//! use std::sync::Arc;
//!
//! let limiter = Arc::new(ProgressiveRateLimiter::new(RateLimitConfig::default()).unwrap());
//! let gate = AdmissionGate::new(limiter.clone(), PathScope::new(["/api/"]));
//!
//! let identity = client_identity(Some("198.51.100.23, 10.0.0.2"), None);
//! match gate.evaluate("/api/orders", &identity) {
//!     Admission::Unscoped => { /* call the handler untouched */ }
//!     Admission::Proceed { headers } => {
//!         for (name, value) in headers.to_pairs() {
//!             println!("{name}: {value}");
//!         }
//!     }
//!     Admission::Reject { status, body, .. } => {
//!         println!("{status} {}", body.to_json().unwrap());
//!     }
//! }
//!
//! limiter.destroy();
//! ```
//!
//! ## Architecture Overview
//!
//! ```text
//!                    ┌─────────────────────────┐
//!                    │   Your HTTP Server      │
//!                    └──────────┬──────────────┘
//!                               │
//!                    ┌──────────▼──────────────┐
//!                    │   AdmissionGate         │
//!                    ├─────────────────────────┤
//!                    │  • path scope           │
//!                    │  • X-RateLimit-* / 429  │
//!                    └──────────┬──────────────┘
//!                               │
//!                    ┌──────────▼──────────────┐
//!                    │ ProgressiveRateLimiter  │
//!                    ├─────────────────────────┤
//!                    │  • check_rate_limit()   │
//!                    │  • is_banned()          │
//!                    │  • destroy()            │
//!                    └──────────┬──────────────┘
//!                               │
//!                ┌──────────────┴───────────────┐
//!                │                               │
//!     ┌──────────▼──────────┐       ┌───────────▼──────────┐
//!     │   TtlStore          │       │   Sweeper thread     │
//!     ├─────────────────────┤       ├──────────────────────┤
//!     │ • rate:{id}         │ ◄──── │ • prune windows      │
//!     │ • ban:{id}          │       │ • drop expired bans  │
//!     │ • violation:{id}    │       │ • forced eviction    │
//!     └─────────────────────┘       └──────────────────────┘
//! ```
//!
//! ## Performance Characteristics
//!
//! | Operation | Time Complexity | Space Complexity |
//! |-----------|----------------|------------------|
//! | check_rate_limit() | O(max_requests) | O(max_requests) per identity |
//! | is_banned() | O(1) | O(1) |
//! | sweep() | O(entries × max_requests) | O(entries) key snapshot |
//!
//! ## Thread Safety
//!
//! `ProgressiveRateLimiter` is `Send + Sync`; share it with `Arc`. Two
//! concurrent calls for the same identity never both take the last slot of a
//! window, and never both escalate the same violation.
//!
//! ## Examples
//!
//! See the `demos/` directory for complete programs:
//! - `basic.rs` - Window, ban and escalation walkthrough
//! - `middleware.rs` - Path scoping, headers and 429 bodies

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    missing_debug_implementations
)]
#![forbid(unsafe_code)]

// Internal module
mod rate_limiter;

// Public re-exports
pub use rate_limiter::{
    client_identity, current_time_ms, format_ban_duration, iso8601, Admission, AdmissionGate,
    BanInfo, BanInfoBody, BanStatus, Clock, ConfigError, Error, LimiterStats, ManualClock,
    PathScope, ProgressiveRateLimiter, RateLimitConfig, RateLimitDecision, RateLimitExceeded,
    RateLimitHeaders, RateLimits, SweepReport, SystemClock, TtlStore, ViolationRecord,
    WindowRecord, CONFIGURABLE_BAN_LEVELS, DEFAULT_BAN_LEVEL_DURATIONS, ENV_BAN_LEVEL_PREFIX,
    ENV_CLEANUP_INTERVAL, ENV_ESCALATION_WINDOW_MS, ENV_MAX_BAN_LEVEL, ENV_MAX_CACHE_ENTRIES,
    ENV_MAX_REQUESTS, ENV_WINDOW_MS, HEADER_LIMIT, HEADER_REMAINING, HEADER_RESET,
    RATE_LIMIT_EXCEEDED, STATUS_TOO_MANY_REQUESTS,
};

/// A limiter wrapped in `Arc` for sharing between request handlers.
///
/// # Example
/// ```rust
/// use rampart::{ProgressiveRateLimiter, RateLimitConfig, SharedLimiter};
/// use std::sync::Arc;
///
/// let shared: SharedLimiter =
///     Arc::new(ProgressiveRateLimiter::new(RateLimitConfig::default()).unwrap());
///
/// let worker = shared.clone();
/// std::thread::spawn(move || {
///     worker.check_rate_limit("10.0.0.1");
/// })
/// .join()
/// .unwrap();
///
/// shared.destroy();
/// ```
pub type SharedLimiter = std::sync::Arc<ProgressiveRateLimiter>;

/// Version information for the crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Minimum supported Rust version.
///
/// This crate requires at least Rust 1.75.0 due to:
/// - `let ... else` in the sweeper and tests
/// - `u64::div_ceil`
/// - `BuildHasher::hash_one`
pub const MSRV: &str = "1.75.0";

/// Prelude module for convenient imports.
///
/// ```rust
/// use rampart::prelude::*;
/// ```
pub mod prelude {
    //! Common imports for typical admission-control code.
    //!
    //! # Example
    //! ```rust
    //! use rampart::prelude::*;
    //!
    //! let limiter = ProgressiveRateLimiterBuilder::new().max_requests(10).build();
    //! let decision: RateLimitDecision = limiter.check_rate_limit("client");
    //! assert!(decision.allowed);
    //! ```

    pub use crate::{
        client_identity, Admission, AdmissionGate, BanInfo, BanStatus, PathScope,
        ProgressiveRateLimiter, ProgressiveRateLimiterBuilder, RateLimitConfig,
        RateLimitDecision, SharedLimiter,
    };
}

/// Builder for limiters with non-default settings.
///
/// Every setter writes straight into a [`RateLimitConfig`]; nothing is
/// checked until [`build`](Self::build) or [`try_build`](Self::try_build).
///
/// # Example
///
/// ```rust
/// use rampart::{ConfigError, Error, ProgressiveRateLimiterBuilder};
///
/// let limiter = ProgressiveRateLimiterBuilder::new()
///     .window_ms(60_000)
///     .max_requests(100)
///     .cleanup_interval_ms(30_000)
///     .build();
/// limiter.destroy();
///
/// // try_build() reports problems instead of panicking
/// let result = ProgressiveRateLimiterBuilder::new().max_requests(0).try_build();
/// assert!(matches!(result, Err(Error::Config(ConfigError::ZeroMaxRequests))));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ProgressiveRateLimiterBuilder {
    config: RateLimitConfig,
}

impl ProgressiveRateLimiterBuilder {
    /// Creates a builder holding [`RateLimitConfig::default`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an existing configuration, such as one read from the
    /// environment.
    pub fn config(mut self, config: RateLimitConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the sliding window length in milliseconds.
    pub fn window_ms(mut self, ms: u64) -> Self {
        self.config.window_ms = ms;
        self
    }

    /// Sets the number of requests admitted per window.
    pub fn max_requests(mut self, max: u32) -> Self {
        self.config.max_requests = max;
        self
    }

    /// Replaces the ban ladder. Index 0 must be 0; the ceiling becomes the
    /// last index.
    pub fn ban_levels(mut self, durations_ms: Vec<u64>) -> Self {
        self.config = self.config.with_ban_levels(durations_ms);
        self
    }

    /// Caps escalation at `level`.
    pub fn max_ban_level(mut self, level: u32) -> Self {
        self.config.max_ban_level = level;
        self
    }

    /// Sets how long violation memory lasts after the latest violation.
    pub fn escalation_window_ms(mut self, ms: u64) -> Self {
        self.config.escalation_window_ms = ms;
        self
    }

    /// Sets the sweeper period in milliseconds.
    pub fn cleanup_interval_ms(mut self, ms: u64) -> Self {
        self.config.cleanup_interval_ms = ms;
        self
    }

    /// Sets the store size above which the sweeper evicts.
    pub fn max_cache_entries(mut self, entries: usize) -> Self {
        self.config.max_cache_entries = entries;
        self
    }

    /// Builds the limiter and starts its sweeper.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid or the sweeper thread cannot
    /// be spawned. Use `try_build()` to handle those cases.
    pub fn build(self) -> ProgressiveRateLimiter {
        match self.try_build() {
            Ok(limiter) => limiter,
            Err(e) => panic!("failed to build rate limiter: {e}"),
        }
    }

    /// Builds the limiter, returning an error instead of panicking.
    ///
    /// # Errors
    ///
    /// See [`ProgressiveRateLimiter::new`].
    pub fn try_build(self) -> Result<ProgressiveRateLimiter, Error> {
        ProgressiveRateLimiter::new(self.config)
    }

    /// Builds a limiter on `clock` without a background sweeper.
    ///
    /// # Errors
    ///
    /// Returns the validation error if the configuration is invalid.
    pub fn build_manual<C: Clock>(self, clock: C) -> Result<ProgressiveRateLimiter<C>, ConfigError> {
        ProgressiveRateLimiter::without_sweeper(self.config, clock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_basic_functionality() {
        let limiter = ProgressiveRateLimiterBuilder::new()
            .max_requests(10)
            .build_manual(ManualClock::new(1_000))
            .unwrap();

        for _ in 0..10 {
            assert!(limiter.check_rate_limit("client").allowed);
        }
        assert!(!limiter.check_rate_limit("client").allowed);

        let stats = limiter.stats();
        assert_eq!(stats.allowed, 10);
        assert_eq!(stats.denied, 1);
        assert_eq!(stats.bans_issued, 1);
    }

    #[test]
    fn test_builder() {
        let limiter = ProgressiveRateLimiterBuilder::new()
            .window_ms(5_000)
            .max_requests(7)
            .ban_levels(vec![0, 1_000, 2_000, 3_000])
            .max_ban_level(2)
            .escalation_window_ms(10_000)
            .cleanup_interval_ms(1_000)
            .max_cache_entries(500)
            .build();

        let config = limiter.config();
        assert_eq!(config.window_ms, 5_000);
        assert_eq!(config.max_requests, 7);
        assert_eq!(config.ban_level_durations, vec![0, 1_000, 2_000, 3_000]);
        assert_eq!(config.max_ban_level, 2);
        assert_eq!(config.escalation_window_ms, 10_000);
        assert_eq!(config.max_cache_entries, 500);
        assert!(limiter.is_sweeping());
        limiter.destroy();
    }

    #[test]
    fn test_builder_validation() {
        let result = ProgressiveRateLimiterBuilder::new().window_ms(0).try_build();
        assert!(matches!(result, Err(Error::Config(ConfigError::ZeroWindow))));

        let result = ProgressiveRateLimiterBuilder::new()
            .max_ban_level(9)
            .build_manual(ManualClock::default());
        assert!(matches!(
            result,
            Err(ConfigError::MaxBanLevelOutOfRange { max_ban_level: 9, .. })
        ));
    }

    #[test]
    #[should_panic(expected = "failed to build rate limiter")]
    fn test_build_panics_on_invalid_config() {
        ProgressiveRateLimiterBuilder::new().max_requests(0).build();
    }

    #[test]
    fn test_builder_from_config() {
        let config = RateLimitConfig::new(2_000, 4);
        let limiter = ProgressiveRateLimiterBuilder::new()
            .config(config.clone())
            .build_manual(ManualClock::default())
            .unwrap();
        assert_eq!(limiter.config(), &config);
    }

    #[test]
    fn test_thread_safety() {
        let limiter: SharedLimiter = Arc::new(
            ProgressiveRateLimiterBuilder::new()
                .max_requests(100)
                .build(),
        );
        let mut handles = vec![];

        for t in 0..10 {
            let limiter = limiter.clone();
            handles.push(thread::spawn(move || {
                let identity = format!("client-{}", t % 2);
                (0..40)
                    .filter(|_| limiter.check_rate_limit(&identity).allowed)
                    .count()
            }));
        }

        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        // Two identities, 200 attempts each, 100 admitted each
        assert_eq!(total, 200);
        limiter.destroy();
    }

    #[test]
    fn test_prelude_imports() {
        use crate::prelude::*;

        let _config = RateLimitConfig::default();
        let _scope = PathScope::new(["/api/"]);
        let _identity = client_identity(None, None);
        let _builder = ProgressiveRateLimiterBuilder::new();
    }

    #[test]
    fn test_constants() {
        assert!(!VERSION.is_empty());
        assert_eq!(MSRV, "1.75.0");
        assert_eq!(DEFAULT_BAN_LEVEL_DURATIONS[6], 86_400_000);
    }
}
