//! # Rate Limiter Module
//!
//! Internal implementation of the progressive limiter, split by concern.
//!
//! ## Module Structure
//!
//! ```text
//!     rate_limiter/
//!     ├── mod.rs          (You are here - Module organization)
//!     ├── clock.rs        (Time source, real and manual)
//!     ├── config.rs       (Settings, environment loading, validation)
//!     ├── error.rs        (Error types)
//!     ├── store.rs        (Concurrent TTL key/value store)
//!     ├── locks.rs        (Striped per-identity locks)
//!     ├── window.rs       (Sliding-window request log)
//!     ├── ban.rs          (Ban records and escalation ladder)
//!     ├── limiter.rs      (Admission controller)
//!     ├── sweeper.rs      (Background cleanup and forced eviction)
//!     ├── metrics.rs      (Lifetime counters)
//!     └── http.rs         (Framework-agnostic middleware adapter)
//! ```
//!
//! ## Architecture Flow
//!
//! ```text
//!     HTTP request
//!          │
//!          ▼
//!     ┌──────────┐
//!     │  http    │ ◄── scope, identity, headers, 429 body
//!     └────┬─────┘
//!          │
//!          ▼
//!     ┌──────────┐        ┌──────────┐
//!     │ limiter  │ ◄───── │ sweeper  │ ◄── periodic, own thread
//!     └────┬─────┘        └────┬─────┘
//!          │ window / ban      │
//!          ▼                   ▼
//!     ┌─────────────────────────────┐
//!     │  store (rate:, ban:,        │
//!     │         violation: keys)    │
//!     └─────────────────────────────┘
//! ```

mod ban;
mod clock;
mod config;
mod error;
mod http;
mod limiter;
mod locks;
mod metrics;
mod store;
mod sweeper;
mod window;

/// Ban records, escalation memory and duration formatting
pub use ban::{format_ban_duration, BanInfo, ViolationRecord};

/// Time sources
pub use clock::{current_time_ms, Clock, ManualClock, SystemClock};

/// Configuration and the environment variables it reads
pub use config::{
    RateLimitConfig, CONFIGURABLE_BAN_LEVELS, DEFAULT_BAN_LEVEL_DURATIONS, ENV_BAN_LEVEL_PREFIX,
    ENV_CLEANUP_INTERVAL, ENV_ESCALATION_WINDOW_MS, ENV_MAX_BAN_LEVEL, ENV_MAX_CACHE_ENTRIES,
    ENV_MAX_REQUESTS, ENV_WINDOW_MS,
};

/// Error types
pub use error::{ConfigError, Error};

/// Middleware adapter
pub use http::{
    client_identity, iso8601, Admission, AdmissionGate, BanInfoBody, PathScope, RateLimitExceeded,
    RateLimitHeaders, HEADER_LIMIT, HEADER_REMAINING, HEADER_RESET, RATE_LIMIT_EXCEEDED,
    STATUS_TOO_MANY_REQUESTS,
};

/// The admission controller and its result types
pub use limiter::{BanStatus, ProgressiveRateLimiter, RateLimitDecision, RateLimits};

/// Statistics for observability
pub use metrics::LimiterStats;

/// Generic expiring store
pub use store::TtlStore;

/// Sweep results
pub use sweeper::SweepReport;

/// Sliding-window request log
pub use window::WindowRecord;
