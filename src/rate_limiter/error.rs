//! Error types for limiter construction.
//!
//! Nothing on the request path returns an error: every call to
//! `check_rate_limit` or `is_banned` produces a decision value. Errors only
//! exist at construction time, where a structurally broken configuration is
//! rejected before it can produce wrong ban arithmetic.

use thiserror::Error;

/// A configuration that cannot be used to build a limiter.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// `window_ms` is zero.
    #[error("window_ms must be greater than 0")]
    ZeroWindow,

    /// `max_requests` is zero.
    #[error("max_requests must be greater than 0")]
    ZeroMaxRequests,

    /// `max_ban_level` does not index into `ban_level_durations`, or is zero.
    #[error("max_ban_level {max_ban_level} is not in 1..{durations} (ban_level_durations has {durations} entries)")]
    MaxBanLevelOutOfRange {
        /// Configured ceiling.
        max_ban_level: u32,
        /// Length of the duration table.
        durations: usize,
    },

    /// Level 0 means "not banned" and must carry a zero duration.
    #[error("ban_level_durations[0] must be 0")]
    NonZeroBaseDuration,

    /// A reachable ban level has no duration.
    #[error("ban duration for level {level} must be greater than 0")]
    ZeroBanDuration {
        /// Offending level.
        level: u32,
    },

    /// `escalation_window_ms` is zero.
    #[error("escalation_window_ms must be greater than 0")]
    ZeroEscalationWindow,

    /// `cleanup_interval_ms` is zero.
    #[error("cleanup_interval_ms must be greater than 0")]
    ZeroCleanupInterval,

    /// `max_cache_entries` is zero.
    #[error("max_cache_entries must be greater than 0")]
    ZeroCapacity,
}

/// Top-level error returned by fallible limiter constructors.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    /// The supplied configuration failed validation.
    #[error("invalid rate limit configuration: {0}")]
    Config(#[from] ConfigError),

    /// The background sweeper thread could not be started.
    #[error("failed to spawn sweeper thread: {0}")]
    Spawn(#[from] std::io::Error),
}
