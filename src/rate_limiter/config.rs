//! # Rate Limit Configuration
//!
//! This module defines the tunables of the engine: the sliding window, the
//! ban ladder, the escalation memory and the housekeeping limits.
//!
//! ## The Ban Ladder
//!
//! ```text
//!     Default escalation (index = ban level):
//!
//!     level 0 │ no ban
//!     level 1 │ ██                          1 minute
//!     level 2 │ ████                        5 minutes
//!     level 3 │ ██████                     15 minutes
//!     level 4 │ ████████                    1 hour
//!     level 5 │ ██████████                  4 hours
//!     level 6 │ ████████████                1 day   ◄── max_ban_level
//! ```
//!
//! Each violation inside the escalation window climbs one rung. Once the
//! ceiling is reached, further violations keep the ceiling's duration.
//!
//! ## Sources
//!
//! A configuration is either built in code (`Default` plus `with_*` builder
//! methods) or read once from named settings with [`RateLimitConfig::from_env`].
//! Settings that are missing, non-numeric or zero fall back to the documented
//! default; a configuration assembled in code is validated and rejected if it
//! is structurally broken.

use super::error::ConfigError;
use tracing::warn;

/// Environment variable for the window length in milliseconds.
pub const ENV_WINDOW_MS: &str = "RATE_LIMIT_WINDOW_MS";
/// Environment variable for admitted requests per window.
pub const ENV_MAX_REQUESTS: &str = "RATE_LIMIT_MAX_REQUESTS";
/// Environment variable for the escalation ceiling.
pub const ENV_MAX_BAN_LEVEL: &str = "MAX_BAN_LEVEL";
/// Environment variable for how long violation memory persists.
pub const ENV_ESCALATION_WINDOW_MS: &str = "BAN_ESCALATION_WINDOW_MS";
/// Environment variable for the sweeper period in milliseconds.
pub const ENV_CLEANUP_INTERVAL: &str = "CACHE_CLEANUP_INTERVAL";
/// Environment variable for the forced-eviction trigger.
pub const ENV_MAX_CACHE_ENTRIES: &str = "MAX_CACHE_ENTRIES";
/// Prefix of the per-level ban duration variables (`BAN_LEVEL_1` .. `BAN_LEVEL_6`).
pub const ENV_BAN_LEVEL_PREFIX: &str = "BAN_LEVEL_";

/// Number of ban levels that can be configured through named settings.
pub const CONFIGURABLE_BAN_LEVELS: u32 = 6;

/// Default ban durations in milliseconds, indexed by ban level.
pub const DEFAULT_BAN_LEVEL_DURATIONS: [u64; 7] =
    [0, 60_000, 300_000, 900_000, 3_600_000, 14_400_000, 86_400_000];

const DEFAULT_WINDOW_MS: u64 = 60_000;
const DEFAULT_MAX_REQUESTS: u32 = 50;
const DEFAULT_MAX_BAN_LEVEL: u32 = 6;
const DEFAULT_ESCALATION_WINDOW_MS: u64 = 7 * 24 * 60 * 60 * 1000;
const DEFAULT_CLEANUP_INTERVAL_MS: u64 = 300_000;
const DEFAULT_MAX_CACHE_ENTRIES: usize = 10_000;

/// Process-wide configuration for a [`ProgressiveRateLimiter`](crate::ProgressiveRateLimiter).
///
/// ```text
///     ┌────────────────────────────────────────┐
///     │ window_ms: 60_000                      │
///     │ max_requests: 50                       │
///     │                                        │
///     │ Result: 50 requests per rolling minute │
///     │         51st request starts a ban      │
///     └────────────────────────────────────────┘
/// ```
///
/// ## Examples
///
/// ```rust
/// use rampart::RateLimitConfig;
///
/// // Defaults: 50 requests per minute, six-level ladder up to one day
/// let config = RateLimitConfig::default();
/// assert!(config.validate().is_ok());
///
/// // A tighter window with a short ladder
/// let config = RateLimitConfig::new(1_000, 3)
///     .with_ban_levels(vec![0, 10_000, 60_000]);
/// assert_eq!(config.max_ban_level, 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Length of the sliding window in milliseconds.
    pub window_ms: u64,

    /// Requests admitted per window. The request that would exceed this
    /// count is a violation.
    pub max_requests: u32,

    /// Ban duration in milliseconds per level. Index 0 is "no ban" and must
    /// be zero.
    pub ban_level_durations: Vec<u64>,

    /// Highest reachable ban level. Must index into `ban_level_durations`.
    pub max_ban_level: u32,

    /// How long violation memory survives after the last violation.
    pub escalation_window_ms: u64,

    /// Sweeper period in milliseconds.
    pub cleanup_interval_ms: u64,

    /// Store size above which the sweeper evicts instead of sweeping.
    pub max_cache_entries: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: DEFAULT_WINDOW_MS,
            max_requests: DEFAULT_MAX_REQUESTS,
            ban_level_durations: DEFAULT_BAN_LEVEL_DURATIONS.to_vec(),
            max_ban_level: DEFAULT_MAX_BAN_LEVEL,
            escalation_window_ms: DEFAULT_ESCALATION_WINDOW_MS,
            cleanup_interval_ms: DEFAULT_CLEANUP_INTERVAL_MS,
            max_cache_entries: DEFAULT_MAX_CACHE_ENTRIES,
        }
    }
}

impl RateLimitConfig {
    /// Creates a configuration with a custom window and the default ban ladder.
    pub fn new(window_ms: u64, max_requests: u32) -> Self {
        Self {
            window_ms,
            max_requests,
            ..Self::default()
        }
    }

    /// Replaces the ban ladder. The ceiling moves to the last entry.
    pub fn with_ban_levels(mut self, durations_ms: Vec<u64>) -> Self {
        self.max_ban_level = durations_ms.len().saturating_sub(1) as u32;
        self.ban_level_durations = durations_ms;
        self
    }

    /// Caps escalation below the length of the ladder.
    pub fn with_max_ban_level(mut self, level: u32) -> Self {
        self.max_ban_level = level;
        self
    }

    /// Sets how long violation memory persists.
    pub fn with_escalation_window_ms(mut self, ms: u64) -> Self {
        self.escalation_window_ms = ms;
        self
    }

    /// Sets the sweeper period.
    pub fn with_cleanup_interval_ms(mut self, ms: u64) -> Self {
        self.cleanup_interval_ms = ms;
        self
    }

    /// Sets the forced-eviction trigger.
    pub fn with_max_cache_entries(mut self, entries: usize) -> Self {
        self.max_cache_entries = entries;
        self
    }

    /// Reads the configuration from the process environment.
    ///
    /// See [`RateLimitConfig::from_lookup`] for the fallback rules.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through an arbitrary name lookup.
    ///
    /// Every setting is parsed as a positive integer. A missing setting takes
    /// its default silently; a value that does not parse, or parses to zero,
    /// takes its default and logs a warning. `MAX_BAN_LEVEL` outside
    /// `1..=6` falls back to 6.
    ///
    /// # Example
    ///
    /// ```rust
    /// use rampart::RateLimitConfig;
    ///
    /// let config = RateLimitConfig::from_lookup(|name| match name {
    ///     "RATE_LIMIT_MAX_REQUESTS" => Some("100".to_string()),
    ///     "RATE_LIMIT_WINDOW_MS" => Some("not-a-number".to_string()),
    ///     _ => None,
    /// })
    /// .unwrap();
    ///
    /// assert_eq!(config.max_requests, 100);
    /// assert_eq!(config.window_ms, 60_000);
    /// ```
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut ban_level_durations = Vec::with_capacity(CONFIGURABLE_BAN_LEVELS as usize + 1);
        ban_level_durations.push(0);
        for level in 1..=CONFIGURABLE_BAN_LEVELS {
            let name = format!("{ENV_BAN_LEVEL_PREFIX}{level}");
            let default = DEFAULT_BAN_LEVEL_DURATIONS[level as usize];
            ban_level_durations.push(read_positive(&lookup, &name, default));
        }

        let mut max_ban_level = read_positive(
            &lookup,
            ENV_MAX_BAN_LEVEL,
            u64::from(DEFAULT_MAX_BAN_LEVEL),
        );
        if max_ban_level > u64::from(CONFIGURABLE_BAN_LEVELS) {
            warn!(
                "{} = {} exceeds the {} configurable levels, using {}",
                ENV_MAX_BAN_LEVEL, max_ban_level, CONFIGURABLE_BAN_LEVELS, DEFAULT_MAX_BAN_LEVEL
            );
            max_ban_level = u64::from(DEFAULT_MAX_BAN_LEVEL);
        }

        let max_requests = read_positive(&lookup, ENV_MAX_REQUESTS, u64::from(DEFAULT_MAX_REQUESTS));
        let max_requests = u32::try_from(max_requests).unwrap_or_else(|_| {
            warn!("{} = {} does not fit in u32, using {}", ENV_MAX_REQUESTS, max_requests, DEFAULT_MAX_REQUESTS);
            DEFAULT_MAX_REQUESTS
        });

        let max_cache_entries =
            read_positive(&lookup, ENV_MAX_CACHE_ENTRIES, DEFAULT_MAX_CACHE_ENTRIES as u64);

        let config = Self {
            window_ms: read_positive(&lookup, ENV_WINDOW_MS, DEFAULT_WINDOW_MS),
            max_requests,
            ban_level_durations,
            max_ban_level: max_ban_level as u32,
            escalation_window_ms: read_positive(
                &lookup,
                ENV_ESCALATION_WINDOW_MS,
                DEFAULT_ESCALATION_WINDOW_MS,
            ),
            cleanup_interval_ms: read_positive(
                &lookup,
                ENV_CLEANUP_INTERVAL,
                DEFAULT_CLEANUP_INTERVAL_MS,
            ),
            max_cache_entries: usize::try_from(max_cache_entries)
                .unwrap_or(DEFAULT_MAX_CACHE_ENTRIES),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for correctness.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if:
    /// - any of the window, request, escalation, cleanup or capacity limits is 0
    /// - `max_ban_level` is 0 or does not index into `ban_level_durations`
    /// - level 0 carries a duration
    /// - a level between 1 and `max_ban_level` has a zero duration
    ///
    /// # Example
    ///
    /// ```rust
    /// use rampart::RateLimitConfig;
    ///
    /// let config = RateLimitConfig::new(0, 10);  // Invalid!
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_ms == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if self.max_requests == 0 {
            return Err(ConfigError::ZeroMaxRequests);
        }

        let durations = self.ban_level_durations.len();
        if self.max_ban_level == 0 || self.max_ban_level as usize >= durations {
            return Err(ConfigError::MaxBanLevelOutOfRange {
                max_ban_level: self.max_ban_level,
                durations,
            });
        }
        if self.ban_level_durations[0] != 0 {
            return Err(ConfigError::NonZeroBaseDuration);
        }
        for level in 1..=self.max_ban_level {
            if self.ban_level_durations[level as usize] == 0 {
                return Err(ConfigError::ZeroBanDuration { level });
            }
        }

        if self.escalation_window_ms == 0 {
            return Err(ConfigError::ZeroEscalationWindow);
        }
        if self.cleanup_interval_ms == 0 {
            return Err(ConfigError::ZeroCleanupInterval);
        }
        if self.max_cache_entries == 0 {
            return Err(ConfigError::ZeroCapacity);
        }

        Ok(())
    }

    /// Ban duration for `level`, clamped to the ceiling.
    ///
    /// Only meaningful on a validated configuration.
    #[inline]
    pub(crate) fn ban_duration_ms(&self, level: u32) -> u64 {
        let level = level.min(self.max_ban_level) as usize;
        self.ban_level_durations.get(level).copied().unwrap_or(0)
    }
}

fn read_positive<F>(lookup: &F, name: &str, default: u64) -> u64
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name) else {
        return default;
    };

    match raw.trim().parse::<u64>() {
        Ok(value) if value > 0 => value,
        _ => {
            warn!("{} = {:?} is not a positive integer, using {}", name, raw, default);
            default
        }
    }
}
