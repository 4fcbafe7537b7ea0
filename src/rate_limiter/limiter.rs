//! # Progressive Rate Limiter
//!
//! The admission controller: the only component request-handling code talks
//! to. It combines a sliding-window counter with an escalating ban ladder.
//!
//! ## Decision Flow
//!
//! ```text
//!     check_rate_limit(id)
//!          │
//!          ▼
//!     ┌──────────────┐  active   ┌─────────────────────────────┐
//!     │ ban:{id}     │──────────►│ DENY  (remaining = 0,        │
//!     └──────┬───────┘           │        reset = ban_until)    │
//!            │ none / expired    └─────────────────────────────┘
//!            ▼
//!     ┌──────────────┐  below    ┌─────────────────────────────┐
//!     │ rate:{id}    │──────────►│ ALLOW (remaining = max - n)  │
//!     └──────┬───────┘  limit    └─────────────────────────────┘
//!            │ at limit
//!            ▼
//!     ┌──────────────┐           ┌─────────────────────────────┐
//!     │ violation:   │──────────►│ DENY  + new ban at level     │
//!     │ {id}         │ escalate  │        min(prior + 1, max)   │
//!     └──────────────┘           └─────────────────────────────┘
//! ```
//!
//! ## Concurrency
//!
//! Each call runs its whole read-decide-write sequence while holding the
//! identity's stripe in [`IdentityLocks`]. Calls for different identities
//! only contend when their identities hash to the same stripe.

use super::{
    ban::{escalate, format_ban_duration, BanInfo, ViolationRecord},
    clock::{Clock, SystemClock},
    config::RateLimitConfig,
    error::{ConfigError, Error},
    locks::IdentityLocks,
    metrics::{Counters, LimiterStats},
    store::TtlStore,
    sweeper::{SweepReport, SweeperHandle},
    window::WindowRecord,
};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

const RATE_PREFIX: &str = "rate:";
const BAN_PREFIX: &str = "ban:";
const VIOLATION_PREFIX: &str = "violation:";

/// Kind of record stored under a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryKind {
    Window,
    Ban,
    Violation,
}

impl EntryKind {
    fn prefix(self) -> &'static str {
        match self {
            Self::Window => RATE_PREFIX,
            Self::Ban => BAN_PREFIX,
            Self::Violation => VIOLATION_PREFIX,
        }
    }

    pub(crate) fn key(self, identity: &str) -> String {
        format!("{}{}", self.prefix(), identity)
    }

    /// Splits a store key into its kind and identity.
    pub(crate) fn parse(key: &str) -> Option<(Self, &str)> {
        [Self::Window, Self::Ban, Self::Violation]
            .into_iter()
            .find_map(|kind| key.strip_prefix(kind.prefix()).map(|id| (kind, id)))
    }
}

/// Value stored in the engine's TTL store.
#[derive(Debug, Clone)]
pub(crate) enum Entry {
    Window(WindowRecord),
    Ban(BanInfo),
    Violation(ViolationRecord),
}

/// Outcome of [`ProgressiveRateLimiter::check_rate_limit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Requests left in the current window; 0 when denied.
    pub remaining: u32,
    /// When the window (allowed) or the ban (denied) ends, ms since epoch.
    pub reset_time_ms: u64,
    /// Ban that caused the denial.
    pub ban_info: Option<BanInfo>,
    /// Human-readable explanation of a denial.
    pub message: Option<String>,
}

/// Outcome of [`ProgressiveRateLimiter::is_banned`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BanStatus {
    /// Whether a ban currently applies.
    pub banned: bool,
    /// The active ban.
    pub ban_info: Option<BanInfo>,
    /// Seconds left on the active ban, rounded up.
    pub remaining_seconds: Option<u64>,
}

/// The limits a middleware needs to build `X-RateLimit-*` headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimits {
    /// Admitted requests per window.
    pub max_requests: u32,
    /// Window length in milliseconds.
    pub window_ms: u64,
}

/// State shared between request handlers and the sweeper thread.
pub(crate) struct Engine<C: Clock> {
    pub(crate) config: RateLimitConfig,
    pub(crate) store: TtlStore<Entry, C>,
    pub(crate) locks: IdentityLocks,
    pub(crate) counters: Counters,
    /// Set while a sweep runs; a second sweep started meanwhile is skipped.
    pub(crate) sweep_in_progress: AtomicBool,
}

impl<C: Clock> Engine<C> {
    fn new(config: RateLimitConfig, clock: C) -> Self {
        Self {
            store: TtlStore::with_clock(clock),
            locks: IdentityLocks::new(),
            counters: Counters::default(),
            sweep_in_progress: AtomicBool::new(false),
            config,
        }
    }

    fn check(&self, identity: &str) -> RateLimitDecision {
        let _guard = self.locks.lock(identity);
        let now = self.store.now_ms();

        let ban_key = EntryKind::Ban.key(identity);
        if let Some(ban) = self.ban(&ban_key) {
            if ban.is_active(now) {
                self.counters.on_denied();
                return RateLimitDecision {
                    allowed: false,
                    remaining: 0,
                    reset_time_ms: ban.ban_until,
                    message: Some(format!(
                        "Too many requests. You are temporarily banned for {} more minute(s). Ban level: {}/{}",
                        ban.remaining_minutes(now),
                        ban.level,
                        self.config.max_ban_level
                    )),
                    ban_info: Some(ban),
                };
            }
            self.store.delete(&ban_key);
            debug!("Ban expired for {} (level {})", identity, ban.level);
        }

        let rate_key = EntryKind::Window.key(identity);
        let mut window = self.window(&rate_key).unwrap_or_default();
        window.prune(now, self.config.window_ms);

        match window.try_record(now, self.config.max_requests) {
            Some(count) => {
                self.store.set(
                    rate_key,
                    Entry::Window(window),
                    Duration::from_millis(self.config.window_ms),
                );
                self.counters.on_allowed();
                RateLimitDecision {
                    allowed: true,
                    remaining: self.config.max_requests - count,
                    reset_time_ms: now.saturating_add(self.config.window_ms),
                    ban_info: None,
                    message: None,
                }
            }
            None => self.handle_violation(identity, now),
        }
    }

    /// Escalates the identity's ban. Caller holds the identity's stripe.
    fn handle_violation(&self, identity: &str, now: u64) -> RateLimitDecision {
        let violation_key = EntryKind::Violation.key(identity);
        let step = escalate(self.violation(&violation_key), now, &self.config);

        self.store.set(
            EntryKind::Ban.key(identity),
            Entry::Ban(step.ban),
            Duration::from_millis(step.ban_duration_ms),
        );
        self.store.set(
            violation_key,
            Entry::Violation(step.record),
            Duration::from_millis(self.config.escalation_window_ms),
        );
        self.store.delete(&EntryKind::Window.key(identity));

        self.counters.on_denied();
        self.counters.on_ban_issued();
        debug!(
            "Banned {} at level {} for {}ms (until {})",
            identity, step.ban.level, step.ban_duration_ms, step.ban.ban_until
        );

        RateLimitDecision {
            allowed: false,
            remaining: 0,
            reset_time_ms: step.ban.ban_until,
            ban_info: Some(step.ban),
            message: Some(format!(
                "Rate limit exceeded. You have been temporarily banned for {}. Ban level: {}/{}",
                format_ban_duration(step.ban_duration_ms),
                step.ban.level,
                self.config.max_ban_level
            )),
        }
    }

    fn status(&self, identity: &str) -> BanStatus {
        let now = self.store.now_ms();
        match self.ban(&EntryKind::Ban.key(identity)) {
            Some(ban) if ban.is_active(now) => BanStatus {
                banned: true,
                ban_info: Some(ban),
                remaining_seconds: Some(ban.remaining_secs(now)),
            },
            _ => BanStatus {
                banned: false,
                ban_info: None,
                remaining_seconds: None,
            },
        }
    }

    pub(crate) fn ban(&self, key: &str) -> Option<BanInfo> {
        match self.store.get(key)? {
            Entry::Ban(ban) => Some(ban),
            _ => None,
        }
    }

    pub(crate) fn window(&self, key: &str) -> Option<WindowRecord> {
        match self.store.get(key)? {
            Entry::Window(window) => Some(window),
            _ => None,
        }
    }

    pub(crate) fn violation(&self, key: &str) -> Option<ViolationRecord> {
        match self.store.get(key)? {
            Entry::Violation(record) => Some(record),
            _ => None,
        }
    }
}

/// Per-identity sliding-window limiter with escalating bans.
///
/// ## Usage Patterns
///
/// ### Web Server Integration
///
/// ```rust
/// use rampart::{ProgressiveRateLimiter, RateLimitConfig};
/// use std::sync::Arc;
///
/// // Construct once at startup, share by reference
/// let limiter = Arc::new(ProgressiveRateLimiter::new(RateLimitConfig::default()).unwrap());
///
/// // In your request handler:
/// fn handle_request(limiter: &ProgressiveRateLimiter, client: &str) {
///     let decision = limiter.check_rate_limit(client);
///     if !decision.allowed {
///         // Return 429 Too Many Requests with decision.message
///         return;
///     }
///     // Process the request
/// }
///
/// handle_request(&limiter, "203.0.113.7");
/// limiter.destroy();
/// ```
///
/// ### Deterministic Time
///
/// ```rust
/// use rampart::{ManualClock, ProgressiveRateLimiter, RateLimitConfig};
///
/// let clock = ManualClock::new(0);
/// let limiter = ProgressiveRateLimiter::without_sweeper(
///     RateLimitConfig::new(1_000, 3),
///     clock.clone(),
/// )
/// .unwrap();
///
/// for _ in 0..3 {
///     assert!(limiter.check_rate_limit("client").allowed);
///     clock.advance_ms(100);
/// }
/// let denied = limiter.check_rate_limit("client");
/// assert!(!denied.allowed);
/// assert_eq!(denied.ban_info.unwrap().level, 1);
/// ```
pub struct ProgressiveRateLimiter<C: Clock = SystemClock> {
    engine: Arc<Engine<C>>,
    sweeper: Mutex<Option<SweeperHandle>>,
}

impl ProgressiveRateLimiter<SystemClock> {
    /// Creates a limiter on the system clock and starts its sweeper.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `config` fails validation and
    /// [`Error::Spawn`] if the sweeper thread cannot be started.
    pub fn new(config: RateLimitConfig) -> Result<Self, Error> {
        Self::with_clock(config, SystemClock)
    }

    /// Creates a limiter from the process environment.
    ///
    /// See [`RateLimitConfig::from_env`].
    pub fn from_env() -> Result<Self, Error> {
        Self::new(RateLimitConfig::from_env()?)
    }
}

impl<C: Clock> ProgressiveRateLimiter<C> {
    /// Creates a limiter reading time from `clock` and starts its sweeper.
    pub fn with_clock(config: RateLimitConfig, clock: C) -> Result<Self, Error> {
        let limiter = Self::without_sweeper(config, clock)?;
        let handle = SweeperHandle::spawn(limiter.engine.clone())?;
        *limiter.sweeper_slot() = Some(handle);
        Ok(limiter)
    }

    /// Creates a limiter with no background sweeper.
    ///
    /// Housekeeping only happens when [`ProgressiveRateLimiter::sweep`] is
    /// called, which makes this the constructor for deterministic tests.
    pub fn without_sweeper(config: RateLimitConfig, clock: C) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            engine: Arc::new(Engine::new(config, clock)),
            sweeper: Mutex::new(None),
        })
    }

    /// Decides whether a request from `identity` is admitted.
    ///
    /// Never fails: every outcome, including bans, is a decision value.
    pub fn check_rate_limit(&self, identity: &str) -> RateLimitDecision {
        self.engine.check(identity)
    }

    /// Reports whether `identity` is currently banned, without recording a
    /// request or touching escalation state.
    pub fn is_banned(&self, identity: &str) -> BanStatus {
        self.engine.status(identity)
    }

    /// Limits used to build response headers.
    pub fn limits(&self) -> RateLimits {
        RateLimits {
            max_requests: self.engine.config.max_requests,
            window_ms: self.engine.config.window_ms,
        }
    }

    /// The full configuration this limiter was built with.
    pub fn config(&self) -> &RateLimitConfig {
        &self.engine.config
    }

    /// Runs one sweep cycle immediately on the calling thread.
    pub fn sweep(&self) -> SweepReport {
        self.engine.sweep()
    }

    /// Current time on the limiter's clock, ms since epoch.
    pub fn now_ms(&self) -> u64 {
        self.engine.store.now_ms()
    }

    /// Snapshot of lifetime counters and store size.
    pub fn stats(&self) -> LimiterStats {
        self.engine
            .counters
            .snapshot(self.engine.store.len(), self.engine.config.max_cache_entries)
    }

    /// Whether a background sweeper is running.
    pub fn is_sweeping(&self) -> bool {
        self.sweeper_slot().is_some()
    }

    /// Drops every window, ban and violation record.
    pub fn clear(&self) {
        let count = self.engine.store.len();
        self.engine.store.clear();
        info!("Cleared all {} rate limit entries", count);
    }

    /// Stops the background sweeper and waits for it to exit.
    ///
    /// Once this returns the sweeper never runs again. Calling it on a limiter
    /// that has no sweeper, or a second time, does nothing. Dropping the
    /// limiter calls it as well.
    pub fn destroy(&self) {
        let handle = self.sweeper_slot().take();
        if let Some(handle) = handle {
            handle.stop();
        }
    }

    fn sweeper_slot(&self) -> std::sync::MutexGuard<'_, Option<SweeperHandle>> {
        self.sweeper.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    pub(crate) fn entry(&self, kind: EntryKind, identity: &str) -> Option<Entry> {
        self.engine.store.get(&kind.key(identity))
    }
}

impl<C: Clock> Drop for ProgressiveRateLimiter<C> {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl<C: Clock> std::fmt::Debug for ProgressiveRateLimiter<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressiveRateLimiter")
            .field("config", &self.engine.config)
            .field("entries", &self.engine.store.len())
            .field("locks", &self.engine.locks)
            .field("sweeping", &self.is_sweeping())
            .finish()
    }
}
