//! # Ban Ledger and Violation Tracker
//!
//! Two independent records drive escalation:
//!
//! ```text
//!     violation:{id}  ViolationRecord  TTL = escalation window (7 days)
//!     ────────────────────────────────────────────────────────────────►
//!     ban:{id}        BanInfo          TTL = current ban duration
//!     ────────►               ──────────────►
//!     level 1                 level 2
//!
//!     ▲ violation             ▲ violation (ban expired, memory alive)
//! ```
//!
//! The ban expires on its own schedule; the violation record outlives it, so
//! an identity that offends again inside the escalation window resumes from
//! its previous level instead of starting over at level 1. The two records
//! are not linked: each carries its own TTL in the store.

use super::config::RateLimitConfig;

const MS_PER_SECOND: u64 = 1_000;
const MS_PER_MINUTE: u64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: u64 = 60 * MS_PER_MINUTE;
const MS_PER_DAY: u64 = 24 * MS_PER_HOUR;

/// Current ban state for one identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BanInfo {
    /// Escalation level, `1..=max_ban_level`.
    pub level: u32,
    /// End of the ban, ms since epoch.
    pub ban_until: u64,
    /// First violation in the current escalation memory.
    pub first_violation: u64,
    /// Violation that produced this ban.
    pub last_violation: u64,
    /// Violations counted in the current escalation memory.
    pub total_violations: u32,
}

impl BanInfo {
    /// Whether the ban still applies at `now`.
    #[inline]
    pub fn is_active(&self, now: u64) -> bool {
        now < self.ban_until
    }

    /// Milliseconds left on the ban at `now`.
    #[inline]
    pub fn remaining_ms(&self, now: u64) -> u64 {
        self.ban_until.saturating_sub(now)
    }

    /// Seconds left on the ban at `now`, rounded up.
    #[inline]
    pub fn remaining_secs(&self, now: u64) -> u64 {
        self.remaining_ms(now).div_ceil(MS_PER_SECOND)
    }

    /// Minutes left on the ban at `now`, rounded up.
    #[inline]
    pub fn remaining_minutes(&self, now: u64) -> u64 {
        self.remaining_ms(now).div_ceil(MS_PER_MINUTE)
    }
}

/// Escalation memory for one identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViolationRecord {
    /// Level reached by the most recent violation.
    pub count: u32,
    /// First violation inside the escalation window.
    pub first_violation: u64,
    /// Most recent violation.
    pub last_violation: u64,
}

/// Result of one escalation step: the records to write and the ban length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Escalation {
    pub(crate) ban: BanInfo,
    pub(crate) record: ViolationRecord,
    pub(crate) ban_duration_ms: u64,
}

/// Computes the next ban from the prior violation memory.
///
/// A missing record behaves as zero prior violations starting now. The new
/// level is one above the prior count, capped at `max_ban_level`.
pub(crate) fn escalate(
    prior: Option<ViolationRecord>,
    now: u64,
    config: &RateLimitConfig,
) -> Escalation {
    let prior = prior.unwrap_or(ViolationRecord {
        count: 0,
        first_violation: now,
        last_violation: now,
    });

    let level = prior.count.saturating_add(1).min(config.max_ban_level);
    let ban_duration_ms = config.ban_duration_ms(level);
    let ban_until = now.saturating_add(ban_duration_ms);

    Escalation {
        ban: BanInfo {
            level,
            ban_until,
            first_violation: prior.first_violation,
            last_violation: now,
            total_violations: level,
        },
        record: ViolationRecord {
            count: level,
            first_violation: prior.first_violation,
            last_violation: now,
        },
        ban_duration_ms,
    }
}

/// Renders a ban length in the coarsest whole unit that is at least one.
///
/// ```rust
/// use rampart::format_ban_duration;
///
/// assert_eq!(format_ban_duration(60_000), "1 minute");
/// assert_eq!(format_ban_duration(14_400_000), "4 hours");
/// assert_eq!(format_ban_duration(86_400_000), "1 day");
/// ```
pub fn format_ban_duration(duration_ms: u64) -> String {
    let (amount, unit) = if duration_ms >= MS_PER_DAY {
        (duration_ms / MS_PER_DAY, "day")
    } else if duration_ms >= MS_PER_HOUR {
        (duration_ms / MS_PER_HOUR, "hour")
    } else if duration_ms >= MS_PER_MINUTE {
        (duration_ms / MS_PER_MINUTE, "minute")
    } else {
        (duration_ms.div_ceil(MS_PER_SECOND).max(1), "second")
    };

    if amount == 1 {
        format!("1 {unit}")
    } else {
        format!("{amount} {unit}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_violation_is_level_one() {
        let config = RateLimitConfig::default();
        let step = escalate(None, 300, &config);

        assert_eq!(step.ban.level, 1);
        assert_eq!(step.ban.ban_until, 300 + 60_000);
        assert_eq!(step.ban.first_violation, 300);
        assert_eq!(step.ban.last_violation, 300);
        assert_eq!(step.ban.total_violations, 1);
        assert_eq!(step.record.count, 1);
        assert_eq!(step.ban_duration_ms, 60_000);
    }

    #[test]
    fn test_escalation_preserves_first_violation() {
        let config = RateLimitConfig::default();
        let prior = ViolationRecord {
            count: 2,
            first_violation: 100,
            last_violation: 5_000,
        };
        let step = escalate(Some(prior), 9_000, &config);

        assert_eq!(step.ban.level, 3);
        assert_eq!(step.ban.ban_until, 9_000 + 900_000);
        assert_eq!(step.ban.first_violation, 100);
        assert_eq!(step.record.first_violation, 100);
        assert_eq!(step.record.last_violation, 9_000);
    }

    #[test]
    fn test_level_caps_at_ceiling() {
        let config = RateLimitConfig::default();
        let prior = ViolationRecord {
            count: 6,
            first_violation: 0,
            last_violation: 0,
        };
        let step = escalate(Some(prior), 10, &config);

        assert_eq!(step.ban.level, 6);
        assert_eq!(step.ban_duration_ms, 86_400_000);
        assert_eq!(step.record.count, 6);
    }

    #[test]
    fn test_remaining_time_rounds_up() {
        let ban = BanInfo {
            level: 1,
            ban_until: 60_000,
            first_violation: 0,
            last_violation: 0,
            total_violations: 1,
        };

        assert!(ban.is_active(59_999));
        assert!(!ban.is_active(60_000));
        assert_eq!(ban.remaining_secs(59_001), 1);
        assert_eq!(ban.remaining_minutes(1), 1);
        assert_eq!(ban.remaining_minutes(0), 1);
        assert_eq!(ban.remaining_secs(70_000), 0);
    }

    #[test]
    fn test_format_ban_duration_units() {
        assert_eq!(format_ban_duration(60_000), "1 minute");
        assert_eq!(format_ban_duration(300_000), "5 minutes");
        assert_eq!(format_ban_duration(900_000), "15 minutes");
        assert_eq!(format_ban_duration(3_600_000), "1 hour");
        assert_eq!(format_ban_duration(14_400_000), "4 hours");
        assert_eq!(format_ban_duration(86_400_000), "1 day");
        assert_eq!(format_ban_duration(3 * 86_400_000), "3 days");
        assert_eq!(format_ban_duration(30_000), "30 seconds");
        assert_eq!(format_ban_duration(1), "1 second");
    }
}
