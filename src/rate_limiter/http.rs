//! # Middleware Adapter
//!
//! Turns admission decisions into the values an HTTP middleware sends back,
//! without depending on any web framework.
//!
//! ```text
//!     request ──► PathScope::applies_to(path)?
//!                    │ no ──────────────► Admission::Unscoped
//!                    │ yes
//!                    ▼
//!                 client_identity(forwarded-for, peer)
//!                    │
//!                    ▼
//!                 check_rate_limit(identity)
//!                    │ allowed ─────────► Admission::Proceed { X-RateLimit-* }
//!                    │ denied
//!                    ▼
//!                 Admission::Reject { 429, RateLimitExceeded JSON }
//! ```

use super::{
    ban::BanInfo,
    clock::{Clock, SystemClock},
    limiter::{ProgressiveRateLimiter, RateLimitDecision, RateLimits},
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::net::IpAddr;
use std::sync::Arc;

/// Header carrying the admitted requests per window.
pub const HEADER_LIMIT: &str = "X-RateLimit-Limit";
/// Header carrying the requests left in the current window.
pub const HEADER_REMAINING: &str = "X-RateLimit-Remaining";
/// Header carrying the window reset time (ISO-8601).
pub const HEADER_RESET: &str = "X-RateLimit-Reset";

/// Status code for a denied request.
pub const STATUS_TOO_MANY_REQUESTS: u16 = 429;
/// Error code in the body of a denied request.
pub const RATE_LIMIT_EXCEEDED: &str = "RATE_LIMIT_EXCEEDED";

const UNKNOWN_IDENTITY: &str = "unknown";

/// Formats ms since epoch as ISO-8601 UTC with millisecond precision.
pub fn iso8601(ms: u64) -> String {
    let ms = i64::try_from(ms).unwrap_or(i64::MAX);
    DateTime::<Utc>::from_timestamp_millis(ms)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Picks the identity for a request.
///
/// The first non-empty entry of a comma-separated forwarded-for header wins;
/// otherwise the peer address; otherwise `"unknown"`.
///
/// ```rust
/// use rampart::client_identity;
///
/// assert_eq!(client_identity(Some("203.0.113.7, 10.0.0.1"), None), "203.0.113.7");
/// assert_eq!(client_identity(None, Some("10.1.2.3".parse().unwrap())), "10.1.2.3");
/// ```
pub fn client_identity(forwarded_for: Option<&str>, remote_addr: Option<IpAddr>) -> String {
    forwarded_for
        .and_then(|header| header.split(',').next())
        .map(str::trim)
        .filter(|first| !first.is_empty())
        .map(str::to_string)
        .or_else(|| remote_addr.map(|addr| addr.to_string()))
        .unwrap_or_else(|| UNKNOWN_IDENTITY.to_string())
}

/// Allow-list of path prefixes the limiter applies to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathScope {
    prefixes: Vec<String>,
}

impl PathScope {
    /// Creates a scope from path prefixes such as `"/api/"`.
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether `path` starts with any configured prefix.
    pub fn applies_to(&self, path: &str) -> bool {
        self.prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }
}

/// `X-RateLimit-*` headers for an admitted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitHeaders {
    /// Admitted requests per window.
    pub limit: u32,
    /// Requests left in the window.
    pub remaining: u32,
    /// Window reset time, ISO-8601.
    pub reset: String,
}

impl RateLimitHeaders {
    /// Builds the headers from a decision and the limiter's limits.
    pub fn from_decision(decision: &RateLimitDecision, limits: RateLimits) -> Self {
        Self {
            limit: limits.max_requests,
            remaining: decision.remaining,
            reset: iso8601(decision.reset_time_ms),
        }
    }

    /// Header name/value pairs, ready to append to a response.
    pub fn to_pairs(&self) -> [(&'static str, String); 3] {
        [
            (HEADER_LIMIT, self.limit.to_string()),
            (HEADER_REMAINING, self.remaining.to_string()),
            (HEADER_RESET, self.reset.clone()),
        ]
    }
}

/// Ban details in a 429 body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BanInfoBody {
    /// Escalation level.
    pub level: u32,
    /// Violations in the current escalation memory.
    pub total_violations: u32,
    /// ISO-8601.
    pub first_violation: String,
    /// ISO-8601.
    pub last_violation: String,
    /// ISO-8601.
    pub ban_until: String,
    /// Seconds left on the ban.
    pub remaining_time: u64,
}

impl BanInfoBody {
    fn new(ban: &BanInfo, now: u64) -> Self {
        Self {
            level: ban.level,
            total_violations: ban.total_violations,
            first_violation: iso8601(ban.first_violation),
            last_violation: iso8601(ban.last_violation),
            ban_until: iso8601(ban.ban_until),
            remaining_time: ban.remaining_secs(now),
        }
    }
}

/// JSON body of a 429 response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitExceeded {
    /// Always `false`.
    pub success: bool,
    /// Explanation shown to the client.
    pub message: String,
    /// Always [`RATE_LIMIT_EXCEEDED`].
    pub error: &'static str,
    /// Present when the denial comes from a ban.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ban_info: Option<BanInfoBody>,
    /// Seconds until the client may retry.
    pub retry_after: u64,
}

impl RateLimitExceeded {
    /// Builds the body for a denied decision observed at `now`.
    pub fn from_decision(decision: &RateLimitDecision, now: u64) -> Self {
        Self {
            success: false,
            message: decision
                .message
                .clone()
                .unwrap_or_else(|| "Too many requests, please try again later.".to_string()),
            error: RATE_LIMIT_EXCEEDED,
            ban_info: decision.ban_info.as_ref().map(|ban| BanInfoBody::new(ban, now)),
            retry_after: decision.reset_time_ms.saturating_sub(now).div_ceil(1_000),
        }
    }

    /// Serializes the body.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// What the middleware should do with a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Path is outside the scope; pass through untouched.
    Unscoped,
    /// Admitted; attach the headers and call the wrapped handler.
    Proceed {
        /// Headers to add to the response.
        headers: RateLimitHeaders,
    },
    /// Denied; respond with `status` and `body`.
    Reject {
        /// Always 429.
        status: u16,
        /// Seconds until the client may retry.
        retry_after_secs: u64,
        /// JSON body.
        body: RateLimitExceeded,
    },
}

/// A limiter bound to a path scope.
///
/// # Example
///
/// ```rust
/// use rampart::{Admission, AdmissionGate, PathScope, ProgressiveRateLimiter, RateLimitConfig};
/// use std::sync::Arc;
///
/// let limiter = Arc::new(ProgressiveRateLimiter::new(RateLimitConfig::default()).unwrap());
/// let gate = AdmissionGate::new(limiter.clone(), PathScope::new(["/api/"]));
///
/// assert_eq!(gate.evaluate("/health", "203.0.113.7"), Admission::Unscoped);
/// assert!(matches!(gate.evaluate("/api/users", "203.0.113.7"), Admission::Proceed { .. }));
/// limiter.destroy();
/// ```
#[derive(Debug, Clone)]
pub struct AdmissionGate<C: Clock = SystemClock> {
    limiter: Arc<ProgressiveRateLimiter<C>>,
    scope: PathScope,
}

impl<C: Clock> AdmissionGate<C> {
    /// Binds `limiter` to `scope`.
    pub fn new(limiter: Arc<ProgressiveRateLimiter<C>>, scope: PathScope) -> Self {
        Self { limiter, scope }
    }

    /// Decides what to do with a request for `path` from `identity`.
    pub fn evaluate(&self, path: &str, identity: &str) -> Admission {
        if !self.scope.applies_to(path) {
            return Admission::Unscoped;
        }

        let decision = self.limiter.check_rate_limit(identity);
        if decision.allowed {
            return Admission::Proceed {
                headers: RateLimitHeaders::from_decision(&decision, self.limiter.limits()),
            };
        }

        let body = RateLimitExceeded::from_decision(&decision, self.limiter.now_ms());
        Admission::Reject {
            status: STATUS_TOO_MANY_REQUESTS,
            retry_after_secs: body.retry_after,
            body,
        }
    }

    /// The wrapped limiter.
    pub fn limiter(&self) -> &Arc<ProgressiveRateLimiter<C>> {
        &self.limiter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limiter::clock::ManualClock;
    use crate::rate_limiter::config::RateLimitConfig;
    use serde_json::json;

    // 2024-01-01T00:00:00.000Z
    const START: u64 = 1_704_067_200_000;

    fn gate() -> (AdmissionGate<ManualClock>, ManualClock) {
        let clock = ManualClock::new(START);
        let limiter =
            ProgressiveRateLimiter::without_sweeper(RateLimitConfig::new(60_000, 2), clock.clone())
                .unwrap();
        (
            AdmissionGate::new(Arc::new(limiter), PathScope::new(["/api/", "/auth"])),
            clock,
        )
    }

    #[test]
    fn test_iso8601_format() {
        assert_eq!(iso8601(START), "2024-01-01T00:00:00.000Z");
        assert_eq!(iso8601(START + 1_500), "2024-01-01T00:00:01.500Z");
        assert_eq!(iso8601(0), "1970-01-01T00:00:00.000Z");
    }

    #[test]
    fn test_client_identity_sources() {
        let peer: IpAddr = "192.0.2.1".parse().unwrap();
        assert_eq!(client_identity(Some(" 198.51.100.4 ,10.0.0.1"), Some(peer)), "198.51.100.4");
        assert_eq!(client_identity(Some(""), Some(peer)), "192.0.2.1");
        assert_eq!(client_identity(Some(" , 10.0.0.1"), Some(peer)), "192.0.2.1");
        assert_eq!(client_identity(None, None), "unknown");
    }

    #[test]
    fn test_path_scope() {
        let scope = PathScope::new(["/api/"]);
        assert!(scope.applies_to("/api/users"));
        assert!(!scope.applies_to("/apix"));
        assert!(!PathScope::default().applies_to("/api/users"));
    }

    #[test]
    fn test_proceed_headers() {
        let (gate, _) = gate();
        let Admission::Proceed { headers } = gate.evaluate("/api/posts", "a") else {
            panic!("expected proceed");
        };

        assert_eq!(headers.limit, 2);
        assert_eq!(headers.remaining, 1);
        assert_eq!(headers.reset, "2024-01-01T00:01:00.000Z");
        let pairs = headers.to_pairs();
        assert_eq!(pairs[0], (HEADER_LIMIT, "2".to_string()));
        assert_eq!(pairs[1], (HEADER_REMAINING, "1".to_string()));
    }

    #[test]
    fn test_unscoped_path_is_not_counted() {
        let (gate, _) = gate();
        for _ in 0..10 {
            assert_eq!(gate.evaluate("/public/logo.png", "a"), Admission::Unscoped);
        }
        assert_eq!(gate.limiter().stats().allowed, 0);
    }

    #[test]
    fn test_reject_body() {
        let (gate, clock) = gate();
        gate.evaluate("/api/x", "a");
        gate.evaluate("/api/x", "a");

        let Admission::Reject {
            status,
            retry_after_secs,
            body,
        } = gate.evaluate("/api/x", "a")
        else {
            panic!("expected reject");
        };
        assert_eq!(status, 429);
        assert_eq!(retry_after_secs, 60);

        let value: serde_json::Value = serde_json::from_str(&body.to_json().unwrap()).unwrap();
        assert_eq!(value["success"], json!(false));
        assert_eq!(value["error"], json!("RATE_LIMIT_EXCEEDED"));
        assert_eq!(value["retryAfter"], json!(60));
        assert_eq!(value["banInfo"]["level"], json!(1));
        assert_eq!(value["banInfo"]["totalViolations"], json!(1));
        assert_eq!(value["banInfo"]["banUntil"], json!("2024-01-01T00:01:00.000Z"));
        assert_eq!(value["banInfo"]["firstViolation"], json!("2024-01-01T00:00:00.000Z"));
        assert_eq!(value["banInfo"]["remainingTime"], json!(60));

        // Later denials report the shrinking remainder
        clock.advance_ms(45_200);
        let Admission::Reject { body, .. } = gate.evaluate("/auth/login", "a") else {
            panic!("expected reject");
        };
        assert_eq!(body.retry_after, 15);
        assert_eq!(body.ban_info.unwrap().remaining_time, 15);
    }

    #[test]
    fn test_body_without_ban_omits_field() {
        let decision = RateLimitDecision {
            allowed: false,
            remaining: 0,
            reset_time_ms: START + 2_000,
            ban_info: None,
            message: None,
        };
        let body = RateLimitExceeded::from_decision(&decision, START);
        let json = body.to_json().unwrap();
        assert!(!json.contains("banInfo"));
        assert_eq!(body.retry_after, 2);
        assert!(body.message.starts_with("Too many requests"));
    }
}
