//! Rate-limit window parsed from GitHub response headers
//!
//! GitHub reports the primary limit through `x-ratelimit-remaining` and
//! `x-ratelimit-reset` (epoch seconds) and secondary limits through
//! `retry-after`. `x-ratelimit-reset-after` (fractional seconds) is also
//! understood so proxies that advertise a relative reset work too.

use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use std::time::Duration;

pub const REMAINING: &str = "x-ratelimit-remaining";
pub const RESET: &str = "x-ratelimit-reset";
pub const RESET_AFTER: &str = "x-ratelimit-reset-after";
pub const RETRY_AFTER: &str = "retry-after";

/// Rate-limit information carried by one response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateLimitWindow {
    /// Calls left in the current window
    pub remaining: Option<u64>,
    /// Window reset as a Unix timestamp
    pub reset_at: Option<i64>,
    /// Seconds until the window resets
    pub reset_after: Option<f64>,
    /// Seconds the server asks us to wait
    pub retry_after: Option<u64>,
}

impl RateLimitWindow {
    /// Read the window from response headers
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
        };

        Self {
            remaining: get(REMAINING).and_then(|v| v.parse().ok()),
            reset_at: get(RESET).and_then(|v| v.parse().ok()),
            reset_after: get(RESET_AFTER)
                .and_then(|v| v.parse::<f64>().ok())
                .filter(|v| v.is_finite() && *v >= 0.0),
            retry_after: get(RETRY_AFTER).and_then(|v| v.parse().ok()),
        }
    }

    /// Whether the window has no calls left
    pub fn is_depleted(&self) -> bool {
        self.remaining == Some(0)
    }

    /// Whether a response with this status and window means "wait and retry"
    ///
    /// 429 always does. Any other failure counts when the window is depleted
    /// (GitHub answers 403 once the primary limit is used up). Successful
    /// responses never do: the request already went through.
    pub fn signals_exhaustion(&self, status: StatusCode) -> bool {
        if status == StatusCode::TOO_MANY_REQUESTS {
            return true;
        }
        !status.is_success() && self.is_depleted()
    }

    /// Time to wait before the next attempt
    ///
    /// Prefers `retry-after`, then `x-ratelimit-reset-after`, then the
    /// absolute reset compared with `now_unix`. Falls back to `fallback`
    /// when the response carries none of them. The result never exceeds
    /// `max_wait`.
    pub fn wait_duration(&self, now_unix: i64, fallback: Duration, max_wait: Duration) -> Duration {
        let wait = if let Some(secs) = self.retry_after {
            Duration::from_secs(secs)
        } else if let Some(secs) = self.reset_after {
            Duration::from_secs_f64(secs)
        } else if let Some(reset_at) = self.reset_at {
            Duration::from_secs(reset_at.saturating_sub(now_unix).max(0) as u64)
        } else {
            fallback
        };

        wait.min(max_wait)
    }
}
