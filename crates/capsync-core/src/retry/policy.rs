use std::time::Duration;

use super::error::ErrorKind;
use crate::config::RetryConfig;

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Do not retry this error.
    NoRetry,
    /// Retry after the given delay.
    RetryAfter(Duration),
}

/// Escalating per-attempt timeouts with linear, capped backoff between attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Backoff after attempt k is k × step.
    pub backoff_step: Duration,
    /// Cap for generic retryable failures.
    pub backoff_cap: Duration,
    /// timeout(k) = base × growth^(k-1). Must be > 1 for strictly growing deadlines.
    pub timeout_growth: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff_step: Duration::from_millis(1_000),
            backoff_cap: Duration::from_millis(5_000),
            timeout_growth: 1.5,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(cfg: &RetryConfig) -> Self {
        let default = Self::default();
        let growth = if cfg.timeout_growth.is_finite() && cfg.timeout_growth > 1.0 {
            cfg.timeout_growth
        } else {
            tracing::warn!(
                growth = cfg.timeout_growth,
                "timeout_growth must be > 1, using {}",
                default.timeout_growth
            );
            default.timeout_growth
        };
        Self {
            backoff_step: Duration::from_millis(cfg.backoff_step_ms),
            backoff_cap: Duration::from_millis(cfg.backoff_cap_ms),
            timeout_growth: growth,
        }
    }

    /// Deadline for `attempt` (1-based), escalating from `base`.
    pub fn attempt_timeout(&self, base: Duration, attempt: u32) -> Duration {
        // Overflow to infinity saturates at Duration::MAX.
        let exp = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let factor = self.timeout_growth.powi(exp);
        Duration::try_from_secs_f64(base.as_secs_f64() * factor).unwrap_or(Duration::MAX)
    }

    /// Delay before attempt `attempt + 1`.
    ///
    /// Upstream-unavailable failures skip the cap so a restarting backend gets
    /// progressively more time.
    pub fn backoff(&self, attempt: u32, kind: ErrorKind) -> Duration {
        let raw = self.backoff_step.saturating_mul(attempt.max(1));
        if kind == ErrorKind::UpstreamTemporarilyUnavailable {
            raw
        } else {
            raw.min(self.backoff_cap)
        }
    }

    /// Decide what to do after `attempt` (1-based) failed with `kind`.
    pub fn decide(&self, attempt: u32, max_attempts: u32, kind: ErrorKind) -> RetryDecision {
        if attempt >= max_attempts.max(1) || !kind.is_retryable() {
            return RetryDecision::NoRetry;
        }
        RetryDecision::RetryAfter(self.backoff(attempt, kind))
    }
}
