//! Retry policy and failure classification.
//!
//! Retrying is an explicit bounded loop in [`crate::client`]; this module only answers two
//! questions: "may this outcome be retried?" and "how long to wait before the next attempt?".

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Capped exponential backoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the initial attempt (1 => no retries).
    pub maximum_attempts: u32,
    /// Backoff before the first retry, in milliseconds.
    pub initial_interval_ms: u64,
    /// Backoff multiplier (typically >= 1.0).
    pub backoff_coefficient: f64,
    /// Upper bound for any single backoff, in milliseconds. Also caps `Retry-After`.
    pub maximum_interval_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            maximum_attempts: 3,
            initial_interval_ms: 200,
            backoff_coefficient: 2.0,
            maximum_interval_ms: 2_000,
        }
    }
}

impl RetryPolicy {
    /// A policy that performs exactly one attempt.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            maximum_attempts: 1,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.maximum_attempts.max(1)
    }

    /// Delay after attempt number `attempt` (1-based) failed.
    ///
    /// A server-provided `Retry-After` replaces the computed delay, but is still capped.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn delay_after(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let cap = Duration::from_millis(self.maximum_interval_ms);
        if let Some(hint) = retry_after {
            return hint.min(cap);
        }
        if attempt == 0 {
            return Duration::ZERO;
        }
        let coeff = self.backoff_coefficient;
        if !coeff.is_finite() || coeff <= 0.0 {
            return Duration::ZERO;
        }
        let exp = attempt.saturating_sub(1).min(30);
        let mult = coeff.powi(i32::try_from(exp).unwrap_or(30));
        if !mult.is_finite() || mult <= 0.0 {
            return cap;
        }
        let ms = self.initial_interval_ms as f64 * mult;
        if ms >= self.maximum_interval_ms as f64 {
            return cap;
        }
        Duration::from_millis(ms.round() as u64)
    }
}

/// What happened on a single attempt, reduced to what the classifier needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Non-2xx response.
    Status(u16),
    /// The attempt hit its timeout.
    TimedOut,
    /// Connect/IO failure before a response.
    Transport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    GiveUp,
}

/// Classify a failed attempt.
///
/// Network errors, timeouts, 5xx and 429 are transient; every other status is final.
#[must_use]
pub fn classify(outcome: AttemptOutcome) -> RetryDecision {
    match outcome {
        AttemptOutcome::TimedOut | AttemptOutcome::Transport => RetryDecision::Retry,
        AttemptOutcome::Status(429) => RetryDecision::Retry,
        AttemptOutcome::Status(s) if (500..=599).contains(&s) => RetryDecision::Retry,
        AttemptOutcome::Status(_) => RetryDecision::GiveUp,
    }
}

/// Parse a `Retry-After` header given in delta-seconds.
///
/// HTTP-date values are ignored; the regular backoff applies instead.
#[must_use]
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
