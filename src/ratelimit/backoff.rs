//! Jittered exponential backoff.

use std::time::Duration;

use rand::Rng;

use crate::config::RetryPolicyConfig;

/// Lower bound of the jitter factor.
pub const JITTER_MIN: f64 = 0.7;
/// Upper bound of the jitter factor.
pub const JITTER_MAX: f64 = 1.3;

/// Exponents past this make `2^attempt` infinite in `f64`, so the clamp wins.
const MAX_EXPONENT: u32 = 1100;

/// Computes how long to wait before retry number `attempt`.
///
/// Stateless apart from its configuration; share it freely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffCalculator {
    base_backoff: Duration,
    max_backoff: Duration,
}

impl BackoffCalculator {
    /// Create a calculator from a validated retry policy.
    pub fn new(policy: &RetryPolicyConfig) -> Self {
        Self {
            base_backoff: policy.base_backoff(),
            max_backoff: policy.max_backoff(),
        }
    }

    /// `min(base * 2^attempt, max)`, before jitter.
    pub fn raw_backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(MAX_EXPONENT) as i32;
        let raw = self.base_backoff.as_secs_f64() * 2f64.powi(exponent);
        let max = self.max_backoff.as_secs_f64();
        if raw >= max {
            self.max_backoff
        } else {
            Duration::from_secs_f64(raw)
        }
    }

    /// The raw backoff scaled by a factor drawn uniformly from
    /// `[JITTER_MIN, JITTER_MAX]` on every call.
    pub fn compute_backoff(&self, attempt: u32) -> Duration {
        let jitter = rand::thread_rng().gen_range(JITTER_MIN..=JITTER_MAX);
        let scaled = self.raw_backoff(attempt).as_secs_f64() * jitter;
        Duration::try_from_secs_f64(scaled).unwrap_or(Duration::MAX)
    }
}

impl Default for BackoffCalculator {
    fn default() -> Self {
        Self::new(&RetryPolicyConfig::default())
    }
}
