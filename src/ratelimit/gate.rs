//! Admission gate trait and the shared governor instance.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::{GovernorConfig, RetryPolicyConfig};
use crate::error::{Result, RetryError};

use super::backoff::BackoffCalculator;
use super::retry::retry_with_backoff;
use super::window::SlidingWindowLimiter;

/// Trait for admission gates.
///
/// Passing the gate consumes one grant; nothing is handed back afterwards.
#[async_trait]
pub trait AdmissionGate: Send + Sync {
    /// Wait until the caller may proceed.
    async fn admit(&self);
}

#[async_trait]
impl AdmissionGate for SlidingWindowLimiter {
    async fn admit(&self) {
        self.acquire().await;
    }
}

#[async_trait]
impl<G: AdmissionGate + ?Sized> AdmissionGate for Arc<G> {
    async fn admit(&self) {
        (**self).admit().await;
    }
}

/// The process-wide governor for one quota domain.
///
/// Build it once at startup and clone it into every call site; clones share
/// the same window.
#[derive(Debug, Clone)]
pub struct Governor {
    limiter: Arc<SlidingWindowLimiter>,
    backoff: BackoffCalculator,
    retry: RetryPolicyConfig,
}

impl Governor {
    /// Build a governor from settings, failing on invalid values.
    pub fn new(config: &GovernorConfig) -> Result<Self> {
        let limits = config.rate_limiter()?;
        let retry = config.retry_policy()?;

        info!(
            max_calls = limits.max_calls(),
            period_ms = limits.period().as_millis() as u64,
            max_retries = retry.max_retries(),
            "Governor initialized"
        );

        Ok(Self {
            limiter: Arc::new(SlidingWindowLimiter::new(limits)?),
            backoff: BackoffCalculator::new(&retry),
            retry,
        })
    }

    /// Run `operation` once a grant is available and return its output.
    ///
    /// The grant is recorded on entry. Nothing happens when `operation`
    /// finishes, whether it succeeded or not.
    pub async fn rate_limited<F>(&self, operation: F) -> F::Output
    where
        F: Future,
    {
        self.limiter.acquire().await;
        operation.await
    }

    /// Run `operation` through the gate, backing off and retrying on error
    /// up to the configured `max_retries`.
    pub async fn run_with_retries<T, E, F, Fut>(
        &self,
        operation: F,
    ) -> std::result::Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: std::fmt::Display,
    {
        retry_with_backoff(
            self.limiter.as_ref(),
            &self.backoff,
            self.retry.max_retries(),
            operation,
        )
        .await
    }

    /// Wait for a grant without running anything.
    pub async fn acquire(&self) {
        self.limiter.acquire().await;
    }

    /// Delay before retry number `attempt`.
    pub fn compute_backoff(&self, attempt: u32) -> std::time::Duration {
        self.backoff.compute_backoff(attempt)
    }

    /// Advisory retry budget for calling code.
    pub fn max_retries(&self) -> u32 {
        self.retry.max_retries()
    }

    /// The shared limiter.
    pub fn limiter(&self) -> &Arc<SlidingWindowLimiter> {
        &self.limiter
    }

    /// The backoff calculator.
    pub fn backoff(&self) -> &BackoffCalculator {
        &self.backoff
    }
}
