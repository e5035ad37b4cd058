//! Retry driver for operations guarded by an admission gate.

use std::future::Future;

use tracing::warn;

use super::backoff::BackoffCalculator;
use super::gate::AdmissionGate;
use crate::error::RetryError;

/// Run `operation` through `gate`, retrying failures.
///
/// Every attempt, including retries, passes the gate first. After a failed
/// attempt `n` the driver sleeps for `backoff.compute_backoff(n)` and tries
/// again, up to `max_retries` retries in total.
pub async fn retry_with_backoff<G, T, E, F, Fut>(
    gate: &G,
    backoff: &BackoffCalculator,
    max_retries: u32,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    G: AdmissionGate + ?Sized,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt: u32 = 0;
    loop {
        gate.admit().await;

        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_retries => {
                let delay = backoff.compute_backoff(attempt);
                warn!(
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Operation failed, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                return Err(RetryError::Exhausted {
                    attempts: attempt + 1,
                    last_error: e,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicyConfig;
    use crate::ratelimit::SlidingWindowLimiter;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    fn backoff() -> BackoffCalculator {
        let policy =
            RetryPolicyConfig::new(Duration::from_secs(1), Duration::from_secs(12), 4).unwrap();
        BackoffCalculator::new(&policy)
    }

    fn limiter() -> SlidingWindowLimiter {
        SlidingWindowLimiter::with_limits(100, Duration::from_secs(1)).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_success_returns_immediately() {
        let limiter = limiter();
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result: Result<&str, RetryError<String>> =
            retry_with_backoff(&limiter, &backoff(), 4, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok("done") }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.in_flight(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let limiter = limiter();
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result = retry_with_backoff(&limiter, &backoff(), 4, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(format!("throttled #{}", n))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Backoffs for attempts 0 and 1: at least 0.7s and 1.4s.
        assert!(start.elapsed() >= Duration::from_millis(2100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_after_max_retries() {
        let limiter = limiter();
        let calls = AtomicU32::new(0);

        let result: Result<(), RetryError<String>> =
            retry_with_backoff(&limiter, &backoff(), 2, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("unavailable".to_string()) }
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.attempts(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(err.into_inner(), "unavailable");
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_runs_once() {
        let limiter = limiter();
        let start = Instant::now();

        let result: Result<(), RetryError<&str>> =
            retry_with_backoff(&limiter, &backoff(), 0, || async { Err("nope") }).await;

        assert_eq!(result.unwrap_err().attempts(), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_attempt_passes_gate() {
        let limiter = limiter();
        let calls = AtomicU32::new(0);

        let _: Result<(), RetryError<&str>> = retry_with_backoff(&limiter, &backoff(), 1, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("nope") }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        // The retry's own grant is still inside the window.
        assert!(limiter.in_flight() >= 1);
    }
}
