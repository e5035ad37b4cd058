//! Sliding window limiter.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::config::RateLimiterConfig;
use crate::error::Result;

/// Margin added to every computed wait so a woken caller lands just past the
/// window boundary instead of exactly on it.
pub const WAKE_MARGIN: Duration = Duration::from_millis(10);

/// Admission gate that allows at most `max_calls` grants inside any trailing
/// window of `period`, delaying callers instead of rejecting them.
///
/// The limiter is shared by reference across tasks. Callers serialize only on
/// the short check-and-append step; waiting happens with the lock released, so
/// many callers can sleep at once and re-contend when they wake. Grant order
/// is not arrival order.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    /// Quota size
    max_calls: usize,
    /// Window length
    period: Duration,
    /// Grant times, oldest first
    calls: Mutex<VecDeque<Instant>>,
}

impl SlidingWindowLimiter {
    /// Create a limiter, rejecting `max_calls == 0` or a zero `period`.
    pub fn new(config: RateLimiterConfig) -> Result<Self> {
        let config = RateLimiterConfig::new(config.max_calls(), config.period())?;
        Ok(Self {
            max_calls: config.max_calls(),
            period: config.period(),
            calls: Mutex::new(VecDeque::with_capacity(config.max_calls())),
        })
    }

    /// Create a limiter from raw parameters, with the same checks as `new`.
    pub fn with_limits(max_calls: usize, period: Duration) -> Result<Self> {
        Self::new(RateLimiterConfig::new(max_calls, period)?)
    }

    /// Wait until a grant fits in the window, then record it.
    ///
    /// Dropping the returned future while it waits records nothing.
    pub async fn acquire(&self) {
        loop {
            let wait = match self.try_grant() {
                None => return,
                Some(wait) => wait,
            };

            debug!(
                wait_ms = wait.as_millis() as u64,
                max_calls = self.max_calls,
                "Quota exhausted, waiting for window to slide"
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Grant immediately if the window has room, without waiting.
    ///
    /// Returns `true` if a grant was recorded.
    pub fn try_acquire(&self) -> bool {
        self.try_grant().is_none()
    }

    /// Number of grants currently inside the window.
    pub fn in_flight(&self) -> usize {
        let mut calls = self.calls.lock();
        self.purge(&mut calls, Instant::now());
        calls.len()
    }

    /// How long `acquire` would wait right now. Zero when a slot is free.
    pub fn time_until_available(&self) -> Duration {
        let now = Instant::now();
        let mut calls = self.calls.lock();
        self.purge(&mut calls, now);
        if calls.len() < self.max_calls {
            Duration::ZERO
        } else {
            self.wait_for(&calls, now)
        }
    }

    /// Quota size.
    pub fn max_calls(&self) -> usize {
        self.max_calls
    }

    /// Window length.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// One pass of the admission check. `None` means granted, `Some(wait)`
    /// means the window is full and the caller should retry after `wait`.
    fn try_grant(&self) -> Option<Duration> {
        let now = Instant::now();
        let mut calls = self.calls.lock();
        self.purge(&mut calls, now);

        if calls.len() >= self.max_calls {
            return Some(self.wait_for(&calls, now));
        }

        calls.push_back(Instant::now());
        trace!(in_flight = calls.len(), "Call granted");
        None
    }

    /// Drop every grant that has aged out of the window ending at `now`.
    fn purge(&self, calls: &mut VecDeque<Instant>, now: Instant) {
        while let Some(&oldest) = calls.front() {
            if now.saturating_duration_since(oldest) >= self.period {
                calls.pop_front();
            } else {
                break;
            }
        }
    }

    fn wait_for(&self, calls: &VecDeque<Instant>, now: Instant) -> Duration {
        let age = calls
            .front()
            .map(|&oldest| now.saturating_duration_since(oldest))
            .unwrap_or(self.period);
        self.period.saturating_sub(age) + WAKE_MARGIN
    }
}
