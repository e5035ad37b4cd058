//! Callgate - client-side call-rate governor
//!
//! This crate lets many concurrent callers share one quota of operations per
//! time window. Callers that would exceed the quota are delayed, not
//! rejected. A jittered exponential backoff calculator and a retry driver
//! cover the failure path of the operations being governed.

pub mod config;
pub mod error;
pub mod ratelimit;

pub use crate::config::{GovernorConfig, RateLimiterConfig, RetryPolicyConfig};
pub use crate::error::{CallgateError, Result, RetryError};
pub use crate::ratelimit::{
    retry_with_backoff, AdmissionGate, BackoffCalculator, Governor, SlidingWindowLimiter,
};
