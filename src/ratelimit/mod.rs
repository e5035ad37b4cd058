//! Rate limiting: the sliding window gate, backoff and retry helpers.

mod backoff;
mod gate;
mod retry;
mod window;

pub use backoff::{BackoffCalculator, JITTER_MAX, JITTER_MIN};
pub use gate::{AdmissionGate, Governor};
pub use retry::retry_with_backoff;
pub use window::{SlidingWindowLimiter, WAKE_MARGIN};
