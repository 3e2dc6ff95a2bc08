//! # Queue
//!
//! The controller's work queue and the backoff policies behind its
//! rate-limited re-adds.

pub mod rate_limiter;
mod work_queue;

pub use rate_limiter::{default_controller_rate_limiter, RateLimiter};
pub use work_queue::{QueueItem, WorkQueue};
