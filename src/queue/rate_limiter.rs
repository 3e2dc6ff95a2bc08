//! # Rate Limiters
//!
//! Retry delay policies for [`WorkQueue::add_rate_limited`](super::WorkQueue::add_rate_limited).
//!
//! - [`ItemExponentialFailureRateLimiter`]: per-key `base * 2^failures`, capped.
//!   First failures come back quickly, persistent failures settle at the cap.
//! - [`BucketRateLimiter`]: overall token bucket shared by all keys, bounding
//!   the total retry rate when many keys fail at once.
//! - [`MaxOfRateLimiter`]: the largest delay of its members.
//!
//! [`default_controller_rate_limiter`] combines the first two:
//!
//! ```rust
//! use replica_controller::queue::rate_limiter::{ItemExponentialFailureRateLimiter, RateLimiter};
//! use replica_controller::resource::ResourceIdentity;
//! use std::time::Duration;
//!
//! let limiter = ItemExponentialFailureRateLimiter::new(Duration::from_millis(5), Duration::from_secs(1000));
//! let key = ResourceIdentity::new("ns", "app");
//! assert_eq!(limiter.when(&key), Duration::from_millis(5));
//! assert_eq!(limiter.when(&key), Duration::from_millis(10));
//! assert_eq!(limiter.when(&key), Duration::from_millis(20));
//! limiter.forget(&key);
//! assert_eq!(limiter.when(&key), Duration::from_millis(5));
//! ```

use crate::resource::ResourceIdentity;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Policy deciding how long a failed key waits before it is re-added
pub trait RateLimiter: Send + Sync + fmt::Debug {
    /// Delay before `key` may be retried. Records one more failure for it.
    fn when(&self, key: &ResourceIdentity) -> Duration;

    /// Clear the failure history of `key`
    fn forget(&self, key: &ResourceIdentity);

    /// Number of failures recorded for `key` since the last `forget`
    fn num_requeues(&self, key: &ResourceIdentity) -> u32;
}

/// Per-key exponential backoff: `base`, `2*base`, `4*base`, ... up to `max`
#[derive(Debug)]
pub struct ItemExponentialFailureRateLimiter {
    base: Duration,
    max: Duration,
    failures: Mutex<HashMap<ResourceIdentity, u32>>,
}

impl ItemExponentialFailureRateLimiter {
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: Mutex::new(HashMap::new()),
        }
    }
}

impl RateLimiter for ItemExponentialFailureRateLimiter {
    fn when(&self, key: &ResourceIdentity) -> Duration {
        let exponent = {
            let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
            let count = failures.entry(key.clone()).or_insert(0);
            let exponent = *count;
            *count = count.saturating_add(1);
            exponent
        };

        // Overflow of either the shift or the multiplication means we are past the cap
        1u32.checked_shl(exponent)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.max, |delay| delay.min(self.max))
    }

    fn forget(&self, key: &ResourceIdentity) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    fn num_requeues(&self, key: &ResourceIdentity) -> u32 {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
            .unwrap_or(0)
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last: Instant,
}

/// Overall token bucket: `burst` immediate retries, then `qps` per second
///
/// Each call reserves a token; when the bucket is empty the returned delay is
/// the time until the reserved token becomes available.
#[derive(Debug)]
pub struct BucketRateLimiter {
    qps: f64,
    burst: f64,
    bucket: Mutex<Bucket>,
}

impl BucketRateLimiter {
    #[must_use]
    pub fn new(qps: f64, burst: u32) -> Self {
        let burst = f64::from(burst.max(1));
        Self {
            qps: if qps > 0.0 { qps } else { 1.0 },
            burst,
            bucket: Mutex::new(Bucket {
                tokens: burst,
                last: Instant::now(),
            }),
        }
    }
}

impl RateLimiter for BucketRateLimiter {
    fn when(&self, _key: &ResourceIdentity) -> Duration {
        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(bucket.last).as_secs_f64();
        bucket.last = now;
        bucket.tokens = (bucket.tokens + elapsed * self.qps).min(self.burst);
        bucket.tokens -= 1.0;

        if bucket.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-bucket.tokens / self.qps)
        }
    }

    fn forget(&self, _key: &ResourceIdentity) {}

    fn num_requeues(&self, _key: &ResourceIdentity) -> u32 {
        0
    }
}

/// Returns the worst (longest) delay of all member limiters
#[derive(Debug)]
pub struct MaxOfRateLimiter {
    limiters: Vec<Box<dyn RateLimiter>>,
}

impl MaxOfRateLimiter {
    #[must_use]
    pub fn new(limiters: Vec<Box<dyn RateLimiter>>) -> Self {
        Self { limiters }
    }
}

impl RateLimiter for MaxOfRateLimiter {
    fn when(&self, key: &ResourceIdentity) -> Duration {
        // Every member must observe the failure, so no short-circuiting here
        self.limiters
            .iter()
            .map(|limiter| limiter.when(key))
            .fold(Duration::ZERO, Duration::max)
    }

    fn forget(&self, key: &ResourceIdentity) {
        for limiter in &self.limiters {
            limiter.forget(key);
        }
    }

    fn num_requeues(&self, key: &ResourceIdentity) -> u32 {
        self.limiters
            .iter()
            .map(|limiter| limiter.num_requeues(key))
            .max()
            .unwrap_or(0)
    }
}

/// Per-item exponential backoff combined with an overall token bucket
#[must_use]
pub fn default_controller_rate_limiter(
    base: Duration,
    max: Duration,
    qps: f64,
    burst: u32,
) -> MaxOfRateLimiter {
    MaxOfRateLimiter::new(vec![
        Box::new(ItemExponentialFailureRateLimiter::new(base, max)),
        Box::new(BucketRateLimiter::new(qps, burst)),
    ])
}
