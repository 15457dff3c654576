//! Token-bucket gate for the news search API.
//!
//! The bucket holds `capacity` tokens and regains one every `refill_period`.
//! [`RateLimiter::acquire`] polls the bucket in bounded naps rather than
//! spinning and gives up with [`RateLimitTimeout`] once `max_wait` has passed.
//! There is no fairness between contending callers; every caller either gets
//! a token or times out.

use crate::config::RateLimitConfig;
use crate::error::{ConfigError, RateLimitTimeout};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::Quota;
use std::num::NonZeroU32;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

type DirectLimiter = governor::RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

pub struct RateLimiter {
    bucket: DirectLimiter,
    poll_interval: Duration,
    max_wait: Duration,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("poll_interval", &self.poll_interval)
            .field("max_wait", &self.max_wait)
            .finish()
    }
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Result<Self, ConfigError> {
        Self::with_timing(
            config.capacity,
            config.refill_period(),
            config.poll_interval(),
            config.max_wait(),
        )
    }

    pub fn with_timing(
        capacity: u32,
        refill_period: Duration,
        poll_interval: Duration,
        max_wait: Duration,
    ) -> Result<Self, ConfigError> {
        let burst = NonZeroU32::new(capacity).ok_or(ConfigError::Invalid {
            field: "rate_limit.capacity",
            reason: "must be at least 1".into(),
        })?;
        let quota = Quota::with_period(refill_period)
            .ok_or(ConfigError::Invalid {
                field: "rate_limit.refill_secs",
                reason: "must be non-zero".into(),
            })?
            .allow_burst(burst);
        Ok(Self {
            bucket: governor::RateLimiter::direct(quota),
            poll_interval: poll_interval.max(Duration::from_millis(1)),
            max_wait,
        })
    }

    /// Wait for a token, or fail once `max_wait` has elapsed.
    pub async fn acquire(&self) -> Result<(), RateLimitTimeout> {
        let started = Instant::now();
        loop {
            if self.bucket.check().is_ok() {
                let waited = started.elapsed();
                if !waited.is_zero() {
                    debug!(?waited, "Rate limit token acquired after waiting");
                }
                return Ok(());
            }
            let waited = started.elapsed();
            if waited >= self.max_wait {
                warn!(?waited, "Rate limit wait ceiling reached");
                return Err(RateLimitTimeout { waited });
            }
            sleep(self.poll_interval.min(self.max_wait - waited)).await;
        }
    }
}
