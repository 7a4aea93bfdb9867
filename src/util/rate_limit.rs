//! Rate limiting for inbound session traffic

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Create a rate limiter with the specified requests per second
pub fn create_limiter(requests_per_second: u32) -> Arc<Limiter> {
    let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Per-session inbound frame limiter
#[derive(Clone)]
pub struct SessionRateLimiter {
    inbound: Arc<Limiter>,
}

impl SessionRateLimiter {
    pub fn new(frames_per_second: u32) -> Self {
        Self {
            inbound: create_limiter(frames_per_second),
        }
    }

    /// Check if an inbound frame is allowed (returns true if allowed)
    pub fn check_inbound(&self) -> bool {
        self.inbound.check().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_above_quota_is_rejected() {
        let limiter = SessionRateLimiter::new(5);
        let allowed = (0..20).filter(|_| limiter.check_inbound()).count();
        assert!(allowed >= 5);
        assert!(allowed < 20);
    }
}
