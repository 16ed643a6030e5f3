//! Rate limiting utilities

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

/// Binary input frames per second per session
pub const INPUT_RATE_LIMIT: u32 = 120;

/// JSON session commands per second per session
pub const COMMAND_RATE_LIMIT: u32 = 20;

/// Per-session rate limiter state
#[derive(Clone)]
pub struct SessionRateLimiter {
    input_limiter: Arc<Limiter>,
    command_limiter: Arc<Limiter>,
}

impl SessionRateLimiter {
    pub fn new(input_per_sec: u32, commands_per_sec: u32) -> Self {
        Self {
            input_limiter: create_limiter(input_per_sec),
            command_limiter: create_limiter(commands_per_sec),
        }
    }

    /// Check if a binary input frame is allowed (returns true if allowed)
    pub fn check_input(&self) -> bool {
        self.input_limiter.check().is_ok()
    }

    /// Check if a text command is allowed
    pub fn check_command(&self) -> bool {
        self.command_limiter.check().is_ok()
    }
}

impl Default for SessionRateLimiter {
    fn default() -> Self {
        Self::new(INPUT_RATE_LIMIT, COMMAND_RATE_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_quota_is_enforced_separately() {
        let limiter = SessionRateLimiter::new(100, 2);
        assert!(limiter.check_command());
        assert!(limiter.check_command());
        assert!(!limiter.check_command());
        // input budget untouched
        assert!(limiter.check_input());
    }
}
