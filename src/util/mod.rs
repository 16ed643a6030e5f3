//! Shared helpers

pub mod math;
pub mod rate_limit;
pub mod time;
pub mod timers;
