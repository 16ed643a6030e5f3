//! Time utilities for the simulation loops

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Tick rate defaults
pub const PHYSICS_HZ: u32 = 60; // fixed physics steps per second
pub const TICK_HZ: u32 = 30; // gameplay ticks / snapshots per second

/// Length of one tick at the given rate (in seconds)
pub fn step_secs(hz: u32) -> f64 {
    1.0 / hz.max(1) as f64
}

/// Seconds elapsed between two instants, never negative
pub fn secs_between(earlier: Instant, later: Instant) -> f64 {
    later.saturating_duration_since(earlier).as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_secs_guards_zero_rate() {
        assert_eq!(step_secs(0), 1.0);
        assert!((step_secs(PHYSICS_HZ) - 1.0 / 60.0).abs() < 1e-12);
    }

    #[test]
    fn secs_between_saturates() {
        let a = Instant::now();
        let b = a + Duration::from_millis(250);
        assert!((secs_between(a, b) - 0.25).abs() < 1e-9);
        assert_eq!(secs_between(b, a), 0.0);
    }
}
