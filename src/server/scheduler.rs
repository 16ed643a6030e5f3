//! Fixed-step accumulator for the physics loop

use std::time::Instant;

use crate::util::time::secs_between;

/// Turns irregular wall-clock wakeups into a whole number of fixed physics steps.
///
/// Elapsed time is clamped to `max_frame` before it enters the accumulator, so a stalled
/// process catches up by at most `max_frame / step` steps instead of spiralling.
#[derive(Debug, Clone)]
pub struct FixedStep {
    step: f64,
    max_frame: f64,
    accumulator: f64,
    last: Option<Instant>,
}

impl FixedStep {
    pub fn new(step: f64, max_frame: f64) -> Self {
        Self {
            step,
            max_frame: max_frame.max(step),
            accumulator: 0.0,
            last: None,
        }
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    /// Leftover time that has not yet made up a whole step
    pub fn remainder(&self) -> f64 {
        self.accumulator
    }

    /// Feed elapsed seconds and return the number of steps to run
    pub fn advance(&mut self, elapsed: f64) -> usize {
        self.accumulator += elapsed.clamp(0.0, self.max_frame);
        let mut steps = 0;
        while self.accumulator >= self.step {
            self.accumulator -= self.step;
            steps += 1;
        }
        steps
    }

    /// Feed the time since the previous call. The first call only starts the clock.
    pub fn tick(&mut self, now: Instant) -> usize {
        let elapsed = self.last.map_or(0.0, |last| secs_between(last, now));
        self.last = Some(now);
        self.advance(elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const STEP: f64 = 1.0 / 60.0;

    #[test]
    fn accumulates_partial_steps() {
        let mut fixed = FixedStep::new(STEP, 0.25);
        assert_eq!(fixed.advance(STEP * 0.5), 0);
        assert_eq!(fixed.advance(STEP * 0.6), 1);
        assert!(fixed.remainder() < STEP * 0.2);
        assert_eq!(fixed.advance(STEP * 3.0), 3);
    }

    #[test]
    fn clamp_bounds_catch_up() {
        let mut fixed = FixedStep::new(STEP, 0.26);
        // A 5 s stall still yields only 0.26 s worth of steps
        assert_eq!(fixed.advance(5.0), 15);
        assert_eq!(fixed.advance(-1.0), 0);
    }

    #[test]
    fn first_tick_only_starts_the_clock() {
        let mut fixed = FixedStep::new(STEP, 0.25);
        let start = Instant::now();
        assert_eq!(fixed.tick(start), 0);
        assert_eq!(fixed.tick(start + Duration::from_millis(55)), 3);
    }
}
