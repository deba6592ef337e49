//! Deterministic time system
//!
//! Fixed-rate simulation ticks. The World clock advances by the delta handed
//! to each tick; `FixedStep` converts wall-clock frames into whole ticks.

use std::time::Duration;

/// Default simulation tick rate (60 Hz = 16.666ms per tick)
pub const TICK_RATE_HZ: u32 = 60;

/// Duration of one tick at `rate_hz`. A zero rate is clamped to 1 Hz.
pub fn tick_duration(rate_hz: u32) -> Duration {
    Duration::from_nanos(1_000_000_000 / u64::from(rate_hz.max(1)))
}

/// Simulation time tracker owned by the World.
#[derive(Debug, Default, Clone)]
pub struct SimulationClock {
    tick_count: u64,
    elapsed: f64,
}

impl SimulationClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Seconds of simulated time, including the current tick.
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Advance by `delta` seconds and return the new elapsed time.
    pub fn advance(&mut self, delta: f64) -> f64 {
        self.tick_count += 1;
        self.elapsed += delta;
        self.elapsed
    }
}

/// Accumulates real frame time and releases it in fixed-size steps.
#[derive(Debug, Clone)]
pub struct FixedStep {
    step: Duration,
    accumulator: Duration,
    max_steps: u32,
}

impl FixedStep {
    pub fn new(rate_hz: u32) -> Self {
        Self {
            step: tick_duration(rate_hz),
            accumulator: Duration::ZERO,
            max_steps: 8,
        }
    }

    /// Cap on steps released per frame; excess time is dropped so a stall
    /// cannot snowball into an ever-growing backlog.
    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    pub fn step(&self) -> Duration {
        self.step
    }

    /// Feed `frame` of real time; returns how many ticks to run now.
    pub fn accumulate(&mut self, frame: Duration) -> u32 {
        self.accumulator += frame;
        let mut steps = 0;
        while self.accumulator >= self.step && steps < self.max_steps {
            self.accumulator -= self.step;
            steps += 1;
        }
        if steps == self.max_steps {
            self.accumulator = self.accumulator.min(self.step);
        }
        steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_advances() {
        let mut clock = SimulationClock::new();
        assert_eq!(clock.advance(0.5), 0.5);
        assert_eq!(clock.advance(0.25), 0.75);
        assert_eq!(clock.tick_count(), 2);
    }

    #[test]
    fn test_fixed_step_releases_whole_ticks() {
        let mut step = FixedStep::new(10); // 100ms ticks
        assert_eq!(step.accumulate(Duration::from_millis(50)), 0);
        assert_eq!(step.accumulate(Duration::from_millis(60)), 1);
        assert_eq!(step.accumulate(Duration::from_millis(200)), 2);
    }

    #[test]
    fn test_fixed_step_caps_backlog() {
        let mut step = FixedStep::new(10).with_max_steps(3);
        assert_eq!(step.accumulate(Duration::from_secs(5)), 3);
        // The stall is forgiven rather than replayed.
        assert!(step.accumulate(Duration::ZERO) <= 1);
    }
}
