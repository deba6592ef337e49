//! Tick cost against the fixed-step budget
//!
//! A fixed-step scheduler has `1 / rate` seconds of wall time per tick. A tick
//! whose update pass costs more than that is an overrun: the loop falls
//! behind and has to catch up with several ticks in one frame.

use super::window::Window;
use std::time::Duration;

pub struct TickBudget {
    budget: Duration,
    recent: Window<Duration>,
    ticks: u64,
    overruns: u64,
    worst: Duration,
}

impl TickBudget {
    /// Track tick costs against `budget`, keeping the last `window` samples
    /// for the rolling average.
    pub fn new(budget: Duration, window: usize) -> Self {
        Self {
            budget,
            recent: Window::new(window),
            ticks: 0,
            overruns: 0,
            worst: Duration::ZERO,
        }
    }

    pub fn record(&mut self, cost: Duration) {
        self.recent.push(cost);
        self.ticks += 1;
        self.worst = self.worst.max(cost);
        if cost > self.budget {
            self.overruns += 1;
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Ticks recorded since creation.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Ticks that cost more than the budget, over the whole run.
    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    /// Most expensive tick over the whole run.
    pub fn worst(&self) -> Duration {
        self.worst
    }

    /// Rolling average cost.
    pub fn average(&self) -> Duration {
        self.recent.average()
    }

    /// Rolling (min, max) cost.
    pub fn range(&self) -> (Duration, Duration) {
        self.recent.min_max()
    }

    /// Rolling average cost as a fraction of the budget. Above 1.0 the
    /// scheduler cannot keep up with its tick rate.
    pub fn utilization(&self) -> f64 {
        let budget = self.budget.as_secs_f64();
        if budget > 0.0 {
            self.average().as_secs_f64() / budget
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overruns_counted_against_budget() {
        let mut budget = TickBudget::new(Duration::from_millis(10), 4);
        budget.record(Duration::from_millis(4));
        budget.record(Duration::from_millis(10));
        budget.record(Duration::from_millis(12));
        budget.record(Duration::from_millis(6));

        assert_eq!(budget.ticks(), 4);
        assert_eq!(budget.overruns(), 1, "a tick exactly on budget is not an overrun");
        assert_eq!(budget.worst(), Duration::from_millis(12));
        assert_eq!(budget.average(), Duration::from_millis(8));
        assert!((budget.utilization() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_window_rolls_but_totals_do_not() {
        let mut budget = TickBudget::new(Duration::from_millis(5), 2);
        budget.record(Duration::from_millis(20));
        budget.record(Duration::from_millis(1));
        budget.record(Duration::from_millis(3));

        assert_eq!(
            budget.range(),
            (Duration::from_millis(1), Duration::from_millis(3))
        );
        assert_eq!(budget.overruns(), 1);
        assert_eq!(budget.worst(), Duration::from_millis(20));
    }

    #[test]
    fn test_zero_budget_reports_no_utilization() {
        let mut budget = TickBudget::new(Duration::ZERO, 2);
        budget.record(Duration::from_millis(1));
        assert_eq!(budget.utilization(), 0.0);
        assert_eq!(budget.overruns(), 1);
    }
}
