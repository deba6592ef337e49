//! Loom Metrics - Scheduler instrumentation
//!
//! Timing and counting helpers used by the World scheduler and the runtime
//! loop. Everything here vanishes in production builds via feature flags.
//!
//! # Feature Flags
//!
//! - `metrics` - Enable metrics collection (default: disabled)
//!
//! # Usage
//!
//! ```ignore
//! use loom_metrics::{HookProfiler, Stopwatch};
//!
//! let mut profiler = HookProfiler::new();
//! let watch = Stopwatch::start();
//! // ... run a system hook ...
//! profiler.record("movement", watch.elapsed());
//! ```
//!
//! Without the `metrics` feature every type below is a zero-sized stub.

#[cfg(feature = "metrics")]
mod counter;
#[cfg(feature = "metrics")]
mod hook_profiler;
#[cfg(feature = "metrics")]
mod stopwatch;
#[cfg(feature = "metrics")]
mod tick_budget;
#[cfg(feature = "metrics")]
mod window;

#[cfg(feature = "metrics")]
pub use counter::Counter;
#[cfg(feature = "metrics")]
pub use hook_profiler::{HookProfiler, HookTiming};
#[cfg(feature = "metrics")]
pub use stopwatch::Stopwatch;
#[cfg(feature = "metrics")]
pub use tick_budget::TickBudget;
#[cfg(feature = "metrics")]
pub use window::Window;

/// Whether instrumentation was compiled in.
pub const ENABLED: bool = cfg!(feature = "metrics");

// ============================================================================
// No-op stubs when metrics disabled
// ============================================================================

#[cfg(not(feature = "metrics"))]
#[derive(Debug, Default)]
pub struct Counter;

#[cfg(not(feature = "metrics"))]
impl Counter {
    pub fn new() -> Self { Self }
    pub fn increment(&mut self, _name: &str, _value: u64) {}
    pub fn get(&self, _name: &str) -> u64 { 0 }
    pub fn reset_all(&mut self) {}
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> { std::iter::empty() }
}

#[cfg(not(feature = "metrics"))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HookTiming;

#[cfg(not(feature = "metrics"))]
impl HookTiming {
    pub fn calls(&self) -> u64 { 0 }
    pub fn total(&self) -> std::time::Duration { std::time::Duration::ZERO }
    pub fn average(&self) -> std::time::Duration { std::time::Duration::ZERO }
}

#[cfg(not(feature = "metrics"))]
#[derive(Debug, Default)]
pub struct HookProfiler;

#[cfg(not(feature = "metrics"))]
impl HookProfiler {
    pub fn new() -> Self { Self }
    pub fn record(&mut self, _name: &str, _elapsed: std::time::Duration) {}
    pub fn timing(&self, _name: &str) -> HookTiming { HookTiming }
    pub fn forget(&mut self, _name: &str) {}
    pub fn reset(&mut self) {}
    pub fn iter(&self) -> impl Iterator<Item = (&str, &HookTiming)> { std::iter::empty() }
}

#[cfg(not(feature = "metrics"))]
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch;

#[cfg(not(feature = "metrics"))]
impl Stopwatch {
    #[inline]
    pub fn start() -> Self { Self }
    #[inline]
    pub fn elapsed(&self) -> std::time::Duration { std::time::Duration::ZERO }
}

#[cfg(not(feature = "metrics"))]
#[derive(Debug)]
pub struct TickBudget;

#[cfg(not(feature = "metrics"))]
impl TickBudget {
    pub fn new(_budget: std::time::Duration, _window: usize) -> Self { Self }
    pub fn record(&mut self, _cost: std::time::Duration) {}
    pub fn budget(&self) -> std::time::Duration { std::time::Duration::ZERO }
    pub fn ticks(&self) -> u64 { 0 }
    pub fn overruns(&self) -> u64 { 0 }
    pub fn worst(&self) -> std::time::Duration { std::time::Duration::ZERO }
    pub fn average(&self) -> std::time::Duration { std::time::Duration::ZERO }
    pub fn range(&self) -> (std::time::Duration, std::time::Duration) {
        (std::time::Duration::ZERO, std::time::Duration::ZERO)
    }
    pub fn utilization(&self) -> f64 { 0.0 }
}

#[cfg(not(feature = "metrics"))]
pub struct Window<T>(std::marker::PhantomData<T>);

#[cfg(not(feature = "metrics"))]
impl<T> Window<T> {
    pub fn new(_capacity: usize) -> Self { Self(std::marker::PhantomData) }
    pub fn push(&mut self, _value: T) {}
    pub fn len(&self) -> usize { 0 }
    pub fn is_empty(&self) -> bool { true }
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_stubs_and_real_types_share_an_api() {
        let mut profiler = super::HookProfiler::new();
        let watch = super::Stopwatch::start();
        profiler.record("movement", watch.elapsed());
        let _ = profiler.timing("movement").calls();

        let mut counter = super::Counter::new();
        counter.increment("failures", 2);
        if super::ENABLED {
            assert_eq!(counter.get("failures"), 2);
        } else {
            assert_eq!(counter.get("failures"), 0);
        }

        let mut budget = super::TickBudget::new(std::time::Duration::from_millis(16), 8);
        budget.record(std::time::Duration::from_millis(20));
        if super::ENABLED {
            assert_eq!(budget.overruns(), 1);
        } else {
            assert_eq!(budget.overruns(), 0);
        }
    }
}
