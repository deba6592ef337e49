//! Per-system hook timing

use std::collections::HashMap;
use std::time::Duration;

/// Accumulated cost of one system's hooks.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HookTiming {
    calls: u64,
    total: Duration,
}

impl HookTiming {
    pub fn calls(&self) -> u64 {
        self.calls
    }

    pub fn total(&self) -> Duration {
        self.total
    }

    pub fn average(&self) -> Duration {
        if self.calls == 0 {
            return Duration::ZERO;
        }
        self.total / self.calls as u32
    }
}

#[derive(Debug, Default)]
pub struct HookProfiler {
    timings: HashMap<String, HookTiming>,
}

impl HookProfiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, name: &str, elapsed: Duration) {
        // Avoid allocating a key on the hot path once the system is known.
        if let Some(timing) = self.timings.get_mut(name) {
            timing.calls += 1;
            timing.total += elapsed;
            return;
        }
        self.timings.insert(
            name.to_string(),
            HookTiming {
                calls: 1,
                total: elapsed,
            },
        );
    }

    pub fn timing(&self, name: &str) -> HookTiming {
        self.timings.get(name).copied().unwrap_or_default()
    }

    /// Drop the entry for a system that has left the scheduler.
    pub fn forget(&mut self, name: &str) {
        self.timings.remove(name);
    }

    pub fn reset(&mut self) {
        self.timings.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &HookTiming)> {
        self.timings.iter().map(|(name, timing)| (name.as_str(), timing))
    }
}
