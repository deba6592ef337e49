//! Fixed-capacity sample window for rolling statistics

use std::time::Duration;

/// Keeps the most recent `capacity` samples, overwriting the oldest.
pub struct Window<T> {
    samples: Vec<T>,
    capacity: usize,
    cursor: usize,
}

impl<T: Copy> Window<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "window capacity must be non-zero");
        Self {
            samples: Vec::with_capacity(capacity),
            capacity,
            cursor: 0,
        }
    }

    pub fn push(&mut self, sample: T) {
        if self.samples.len() < self.capacity {
            self.samples.push(sample);
        } else {
            self.samples[self.cursor] = sample;
        }
        self.cursor = (self.cursor + 1) % self.capacity;
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.cursor = 0;
    }
}

impl Window<Duration> {
    pub fn average(&self) -> Duration {
        if self.samples.is_empty() {
            return Duration::ZERO;
        }
        let sum: Duration = self.samples.iter().sum();
        sum / self.samples.len() as u32
    }

    pub fn min_max(&self) -> (Duration, Duration) {
        let min = self.samples.iter().min().copied().unwrap_or(Duration::ZERO);
        let max = self.samples.iter().max().copied().unwrap_or(Duration::ZERO);
        (min, max)
    }
}
