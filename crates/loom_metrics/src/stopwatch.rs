use std::time::{Duration, Instant};

/// Started timer; zero-sized when metrics are compiled out.
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    started: Instant,
}

impl Stopwatch {
    #[inline]
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}
