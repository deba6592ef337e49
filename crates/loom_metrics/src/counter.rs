//! Named counters for tracking scheduler events

use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct Counter {
    counters: HashMap<String, u64>,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, name: &str, value: u64) {
        if let Some(count) = self.counters.get_mut(name) {
            *count += value;
        } else {
            self.counters.insert(name.to_string(), value);
        }
    }

    pub fn get(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    pub fn reset_all(&mut self) {
        self.counters.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.counters.iter().map(|(name, count)| (name.as_str(), *count))
    }
}
