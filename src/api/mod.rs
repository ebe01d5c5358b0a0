//! Read-only HTTP surface plus its two server-owned rolling windows.

pub mod routes;

pub use routes::{create_router, run_alert_engine, run_signal_collector, ApiState};

use std::collections::VecDeque;

/// Bounded ring with a monotonically increasing push counter, so stream
/// consumers can tell how many items they missed even after rotation.
pub struct Ring<T> {
    items: VecDeque<T>,
    cap: usize,
    total: u64,
}

impl<T: Clone> Ring<T> {
    pub fn new(cap: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(cap),
            cap,
            total: 0,
        }
    }

    pub fn push(&mut self, item: T) {
        self.items.push_back(item);
        self.total += 1;
        while self.items.len() > self.cap {
            self.items.pop_front();
        }
    }

    /// Items ever pushed, including rotated-out ones.
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }

    /// The most recent n items, oldest first.
    pub fn last_n(&self, n: usize) -> Vec<T> {
        let skip = self.items.len().saturating_sub(n);
        self.items.iter().skip(skip).cloned().collect()
    }
}
