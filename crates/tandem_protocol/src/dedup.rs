//! Replay suppression over recently seen message ids.
//!
//! The table is near-redundant with only one remote sender on a TCP stream,
//! but the envelope shape still supports broadcast transports; keeping the
//! table makes a swap safe.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use crate::defaults::{DEDUP_CAPACITY, DEDUP_WINDOW_SECS};

/// Sliding-window set of message ids: entries age out after the window,
/// overflow evicts in arrival order.
#[derive(Debug)]
pub struct DedupTable {
    capacity: usize,
    window: Duration,
    seen: HashMap<String, Instant>,
    arrival: VecDeque<String>,
}

impl DedupTable {
    pub fn new() -> Self {
        Self::with_limits(DEDUP_CAPACITY, Duration::from_secs(DEDUP_WINDOW_SECS))
    }

    pub fn with_limits(capacity: usize, window: Duration) -> Self {
        Self {
            capacity,
            window,
            seen: HashMap::new(),
            arrival: VecDeque::new(),
        }
    }

    /// Record `message_id`; returns `false` when it was already present
    /// (a replay). Entries past the window are swept on every insert so the
    /// table never serves ids older than the window; overflow beyond
    /// capacity evicts in arrival order.
    pub fn insert(&mut self, message_id: &str) -> bool {
        self.sweep_expired();
        if self.seen.contains_key(message_id) {
            return false;
        }
        self.seen.insert(message_id.to_string(), Instant::now());
        self.arrival.push_back(message_id.to_string());
        while self.seen.len() > self.capacity {
            match self.arrival.pop_front() {
                Some(id) => {
                    self.seen.remove(&id);
                }
                None => break,
            }
        }
        true
    }

    /// Drop everything older than the window. Arrival order is insertion
    /// order, so expired entries sit at the front.
    fn sweep_expired(&mut self) {
        let now = Instant::now();
        while let Some(front) = self.arrival.front() {
            let expired = self
                .seen
                .get(front)
                .is_some_and(|at| now.duration_since(*at) >= self.window);
            if expired {
                let id = self.arrival.pop_front().unwrap();
                self.seen.remove(&id);
            } else {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl Default for DedupTable {
    fn default() -> Self {
        Self::new()
    }
}
