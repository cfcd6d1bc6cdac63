// src/logs/ring.rs

//! Bounded, oldest-evicted storage for one instance's output.
//!
//! Entries are held behind `Arc` so snapshots and fan-out deliveries share
//! the line data instead of cloning it.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::proc::types::LogEntry;

#[derive(Debug)]
pub struct LogRing {
    capacity: usize,
    entries: VecDeque<Arc<LogEntry>>,
}

impl LogRing {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "log ring capacity must be >= 1");
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity.min(1024)),
        }
    }

    /// Append one entry, evicting the oldest when at capacity. O(1).
    pub fn push(&mut self, entry: Arc<LogEntry>) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Point-in-time copy of the current contents, in insertion order.
    pub fn snapshot(&self) -> Vec<Arc<LogEntry>> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop all entries (used when a fresh instance starts).
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
