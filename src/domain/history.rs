//! Bounded history of While-condition snapshots.
//!
//! Used to spot a condition that keeps evaluating true while nothing it
//! reads changes. Snapshots are stored as SHA-256 digests so the window
//! stays small even when the bound values are large.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::VecDeque;

/// Default number of snapshots kept.
pub const DEFAULT_HISTORY_CAPACITY: usize = 10;

#[derive(Debug, Clone)]
pub struct ConditionHistory {
    capacity: usize,
    entries: VecDeque<String>,
}

impl Default for ConditionHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl ConditionHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() == self.capacity
    }

    /// Record a snapshot, dropping the oldest once full.
    pub fn push(&mut self, snapshot: &Value) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(digest(snapshot));
    }

    /// True when every recorded snapshot is identical.
    pub fn all_identical(&self) -> bool {
        match self.entries.front() {
            Some(first) => self.entries.iter().all(|e| e == first),
            None => false,
        }
    }

    /// True when the window is full of one repeated snapshot.
    pub fn is_stuck(&self) -> bool {
        self.is_full() && self.all_identical()
    }
}

fn digest(snapshot: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(snapshot.to_string().as_bytes());
    hex::encode(hasher.finalize())
}
