//! Per-key write coalescing.
//!
//! Each key holds at most one deadline. Scheduling a key again replaces its
//! deadline, so a burst of edits collapses into one write that fires after
//! the quiet period. The scheduler only tracks *when* a key is due; the
//! caller resolves the payload at fire time, which is what makes the write
//! carry the latest state instead of the state at schedule time.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct Debouncer<K> {
    pending: BTreeMap<K, Instant>,
}

impl<K: Ord + Clone> Default for Debouncer<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord + Clone> Debouncer<K> {
    pub fn new() -> Self {
        Self {
            pending: BTreeMap::new(),
        }
    }

    /// Arm (or re-arm) `key` to fire at `now + delay`. Returns `true` when an
    /// earlier timer for the same key was superseded.
    pub fn schedule(&mut self, key: K, now: Instant, delay: Duration) -> bool {
        self.pending.insert(key, now + delay).is_some()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().min().copied()
    }

    /// Remove and return every key whose deadline is at or before `now`,
    /// earliest first.
    pub fn take_due(&mut self, now: Instant) -> Vec<K> {
        let mut due: Vec<(Instant, K)> = self
            .pending
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(k, at)| (*at, k.clone()))
            .collect();
        due.sort_by(|a, b| a.0.cmp(&b.0));
        for (_, k) in &due {
            self.pending.remove(k);
        }
        due.into_iter().map(|(_, k)| k).collect()
    }

    /// Remove and return every pending key regardless of its deadline.
    pub fn flush(&mut self) -> Vec<K> {
        std::mem::take(&mut self.pending).into_keys().collect()
    }

    pub fn cancel(&mut self, key: &K) -> bool {
        self.pending.remove(key).is_some()
    }

    pub fn cancel_all(&mut self) -> usize {
        let n = self.pending.len();
        self.pending.clear();
        n
    }

    pub fn pending_keys(&self) -> Vec<K> {
        self.pending.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
