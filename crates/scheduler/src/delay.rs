//! Deadline queue for deferred, cancellable transitions
//!
//! Entries are keyed so that a pending transition can be cancelled or
//! rescheduled when the thing it would touch is edited or removed. Nothing
//! runs on its own: the host calls [`DelayQueue::pop_due`] from its event
//! loop tick and applies whatever came due.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Instant;

/// Keyed queue of deadlines
///
/// Each key has at most one pending deadline; scheduling an existing key
/// replaces its deadline.
#[derive(Debug, Clone)]
pub struct DelayQueue<K> {
    pending: HashMap<K, Entry>,
    next_seq: u64,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    due: Instant,
    /// Insertion sequence, tie-breaker for equal deadlines
    seq: u64,
}

impl<K> DelayQueue<K>
where
    K: Eq + Hash + Clone,
{
    /// Create an empty queue
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Schedule `key` to come due at `due`, replacing any pending deadline
    pub fn schedule(&mut self, key: K, due: Instant) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.insert(key, Entry { due, seq });
    }

    /// Cancel a pending deadline. Returns `true` if one was pending.
    pub fn cancel(&mut self, key: &K) -> bool {
        self.pending.remove(key).is_some()
    }

    /// Keep only the deadlines whose key passes `keep`; returns how many
    /// were dropped
    pub fn retain(&mut self, mut keep: impl FnMut(&K) -> bool) -> usize {
        let before = self.pending.len();
        self.pending.retain(|key, _| keep(key));
        before - self.pending.len()
    }

    /// Whether `key` has a pending deadline
    pub fn contains(&self, key: &K) -> bool {
        self.pending.contains_key(key)
    }

    /// Deadline for `key`, if pending
    pub fn deadline(&self, key: &K) -> Option<Instant> {
        self.pending.get(key).map(|entry| entry.due)
    }

    /// Earliest pending deadline
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|entry| entry.due).min()
    }

    /// Remove and return every key whose deadline is at or before `now`,
    /// ordered by deadline then by scheduling order
    pub fn pop_due(&mut self, now: Instant) -> Vec<K> {
        let mut due: Vec<(K, Entry)> = self
            .pending
            .iter()
            .filter(|(_, entry)| entry.due <= now)
            .map(|(key, entry)| (key.clone(), *entry))
            .collect();

        for (key, _) in &due {
            self.pending.remove(key);
        }

        due.sort_by(|a, b| a.1.due.cmp(&b.1.due).then(a.1.seq.cmp(&b.1.seq)));
        due.into_iter().map(|(key, _)| key).collect()
    }

    /// Number of pending deadlines
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drop every pending deadline
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

impl<K> Default for DelayQueue<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
