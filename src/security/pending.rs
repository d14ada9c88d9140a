//! Server-side record of outstanding confirmations.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};

/// An issued, not yet answered confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingConfirmation {
    pub id: String,
    pub tool: String,
    pub path: String,
    pub issued_at: DateTime<Utc>,
    pub token: String,
}

impl PendingConfirmation {
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.issued_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// Expired once the age reaches the TTL.
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.age(now) >= ttl
    }
}

/// Insertion-ordered map with a hard capacity; the oldest entries go first.
#[derive(Debug)]
pub struct PendingConfirmations {
    entries: HashMap<String, PendingConfirmation>,
    order: VecDeque<String>,
    capacity: usize,
}

impl PendingConfirmations {
    /// Table holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Returns whatever was evicted to stay within capacity.
    pub fn insert(&mut self, pending: PendingConfirmation) -> Vec<PendingConfirmation> {
        if self.entries.contains_key(&pending.id) {
            self.order.retain(|id| id != &pending.id);
        }
        self.order.push_back(pending.id.clone());
        self.entries.insert(pending.id.clone(), pending);

        let mut evicted = Vec::new();
        while self.entries.len() > self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if let Some(entry) = self.entries.remove(&oldest) {
                evicted.push(entry);
            }
        }
        evicted
    }

    pub fn get(&self, id: &str) -> Option<&PendingConfirmation> {
        self.entries.get(id)
    }

    /// Remove and return an entry; each id is usable once.
    pub fn take(&mut self, id: &str) -> Option<PendingConfirmation> {
        let entry = self.entries.remove(id)?;
        self.order.retain(|queued| queued != id);
        Some(entry)
    }

    /// Remove entries older than `ttl`.
    pub fn drain_expired(&mut self, now: DateTime<Utc>, ttl: Duration) -> Vec<PendingConfirmation> {
        let expired: Vec<String> = self
            .order
            .iter()
            .filter(|id| {
                self.entries
                    .get(id.as_str())
                    .is_some_and(|entry| entry.is_expired(now, ttl))
            })
            .cloned()
            .collect();
        expired.iter().filter_map(|id| self.take(id)).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
