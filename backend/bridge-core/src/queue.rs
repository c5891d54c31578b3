//! Bounded FIFO of requests created while the channel was down.

use crate::config::{OverflowPolicy, QueueConfig};
use crate::wire::RequestId;

use std::collections::VecDeque;

use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub id: RequestId,
    pub enqueued_at: Instant,
}

/// Result of [`OfflineQueue::enqueue`].
#[derive(Debug, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    /// Queued after evicting the oldest entry, which the caller must reject.
    Evicted(QueueEntry),
    /// Queue full under `RejectNewest`; nothing was queued.
    Rejected,
}

#[derive(Debug)]
pub struct OfflineQueue {
    entries: VecDeque<QueueEntry>,
    capacity: usize,
    policy: OverflowPolicy,
}

impl OfflineQueue {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            policy,
        }
    }

    pub fn from_config(config: &QueueConfig) -> Self {
        Self::new(config.capacity, config.overflow)
    }

    pub fn enqueue(&mut self, id: RequestId, now: Instant) -> EnqueueOutcome {
        let entry = QueueEntry {
            id,
            enqueued_at: now,
        };

        if self.entries.len() < self.capacity {
            self.entries.push_back(entry);
            return EnqueueOutcome::Queued;
        }

        match self.policy {
            OverflowPolicy::RejectNewest => EnqueueOutcome::Rejected,
            OverflowPolicy::EvictOldest => match self.entries.pop_front() {
                Some(evicted) => {
                    self.entries.push_back(entry);
                    EnqueueOutcome::Evicted(evicted)
                }
                None => {
                    self.entries.push_back(entry);
                    EnqueueOutcome::Queued
                }
            },
        }
    }

    pub fn remove(&mut self, id: &RequestId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| &entry.id != id);
        self.entries.len() != before
    }

    /// Remove every entry, oldest first.
    pub fn drain_all(&mut self) -> Vec<QueueEntry> {
        self.entries.drain(..).collect()
    }

    pub fn contains(&self, id: &RequestId) -> bool {
        self.entries.iter().any(|entry| &entry.id == id)
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
}
