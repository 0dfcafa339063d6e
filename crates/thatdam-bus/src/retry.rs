//! Bounded queue of publishes waiting for the broker.

use std::collections::VecDeque;

use tracing::warn;

/// A publish that could not reach the broker yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPublish {
    pub topic: String,
    pub body: Vec<u8>,
}

/// FIFO with a hard cap. Pushing past the cap drops the oldest entry.
#[derive(Debug)]
pub struct RetryQueue {
    items: VecDeque<PendingPublish>,
    capacity: usize,
    dropped: u64,
}

impl RetryQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity.min(64)),
            capacity: capacity.max(1),
            dropped: 0,
        }
    }

    /// Enqueue, returning the entry evicted to make room, if any.
    pub fn push(&mut self, item: PendingPublish) -> Option<PendingPublish> {
        let evicted = if self.items.len() >= self.capacity {
            self.dropped += 1;
            let old = self.items.pop_front();
            if let Some(old) = &old {
                warn!(topic = %old.topic, dropped_total = self.dropped, "retry queue full, dropping oldest publish");
            }
            old
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    /// Put an entry back at the head after a failed flush.
    pub fn requeue_front(&mut self, item: PendingPublish) {
        if self.items.len() >= self.capacity {
            self.dropped += 1;
            warn!(topic = %item.topic, "retry queue full, dropping requeued publish");
            return;
        }
        self.items.push_front(item);
    }

    pub fn pop(&mut self) -> Option<PendingPublish> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Entries dropped on overflow since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
