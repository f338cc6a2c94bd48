//! Bounded FIFO of pending notifications.

use std::collections::VecDeque;
use std::time::Instant;

use super::{NotificationCallbacks, NotificationId, NotificationOptions};

/// A notification waiting to be displayed.
#[derive(Debug)]
pub struct NotificationQueueItem {
    /// Id used for tracking and clearing.
    pub id: NotificationId,
    /// Title line.
    pub title: String,
    /// Presentation options.
    pub options: NotificationOptions,
    /// Lifecycle callbacks.
    pub callbacks: NotificationCallbacks,
    /// When the request was accepted.
    pub timestamp: Instant,
}

/// FIFO queue that silently drops its oldest item when full.
#[derive(Debug)]
pub struct NotificationQueue {
    items: VecDeque<NotificationQueueItem>,
    capacity: usize,
}

impl NotificationQueue {
    /// Create an empty queue holding at most `capacity` items.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append `item`, returning the item evicted to make room, if any.
    pub fn push(&mut self, item: NotificationQueueItem) -> Option<NotificationQueueItem> {
        if self.capacity == 0 {
            return Some(item);
        }
        let evicted = if self.items.len() >= self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    /// Remove and return the oldest item.
    pub fn pop(&mut self) -> Option<NotificationQueueItem> {
        self.items.pop_front()
    }

    /// Remove every item with `id`. Returns how many were removed.
    pub fn remove(&mut self, id: &NotificationId) -> usize {
        let before = self.items.len();
        self.items.retain(|item| &item.id != id);
        before - self.items.len()
    }

    /// Drop every pending item.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Number of pending items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Ids of pending items, oldest first.
    #[cfg(test)]
    pub fn ids(&self) -> impl Iterator<Item = &NotificationId> {
        self.items.iter().map(|item| &item.id)
    }
}
