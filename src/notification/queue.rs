//! Per-recipient FIFO of pending deliveries.
//!
//! Queues are independent per recipient; there is no global ordering. A drain
//! tick removes at most one entry per recipient, a bounded round-robin that
//! keeps one recipient's backlog from starving others. The queue owns entries
//! until they are drained; an accepted entry cannot be cancelled.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::types::{ChannelList, Notification};

/// A pending delivery owned by the queue
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub recipient: String,
    pub notification: Notification,
    pub channels: ChannelList,
    pub enqueued_at: DateTime<Utc>,
}

impl QueueEntry {
    pub fn new(notification: Notification, channels: ChannelList) -> Self {
        Self {
            recipient: notification.recipient.clone(),
            notification,
            channels,
            enqueued_at: Utc::now(),
        }
    }
}

pub struct NotificationQueue {
    queues: DashMap<String, VecDeque<QueueEntry>>,
}

impl NotificationQueue {
    pub fn new() -> Self {
        Self {
            queues: DashMap::new(),
        }
    }

    pub fn enqueue(&self, entry: QueueEntry) {
        let recipient = entry.recipient.clone();
        let mut queue = self.queues.entry(recipient.clone()).or_default();
        queue.push_back(entry);

        tracing::debug!(
            recipient = %recipient,
            queue_size = queue.len(),
            "Notification enqueued"
        );
    }

    /// Take at most one pending entry per recipient, removing drained-empty
    /// queues from the map.
    pub fn drain_tick(&self) -> Vec<QueueEntry> {
        // Snapshot recipients first; entries must not stay locked while
        // popping neighbors
        let recipients: Vec<String> = self.queues.iter().map(|r| r.key().clone()).collect();

        let mut drained = Vec::with_capacity(recipients.len());
        for recipient in recipients {
            if let Some(mut queue) = self.queues.get_mut(&recipient) {
                if let Some(entry) = queue.pop_front() {
                    drained.push(entry);
                }
                if queue.is_empty() {
                    drop(queue);
                    self.queues.remove_if(&recipient, |_, q| q.is_empty());
                }
            }
        }
        drained
    }

    pub fn queued_for(&self, recipient: &str) -> usize {
        self.queues.get(recipient).map(|q| q.len()).unwrap_or(0)
    }

    pub fn total_queued(&self) -> usize {
        self.queues.iter().map(|q| q.len()).sum()
    }

    pub fn recipients_with_queue(&self) -> usize {
        self.queues.len()
    }

    pub fn stats(&self) -> QueueStats {
        let mut total = 0;
        let mut max = 0;
        for entry in self.queues.iter() {
            total += entry.len();
            max = max.max(entry.len());
        }
        QueueStats {
            total_queued: total,
            recipients_with_queue: self.queues.len(),
            longest_queue: max,
        }
    }
}

impl Default for NotificationQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct QueueStats {
    pub total_queued: usize,
    pub recipients_with_queue: usize,
    pub longest_queue: usize,
}
