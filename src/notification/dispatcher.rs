use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::infrastructure::error::CoreError;

use super::queue::QueueEntry;
use super::types::{Channel, Notification};

/// A delivery backend for a single channel.
///
/// Sinks are best-effort: a failed send is reported through the `Result` and
/// never retried by the dispatcher.
#[async_trait]
pub trait ChannelSink: Send + Sync {
    fn channel(&self) -> Channel;

    async fn deliver(&self, notification: &Notification) -> Result<(), CoreError>;
}

/// Result of one dispatch across a notification's channel list. The
/// notification is returned with its per-channel outcomes recorded.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryReport {
    pub notification: Notification,
    pub delivered: usize,
    pub failed: usize,
}

impl DeliveryReport {
    pub fn any_delivered(&self) -> bool {
        self.delivered > 0
    }
}

/// Statistics for the delivery dispatcher
#[derive(Debug, Default)]
pub struct DispatcherStats {
    pub total_dispatched: AtomicU64,
    pub total_delivered: AtomicU64,
    pub total_failed: AtomicU64,
    pub total_expired: AtomicU64,
}

impl DispatcherStats {
    pub fn snapshot(&self) -> DispatcherStatsSnapshot {
        DispatcherStatsSnapshot {
            total_dispatched: self.total_dispatched.load(Ordering::Relaxed),
            total_delivered: self.total_delivered.load(Ordering::Relaxed),
            total_failed: self.total_failed.load(Ordering::Relaxed),
            total_expired: self.total_expired.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of dispatcher statistics
#[derive(Debug, Clone, Serialize)]
pub struct DispatcherStatsSnapshot {
    pub total_dispatched: u64,
    pub total_delivered: u64,
    pub total_failed: u64,
    pub total_expired: u64,
}

/// Fans a drained queue entry out across its channel list.
///
/// Each channel attempt is independent: a failing channel is recorded and the
/// remaining channels are still attempted. A channel with no registered sink
/// counts as a failure for that channel.
pub struct DeliveryDispatcher {
    sinks: HashMap<Channel, Arc<dyn ChannelSink>>,
    stats: DispatcherStats,
}

impl DeliveryDispatcher {
    pub fn new() -> Self {
        Self {
            sinks: HashMap::new(),
            stats: DispatcherStats::default(),
        }
    }

    pub fn register_sink(mut self, sink: Arc<dyn ChannelSink>) -> Self {
        self.sinks.insert(sink.channel(), sink);
        self
    }

    pub fn stats(&self) -> DispatcherStatsSnapshot {
        self.stats.snapshot()
    }

    /// Dispatch a queue entry across its gated channel list
    #[tracing::instrument(
        name = "dispatcher.dispatch",
        skip(self, entry),
        fields(
            notification_id = %entry.notification.id,
            recipient = %entry.recipient,
            channel_count = entry.channels.len()
        )
    )]
    pub async fn dispatch(&self, entry: QueueEntry) -> DeliveryReport {
        let mut notification = entry.notification;

        // Expiry is re-checked at dispatch time; an entry can outlive its
        // notification while queued
        if notification.is_expired() {
            self.stats.total_expired.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                notification_id = %notification.id,
                "Skipping expired notification"
            );
            return DeliveryReport {
                notification,
                delivered: 0,
                failed: 0,
            };
        }

        let mut delivered = 0;
        let mut failed = 0;

        for channel in &entry.channels {
            let result = match self.sinks.get(channel) {
                Some(sink) => sink
                    .deliver(&notification)
                    .await
                    .map_err(|e| e.to_string()),
                None => Err("no sink registered".to_string()),
            };
            match &result {
                Ok(()) => delivered += 1,
                Err(e) => {
                    failed += 1;
                    tracing::warn!(
                        notification_id = %notification.id,
                        recipient = %notification.recipient,
                        channel = %channel,
                        error = %e,
                        "Channel delivery failed"
                    );
                }
            }
            notification.record_outcome(*channel, result);
        }

        self.stats.total_dispatched.fetch_add(1, Ordering::Relaxed);
        self.stats
            .total_delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);
        self.stats
            .total_failed
            .fetch_add(failed as u64, Ordering::Relaxed);

        tracing::debug!(
            notification_id = %notification.id,
            recipient = %notification.recipient,
            delivered = delivered,
            failed = failed,
            "Dispatched notification"
        );

        DeliveryReport {
            notification,
            delivered,
            failed,
        }
    }
}

impl Default for DeliveryDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
