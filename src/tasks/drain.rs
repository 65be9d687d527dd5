use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::notification::{DeliveryDispatcher, NotificationQueue};

/// Background task that moves queued notifications into the dispatcher.
///
/// Each tick takes at most one entry per recipient from the queue, so a
/// recipient with a deep backlog receives one notification per tick while
/// everyone else keeps flowing.
pub struct QueueDrainTask {
    queue: Arc<NotificationQueue>,
    dispatcher: Arc<DeliveryDispatcher>,
    interval: Duration,
    shutdown: broadcast::Receiver<()>,
}

impl QueueDrainTask {
    pub fn new(
        queue: Arc<NotificationQueue>,
        dispatcher: Arc<DeliveryDispatcher>,
        interval_ms: u64,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            queue,
            dispatcher,
            interval: Duration::from_millis(interval_ms),
            shutdown,
        }
    }

    pub async fn run(mut self) {
        let mut timer = tokio::time::interval(self.interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // Skip immediate first tick
        timer.tick().await;

        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            "Queue drain task started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Queue drain task received shutdown signal");
                    break;
                }
                _ = timer.tick() => {
                    self.drain_once().await;
                }
            }
        }

        // Final pass so accepted notifications are not stranded in memory
        self.drain_once().await;

        tracing::info!("Queue drain task stopped");
    }

    async fn drain_once(&self) {
        let entries = self.queue.drain_tick();
        if entries.is_empty() {
            return;
        }

        let count = entries.len();
        for entry in entries {
            let report = self.dispatcher.dispatch(entry).await;
            if !report.any_delivered() && report.failed > 0 {
                tracing::warn!(
                    notification_id = %report.notification.id,
                    recipient = %report.notification.recipient,
                    failed = report.failed,
                    "Notification failed on every channel"
                );
            }
        }

        tracing::debug!(dispatched = count, "Drain tick completed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::{
        Channel, ChannelSink, Notification, Priority, QueueEntry,
    };
    use crate::infrastructure::error::CoreError;
    use async_trait::async_trait;
    use chrono::Utc;
    use smallvec::smallvec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    struct CountingSink {
        deliveries: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ChannelSink for CountingSink {
        fn channel(&self) -> Channel {
            Channel::Websocket
        }

        async fn deliver(&self, _notification: &Notification) -> Result<(), CoreError> {
            self.deliveries.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn entry(recipient: &str) -> QueueEntry {
        let notification = Notification {
            id: Uuid::new_v4(),
            recipient: recipient.into(),
            title: "t".into(),
            message: "m".into(),
            priority: Priority::Medium,
            channels: smallvec![Channel::Websocket],
            icon: "bell".into(),
            created_at: Utc::now(),
            expires_at: None,
            outcomes: vec![],
        };
        QueueEntry::new(notification, smallvec![Channel::Websocket])
    }

    #[tokio::test]
    async fn test_drain_task_dispatches_and_stops() {
        let queue = Arc::new(NotificationQueue::new());
        let deliveries = Arc::new(AtomicUsize::new(0));
        let dispatcher = Arc::new(DeliveryDispatcher::new().register_sink(Arc::new(
            CountingSink {
                deliveries: deliveries.clone(),
            },
        )));

        queue.enqueue(entry("u1"));
        queue.enqueue(entry("u2"));

        let (shutdown, _) = broadcast::channel(1);
        let task = QueueDrainTask::new(queue.clone(), dispatcher, 10, shutdown.subscribe());
        let handle = tokio::spawn(task.run());

        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = shutdown.send(());
        handle.await.unwrap();

        assert_eq!(deliveries.load(Ordering::SeqCst), 2);
        assert_eq!(queue.total_queued(), 0);
    }
}
