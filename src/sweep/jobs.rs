use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};

use crate::events::{DomainEvent, EventBus};
use crate::infrastructure::error::Result;
use crate::store::{MarketStore, StoreError, StoreResult};

/// A periodic scan over the order store.
///
/// `run` returns the number of events published this cycle. Idempotency lives
/// in the store's `claim_*` methods: a record is claimed the first time its
/// condition is detected, so a re-run over unchanged data publishes nothing.
#[async_trait]
pub trait SweepJob: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self) -> Result<usize>;
}

/// A record can vanish between the scan and the claim. That is a logged no-op
/// for the record, not a failed cycle; anything else still aborts the run.
fn claimed(result: StoreResult<bool>, job: &'static str, order_id: &str) -> Result<bool> {
    match result {
        Ok(claimed) => Ok(claimed),
        Err(StoreError::NotFound(_)) => {
            tracing::debug!(job, order_id, "Record vanished before claim, skipping");
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

/// Flags orders still undelivered long after placement
pub struct OverdueOrderSweep {
    store: Arc<dyn MarketStore>,
    bus: Arc<EventBus>,
    overdue_after_mins: i64,
}

impl OverdueOrderSweep {
    pub fn new(store: Arc<dyn MarketStore>, bus: Arc<EventBus>, overdue_after_mins: i64) -> Self {
        Self {
            store,
            bus,
            overdue_after_mins,
        }
    }
}

#[async_trait]
impl SweepJob for OverdueOrderSweep {
    fn name(&self) -> &'static str {
        "overdue_orders"
    }

    async fn run(&self) -> Result<usize> {
        let cutoff = Utc::now() - Duration::minutes(self.overdue_after_mins);
        let mut published = 0;

        for order in self.store.overdue_orders(cutoff).await? {
            if claimed(
                self.store.claim_overdue_notice(&order.id).await,
                self.name(),
                &order.id,
            )? {
                self.bus
                    .publish(DomainEvent::OrderOverdue {
                        order_id: order.id,
                        order_number: order.order_number,
                        customer: order.customer,
                    })
                    .await;
                published += 1;
            }
        }

        Ok(published)
    }
}

/// Reminds customers about ready orders not yet picked up
pub struct PickupReminderSweep {
    store: Arc<dyn MarketStore>,
    bus: Arc<EventBus>,
    pickup_after_mins: i64,
}

impl PickupReminderSweep {
    pub fn new(store: Arc<dyn MarketStore>, bus: Arc<EventBus>, pickup_after_mins: i64) -> Self {
        Self {
            store,
            bus,
            pickup_after_mins,
        }
    }
}

#[async_trait]
impl SweepJob for PickupReminderSweep {
    fn name(&self) -> &'static str {
        "pickup_reminders"
    }

    async fn run(&self) -> Result<usize> {
        let cutoff = Utc::now() - Duration::minutes(self.pickup_after_mins);
        let mut published = 0;

        for order in self.store.pickup_pending_orders(cutoff).await? {
            if claimed(
                self.store.claim_pickup_reminder(&order.id).await,
                self.name(),
                &order.id,
            )? {
                self.bus
                    .publish(DomainEvent::PickupReminder {
                        order_id: order.id,
                        order_number: order.order_number,
                        customer: order.customer,
                        pharmacy_name: order.pharmacy,
                    })
                    .await;
                published += 1;
            }
        }

        Ok(published)
    }
}

/// Re-checks delivery tracking for in-flight orders whose status has gone
/// stale, surfacing the latest position to the customer
pub struct StaleTrackingSweep {
    store: Arc<dyn MarketStore>,
    bus: Arc<EventBus>,
    tracking_stale_mins: i64,
}

impl StaleTrackingSweep {
    pub fn new(store: Arc<dyn MarketStore>, bus: Arc<EventBus>, tracking_stale_mins: i64) -> Self {
        Self {
            store,
            bus,
            tracking_stale_mins,
        }
    }
}

#[async_trait]
impl SweepJob for StaleTrackingSweep {
    fn name(&self) -> &'static str {
        "stale_tracking"
    }

    async fn run(&self) -> Result<usize> {
        let now = Utc::now();
        let cutoff = now - Duration::minutes(self.tracking_stale_mins);
        let mut published = 0;

        for order in self.store.stale_tracking_orders(cutoff).await? {
            if claimed(
                self.store.claim_tracking_check(&order.id, now).await,
                self.name(),
                &order.id,
            )? {
                let tracking_status = order
                    .tracking_status
                    .unwrap_or_else(|| "In transit".to_string());
                self.bus
                    .publish(DomainEvent::DeliveryProgress {
                        order_id: order.id,
                        order_number: order.order_number,
                        customer: order.customer,
                        tracking_status,
                    })
                    .await;
                published += 1;
            }
        }

        Ok(published)
    }
}

/// Asks customers to confirm receipt of delivered orders
pub struct CompletionRequestSweep {
    store: Arc<dyn MarketStore>,
    bus: Arc<EventBus>,
    completion_after_mins: i64,
}

impl CompletionRequestSweep {
    pub fn new(
        store: Arc<dyn MarketStore>,
        bus: Arc<EventBus>,
        completion_after_mins: i64,
    ) -> Self {
        Self {
            store,
            bus,
            completion_after_mins,
        }
    }
}

#[async_trait]
impl SweepJob for CompletionRequestSweep {
    fn name(&self) -> &'static str {
        "completion_requests"
    }

    async fn run(&self) -> Result<usize> {
        let cutoff = Utc::now() - Duration::minutes(self.completion_after_mins);
        let mut published = 0;

        for order in self.store.delivered_unconfirmed_orders(cutoff).await? {
            if claimed(
                self.store.claim_completion_request(&order.id).await,
                self.name(),
                &order.id,
            )? {
                self.bus
                    .publish(DomainEvent::CompletionRequested {
                        order_id: order.id,
                        order_number: order.order_number,
                        customer: order.customer,
                    })
                    .await;
                published += 1;
            }
        }

        Ok(published)
    }
}

/// Solicits feedback on completed orders
pub struct FeedbackRequestSweep {
    store: Arc<dyn MarketStore>,
    bus: Arc<EventBus>,
    feedback_after_mins: i64,
}

impl FeedbackRequestSweep {
    pub fn new(store: Arc<dyn MarketStore>, bus: Arc<EventBus>, feedback_after_mins: i64) -> Self {
        Self {
            store,
            bus,
            feedback_after_mins,
        }
    }
}

#[async_trait]
impl SweepJob for FeedbackRequestSweep {
    fn name(&self) -> &'static str {
        "feedback_requests"
    }

    async fn run(&self) -> Result<usize> {
        let cutoff = Utc::now() - Duration::minutes(self.feedback_after_mins);
        let mut published = 0;

        for order in self.store.completed_without_feedback(cutoff).await? {
            if claimed(
                self.store.claim_feedback_request(&order.id).await,
                self.name(),
                &order.id,
            )? {
                self.bus
                    .publish(DomainEvent::FeedbackRequested {
                        order_id: order.id,
                        order_number: order.order_number,
                        customer: order.customer,
                    })
                    .await;
                published += 1;
            }
        }

        Ok(published)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::{NotificationQueue, NotificationService, TemplateEngine};
    use crate::store::{MemoryStore, OrderRecord, OrderStatus};
    use crate::events::NotificationTrigger;

    fn wiring(store: Arc<dyn MarketStore>) -> (Arc<EventBus>, Arc<NotificationQueue>) {
        let queue = Arc::new(NotificationQueue::new());
        let service = Arc::new(NotificationService::new(
            TemplateEngine::with_defaults(),
            queue.clone(),
            store,
            86400,
        ));
        let bus = Arc::new(EventBus::new().register(Arc::new(NotificationTrigger::new(service))));
        (bus, queue)
    }

    #[tokio::test]
    async fn test_overdue_sweep_publishes_once_per_order() {
        let store = Arc::new(MemoryStore::new());
        store.seed_order(OrderRecord::new(
            "o1",
            "ORD-1",
            "u1",
            "Central Pharmacy",
            OrderStatus::Processing,
            Utc::now() - Duration::minutes(90),
        ));

        let (bus, queue) = wiring(store.clone());
        let sweep = OverdueOrderSweep::new(store, bus, 60);

        assert_eq!(sweep.run().await.unwrap(), 1);
        assert_eq!(queue.total_queued(), 1);

        // Second cycle over unchanged data is a no-op
        assert_eq!(sweep.run().await.unwrap(), 0);
        assert_eq!(queue.total_queued(), 1);
    }

    #[tokio::test]
    async fn test_overdue_sweep_skips_recent_orders() {
        let store = Arc::new(MemoryStore::new());
        store.seed_order(OrderRecord::new(
            "o1",
            "ORD-1",
            "u1",
            "Central Pharmacy",
            OrderStatus::Processing,
            Utc::now() - Duration::minutes(10),
        ));

        let (bus, _queue) = wiring(store.clone());
        let sweep = OverdueOrderSweep::new(store, bus, 60);
        assert_eq!(sweep.run().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_pickup_sweep_targets_ready_orders() {
        let store = Arc::new(MemoryStore::new());
        let mut order = OrderRecord::new(
            "o1",
            "ORD-1",
            "u1",
            "Central Pharmacy",
            OrderStatus::Ready,
            Utc::now() - Duration::minutes(120),
        );
        order.ready_at = Some(Utc::now() - Duration::minutes(45));
        store.seed_order(order);

        let (bus, queue) = wiring(store.clone());
        let sweep = PickupReminderSweep::new(store, bus, 30);

        assert_eq!(sweep.run().await.unwrap(), 1);
        let drained = queue.drain_tick();
        assert_eq!(drained[0].notification.title, "Pickup Reminder");
    }

    /// Delegates to a `MemoryStore` but reports one extra overdue order that
    /// no longer exists, as if it were deleted between the scan and the claim
    struct GhostOrderStore {
        inner: MemoryStore,
    }

    #[async_trait]
    impl MarketStore for GhostOrderStore {
        async fn is_consultation_member(
            &self,
            room_id: &str,
            principal: &str,
        ) -> StoreResult<bool> {
            self.inner.is_consultation_member(room_id, principal).await
        }

        async fn mark_consultation_ended(
            &self,
            room_id: &str,
            at: chrono::DateTime<Utc>,
        ) -> StoreResult<()> {
            self.inner.mark_consultation_ended(room_id, at).await
        }

        async fn append_chat_message(
            &self,
            message: crate::store::NewChatMessage,
        ) -> StoreResult<crate::chat::ChatMessage> {
            self.inner.append_chat_message(message).await
        }

        async fn recent_chat_messages(
            &self,
            room_id: &str,
            limit: usize,
        ) -> StoreResult<Vec<crate::chat::ChatMessage>> {
            self.inner.recent_chat_messages(room_id, limit).await
        }

        async fn mark_messages_read(&self, room_id: &str, reader: &str) -> StoreResult<usize> {
            self.inner.mark_messages_read(room_id, reader).await
        }

        async fn soft_delete_message(
            &self,
            room_id: &str,
            message_id: uuid::Uuid,
            actor: &str,
        ) -> StoreResult<bool> {
            self.inner.soft_delete_message(room_id, message_id, actor).await
        }

        async fn user_preferences(
            &self,
            principal: &str,
        ) -> StoreResult<Option<crate::notification::UserPreference>> {
            self.inner.user_preferences(principal).await
        }

        async fn overdue_orders(
            &self,
            cutoff: chrono::DateTime<Utc>,
        ) -> StoreResult<Vec<OrderRecord>> {
            let mut orders = vec![OrderRecord::new(
                "ghost",
                "ORD-0",
                "u0",
                "Central Pharmacy",
                OrderStatus::Processing,
                Utc::now() - Duration::minutes(500),
            )];
            orders.extend(self.inner.overdue_orders(cutoff).await?);
            Ok(orders)
        }

        async fn claim_overdue_notice(&self, order_id: &str) -> StoreResult<bool> {
            self.inner.claim_overdue_notice(order_id).await
        }

        async fn pickup_pending_orders(
            &self,
            cutoff: chrono::DateTime<Utc>,
        ) -> StoreResult<Vec<OrderRecord>> {
            self.inner.pickup_pending_orders(cutoff).await
        }

        async fn claim_pickup_reminder(&self, order_id: &str) -> StoreResult<bool> {
            self.inner.claim_pickup_reminder(order_id).await
        }

        async fn stale_tracking_orders(
            &self,
            cutoff: chrono::DateTime<Utc>,
        ) -> StoreResult<Vec<OrderRecord>> {
            self.inner.stale_tracking_orders(cutoff).await
        }

        async fn claim_tracking_check(
            &self,
            order_id: &str,
            at: chrono::DateTime<Utc>,
        ) -> StoreResult<bool> {
            self.inner.claim_tracking_check(order_id, at).await
        }

        async fn delivered_unconfirmed_orders(
            &self,
            cutoff: chrono::DateTime<Utc>,
        ) -> StoreResult<Vec<OrderRecord>> {
            self.inner.delivered_unconfirmed_orders(cutoff).await
        }

        async fn claim_completion_request(&self, order_id: &str) -> StoreResult<bool> {
            self.inner.claim_completion_request(order_id).await
        }

        async fn completed_without_feedback(
            &self,
            cutoff: chrono::DateTime<Utc>,
        ) -> StoreResult<Vec<OrderRecord>> {
            self.inner.completed_without_feedback(cutoff).await
        }

        async fn claim_feedback_request(&self, order_id: &str) -> StoreResult<bool> {
            self.inner.claim_feedback_request(order_id).await
        }
    }

    #[tokio::test]
    async fn test_vanished_record_does_not_abort_the_cycle() {
        let inner = MemoryStore::new();
        inner.seed_order(OrderRecord::new(
            "o1",
            "ORD-1",
            "u1",
            "Central Pharmacy",
            OrderStatus::Processing,
            Utc::now() - Duration::minutes(90),
        ));
        let store: Arc<dyn MarketStore> = Arc::new(GhostOrderStore { inner });

        let (bus, queue) = wiring(store.clone());
        let sweep = OverdueOrderSweep::new(store, bus, 60);

        // The ghost is scanned first; its claim hits a missing record, which
        // must not stop o1 from being published in the same cycle
        assert_eq!(sweep.run().await.unwrap(), 1);
        assert_eq!(queue.total_queued(), 1);
    }

    #[tokio::test]
    async fn test_sweep_propagates_store_outage() {
        let store = Arc::new(MemoryStore::new());
        store.set_unavailable(true);

        let (bus, _queue) = wiring(store.clone());
        let sweep = OverdueOrderSweep::new(store, bus, 60);
        assert!(sweep.run().await.is_err());
    }
}
