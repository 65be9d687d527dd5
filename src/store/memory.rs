//! In-memory `MarketStore` for tests and standalone runs.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::chat::ChatMessage;
use crate::notification::UserPreference;

use super::{MarketStore, NewChatMessage, OrderRecord, OrderStatus, StoreError, StoreResult};

#[derive(Debug, Clone)]
struct ConsultationRecord {
    members: HashSet<String>,
    ended_at: Option<DateTime<Utc>>,
}

pub struct MemoryStore {
    consultations: DashMap<String, ConsultationRecord>,
    messages: DashMap<String, Vec<ChatMessage>>,
    preferences: DashMap<String, UserPreference>,
    orders: DashMap<String, OrderRecord>,
    /// When set, every call fails with `StoreError::Unavailable`
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            consultations: DashMap::new(),
            messages: DashMap::new(),
            preferences: DashMap::new(),
            orders: DashMap::new(),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Simulate a store outage
    pub fn set_unavailable(&self, down: bool) {
        self.unavailable.store(down, Ordering::SeqCst);
    }

    pub fn seed_consultation(&self, room_id: impl Into<String>, members: &[&str]) {
        self.consultations.insert(
            room_id.into(),
            ConsultationRecord {
                members: members.iter().map(|m| m.to_string()).collect(),
                ended_at: None,
            },
        );
    }

    pub fn seed_order(&self, order: OrderRecord) {
        self.orders.insert(order.id.clone(), order);
    }

    pub fn seed_preferences(&self, principal: impl Into<String>, prefs: UserPreference) {
        self.preferences.insert(principal.into(), prefs);
    }

    pub fn order(&self, order_id: &str) -> Option<OrderRecord> {
        self.orders.get(order_id).map(|o| o.clone())
    }

    pub fn consultation_ended_at(&self, room_id: &str) -> Option<DateTime<Utc>> {
        self.consultations.get(room_id).and_then(|c| c.ended_at)
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store marked down".into()));
        }
        Ok(())
    }

    fn claim_flag(
        &self,
        order_id: &str,
        flag: impl FnOnce(&mut OrderRecord) -> bool,
    ) -> StoreResult<bool> {
        self.check_available()?;
        match self.orders.get_mut(order_id) {
            Some(mut order) => Ok(flag(&mut order)),
            None => Err(StoreError::NotFound(format!("order {}", order_id))),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketStore for MemoryStore {
    async fn is_consultation_member(&self, room_id: &str, principal: &str) -> StoreResult<bool> {
        self.check_available()?;
        Ok(self
            .consultations
            .get(room_id)
            .map(|c| c.members.contains(principal))
            .unwrap_or(false))
    }

    async fn mark_consultation_ended(&self, room_id: &str, at: DateTime<Utc>) -> StoreResult<()> {
        self.check_available()?;
        match self.consultations.get_mut(room_id) {
            Some(mut record) => {
                record.ended_at = Some(at);
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("consultation {}", room_id))),
        }
    }

    async fn append_chat_message(&self, message: NewChatMessage) -> StoreResult<ChatMessage> {
        self.check_available()?;
        let stored = ChatMessage {
            id: Uuid::new_v4(),
            room_id: message.room_id.clone(),
            sender: message.sender,
            body: message.body,
            kind: message.kind,
            sent_at: Utc::now(),
            read: false,
            edited: false,
            deleted: false,
        };
        self.messages
            .entry(message.room_id)
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }

    async fn recent_chat_messages(
        &self,
        room_id: &str,
        limit: usize,
    ) -> StoreResult<Vec<ChatMessage>> {
        self.check_available()?;
        Ok(self
            .messages
            .get(room_id)
            .map(|msgs| {
                let visible: Vec<ChatMessage> =
                    msgs.iter().filter(|m| !m.deleted).cloned().collect();
                let skip = visible.len().saturating_sub(limit);
                visible.into_iter().skip(skip).collect()
            })
            .unwrap_or_default())
    }

    async fn mark_messages_read(&self, room_id: &str, reader: &str) -> StoreResult<usize> {
        self.check_available()?;
        let mut updated = 0;
        if let Some(mut msgs) = self.messages.get_mut(room_id) {
            for msg in msgs.iter_mut() {
                if msg.sender != reader && !msg.read {
                    msg.read = true;
                    updated += 1;
                }
            }
        }
        Ok(updated)
    }

    async fn soft_delete_message(
        &self,
        room_id: &str,
        message_id: Uuid,
        actor: &str,
    ) -> StoreResult<bool> {
        self.check_available()?;
        if let Some(mut msgs) = self.messages.get_mut(room_id) {
            if let Some(msg) = msgs.iter_mut().find(|m| m.id == message_id) {
                if msg.sender == actor {
                    msg.deleted = true;
                    return Ok(true);
                }
                return Ok(false);
            }
        }
        Ok(false)
    }

    async fn user_preferences(&self, principal: &str) -> StoreResult<Option<UserPreference>> {
        self.check_available()?;
        Ok(self.preferences.get(principal).map(|p| p.clone()))
    }

    async fn overdue_orders(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<OrderRecord>> {
        self.check_available()?;
        Ok(self
            .orders
            .iter()
            .filter(|o| {
                matches!(o.status, OrderStatus::Confirmed | OrderStatus::Processing)
                    && o.placed_at < cutoff
                    && !o.overdue_notified
            })
            .map(|o| o.clone())
            .collect())
    }

    async fn claim_overdue_notice(&self, order_id: &str) -> StoreResult<bool> {
        self.claim_flag(order_id, |o| {
            if o.overdue_notified {
                false
            } else {
                o.overdue_notified = true;
                true
            }
        })
    }

    async fn pickup_pending_orders(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<OrderRecord>> {
        self.check_available()?;
        Ok(self
            .orders
            .iter()
            .filter(|o| {
                o.status == OrderStatus::Ready
                    && o.ready_at.map(|t| t < cutoff).unwrap_or(false)
                    && !o.pickup_reminded
            })
            .map(|o| o.clone())
            .collect())
    }

    async fn claim_pickup_reminder(&self, order_id: &str) -> StoreResult<bool> {
        self.claim_flag(order_id, |o| {
            if o.pickup_reminded {
                false
            } else {
                o.pickup_reminded = true;
                true
            }
        })
    }

    async fn stale_tracking_orders(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<OrderRecord>> {
        self.check_available()?;
        Ok(self
            .orders
            .iter()
            .filter(|o| {
                o.status == OrderStatus::OutForDelivery
                    && o.tracking_checked_at.map(|t| t < cutoff).unwrap_or(true)
            })
            .map(|o| o.clone())
            .collect())
    }

    async fn claim_tracking_check(&self, order_id: &str, at: DateTime<Utc>) -> StoreResult<bool> {
        self.claim_flag(order_id, |o| {
            if o.tracking_checked_at.map(|t| t >= at).unwrap_or(false) {
                false
            } else {
                o.tracking_checked_at = Some(Utc::now());
                true
            }
        })
    }

    async fn delivered_unconfirmed_orders(
        &self,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<Vec<OrderRecord>> {
        self.check_available()?;
        Ok(self
            .orders
            .iter()
            .filter(|o| {
                o.status == OrderStatus::Delivered
                    && o.delivered_at.map(|t| t < cutoff).unwrap_or(false)
                    && !o.completion_requested
            })
            .map(|o| o.clone())
            .collect())
    }

    async fn claim_completion_request(&self, order_id: &str) -> StoreResult<bool> {
        self.claim_flag(order_id, |o| {
            if o.completion_requested {
                false
            } else {
                o.completion_requested = true;
                true
            }
        })
    }

    async fn completed_without_feedback(
        &self,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<Vec<OrderRecord>> {
        self.check_available()?;
        Ok(self
            .orders
            .iter()
            .filter(|o| {
                o.status == OrderStatus::Completed
                    && o.completed_at.map(|t| t < cutoff).unwrap_or(false)
                    && !o.feedback_requested
            })
            .map(|o| o.clone())
            .collect())
    }

    async fn claim_feedback_request(&self, order_id: &str) -> StoreResult<bool> {
        self.claim_flag(order_id, |o| {
            if o.feedback_requested {
                false
            } else {
                o.feedback_requested = true;
                true
            }
        })
    }
}
