//! The durable record store boundary.
//!
//! Persistence lives outside this core. `MarketStore` is the seam the
//! session, chat, notification, and sweep components call through; the
//! in-memory implementation in `memory` backs tests and standalone runs.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chat::{ChatKind, ChatMessage};
use crate::error::CoreError;
use crate::notification::UserPreference;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("record not found: {0}")]
    NotFound(String),
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => CoreError::TransientStore(msg),
            StoreError::NotFound(msg) => CoreError::NotFound(msg),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A chat message before the store assigns id and timestamp
#[derive(Debug, Clone)]
pub struct NewChatMessage {
    pub room_id: String,
    pub sender: String,
    pub body: String,
    pub kind: ChatKind,
}

/// Order lifecycle states relevant to the sweeps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Confirmed,
    Processing,
    Ready,
    OutForDelivery,
    Delivered,
    Completed,
    Cancelled,
}

/// An order record as the sweeps see it. The idempotency flags are flipped by
/// the `claim_*` methods the first time a condition is detected, so re-running
/// a sweep over an unmodified record set produces no duplicate events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: String,
    pub order_number: String,
    pub customer: String,
    pub pharmacy: String,
    pub status: OrderStatus,
    pub placed_at: DateTime<Utc>,
    pub ready_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub tracking_status: Option<String>,
    pub tracking_checked_at: Option<DateTime<Utc>>,
    pub overdue_notified: bool,
    pub pickup_reminded: bool,
    pub completion_requested: bool,
    pub feedback_requested: bool,
}

impl OrderRecord {
    pub fn new(
        id: impl Into<String>,
        order_number: impl Into<String>,
        customer: impl Into<String>,
        pharmacy: impl Into<String>,
        status: OrderStatus,
        placed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            order_number: order_number.into(),
            customer: customer.into(),
            pharmacy: pharmacy.into(),
            status,
            placed_at,
            ready_at: None,
            delivered_at: None,
            completed_at: None,
            tracking_status: None,
            tracking_checked_at: None,
            overdue_notified: false,
            pickup_reminded: false,
            completion_requested: false,
            feedback_requested: false,
        }
    }
}

/// Durable record store the core calls out to
#[async_trait]
pub trait MarketStore: Send + Sync {
    // --- consultations ---

    /// Whether the principal is an authorized member of the consultation
    async fn is_consultation_member(&self, room_id: &str, principal: &str) -> StoreResult<bool>;

    /// Record the consultation's end timestamp
    async fn mark_consultation_ended(&self, room_id: &str, at: DateTime<Utc>) -> StoreResult<()>;

    // --- chat ---

    /// Persist a message, assigning id and server timestamp
    async fn append_chat_message(&self, message: NewChatMessage) -> StoreResult<ChatMessage>;

    /// Most recent messages for a room, oldest first, bounded by `limit`
    async fn recent_chat_messages(&self, room_id: &str, limit: usize)
        -> StoreResult<Vec<ChatMessage>>;

    /// Mark every message in the room not sent by `reader` as read.
    /// Returns the number of messages updated.
    async fn mark_messages_read(&self, room_id: &str, reader: &str) -> StoreResult<usize>;

    /// Soft-delete a message; only its sender may do so.
    /// Returns false when the message is absent or not owned by `actor`.
    async fn soft_delete_message(
        &self,
        room_id: &str,
        message_id: uuid::Uuid,
        actor: &str,
    ) -> StoreResult<bool>;

    // --- preferences ---

    async fn user_preferences(&self, principal: &str) -> StoreResult<Option<UserPreference>>;

    // --- sweep queries (time-threshold conditions) ---

    /// Undelivered orders placed before `cutoff` and not yet flagged overdue
    async fn overdue_orders(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<OrderRecord>>;

    /// Flip the overdue flag; true on the first detection only
    async fn claim_overdue_notice(&self, order_id: &str) -> StoreResult<bool>;

    /// Ready orders sitting since before `cutoff` without a reminder
    async fn pickup_pending_orders(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<OrderRecord>>;

    async fn claim_pickup_reminder(&self, order_id: &str) -> StoreResult<bool>;

    /// In-flight deliveries whose tracking was last checked before `cutoff`
    async fn stale_tracking_orders(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<OrderRecord>>;

    /// Touch the tracking timestamp; true if this sweep got there first
    async fn claim_tracking_check(&self, order_id: &str, at: DateTime<Utc>) -> StoreResult<bool>;

    /// Delivered orders awaiting completion confirmation since before `cutoff`
    async fn delivered_unconfirmed_orders(
        &self,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<Vec<OrderRecord>>;

    async fn claim_completion_request(&self, order_id: &str) -> StoreResult<bool>;

    /// Completed orders without feedback since before `cutoff`
    async fn completed_without_feedback(
        &self,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<Vec<OrderRecord>>;

    async fn claim_feedback_request(&self, order_id: &str) -> StoreResult<bool>;
}
