//! In-process domain event bus.
//!
//! Producers (api handlers, sweep jobs) publish `DomainEvent`s; registered
//! handlers run sequentially per event, and a failing handler never stops the
//! others. The bus is fire-and-forget: publish reports how many handlers
//! succeeded, never an error.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::infrastructure::error::CoreError;
use crate::notification::{NotificationService, SendOptions};
use crate::store::OrderStatus;

/// Something that happened in the marketplace and may warrant fan-out
#[derive(Debug, Clone)]
pub enum DomainEvent {
    OrderStatusChanged {
        order_id: String,
        order_number: String,
        customer: String,
        pharmacy_name: String,
        status: OrderStatus,
        reason: Option<String>,
    },
    OrderOverdue {
        order_id: String,
        order_number: String,
        customer: String,
    },
    PickupReminder {
        order_id: String,
        order_number: String,
        customer: String,
        pharmacy_name: String,
    },
    DeliveryProgress {
        order_id: String,
        order_number: String,
        customer: String,
        tracking_status: String,
    },
    CompletionRequested {
        order_id: String,
        order_number: String,
        customer: String,
    },
    FeedbackRequested {
        order_id: String,
        order_number: String,
        customer: String,
    },
    PrescriptionResponded {
        patient: String,
        pharmacist_name: String,
        approved: bool,
        reason: Option<String>,
    },
    ProfileUpdated {
        principal: String,
    },
}

impl DomainEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            DomainEvent::OrderStatusChanged { .. } => "order_status_changed",
            DomainEvent::OrderOverdue { .. } => "order_overdue",
            DomainEvent::PickupReminder { .. } => "pickup_reminder",
            DomainEvent::DeliveryProgress { .. } => "delivery_progress",
            DomainEvent::CompletionRequested { .. } => "completion_requested",
            DomainEvent::FeedbackRequested { .. } => "feedback_requested",
            DomainEvent::PrescriptionResponded { .. } => "prescription_responded",
            DomainEvent::ProfileUpdated { .. } => "profile_updated",
        }
    }
}

/// A subscriber on the event bus
#[async_trait]
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, event: &DomainEvent) -> Result<(), CoreError>;
}

/// Sequential fan-out to registered handlers with per-handler error isolation
pub struct EventBus {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    pub fn register(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Deliver `event` to every handler. Returns the number of handlers that
    /// succeeded.
    #[tracing::instrument(name = "events.publish", skip(self, event), fields(kind = event.kind()))]
    pub async fn publish(&self, event: DomainEvent) -> usize {
        let mut succeeded = 0;
        for handler in &self.handlers {
            match handler.handle(&event).await {
                Ok(()) => succeeded += 1,
                Err(e) => {
                    tracing::error!(
                        handler = handler.name(),
                        kind = event.kind(),
                        error = %e,
                        "Event handler failed"
                    );
                }
            }
        }
        succeeded
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Turns domain events into notifications via the service's template registry
pub struct NotificationTrigger {
    service: Arc<NotificationService>,
}

impl NotificationTrigger {
    pub fn new(service: Arc<NotificationService>) -> Self {
        Self { service }
    }

    /// Map an event to a template kind, recipient, and interpolation data.
    /// Events with no notification mapping return None.
    fn plan(event: &DomainEvent) -> Option<(String, String, serde_json::Map<String, Value>)> {
        let entry = |kind: &str, recipient: &str, pairs: Vec<(&str, Value)>| {
            let data = pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect();
            Some((kind.to_string(), recipient.to_string(), data))
        };

        match event {
            DomainEvent::OrderStatusChanged {
                order_number,
                customer,
                pharmacy_name,
                status,
                reason,
                ..
            } => {
                let kind = match status {
                    OrderStatus::Confirmed => "order_confirmed",
                    OrderStatus::Processing => "order_processing",
                    OrderStatus::Ready => "order_ready",
                    OrderStatus::Delivered => "order_delivered",
                    OrderStatus::Cancelled => "order_cancelled",
                    // Courier and terminal transitions are covered by their
                    // own events
                    OrderStatus::OutForDelivery | OrderStatus::Completed => return None,
                };
                entry(
                    kind,
                    customer,
                    vec![
                        ("orderNumber", json!(order_number)),
                        ("pharmacyName", json!(pharmacy_name)),
                        ("reason", json!(reason.clone().unwrap_or_default())),
                    ],
                )
            }
            DomainEvent::OrderOverdue {
                order_number,
                customer,
                ..
            } => entry(
                "order_overdue",
                customer,
                vec![("orderNumber", json!(order_number))],
            ),
            DomainEvent::PickupReminder {
                order_number,
                customer,
                pharmacy_name,
                ..
            } => entry(
                "pickup_reminder",
                customer,
                vec![
                    ("orderNumber", json!(order_number)),
                    ("pharmacyName", json!(pharmacy_name)),
                ],
            ),
            DomainEvent::DeliveryProgress {
                order_number,
                customer,
                tracking_status,
                ..
            } => entry(
                "delivery_update",
                customer,
                vec![
                    ("orderNumber", json!(order_number)),
                    ("trackingStatus", json!(tracking_status)),
                ],
            ),
            DomainEvent::CompletionRequested {
                order_number,
                customer,
                ..
            } => entry(
                "order_completed",
                customer,
                vec![("orderNumber", json!(order_number))],
            ),
            DomainEvent::FeedbackRequested {
                order_number,
                customer,
                ..
            } => entry(
                "feedback_request",
                customer,
                vec![("orderNumber", json!(order_number))],
            ),
            DomainEvent::PrescriptionResponded {
                patient,
                pharmacist_name,
                approved,
                reason,
            } => {
                let kind = if *approved {
                    "prescription_approved"
                } else {
                    "prescription_rejected"
                };
                entry(
                    kind,
                    patient,
                    vec![
                        ("pharmacistName", json!(pharmacist_name)),
                        ("reason", json!(reason.clone().unwrap_or_default())),
                    ],
                )
            }
            DomainEvent::ProfileUpdated { principal } => {
                entry("profile_updated", principal, vec![])
            }
        }
    }
}

#[async_trait]
impl EventHandler for NotificationTrigger {
    fn name(&self) -> &'static str {
        "notification_trigger"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), CoreError> {
        let Some((kind, recipient, data)) = Self::plan(event) else {
            return Ok(());
        };

        self.service
            .send_notification(&recipient, &kind, &data, SendOptions::default())
            .await?;
        Ok(())
    }
}
