use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::infrastructure::error::Result;
use crate::store::MarketStore;

use super::preference::{GateDecision, PreferenceGate, UserPreference};
use super::queue::{NotificationQueue, QueueEntry};
use super::template::{interpolate, CallerTemplate, TemplateEngine};
use super::types::{ChannelList, Notification, NotificationFields, Priority};

/// Caller overrides for one send
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Fields used to synthesize a template when `kind` is unregistered
    pub caller_template: Option<CallerTemplate>,
    pub priority: Option<Priority>,
    pub channels: Option<ChannelList>,
    pub expires_in_seconds: Option<u64>,
}

/// Front door of the notification pipeline: resolve a template, render it,
/// gate it against recipient preferences, and hand the result to the queue.
///
/// Acceptance here means "queued", not "delivered"; delivery is best-effort
/// downstream.
pub struct NotificationService {
    templates: TemplateEngine,
    queue: Arc<NotificationQueue>,
    store: Arc<dyn MarketStore>,
    default_expiry_seconds: u64,
}

impl NotificationService {
    pub fn new(
        templates: TemplateEngine,
        queue: Arc<NotificationQueue>,
        store: Arc<dyn MarketStore>,
        default_expiry_seconds: u64,
    ) -> Self {
        Self {
            templates,
            queue,
            store,
            default_expiry_seconds,
        }
    }

    /// Render and enqueue a notification of type `kind` for `recipient`.
    ///
    /// Returns `Ok(Some(id))` when queued and `Ok(None)` when the recipient's
    /// preferences suppressed it. Suppression is not an error.
    #[tracing::instrument(
        name = "notification.send",
        skip(self, data, options),
        fields(recipient = %recipient, kind = %kind)
    )]
    pub async fn send_notification(
        &self,
        recipient: &str,
        kind: &str,
        data: &serde_json::Map<String, Value>,
        options: SendOptions,
    ) -> Result<Option<Uuid>> {
        let template = self
            .templates
            .resolve(kind, options.caller_template.as_ref());

        let priority = options.priority.unwrap_or(template.priority);
        let channels = options.channels.unwrap_or_else(|| template.channels.clone());
        let expiry = options
            .expires_in_seconds
            .unwrap_or(self.default_expiry_seconds);

        let notification = Notification {
            id: Uuid::new_v4(),
            recipient: recipient.to_string(),
            title: interpolate(&template.title, data),
            message: interpolate(&template.message, data),
            priority,
            channels: channels.clone(),
            icon: template.icon,
            created_at: Utc::now(),
            expires_at: Some(Utc::now() + Duration::seconds(expiry as i64)),
            outcomes: Vec::new(),
        };

        let prefs = self.load_preferences(recipient).await;

        match PreferenceGate::evaluate(&prefs, &channels, priority, Utc::now()) {
            GateDecision::Deliver(allowed) => {
                let id = notification.id;
                self.queue.enqueue(QueueEntry::new(notification, allowed));
                Ok(Some(id))
            }
            GateDecision::Suppress(reason) => {
                tracing::debug!(
                    recipient = %recipient,
                    kind = %kind,
                    reason = ?reason,
                    "Notification suppressed by recipient preferences"
                );
                Ok(None)
            }
        }
    }

    /// Enqueue a fully caller-specified notification, bypassing the template
    /// registry but not the preference gate.
    pub async fn create_notification(&self, fields: NotificationFields) -> Result<Option<Uuid>> {
        let caller = CallerTemplate {
            title: Some(fields.title),
            message: Some(fields.message),
            priority: Some(fields.priority),
            channels: fields.channels,
            icon: fields.icon,
        };
        let options = SendOptions {
            caller_template: Some(caller),
            expires_in_seconds: fields.expires_in_seconds,
            ..SendOptions::default()
        };
        self.send_notification(
            &fields.recipient,
            "custom",
            &serde_json::Map::new(),
            options,
        )
        .await
    }

    /// A preference fetch failure degrades to the permissive default rather
    /// than dropping the notification.
    async fn load_preferences(&self, recipient: &str) -> UserPreference {
        match self.store.user_preferences(recipient).await {
            Ok(Some(prefs)) => prefs,
            Ok(None) => UserPreference::default(),
            Err(e) => {
                tracing::warn!(
                    recipient = %recipient,
                    error = %e,
                    "Preference lookup failed, using defaults"
                );
                UserPreference::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::{Channel, QuietHours};
    use crate::store::MemoryStore;
    use serde_json::json;

    fn data(pairs: &[(&str, Value)]) -> serde_json::Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn service(store: Arc<MemoryStore>) -> (NotificationService, Arc<NotificationQueue>) {
        let queue = Arc::new(NotificationQueue::new());
        let service = NotificationService::new(
            TemplateEngine::with_defaults(),
            queue.clone(),
            store,
            86400,
        );
        (service, queue)
    }

    #[tokio::test]
    async fn test_send_renders_template_and_enqueues() {
        let store = Arc::new(MemoryStore::new());
        let (service, queue) = service(store);

        let id = service
            .send_notification(
                "u1",
                "order_ready",
                &data(&[
                    ("orderNumber", json!("ORD-7")),
                    ("pharmacyName", json!("Central Pharmacy")),
                ]),
                SendOptions::default(),
            )
            .await
            .unwrap();
        assert!(id.is_some());

        let drained = queue.drain_tick();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].notification.title, "Ready for Pickup");
        assert_eq!(
            drained[0].notification.message,
            "Your order ORD-7 is ready for pickup at Central Pharmacy."
        );
    }

    #[tokio::test]
    async fn test_missing_placeholder_stays_verbatim() {
        let store = Arc::new(MemoryStore::new());
        let (service, queue) = service(store);

        service
            .send_notification(
                "u1",
                "order_ready",
                &data(&[("orderNumber", json!("ORD-7"))]),
                SendOptions::default(),
            )
            .await
            .unwrap();

        let drained = queue.drain_tick();
        assert_eq!(
            drained[0].notification.message,
            "Your order ORD-7 is ready for pickup at {pharmacyName}."
        );
    }

    #[tokio::test]
    async fn test_channel_preference_suppression_returns_none() {
        let store = Arc::new(MemoryStore::new());
        store.seed_preferences(
            "u1",
            UserPreference {
                channels: vec![Channel::Email],
                min_priority: Priority::Low,
                quiet_hours: None,
            },
        );
        let (service, queue) = service(store);

        // order_processing requests websocket only; u1 has disabled it
        let id = service
            .send_notification("u1", "order_processing", &data(&[]), SendOptions::default())
            .await
            .unwrap();
        assert!(id.is_none());
        assert_eq!(queue.total_queued(), 0);
    }

    #[tokio::test]
    async fn test_partial_channel_overlap_enqueues_intersection() {
        let store = Arc::new(MemoryStore::new());
        store.seed_preferences(
            "u1",
            UserPreference {
                channels: vec![Channel::Email],
                min_priority: Priority::Low,
                quiet_hours: None,
            },
        );
        let (service, queue) = service(store);

        // order_ready requests all three channels; only email survives the gate
        let id = service
            .send_notification(
                "u1",
                "order_ready",
                &data(&[
                    ("orderNumber", json!("ORD-7")),
                    ("pharmacyName", json!("Central Pharmacy")),
                ]),
                SendOptions::default(),
            )
            .await
            .unwrap();
        assert!(id.is_some());

        let drained = queue.drain_tick();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].channels.as_slice(), &[Channel::Email]);
    }

    #[tokio::test]
    async fn test_unknown_kind_synthesizes_from_caller_fields() {
        let store = Arc::new(MemoryStore::new());
        let (service, queue) = service(store);

        let options = SendOptions {
            caller_template: Some(CallerTemplate {
                title: Some("Hello {name}".into()),
                message: Some("Body".into()),
                priority: Some(Priority::High),
                channels: None,
                icon: None,
            }),
            ..SendOptions::default()
        };
        service
            .send_notification(
                "u1",
                "some_custom_kind",
                &data(&[("name", json!("Ada"))]),
                options,
            )
            .await
            .unwrap();

        let drained = queue.drain_tick();
        assert_eq!(drained[0].notification.title, "Hello Ada");
        assert_eq!(drained[0].notification.priority, Priority::High);
    }

    #[tokio::test]
    async fn test_store_outage_degrades_to_default_preferences() {
        let store = Arc::new(MemoryStore::new());
        store.set_unavailable(true);
        let (service, queue) = service(store);

        let id = service
            .send_notification("u1", "order_ready", &data(&[]), SendOptions::default())
            .await
            .unwrap();
        assert!(id.is_some());
        assert_eq!(queue.total_queued(), 1);
    }

    #[tokio::test]
    async fn test_quiet_hours_suppress_below_critical() {
        use chrono::Timelike;

        // Build a quiet window that contains the current minute, so the test
        // holds regardless of wall clock
        let now = Utc::now();
        let minute = (now.hour() * 60 + now.minute()) as u16;
        let quiet = QuietHours::new(minute, (minute + 10) % 1440);

        let store = Arc::new(MemoryStore::new());
        store.seed_preferences(
            "u1",
            UserPreference {
                channels: vec![Channel::Websocket, Channel::Email, Channel::Sms],
                min_priority: Priority::Low,
                quiet_hours: Some(quiet),
            },
        );
        let (service, queue) = service(store);

        let suppressed = service
            .send_notification("u1", "order_ready", &data(&[]), SendOptions::default())
            .await
            .unwrap();
        // order_ready is High, below Critical
        assert!(suppressed.is_none());

        let critical = service
            .send_notification(
                "u1",
                "order_ready",
                &data(&[]),
                SendOptions {
                    priority: Some(Priority::Critical),
                    ..SendOptions::default()
                },
            )
            .await
            .unwrap();
        assert!(critical.is_some());
        assert_eq!(queue.total_queued(), 1);
    }
}
