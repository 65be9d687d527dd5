//! Notification template lookup and placeholder interpolation.
//!
//! Templates are registered once at startup and read-only thereafter.
//! Resolution never fails: an unregistered type synthesizes a template from
//! caller-supplied fields plus a generic icon. Interpolation replaces every
//! `{key}` whose key appears in the data map; an unmatched placeholder is
//! left verbatim rather than treated as an error.

use std::collections::HashMap;

use serde::Deserialize;
use smallvec::smallvec;

use super::types::{Channel, ChannelList, Priority};

const DEFAULT_ICON: &str = "bell";

/// A registered notification template
#[derive(Debug, Clone)]
pub struct NotificationTemplate {
    /// Type key, e.g. "order_ready"
    pub kind: String,
    /// Title with `{key}` placeholders
    pub title: String,
    /// Message body with `{key}` placeholders
    pub message: String,
    pub priority: Priority,
    pub channels: ChannelList,
    pub icon: String,
}

/// Caller-supplied fields used to synthesize a template for an unregistered
/// type
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallerTemplate {
    pub title: Option<String>,
    pub message: Option<String>,
    pub priority: Option<Priority>,
    pub channels: Option<ChannelList>,
    pub icon: Option<String>,
}

pub struct TemplateEngine {
    templates: HashMap<String, NotificationTemplate>,
}

impl TemplateEngine {
    /// Engine pre-loaded with the marketplace's built-in templates
    pub fn with_defaults() -> Self {
        let mut engine = Self {
            templates: HashMap::new(),
        };
        for t in default_templates() {
            engine.register(t);
        }
        engine
    }

    /// Engine with no templates (every resolve synthesizes)
    pub fn empty() -> Self {
        Self {
            templates: HashMap::new(),
        }
    }

    fn register(&mut self, template: NotificationTemplate) {
        self.templates.insert(template.kind.clone(), template);
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.templates.contains_key(kind)
    }

    /// Look up the template for `kind`, synthesizing one from caller-supplied
    /// fields when the type is unregistered. Never fails.
    pub fn resolve(&self, kind: &str, caller: Option<&CallerTemplate>) -> NotificationTemplate {
        if let Some(template) = self.templates.get(kind) {
            return template.clone();
        }

        tracing::debug!(kind = %kind, "No registered template, synthesizing from caller fields");

        let caller = caller.cloned().unwrap_or_default();
        NotificationTemplate {
            kind: kind.to_string(),
            title: caller.title.unwrap_or_else(|| "Notification".to_string()),
            message: caller.message.unwrap_or_default(),
            priority: caller.priority.unwrap_or_default(),
            channels: caller
                .channels
                .unwrap_or_else(|| smallvec![Channel::Websocket]),
            icon: caller.icon.unwrap_or_else(|| DEFAULT_ICON.to_string()),
        }
    }
}

/// Substitute every `{key}` occurrence with `data[key]`. Keys missing from
/// `data` leave the placeholder text unchanged.
pub fn interpolate(text: &str, data: &serde_json::Map<String, serde_json::Value>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        match tail.find('}') {
            Some(end) => {
                let key = &tail[1..end];
                match data.get(key) {
                    Some(value) => out.push_str(&render_value(value)),
                    None => out.push_str(&tail[..=end]),
                }
                rest = &tail[end + 1..];
            }
            None => {
                // Unclosed brace, keep the remainder as-is
                out.push_str(tail);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}

fn render_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn default_templates() -> Vec<NotificationTemplate> {
    fn t(
        kind: &str,
        title: &str,
        message: &str,
        priority: Priority,
        channels: ChannelList,
        icon: &str,
    ) -> NotificationTemplate {
        NotificationTemplate {
            kind: kind.to_string(),
            title: title.to_string(),
            message: message.to_string(),
            priority,
            channels,
            icon: icon.to_string(),
        }
    }

    vec![
        t(
            "order_confirmed",
            "Order Confirmed",
            "Your order {orderNumber} has been confirmed and is being prepared.",
            Priority::Medium,
            smallvec![Channel::Websocket, Channel::Email],
            "check-circle",
        ),
        t(
            "order_processing",
            "Order In Progress",
            "Your order {orderNumber} is being prepared by {pharmacyName}.",
            Priority::Low,
            smallvec![Channel::Websocket],
            "clock",
        ),
        t(
            "order_ready",
            "Ready for Pickup",
            "Your order {orderNumber} is ready for pickup at {pharmacyName}.",
            Priority::High,
            smallvec![Channel::Websocket, Channel::Email, Channel::Sms],
            "package",
        ),
        t(
            "order_delivered",
            "Order Delivered",
            "Your order {orderNumber} has been delivered. Enjoy!",
            Priority::Medium,
            smallvec![Channel::Websocket, Channel::Email],
            "truck",
        ),
        t(
            "order_cancelled",
            "Order Cancelled",
            "Your order {orderNumber} has been cancelled. {reason}",
            Priority::High,
            smallvec![Channel::Websocket, Channel::Email],
            "x-circle",
        ),
        t(
            "order_overdue",
            "Order Delayed",
            "Your order {orderNumber} is taking longer than expected. We are on it.",
            Priority::High,
            smallvec![Channel::Websocket, Channel::Email],
            "alert-triangle",
        ),
        t(
            "pickup_reminder",
            "Pickup Reminder",
            "Your order {orderNumber} is still waiting for pickup at {pharmacyName}.",
            Priority::Medium,
            smallvec![Channel::Websocket, Channel::Sms],
            "bell",
        ),
        t(
            "delivery_update",
            "Delivery Update",
            "Order {orderNumber}: {trackingStatus}",
            Priority::Low,
            smallvec![Channel::Websocket],
            "map-pin",
        ),
        t(
            "order_completed",
            "Confirm Your Delivery",
            "Did you receive order {orderNumber}? Please confirm completion.",
            Priority::Medium,
            smallvec![Channel::Websocket, Channel::Email],
            "check-square",
        ),
        t(
            "feedback_request",
            "How Was Your Order?",
            "Tell us about your experience with order {orderNumber}.",
            Priority::Low,
            smallvec![Channel::Email],
            "star",
        ),
        t(
            "prescription_approved",
            "Prescription Approved",
            "Your prescription has been approved by {pharmacistName}.",
            Priority::High,
            smallvec![Channel::Websocket, Channel::Email, Channel::Sms],
            "file-check",
        ),
        t(
            "prescription_rejected",
            "Prescription Needs Attention",
            "Your prescription could not be approved: {reason}",
            Priority::High,
            smallvec![Channel::Websocket, Channel::Email],
            "file-x",
        ),
        t(
            "profile_updated",
            "Profile Updated",
            "Your profile information was updated. If this wasn't you, contact support.",
            Priority::Medium,
            smallvec![Channel::Websocket, Channel::Email],
            "user",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_interpolate_simple() {
        let d = data(json!({"orderNumber": "1002"}));
        assert_eq!(
            interpolate("Your order {orderNumber} is ready.", &d),
            "Your order 1002 is ready."
        );
    }

    #[test]
    fn test_interpolate_multiple_and_repeated() {
        let d = data(json!({"a": "x", "b": 7}));
        assert_eq!(interpolate("{a}-{b}-{a}", &d), "x-7-x");
    }

    #[test]
    fn test_unmatched_placeholder_left_verbatim() {
        let d = data(json!({"orderNumber": "1002"}));
        assert_eq!(
            interpolate("Order {orderNumber} at {pharmacyName}", &d),
            "Order 1002 at {pharmacyName}"
        );
    }

    #[test]
    fn test_unclosed_brace_kept() {
        let d = data(json!({"a": "x"}));
        assert_eq!(interpolate("tail {a} and {open", &d), "tail x and {open");
    }

    #[test]
    fn test_resolve_registered() {
        let engine = TemplateEngine::with_defaults();
        let template = engine.resolve("order_ready", None);
        assert!(template.title.contains("Ready for Pickup"));
        assert_eq!(template.priority, Priority::High);
    }

    #[test]
    fn test_resolve_unregistered_synthesizes() {
        let engine = TemplateEngine::with_defaults();
        let caller = CallerTemplate {
            title: Some("T".to_string()),
            message: Some("M".to_string()),
            priority: None,
            channels: None,
            icon: None,
        };
        let template = engine.resolve("unregistered_type", Some(&caller));
        assert_eq!(template.title, "T");
        assert_eq!(template.message, "M");
        assert_eq!(template.priority, Priority::Medium);
        assert_eq!(template.icon, DEFAULT_ICON);
        assert_eq!(template.channels.as_slice(), &[Channel::Websocket]);
    }

    #[test]
    fn test_resolve_unregistered_without_caller_fields() {
        let engine = TemplateEngine::empty();
        let template = engine.resolve("whatever", None);
        assert_eq!(template.title, "Notification");
        assert_eq!(template.icon, DEFAULT_ICON);
    }

    #[test]
    fn test_order_ready_renders_order_number() {
        let engine = TemplateEngine::with_defaults();
        let template = engine.resolve("order_ready", None);
        let d = data(json!({"orderNumber": "1002", "pharmacyName": "Central Pharmacy"}));
        let message = interpolate(&template.message, &d);
        assert!(message.contains("1002"));
        assert!(message.contains("Central Pharmacy"));
    }
}
