use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use uuid::Uuid;

/// Priority levels for notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Low priority, can be delayed
    Low,
    /// Medium priority (default)
    #[default]
    Medium,
    /// High priority, should be delivered promptly
    High,
    /// Critical priority, bypasses quiet hours
    Critical,
}

impl Priority {
    /// Get numeric value for priority comparison
    pub fn as_weight(&self) -> u8 {
        match self {
            Priority::Low => 1,
            Priority::Medium => 2,
            Priority::High => 3,
            Priority::Critical => 4,
        }
    }
}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_weight().cmp(&other.as_weight())
    }
}

/// A notification delivery medium
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// In-app push over the live connection
    Websocket,
    Email,
    Sms,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Channel::Websocket => "websocket",
            Channel::Email => "email",
            Channel::Sms => "sms",
        };
        f.write_str(s)
    }
}

/// Channel lists are tiny; keep them inline
pub type ChannelList = SmallVec<[Channel; 3]>;

/// Outcome of one delivery attempt on one channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryOutcome {
    pub channel: Channel,
    pub delivered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempted_at: DateTime<Utc>,
}

/// A rendered notification bound for one recipient.
///
/// Consumed exactly once by the dispatcher; this core keeps no persistent
/// notification history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient: String,
    pub title: String,
    pub message: String,
    pub priority: Priority,
    pub channels: ChannelList,
    pub icon: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outcomes: Vec<DeliveryOutcome>,
}

impl Notification {
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(at) => Utc::now() > at,
            None => false,
        }
    }

    pub fn record_outcome(&mut self, channel: Channel, result: Result<(), String>) {
        let (delivered, error) = match result {
            Ok(()) => (true, None),
            Err(e) => (false, Some(e)),
        };
        self.outcomes.push(DeliveryOutcome {
            channel,
            delivered,
            error,
            attempted_at: Utc::now(),
        });
    }
}

/// Raw fields for `create_notification` (no template involved)
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationFields {
    pub recipient: String,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub channels: Option<ChannelList>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub expires_in_seconds: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::High > Priority::Medium);
        assert!(Priority::Medium > Priority::Low);
    }

    #[test]
    fn test_expiry() {
        let mut n = Notification {
            id: Uuid::new_v4(),
            recipient: "u1".into(),
            title: "t".into(),
            message: "m".into(),
            priority: Priority::Medium,
            channels: smallvec![Channel::Websocket],
            icon: "bell".into(),
            created_at: Utc::now(),
            expires_at: None,
            outcomes: vec![],
        };
        assert!(!n.is_expired());

        n.expires_at = Some(Utc::now() - chrono::Duration::seconds(1));
        assert!(n.is_expired());
    }

    #[test]
    fn test_record_outcome() {
        let mut n = Notification {
            id: Uuid::new_v4(),
            recipient: "u1".into(),
            title: "t".into(),
            message: "m".into(),
            priority: Priority::Medium,
            channels: smallvec![Channel::Email, Channel::Sms],
            icon: "bell".into(),
            created_at: Utc::now(),
            expires_at: None,
            outcomes: vec![],
        };
        n.record_outcome(Channel::Email, Ok(()));
        n.record_outcome(Channel::Sms, Err("gateway timeout".into()));

        assert!(n.outcomes[0].delivered);
        assert!(!n.outcomes[1].delivered);
        assert_eq!(n.outcomes[1].error.as_deref(), Some("gateway timeout"));
    }
}
