//! Per-recipient delivery filtering.
//!
//! Preferences gate a notification before it ever reaches the queue: disabled
//! channels, a priority floor, and a quiet-hours window that only critical
//! notifications may cross.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use super::types::{Channel, ChannelList, Priority};

/// A recipient-configured time window during which only critical-priority
/// notifications are delivered. Expressed in minutes-of-day; the window may
/// wrap midnight (start > end).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QuietHours {
    pub start_minute: u16,
    pub end_minute: u16,
}

impl QuietHours {
    pub fn new(start_minute: u16, end_minute: u16) -> Self {
        Self {
            start_minute,
            end_minute,
        }
    }

    /// Whether the given minute-of-day falls inside the window.
    ///
    /// A wrapped window (start > end) covers [start, 1440) plus [0, end).
    /// start == end is an empty window.
    pub fn contains(&self, minute_of_day: u16) -> bool {
        use std::cmp::Ordering;
        match self.start_minute.cmp(&self.end_minute) {
            Ordering::Less => minute_of_day >= self.start_minute && minute_of_day < self.end_minute,
            Ordering::Greater => {
                minute_of_day >= self.start_minute || minute_of_day < self.end_minute
            }
            Ordering::Equal => false,
        }
    }
}

/// A recipient's delivery preferences. Absent preferences allow everything.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPreference {
    /// Channels the recipient has enabled
    pub channels: Vec<Channel>,
    /// Priority floor; anything below is suppressed
    pub min_priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quiet_hours: Option<QuietHours>,
}

impl Default for UserPreference {
    fn default() -> Self {
        Self {
            channels: vec![Channel::Websocket, Channel::Email, Channel::Sms],
            min_priority: Priority::Low,
            quiet_hours: None,
        }
    }
}

/// Why a notification was suppressed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuppressReason {
    ChannelsDisabled,
    BelowPriorityFloor,
    QuietHours,
}

/// Gate decision: either the channels to deliver on, or the suppress reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Deliver(ChannelList),
    Suppress(SuppressReason),
}

pub struct PreferenceGate;

impl PreferenceGate {
    /// Evaluate preferences against a notification's requested channels and
    /// priority at the given instant.
    pub fn evaluate(
        prefs: &UserPreference,
        requested: &[Channel],
        priority: Priority,
        now: DateTime<Utc>,
    ) -> GateDecision {
        let allowed: ChannelList = requested
            .iter()
            .copied()
            .filter(|c| prefs.channels.contains(c))
            .collect();

        if allowed.is_empty() {
            return GateDecision::Suppress(SuppressReason::ChannelsDisabled);
        }

        if priority < prefs.min_priority {
            return GateDecision::Suppress(SuppressReason::BelowPriorityFloor);
        }

        if let Some(quiet) = prefs.quiet_hours {
            let minute = (now.hour() * 60 + now.minute()) as u16;
            if quiet.contains(minute) && priority < Priority::Critical {
                return GateDecision::Suppress(SuppressReason::QuietHours);
            }
        }

        GateDecision::Deliver(allowed)
    }

    /// Convenience predicate over `evaluate`
    pub fn should_deliver(
        prefs: &UserPreference,
        requested: &[Channel],
        priority: Priority,
        now: DateTime<Utc>,
    ) -> bool {
        matches!(
            Self::evaluate(prefs, requested, priority, now),
            GateDecision::Deliver(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_defaults_allow_everything() {
        let prefs = UserPreference::default();
        assert!(PreferenceGate::should_deliver(
            &prefs,
            &[Channel::Websocket],
            Priority::Low,
            at(12, 0)
        ));
    }

    #[test]
    fn test_disabled_channels_suppress() {
        let prefs = UserPreference {
            channels: vec![Channel::Email],
            ..Default::default()
        };
        let decision =
            PreferenceGate::evaluate(&prefs, &[Channel::Websocket, Channel::Sms], Priority::High, at(12, 0));
        assert_eq!(
            decision,
            GateDecision::Suppress(SuppressReason::ChannelsDisabled)
        );
    }

    #[test]
    fn test_channel_intersection() {
        let prefs = UserPreference {
            channels: vec![Channel::Email],
            ..Default::default()
        };
        match PreferenceGate::evaluate(
            &prefs,
            &[Channel::Websocket, Channel::Email],
            Priority::High,
            at(12, 0),
        ) {
            GateDecision::Deliver(channels) => {
                assert_eq!(channels.as_slice(), &[Channel::Email]);
            }
            other => panic!("unexpected decision: {:?}", other),
        }
    }

    #[test]
    fn test_priority_floor() {
        let prefs = UserPreference {
            min_priority: Priority::High,
            ..Default::default()
        };
        assert!(!PreferenceGate::should_deliver(
            &prefs,
            &[Channel::Websocket],
            Priority::Medium,
            at(12, 0)
        ));
        assert!(PreferenceGate::should_deliver(
            &prefs,
            &[Channel::Websocket],
            Priority::High,
            at(12, 0)
        ));
    }

    #[test]
    fn test_quiet_hours_wrap_midnight() {
        // 22:00 - 08:00
        let prefs = UserPreference {
            quiet_hours: Some(QuietHours::new(22 * 60, 8 * 60)),
            ..Default::default()
        };

        // medium at 23:00 suppressed
        assert!(!PreferenceGate::should_deliver(
            &prefs,
            &[Channel::Websocket],
            Priority::Medium,
            at(23, 0)
        ));
        // critical at 23:00 delivered
        assert!(PreferenceGate::should_deliver(
            &prefs,
            &[Channel::Websocket],
            Priority::Critical,
            at(23, 0)
        ));
        // medium at 03:00 still inside the wrapped window
        assert!(!PreferenceGate::should_deliver(
            &prefs,
            &[Channel::Websocket],
            Priority::Medium,
            at(3, 0)
        ));
        // medium at 12:00 outside the window
        assert!(PreferenceGate::should_deliver(
            &prefs,
            &[Channel::Websocket],
            Priority::Medium,
            at(12, 0)
        ));
    }

    #[test]
    fn test_quiet_hours_plain_window() {
        let prefs = UserPreference {
            quiet_hours: Some(QuietHours::new(13 * 60, 14 * 60)),
            ..Default::default()
        };
        assert!(!PreferenceGate::should_deliver(
            &prefs,
            &[Channel::Websocket],
            Priority::Medium,
            at(13, 30)
        ));
        assert!(PreferenceGate::should_deliver(
            &prefs,
            &[Channel::Websocket],
            Priority::Medium,
            at(14, 0)
        ));
    }

    #[test]
    fn test_empty_quiet_window() {
        let quiet = QuietHours::new(600, 600);
        assert!(!quiet.contains(600));
        assert!(!quiet.contains(0));
    }
}
