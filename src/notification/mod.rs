//! Notification pipeline: template resolution, preference gating, per-recipient
//! queueing, and best-effort multi-channel dispatch.
//!
//! Acceptance is decoupled from delivery: `NotificationService` renders and
//! queues, the drain task hands queue entries to `DeliveryDispatcher`, and each
//! `ChannelSink` attempts its channel independently.

mod dispatcher;
mod preference;
mod queue;
mod service;
mod sinks;
mod template;
mod types;

pub use dispatcher::{
    ChannelSink, DeliveryDispatcher, DeliveryReport, DispatcherStats, DispatcherStatsSnapshot,
};
pub use preference::{GateDecision, PreferenceGate, QuietHours, SuppressReason, UserPreference};
pub use queue::{NotificationQueue, QueueEntry, QueueStats};
pub use service::{NotificationService, SendOptions};
pub use sinks::{LogEmailSink, LogSmsSink, WebSocketSink};
pub use template::{interpolate, CallerTemplate, NotificationTemplate, TemplateEngine};
pub use types::{
    Channel, ChannelList, DeliveryOutcome, Notification, NotificationFields, Priority,
};
