//! Notification submission endpoints.
//!
//! Both endpoints accept a notification; `202 Accepted` means queued, not
//! delivered. A suppressed notification (recipient preferences) is still a
//! success from the caller's point of view.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::infrastructure::error::Result;
use crate::notification::{CallerTemplate, ChannelList, NotificationFields, Priority, SendOptions};
use crate::server::AppState;

/// Request to send a templated notification
#[derive(Debug, Deserialize)]
pub struct SendNotificationRequest {
    pub recipient: String,
    /// Template kind, e.g. "order_ready"
    pub kind: String,
    /// Placeholder values
    #[serde(default)]
    pub data: serde_json::Map<String, serde_json::Value>,
    /// Fallback fields used when `kind` has no registered template
    #[serde(default)]
    pub template: Option<CallerTemplate>,
    pub priority: Option<Priority>,
    pub channels: Option<ChannelList>,
    pub expires_in_seconds: Option<u64>,
}

/// Response for notification submissions
#[derive(Debug, Serialize)]
pub struct SendNotificationResponse {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_id: Option<Uuid>,
    /// False when recipient preferences suppressed the notification
    pub queued: bool,
}

/// POST /api/notifications/send
pub async fn send_notification(
    State(state): State<AppState>,
    Json(request): Json<SendNotificationRequest>,
) -> Result<(StatusCode, Json<SendNotificationResponse>)> {
    let options = SendOptions {
        caller_template: request.template,
        priority: request.priority,
        channels: request.channels,
        expires_in_seconds: request.expires_in_seconds,
    };

    let id = state
        .notifications
        .send_notification(&request.recipient, &request.kind, &request.data, options)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SendNotificationResponse {
            accepted: true,
            notification_id: id,
            queued: id.is_some(),
        }),
    ))
}

/// POST /api/notifications
pub async fn send_custom_notification(
    State(state): State<AppState>,
    Json(fields): Json<NotificationFields>,
) -> Result<(StatusCode, Json<SendNotificationResponse>)> {
    let id = state.notifications.create_notification(fields).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SendNotificationResponse {
            accepted: true,
            notification_id: id,
            queued: id.is_some(),
        }),
    ))
}
