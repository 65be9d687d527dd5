use std::sync::Arc;

use async_trait::async_trait;

use crate::connection::ConnectionRegistry;
use crate::infrastructure::error::CoreError;
use crate::websocket::ServerMessage;

use super::dispatcher::ChannelSink;
use super::types::{Channel, Notification};

/// Pushes notifications to the recipient's live websocket connection.
///
/// An offline recipient is a delivery failure for this channel; there is no
/// offline spooling here.
pub struct WebSocketSink {
    registry: Arc<ConnectionRegistry>,
}

impl WebSocketSink {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl ChannelSink for WebSocketSink {
    fn channel(&self) -> Channel {
        Channel::Websocket
    }

    async fn deliver(&self, notification: &Notification) -> Result<(), CoreError> {
        let handle = self
            .registry
            .lookup(&notification.recipient)
            .ok_or_else(|| {
                CoreError::delivery(Channel::Websocket.to_string(), "recipient not connected")
            })?;

        handle
            .send(ServerMessage::Notification {
                notification: notification.clone(),
            })
            .await
            .map_err(|_| {
                CoreError::delivery(Channel::Websocket.to_string(), "connection channel closed")
            })
    }
}

/// Email delivery stub. Logs the would-be send; a real SMTP or provider
/// integration slots in behind the same trait.
pub struct LogEmailSink;

#[async_trait]
impl ChannelSink for LogEmailSink {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn deliver(&self, notification: &Notification) -> Result<(), CoreError> {
        tracing::info!(
            recipient = %notification.recipient,
            title = %notification.title,
            "Email delivery (log sink)"
        );
        Ok(())
    }
}

/// SMS delivery stub, same shape as the email sink.
pub struct LogSmsSink;

#[async_trait]
impl ChannelSink for LogSmsSink {
    fn channel(&self) -> Channel {
        Channel::Sms
    }

    async fn deliver(&self, notification: &Notification) -> Result<(), CoreError> {
        tracing::info!(
            recipient = %notification.recipient,
            title = %notification.title,
            "SMS delivery (log sink)"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::auth::Role;
    use crate::notification::Priority;
    use chrono::Utc;
    use smallvec::smallvec;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    fn notification(recipient: &str) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            recipient: recipient.into(),
            title: "t".into(),
            message: "m".into(),
            priority: Priority::Medium,
            channels: smallvec![Channel::Websocket],
            icon: "bell".into(),
            created_at: Utc::now(),
            expires_at: None,
            outcomes: vec![],
        }
    }

    #[tokio::test]
    async fn test_websocket_sink_delivers_to_connected_recipient() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (tx, mut rx) = mpsc::channel(8);
        registry.register("u1".into(), Role::Patient, tx);

        let sink = WebSocketSink::new(registry);
        sink.deliver(&notification("u1")).await.unwrap();

        match rx.recv().await {
            Some(ServerMessage::Notification { notification }) => {
                assert_eq!(notification.recipient, "u1");
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_websocket_sink_fails_for_offline_recipient() {
        let registry = Arc::new(ConnectionRegistry::new());
        let sink = WebSocketSink::new(registry);

        let err = sink.deliver(&notification("ghost")).await.unwrap_err();
        assert!(matches!(err, CoreError::Delivery { .. }));
    }
}
