//! Typed socket messages, validated at the boundary.
//!
//! Every event name from the session/signaling interface maps to one enum
//! variant; payloads are explicit structs rather than free-form JSON.

use serde::{Deserialize, Serialize};

use crate::chat::{ChatKind, ChatMessage};
use crate::notification::Notification;
use crate::session::MediaKind;

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum ClientMessage {
    JoinConsultation {
        #[serde(rename = "roomId")]
        room_id: String,
    },
    VideoOffer {
        #[serde(rename = "roomId")]
        room_id: String,
        payload: serde_json::Value,
        to: String,
    },
    VideoAnswer {
        #[serde(rename = "roomId")]
        room_id: String,
        payload: serde_json::Value,
        to: String,
    },
    IceCandidate {
        #[serde(rename = "roomId")]
        room_id: String,
        payload: serde_json::Value,
        to: String,
    },
    SendMessage {
        #[serde(rename = "roomId")]
        room_id: String,
        message: String,
        #[serde(rename = "type", default)]
        kind: ChatKind,
    },
    Typing {
        #[serde(rename = "roomId")]
        room_id: String,
    },
    StopTyping {
        #[serde(rename = "roomId")]
        room_id: String,
    },
    ToggleAudio {
        #[serde(rename = "roomId")]
        room_id: String,
        enabled: bool,
    },
    ToggleVideo {
        #[serde(rename = "roomId")]
        room_id: String,
        enabled: bool,
    },
    ScreenShare {
        #[serde(rename = "roomId")]
        room_id: String,
        enabled: bool,
    },
    EndConsultation {
        #[serde(rename = "roomId")]
        room_id: String,
    },
    LeaveConsultation {
        #[serde(rename = "roomId")]
        room_id: String,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum ServerMessage {
    UserJoined {
        #[serde(rename = "roomId")]
        room_id: String,
        #[serde(rename = "userId")]
        user_id: String,
    },
    UserLeft {
        #[serde(rename = "roomId")]
        room_id: String,
        #[serde(rename = "userId")]
        user_id: String,
    },
    ConsultationJoined {
        #[serde(rename = "roomId")]
        room_id: String,
        participants: Vec<String>,
        history: Vec<ChatMessage>,
    },
    NewMessage {
        message: ChatMessage,
    },
    VideoOffer {
        #[serde(rename = "roomId")]
        room_id: String,
        from: String,
        payload: serde_json::Value,
    },
    VideoAnswer {
        #[serde(rename = "roomId")]
        room_id: String,
        from: String,
        payload: serde_json::Value,
    },
    IceCandidate {
        #[serde(rename = "roomId")]
        room_id: String,
        from: String,
        payload: serde_json::Value,
    },
    Typing {
        #[serde(rename = "roomId")]
        room_id: String,
        #[serde(rename = "userId")]
        user_id: String,
        typing: bool,
    },
    MediaState {
        #[serde(rename = "roomId")]
        room_id: String,
        #[serde(rename = "userId")]
        user_id: String,
        kind: MediaKind,
        enabled: bool,
    },
    ConsultationEnded {
        #[serde(rename = "roomId")]
        room_id: String,
        #[serde(rename = "endedBy")]
        ended_by: String,
    },
    Notification {
        notification: Notification,
    },
    ConnectionReplaced,
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_message_event_names() {
        let msg: ClientMessage = serde_json::from_value(json!({
            "type": "join-consultation",
            "payload": {"roomId": "c1"}
        }))
        .unwrap();
        assert!(matches!(msg, ClientMessage::JoinConsultation { room_id } if room_id == "c1"));

        let msg: ClientMessage = serde_json::from_value(json!({
            "type": "ice-candidate",
            "payload": {"roomId": "c1", "payload": {"candidate": "cand"}, "to": "u2"}
        }))
        .unwrap();
        assert!(matches!(msg, ClientMessage::IceCandidate { to, .. } if to == "u2"));
    }

    #[test]
    fn test_send_message_kind_field() {
        let msg: ClientMessage = serde_json::from_value(json!({
            "type": "send-message",
            "payload": {"roomId": "c1", "message": "hi", "type": "text"}
        }))
        .unwrap();
        assert!(matches!(
            msg,
            ClientMessage::SendMessage { kind: ChatKind::Text, .. }
        ));

        // kind defaults to text when omitted
        let msg: ClientMessage = serde_json::from_value(json!({
            "type": "send-message",
            "payload": {"roomId": "c1", "message": "hi"}
        }))
        .unwrap();
        assert!(matches!(
            msg,
            ClientMessage::SendMessage { kind: ChatKind::Text, .. }
        ));
    }

    #[test]
    fn test_server_message_serialization() {
        let value = serde_json::to_value(ServerMessage::UserJoined {
            room_id: "c1".into(),
            user_id: "u1".into(),
        })
        .unwrap();
        assert_eq!(value["type"], "user-joined");
        assert_eq!(value["payload"]["roomId"], "c1");
        assert_eq!(value["payload"]["userId"], "u1");
    }

    #[test]
    fn test_unknown_event_rejected() {
        let result: Result<ClientMessage, _> = serde_json::from_value(json!({
            "type": "drop-tables",
            "payload": {}
        }));
        assert!(result.is_err());
    }
}
