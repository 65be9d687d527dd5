use std::sync::Arc;

use chrono::Utc;

use crate::chat::{ChatMessage, ChatRelay};
use crate::connection::ConnectionRegistry;
use crate::error::{CoreError, Result};
use crate::store::MarketStore;
use crate::websocket::ServerMessage;

use super::room::{MediaKind, Removal, RoomIndex, SignalKind};

/// What a successful join hands back to the caller
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub participants: Vec<String>,
    pub history: Vec<ChatMessage>,
}

/// Per-consultation room lifecycle and WebRTC signaling relay, built atop
/// `ConnectionRegistry` and `RoomIndex`.
pub struct SessionRoomManager {
    rooms: Arc<RoomIndex>,
    registry: Arc<ConnectionRegistry>,
    chat: Arc<ChatRelay>,
    store: Arc<dyn MarketStore>,
    history_limit: usize,
}

impl SessionRoomManager {
    pub fn new(
        rooms: Arc<RoomIndex>,
        registry: Arc<ConnectionRegistry>,
        chat: Arc<ChatRelay>,
        store: Arc<dyn MarketStore>,
        history_limit: usize,
    ) -> Self {
        Self {
            rooms,
            registry,
            chat,
            store,
            history_limit,
        }
    }

    pub fn rooms(&self) -> &Arc<RoomIndex> {
        &self.rooms
    }

    /// Join a consultation. The membership check is authoritative and fails
    /// closed: no roster mutation happens unless the store confirms the
    /// principal belongs to the underlying record.
    pub async fn join(&self, room_id: &str, principal: &str) -> Result<JoinOutcome> {
        let authorized = self
            .store
            .is_consultation_member(room_id, principal)
            .await?;
        if !authorized {
            tracing::warn!(
                room_id = %room_id,
                principal = %principal,
                "Rejected unauthorized join"
            );
            return Err(CoreError::Authorization(format!(
                "{} is not a member of consultation {}",
                principal, room_id
            )));
        }

        // The await above may have interleaved with other events; the roster
        // mutation below works on current state, not a pre-await snapshot
        let participants = self.rooms.join(room_id, principal);

        let history = match self.chat.history(room_id, self.history_limit).await {
            Ok(history) => history,
            Err(e) => {
                tracing::warn!(
                    room_id = %room_id,
                    error = %e,
                    "Chat history unavailable on join, returning empty window"
                );
                Vec::new()
            }
        };

        self.rooms
            .broadcast(
                room_id,
                Some(principal),
                ServerMessage::UserJoined {
                    room_id: room_id.to_string(),
                    user_id: principal.to_string(),
                },
            )
            .await;

        tracing::info!(
            room_id = %room_id,
            principal = %principal,
            roster_size = participants.len(),
            "Participant joined consultation"
        );

        Ok(JoinOutcome {
            participants,
            history,
        })
    }

    /// Forward an offer/answer/ICE payload verbatim to the target participant.
    /// Fire-and-forget: an absent target is a logged no-op, never queued.
    pub async fn relay_signal(
        &self,
        room_id: &str,
        from: &str,
        kind: SignalKind,
        to: &str,
        payload: serde_json::Value,
    ) -> Result<()> {
        if !self.rooms.contains_participant(room_id, from) {
            return Err(CoreError::Authorization(format!(
                "{} is not in room {}",
                from, room_id
            )));
        }

        if !self.rooms.contains_participant(room_id, to) {
            tracing::debug!(
                room_id = %room_id,
                from = %from,
                to = %to,
                "Signal target not in roster, dropping"
            );
            return Ok(());
        }

        let target = match self.registry.lookup(to) {
            Some(handle) => handle,
            None => {
                tracing::debug!(
                    room_id = %room_id,
                    from = %from,
                    to = %to,
                    "Signal target not connected, dropping"
                );
                return Ok(());
            }
        };

        let message = match kind {
            SignalKind::Offer => ServerMessage::VideoOffer {
                room_id: room_id.to_string(),
                from: from.to_string(),
                payload,
            },
            SignalKind::Answer => ServerMessage::VideoAnswer {
                room_id: room_id.to_string(),
                from: from.to_string(),
                payload,
            },
            SignalKind::IceCandidate => ServerMessage::IceCandidate {
                room_id: room_id.to_string(),
                from: from.to_string(),
                payload,
            },
        };

        if target.send(message).await.is_err() {
            tracing::debug!(
                room_id = %room_id,
                to = %to,
                "Signal send failed, target connection closing"
            );
        }
        Ok(())
    }

    /// Broadcast a media state change to the rest of the roster. No state is
    /// persisted beyond the broadcast.
    pub async fn toggle_media(
        &self,
        room_id: &str,
        principal: &str,
        kind: MediaKind,
        enabled: bool,
    ) -> Result<()> {
        if !self.rooms.contains_participant(room_id, principal) {
            return Err(CoreError::Authorization(format!(
                "{} is not in room {}",
                principal, room_id
            )));
        }

        self.rooms
            .broadcast(
                room_id,
                Some(principal),
                ServerMessage::MediaState {
                    room_id: room_id.to_string(),
                    user_id: principal.to_string(),
                    kind,
                    enabled,
                },
            )
            .await;
        Ok(())
    }

    /// Remove a participant; an emptied room auto-ends and is purged.
    pub async fn leave(&self, room_id: &str, principal: &str) -> Result<()> {
        match self.rooms.remove_participant(room_id, principal) {
            Removal::NotInRoom => {
                tracing::debug!(
                    room_id = %room_id,
                    principal = %principal,
                    "Leave for unknown room or participant, no-op"
                );
                Ok(())
            }
            Removal::Removed => {
                self.rooms
                    .broadcast(
                        room_id,
                        None,
                        ServerMessage::UserLeft {
                            room_id: room_id.to_string(),
                            user_id: principal.to_string(),
                        },
                    )
                    .await;
                Ok(())
            }
            Removal::RemovedAndEnded => {
                // Roster emptied; record the auto-end, best effort
                if let Err(e) = self
                    .store
                    .mark_consultation_ended(room_id, Utc::now())
                    .await
                {
                    tracing::warn!(
                        room_id = %room_id,
                        error = %e,
                        "Failed to record auto-ended consultation"
                    );
                }
                self.chat.purge_room(room_id);
                tracing::info!(room_id = %room_id, "Consultation ended on last leave");
                Ok(())
            }
        }
    }

    /// Disconnect cleanup: leave every room the principal participates in.
    pub async fn handle_disconnect(&self, principal: &str) {
        for room_id in self.rooms.rooms_for(principal) {
            if let Err(e) = self.leave(&room_id, principal).await {
                tracing::warn!(
                    room_id = %room_id,
                    principal = %principal,
                    error = %e,
                    "Disconnect cleanup failed for room"
                );
            }
        }
    }

    /// Explicit termination: record the end timestamp, notify every current
    /// participant, purge the room.
    pub async fn end(&self, room_id: &str, actor: &str) -> Result<()> {
        if !self.rooms.contains_participant(room_id, actor) {
            return match self.rooms.status(room_id) {
                None => Err(CoreError::NotFound(format!("room {}", room_id))),
                Some(_) => Err(CoreError::Authorization(format!(
                    "{} is not in room {}",
                    actor, room_id
                ))),
            };
        }

        let ended_at = Utc::now();
        if let Err(e) = self.store.mark_consultation_ended(room_id, ended_at).await {
            tracing::warn!(
                room_id = %room_id,
                error = %e,
                "Failed to record consultation end timestamp"
            );
        }

        let participants = self.rooms.end(room_id).unwrap_or_default();
        self.chat.purge_room(room_id);
        for participant in &participants {
            if let Some(handle) = self.registry.lookup(participant) {
                let _ = handle
                    .send(ServerMessage::ConsultationEnded {
                        room_id: room_id.to_string(),
                        ended_by: actor.to_string(),
                    })
                    .await;
            }
        }

        tracing::info!(
            room_id = %room_id,
            ended_by = %actor,
            participants = participants.len(),
            "Consultation ended"
        );
        Ok(())
    }
}
