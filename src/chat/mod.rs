//! Chat within consultation rooms: persist-then-broadcast relay.
//!
//! `append` persists via the record store and broadcasts to the room's
//! current roster in the same call, under a per-room lock, so append order
//! equals broadcast order for any single room. Typing indicators are
//! transient and broadcast-only.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::session::RoomIndex;
use crate::store::{MarketStore, NewChatMessage};
use crate::websocket::ServerMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    #[default]
    Text,
    Image,
    File,
    System,
}

/// A persisted chat message. Immutable except for the explicit mark-read and
/// soft-delete transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Uuid,
    pub room_id: String,
    pub sender: String,
    pub body: String,
    #[serde(rename = "type")]
    pub kind: ChatKind,
    pub sent_at: DateTime<Utc>,
    pub read: bool,
    pub edited: bool,
    pub deleted: bool,
}

pub struct ChatRelay {
    rooms: Arc<RoomIndex>,
    store: Arc<dyn MarketStore>,
    /// Serializes persist+broadcast per room
    append_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ChatRelay {
    pub fn new(rooms: Arc<RoomIndex>, store: Arc<dyn MarketStore>) -> Self {
        Self {
            rooms,
            store,
            append_locks: DashMap::new(),
        }
    }

    fn room_lock(&self, room_id: &str) -> Arc<Mutex<()>> {
        self.append_locks
            .entry(room_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Persist a message and broadcast it to the room's current roster.
    pub async fn append(
        &self,
        room_id: &str,
        sender: &str,
        body: String,
        kind: ChatKind,
    ) -> Result<ChatMessage> {
        if !self.rooms.contains_participant(room_id, sender) {
            return Err(CoreError::Authorization(format!(
                "{} is not in room {}",
                sender, room_id
            )));
        }

        let lock = self.room_lock(room_id);
        let _guard = lock.lock().await;

        // Room may have ended while waiting on the lock
        if !self.rooms.contains_participant(room_id, sender) {
            return Err(CoreError::NotFound(format!("room {} is gone", room_id)));
        }

        let stored = self
            .store
            .append_chat_message(NewChatMessage {
                room_id: room_id.to_string(),
                sender: sender.to_string(),
                body,
                kind,
            })
            .await?;

        let reached = self
            .rooms
            .broadcast(
                room_id,
                None,
                ServerMessage::NewMessage {
                    message: stored.clone(),
                },
            )
            .await;

        tracing::debug!(
            room_id = %room_id,
            message_id = %stored.id,
            sender = %sender,
            reached = reached,
            "Chat message appended and broadcast"
        );

        Ok(stored)
    }

    /// Bounded window of the most recent messages, oldest first
    pub async fn history(&self, room_id: &str, limit: usize) -> Result<Vec<ChatMessage>> {
        Ok(self.store.recent_chat_messages(room_id, limit).await?)
    }

    /// Mark the other participants' messages as read
    pub async fn mark_read(&self, room_id: &str, reader: &str) -> Result<usize> {
        Ok(self.store.mark_messages_read(room_id, reader).await?)
    }

    /// Soft-delete a message; only the sender may delete their own
    pub async fn soft_delete(&self, room_id: &str, message_id: Uuid, actor: &str) -> Result<()> {
        let deleted = self
            .store
            .soft_delete_message(room_id, message_id, actor)
            .await?;
        if deleted {
            Ok(())
        } else {
            Err(CoreError::NotFound(format!(
                "message {} not deletable by {}",
                message_id, actor
            )))
        }
    }

    /// Drop the append lock of an ended room so the map does not accumulate
    /// entries for every consultation the server has ever hosted
    pub fn purge_room(&self, room_id: &str) {
        self.append_locks.remove(room_id);
    }

    #[cfg(test)]
    pub(crate) fn has_append_lock(&self, room_id: &str) -> bool {
        self.append_locks.contains_key(room_id)
    }

    /// Transient typing indicator, never persisted
    pub async fn broadcast_typing(&self, room_id: &str, who: &str, typing: bool) {
        if !self.rooms.contains_participant(room_id, who) {
            return;
        }
        self.rooms
            .broadcast(
                room_id,
                Some(who),
                ServerMessage::Typing {
                    room_id: room_id.to_string(),
                    user_id: who.to_string(),
                    typing,
                },
            )
            .await;
    }
}
