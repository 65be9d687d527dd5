use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::connection::ConnectionRegistry;
use crate::websocket::ServerMessage;

/// Consultation room lifecycle: Initiated -> Active -> Ended (terminal)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RoomStatus {
    Initiated,
    Active,
    Ended,
}

/// Media kinds a participant can toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
    Screen,
}

/// WebRTC signaling payload kinds relayed between participants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
}

/// Live state of one consultation
#[derive(Debug, Clone)]
pub struct Room {
    pub id: String,
    pub roster: HashSet<String>,
    pub status: RoomStatus,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Room {
    fn new(id: String) -> Self {
        Self {
            id,
            roster: HashSet::new(),
            status: RoomStatus::Initiated,
            created_at: Utc::now(),
            ended_at: None,
        }
    }
}

/// Result of removing a participant from a room
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Removal {
    NotInRoom,
    Removed,
    /// Roster emptied; the room auto-transitioned to Ended and was purged
    RemovedAndEnded,
}

/// Explicit `RoomId -> roster` index, independent of any transport library.
///
/// Invariant: a room in the index is Active iff its roster is non-empty;
/// Ended rooms are purged from the index immediately.
pub struct RoomIndex {
    rooms: DashMap<String, Room>,
    registry: Arc<ConnectionRegistry>,
}

impl RoomIndex {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            rooms: DashMap::new(),
            registry,
        }
    }

    /// Add a participant, creating the room on first join. Returns the roster
    /// after the join.
    pub fn join(&self, room_id: &str, principal: &str) -> Vec<String> {
        let mut room = self
            .rooms
            .entry(room_id.to_string())
            .or_insert_with(|| Room::new(room_id.to_string()));

        room.roster.insert(principal.to_string());
        room.status = RoomStatus::Active;

        room.roster.iter().cloned().collect()
    }

    /// Remove a participant. An emptied roster ends and purges the room.
    pub fn remove_participant(&self, room_id: &str, principal: &str) -> Removal {
        let now_empty = match self.rooms.get_mut(room_id) {
            Some(mut room) => {
                if !room.roster.remove(principal) {
                    return Removal::NotInRoom;
                }
                room.roster.is_empty()
            }
            None => return Removal::NotInRoom,
        };

        if now_empty {
            if let Some((_, mut room)) = self.rooms.remove(room_id) {
                room.status = RoomStatus::Ended;
                room.ended_at = Some(Utc::now());
                tracing::debug!(room_id = %room_id, "Room emptied, ended and purged");
            }
            Removal::RemovedAndEnded
        } else {
            Removal::Removed
        }
    }

    /// Explicitly end a room, returning the roster at termination time.
    pub fn end(&self, room_id: &str) -> Option<Vec<String>> {
        self.rooms.remove(room_id).map(|(_, mut room)| {
            room.status = RoomStatus::Ended;
            room.ended_at = Some(Utc::now());
            room.roster.into_iter().collect()
        })
    }

    pub fn roster(&self, room_id: &str) -> Option<Vec<String>> {
        self.rooms
            .get(room_id)
            .map(|room| room.roster.iter().cloned().collect())
    }

    pub fn contains_participant(&self, room_id: &str, principal: &str) -> bool {
        self.rooms
            .get(room_id)
            .map(|room| room.roster.contains(principal))
            .unwrap_or(false)
    }

    pub fn status(&self, room_id: &str) -> Option<RoomStatus> {
        self.rooms.get(room_id).map(|room| room.status)
    }

    pub fn active_count(&self) -> usize {
        self.rooms.len()
    }

    /// Rooms a principal currently participates in (for disconnect cleanup)
    pub fn rooms_for(&self, principal: &str) -> Vec<String> {
        self.rooms
            .iter()
            .filter(|entry| entry.value().roster.contains(principal))
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Best-effort broadcast to the room's roster, optionally excluding one
    /// participant. Returns the number of connections reached.
    pub async fn broadcast(
        &self,
        room_id: &str,
        except: Option<&str>,
        message: ServerMessage,
    ) -> usize {
        // Snapshot the roster and resolve handles before awaiting; the map
        // entry must not stay locked across sends
        let targets: Vec<_> = match self.rooms.get(room_id) {
            Some(room) => room
                .roster
                .iter()
                .filter(|p| Some(p.as_str()) != except)
                .filter_map(|p| self.registry.lookup(p))
                .collect(),
            None => return 0,
        };

        let mut sent = 0;
        for handle in targets {
            if handle.send(message.clone()).await.is_ok() {
                sent += 1;
            }
        }
        sent
    }
}
