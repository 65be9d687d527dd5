//! Consultation session rooms: lifecycle, signaling relay, media toggles.

mod manager;
mod room;

pub use manager::{JoinOutcome, SessionRoomManager};
pub use room::{MediaKind, Removal, Room, RoomIndex, RoomStatus, SignalKind};
