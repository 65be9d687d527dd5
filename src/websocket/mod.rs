//! WebSocket boundary: upgrade, auth, and the typed message protocol.

pub mod handler;
pub mod message;

pub use handler::ws_handler;
pub use message::{ClientMessage, ServerMessage};
