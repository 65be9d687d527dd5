//! API layer - HTTP endpoint handlers.

mod health;
mod notifications;
mod routes;

pub use health::{health, stats};
pub use notifications::{send_custom_notification, send_notification};
pub use routes::api_routes;
