use axum::{
    routing::{get, post},
    Router,
};

use crate::server::AppState;

use super::health::{health, stats};
use super::notifications::{send_custom_notification, send_notification};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health & Stats
        .route("/health", get(health))
        .route("/stats", get(stats))
        // Notification endpoints
        .nest(
            "/api/v1",
            Router::new()
                .route("/notifications", post(send_custom_notification))
                .route("/notifications/send", post(send_notification)),
        )
}
