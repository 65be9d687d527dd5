//! Health check and statistics endpoints.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::connection::ConnectionStats;
use crate::notification::{DispatcherStatsSnapshot, QueueStats};
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub connections: ConnectionHealthResponse,
    pub queue: QueueHealthResponse,
}

#[derive(Debug, Serialize)]
pub struct ConnectionHealthResponse {
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct QueueHealthResponse {
    pub total_queued: usize,
    pub recipients_with_queue: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub connections: ConnectionStats,
    pub queue: QueueStats,
    pub dispatcher: DispatcherStatsSnapshot,
    pub active_consultations: usize,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let queue = state.queue.stats();
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        connections: ConnectionHealthResponse {
            total: state.registry.connected_count(),
        },
        queue: QueueHealthResponse {
            total_queued: queue.total_queued,
            recipients_with_queue: queue.recipients_with_queue,
        },
    })
}

/// GET /stats
pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        connections: state.registry.stats(),
        queue: state.queue.stats(),
        dispatcher: state.dispatcher.stats(),
        active_consultations: state.sessions.rooms().active_count(),
    })
}
