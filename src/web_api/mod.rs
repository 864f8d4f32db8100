//! WebAPI - REST API Endpoints
//!
//! ## Responsibilities
//!
//! - HTTP API routes
//! - Detection ingestion endpoint
//! - Dashboard WebSocket
//! - Response formatting

mod routes;

pub use routes::create_router;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::models::HealthResponse;
use crate::state::AppState;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_sec: state.started_at.elapsed().as_secs(),
        transport: state.connection.transport().name().to_string(),
        detection_connected: state.connection.is_connected(),
        dashboard_clients: state.realtime.connection_count(),
    };

    Json(response)
}
