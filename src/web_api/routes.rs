//! API Routes

use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::connection_manager::ConnectionState;
use crate::error::Error;
use crate::event_normalizer::InboundPayload;
use crate::feed_registry::{ActiveView, CreateFeedRequest, DisplayStep, DisplayedFeed, DETECTION_MODES};
use crate::models::ApiResponse;
use crate::state::AppState;

/// Default page size for log queries
const DEFAULT_LOG_LIMIT: usize = 100;

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(super::health_check))
        // Feeds
        .route("/api/feeds", get(list_feeds).post(register_feed))
        .route("/api/feeds/:id", get(get_feed))
        .route("/api/feeds/:id/name", put(rename_feed))
        .route("/api/feeds/:id/url", put(update_feed_url))
        .route("/api/feeds/:id/mode", put(set_detection_mode))
        .route("/api/feeds/:id/toggle", post(toggle_feed))
        .route("/api/detection-modes", get(list_detection_modes))
        // Display cursor
        .route("/api/display", get(get_display))
        .route("/api/display/next", post(display_next))
        .route("/api/display/prev", post(display_prev))
        // Detection log
        .route("/api/log", get(list_log))
        // Connection lifecycle
        .route("/api/connection", get(get_connection))
        .route("/api/connection/connect", post(connect))
        .route("/api/connection/disconnect", post(disconnect))
        .route("/api/connection/reconnect", post(reconnect))
        // Playback
        .route("/api/playback", get(get_playback).delete(close_playback))
        .route("/api/playback/:record_id", post(request_playback))
        // Detection ingestion
        .route(
            "/detection_output",
            post(detection_output).fallback(method_not_allowed),
        )
        // WebSocket
        .route("/api/ws", get(websocket_handler))
        .with_state(state)
}

// ========================================
// Feeds
// ========================================

async fn list_feeds(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.registry.list().await))
}

async fn get_feed(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, Error> {
    let feed = state
        .registry
        .get(&id)
        .await
        .ok_or_else(|| Error::NotFound(format!("Feed {}", id)))?;
    Ok(Json(ApiResponse::success(feed)))
}

async fn register_feed(
    State(state): State<AppState>,
    Json(req): Json<CreateFeedRequest>,
) -> Result<impl IntoResponse, Error> {
    let id = req.id.clone();
    let created = state.registry.register_feed(req.into()).await?;
    let feed = state
        .registry
        .get(&id)
        .await
        .ok_or_else(|| Error::Internal(format!("Feed {} missing after register", id)))?;

    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(ApiResponse::success(feed))))
}

#[derive(Debug, Deserialize)]
struct RenameRequest {
    name: String,
}

async fn rename_feed(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<RenameRequest>,
) -> Result<impl IntoResponse, Error> {
    let feed = state.registry.rename_feed(&id, &req.name).await?;
    Ok(Json(ApiResponse::success(feed)))
}

#[derive(Debug, Deserialize)]
struct UpdateUrlRequest {
    url: String,
}

async fn update_feed_url(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateUrlRequest>,
) -> Result<impl IntoResponse, Error> {
    let feed = state.registry.update_feed_url(&id, &req.url).await?;
    Ok(Json(ApiResponse::success(feed)))
}

#[derive(Debug, Deserialize)]
struct SetModeRequest {
    mode: String,
    #[serde(default)]
    prompt: Option<String>,
}

async fn set_detection_mode(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SetModeRequest>,
) -> Result<impl IntoResponse, Error> {
    let feed = state
        .registry
        .set_detection_mode(&id, &req.mode, req.prompt)
        .await?;
    Ok(Json(ApiResponse::success(feed)))
}

async fn toggle_feed(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, Error> {
    let view = state.registry.toggle_active(&id).await?;
    Ok(Json(ApiResponse::success(view)))
}

async fn list_detection_modes() -> impl IntoResponse {
    Json(ApiResponse::success(DETECTION_MODES))
}

// ========================================
// Display cursor
// ========================================

#[derive(Debug, Serialize)]
struct DisplayResponse {
    displayed: Option<DisplayedFeed>,
    active: ActiveView,
}

async fn display_response(state: &AppState) -> DisplayResponse {
    DisplayResponse {
        displayed: state.registry.displayed().await,
        active: state.registry.active_view().await,
    }
}

async fn get_display(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(display_response(&state).await))
}

async fn display_next(State(state): State<AppState>) -> impl IntoResponse {
    state.registry.advance_display(DisplayStep::Next).await;
    Json(ApiResponse::success(display_response(&state).await))
}

async fn display_prev(State(state): State<AppState>) -> impl IntoResponse {
    state.registry.advance_display(DisplayStep::Prev).await;
    Json(ApiResponse::success(display_response(&state).await))
}

// ========================================
// Detection log
// ========================================

#[derive(Debug, Deserialize)]
struct LogQuery {
    limit: Option<usize>,
    feed_id: Option<String>,
}

async fn list_log(
    State(state): State<AppState>,
    Query(query): Query<LogQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT);

    let records = if let Some(feed_id) = query.feed_id {
        state.event_log.get_by_feed(&feed_id, limit).await
    } else {
        state.event_log.get_latest(limit).await
    };

    Json(ApiResponse::success(records))
}

// ========================================
// Connection lifecycle
// ========================================

#[derive(Debug, Serialize)]
struct ConnectionResponse {
    state: ConnectionState,
    connected: bool,
    transport: &'static str,
    url: String,
}

fn connection_response(state: &AppState) -> ConnectionResponse {
    let connection_state = state.connection.state();
    ConnectionResponse {
        state: connection_state,
        connected: connection_state.is_connected(),
        transport: state.connection.transport().name(),
        url: state.connection.transport().url().to_string(),
    }
}

async fn get_connection(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(connection_response(&state)))
}

async fn connect(State(state): State<AppState>) -> Result<impl IntoResponse, Error> {
    state.connection.connect().await?;
    Ok(Json(ApiResponse::success(connection_response(&state))))
}

async fn disconnect(State(state): State<AppState>) -> impl IntoResponse {
    state.connection.disconnect().await;
    Json(ApiResponse::success(connection_response(&state)))
}

async fn reconnect(State(state): State<AppState>) -> Result<impl IntoResponse, Error> {
    state.connection.reconnect().await?;
    Ok(Json(ApiResponse::success(connection_response(&state))))
}

// ========================================
// Playback
// ========================================

async fn get_playback(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.playback.active().await))
}

async fn close_playback(State(state): State<AppState>) -> impl IntoResponse {
    state.playback.close_playback().await;
    Json(ApiResponse::success(state.playback.active().await))
}

/// Open playback for a log record
///
/// A record without video leaves the active playback untouched and
/// returns the unchanged state.
async fn request_playback(
    State(state): State<AppState>,
    Path(record_id): Path<u64>,
) -> Result<impl IntoResponse, Error> {
    let record = state
        .event_log
        .get(record_id)
        .await
        .ok_or_else(|| Error::NotFound(format!("Record {}", record_id)))?;

    if state.playback.request_playback(&record).await.is_none() {
        tracing::debug!(record_id = record_id, "No video for record");
    }
    Ok(Json(ApiResponse::success(state.playback.active().await)))
}

// ========================================
// Detection ingestion
// ========================================

/// Accept a detection event pushed by the backend
/// POST /detection_output
async fn detection_output(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    let value: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "Rejected detection_output body");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "Invalid JSON data"})),
            );
        }
    };

    let records = state.pipeline.ingest(InboundPayload::from_json(value)).await;
    tracing::debug!(records = records.len(), "detection_output ingested");

    (StatusCode::OK, Json(json!({"success": true})))
}

async fn method_not_allowed() -> impl IntoResponse {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({"error": "Method not allowed"})),
    )
}

// ========================================
// WebSocket
// ========================================

async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handle WebSocket connection
async fn handle_websocket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // Register with RealtimeHub
    let (conn_id, mut rx) = state.realtime.register().await;

    // Current connection state first, so the client does not wait for a transition
    let greeting = json!({
        "type": "connection_state",
        "data": connection_response(&state),
    })
    .to_string();

    // Spawn task to forward messages from hub to WebSocket
    let send_task = tokio::spawn(async move {
        if sender.send(Message::Text(greeting)).await.is_err() {
            return;
        }
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Close(_)) => {
                    tracing::debug!(connection_id = %conn_id, "Close frame received");
                    break;
                }
                Err(e) => {
                    tracing::warn!(connection_id = %conn_id, error = %e, "WebSocket error");
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    state.realtime.unregister(&conn_id).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppConfig;
    use std::time::Duration;

    async fn spawn_app() -> (String, AppState) {
        let config = AppConfig {
            // nothing listens here; tests never connect
            detection_url: "http://127.0.0.1:9/latest".to_string(),
            poll_interval: Duration::from_millis(50),
            max_active_feeds: 2,
            ..AppConfig::default()
        };
        let state = AppState::new(config).unwrap();
        let app = create_router(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), state)
    }

    #[tokio::test]
    async fn test_detection_output_contract() {
        let (base, state) = spawn_app().await;
        let client = reqwest::Client::new();
        let url = format!("{}/detection_output", base);

        let ok = client
            .post(&url)
            .body(r#"{"event":"Person detected","timestamp":"10:00:00","feedId":"1"}"#)
            .send()
            .await
            .unwrap();
        assert_eq!(ok.status(), 200);
        let body: serde_json::Value = ok.json().await.unwrap();
        assert_eq!(body, json!({"success": true}));

        let bad = client.post(&url).body("{not json").send().await.unwrap();
        assert_eq!(bad.status(), 400);
        let body: serde_json::Value = bad.json().await.unwrap();
        assert!(body["error"].is_string());

        let wrong = client.get(&url).send().await.unwrap();
        assert_eq!(wrong.status(), 405);
        let body: serde_json::Value = wrong.json().await.unwrap();
        assert!(body["error"].is_string());

        let log = state.event_log.all().await;
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].display_text, "Person detected on Feed 1");
    }

    #[tokio::test]
    async fn test_toggle_capacity_maps_to_conflict() {
        let (base, _state) = spawn_app().await;
        let client = reqwest::Client::new();

        for id in ["1", "2", "3"] {
            let resp = client
                .post(format!("{}/api/feeds", base))
                .json(&json!({"id": id, "name": format!("Cam {}", id)}))
                .send()
                .await
                .unwrap();
            assert_eq!(resp.status(), 201);
        }
        for id in ["1", "2"] {
            let resp = client
                .post(format!("{}/api/feeds/{}/toggle", base, id))
                .send()
                .await
                .unwrap();
            assert_eq!(resp.status(), 200);
        }

        let full = client
            .post(format!("{}/api/feeds/3/toggle", base))
            .send()
            .await
            .unwrap();
        assert_eq!(full.status(), 409);
        let body: serde_json::Value = full.json().await.unwrap();
        assert_eq!(body["ok"], false);

        let missing = client
            .post(format!("{}/api/feeds/99/toggle", base))
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status(), 404);
    }

    #[tokio::test]
    async fn test_playback_via_record_id() {
        let (base, state) = spawn_app().await;
        let client = reqwest::Client::new();

        client
            .post(format!("{}/detection_output", base))
            .body(r#"{"event":"Motion","timestamp":"69:69:69","videoUrl":"http://example.com/clip.mp4"}"#)
            .send()
            .await
            .unwrap();
        let record = state.event_log.get_latest(1).await.remove(0);

        let resp = client
            .post(format!("{}/api/playback/{}", base, record.id))
            .send()
            .await
            .unwrap();
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["data"]["videoRef"], "http://example.com/clip.mp4");
        assert_eq!(body["data"]["timestamp"], "69:69:69");

        let closed = client
            .delete(format!("{}/api/playback", base))
            .send()
            .await
            .unwrap();
        let body: serde_json::Value = closed.json().await.unwrap();
        assert!(body["data"].is_null());

        let missing = client
            .post(format!("{}/api/playback/999", base))
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status(), 404);
    }

    #[tokio::test]
    async fn test_connect_failure_is_bad_gateway() {
        let (base, state) = spawn_app().await;
        let resp = reqwest::Client::new()
            .post(format!("{}/api/connection/connect", base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 502);
        assert_eq!(state.connection.state(), ConnectionState::Disconnected);
    }
}
