//! RealtimeHub - WebSocket distribution to dashboard clients
//!
//! ## Responsibilities
//!
//! - Dashboard WebSocket connection management
//! - Log record broadcasting (terminal panel)
//! - Notification broadcasting (toast sink)
//! - Connection state and playback changes
//!
//! Note: camera images are never pushed here. Clients fetch streams
//! directly from the feed URL.

use crate::connection_manager::ConnectionState;
use crate::models::{DetectionRecord, Notification};
use crate::playback_dispatcher::PlaybackRequest;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Hub message types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum HubMessage {
    /// A record was appended to the detection log
    LogRecord(DetectionRecord),
    /// Toast for the notification area
    Notification(Notification),
    ConnectionState(ConnectionStateMessage),
    /// Active playback changed (None = closed)
    Playback(Option<PlaybackRequest>),
}

impl HubMessage {
    fn type_name(&self) -> &'static str {
        match self {
            HubMessage::LogRecord(_) => "log_record",
            HubMessage::Notification(_) => "notification",
            HubMessage::ConnectionState(_) => "connection_state",
            HubMessage::Playback(_) => "playback",
        }
    }
}

/// Connection state message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionStateMessage {
    pub state: ConnectionState,
    pub connected: bool,
}

impl From<ConnectionState> for ConnectionStateMessage {
    fn from(state: ConnectionState) -> Self {
        Self {
            state,
            connected: state.is_connected(),
        }
    }
}

/// Client connection
struct ClientConnection {
    id: Uuid,
    tx: mpsc::UnboundedSender<String>,
}

/// RealtimeHub instance
pub struct RealtimeHub {
    connections: RwLock<HashMap<Uuid, ClientConnection>>,
    connection_count: AtomicU64,
}

impl RealtimeHub {
    /// Create new RealtimeHub
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            connection_count: AtomicU64::new(0),
        }
    }

    /// Register a new client
    pub async fn register(&self) -> (Uuid, mpsc::UnboundedReceiver<String>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        {
            let mut connections = self.connections.write().await;
            connections.insert(id, ClientConnection { id, tx });
        }

        self.connection_count.fetch_add(1, Ordering::Relaxed);

        tracing::info!(connection_id = %id, "Dashboard client connected");

        (id, rx)
    }

    /// Unregister a client
    pub async fn unregister(&self, id: &Uuid) {
        let mut connections = self.connections.write().await;
        if connections.remove(id).is_some() {
            self.connection_count.fetch_sub(1, Ordering::Relaxed);
            tracing::info!(connection_id = %id, "Dashboard client disconnected");
        }
    }

    /// Broadcast message to all clients
    pub async fn broadcast(&self, message: HubMessage) {
        tracing::debug!(message_type = %message.type_name(), "Broadcasting message to clients");

        let json = match serde_json::to_string(&message) {
            Ok(j) => j,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize message");
                return;
            }
        };

        let connections = self.connections.read().await;
        for conn in connections.values() {
            if let Err(e) = conn.tx.send(json.clone()) {
                tracing::warn!(connection_id = %conn.id, error = %e, "Failed to send message");
            }
        }
    }

    /// Get connection count
    pub fn connection_count(&self) -> u64 {
        self.connection_count.load(Ordering::Relaxed)
    }
}

impl Default for RealtimeHub {
    fn default() -> Self {
        Self::new()
    }
}
