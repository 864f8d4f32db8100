//! ConnectionManager - Detection backend connectivity
//!
//! ## Responsibilities
//!
//! - Open and close the streaming or polling transport
//! - Own the connection state and publish every transition
//! - Turn transport failures into a Disconnected state plus a visible signal
//!
//! ## Ordering
//!
//! Each session carries a cancellation token. Disconnecting cancels the
//! token, waits for the session task, then appends the disconnect line
//! under the ingest ordering gate. Late payloads from the old session see
//! the cancelled token under the same gate and are discarded, so nothing
//! from that session lands after the disconnect line.

mod polling;
mod scheduler;
mod streaming;

pub use scheduler::{ScheduledTask, TickOutcome};

use crate::error::Result;
use crate::event_log_service::EventLogService;
use crate::ingest_pipeline::IngestPipeline;
use crate::models::Notification;
use crate::realtime_hub::{HubMessage, RealtimeHub};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Connection state of the detection backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }
}

/// How detection events are received
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    /// Persistent bidirectional stream, one text frame per message
    Streaming { url: String },
    /// Repeated HTTP GET at a fixed interval
    Polling { url: String, interval: Duration },
}

impl Transport {
    pub fn url(&self) -> &str {
        match self {
            Self::Streaming { url } | Self::Polling { url, .. } => url,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Streaming { .. } => "stream",
            Self::Polling { .. } => "poll",
        }
    }
}

/// Connection configuration
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub transport: Transport,
    /// Bound on connect and on each poll request
    pub request_timeout: Duration,
}

/// State shared between the manager and its session tasks
pub(crate) struct ConnectionShared {
    pipeline: Arc<IngestPipeline>,
    event_log: Arc<EventLogService>,
    realtime_hub: Arc<RealtimeHub>,
    state_tx: watch::Sender<ConnectionState>,
}

impl ConnectionShared {
    /// Apply a transition; returns false when the state was already `next`
    async fn set_state(&self, next: ConnectionState) -> bool {
        let changed = self.state_tx.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });

        if changed {
            tracing::info!(state = ?next, "Detection connection state changed");
            self.realtime_hub
                .broadcast(HubMessage::ConnectionState(next.into()))
                .await;
        }
        changed
    }

    /// Mark the session connected and log it once
    ///
    /// Returns false when the session was cancelled in the meantime.
    async fn mark_connected(&self, session: &CancellationToken, message: String) -> bool {
        let _gate = self.pipeline.lock_order().await;
        if session.is_cancelled() {
            return false;
        }
        if self.set_state(ConnectionState::Connected).await {
            self.event_log.info(message).await;
        }
        true
    }

    /// User-initiated disconnect line, written only on an actual transition
    async fn mark_disconnected(&self, message: &str) {
        let _gate = self.pipeline.lock_order().await;
        if self.set_state(ConnectionState::Disconnected).await {
            self.event_log.info(message).await;
        }
    }

    /// Transport failure on a live session
    ///
    /// Cancels the session so its timer stops. A session that was already
    /// cancelled is being closed deliberately and produces no signal.
    async fn connection_dropped(&self, session: &CancellationToken, message: String) {
        if session.is_cancelled() {
            return;
        }
        session.cancel();

        let _gate = self.pipeline.lock_order().await;
        if self.set_state(ConnectionState::Disconnected).await {
            tracing::warn!(reason = %message, "Detection connection dropped");
            self.event_log.info(&message).await;
            self.event_log
                .notify(Notification::destructive("Connection Lost", message))
                .await;
        }
    }
}

enum Worker {
    Reader(JoinHandle<()>),
    Poller(ScheduledTask),
}

struct Session {
    token: CancellationToken,
    worker: Worker,
}

impl Session {
    /// Cancel and wait until the session task has fully stopped
    async fn close(self) {
        self.token.cancel();
        match self.worker {
            Worker::Reader(handle) => {
                if let Err(e) = handle.await {
                    if e.is_panic() {
                        tracing::error!(error = %e, "Stream reader panicked");
                    }
                }
            }
            Worker::Poller(task) => task.shutdown().await,
        }
    }

    fn is_live(&self) -> bool {
        !self.token.is_cancelled()
    }
}

/// ConnectionManager instance
pub struct ConnectionManager {
    config: ConnectionConfig,
    http: reqwest::Client,
    shared: Arc<ConnectionShared>,
    session: Mutex<Option<Session>>,
}

impl ConnectionManager {
    pub fn new(
        config: ConnectionConfig,
        pipeline: Arc<IngestPipeline>,
        event_log: Arc<EventLogService>,
        realtime_hub: Arc<RealtimeHub>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);

        Ok(Self {
            config,
            http,
            shared: Arc::new(ConnectionShared {
                pipeline,
                event_log,
                realtime_hub,
                state_tx,
            }),
            session: Mutex::new(None),
        })
    }

    pub fn transport(&self) -> &Transport {
        &self.config.transport
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        *self.shared.state_tx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Observe state transitions
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Open the configured transport
    ///
    /// No-op on a live connected session. A stale session is fully closed
    /// before the new one opens. Connect failures leave the state
    /// Disconnected with a logged line and a notification.
    pub async fn connect(&self) -> Result<()> {
        let mut session = self.session.lock().await;

        if let Some(current) = session.as_ref() {
            if current.is_live() && self.is_connected() {
                tracing::debug!("Already connected, connect ignored");
                return Ok(());
            }
        }
        if let Some(stale) = session.take() {
            stale.close().await;
        }

        let token = CancellationToken::new();
        self.shared.set_state(ConnectionState::Connecting).await;
        tracing::info!(
            transport = self.config.transport.name(),
            url = %self.config.transport.url(),
            "Connecting to detection service"
        );

        let worker = match &self.config.transport {
            Transport::Streaming { url } => Worker::Reader(
                streaming::open(
                    self.shared.clone(),
                    url,
                    self.config.request_timeout,
                    token.clone(),
                )
                .await?,
            ),
            Transport::Polling { url, interval } => Worker::Poller(
                polling::open(
                    self.shared.clone(),
                    self.http.clone(),
                    url.clone(),
                    *interval,
                    token.clone(),
                )
                .await?,
            ),
        };

        *session = Some(Session { token, worker });
        Ok(())
    }

    /// Close the transport
    ///
    /// Idempotent: the disconnect line is logged only when the state
    /// actually changes.
    pub async fn disconnect(&self) {
        let previous = self.session.lock().await.take();
        if let Some(session) = previous {
            session.close().await;
        }
        self.shared
            .mark_disconnected("Disconnected from detection service")
            .await;
    }

    /// Disconnect then connect again
    pub async fn reconnect(&self) -> Result<()> {
        self.disconnect().await;
        self.connect().await
    }
}
