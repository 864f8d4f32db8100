//! Application state
//!
//! Holds all shared components and configuration

use crate::connection_manager::{ConnectionConfig, ConnectionManager, Transport};
use crate::error::{Error, Result};
use crate::event_log_service::EventLogService;
use crate::feed_registry::{Feed, FeedRegistry, DEFAULT_MAX_ACTIVE_FEEDS};
use crate::ingest_pipeline::IngestPipeline;
use crate::playback_dispatcher::PlaybackDispatcher;
use crate::realtime_hub::RealtimeHub;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Transport mode selected by `DETECTION_TRANSPORT`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    Stream,
    Poll,
}

impl std::str::FromStr for TransportMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stream" | "ws" | "websocket" => Ok(Self::Stream),
            "poll" | "http" => Ok(Self::Poll),
            other => Err(Error::Config(format!(
                "DETECTION_TRANSPORT must be 'stream' or 'poll', got '{}'",
                other
            ))),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Streaming or polling
    pub transport_mode: TransportMode,
    /// Detection backend endpoint
    pub detection_url: String,
    /// Poll period
    pub poll_interval: Duration,
    /// Active feed capacity
    pub max_active_feeds: usize,
    /// Connect / request timeout against the detection backend
    pub http_timeout: Duration,
    /// JSON array of feeds known at startup
    pub feeds_file: Option<PathBuf>,
    /// Feed ids activated at startup
    pub initial_active_feeds: Vec<String>,
    /// Connect to the detection backend on startup
    pub auto_connect: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            transport_mode: TransportMode::Poll,
            detection_url: "http://localhost:8000/latest-detections".to_string(),
            poll_interval: Duration::from_millis(5000),
            max_active_feeds: DEFAULT_MAX_ACTIVE_FEEDS,
            http_timeout: Duration::from_millis(5000),
            feeds_file: None,
            initial_active_feeds: Vec::new(),
            auto_connect: true,
        }
    }
}

impl AppConfig {
    /// Read configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let transport_mode = match std::env::var("DETECTION_TRANSPORT") {
            Ok(value) => value.parse()?,
            Err(_) => defaults.transport_mode,
        };

        Ok(Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            transport_mode,
            detection_url: std::env::var("DETECTION_URL").unwrap_or(defaults.detection_url),
            poll_interval: env_millis("POLL_INTERVAL_MS").unwrap_or(defaults.poll_interval),
            max_active_feeds: std::env::var("MAX_ACTIVE_FEEDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_active_feeds),
            http_timeout: env_millis("HTTP_TIMEOUT_MS").unwrap_or(defaults.http_timeout),
            feeds_file: std::env::var("FEEDS_FILE").ok().map(PathBuf::from),
            initial_active_feeds: std::env::var("INITIAL_ACTIVE_FEEDS")
                .map(|v| parse_id_list(&v))
                .unwrap_or_default(),
            auto_connect: std::env::var("AUTO_CONNECT")
                .map(|v| !matches!(v.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no"))
                .unwrap_or(defaults.auto_connect),
        })
    }

    /// Transport built from the mode, URL and interval
    pub fn transport(&self) -> Transport {
        match self.transport_mode {
            TransportMode::Stream => Transport::Streaming {
                url: self.detection_url.clone(),
            },
            TransportMode::Poll => Transport::Polling {
                url: self.detection_url.clone(),
                interval: self.poll_interval,
            },
        }
    }
}

fn env_millis(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
}

fn parse_id_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

/// Read the static feed list
pub fn load_static_feeds(path: &Path) -> Result<Vec<Feed>> {
    let content = std::fs::read_to_string(path)?;
    let feeds: Vec<Feed> = serde_json::from_str(&content)?;
    Ok(feeds)
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// RealtimeHub (dashboard WebSocket push)
    pub realtime: Arc<RealtimeHub>,
    /// EventLogService (detection log and notifications)
    pub event_log: Arc<EventLogService>,
    /// FeedRegistry
    pub registry: Arc<FeedRegistry>,
    /// IngestPipeline (ordering gate for every inbound source)
    pub pipeline: Arc<IngestPipeline>,
    /// ConnectionManager (detection backend)
    pub connection: Arc<ConnectionManager>,
    /// PlaybackDispatcher
    pub playback: Arc<PlaybackDispatcher>,
    /// Process start, for uptime
    pub started_at: Instant,
}

impl AppState {
    /// Wire all components for `config`
    pub fn new(config: AppConfig) -> Result<Self> {
        let realtime = Arc::new(RealtimeHub::new());
        let event_log = Arc::new(EventLogService::new(realtime.clone()));
        let registry = Arc::new(FeedRegistry::new(config.max_active_feeds, event_log.clone()));
        let pipeline = Arc::new(IngestPipeline::new(registry.clone(), event_log.clone()));
        let connection = Arc::new(ConnectionManager::new(
            ConnectionConfig {
                transport: config.transport(),
                request_timeout: config.http_timeout,
            },
            pipeline.clone(),
            event_log.clone(),
            realtime.clone(),
        )?);
        let playback = Arc::new(PlaybackDispatcher::new(realtime.clone()));

        Ok(Self {
            config,
            realtime,
            event_log,
            registry,
            pipeline,
            connection,
            playback,
            started_at: Instant::now(),
        })
    }

    /// Startup line first, then the static feeds
    pub async fn initialize(&self, feeds: Vec<Feed>) {
        self.event_log
            .info("System initialized. Ready for detection.")
            .await;
        self.seed_feeds(feeds).await;
    }

    /// Register static feeds and activate the configured ones
    ///
    /// Unknown or rejected ids are logged and skipped.
    pub async fn seed_feeds(&self, feeds: Vec<Feed>) {
        for feed in feeds {
            let id = feed.id.clone();
            if let Err(e) = self.registry.register_feed(feed).await {
                tracing::warn!(feed_id = %id, error = %e, "Skipping static feed");
            }
        }

        for id in &self.config.initial_active_feeds {
            if let Err(e) = self.registry.toggle_active(id).await {
                tracing::warn!(feed_id = %id, error = %e, "Could not activate feed at startup");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_mode_parse() {
        assert_eq!("stream".parse::<TransportMode>().unwrap(), TransportMode::Stream);
        assert_eq!(" POLL ".parse::<TransportMode>().unwrap(), TransportMode::Poll);
        assert!(matches!("carrier-pigeon".parse::<TransportMode>(), Err(Error::Config(_))));
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.max_active_feeds, 5);
        assert_eq!(
            config.transport(),
            Transport::Polling {
                url: "http://localhost:8000/latest-detections".to_string(),
                interval: Duration::from_secs(5),
            }
        );
    }

    #[test]
    fn test_parse_id_list() {
        assert_eq!(parse_id_list("1, 2,,3 "), ["1", "2", "3"]);
        assert!(parse_id_list("").is_empty());
    }

    #[tokio::test]
    async fn test_seed_feeds_activates_known_ids() {
        let config = AppConfig {
            initial_active_feeds: vec!["1".to_string(), "9".to_string()],
            ..AppConfig::default()
        };
        let state = AppState::new(config).unwrap();
        state
            .seed_feeds(vec![
                Feed::new("1", "Front Door", "http://cam1/stream"),
                Feed::new("2", "Back Yard", "192.168.1.20"),
            ])
            .await;

        assert_eq!(state.registry.list().await.len(), 2);
        assert_eq!(state.registry.active_view().await.active_feeds, ["1"]);
        assert_eq!(
            state.registry.get("2").await.unwrap().url,
            "http://192.168.1.20"
        );
    }

    #[tokio::test]
    async fn test_initialize_logs_ready_before_feeds() {
        let state = AppState::new(AppConfig::default()).unwrap();
        state
            .initialize(vec![Feed::new("1", "Front Door", "http://cam1/stream")])
            .await;

        let texts: Vec<String> = state
            .event_log
            .all()
            .await
            .into_iter()
            .map(|r| r.display_text)
            .collect();
        assert!(texts[0].ends_with("System initialized. Ready for detection."));
        assert!(texts[1].ends_with("New camera feed connected: Front Door"));
        assert_eq!(texts.len(), 2);
    }
}
