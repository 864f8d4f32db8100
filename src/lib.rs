//! livewatch - Live detection event pipeline
//!
//! Backend of the camera monitoring dashboard: receives detection events,
//! normalizes them into a session log, and pushes log records,
//! notifications and playback requests to dashboard clients.
//!
//! ## Architecture (7 Components)
//!
//! 1. ConnectionManager - Detection backend link (stream or poll)
//! 2. IngestPipeline - Ordering gate for every inbound source
//! 3. EventNormalizer - Payload to canonical record
//! 4. FeedRegistry - Known feeds, active set, display cursor
//! 5. EventLogService - Append-only log and notifications
//! 6. PlaybackDispatcher - Single active playback request
//! 7. RealtimeHub - WebSocket push to dashboard clients
//!
//! WebAPI exposes all of the above over HTTP.

pub mod connection_manager;
pub mod error;
pub mod event_log_service;
pub mod event_normalizer;
pub mod feed_registry;
pub mod ingest_pipeline;
pub mod models;
pub mod playback_dispatcher;
pub mod realtime_hub;
pub mod state;
pub mod web_api;

pub use error::{Error, Result};
pub use state::AppState;
