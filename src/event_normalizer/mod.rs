//! EventNormalizer - Canonical records from inbound payloads
//!
//! ## Responsibilities
//!
//! - Audio vs visual formatting
//! - Feed name / stream URL resolution through the FeedRegistry
//! - Embedded JSON fragments in free text
//!
//! Never fails: anything it cannot interpret becomes a raw text record.

mod payload;

pub use payload::{embedded_detection, find_json_fragment, DetectionPayload, InboundPayload};

use crate::feed_registry::FeedRegistry;
use crate::models::{RecordDraft, RecordKind};
use std::sync::Arc;

/// Feed id used for audio events that do not name one
pub const AUDIO_FEED_ID: &str = "audio";

/// EventNormalizer instance
pub struct EventNormalizer {
    registry: Arc<FeedRegistry>,
}

impl EventNormalizer {
    pub fn new(registry: Arc<FeedRegistry>) -> Self {
        Self { registry }
    }

    /// Zero or one record for a payload
    ///
    /// Feed announcements produce no record.
    pub async fn normalize(&self, payload: InboundPayload) -> Option<RecordDraft> {
        match payload {
            InboundPayload::Detection(detection) => Some(self.normalize_detection(detection).await),
            InboundPayload::Text(text) => Some(self.normalize_text(text).await),
            InboundPayload::FeedAnnouncement(_) => None,
        }
    }

    /// Structured detection event
    pub async fn normalize_detection(&self, payload: DetectionPayload) -> RecordDraft {
        if payload.is_audio() {
            return normalize_audio(payload);
        }

        let feed = match &payload.feed_id {
            Some(id) => self.registry.get(id).await,
            None => None,
        };

        let display_text = match (&payload.feed_id, &feed) {
            (_, Some(feed)) => format!("{} on {}", payload.event, feed.name),
            (Some(id), None) => format!("{} on Feed {}", payload.event, id),
            (None, None) => payload.event.clone(),
        };

        let video_ref = payload.video_url.clone().or_else(|| {
            feed.as_ref()
                .map(|f| f.url.clone())
                .filter(|url| !url.is_empty())
        });

        RecordDraft {
            display_text,
            timestamp: payload.timestamp,
            feed_id: payload.feed_id,
            video_ref,
            kind: RecordKind::Standard,
        }
    }

    /// Free text, using an embedded detection fragment when one is present
    pub async fn normalize_text(&self, text: String) -> RecordDraft {
        match embedded_detection(&text) {
            Some(detection) => {
                tracing::debug!(event = %detection.event, "Embedded detection found in text payload");
                self.normalize_detection(detection).await
            }
            None => RecordDraft::raw(text),
        }
    }
}

fn normalize_audio(payload: DetectionPayload) -> RecordDraft {
    let display_text = match payload.probability {
        Some(p) => format!("{} ({:.1}%)", payload.event, p * 100.0),
        None => payload.event.clone(),
    };

    RecordDraft {
        display_text,
        timestamp: payload.timestamp,
        feed_id: Some(
            payload
                .feed_id
                .unwrap_or_else(|| AUDIO_FEED_ID.to_string()),
        ),
        video_ref: payload.video_url,
        kind: RecordKind::Audio,
    }
}
