//! Shared models and types
//!
//! Types used by more than one component live here to avoid circular
//! dependencies between the normalizer, the log and the hub.

use serde::{Deserialize, Serialize};

/// Standard API response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_sec: u64,
    pub transport: String,
    pub detection_connected: bool,
    pub dashboard_clients: u64,
}

/// Kind of a detection record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Visual detection from a camera feed
    Standard,
    /// Audio classification
    Audio,
    /// Plain text line (operational messages, unparseable input)
    Raw,
}

/// A normalized record before the log assigns its arrival id
#[derive(Debug, Clone, PartialEq)]
pub struct RecordDraft {
    pub display_text: String,
    pub timestamp: Option<String>,
    pub feed_id: Option<String>,
    pub video_ref: Option<String>,
    pub kind: RecordKind,
}

impl RecordDraft {
    /// Raw text line with no other fields
    pub fn raw(text: impl Into<String>) -> Self {
        Self {
            display_text: text.into(),
            timestamp: None,
            feed_id: None,
            video_ref: None,
            kind: RecordKind::Raw,
        }
    }
}

/// Canonical log entry. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionRecord {
    pub id: u64,
    pub display_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feed_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_ref: Option<String>,
    pub kind: RecordKind,
}

impl DetectionRecord {
    pub(crate) fn from_draft(id: u64, draft: RecordDraft) -> Self {
        Self {
            id,
            display_text: draft.display_text,
            timestamp: draft.timestamp,
            feed_id: draft.feed_id,
            video_ref: draft.video_ref,
            kind: draft.kind,
        }
    }

    /// Line as shown in the terminal panel
    ///
    /// Raw records already carry their prefix in the display text.
    pub fn terminal_line(&self) -> String {
        match (&self.kind, &self.timestamp) {
            (RecordKind::Raw, _) | (_, None) => self.display_text.clone(),
            (_, Some(ts)) => format!("[{}] {}", ts, self.display_text),
        }
    }

    /// Whether this record can be played back
    pub fn has_video(&self) -> bool {
        self.video_ref.is_some()
    }
}

/// Toast style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationVariant {
    Default,
    Destructive,
}

/// User-facing notification handed to the toast sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub variant: NotificationVariant,
}

impl Notification {
    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            variant: NotificationVariant::Default,
        }
    }

    pub fn destructive(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            variant: NotificationVariant::Destructive,
        }
    }
}
