//! Inbound payload shapes
//!
//! Every frame or poll element resolves into one [`InboundPayload`] variant
//! before normalization.

use crate::error::{Error, Result};
use crate::feed_registry::Feed;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Longest payload excerpt quoted in a malformed-payload error
const EXCERPT_LEN: usize = 120;

/// Envelope key carrying the batch on the latest-detections route
const DETECTIONS_KEY: &str = "detections";

/// Structured detection event as sent by the detection service
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionPayload {
    pub event: String,
    #[serde(default, deserialize_with = "scalar_string")]
    pub timestamp: Option<String>,
    #[serde(default, deserialize_with = "scalar_string")]
    pub feed_id: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
    /// Classifier confidence in 0..=1
    #[serde(default)]
    pub probability: Option<f64>,
    #[serde(default, rename = "type")]
    pub event_type: Option<String>,
}

impl DetectionPayload {
    pub fn is_audio(&self) -> bool {
        self.event_type.as_deref() == Some("audio")
    }
}

/// Accept `"1"` as well as `1` for id-like fields
fn scalar_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// One inbound message, resolved by shape
#[derive(Debug, Clone, PartialEq)]
pub enum InboundPayload {
    /// Object carrying an `event`
    Detection(DetectionPayload),
    /// Object carrying `id` and `name` but no `event`: a feed sighting
    FeedAnnouncement(Feed),
    /// Free text, possibly embedding a JSON fragment
    Text(String),
}

impl InboundPayload {
    /// Resolve an already decoded JSON value
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::String(text) => Ok(Self::Text(text)),
            Value::Object(map) => {
                if map.contains_key("event") {
                    serde_json::from_value(Value::Object(map))
                        .map(Self::Detection)
                        .map_err(|e| Error::MalformedPayload(format!("detection: {}", e)))
                } else if map.contains_key("id") && map.contains_key("name") {
                    serde_json::from_value(Value::Object(map))
                        .map(Self::FeedAnnouncement)
                        .map_err(|e| Error::MalformedPayload(format!("feed: {}", e)))
                } else {
                    Err(Error::MalformedPayload(format!(
                        "object without event: {}",
                        excerpt(&Value::Object(map).to_string())
                    )))
                }
            }
            other => Err(Error::MalformedPayload(format!(
                "unsupported payload: {}",
                excerpt(&other.to_string())
            ))),
        }
    }

    /// Resolve a text frame or response body
    ///
    /// A JSON array yields one payload per element. Text that is not JSON at
    /// all is kept as free text.
    pub fn parse_text(text: &str) -> Vec<Result<Self>> {
        match serde_json::from_str::<Value>(text) {
            Ok(value) => Self::from_json(value),
            Err(_) => vec![Ok(Self::Text(text.to_string()))],
        }
    }

    /// One payload per array element, or one for any other value
    ///
    /// The latest-detections envelope `{"success": .., "detections": [..]}`
    /// is flattened like a bare array.
    pub fn from_json(value: Value) -> Vec<Result<Self>> {
        match value {
            Value::Array(items) => items.into_iter().map(Self::from_value).collect(),
            Value::Object(mut map) if is_envelope(&map) => match map.remove(DETECTIONS_KEY) {
                Some(Value::Array(items)) => items.into_iter().map(Self::from_value).collect(),
                _ => Vec::new(),
            },
            value => vec![Self::from_value(value)],
        }
    }
}

fn is_envelope(map: &serde_json::Map<String, Value>) -> bool {
    !map.contains_key("event") && matches!(map.get(DETECTIONS_KEY), Some(Value::Array(_)))
}

fn excerpt(s: &str) -> String {
    if s.chars().count() <= EXCERPT_LEN {
        s.to_string()
    } else {
        let cut: String = s.chars().take(EXCERPT_LEN).collect();
        format!("{}...", cut)
    }
}

/// First balanced `{...}` slice of `text`
pub fn find_json_fragment(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Embedded detection inside free text
///
/// Only fragments that parse and carry both `event` and `timestamp` count.
pub fn embedded_detection(text: &str) -> Option<DetectionPayload> {
    let fragment = find_json_fragment(text)?;
    let value: Value = serde_json::from_str(fragment).ok()?;
    let map = value.as_object()?;
    if !map.contains_key("event") || !map.contains_key("timestamp") {
        return None;
    }
    serde_json::from_value(value).ok()
}
