//! Feed registry types

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Mode every new feed starts in
pub const DEFAULT_DETECTION_MODE: &str = "none";

/// Default bound on concurrently displayed feeds
pub const DEFAULT_MAX_ACTIVE_FEEDS: usize = 5;

/// Registered camera source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feed {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_detection_mode")]
    pub detection_mode: String,
    /// Prompt per detection mode id
    #[serde(default)]
    pub prompts: BTreeMap<String, String>,
}

fn default_detection_mode() -> String {
    DEFAULT_DETECTION_MODE.to_string()
}

impl Feed {
    pub fn new(id: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            url: url.into(),
            detection_mode: default_detection_mode(),
            prompts: BTreeMap::new(),
        }
    }
}

/// Detection mode catalog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DetectionMode {
    pub id: &'static str,
    pub name: &'static str,
    /// Whether the mode takes a free-text prompt
    pub promptable: bool,
    /// Menu group the mode is listed under
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<&'static str>,
}

/// Built-in detection modes
pub const DETECTION_MODES: &[DetectionMode] = &[
    DetectionMode {
        id: "none",
        name: "None",
        promptable: false,
        group: None,
    },
    DetectionMode {
        id: "object",
        name: "Object Detection",
        promptable: true,
        group: None,
    },
    DetectionMode {
        id: "motion",
        name: "Motion Detection",
        promptable: true,
        group: None,
    },
    DetectionMode {
        id: "object-motion",
        name: "Object-specific Motion Detection",
        promptable: true,
        group: None,
    },
    DetectionMode {
        id: "entrance",
        name: "Entrance Detection",
        promptable: true,
        group: Some("No-go Zones"),
    },
    DetectionMode {
        id: "floor",
        name: "Floor Detection",
        promptable: true,
        group: Some("No-go Zones"),
    },
];

/// Look up a detection mode by id
pub fn find_mode(id: &str) -> Option<&'static DetectionMode> {
    DETECTION_MODES.iter().find(|m| m.id == id)
}

/// Cursor movement through the active set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayStep {
    Next,
    Prev,
}

/// Result of a successful toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToggleOutcome {
    Activated,
    Deactivated,
}

/// Ordered, capacity-bounded set of active feed ids plus the display cursor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveFeedSet {
    ids: Vec<String>,
    current_index: usize,
    capacity: usize,
}

impl ActiveFeedSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            ids: Vec::with_capacity(capacity),
            current_index: 0,
            capacity,
        }
    }

    /// Remove a member or append a non-member
    ///
    /// A full set rejects appends without mutating. The cursor goes back to 0
    /// on every successful change.
    pub fn toggle(&mut self, id: &str) -> Result<ToggleOutcome> {
        let outcome = if let Some(pos) = self.ids.iter().position(|a| a == id) {
            self.ids.remove(pos);
            ToggleOutcome::Deactivated
        } else {
            if self.ids.len() >= self.capacity {
                return Err(Error::CapacityExceeded {
                    limit: self.capacity,
                });
            }
            self.ids.push(id.to_string());
            ToggleOutcome::Activated
        };
        self.current_index = 0;
        Ok(outcome)
    }

    /// Cyclic cursor move; no-op with one or zero members
    pub fn advance(&mut self, step: DisplayStep) {
        let len = self.ids.len();
        if len <= 1 {
            return;
        }
        self.current_index = match step {
            DisplayStep::Next => (self.current_index + 1) % len,
            DisplayStep::Prev => (self.current_index + len - 1) % len,
        };
    }

    /// Id under the cursor
    pub fn current(&self) -> Option<&str> {
        self.ids.get(self.current_index).map(String::as_str)
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|a| a == id)
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub(crate) fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for ActiveFeedSet {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ACTIVE_FEEDS)
    }
}

/// Snapshot of the active set for the UI
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveView {
    pub active_feeds: Vec<String>,
    pub current_index: usize,
    pub max_active_feeds: usize,
}

impl From<&ActiveFeedSet> for ActiveView {
    fn from(set: &ActiveFeedSet) -> Self {
        Self {
            active_feeds: set.ids().to_vec(),
            current_index: set.current_index(),
            max_active_feeds: set.capacity(),
        }
    }
}

/// Feed under the display cursor
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayedFeed {
    #[serde(flatten)]
    pub feed: Feed,
    pub total_feeds: usize,
    pub feed_index: usize,
}

/// Request body for registering a feed
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFeedRequest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub detection_mode: Option<String>,
}

impl From<CreateFeedRequest> for Feed {
    fn from(req: CreateFeedRequest) -> Self {
        let mut feed = Feed::new(req.id, req.name, req.url);
        if let Some(mode) = req.detection_mode {
            feed.detection_mode = mode;
        }
        feed
    }
}
