//! FeedRegistry - Known camera feeds and the active subset
//!
//! ## Responsibilities
//!
//! - Authoritative store of feeds (first sighting wins, never deleted)
//! - URL normalization (advisory on register, enforced on update)
//! - Capacity-bounded active set and display cursor
//!
//! Mutations report back to the caller with a `Result` and confirm
//! themselves on the detection log.

mod types;
pub mod address;

pub use types::*;

use crate::error::{Error, Result};
use crate::event_log_service::EventLogService;
use crate::models::Notification;
use std::sync::Arc;
use tokio::sync::RwLock;

use self::address::{is_valid_feed_url, normalize_feed_url};

struct RegistryState {
    /// Insertion order is display order
    feeds: Vec<Feed>,
    active: ActiveFeedSet,
}

impl RegistryState {
    fn feed_mut(&mut self, id: &str) -> Result<&mut Feed> {
        self.feeds
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or_else(|| Error::NotFound(format!("Feed {}", id)))
    }
}

/// FeedRegistry instance
pub struct FeedRegistry {
    state: RwLock<RegistryState>,
    event_log: Arc<EventLogService>,
}

impl FeedRegistry {
    /// Create a registry bounded to `max_active_feeds` active feeds
    pub fn new(max_active_feeds: usize, event_log: Arc<EventLogService>) -> Self {
        Self {
            state: RwLock::new(RegistryState {
                feeds: Vec::new(),
                active: ActiveFeedSet::new(max_active_feeds),
            }),
            event_log,
        }
    }

    /// Admit a feed on first sighting
    ///
    /// Returns false when the id is already known. A URL that fails
    /// validation only produces a warning line.
    pub async fn register_feed(&self, mut feed: Feed) -> Result<bool> {
        if feed.id.trim().is_empty() {
            return Err(Error::Validation("Feed id must not be empty".to_string()));
        }

        let mut url_warning = false;
        if !feed.url.is_empty() {
            feed.url = normalize_feed_url(&feed.url);
            url_warning = !is_valid_feed_url(&feed.url);
        }

        {
            let mut state = self.state.write().await;
            if state.feeds.iter().any(|f| f.id == feed.id) {
                tracing::debug!(feed_id = %feed.id, "Feed already registered");
                return Ok(false);
            }
            state.feeds.push(feed.clone());
        }

        tracing::info!(feed_id = %feed.id, name = %feed.name, url = %feed.url, "Feed registered");

        if url_warning {
            tracing::warn!(feed_id = %feed.id, url = %feed.url, "Feed URL format may not be supported");
            self.event_log
                .info(format!(
                    "Warning: Feed URL format for {} may not be supported",
                    feed.name
                ))
                .await;
        }
        self.event_log
            .info(format!("New camera feed connected: {}", feed.name))
            .await;
        self.event_log
            .notify(Notification::info(
                "New Camera Connected",
                format!("{} has been added to available feeds.", feed.name),
            ))
            .await;

        Ok(true)
    }

    /// Rename a feed
    pub async fn rename_feed(&self, id: &str, name: &str) -> Result<Feed> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Validation("Feed name must not be empty".to_string()));
        }

        let feed = {
            let mut state = self.state.write().await;
            let feed = state.feed_mut(id)?;
            feed.name = name.to_string();
            feed.clone()
        };

        self.event_log
            .info(format!("Camera feed {} renamed to: {}", id, name))
            .await;
        Ok(feed)
    }

    /// Replace a feed's stream URL
    ///
    /// Unknown ids fail before the URL is looked at. Invalid URLs are
    /// rejected and the previous value is kept.
    pub async fn update_feed_url(&self, id: &str, url: &str) -> Result<Feed> {
        let processed = normalize_feed_url(url);

        let updated = {
            let mut state = self.state.write().await;
            let feed = state.feed_mut(id)?;
            if is_valid_feed_url(&processed) {
                feed.url = processed.clone();
                Some(feed.clone())
            } else {
                None
            }
        };

        let Some(feed) = updated else {
            tracing::warn!(feed_id = %id, url = %processed, "Rejected invalid feed URL");
            self.event_log
                .notify(Notification::destructive(
                    "Invalid URL format",
                    "Please enter a valid stream URL or IP address",
                ))
                .await;
            return Err(Error::Validation(format!("Invalid feed URL: {}", url)));
        };

        self.event_log
            .info(format!("Updated URL for {}: {}", feed.name, processed))
            .await;
        self.event_log
            .notify(Notification::info(
                "Feed URL Updated",
                format!("URL for {} has been updated.", feed.name),
            ))
            .await;
        Ok(feed)
    }

    /// Switch detection mode, optionally storing a prompt for it
    pub async fn set_detection_mode(
        &self,
        id: &str,
        mode_id: &str,
        prompt: Option<String>,
    ) -> Result<Feed> {
        if find_mode(mode_id).is_none() {
            return Err(Error::Validation(format!("Unknown detection mode: {}", mode_id)));
        }

        let (feed, mode_changed) = {
            let mut state = self.state.write().await;
            let feed = state.feed_mut(id)?;
            let mode_changed = feed.detection_mode != mode_id;
            feed.detection_mode = mode_id.to_string();

            let stored = match &prompt {
                Some(p) => p.clone(),
                None => feed.prompts.get(mode_id).cloned().unwrap_or_default(),
            };
            feed.prompts.insert(mode_id.to_string(), stored);
            (feed.clone(), mode_changed)
        };

        if mode_changed {
            self.event_log
                .info(format!("Set detection mode for {} to {}", feed.name, mode_id))
                .await;
        }
        if let Some(p) = prompt {
            self.event_log
                .info(format!("Updated {} prompt for {}: {}", mode_id, feed.name, p))
                .await;
        }
        Ok(feed)
    }

    /// Add or remove a feed from the active set
    pub async fn toggle_active(&self, id: &str) -> Result<ActiveView> {
        let result = {
            let mut state = self.state.write().await;
            if !state.feeds.iter().any(|f| f.id == id) {
                return Err(Error::NotFound(format!("Feed {}", id)));
            }
            state
                .active
                .toggle(id)
                .map(|outcome| (outcome, ActiveView::from(&state.active)))
        };

        match result {
            Ok((outcome, view)) => {
                tracing::info!(feed_id = %id, outcome = ?outcome, active = view.active_feeds.len(), "Active feeds changed");
                Ok(view)
            }
            Err(e) => {
                if let Error::CapacityExceeded { limit } = &e {
                    tracing::warn!(feed_id = %id, limit = limit, "Active feed capacity reached");
                    self.event_log
                        .notify(Notification::destructive(
                            "Maximum feeds reached",
                            format!("You can have a maximum of {} active feeds", limit),
                        ))
                        .await;
                }
                Err(e)
            }
        }
    }

    /// Move the display cursor
    pub async fn advance_display(&self, step: DisplayStep) -> ActiveView {
        let mut state = self.state.write().await;
        state.active.advance(step);
        ActiveView::from(&state.active)
    }

    /// Active ids and cursor
    pub async fn active_view(&self) -> ActiveView {
        ActiveView::from(&self.state.read().await.active)
    }

    /// Feed under the display cursor
    pub async fn displayed(&self) -> Option<DisplayedFeed> {
        let state = self.state.read().await;
        let current = state.active.current()?;
        let feed = state.feeds.iter().find(|f| f.id == current)?.clone();
        Some(DisplayedFeed {
            feed,
            total_feeds: state.active.len(),
            feed_index: state.active.current_index(),
        })
    }

    /// Get a feed
    pub async fn get(&self, id: &str) -> Option<Feed> {
        self.state
            .read()
            .await
            .feeds
            .iter()
            .find(|f| f.id == id)
            .cloned()
    }

    /// All feeds in registration order
    pub async fn list(&self) -> Vec<Feed> {
        self.state.read().await.feeds.clone()
    }
}
