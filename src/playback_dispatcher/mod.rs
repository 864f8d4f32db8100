//! PlaybackDispatcher - Single active playback request
//!
//! Opening a second playback implicitly closes the first. Records without
//! a video reference never open one.

use crate::models::DetectionRecord;
use crate::realtime_hub::{HubMessage, RealtimeHub};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Request to view the video behind a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackRequest {
    pub timestamp: String,
    pub video_ref: String,
}

/// PlaybackDispatcher instance
pub struct PlaybackDispatcher {
    active: RwLock<Option<PlaybackRequest>>,
    realtime_hub: Arc<RealtimeHub>,
}

impl PlaybackDispatcher {
    pub fn new(realtime_hub: Arc<RealtimeHub>) -> Self {
        Self {
            active: RwLock::new(None),
            realtime_hub,
        }
    }

    /// Open playback for a record, replacing any active one
    ///
    /// Returns the new request, or None (and changes nothing) when the
    /// record has no video reference.
    pub async fn request_playback(&self, record: &DetectionRecord) -> Option<PlaybackRequest> {
        let Some(video_ref) = record.video_ref.clone() else {
            tracing::debug!(record_id = record.id, "Record has no video, playback ignored");
            return None;
        };

        let request = PlaybackRequest {
            timestamp: record.timestamp.clone().unwrap_or_default(),
            video_ref,
        };

        let mut active = self.active.write().await;
        *active = Some(request.clone());
        tracing::info!(record_id = record.id, video_ref = %request.video_ref, "Playback opened");
        self.realtime_hub
            .broadcast(HubMessage::Playback(Some(request.clone())))
            .await;

        Some(request)
    }

    /// Clear the active request
    pub async fn close_playback(&self) {
        let mut active = self.active.write().await;
        if active.take().is_some() {
            tracing::info!("Playback closed");
        }
        self.realtime_hub.broadcast(HubMessage::Playback(None)).await;
    }

    /// Currently active request
    pub async fn active(&self) -> Option<PlaybackRequest> {
        self.active.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordKind;

    fn record(id: u64, video_ref: Option<&str>) -> DetectionRecord {
        DetectionRecord {
            id,
            display_text: "Person detected on Front Door".to_string(),
            timestamp: Some("10:00:00".to_string()),
            feed_id: Some("1".to_string()),
            video_ref: video_ref.map(str::to_string),
            kind: RecordKind::Standard,
        }
    }

    #[tokio::test]
    async fn test_request_and_close() {
        let dispatcher = PlaybackDispatcher::new(Arc::new(RealtimeHub::new()));
        let request = dispatcher
            .request_playback(&record(1, Some("http://cam1/clip.mp4")))
            .await
            .unwrap();
        assert_eq!(request.timestamp, "10:00:00");
        assert_eq!(dispatcher.active().await, Some(request));

        dispatcher.close_playback().await;
        assert!(dispatcher.active().await.is_none());

        // closing twice is harmless
        dispatcher.close_playback().await;
        assert!(dispatcher.active().await.is_none());
    }

    #[tokio::test]
    async fn test_second_request_replaces_first() {
        let dispatcher = PlaybackDispatcher::new(Arc::new(RealtimeHub::new()));
        dispatcher.request_playback(&record(1, Some("http://a/1.mp4"))).await;
        dispatcher.request_playback(&record(2, Some("http://b/2.mp4"))).await;
        assert_eq!(dispatcher.active().await.unwrap().video_ref, "http://b/2.mp4");
    }

    #[tokio::test]
    async fn test_record_without_video_keeps_active() {
        let dispatcher = PlaybackDispatcher::new(Arc::new(RealtimeHub::new()));
        dispatcher.request_playback(&record(1, Some("http://a/1.mp4"))).await;

        assert!(dispatcher.request_playback(&record(2, None)).await.is_none());
        assert_eq!(dispatcher.active().await.unwrap().video_ref, "http://a/1.mp4");
    }

    #[tokio::test]
    async fn test_playback_is_broadcast() {
        let hub = Arc::new(RealtimeHub::new());
        let (_id, mut rx) = hub.register().await;
        let dispatcher = PlaybackDispatcher::new(hub.clone());

        dispatcher.request_playback(&record(1, Some("http://a/1.mp4"))).await;
        dispatcher.close_playback().await;

        let opened: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(opened["type"], "playback");
        assert_eq!(opened["data"]["videoRef"], "http://a/1.mp4");
        let closed: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert!(closed["data"].is_null());
    }
}
