//! EventLogService - Append-only detection log and notification sink
//!
//! ## Responsibilities
//!
//! - Keep every record of the session in arrival order
//! - Assign arrival ids (never reused)
//! - Fan out appended records to dashboard clients
//! - Emit "Detection Alert" toasts for non-raw records
//!
//! Operational messages are stamped with the local wall-clock time of
//! append. Backend events keep the timestamp they were reported with.

use crate::models::{DetectionRecord, Notification, RecordDraft, RecordKind};
use crate::realtime_hub::{HubMessage, RealtimeHub};
use chrono::Local;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Title of every detection toast
pub const DETECTION_ALERT_TITLE: &str = "Detection Alert";

/// Append-only record storage
struct RecordLog {
    records: Vec<DetectionRecord>,
    next_id: u64,
}

impl RecordLog {
    fn new() -> Self {
        Self {
            records: Vec::new(),
            next_id: 1,
        }
    }

    fn push(&mut self, draft: RecordDraft) -> DetectionRecord {
        let record = DetectionRecord::from_draft(self.next_id, draft);
        self.next_id += 1;
        self.records.push(record.clone());
        record
    }

    fn get_latest(&self, count: usize) -> Vec<DetectionRecord> {
        let start = self.records.len().saturating_sub(count);
        self.records[start..].to_vec()
    }

    fn get_by_feed(&self, feed_id: &str, count: usize) -> Vec<DetectionRecord> {
        let mut matching: Vec<DetectionRecord> = self
            .records
            .iter()
            .rev()
            .filter(|r| r.feed_id.as_deref() == Some(feed_id))
            .take(count)
            .cloned()
            .collect();
        matching.reverse();
        matching
    }

    fn get(&self, id: u64) -> Option<DetectionRecord> {
        // ids are dense and start at 1
        let index = usize::try_from(id.checked_sub(1)?).ok()?;
        self.records.get(index).cloned()
    }
}

/// EventLogService instance
pub struct EventLogService {
    log: RwLock<RecordLog>,
    realtime_hub: Arc<RealtimeHub>,
}

impl EventLogService {
    /// Create new EventLogService
    pub fn new(realtime_hub: Arc<RealtimeHub>) -> Self {
        Self {
            log: RwLock::new(RecordLog::new()),
            realtime_hub,
        }
    }

    /// Append a record at the tail
    ///
    /// The hub broadcast happens under the log lock so clients see records
    /// in log order.
    pub async fn append(&self, draft: RecordDraft) -> DetectionRecord {
        let mut log = self.log.write().await;
        let record = log.push(draft);

        tracing::debug!(
            record_id = record.id,
            kind = ?record.kind,
            feed_id = ?record.feed_id,
            "Record appended to detection log"
        );

        self.realtime_hub
            .broadcast(HubMessage::LogRecord(record.clone()))
            .await;

        if let Some(alert) = detection_alert(&record) {
            self.realtime_hub
                .broadcast(HubMessage::Notification(alert))
                .await;
        }

        record
    }

    /// Append an operational message, prefixed with the local time of append
    pub async fn info(&self, message: impl AsRef<str>) -> DetectionRecord {
        let now = Local::now().format("%H:%M:%S").to_string();
        let line = format!("[{}] {}", now, message.as_ref());
        tracing::info!(message = %message.as_ref(), "Dashboard log");

        let mut draft = RecordDraft::raw(line);
        draft.timestamp = Some(now);
        self.append(draft).await
    }

    /// Send a toast without touching the log
    pub async fn notify(&self, notification: Notification) {
        tracing::debug!(title = %notification.title, "Notification dispatched");
        self.realtime_hub
            .broadcast(HubMessage::Notification(notification))
            .await;
    }

    /// Latest records, oldest first
    pub async fn get_latest(&self, count: usize) -> Vec<DetectionRecord> {
        self.log.read().await.get_latest(count)
    }

    /// Latest records of one feed, oldest first
    pub async fn get_by_feed(&self, feed_id: &str, count: usize) -> Vec<DetectionRecord> {
        self.log.read().await.get_by_feed(feed_id, count)
    }

    /// Whole session log
    pub async fn all(&self) -> Vec<DetectionRecord> {
        self.log.read().await.records.clone()
    }

    /// Look up a record by id
    pub async fn get(&self, id: u64) -> Option<DetectionRecord> {
        self.log.read().await.get(id)
    }

    /// Get record count
    pub async fn count(&self) -> usize {
        self.log.read().await.records.len()
    }
}

/// Toast for a backend detection, None for raw lines
pub fn detection_alert(record: &DetectionRecord) -> Option<Notification> {
    let description = match record.kind {
        RecordKind::Raw => return None,
        RecordKind::Audio => format!("Audio: {}", record.display_text),
        RecordKind::Standard => match &record.timestamp {
            Some(ts) => format!("{} at {}", record.display_text, ts),
            None => record.display_text.clone(),
        },
    };
    Some(Notification::info(DETECTION_ALERT_TITLE, description))
}
