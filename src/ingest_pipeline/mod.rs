//! IngestPipeline - Ordered path from raw payload to log
//!
//! ## Responsibilities
//!
//! - Serialize ingestion from every source (stream, poll, HTTP endpoint)
//! - Drop malformed payloads with a logged error
//! - Route feed sightings to the FeedRegistry
//! - Normalize and append everything else
//!
//! All sources go through one ordering gate, so two inbound messages are
//! never processed concurrently and the log reflects arrival order.

use crate::error::Result;
use crate::event_log_service::EventLogService;
use crate::event_normalizer::{EventNormalizer, InboundPayload};
use crate::feed_registry::FeedRegistry;
use crate::models::DetectionRecord;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

/// IngestPipeline instance
pub struct IngestPipeline {
    normalizer: EventNormalizer,
    registry: Arc<FeedRegistry>,
    event_log: Arc<EventLogService>,
    order: Mutex<()>,
}

impl IngestPipeline {
    pub fn new(registry: Arc<FeedRegistry>, event_log: Arc<EventLogService>) -> Self {
        Self {
            normalizer: EventNormalizer::new(registry.clone()),
            registry,
            event_log,
            order: Mutex::new(()),
        }
    }

    /// Hold the ordering gate
    ///
    /// Anything appended while the guard is alive is ordered against
    /// inbound payloads.
    pub async fn lock_order(&self) -> MutexGuard<'_, ()> {
        self.order.lock().await
    }

    /// Ingest payloads from a source that is always live (HTTP endpoint)
    pub async fn ingest(&self, payloads: Vec<Result<InboundPayload>>) -> Vec<DetectionRecord> {
        let _gate = self.order.lock().await;
        self.process(payloads).await
    }

    /// Ingest payloads on behalf of a connection session
    ///
    /// Returns None, discarding the batch, when the session was cancelled
    /// before the gate was acquired.
    pub async fn ingest_for_session(
        &self,
        session: &CancellationToken,
        payloads: Vec<Result<InboundPayload>>,
    ) -> Option<Vec<DetectionRecord>> {
        let _gate = self.order.lock().await;
        if session.is_cancelled() {
            tracing::debug!(
                payloads = payloads.len(),
                "Session cancelled, discarding late payloads"
            );
            return None;
        }
        Some(self.process(payloads).await)
    }

    async fn process(&self, payloads: Vec<Result<InboundPayload>>) -> Vec<DetectionRecord> {
        let mut appended = Vec::with_capacity(payloads.len());
        for payload in payloads {
            let payload = match payload {
                Ok(p) => p,
                Err(e) => {
                    tracing::error!(error = %e, "Dropping malformed payload");
                    continue;
                }
            };

            if let InboundPayload::FeedAnnouncement(feed) = payload {
                if let Err(e) = self.registry.register_feed(feed).await {
                    tracing::error!(error = %e, "Dropping invalid feed announcement");
                }
                continue;
            }

            if let Some(draft) = self.normalizer.normalize(payload).await {
                appended.push(self.event_log.append(draft).await);
            }
        }
        appended
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::models::RecordKind;
    use crate::realtime_hub::RealtimeHub;

    fn pipeline() -> (IngestPipeline, Arc<FeedRegistry>, Arc<EventLogService>) {
        let log = Arc::new(EventLogService::new(Arc::new(RealtimeHub::new())));
        let registry = Arc::new(FeedRegistry::new(5, log.clone()));
        (IngestPipeline::new(registry.clone(), log.clone()), registry, log)
    }

    #[tokio::test]
    async fn test_ingest_in_order_skipping_malformed() {
        let (pipeline, _registry, log) = pipeline();
        let payloads = InboundPayload::parse_text(
            r#"[{"event":"a","timestamp":"1"}, 42, "plain", {"event":"b","timestamp":"2"}]"#,
        );
        let records = pipeline.ingest(payloads).await;

        assert_eq!(records.len(), 3);
        let texts: Vec<_> = log.all().await.into_iter().map(|r| r.display_text).collect();
        assert_eq!(texts, ["a", "plain", "b"]);
    }

    #[tokio::test]
    async fn test_feed_announcement_registers_once() {
        let (pipeline, registry, log) = pipeline();
        let announce = r#"{"id":"2","name":"Back Yard","url":""}"#;
        pipeline.ingest(InboundPayload::parse_text(announce)).await;
        pipeline.ingest(InboundPayload::parse_text(announce)).await;

        assert_eq!(registry.list().await.len(), 1);
        let connected = log
            .all()
            .await
            .into_iter()
            .filter(|r| r.display_text.ends_with("New camera feed connected: Back Yard"))
            .count();
        assert_eq!(connected, 1);
    }

    #[tokio::test]
    async fn test_cancelled_session_discards() {
        let (pipeline, _registry, log) = pipeline();
        let session = CancellationToken::new();

        let out = pipeline
            .ingest_for_session(&session, vec![Ok(InboundPayload::Text("x".to_string()))])
            .await;
        assert_eq!(out.unwrap()[0].kind, RecordKind::Raw);

        session.cancel();
        let out = pipeline
            .ingest_for_session(&session, vec![Ok(InboundPayload::Text("y".to_string()))])
            .await;
        assert!(out.is_none());
        assert_eq!(log.count().await, 1);
    }

    #[tokio::test]
    async fn test_malformed_only_appends_nothing() {
        let (pipeline, _registry, log) = pipeline();
        let records = pipeline
            .ingest(vec![Err(Error::MalformedPayload("bad".to_string()))])
            .await;
        assert!(records.is_empty());
        assert_eq!(log.count().await, 0);
    }
}
