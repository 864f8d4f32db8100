//! Polling transport
//!
//! HTTP GET against the latest-detections endpoint: once immediately, then
//! on every tick. The first failure cancels the timer. Bodies may be a bare
//! array or the `{"success": .., "detections": [..]}` envelope.

use super::scheduler::{ScheduledTask, TickOutcome};
use super::ConnectionShared;
use crate::error::{Error, Result};
use crate::event_normalizer::InboundPayload;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// First fetch, then the repeating poll task
pub(super) async fn open(
    shared: Arc<ConnectionShared>,
    http: reqwest::Client,
    url: String,
    interval: Duration,
    token: CancellationToken,
) -> Result<ScheduledTask> {
    let body = match fetch(&http, &url).await {
        Ok(body) => body,
        Err(e) => {
            shared
                .connection_dropped(&token, lost_line(&e))
                .await;
            return Err(e);
        }
    };

    let connected = shared
        .mark_connected(
            &token,
            format!(
                "Connected to detection service at {} (polling every {} ms)",
                url,
                interval.as_millis()
            ),
        )
        .await;
    if !connected {
        return Err(Error::ConnectivityLost("session closed while connecting".to_string()));
    }
    shared
        .pipeline
        .ingest_for_session(&token, InboundPayload::parse_text(&body))
        .await;

    let tick_token = token.clone();
    Ok(ScheduledTask::spawn_repeating(interval, token, move || {
        let shared = shared.clone();
        let http = http.clone();
        let url = url.clone();
        let token = tick_token.clone();
        async move { poll_once(&shared, &http, &url, &token).await }
    }))
}

async fn poll_once(
    shared: &ConnectionShared,
    http: &reqwest::Client,
    url: &str,
    token: &CancellationToken,
) -> TickOutcome {
    let result = tokio::select! {
        biased;
        _ = token.cancelled() => return TickOutcome::Stop,
        result = fetch(http, url) => result,
    };

    match result {
        Ok(body) => {
            let ingested = shared
                .pipeline
                .ingest_for_session(token, InboundPayload::parse_text(&body))
                .await;
            match ingested {
                Some(records) => {
                    tracing::trace!(records = records.len(), "Poll complete");
                    TickOutcome::Continue
                }
                None => TickOutcome::Stop,
            }
        }
        Err(e) => {
            shared
                .connection_dropped(token, lost_line(&e))
                .await;
            TickOutcome::Stop
        }
    }
}

fn lost_line(e: &Error) -> String {
    match e {
        Error::ConnectivityLost(reason) => format!("Connection to detection service lost: {}", reason),
        other => format!("Connection to detection service lost: {}", other),
    }
}

/// GET the endpoint; any non-2xx status counts as lost connectivity
async fn fetch(http: &reqwest::Client, url: &str) -> Result<String> {
    let response = http.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(Error::ConnectivityLost(format!("HTTP {}", status)));
    }
    Ok(response.text().await?)
}
