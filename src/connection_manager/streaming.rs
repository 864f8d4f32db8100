//! Streaming transport
//!
//! One persistent WebSocket. Each text frame is a JSON object, a JSON array
//! of objects, or free text.

use super::ConnectionShared;
use crate::error::{Error, Result};
use crate::event_normalizer::InboundPayload;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

type DetectionStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Time allowed for the close handshake on a deliberate disconnect
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Connect and spawn the frame reader
pub(super) async fn open(
    shared: Arc<ConnectionShared>,
    url: &str,
    connect_timeout: Duration,
    token: CancellationToken,
) -> Result<JoinHandle<()>> {
    let stream = match tokio::time::timeout(connect_timeout, connect_async(url)).await {
        Ok(Ok((stream, _response))) => stream,
        Ok(Err(e)) => {
            let message = format!("Connection to detection stream lost: {}", e);
            shared.connection_dropped(&token, message).await;
            return Err(Error::WebSocket(e));
        }
        Err(_) => {
            let message = format!(
                "Connection to detection stream lost: no answer from {} within {} ms",
                url,
                connect_timeout.as_millis()
            );
            shared.connection_dropped(&token, message.clone()).await;
            return Err(Error::ConnectivityLost(message));
        }
    };

    shared
        .mark_connected(&token, format!("Connected to detection stream at {}", url))
        .await;
    tracing::info!(url = %url, "Detection stream open");

    Ok(tokio::spawn(read_frames(shared, stream, token)))
}

async fn read_frames(shared: Arc<ConnectionShared>, mut stream: DetectionStream, token: CancellationToken) {
    loop {
        let frame = tokio::select! {
            biased;
            _ = token.cancelled() => {
                if tokio::time::timeout(CLOSE_TIMEOUT, stream.close(None)).await.is_err() {
                    tracing::debug!("Close handshake timed out");
                }
                return;
            }
            frame = stream.next() => frame,
        };

        match frame {
            Some(Ok(Message::Text(text))) => {
                shared
                    .pipeline
                    .ingest_for_session(&token, InboundPayload::parse_text(&text))
                    .await;
            }
            Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                Ok(text) => {
                    shared
                        .pipeline
                        .ingest_for_session(&token, InboundPayload::parse_text(&text))
                        .await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Dropping malformed binary frame");
                }
            },
            Some(Ok(Message::Close(close))) => {
                let reason = close
                    .map(|c| format!(" ({} {})", u16::from(c.code), c.reason))
                    .unwrap_or_default();
                shared
                    .connection_dropped(
                        &token,
                        format!("Disconnected from detection stream{}", reason),
                    )
                    .await;
                return;
            }
            // ping/pong are answered by tungstenite
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                shared
                    .connection_dropped(&token, format!("Connection to detection stream lost: {}", e))
                    .await;
                return;
            }
            None => {
                shared
                    .connection_dropped(&token, "Disconnected from detection stream".to_string())
                    .await;
                return;
            }
        }
    }
}
