//! WebSocket client to the relay.
//!
//! The mobile connection is short-lived (one pairing flow), so a single
//! driver task multiplexes everything with `select!`: outgoing messages,
//! incoming frames, and the periodic heartbeat that keeps the relay's idle
//! sweeper away while the user works through the biometric prompt.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::interval;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, info, warn};

use labgate_core::{unix_millis, ClientToRelayMsg, RelayToClientMsg};

/// Errors establishing the relay connection.
#[derive(Debug, Error)]
pub enum RelayConnError {
    #[error("failed to connect to relay at {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },
}

/// A live relay connection bridged to channels. Closing either end tears
/// the socket down; the relay clears this peer's slot on transport close.
pub struct MobileLink {
    pub incoming: mpsc::Receiver<RelayToClientMsg>,
    pub outgoing: mpsc::Sender<ClientToRelayMsg>,
}

/// Connects and spawns the driver task.
///
/// # Errors
///
/// [`RelayConnError::Connect`] when the WebSocket handshake fails. The
/// caller owns retry policy; a mobile retry means the user re-scans the
/// pairing link.
pub async fn connect(
    url: &str,
    heartbeat_interval: Duration,
) -> Result<MobileLink, RelayConnError> {
    let (ws_stream, _response) =
        connect_async(url)
            .await
            .map_err(|source| RelayConnError::Connect {
                url: url.to_string(),
                source,
            })?;
    info!(url, "connected to relay");

    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let (incoming_tx, incoming_rx) = mpsc::channel::<RelayToClientMsg>(32);
    let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<ClientToRelayMsg>(32);

    tokio::spawn(async move {
        let mut ticker = interval(heartbeat_interval);
        ticker.tick().await; // skip the immediate first tick
        loop {
            tokio::select! {
                maybe_out = outgoing_rx.recv() => {
                    let Some(msg) = maybe_out else { break };
                    let json = match serde_json::to_string(&msg) {
                        Ok(json) => json,
                        Err(e) => {
                            warn!("outbound serialization error: {e}");
                            continue;
                        }
                    };
                    if ws_tx.send(WsMessage::Text(json)).await.is_err() {
                        debug!("relay socket send failed; driver stopping");
                        break;
                    }
                }

                maybe_frame = ws_rx.next() => {
                    let frame = match maybe_frame {
                        Some(Ok(WsMessage::Text(json))) => json,
                        Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => continue,
                    };
                    match serde_json::from_str::<RelayToClientMsg>(&frame) {
                        Ok(msg) => {
                            if incoming_tx.send(msg).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("invalid JSON from relay: {e}"),
                    }
                }

                _ = ticker.tick() => {
                    let beat = ClientToRelayMsg::Heartbeat { timestamp: unix_millis() };
                    let json = serde_json::to_string(&beat).unwrap_or_default();
                    if ws_tx.send(WsMessage::Text(json)).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    Ok(MobileLink {
        incoming: incoming_rx,
        outgoing: outgoing_tx,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
