//! WebSocket client to the relay.
//!
//! [`connect_with_retry`] walks the supervised [`RetryPolicy`] schedule until
//! a connection succeeds or the attempts are exhausted — no self-rescheduling
//! timers. A successful connect yields a [`RelaySession`]: incoming relay
//! pushes arrive on a channel, outgoing messages are accepted on another, and
//! a background task heartbeats the relay so the idle sweeper leaves the
//! connection alone.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::interval;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, info, warn};

use labgate_core::{unix_millis, ClientToRelayMsg, RelayToClientMsg, RetryPolicy};

/// Errors establishing or running the relay connection.
#[derive(Debug, Error)]
pub enum RelayConnError {
    /// Every attempt in the retry schedule failed.
    #[error("could not reach relay at {url} after {attempts} attempt(s)")]
    Exhausted { url: String, attempts: u32 },
    /// The caller cancelled while the schedule was still running.
    #[error("connection cancelled")]
    Cancelled,
}

/// A live relay connection, bridged to channels.
///
/// Dropping the session (or either channel end) tears the socket down; the
/// relay clears this peer's slot when the transport closes.
#[derive(Debug)]
pub struct RelaySession {
    /// Relay pushes, in arrival order.
    pub incoming: mpsc::Receiver<RelayToClientMsg>,
    /// Messages to the relay, in submission order.
    pub outgoing: mpsc::Sender<ClientToRelayMsg>,
}

/// Connects following the retry schedule: the first attempt is immediate,
/// later ones back off exponentially up to the policy cap. Succeeding
/// cancels the rest of the schedule.
///
/// # Errors
///
/// [`RelayConnError::Exhausted`] when the whole schedule failed;
/// [`RelayConnError::Cancelled`] when `running` cleared mid-schedule.
pub async fn connect_with_retry(
    url: &str,
    policy: &RetryPolicy,
    heartbeat_interval: Duration,
    running: Arc<AtomicBool>,
) -> Result<RelaySession, RelayConnError> {
    for (attempt, delay) in policy.delays().enumerate() {
        if !running.load(Ordering::Relaxed) {
            return Err(RelayConnError::Cancelled);
        }
        if delay > Duration::ZERO {
            debug!(attempt, ?delay, "backing off before reconnect");
            tokio::time::sleep(delay).await;
        }

        match connect_async(url).await {
            Ok((ws_stream, _response)) => {
                info!(url, attempt, "connected to relay");
                return Ok(spawn_session(ws_stream, heartbeat_interval));
            }
            Err(e) => {
                warn!(url, attempt, error = %e, "relay connection attempt failed");
            }
        }
    }

    Err(RelayConnError::Exhausted {
        url: url.to_string(),
        attempts: policy.max_attempts,
    })
}

/// Splits the socket into reader/writer/heartbeat tasks bridged to channels.
fn spawn_session(
    ws_stream: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    heartbeat_interval: Duration,
) -> RelaySession {
    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let (incoming_tx, incoming_rx) = mpsc::channel::<RelayToClientMsg>(32);
    let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<ClientToRelayMsg>(32);

    // Writer: drains the outgoing channel into the socket.
    tokio::spawn(async move {
        while let Some(msg) = outgoing_rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(json) => json,
                Err(e) => {
                    warn!("outbound serialization error: {e}");
                    continue;
                }
            };
            if ws_tx.send(WsMessage::Text(json)).await.is_err() {
                debug!("relay socket send failed; writer stopping");
                break;
            }
        }
    });

    // Reader: parses frames into relay pushes. Channel close signals
    // transport loss to the flow.
    tokio::spawn(async move {
        while let Some(frame) = ws_rx.next().await {
            let frame = match frame {
                Ok(WsMessage::Text(json)) => json,
                Ok(WsMessage::Close(_)) | Err(_) => break,
                Ok(_) => continue,
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
    });

    // Heartbeat: keeps the relay's idle sweeper away.
    let heartbeat_tx = outgoing_tx.clone();
    tokio::spawn(async move {
        let mut ticker = interval(heartbeat_interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let beat = ClientToRelayMsg::Heartbeat {
                timestamp: unix_millis(),
            };
            if heartbeat_tx.send(beat).await.is_err() {
                break;
            }
        }
    });

    RelaySession {
        incoming: incoming_rx,
        outgoing: outgoing_tx,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exhausted_schedule_reports_attempts() {
        // Port 1 refuses connections immediately; a tight schedule fails
        // fast.
        let policy = RetryPolicy {
            max_attempts: 2,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(10),
        };
        let running = Arc::new(AtomicBool::new(true));

        let result = connect_with_retry(
            "ws://127.0.0.1:1",
            &policy,
            Duration::from_secs(20),
            running,
        )
        .await;

        match result {
            Err(RelayConnError::Exhausted { attempts, .. }) => assert_eq!(attempts, 2),
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancellation_stops_the_schedule() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_secs(60),
            max_backoff: Duration::from_secs(60),
        };
        let running = Arc::new(AtomicBool::new(false));

        let result = connect_with_retry(
            "ws://127.0.0.1:1",
            &policy,
            Duration::from_secs(20),
            running,
        )
        .await;

        assert!(matches!(result, Err(RelayConnError::Cancelled)));
    }
}
