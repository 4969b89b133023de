//! WebSocket server: accept loop, per-connection tasks, idle sweeper.
//!
//! Each accepted socket runs two tasks: a reader that parses JSON frames into
//! [`ClientToRelayMsg`] and dispatches them to the [`SessionRegistry`], and a
//! writer that drains the connection's outbox (filled by the registry) back
//! into the socket. The accept loop uses a short timeout so it can observe
//! the shutdown flag even while no peers are connecting.
//!
//! A peer's first message must be `register_desktop` or `register_mobile`;
//! everything else on an unregistered connection is answered with a protocol
//! error. One unparseable frame is logged and skipped rather than killing
//! the connection — the peer may retry on its next interaction.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Error as WsError, Message as WsMessage},
};
use tracing::{debug, error, info, warn};

use labgate_core::{ClientToRelayMsg, ConnectionId, RelayError, RelayToClientMsg};

use crate::application::SessionRegistry;
use crate::domain::config::RelayConfig;

/// Outbox depth per connection. The registry pushes at most a handful of
/// messages per session lifecycle, so this never backs up in practice.
const OUTBOX_CAPACITY: usize = 32;

/// Runs the accept loop until `running` is cleared.
///
/// Spawns the idle sweeper alongside; each accepted connection gets its own
/// task so one slow peer never blocks others.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot be bound.
pub async fn run_server(
    config: RelayConfig,
    registry: Arc<SessionRegistry>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind relay listener on {}", config.bind_addr))?;

    info!("relay listening on {}", config.bind_addr);

    let sweeper = tokio::spawn(run_sweeper(
        Arc::clone(&registry),
        config.sweep_interval,
        Arc::clone(&running),
    ));

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        // Short timeout so the loop can re-check the shutdown flag.
        let accept_result = timeout(Duration::from_millis(200), listener.accept()).await;

        match accept_result {
            Ok(Ok((stream, peer_addr))) => {
                debug!("new peer connection from {peer_addr}");
                let registry = Arc::clone(&registry);
                tokio::spawn(async move {
                    handle_peer_connection(stream, peer_addr, registry).await;
                });
            }
            Ok(Err(e)) => {
                // Transient accept error; keep serving.
                error!("accept error: {e}");
            }
            Err(_) => {
                // Timeout — no new connection; loop back to the flag check.
            }
        }
    }

    sweeper.abort();
    Ok(())
}

/// Periodically asks the registry to close silent connections and expire
/// idle sessions.
async fn run_sweeper(
    registry: Arc<SessionRegistry>,
    sweep_interval: Duration,
    running: Arc<AtomicBool>,
) {
    let mut ticker = interval(sweep_interval);
    ticker.tick().await; // skip the immediate first tick
    while running.load(Ordering::Relaxed) {
        ticker.tick().await;
        registry.sweep_idle().await;
    }
}

/// Top-level handler for one peer socket; logs the outcome of the session.
async fn handle_peer_connection(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    registry: Arc<SessionRegistry>,
) {
    match run_connection(raw_stream, peer_addr, registry).await {
        Ok(()) => debug!("connection {peer_addr} closed normally"),
        Err(e) => warn!("connection {peer_addr} closed with error: {e:#}"),
    }
}

/// Runs the complete lifecycle of one peer connection.
async fn run_connection(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    registry: Arc<SessionRegistry>,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(raw_stream)
        .await
        .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;

    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    // The registry fills this outbox; the writer task drains it.
    let (outbox_tx, mut outbox_rx) = mpsc::channel::<RelayToClientMsg>(OUTBOX_CAPACITY);

    let writer_task = tokio::spawn(async move {
        while let Some(msg) = outbox_rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(json) => json,
                Err(e) => {
                    error!("outbound serialization error: {e}");
                    continue;
                }
            };
            if ws_tx.send(WsMessage::Text(json)).await.is_err() {
                debug!("WebSocket send failed (peer disconnected)");
                break;
            }
        }
    });

    // Reader: parse frames, dispatch to the registry. The connection id is
    // assigned by the first successful register_* message.
    let registry_reader = Arc::clone(&registry);
    let outbox_for_reader = outbox_tx.clone();

    let reader_task = tokio::spawn(async move {
        let mut connection_id: Option<ConnectionId> = None;
        loop {
            let ws_msg = match ws_rx.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(WsError::ConnectionClosed | WsError::Protocol(_))) => break,
                Some(Err(e)) => {
                    warn!("WebSocket error from {peer_addr}: {e}");
                    break;
                }
                None => break,
            };

            match ws_msg {
                WsMessage::Text(json) => {
                    let msg: ClientToRelayMsg = match serde_json::from_str(&json) {
                        Ok(m) => m,
                        Err(e) => {
                            // One bad frame does not kill the connection.
                            warn!("invalid JSON from {peer_addr}: {e}");
                            continue;
                        }
                    };
                    debug!("{peer_addr} → relay: {}", msg.type_name());
                    dispatch(
                        &registry_reader,
                        &outbox_for_reader,
                        &mut connection_id,
                        msg,
                    )
                    .await;
                }
                WsMessage::Binary(_) => {
                    warn!("unexpected binary frame from {peer_addr} (ignored)");
                }
                WsMessage::Close(_) => break,
                // Protocol-level ping/pong is handled by tungstenite.
                WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => {}
            }
        }
        // Transport closed: clear this peer's slot. The session survives so
        // the peer can re-register while it is still open.
        if let Some(connection_id) = connection_id {
            registry_reader.disconnect(connection_id).await;
        }
    });

    // The connection is over when either side finishes. The reader performs
    // the disconnect bookkeeping itself, so a writer-side failure only needs
    // to wait for the reader to observe the closed socket.
    tokio::select! {
        _ = reader_task => debug!("reader task for {peer_addr} ended"),
        _ = writer_task => debug!("writer task for {peer_addr} ended"),
    }
    Ok(())
}

/// Routes one parsed message into the registry and reports errors back to
/// the originating connection.
async fn dispatch(
    registry: &SessionRegistry,
    outbox: &mpsc::Sender<RelayToClientMsg>,
    connection_id: &mut Option<ConnectionId>,
    msg: ClientToRelayMsg,
) {
    let result: Result<(), RelayError> = match msg {
        ClientToRelayMsg::RegisterDesktop {
            session_id,
            user_identifier,
            mode,
            require_location,
        } => registry
            .register_desktop(
                &session_id,
                &user_identifier,
                mode,
                require_location,
                outbox.clone(),
            )
            .await
            .map(|id| *connection_id = Some(id)),

        ClientToRelayMsg::RegisterMobile {
            session_id,
            user_identifier,
            challenge,
        } => registry
            .register_mobile(&session_id, &user_identifier, &challenge, outbox.clone())
            .await
            .map(|id| *connection_id = Some(id)),

        ClientToRelayMsg::AuthResult {
            session_id,
            auth_payload,
        } => registry.submit_auth_result(&session_id, auth_payload).await,

        ClientToRelayMsg::RequestLocation { session_id } => {
            registry.request_location(&session_id).await
        }

        ClientToRelayMsg::LocationResult { session_id, sample } => {
            registry.submit_location(&session_id, sample).await
        }

        ClientToRelayMsg::Heartbeat { timestamp } => {
            if let Some(id) = *connection_id {
                if registry.heartbeat(id).await {
                    let _ = outbox.send(RelayToClientMsg::HeartbeatAck { timestamp }).await;
                }
            }
            Ok(())
        }
    };

    if let Err(err) = result {
        debug!("dispatch error: {err}");
        let _ = outbox.send(RelayToClientMsg::from(&err)).await;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
