//! The channel-driven login flow.
//!
//! [`run_login_flow`] wires the pure state machine to a pair of message
//! channels: relay pushes come in on `incoming`, protocol messages go out on
//! `outgoing`. The relay client bridges these channels to the socket in
//! production; tests drive them directly.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use labgate_core::{ClientToRelayMsg, PairingLink, RelayToClientMsg};

use crate::application::state::{transition, DesktopEffect, DesktopEvent, DesktopState};

/// Terminal result of one login attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowOutcome {
    Completed { distance_meters: Option<f64> },
    Failed {
        reason: String,
        distance_meters: Option<f64>,
    },
}

/// Drives one pairing session from registration to a terminal outcome.
///
/// Sends `register_desktop`, renders the pairing link (returned to the
/// caller beforehand via [`new_pairing_link`](crate::application::state::new_pairing_link)),
/// then reduces every relay push through the state machine until it reaches
/// `Completed` or `Failed`. A closed `incoming` channel counts as transport
/// loss.
pub async fn run_login_flow(
    link: &PairingLink,
    mut incoming: mpsc::Receiver<RelayToClientMsg>,
    outgoing: mpsc::Sender<ClientToRelayMsg>,
) -> FlowOutcome {
    let register = ClientToRelayMsg::RegisterDesktop {
        session_id: link.session_id.clone(),
        user_identifier: link.user_identifier.clone(),
        mode: link.mode,
        require_location: link.require_location,
    };
    if outgoing.send(register).await.is_err() {
        return FlowOutcome::Failed {
            reason: "relay connection lost".to_string(),
            distance_meters: None,
        };
    }
    info!(session_id = %link.session_id, "session registered; awaiting mobile pairing");

    let mut state = DesktopState::AwaitingPairing;

    loop {
        let event = match incoming.recv().await {
            Some(msg) => match relay_msg_to_event(msg) {
                Some(event) => event,
                None => continue,
            },
            None => DesktopEvent::TransportClosed,
        };

        let result = transition(state, event, link.require_location);
        state = result.next;

        for effect in result.effects {
            match effect {
                DesktopEffect::SendRequestLocation => {
                    debug!(session_id = %link.session_id, "requesting location from mobile");
                    let msg = ClientToRelayMsg::RequestLocation {
                        session_id: link.session_id.clone(),
                    };
                    if outgoing.send(msg).await.is_err() {
                        return FlowOutcome::Failed {
                            reason: "relay connection lost".to_string(),
                            distance_meters: None,
                        };
                    }
                }
                DesktopEffect::ReportSuccess { distance_meters } => {
                    info!(session_id = %link.session_id, ?distance_meters, "login admitted");
                    return FlowOutcome::Completed { distance_meters };
                }
                DesktopEffect::ReportFailure {
                    reason,
                    distance_meters,
                } => {
                    warn!(session_id = %link.session_id, reason, "login failed");
                    return FlowOutcome::Failed {
                        reason,
                        distance_meters,
                    };
                }
                // StartNewSession only follows an operator retry, which is
                // handled by the caller minting a fresh link.
                DesktopEffect::StartNewSession => {}
            }
        }
    }
}

/// Maps a relay push onto a state-machine event. Heartbeat acks carry no
/// protocol meaning for the flow.
fn relay_msg_to_event(msg: RelayToClientMsg) -> Option<DesktopEvent> {
    match msg {
        RelayToClientMsg::MobileConnected => Some(DesktopEvent::MobileConnected),
        RelayToClientMsg::AuthConfirmed { .. } => Some(DesktopEvent::AuthConfirmed),
        RelayToClientMsg::Decision {
            within_radius,
            distance_meters,
            ..
        } => Some(DesktopEvent::Decision {
            within_radius,
            distance_meters,
        }),
        RelayToClientMsg::Error { code, message } => {
            Some(DesktopEvent::RelayError { code, message })
        }
        RelayToClientMsg::HeartbeatAck { .. } => None,
        RelayToClientMsg::LocationRequested { .. } => None, // mobile-only push
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
