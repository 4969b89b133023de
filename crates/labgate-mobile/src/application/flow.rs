//! The channel-driven mobile flow.
//!
//! [`run_mobile_flow`] wires the pure state machine to the relay channels
//! and to the two device seams (credential directory, location provider).
//! Effects that produce results — the ceremony and the capture — feed their
//! outcome back into the machine as events, so the ordering rules stay in
//! one place.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use labgate_core::{
    ClientToRelayMsg, LocationProvider, PairingLink, RelayToClientMsg,
};

use crate::application::credential::ChallengeHandler;
use crate::application::location::capture_location;
use crate::application::state::{
    transition, FailureReason, MobileEffect, MobileEvent, MobileState,
};

/// Terminal result of one mobile pairing flow.
#[derive(Debug, Clone, PartialEq)]
pub enum MobileOutcome {
    /// The flow finished; `admitted` is the decision shown to the user.
    Completed { admitted: bool },
    /// The flow failed; the reason is surfaced and never silently retried.
    Failed(FailureReason),
}

/// Drives one pairing flow from deep link to a terminal outcome.
///
/// Registers into the session, then starts the ceremony (the user-initiated
/// step — by the time this runs the user has tapped "authenticate").
pub async fn run_mobile_flow(
    link: &PairingLink,
    handler: &ChallengeHandler,
    location: Arc<dyn LocationProvider>,
    capture_timeout: Duration,
    mut incoming: mpsc::Receiver<RelayToClientMsg>,
    outgoing: mpsc::Sender<ClientToRelayMsg>,
) -> MobileOutcome {
    let register = ClientToRelayMsg::RegisterMobile {
        session_id: link.session_id.clone(),
        user_identifier: link.user_identifier.clone(),
        challenge: link.challenge.clone(),
    };
    if outgoing.send(register).await.is_err() {
        return MobileOutcome::Failed(FailureReason::TransportClosed);
    }
    info!(session_id = %link.session_id, "registered into session");

    let mut state = MobileState::Ready;
    // Effects can produce follow-up events synchronously; they queue ahead
    // of relay pushes.
    let mut pending: VecDeque<MobileEvent> = VecDeque::from([MobileEvent::StartCeremony]);

    loop {
        let event = match pending.pop_front() {
            Some(event) => event,
            None => match incoming.recv().await {
                Some(msg) => match relay_msg_to_event(msg) {
                    Some(event) => event,
                    None => continue,
                },
                None => MobileEvent::TransportClosed,
            },
        };

        let result = transition(state, event, link.require_location);
        state = result.next;

        for effect in result.effects {
            match effect {
                MobileEffect::RunCeremony => {
                    let event = match handler.run_ceremony(
                        link.mode,
                        &link.user_identifier,
                        &link.challenge,
                    ) {
                        Ok(auth_payload) => MobileEvent::CeremonyCompleted { auth_payload },
                        Err(err) => {
                            warn!(error = %err, "credential ceremony failed");
                            MobileEvent::CeremonyFailed(err)
                        }
                    };
                    pending.push_back(event);
                }

                MobileEffect::SendAuthResult { auth_payload } => {
                    let msg = ClientToRelayMsg::AuthResult {
                        session_id: link.session_id.clone(),
                        auth_payload,
                    };
                    if outgoing.send(msg).await.is_err() {
                        pending.push_back(MobileEvent::TransportClosed);
                    }
                }

                MobileEffect::CaptureLocation => {
                    debug!(session_id = %link.session_id, "capturing location on relay request");
                    let event = match capture_location(Arc::clone(&location), capture_timeout)
                        .await
                    {
                        Ok(sample) => MobileEvent::LocationCaptured(sample),
                        Err(err) => {
                            warn!(error = %err, "location capture failed");
                            MobileEvent::LocationFailed(err)
                        }
                    };
                    pending.push_back(event);
                }

                MobileEffect::SendLocation { sample } => {
                    let msg = ClientToRelayMsg::LocationResult {
                        session_id: link.session_id.clone(),
                        sample,
                    };
                    if outgoing.send(msg).await.is_err() {
                        pending.push_back(MobileEvent::TransportClosed);
                    }
                }

                MobileEffect::ReportCompleted { admitted } => {
                    info!(session_id = %link.session_id, admitted, "flow completed");
                    return MobileOutcome::Completed { admitted };
                }

                MobileEffect::ReportFailed(reason) => {
                    return MobileOutcome::Failed(reason);
                }
            }
        }
    }
}

/// Maps a relay push onto a state-machine event.
fn relay_msg_to_event(msg: RelayToClientMsg) -> Option<MobileEvent> {
    match msg {
        RelayToClientMsg::LocationRequested { .. } => Some(MobileEvent::LocationRequested),
        RelayToClientMsg::Decision { within_radius, .. } => {
            Some(MobileEvent::DecisionReceived { within_radius })
        }
        RelayToClientMsg::Error { code, message } => {
            Some(MobileEvent::RelayError { code, message })
        }
        // Desktop-only notifications and heartbeat acks carry no meaning
        // for the mobile machine.
        RelayToClientMsg::MobileConnected
        | RelayToClientMsg::AuthConfirmed { .. }
        | RelayToClientMsg::HeartbeatAck { .. } => None,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
