//! The desktop login state machine.
//!
//! States are an explicit tagged union and every step goes through a pure
//! transition function returning the next state plus the effects to execute.
//! All protocol ordering rules live here, exhaustively matchable, with no
//! I/O — the flow driver executes the effects against the relay connection.
//!
//! ```text
//! AwaitingPairing → AwaitingAuth → AwaitingLocationDecision → Completed
//!                                                          ↘  Failed
//! ```
//!
//! Any relay error or transport close before `Completed` fails the attempt;
//! a retry mints a fresh session id and re-enters `AwaitingPairing`.

use labgate_core::PairingLink;

/// The desktop peer's protocol position.
#[derive(Debug, Clone, PartialEq)]
pub enum DesktopState {
    /// Pairing link is rendered; waiting for the mobile device to register.
    AwaitingPairing,
    /// Mobile is paired; waiting for its credential ceremony.
    AwaitingAuth,
    /// Location was requested from the mobile peer; waiting for the relay's
    /// admission decision.
    AwaitingLocationDecision,
    /// Admitted. Carries the measured distance when a geofence check ran.
    Completed { distance_meters: Option<f64> },
    /// The attempt failed. The distance is kept for user-facing diagnostics
    /// when the failure was an outside-radius decision.
    Failed {
        reason: String,
        distance_meters: Option<f64>,
    },
}

impl DesktopState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DesktopState::Completed { .. } | DesktopState::Failed { .. }
        )
    }
}

/// Everything that can happen to the desktop peer.
#[derive(Debug, Clone, PartialEq)]
pub enum DesktopEvent {
    /// Relay notification: the mobile device registered into the session.
    MobileConnected,
    /// Relay notification: the credential ceremony succeeded.
    AuthConfirmed,
    /// Relay push: the admission decision.
    Decision {
        within_radius: bool,
        distance_meters: f64,
    },
    /// Relay-reported protocol error.
    RelayError { code: String, message: String },
    /// The relay connection dropped.
    TransportClosed,
    /// Operator asked to retry after a failure.
    RetryRequested,
}

/// Side effects the flow driver must execute after a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum DesktopEffect {
    /// Send `request_location` to the relay.
    SendRequestLocation,
    /// Surface success to the operator.
    ReportSuccess { distance_meters: Option<f64> },
    /// Surface failure to the operator.
    ReportFailure {
        reason: String,
        distance_meters: Option<f64>,
    },
    /// Mint a fresh session id and re-render the pairing link.
    StartNewSession,
}

/// Result of one transition: the next state and the effects to run.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub next: DesktopState,
    pub effects: Vec<DesktopEffect>,
}

impl Transition {
    fn stay(state: DesktopState) -> Self {
        Self {
            next: state,
            effects: Vec::new(),
        }
    }
}

/// The pure transition function.
///
/// `require_location` is session-level configuration: it decides whether an
/// `auth_confirmed` notification leads into the location exchange or
/// completes the login directly.
///
/// Unexpected event/state combinations are ignored (the state is kept and no
/// effects run) — out-of-order relay messages must not corrupt the machine.
pub fn transition(state: DesktopState, event: DesktopEvent, require_location: bool) -> Transition {
    match (state, event) {
        (DesktopState::AwaitingPairing, DesktopEvent::MobileConnected) => Transition {
            next: DesktopState::AwaitingAuth,
            effects: Vec::new(),
        },

        (DesktopState::AwaitingAuth, DesktopEvent::AuthConfirmed) => {
            if require_location {
                Transition {
                    next: DesktopState::AwaitingLocationDecision,
                    effects: vec![DesktopEffect::SendRequestLocation],
                }
            } else {
                Transition {
                    next: DesktopState::Completed {
                        distance_meters: None,
                    },
                    effects: vec![DesktopEffect::ReportSuccess {
                        distance_meters: None,
                    }],
                }
            }
        }

        (
            DesktopState::AwaitingLocationDecision,
            DesktopEvent::Decision {
                within_radius,
                distance_meters,
            },
        ) => {
            if within_radius {
                Transition {
                    next: DesktopState::Completed {
                        distance_meters: Some(distance_meters),
                    },
                    effects: vec![DesktopEffect::ReportSuccess {
                        distance_meters: Some(distance_meters),
                    }],
                }
            } else {
                let reason = "outside the facility geofence".to_string();
                Transition {
                    next: DesktopState::Failed {
                        reason: reason.clone(),
                        distance_meters: Some(distance_meters),
                    },
                    effects: vec![DesktopEffect::ReportFailure {
                        reason,
                        distance_meters: Some(distance_meters),
                    }],
                }
            }
        }

        // Errors and transport loss fail any live state.
        (state, DesktopEvent::RelayError { code, message }) if !state.is_terminal() => {
            let reason = format!("{code}: {message}");
            Transition {
                next: DesktopState::Failed {
                    reason: reason.clone(),
                    distance_meters: None,
                },
                effects: vec![DesktopEffect::ReportFailure {
                    reason,
                    distance_meters: None,
                }],
            }
        }
        (state, DesktopEvent::TransportClosed) if !state.is_terminal() => {
            let reason = "relay connection lost".to_string();
            Transition {
                next: DesktopState::Failed {
                    reason: reason.clone(),
                    distance_meters: None,
                },
                effects: vec![DesktopEffect::ReportFailure {
                    reason,
                    distance_meters: None,
                }],
            }
        }

        // The retry affordance: only a failed attempt can be retried, and it
        // starts over with a fresh session.
        (DesktopState::Failed { .. }, DesktopEvent::RetryRequested) => Transition {
            next: DesktopState::AwaitingPairing,
            effects: vec![DesktopEffect::StartNewSession],
        },

        // Everything else is an out-of-order or late message; ignore it.
        (state, _) => Transition::stay(state),
    }
}

/// Builds the pairing link for a new session.
///
/// The challenge nonce is minted here (UUID v4, hex) and travels through the
/// deep link into the mobile peer's credential ceremony.
pub fn new_pairing_link(
    session_id: &str,
    user_identifier: &str,
    mode: labgate_core::SessionMode,
    require_location: bool,
) -> PairingLink {
    PairingLink {
        session_id: session_id.to_string(),
        challenge: uuid::Uuid::new_v4().simple().to_string(),
        user_identifier: user_identifier.to_string(),
        mode,
        require_location,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
