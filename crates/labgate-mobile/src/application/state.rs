//! The mobile peer state machine.
//!
//! ```text
//! Ready → Authenticating → AwaitingLocationRequest → CapturingLocation
//!       → Reporting → Completed
//! ```
//!
//! Every step goes through a pure transition function returning the next
//! state plus effects; the flow driver executes the effects (ceremony,
//! capture, sends) and feeds the results back in as events.
//!
//! The one rule everything else bends around: **location capture is
//! triggered only by the relay's explicit request**. A `location_requested`
//! push in any state but `AwaitingLocationRequest` is dropped, and no other
//! event ever produces a capture effect — the device never reports where it
//! is before being asked.

use labgate_core::{CredentialError, LocationError, LocationSample};

/// The mobile peer's protocol position.
#[derive(Debug, Clone, PartialEq)]
pub enum MobileState {
    /// Deep link parsed; waiting for the user to start the ceremony.
    Ready,
    /// Biometric ceremony in progress.
    Authenticating,
    /// Ceremony done and reported; waiting for the relay to ask for
    /// location.
    AwaitingLocationRequest,
    /// Device location read in progress.
    CapturingLocation,
    /// Sample sent; waiting for the admission decision.
    Reporting,
    /// Flow finished; the decision (or credential-only admission) was shown.
    Completed,
    /// Flow failed locally or the relay reported an error.
    Failed(FailureReason),
}

impl MobileState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, MobileState::Completed | MobileState::Failed(_))
    }
}

/// Why the mobile flow failed.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureReason {
    Credential(CredentialError),
    Location(LocationError),
    Relay { code: String, message: String },
    TransportClosed,
}

/// Everything that can happen to the mobile peer.
#[derive(Debug, Clone, PartialEq)]
pub enum MobileEvent {
    /// The user tapped "authenticate".
    StartCeremony,
    /// The credential ceremony produced an assertion/attestation payload.
    CeremonyCompleted { auth_payload: serde_json::Value },
    /// The platform authenticator refused.
    CeremonyFailed(CredentialError),
    /// Relay push: capture and report location now.
    LocationRequested,
    /// The device produced a location read.
    LocationCaptured(LocationSample),
    /// The device location read failed.
    LocationFailed(LocationError),
    /// Relay push: the admission decision.
    DecisionReceived { within_radius: bool },
    /// Relay-reported protocol error.
    RelayError { code: String, message: String },
    /// The relay connection dropped.
    TransportClosed,
}

/// Side effects the flow driver must execute after a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum MobileEffect {
    /// Run the biometric ceremony.
    RunCeremony,
    /// Send `auth_result` to the relay.
    SendAuthResult { auth_payload: serde_json::Value },
    /// Read the device location (bounded, high accuracy).
    CaptureLocation,
    /// Send `location_result` to the relay.
    SendLocation { sample: LocationSample },
    /// Surface the final outcome to the user.
    ReportCompleted { admitted: bool },
    /// Surface the failure to the user. Never silently retried.
    ReportFailed(FailureReason),
}

/// Result of one transition.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub next: MobileState,
    pub effects: Vec<MobileEffect>,
}

impl Transition {
    fn stay(state: MobileState) -> Self {
        Self {
            next: state,
            effects: Vec::new(),
        }
    }
}

/// The pure transition function.
///
/// `require_location` mirrors the session configuration from the deep link:
/// without it, a successful ceremony completes the flow directly.
pub fn transition(state: MobileState, event: MobileEvent, require_location: bool) -> Transition {
    match (state, event) {
        (MobileState::Ready, MobileEvent::StartCeremony) => Transition {
            next: MobileState::Authenticating,
            effects: vec![MobileEffect::RunCeremony],
        },

        (MobileState::Authenticating, MobileEvent::CeremonyCompleted { auth_payload }) => {
            if require_location {
                Transition {
                    next: MobileState::AwaitingLocationRequest,
                    effects: vec![MobileEffect::SendAuthResult { auth_payload }],
                }
            } else {
                Transition {
                    next: MobileState::Completed,
                    effects: vec![
                        MobileEffect::SendAuthResult { auth_payload },
                        MobileEffect::ReportCompleted { admitted: true },
                    ],
                }
            }
        }

        // A failed ceremony never contacts the relay for location.
        (MobileState::Authenticating, MobileEvent::CeremonyFailed(err)) => {
            let reason = FailureReason::Credential(err);
            Transition {
                next: MobileState::Failed(reason.clone()),
                effects: vec![MobileEffect::ReportFailed(reason)],
            }
        }

        // The only transition that starts a capture.
        (MobileState::AwaitingLocationRequest, MobileEvent::LocationRequested) => Transition {
            next: MobileState::CapturingLocation,
            effects: vec![MobileEffect::CaptureLocation],
        },

        (MobileState::CapturingLocation, MobileEvent::LocationCaptured(sample)) => Transition {
            next: MobileState::Reporting,
            effects: vec![MobileEffect::SendLocation { sample }],
        },

        (MobileState::CapturingLocation, MobileEvent::LocationFailed(err)) => {
            let reason = FailureReason::Location(err);
            Transition {
                next: MobileState::Failed(reason.clone()),
                effects: vec![MobileEffect::ReportFailed(reason)],
            }
        }

        (MobileState::Reporting, MobileEvent::DecisionReceived { within_radius }) => Transition {
            next: MobileState::Completed,
            effects: vec![MobileEffect::ReportCompleted {
                admitted: within_radius,
            }],
        },

        // Errors and transport loss fail any live state.
        (state, MobileEvent::RelayError { code, message }) if !state.is_terminal() => {
            let reason = FailureReason::Relay { code, message };
            Transition {
                next: MobileState::Failed(reason.clone()),
                effects: vec![MobileEffect::ReportFailed(reason)],
            }
        }
        (state, MobileEvent::TransportClosed) if !state.is_terminal() => {
            let reason = FailureReason::TransportClosed;
            Transition {
                next: MobileState::Failed(reason.clone()),
                effects: vec![MobileEffect::ReportFailed(reason)],
            }
        }

        // Out-of-order and late messages are dropped. This covers the
        // privacy rule: location_requested outside AwaitingLocationRequest
        // produces no capture.
        (state, _) => Transition::stay(state),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LocationSample {
        LocationSample::new(0.0, 0.0, 5.0, 0).unwrap()
    }

    #[test]
    fn test_happy_path_with_location() {
        let t = transition(MobileState::Ready, MobileEvent::StartCeremony, true);
        assert_eq!(t.next, MobileState::Authenticating);
        assert_eq!(t.effects, vec![MobileEffect::RunCeremony]);

        let t = transition(
            t.next,
            MobileEvent::CeremonyCompleted {
                auth_payload: serde_json::json!({"credential": "c1"}),
            },
            true,
        );
        assert_eq!(t.next, MobileState::AwaitingLocationRequest);
        assert!(matches!(
            t.effects[0],
            MobileEffect::SendAuthResult { .. }
        ));

        let t = transition(t.next, MobileEvent::LocationRequested, true);
        assert_eq!(t.next, MobileState::CapturingLocation);
        assert_eq!(t.effects, vec![MobileEffect::CaptureLocation]);

        let t = transition(t.next, MobileEvent::LocationCaptured(sample()), true);
        assert_eq!(t.next, MobileState::Reporting);

        let t = transition(
            t.next,
            MobileEvent::DecisionReceived {
                within_radius: true,
            },
            true,
        );
        assert_eq!(t.next, MobileState::Completed);
        assert_eq!(
            t.effects,
            vec![MobileEffect::ReportCompleted { admitted: true }]
        );
    }

    #[test]
    fn test_ceremony_without_location_completes_directly() {
        let t = transition(
            MobileState::Authenticating,
            MobileEvent::CeremonyCompleted {
                auth_payload: serde_json::json!({}),
            },
            false,
        );
        assert_eq!(t.next, MobileState::Completed);
        // Auth result still goes to the relay; completion is local.
        assert!(matches!(t.effects[0], MobileEffect::SendAuthResult { .. }));
        assert!(matches!(
            t.effects[1],
            MobileEffect::ReportCompleted { admitted: true }
        ));
    }

    #[test]
    fn test_location_is_never_captured_before_being_requested() {
        // The privacy invariant: in every state except
        // AwaitingLocationRequest, a location_requested push is dropped.
        for state in [
            MobileState::Ready,
            MobileState::Authenticating,
            MobileState::CapturingLocation,
            MobileState::Reporting,
            MobileState::Completed,
        ] {
            let t = transition(state.clone(), MobileEvent::LocationRequested, true);
            assert_eq!(t.next, state);
            assert!(
                t.effects.is_empty(),
                "no capture may start from {state:?}"
            );
        }
    }

    #[test]
    fn test_ceremony_failure_skips_the_relay_entirely() {
        let t = transition(
            MobileState::Authenticating,
            MobileEvent::CeremonyFailed(CredentialError::NotAllowed),
            true,
        );
        assert!(matches!(t.next, MobileState::Failed(_)));
        // No SendAuthResult, no CaptureLocation — only the local report.
        assert_eq!(t.effects.len(), 1);
        assert!(matches!(t.effects[0], MobileEffect::ReportFailed(_)));
    }

    #[test]
    fn test_capture_failure_reports_specific_reason() {
        for (err, _) in [
            (LocationError::PermissionDenied, "denied"),
            (LocationError::Unavailable, "unavailable"),
            (LocationError::Timeout, "timeout"),
        ] {
            let t = transition(
                MobileState::CapturingLocation,
                MobileEvent::LocationFailed(err),
                true,
            );
            match t.next {
                MobileState::Failed(FailureReason::Location(reason)) => assert_eq!(reason, err),
                other => panic!("expected location failure, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_denied_decision_still_completes_the_mobile_flow() {
        // The mobile device's job ends with the decision either way; the
        // outcome is surfaced, not treated as a local failure.
        let t = transition(
            MobileState::Reporting,
            MobileEvent::DecisionReceived {
                within_radius: false,
            },
            true,
        );
        assert_eq!(t.next, MobileState::Completed);
        assert_eq!(
            t.effects,
            vec![MobileEffect::ReportCompleted { admitted: false }]
        );
    }

    #[test]
    fn test_relay_error_fails_live_states_only() {
        let t = transition(
            MobileState::AwaitingLocationRequest,
            MobileEvent::RelayError {
                code: "protocol_state".to_string(),
                message: "m".to_string(),
            },
            true,
        );
        assert!(matches!(t.next, MobileState::Failed(_)));

        let done = MobileState::Completed;
        let t = transition(
            done.clone(),
            MobileEvent::TransportClosed,
            true,
        );
        assert_eq!(t.next, done);
        assert!(t.effects.is_empty());
    }
}
