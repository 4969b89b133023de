//! Error taxonomy for the pairing protocol and the peer-local flows.
//!
//! [`RelayError`] covers everything the relay reports back to a connection;
//! each variant has a stable wire `code` that peers can match on without
//! parsing the human-readable message. [`CredentialError`] and
//! [`LocationError`] terminate only the local peer flow and are never sent
//! through the relay verbatim.

use thiserror::Error;

use crate::domain::session::{PeerRole, SessionState};

/// Relay-side protocol errors, reported to the originating connection.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RelayError {
    /// A peer tried to register into a role slot that is already occupied.
    #[error("{role} slot already occupied on session {session_id}")]
    SlotOccupied { session_id: String, role: PeerRole },

    /// No open session exists for the given id.
    #[error("no session found for id {session_id}")]
    SessionNotFound { session_id: String },

    /// A message arrived in a session state where it is not valid. The
    /// session is left untouched.
    #[error("message not valid in state {actual:?} (expected {expected:?})")]
    ProtocolState {
        expected: SessionState,
        actual: SessionState,
    },

    /// The counterpart peer is disconnected and the flow cannot continue.
    #[error("{role} peer is not connected")]
    PeerUnavailable { role: PeerRole },

    /// The account has no geofence configured. Treated as "admission denied,
    /// configuration error" — distinct from being outside the radius.
    #[error("no geofence configured for account {account}")]
    NoGeofenceConfigured { account: String },
}

impl RelayError {
    /// Stable wire code carried in `error` messages.
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::SlotOccupied { .. } => "slot_occupied",
            RelayError::SessionNotFound { .. } => "session_not_found",
            RelayError::ProtocolState { .. } => "protocol_state",
            RelayError::PeerUnavailable { .. } => "peer_unavailable",
            RelayError::NoGeofenceConfigured { .. } => "no_geofence_configured",
        }
    }
}

/// Biometric ceremony failures, as reported by the platform authenticator.
///
/// These terminate the mobile peer's local flow without contacting the relay
/// for location; the operator must explicitly retry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// The ceremony was cancelled or timed out by the user.
    #[error("authentication was cancelled or timed out")]
    NotAllowed,

    /// No usable credential exists on this device (or one already exists,
    /// for a registration ceremony).
    #[error("no usable passkey state on this device")]
    InvalidState,

    /// The platform has no authenticator support at all.
    #[error("passkey authentication not supported on this device")]
    NotSupported,

    /// The credential directory rejected the assertion or attestation.
    #[error("credential directory rejected the ceremony: {0}")]
    Directory(String),
}

impl CredentialError {
    /// Maps a platform-reported error name onto the taxonomy.
    ///
    /// Unknown names are carried through as [`CredentialError::Directory`] so
    /// the original reason is not lost.
    pub fn from_platform_reason(reason: &str) -> Self {
        match reason {
            "NotAllowedError" => CredentialError::NotAllowed,
            "InvalidStateError" => CredentialError::InvalidState,
            "NotSupportedError" => CredentialError::NotSupported,
            other => CredentialError::Directory(other.to_string()),
        }
    }
}

/// Device geolocation failures during mobile location capture.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LocationError {
    #[error("location access denied; location services are disabled")]
    PermissionDenied,
    #[error("location information is unavailable")]
    Unavailable,
    #[error("location request timed out")]
    Timeout,
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_error_codes_are_stable() {
        let err = RelayError::SlotOccupied {
            session_id: "S1".to_string(),
            role: PeerRole::Desktop,
        };
        assert_eq!(err.code(), "slot_occupied");

        let err = RelayError::ProtocolState {
            expected: SessionState::MobilePaired,
            actual: SessionState::Pending,
        };
        assert_eq!(err.code(), "protocol_state");
    }

    #[test]
    fn test_relay_error_display_names_the_session() {
        let err = RelayError::SessionNotFound {
            session_id: "abc".to_string(),
        };
        assert!(err.to_string().contains("abc"));
    }

    #[test]
    fn test_credential_error_maps_platform_reasons() {
        assert_eq!(
            CredentialError::from_platform_reason("NotAllowedError"),
            CredentialError::NotAllowed
        );
        assert_eq!(
            CredentialError::from_platform_reason("InvalidStateError"),
            CredentialError::InvalidState
        );
        assert_eq!(
            CredentialError::from_platform_reason("NotSupportedError"),
            CredentialError::NotSupported
        );
    }

    #[test]
    fn test_credential_error_preserves_unknown_reason() {
        let err = CredentialError::from_platform_reason("SecurityError");
        assert_eq!(err, CredentialError::Directory("SecurityError".to_string()));
    }
}
