//! JSON message types for the relay WebSocket protocol.
//!
//! Every message on the wire is a JSON object with a snake_case `"type"`
//! discriminant and a `"data"` payload object:
//!
//! ```json
//! {"type":"register_desktop","data":{"sessionId":"S1","userIdentifier":"a@lab.example","mode":"login","requireLocation":true}}
//! ```
//!
//! Serde's `#[serde(tag = "type", content = "data")]` attribute produces this
//! envelope directly.
//!
//! # Why separate client→relay and relay→client message types?
//!
//! The two directions carry different information: peers send registrations
//! and results, the relay sends notifications and decisions. Two distinct
//! enums make it a compile-time error to send a relay-only message from a
//! peer, and vice versa.

use serde::{Deserialize, Serialize};

use crate::domain::error::RelayError;
use crate::domain::geo::LocationSample;
use crate::domain::session::SessionMode;

// ── Peer → relay messages ─────────────────────────────────────────────────────

/// All messages a peer (desktop or mobile) can send to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientToRelayMsg {
    /// Desktop opens (or attaches to) a pairing session. Must be the first
    /// message on a desktop connection.
    #[serde(rename_all = "camelCase")]
    RegisterDesktop {
        session_id: String,
        /// Account email/handle used to look up credentials and the geofence.
        user_identifier: String,
        mode: SessionMode,
        /// Whether a geofence check gates completion of this session.
        require_location: bool,
    },

    /// Mobile attaches to an existing session after following the pairing
    /// deep link. Must be the first message on a mobile connection.
    #[serde(rename_all = "camelCase")]
    RegisterMobile {
        session_id: String,
        user_identifier: String,
        /// Challenge nonce carried over from the deep link.
        challenge: String,
    },

    /// Mobile reports a completed credential ceremony. The payload is opaque
    /// to the relay and forwarded to the desktop as-is.
    #[serde(rename_all = "camelCase")]
    AuthResult {
        session_id: String,
        auth_payload: serde_json::Value,
    },

    /// Desktop explicitly asks the relay to collect the mobile peer's
    /// location. Only the relay may then prompt the mobile peer — mobile
    /// never sends location unprompted.
    #[serde(rename_all = "camelCase")]
    RequestLocation { session_id: String },

    /// Mobile delivers the captured location sample.
    #[serde(rename_all = "camelCase")]
    LocationResult {
        session_id: String,
        sample: LocationSample,
    },

    /// Liveness signal; answered with `heartbeat_ack`.
    Heartbeat { timestamp: u64 },
}

impl ClientToRelayMsg {
    /// Short type-name string for log lines, avoiding payload values
    /// (auth payloads and coordinates are sensitive).
    pub fn type_name(&self) -> &'static str {
        match self {
            ClientToRelayMsg::RegisterDesktop { .. } => "register_desktop",
            ClientToRelayMsg::RegisterMobile { .. } => "register_mobile",
            ClientToRelayMsg::AuthResult { .. } => "auth_result",
            ClientToRelayMsg::RequestLocation { .. } => "request_location",
            ClientToRelayMsg::LocationResult { .. } => "location_result",
            ClientToRelayMsg::Heartbeat { .. } => "heartbeat",
        }
    }
}

// ── Relay → peer messages ─────────────────────────────────────────────────────

/// All messages the relay can push to a peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum RelayToClientMsg {
    /// To the desktop: the mobile peer registered into this session.
    MobileConnected,

    /// To the desktop: the mobile peer completed its credential ceremony.
    /// Carries the opaque assertion/attestation payload.
    #[serde(rename_all = "camelCase")]
    AuthConfirmed { auth_payload: serde_json::Value },

    /// To the mobile peer: capture and report a location sample now.
    #[serde(rename_all = "camelCase")]
    LocationRequested { session_id: String },

    /// To both peers: the admission decision. Terminal for the session.
    #[serde(rename_all = "camelCase")]
    Decision {
        within_radius: bool,
        distance_meters: f64,
        radius_meters: f64,
    },

    /// Echo of a `heartbeat`.
    HeartbeatAck { timestamp: u64 },

    /// A protocol error, with a stable `code` from the error taxonomy and a
    /// human-readable message for logging (not end-user display).
    Error { code: String, message: String },
}

impl RelayToClientMsg {
    /// Short type-name string for log lines.
    pub fn type_name(&self) -> &'static str {
        match self {
            RelayToClientMsg::MobileConnected => "mobile_connected",
            RelayToClientMsg::AuthConfirmed { .. } => "auth_confirmed",
            RelayToClientMsg::LocationRequested { .. } => "location_requested",
            RelayToClientMsg::Decision { .. } => "decision",
            RelayToClientMsg::HeartbeatAck { .. } => "heartbeat_ack",
            RelayToClientMsg::Error { .. } => "error",
        }
    }
}

impl From<&RelayError> for RelayToClientMsg {
    fn from(err: &RelayError) -> Self {
        RelayToClientMsg::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
