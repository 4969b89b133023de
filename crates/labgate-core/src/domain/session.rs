//! Session and connection records for the pairing relay.
//!
//! A [`Session`] is one pairing attempt: at most one desktop and one mobile
//! connection, a forward-only state ladder, and an opaque auth payload once
//! the mobile peer has completed its ceremony. Destroying a [`Connection`]
//! only clears that role's slot on the owning session — the session itself
//! survives so the peer can re-register while the session is still open.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::error::RelayError;
use crate::domain::unix_millis;

/// Opaque, caller-generated session identifier.
pub type SessionId = String;

/// Relay-side identifier for one peer socket.
pub type ConnectionId = Uuid;

/// Which side of the pairing a connection represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerRole {
    Desktop,
    Mobile,
}

impl fmt::Display for PeerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerRole::Desktop => write!(f, "desktop"),
            PeerRole::Mobile => write!(f, "mobile"),
        }
    }
}

/// Whether the session is authenticating an existing credential or enrolling
/// a new one. The relay carries the mode opaquely; only the mobile peer
/// branches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    Login,
    Registration,
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionMode::Login => write!(f, "login"),
            SessionMode::Registration => write!(f, "registration"),
        }
    }
}

impl std::str::FromStr for SessionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "login" => Ok(SessionMode::Login),
            "registration" => Ok(SessionMode::Registration),
            other => Err(format!("unknown session mode '{other}'")),
        }
    }
}

/// The forward-only session state ladder.
///
/// ```text
/// Pending → MobilePaired → AuthConfirmed → LocationRequested
///         → LocationReceived → Decided → Closed
/// ```
///
/// When the session does not require a location check, `AuthConfirmed`
/// short-circuits directly to `Decided`. Any state may drop to `Closed` on
/// error or timeout; `Closed` is terminal and a closed session is never
/// reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Pending,
    MobilePaired,
    AuthConfirmed,
    LocationRequested,
    LocationReceived,
    Decided,
    Closed,
}

impl SessionState {
    fn rank(self) -> u8 {
        match self {
            SessionState::Pending => 0,
            SessionState::MobilePaired => 1,
            SessionState::AuthConfirmed => 2,
            SessionState::LocationRequested => 3,
            SessionState::LocationReceived => 4,
            SessionState::Decided => 5,
            SessionState::Closed => 6,
        }
    }

    /// Whether `self → next` is a legal transition: the immediate successor,
    /// the documented `AuthConfirmed → Decided` short-circuit, or a drop to
    /// `Closed` from any live state.
    pub fn can_advance(self, next: SessionState) -> bool {
        if self == SessionState::Closed {
            return false;
        }
        if next == SessionState::Closed {
            return true;
        }
        next.rank() == self.rank() + 1
            || (self == SessionState::AuthConfirmed && next == SessionState::Decided)
    }
}

/// One pairing attempt tracked by the relay.
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: SessionId,
    pub mode: SessionMode,
    pub require_location: bool,
    /// Account email/handle used to look up credentials and the geofence.
    pub user_identifier: String,
    desktop: Option<ConnectionId>,
    mobile: Option<ConnectionId>,
    state: SessionState,
    /// Credential assertion/attestation, opaque to the relay.
    pub auth_payload: Option<serde_json::Value>,
    pub created_at: u64,
    pub last_activity_at: u64,
}

impl Session {
    pub fn new(
        session_id: SessionId,
        user_identifier: String,
        mode: SessionMode,
        require_location: bool,
    ) -> Self {
        let now = unix_millis();
        Self {
            session_id,
            mode,
            require_location,
            user_identifier,
            desktop: None,
            mobile: None,
            state: SessionState::Pending,
            auth_payload: None,
            created_at: now,
            last_activity_at: now,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn connection(&self, role: PeerRole) -> Option<ConnectionId> {
        match role {
            PeerRole::Desktop => self.desktop,
            PeerRole::Mobile => self.mobile,
        }
    }

    /// Attaches a connection to a role slot.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::SlotOccupied`] if the slot is already filled.
    /// The existing connection is unaffected.
    pub fn attach(&mut self, role: PeerRole, connection_id: ConnectionId) -> Result<(), RelayError> {
        let slot = match role {
            PeerRole::Desktop => &mut self.desktop,
            PeerRole::Mobile => &mut self.mobile,
        };
        if slot.is_some() {
            return Err(RelayError::SlotOccupied {
                session_id: self.session_id.clone(),
                role,
            });
        }
        *slot = Some(connection_id);
        self.touch();
        Ok(())
    }

    /// Clears a role slot. Called on transport close; the session survives so
    /// the peer can re-pair while the session is still open.
    pub fn detach(&mut self, role: PeerRole) {
        match role {
            PeerRole::Desktop => self.desktop = None,
            PeerRole::Mobile => self.mobile = None,
        }
        self.touch();
    }

    /// Advances the state ladder.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::ProtocolState`] for an illegal transition,
    /// leaving the session untouched.
    pub fn advance(&mut self, next: SessionState) -> Result<(), RelayError> {
        if !self.state.can_advance(next) {
            return Err(RelayError::ProtocolState {
                expected: next,
                actual: self.state,
            });
        }
        self.state = next;
        self.touch();
        Ok(())
    }

    /// Requires the session to currently be in `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::ProtocolState`] otherwise.
    pub fn expect_state(&self, expected: SessionState) -> Result<(), RelayError> {
        if self.state != expected {
            return Err(RelayError::ProtocolState {
                expected,
                actual: self.state,
            });
        }
        Ok(())
    }

    pub fn touch(&mut self) {
        self.last_activity_at = unix_millis();
    }
}

/// Relay-side handle to one peer socket.
#[derive(Debug, Clone)]
pub struct Connection {
    pub connection_id: ConnectionId,
    pub role: PeerRole,
    /// Back-reference to the owning session (not ownership).
    pub session_id: SessionId,
    pub last_heartbeat_at: u64,
}

impl Connection {
    pub fn new(role: PeerRole, session_id: SessionId) -> Self {
        Self {
            connection_id: Uuid::new_v4(),
            role,
            session_id,
            last_heartbeat_at: unix_millis(),
        }
    }

    pub fn record_heartbeat(&mut self) {
        self.last_heartbeat_at = unix_millis();
    }

    /// Whether the connection has been silent longer than `window`.
    pub fn is_idle(&self, now_millis: u64, window: Duration) -> bool {
        now_millis.saturating_sub(self.last_heartbeat_at) > window.as_millis() as u64
    }
}

/// Outcome of one login attempt, emitted by the relay as a fact for the
/// external datastore collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Failed,
    GeofenceViolation,
}

/// A login-attempt fact. The protocol produces these; persistence belongs to
/// an external collaborator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginAttempt {
    pub user_identifier: String,
    pub outcome: AttemptOutcome,
    /// Distance from the facility when a geofence check ran.
    pub distance_meters: Option<f64>,
    pub occurred_at: u64,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
