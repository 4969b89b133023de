//! SessionRegistry: session bookkeeping, slot management, and message routing.
//!
//! The registry owns every session and connection record. Each session sits
//! behind its own `Mutex`, so operations on one session are serialized while
//! operations on distinct sessions run in parallel; the outer maps are only
//! locked long enough to look up or insert a record. Outbound messages go
//! through a per-connection `mpsc` sender (the connection's outbox), which the
//! transport layer drains into the peer's socket — the registry itself never
//! touches a socket, which is what makes the whole protocol testable without
//! a network.
//!
//! Lock order: a session mutex may be held while the connections map is
//! briefly read, never the other way around.
//!
//! Session lifecycle:
//!
//! ```text
//! Pending → MobilePaired → AuthConfirmed → LocationRequested
//!         → LocationReceived → Decided → Closed
//! ```
//!
//! `Closed` sessions stay in the map (so late messages get a clean
//! state error) until the idle sweeper reaps them. A closed session is never
//! reused; retrying requires a fresh session id.

use std::collections::HashMap;
use std::sync::Arc;

use labgate_core::{
    evaluate, unix_millis, AttemptOutcome, Connection, ConnectionId, GeofenceRegistry,
    LocationSample, LoginAttempt, PeerRole, RelayError, RelayToClientMsg, Session, SessionId,
    SessionMode, SessionState,
};
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::domain::config::HeartbeatPolicy;

type SessionRecord = Arc<Mutex<Session>>;

/// A registered connection: its record plus the outbox the transport layer
/// drains into the peer socket.
struct PeerHandle {
    connection: Connection,
    outbox: mpsc::Sender<RelayToClientMsg>,
}

/// The relay's in-memory session and connection registry.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, SessionRecord>>,
    connections: RwLock<HashMap<ConnectionId, PeerHandle>>,
    geofences: Arc<dyn GeofenceRegistry>,
    policy: HeartbeatPolicy,
    attempt_tx: mpsc::Sender<LoginAttempt>,
}

impl SessionRegistry {
    /// Creates a registry and returns it together with the receiver for
    /// login-attempt facts (consumed by the external datastore collaborator).
    pub fn new(
        geofences: Arc<dyn GeofenceRegistry>,
        policy: HeartbeatPolicy,
    ) -> (Self, mpsc::Receiver<LoginAttempt>) {
        let (attempt_tx, attempt_rx) = mpsc::channel(64);
        let registry = Self {
            sessions: RwLock::new(HashMap::new()),
            connections: RwLock::new(HashMap::new()),
            geofences,
            policy,
            attempt_tx,
        };
        (registry, attempt_rx)
    }

    // ── Registration ─────────────────────────────────────────────────────────

    /// Opens (or attaches to) a session as the desktop peer.
    ///
    /// Creates the session in `Pending` if absent. `mode` and
    /// `require_location` are fixed at creation; a re-attaching desktop does
    /// not change them.
    ///
    /// # Errors
    ///
    /// [`RelayError::SlotOccupied`] if a desktop is already attached;
    /// [`RelayError::SessionNotFound`] if the session id belongs to a closed
    /// session (closed sessions are never reused).
    pub async fn register_desktop(
        &self,
        session_id: &str,
        user_identifier: &str,
        mode: SessionMode,
        require_location: bool,
        outbox: mpsc::Sender<RelayToClientMsg>,
    ) -> Result<ConnectionId, RelayError> {
        let record = {
            let mut sessions = self.sessions.write().await;
            sessions
                .entry(session_id.to_string())
                .or_insert_with(|| {
                    debug!(session_id, user_identifier, "creating session");
                    Arc::new(Mutex::new(Session::new(
                        session_id.to_string(),
                        user_identifier.to_string(),
                        mode,
                        require_location,
                    )))
                })
                .clone()
        };

        let mut session = record.lock().await;
        if session.state() == SessionState::Closed {
            return Err(RelayError::SessionNotFound {
                session_id: session_id.to_string(),
            });
        }
        let connection = Connection::new(PeerRole::Desktop, session_id.to_string());
        let connection_id = connection.connection_id;
        session.attach(PeerRole::Desktop, connection_id)?;
        drop(session);

        self.insert_handle(connection, outbox).await;
        info!(session_id, %connection_id, "desktop registered");
        Ok(connection_id)
    }

    /// Attaches the mobile peer to an existing session.
    ///
    /// On first pairing this advances `Pending → MobilePaired` and notifies
    /// the desktop. A mobile re-registering into an emptied slot later in the
    /// flow attaches without a state change. The deep-link `challenge` is
    /// consumed by the credential ceremony on the mobile side; the relay
    /// carries it opaquely.
    ///
    /// # Errors
    ///
    /// [`RelayError::SessionNotFound`] if no open session exists;
    /// [`RelayError::SlotOccupied`] if a mobile is already attached (the
    /// existing connection is unaffected).
    pub async fn register_mobile(
        &self,
        session_id: &str,
        user_identifier: &str,
        challenge: &str,
        outbox: mpsc::Sender<RelayToClientMsg>,
    ) -> Result<ConnectionId, RelayError> {
        let record = self.session(session_id).await?;
        let mut session = record.lock().await;
        if session.state() == SessionState::Closed {
            return Err(RelayError::SessionNotFound {
                session_id: session_id.to_string(),
            });
        }

        let connection = Connection::new(PeerRole::Mobile, session_id.to_string());
        let connection_id = connection.connection_id;
        session.attach(PeerRole::Mobile, connection_id)?;

        let first_pairing = session.state() == SessionState::Pending;
        if first_pairing {
            session.advance(SessionState::MobilePaired)?;
        }
        let desktop = session.connection(PeerRole::Desktop);
        drop(session);

        self.insert_handle(connection, outbox).await;

        if first_pairing {
            if let Some(desktop_id) = desktop {
                self.send_to(desktop_id, RelayToClientMsg::MobileConnected)
                    .await;
            }
        }
        // The challenge travels on to the credential ceremony untouched.
        info!(session_id, %connection_id, challenge, "mobile registered");
        Ok(connection_id)
    }

    // ── Protocol operations ──────────────────────────────────────────────────

    /// Stores the mobile peer's credential result and notifies the desktop.
    ///
    /// Valid only from `MobilePaired`. When the session does not require a
    /// location check this short-circuits straight to an admitted decision
    /// and closes the session.
    ///
    /// # Errors
    ///
    /// [`RelayError::ProtocolState`] from any other state; the session is
    /// untouched.
    pub async fn submit_auth_result(
        &self,
        session_id: &str,
        auth_payload: serde_json::Value,
    ) -> Result<(), RelayError> {
        let record = self.session(session_id).await?;
        let mut session = record.lock().await;
        session.expect_state(SessionState::MobilePaired)?;
        session.auth_payload = Some(auth_payload.clone());
        session.advance(SessionState::AuthConfirmed)?;

        let desktop = session.connection(PeerRole::Desktop);
        let mobile = session.connection(PeerRole::Mobile);
        let require_location = session.require_location;
        let user = session.user_identifier.clone();

        if require_location {
            drop(session);
            if let Some(desktop_id) = desktop {
                self.send_to(desktop_id, RelayToClientMsg::AuthConfirmed { auth_payload })
                    .await;
            }
            return Ok(());
        }

        // No geofence step: admitted on credential alone.
        session.advance(SessionState::Decided)?;
        session.advance(SessionState::Closed)?;
        drop(session);

        if let Some(desktop_id) = desktop {
            self.send_to(desktop_id, RelayToClientMsg::AuthConfirmed { auth_payload })
                .await;
        }
        let decision = RelayToClientMsg::Decision {
            within_radius: true,
            distance_meters: 0.0,
            radius_meters: 0.0,
        };
        for id in [desktop, mobile].into_iter().flatten() {
            self.send_to(id, decision.clone()).await;
        }
        self.emit_attempt(user, AttemptOutcome::Success, None).await;
        info!(session_id, "session decided (no location required)");
        Ok(())
    }

    /// Forwards the desktop's location request to the mobile peer.
    ///
    /// Valid only from `AuthConfirmed`.
    ///
    /// # Errors
    ///
    /// [`RelayError::ProtocolState`] from any other state (session
    /// untouched). [`RelayError::PeerUnavailable`] if the mobile peer is
    /// disconnected — the session is then closed and a `failed` attempt fact
    /// emitted.
    pub async fn request_location(&self, session_id: &str) -> Result<(), RelayError> {
        let record = self.session(session_id).await?;
        let mut session = record.lock().await;
        session.expect_state(SessionState::AuthConfirmed)?;

        let mobile = session.connection(PeerRole::Mobile);
        let mobile_id = match mobile {
            Some(id) if self.is_connected(id).await => id,
            _ => {
                session.advance(SessionState::Closed).ok();
                let user = session.user_identifier.clone();
                drop(session);
                warn!(session_id, "mobile unavailable on location request; closing session");
                self.emit_attempt(user, AttemptOutcome::Failed, None).await;
                return Err(RelayError::PeerUnavailable {
                    role: PeerRole::Mobile,
                });
            }
        };

        session.advance(SessionState::LocationRequested)?;
        drop(session);

        let sent = self
            .send_to(
                mobile_id,
                RelayToClientMsg::LocationRequested {
                    session_id: session_id.to_string(),
                },
            )
            .await;
        if !sent {
            // The outbox closed under us: same as a disconnected peer.
            let record = self.session(session_id).await?;
            let mut session = record.lock().await;
            session.advance(SessionState::Closed).ok();
            let user = session.user_identifier.clone();
            drop(session);
            self.emit_attempt(user, AttemptOutcome::Failed, None).await;
            return Err(RelayError::PeerUnavailable {
                role: PeerRole::Mobile,
            });
        }
        debug!(session_id, "location requested from mobile");
        Ok(())
    }

    /// Accepts the mobile peer's location sample, runs the geofence check,
    /// pushes the decision to both peers, and closes the session.
    ///
    /// Valid only from `LocationRequested`.
    ///
    /// # Errors
    ///
    /// [`RelayError::ProtocolState`] from any other state;
    /// [`RelayError::NoGeofenceConfigured`] when the account has no geofence
    /// — admission is denied, the session closes, and the other peer is
    /// notified (distinct from an outside-radius decision).
    pub async fn submit_location(
        &self,
        session_id: &str,
        sample: LocationSample,
    ) -> Result<(), RelayError> {
        let record = self.session(session_id).await?;
        let mut session = record.lock().await;
        session.expect_state(SessionState::LocationRequested)?;
        session.advance(SessionState::LocationReceived)?;

        let desktop = session.connection(PeerRole::Desktop);
        let mobile = session.connection(PeerRole::Mobile);
        let user = session.user_identifier.clone();

        let spec = match self.geofences.geofence_for(&user) {
            Ok(spec) => spec,
            Err(lookup_err) => {
                session.advance(SessionState::Closed).ok();
                drop(session);
                warn!(session_id, error = %lookup_err, "geofence lookup failed; closing session");
                let err = RelayError::NoGeofenceConfigured {
                    account: user.clone(),
                };
                // Unrecoverable: the originator gets the error from the
                // transport layer; notify the desktop here.
                if let Some(desktop_id) = desktop {
                    self.send_to(desktop_id, RelayToClientMsg::from(&err)).await;
                }
                self.emit_attempt(user, AttemptOutcome::Failed, None).await;
                return Err(err);
            }
        };

        let decision = evaluate(&sample, &spec);
        session.advance(SessionState::Decided)?;
        session.advance(SessionState::Closed)?;
        drop(session);

        let msg = RelayToClientMsg::Decision {
            within_radius: decision.within_radius,
            distance_meters: decision.distance_meters,
            radius_meters: spec.radius_meters(),
        };
        for id in [desktop, mobile].into_iter().flatten() {
            self.send_to(id, msg.clone()).await;
        }

        let outcome = if decision.within_radius {
            AttemptOutcome::Success
        } else {
            AttemptOutcome::GeofenceViolation
        };
        self.emit_attempt(user, outcome, Some(decision.distance_meters))
            .await;
        info!(
            session_id,
            within_radius = decision.within_radius,
            distance_meters = decision.distance_meters,
            "session decided"
        );
        Ok(())
    }

    /// Records a heartbeat. Returns `false` for an unknown connection (e.g.
    /// already swept), in which case no ack should be sent.
    pub async fn heartbeat(&self, connection_id: ConnectionId) -> bool {
        let mut connections = self.connections.write().await;
        match connections.get_mut(&connection_id) {
            Some(handle) => {
                handle.connection.record_heartbeat();
                true
            }
            None => false,
        }
    }

    /// Removes a connection and clears its role slot on the owning session.
    ///
    /// The session itself survives (unless already closed) so the peer can
    /// re-register while the session is still open.
    pub async fn disconnect(&self, connection_id: ConnectionId) {
        let handle = { self.connections.write().await.remove(&connection_id) };
        let Some(handle) = handle else { return };

        let record = {
            let sessions = self.sessions.read().await;
            sessions.get(&handle.connection.session_id).cloned()
        };
        if let Some(record) = record {
            let mut session = record.lock().await;
            if session.state() != SessionState::Closed
                && session.connection(handle.connection.role) == Some(connection_id)
            {
                session.detach(handle.connection.role);
                debug!(
                    session_id = %handle.connection.session_id,
                    role = %handle.connection.role,
                    "slot cleared on disconnect"
                );
            }
        }
    }

    // ── Maintenance ──────────────────────────────────────────────────────────

    /// One sweeper pass: closes connections silent past the heartbeat
    /// allowance, expires idle sessions, and reaps closed sessions.
    pub async fn sweep_idle(&self) {
        let now = unix_millis();
        let max_silence = self.policy.max_silence();

        let idle_connections: Vec<ConnectionId> = {
            let connections = self.connections.read().await;
            connections
                .values()
                .filter(|h| h.connection.is_idle(now, max_silence))
                .map(|h| h.connection.connection_id)
                .collect()
        };
        for connection_id in idle_connections {
            warn!(%connection_id, "closing connection after missed heartbeats");
            self.disconnect(connection_id).await;
        }

        let session_ids: Vec<SessionId> = {
            self.sessions.read().await.keys().cloned().collect()
        };
        let idle_cutoff = self.policy.session_idle_timeout.as_millis() as u64;
        for session_id in session_ids {
            let record = {
                let sessions = self.sessions.read().await;
                sessions.get(&session_id).cloned()
            };
            let Some(record) = record else { continue };

            let reap = {
                let mut session = record.lock().await;
                match session.state() {
                    SessionState::Closed => true,
                    _ if now.saturating_sub(session.last_activity_at) > idle_cutoff => {
                        session.advance(SessionState::Closed).ok();
                        info!(session_id, "session expired after inactivity");
                        true
                    }
                    _ => false,
                }
            };
            if reap {
                self.sessions.write().await.remove(&session_id);
            }
        }
    }

    /// Current state of a session, if the registry still tracks it.
    pub async fn session_state(&self, session_id: &str) -> Option<SessionState> {
        let record = {
            let sessions = self.sessions.read().await;
            sessions.get(session_id).cloned()
        };
        match record {
            Some(record) => Some(record.lock().await.state()),
            None => None,
        }
    }

    // ── Internals ────────────────────────────────────────────────────────────

    async fn session(&self, session_id: &str) -> Result<SessionRecord, RelayError> {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| RelayError::SessionNotFound {
                session_id: session_id.to_string(),
            })
    }

    async fn insert_handle(&self, connection: Connection, outbox: mpsc::Sender<RelayToClientMsg>) {
        self.connections
            .write()
            .await
            .insert(connection.connection_id, PeerHandle { connection, outbox });
    }

    async fn is_connected(&self, connection_id: ConnectionId) -> bool {
        self.connections.read().await.contains_key(&connection_id)
    }

    /// Sends a message into a connection's outbox. Returns `false` if the
    /// connection is unknown or its transport task has gone away.
    async fn send_to(&self, connection_id: ConnectionId, msg: RelayToClientMsg) -> bool {
        let outbox = {
            let connections = self.connections.read().await;
            connections.get(&connection_id).map(|h| h.outbox.clone())
        };
        match outbox {
            Some(tx) => tx.send(msg).await.is_ok(),
            None => false,
        }
    }

    async fn emit_attempt(
        &self,
        user_identifier: String,
        outcome: AttemptOutcome,
        distance_meters: Option<f64>,
    ) {
        let fact = LoginAttempt {
            user_identifier,
            outcome,
            distance_meters,
            occurred_at: unix_millis(),
        };
        if self.attempt_tx.send(fact).await.is_err() {
            debug!("login-attempt receiver dropped; fact discarded");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use labgate_core::{Coordinate, GeofenceSpec, StaticGeofenceRegistry, EARTH_RADIUS_METERS};
    use std::time::Duration;

    const USER: &str = "admin@lab.example";

    fn registry_with_fence(
        radius: f64,
        policy: HeartbeatPolicy,
    ) -> (SessionRegistry, mpsc::Receiver<LoginAttempt>) {
        let mut fences = StaticGeofenceRegistry::new();
        fences.insert(
            USER,
            GeofenceSpec::new(Coordinate::new(0.0, 0.0).unwrap(), radius).unwrap(),
        );
        SessionRegistry::new(Arc::new(fences), policy)
    }

    fn default_registry() -> (SessionRegistry, mpsc::Receiver<LoginAttempt>) {
        registry_with_fence(100.0, HeartbeatPolicy::default())
    }

    fn outbox() -> (
        mpsc::Sender<RelayToClientMsg>,
        mpsc::Receiver<RelayToClientMsg>,
    ) {
        mpsc::channel(16)
    }

    /// A sample `meters` east of the geofence center along the equator.
    fn sample_at(meters: f64) -> LocationSample {
        let degrees = meters / (EARTH_RADIUS_METERS * std::f64::consts::PI / 180.0);
        LocationSample::new(0.0, degrees, 5.0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_pairing_advances_state_and_notifies_desktop_once() {
        let (registry, _facts) = default_registry();
        let (desktop_tx, mut desktop_rx) = outbox();
        let (mobile_tx, _mobile_rx) = outbox();

        registry
            .register_desktop("S1", USER, SessionMode::Login, true, desktop_tx)
            .await
            .unwrap();
        assert_eq!(
            registry.session_state("S1").await,
            Some(SessionState::Pending)
        );

        registry
            .register_mobile("S1", USER, "challenge", mobile_tx)
            .await
            .unwrap();
        assert_eq!(
            registry.session_state("S1").await,
            Some(SessionState::MobilePaired)
        );

        // Exactly one mobile_connected reaches the desktop.
        assert_eq!(
            desktop_rx.try_recv().unwrap(),
            RelayToClientMsg::MobileConnected
        );
        assert!(desktop_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_register_mobile_without_session_fails() {
        let (registry, _facts) = default_registry();
        let (mobile_tx, _mobile_rx) = outbox();

        let result = registry
            .register_mobile("ghost", USER, "challenge", mobile_tx)
            .await;
        assert!(matches!(result, Err(RelayError::SessionNotFound { .. })));
    }

    #[tokio::test]
    async fn test_second_mobile_is_rejected_and_first_unaffected() {
        let (registry, _facts) = default_registry();
        let (desktop_tx, _desktop_rx) = outbox();
        let (mobile_tx, _mobile_rx) = outbox();
        let (intruder_tx, _intruder_rx) = outbox();

        registry
            .register_desktop("S1", USER, SessionMode::Login, true, desktop_tx)
            .await
            .unwrap();
        registry
            .register_mobile("S1", USER, "c1", mobile_tx)
            .await
            .unwrap();

        let result = registry.register_mobile("S1", USER, "c2", intruder_tx).await;
        assert!(matches!(
            result,
            Err(RelayError::SlotOccupied {
                role: PeerRole::Mobile,
                ..
            })
        ));

        // The original mobile connection still drives the flow.
        registry
            .submit_auth_result("S1", serde_json::json!({"ok": true}))
            .await
            .unwrap();
        assert_eq!(
            registry.session_state("S1").await,
            Some(SessionState::AuthConfirmed)
        );
    }

    #[tokio::test]
    async fn test_request_location_before_auth_leaves_state_unchanged() {
        let (registry, _facts) = default_registry();
        let (desktop_tx, _desktop_rx) = outbox();
        let (mobile_tx, _mobile_rx) = outbox();

        registry
            .register_desktop("S1", USER, SessionMode::Login, true, desktop_tx)
            .await
            .unwrap();
        registry
            .register_mobile("S1", USER, "c", mobile_tx)
            .await
            .unwrap();

        let result = registry.request_location("S1").await;
        assert!(matches!(
            result,
            Err(RelayError::ProtocolState {
                actual: SessionState::MobilePaired,
                ..
            })
        ));
        assert_eq!(
            registry.session_state("S1").await,
            Some(SessionState::MobilePaired)
        );
    }

    #[tokio::test]
    async fn test_auth_result_outside_mobile_paired_is_rejected() {
        let (registry, _facts) = default_registry();
        let (desktop_tx, _desktop_rx) = outbox();

        registry
            .register_desktop("S1", USER, SessionMode::Login, true, desktop_tx)
            .await
            .unwrap();

        let result = registry
            .submit_auth_result("S1", serde_json::json!({}))
            .await;
        assert!(matches!(result, Err(RelayError::ProtocolState { .. })));
        assert_eq!(
            registry.session_state("S1").await,
            Some(SessionState::Pending)
        );
    }

    #[tokio::test]
    async fn test_no_location_session_short_circuits_to_admitted() {
        let (registry, mut facts) = default_registry();
        let (desktop_tx, mut desktop_rx) = outbox();
        let (mobile_tx, mut mobile_rx) = outbox();

        registry
            .register_desktop("S1", USER, SessionMode::Login, false, desktop_tx)
            .await
            .unwrap();
        registry
            .register_mobile("S1", USER, "c", mobile_tx)
            .await
            .unwrap();
        registry
            .submit_auth_result("S1", serde_json::json!({"credential": "id"}))
            .await
            .unwrap();

        assert_eq!(
            registry.session_state("S1").await,
            Some(SessionState::Closed)
        );

        // Desktop sees mobile_connected, auth_confirmed, then the admitted
        // decision.
        assert_eq!(
            desktop_rx.try_recv().unwrap(),
            RelayToClientMsg::MobileConnected
        );
        assert!(matches!(
            desktop_rx.try_recv().unwrap(),
            RelayToClientMsg::AuthConfirmed { .. }
        ));
        assert!(matches!(
            desktop_rx.try_recv().unwrap(),
            RelayToClientMsg::Decision {
                within_radius: true,
                ..
            }
        ));
        assert!(matches!(
            mobile_rx.try_recv().unwrap(),
            RelayToClientMsg::Decision {
                within_radius: true,
                ..
            }
        ));

        let fact = facts.try_recv().unwrap();
        assert_eq!(fact.outcome, AttemptOutcome::Success);
        assert_eq!(fact.distance_meters, None);
    }

    #[tokio::test]
    async fn test_no_geofence_configured_denies_and_closes() {
        let (registry, mut facts) =
            SessionRegistry::new(Arc::new(StaticGeofenceRegistry::new()), HeartbeatPolicy::default());
        let (desktop_tx, mut desktop_rx) = outbox();
        let (mobile_tx, _mobile_rx) = outbox();

        registry
            .register_desktop("S1", USER, SessionMode::Login, true, desktop_tx)
            .await
            .unwrap();
        registry
            .register_mobile("S1", USER, "c", mobile_tx)
            .await
            .unwrap();
        registry
            .submit_auth_result("S1", serde_json::json!({}))
            .await
            .unwrap();
        registry.request_location("S1").await.unwrap();

        let result = registry.submit_location("S1", sample_at(5.0)).await;
        assert!(matches!(
            result,
            Err(RelayError::NoGeofenceConfigured { .. })
        ));
        assert_eq!(
            registry.session_state("S1").await,
            Some(SessionState::Closed)
        );

        // The desktop is notified with the configuration error, not an
        // outside-radius decision.
        let last = std::iter::from_fn(|| desktop_rx.try_recv().ok()).last().unwrap();
        assert!(matches!(
            last,
            RelayToClientMsg::Error { ref code, .. } if code == "no_geofence_configured"
        ));
        assert_eq!(facts.try_recv().unwrap().outcome, AttemptOutcome::Failed);
    }

    #[tokio::test]
    async fn test_disconnect_clears_slot_and_allows_repairing() {
        let (registry, _facts) = default_registry();
        let (desktop_tx, _desktop_rx) = outbox();
        let (mobile_tx, _mobile_rx) = outbox();

        registry
            .register_desktop("S1", USER, SessionMode::Login, true, desktop_tx)
            .await
            .unwrap();
        let mobile_id = registry
            .register_mobile("S1", USER, "c", mobile_tx)
            .await
            .unwrap();

        registry.disconnect(mobile_id).await;

        // The session survives with the slot cleared; a new mobile can
        // attach.
        let (mobile2_tx, _mobile2_rx) = outbox();
        assert!(registry
            .register_mobile("S1", USER, "c2", mobile2_tx)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_heartbeat_for_unknown_connection_returns_false() {
        let (registry, _facts) = default_registry();
        assert!(!registry.heartbeat(uuid::Uuid::new_v4()).await);
    }

    #[tokio::test]
    async fn test_sweep_closes_silent_connections() {
        let policy = HeartbeatPolicy {
            idle_window: Duration::from_millis(10),
            missed_windows: 2,
            session_idle_timeout: Duration::from_secs(300),
        };
        let (registry, _facts) = registry_with_fence(100.0, policy);
        let (desktop_tx, _desktop_rx) = outbox();

        let desktop_id = registry
            .register_desktop("S1", USER, SessionMode::Login, true, desktop_tx)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        registry.sweep_idle().await;

        // The connection is gone; its heartbeat is no longer acked.
        assert!(!registry.heartbeat(desktop_id).await);
        // The session survives with an empty desktop slot.
        assert_eq!(
            registry.session_state("S1").await,
            Some(SessionState::Pending)
        );
    }

    #[tokio::test]
    async fn test_sweep_reaps_closed_sessions() {
        let (registry, _facts) = default_registry();
        let (desktop_tx, _desktop_rx) = outbox();
        let (mobile_tx, _mobile_rx) = outbox();

        registry
            .register_desktop("S1", USER, SessionMode::Login, false, desktop_tx)
            .await
            .unwrap();
        registry
            .register_mobile("S1", USER, "c", mobile_tx)
            .await
            .unwrap();
        registry
            .submit_auth_result("S1", serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(
            registry.session_state("S1").await,
            Some(SessionState::Closed)
        );

        registry.sweep_idle().await;
        assert_eq!(registry.session_state("S1").await, None);
    }

    #[tokio::test]
    async fn test_closed_session_id_is_never_reused() {
        let (registry, _facts) = default_registry();
        let (desktop_tx, _desktop_rx) = outbox();
        let (mobile_tx, _mobile_rx) = outbox();

        registry
            .register_desktop("S1", USER, SessionMode::Login, false, desktop_tx)
            .await
            .unwrap();
        registry
            .register_mobile("S1", USER, "c", mobile_tx)
            .await
            .unwrap();
        registry
            .submit_auth_result("S1", serde_json::json!({}))
            .await
            .unwrap();

        // Session is now closed; neither role may register into it again.
        let (late_tx, _late_rx) = outbox();
        let result = registry
            .register_desktop("S1", USER, SessionMode::Login, false, late_tx)
            .await;
        assert!(matches!(result, Err(RelayError::SessionNotFound { .. })));
    }
}
