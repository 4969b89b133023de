//! Integration tests for the full pairing-session lifecycle.
//!
//! These tests exercise the `SessionRegistry` through its public API the same
//! way the WebSocket layer does: each peer is represented by an outbox
//! channel, and assertions read the messages the registry pushed into it.
//!
//! # The pairing flow
//!
//! ```text
//! Desktop                     Relay                        Mobile
//! ───────                     ─────                        ──────
//! register_desktop(S1) ──►  session S1: Pending
//!                                       ◄── register_mobile(S1)
//!          ◄── mobile_connected         MobilePaired
//!                                       ◄── auth_result
//!          ◄── auth_confirmed           AuthConfirmed
//! request_location(S1) ──►              LocationRequested
//!                             location_requested ──►
//!                                       ◄── location_result
//!                                       LocationReceived
//!                             geofence evaluation
//!          ◄── decision                 Decided            decision ──►
//!                                       Closed
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;

use labgate_core::{
    AttemptOutcome, Coordinate, GeofenceSpec, LocationSample, LoginAttempt, RelayError,
    RelayToClientMsg, SessionMode, SessionState, StaticGeofenceRegistry, EARTH_RADIUS_METERS,
};
use labgate_relay::domain::config::HeartbeatPolicy;
use labgate_relay::SessionRegistry;

const USER: &str = "tech@lab.example";
const SESSION: &str = "S1";

fn registry_with_radius(radius: f64) -> (SessionRegistry, mpsc::Receiver<LoginAttempt>) {
    let mut fences = StaticGeofenceRegistry::new();
    fences.insert(
        USER,
        GeofenceSpec::new(Coordinate::new(0.0, 0.0).unwrap(), radius).unwrap(),
    );
    SessionRegistry::new(Arc::new(fences), HeartbeatPolicy::default())
}

fn outbox() -> (
    mpsc::Sender<RelayToClientMsg>,
    mpsc::Receiver<RelayToClientMsg>,
) {
    mpsc::channel(16)
}

/// A sample `meters` due east of the geofence center along the equator.
fn sample_at(meters: f64) -> LocationSample {
    let degrees = meters / (EARTH_RADIUS_METERS * std::f64::consts::PI / 180.0);
    LocationSample::new(0.0, degrees, 8.0, 1_700_000_000_000).unwrap()
}

/// Drives a session up to `AuthConfirmed` and returns both peer outbox
/// receivers.
async fn pair_and_authenticate(
    registry: &SessionRegistry,
) -> (
    mpsc::Receiver<RelayToClientMsg>,
    mpsc::Receiver<RelayToClientMsg>,
) {
    let (desktop_tx, mut desktop_rx) = outbox();
    let (mobile_tx, mobile_rx) = outbox();

    registry
        .register_desktop(SESSION, USER, SessionMode::Login, true, desktop_tx)
        .await
        .expect("register desktop");
    registry
        .register_mobile(SESSION, USER, "challenge-nonce", mobile_tx)
        .await
        .expect("register mobile");
    registry
        .submit_auth_result(SESSION, serde_json::json!({"credential": "cred-1"}))
        .await
        .expect("submit auth result");

    // Drain the pairing/auth notifications so tests start at the decision
    // phase.
    assert_eq!(
        desktop_rx.recv().await.unwrap(),
        RelayToClientMsg::MobileConnected
    );
    assert!(matches!(
        desktop_rx.recv().await.unwrap(),
        RelayToClientMsg::AuthConfirmed { .. }
    ));

    (desktop_rx, mobile_rx)
}

#[tokio::test]
async fn admitted_login_end_to_end() {
    // Desktop registers S1 (login, location required) → mobile pairs →
    // auth → location at 40 m with a 100 m radius → both peers get an
    // admitted decision and the session closes.
    let (registry, mut facts) = registry_with_radius(100.0);
    let (mut desktop_rx, mut mobile_rx) = pair_and_authenticate(&registry).await;

    registry.request_location(SESSION).await.unwrap();
    assert!(matches!(
        mobile_rx.recv().await.unwrap(),
        RelayToClientMsg::LocationRequested { .. }
    ));

    registry
        .submit_location(SESSION, sample_at(40.0))
        .await
        .unwrap();

    for rx in [&mut desktop_rx, &mut mobile_rx] {
        match rx.recv().await.unwrap() {
            RelayToClientMsg::Decision {
                within_radius,
                distance_meters,
                radius_meters,
            } => {
                assert!(within_radius);
                assert!(
                    (distance_meters - 40.0).abs() < 0.5,
                    "expected ~40 m, got {distance_meters}"
                );
                assert_eq!(radius_meters, 100.0);
            }
            other => panic!("expected Decision, got {other:?}"),
        }
    }

    assert_eq!(
        registry.session_state(SESSION).await,
        Some(SessionState::Closed)
    );

    let fact = facts.recv().await.unwrap();
    assert_eq!(fact.outcome, AttemptOutcome::Success);
    assert!((fact.distance_meters.unwrap() - 40.0).abs() < 0.5);
}

#[tokio::test]
async fn outside_radius_login_is_denied() {
    // Same flow with the sample at 150 m and a 100 m radius: both peers get
    // a denial carrying the distance for diagnostics.
    let (registry, mut facts) = registry_with_radius(100.0);
    let (mut desktop_rx, mut mobile_rx) = pair_and_authenticate(&registry).await;

    registry.request_location(SESSION).await.unwrap();
    mobile_rx.recv().await.unwrap(); // location_requested

    registry
        .submit_location(SESSION, sample_at(150.0))
        .await
        .unwrap();

    for rx in [&mut desktop_rx, &mut mobile_rx] {
        match rx.recv().await.unwrap() {
            RelayToClientMsg::Decision {
                within_radius,
                distance_meters,
                ..
            } => {
                assert!(!within_radius);
                assert!(
                    (distance_meters - 150.0).abs() < 0.5,
                    "expected ~150 m, got {distance_meters}"
                );
            }
            other => panic!("expected Decision, got {other:?}"),
        }
    }

    assert_eq!(
        registry.session_state(SESSION).await,
        Some(SessionState::Closed)
    );
    assert_eq!(
        facts.recv().await.unwrap().outcome,
        AttemptOutcome::GeofenceViolation
    );
}

#[tokio::test]
async fn boundary_distance_is_admitted() {
    // An inclusive boundary: evaluate the exact computed distance as the
    // radius and assert admission.
    let sample = sample_at(100.0);
    let center = Coordinate::new(0.0, 0.0).unwrap();
    let exact = labgate_core::distance_meters(&sample.coordinate(), &center);

    let (registry, _facts) = registry_with_radius(exact);
    let (mut desktop_rx, _mobile_rx) = pair_and_authenticate(&registry).await;

    registry.request_location(SESSION).await.unwrap();
    registry.submit_location(SESSION, sample).await.unwrap();

    match desktop_rx.recv().await.unwrap() {
        RelayToClientMsg::Decision { within_radius, .. } => assert!(within_radius),
        other => panic!("expected Decision, got {other:?}"),
    }
}

#[tokio::test]
async fn mobile_disconnect_mid_flow_fails_location_request() {
    // Disconnect the mobile while the session is AuthConfirmed; the
    // desktop's request_location then fails with PeerUnavailable and the
    // session closes.
    let (registry, mut facts) = registry_with_radius(100.0);
    let (desktop_tx, _desktop_rx) = outbox();
    let (mobile_tx, _mobile_rx) = outbox();

    registry
        .register_desktop(SESSION, USER, SessionMode::Login, true, desktop_tx)
        .await
        .unwrap();
    let mobile_id = registry
        .register_mobile(SESSION, USER, "c", mobile_tx)
        .await
        .unwrap();
    registry
        .submit_auth_result(SESSION, serde_json::json!({}))
        .await
        .unwrap();

    registry.disconnect(mobile_id).await;

    let result = registry.request_location(SESSION).await;
    assert!(matches!(result, Err(RelayError::PeerUnavailable { .. })));
    assert_eq!(
        registry.session_state(SESSION).await,
        Some(SessionState::Closed)
    );
    assert_eq!(facts.recv().await.unwrap().outcome, AttemptOutcome::Failed);
}

#[tokio::test]
async fn retry_after_failure_requires_fresh_session_id() {
    // A closed session is terminal: the retry affordance mints a new id and
    // the old one stays rejected.
    let (registry, _facts) = registry_with_radius(100.0);
    let (desktop_tx, _desktop_rx) = outbox();
    let (mobile_tx, _mobile_rx) = outbox();

    registry
        .register_desktop(SESSION, USER, SessionMode::Login, true, desktop_tx)
        .await
        .unwrap();
    let mobile_id = registry
        .register_mobile(SESSION, USER, "c", mobile_tx)
        .await
        .unwrap();
    registry
        .submit_auth_result(SESSION, serde_json::json!({}))
        .await
        .unwrap();
    registry.disconnect(mobile_id).await;
    let _ = registry.request_location(SESSION).await;

    // Old id: rejected for both roles.
    let (stale_tx, _stale_rx) = outbox();
    assert!(matches!(
        registry
            .register_mobile(SESSION, USER, "c2", stale_tx)
            .await,
        Err(RelayError::SessionNotFound { .. })
    ));

    // Fresh id: full flow works again.
    let (desktop2_tx, mut desktop2_rx) = outbox();
    let (mobile2_tx, _mobile2_rx) = outbox();
    registry
        .register_desktop("S2", USER, SessionMode::Login, true, desktop2_tx)
        .await
        .unwrap();
    registry
        .register_mobile("S2", USER, "c3", mobile2_tx)
        .await
        .unwrap();
    assert_eq!(
        desktop2_rx.recv().await.unwrap(),
        RelayToClientMsg::MobileConnected
    );
}

#[tokio::test]
async fn sessions_progress_independently() {
    // Operations on distinct sessions do not serialize against each other;
    // interleaving two flows keeps both consistent.
    let (registry, _facts) = registry_with_radius(100.0);

    for sid in ["A1", "A2"] {
        let (desktop_tx, _desktop_rx) = outbox();
        let (mobile_tx, _mobile_rx) = outbox();
        registry
            .register_desktop(sid, USER, SessionMode::Login, true, desktop_tx)
            .await
            .unwrap();
        registry
            .register_mobile(sid, USER, "c", mobile_tx)
            .await
            .unwrap();
    }

    registry
        .submit_auth_result("A1", serde_json::json!({}))
        .await
        .unwrap();

    assert_eq!(
        registry.session_state("A1").await,
        Some(SessionState::AuthConfirmed)
    );
    assert_eq!(
        registry.session_state("A2").await,
        Some(SessionState::MobilePaired)
    );
}
