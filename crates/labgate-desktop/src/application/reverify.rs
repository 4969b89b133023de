//! Continuous post-login re-verification.
//!
//! While a desktop session is admitted, the loop periodically resamples
//! location and re-checks the geofence — but only when the device has
//! materially moved: the 15 m throttle cache decides whether the verifier
//! runs at all, and under the threshold the previous decision is reused
//! verbatim.
//!
//! No relay pairing is involved post-login; this is a same-device check
//! against the geofence registry. Two failure rules matter:
//!
//! - Overlapping runs for the same account are suppressed — at most one
//!   check in flight at a time.
//! - A failed capture or verifier call preserves the prior admitted state.
//!   Failing to verify is not evidence of leaving the geofence; only a fresh
//!   out-of-radius decision evicts the operator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::time::interval;
use tracing::{debug, info, warn};

use labgate_core::{
    GeofenceDecision, GeofenceRegistry, LocationProvider, LocationThrottleCache,
};

/// Re-verification timing.
#[derive(Debug, Clone, Copy)]
pub struct ReverifyConfig {
    /// Resampling cadence.
    pub interval: Duration,
    /// Bound on each device location read.
    pub capture_timeout: Duration,
}

impl Default for ReverifyConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            capture_timeout: Duration::from_secs(15),
        }
    }
}

/// What one check produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReverifyOutcome {
    /// A fresh verifier decision was recorded.
    Fresh(GeofenceDecision),
    /// Movement was under the threshold; the cached decision was reused
    /// without a verifier call.
    Reused(GeofenceDecision),
    /// Capture or verifier failure; the prior admitted state is preserved.
    Degraded,
    /// Another check for this account was already in flight.
    Suppressed,
}

/// Events pushed to the owning session. On [`ReverifyEvent::LeftGeofence`]
/// the caller is expected to terminate the active session.
#[derive(Debug, Clone, PartialEq)]
pub enum ReverifyEvent {
    Verified {
        decision: GeofenceDecision,
        reused: bool,
    },
    LeftGeofence {
        decision: GeofenceDecision,
    },
    Degraded {
        reason: String,
    },
}

/// The per-account re-verification loop.
pub struct ReverifyLoop {
    account: String,
    config: ReverifyConfig,
    location: Arc<dyn LocationProvider>,
    geofences: Arc<dyn GeofenceRegistry>,
    cache: Mutex<LocationThrottleCache>,
    /// Overlap suppression: locked for the duration of one check.
    gate: Mutex<()>,
}

impl ReverifyLoop {
    pub fn new(
        account: impl Into<String>,
        config: ReverifyConfig,
        location: Arc<dyn LocationProvider>,
        geofences: Arc<dyn GeofenceRegistry>,
    ) -> Self {
        Self {
            account: account.into(),
            config,
            location,
            geofences,
            cache: Mutex::new(LocationThrottleCache::new()),
            gate: Mutex::new(()),
        }
    }

    /// Runs one check: capture, throttle decision, verify-or-reuse.
    pub async fn check_once(&self) -> ReverifyOutcome {
        // At most one check in flight per account.
        let Ok(_guard) = self.gate.try_lock() else {
            debug!(account = %self.account, "re-verification already in flight; skipping");
            return ReverifyOutcome::Suppressed;
        };

        let location = Arc::clone(&self.location);
        let timeout = self.config.capture_timeout;
        let capture = tokio::task::spawn_blocking(move || location.capture(timeout)).await;

        let sample = match capture {
            Ok(Ok(sample)) => sample,
            Ok(Err(e)) => {
                warn!(account = %self.account, error = %e, "location capture failed; keeping prior state");
                return ReverifyOutcome::Degraded;
            }
            Err(e) => {
                warn!(account = %self.account, error = %e, "capture task failed; keeping prior state");
                return ReverifyOutcome::Degraded;
            }
        };

        let mut cache = self.cache.lock().await;
        if !cache.should_reverify(&self.account, &sample) {
            // Under the movement threshold: the cached decision stands, even
            // if the geofence configuration changed since it was recorded.
            if let Some(decision) = cache.last_decision(&self.account) {
                debug!(account = %self.account, "movement under threshold; reusing decision");
                return ReverifyOutcome::Reused(decision);
            }
        }

        let spec = match self.geofences.geofence_for(&self.account) {
            Ok(spec) => spec,
            Err(e) => {
                warn!(account = %self.account, error = %e, "verifier unavailable; keeping prior state");
                return ReverifyOutcome::Degraded;
            }
        };

        let decision = labgate_core::evaluate(&sample, &spec);
        cache.record_decision(&self.account, sample, decision);
        ReverifyOutcome::Fresh(decision)
    }

    /// Runs the loop until `running` clears, pushing events to the returned
    /// receiver.
    pub fn spawn(
        self: Arc<Self>,
        running: Arc<AtomicBool>,
    ) -> mpsc::Receiver<ReverifyEvent> {
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            let mut ticker = interval(self.config.interval);
            ticker.tick().await; // skip the immediate first tick
            while running.load(Ordering::Relaxed) {
                ticker.tick().await;
                let event = match self.check_once().await {
                    ReverifyOutcome::Fresh(decision) if !decision.within_radius => {
                        info!(
                            account = %self.account,
                            distance_meters = decision.distance_meters,
                            "left the facility geofence"
                        );
                        ReverifyEvent::LeftGeofence { decision }
                    }
                    ReverifyOutcome::Fresh(decision) => ReverifyEvent::Verified {
                        decision,
                        reused: false,
                    },
                    ReverifyOutcome::Reused(decision) => ReverifyEvent::Verified {
                        decision,
                        reused: true,
                    },
                    ReverifyOutcome::Degraded => ReverifyEvent::Degraded {
                        reason: "verification unavailable; prior state kept".to_string(),
                    },
                    ReverifyOutcome::Suppressed => continue,
                };
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });
        rx
    }

    /// Forgets the cached state (logout). The next check always verifies.
    pub async fn reset(&self) {
        self.cache.lock().await.clear(&self.account);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
