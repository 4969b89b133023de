//! Per-account location throttle cache.
//!
//! The geofence verifier sits behind a rate-limited external registry, so
//! re-verifying on every location sample is wasteful when the device has not
//! materially moved. The rule: a fresh check runs only when no prior entry
//! exists for the account or the device moved at least
//! [`REVERIFY_THRESHOLD_METERS`] from the last verified sample. Below the
//! threshold the caller must reuse the cached decision verbatim — the
//! decision is skipped, not just the call, even if the account's geofence
//! configuration changed in the interim. That staleness window closes on the
//! next qualifying movement or on [`LocationThrottleCache::clear`] at
//! logout.

use std::collections::HashMap;

use tracing::trace;

use crate::domain::geo::{distance_meters, LocationSample};
use crate::domain::geofence::GeofenceDecision;

/// Movement below this many meters reuses the cached decision.
pub const REVERIFY_THRESHOLD_METERS: f64 = 15.0;

/// Cached verification state for one account.
#[derive(Debug, Clone)]
struct ThrottleEntry {
    last_sample: LocationSample,
    last_decision: GeofenceDecision,
}

/// In-memory last-verified-location store, keyed by account identifier.
///
/// Entries are created on the first recorded decision, overwritten on every
/// subsequent one, and removed only by [`clear`](Self::clear).
#[derive(Default)]
pub struct LocationThrottleCache {
    entries: HashMap<String, ThrottleEntry>,
}

impl LocationThrottleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a fresh geofence check is required for this sample.
    ///
    /// `true` if the account has no cached entry or the new sample is at
    /// least [`REVERIFY_THRESHOLD_METERS`] from the last verified one.
    pub fn should_reverify(&self, account: &str, sample: &LocationSample) -> bool {
        match self.entries.get(account) {
            None => true,
            Some(entry) => {
                let moved =
                    distance_meters(&entry.last_sample.coordinate(), &sample.coordinate());
                trace!(account, moved_meters = moved, "throttle check");
                moved >= REVERIFY_THRESHOLD_METERS
            }
        }
    }

    /// Unconditionally overwrites the account's entry with a fresh decision.
    pub fn record_decision(
        &mut self,
        account: &str,
        sample: LocationSample,
        decision: GeofenceDecision,
    ) {
        self.entries.insert(
            account.to_string(),
            ThrottleEntry {
                last_sample: sample,
                last_decision: decision,
            },
        );
    }

    /// The cached decision to reuse when [`should_reverify`](Self::should_reverify)
    /// returns `false`.
    pub fn last_decision(&self, account: &str) -> Option<GeofenceDecision> {
        self.entries.get(account).map(|e| e.last_decision)
    }

    /// Drops the account's entry. Called on logout; the cached decision is
    /// logically stale from that point.
    pub fn clear(&mut self, account: &str) {
        self.entries.remove(account);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
