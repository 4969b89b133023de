//! Device geolocation stand-in.
//!
//! On a phone this seam is the platform positioning service (high-accuracy
//! GPS read with a bounded timeout). [`DeviceLocation`] covers headless runs
//! and tests: it reports a configured coordinate, optionally simulating a
//! denied permission so operator flows can be exercised end to end.

use std::time::Duration;

use labgate_core::{unix_millis, LocationError, LocationProvider, LocationSample};

/// Reports a configured coordinate, or a scripted failure.
pub struct DeviceLocation {
    latitude: f64,
    longitude: f64,
    accuracy_meters: f64,
    deny_permission: bool,
}

impl DeviceLocation {
    /// # Errors
    ///
    /// Returns [`LocationError::Unavailable`] for a coordinate outside the
    /// valid domain.
    pub fn new(latitude: f64, longitude: f64, accuracy_meters: f64) -> Result<Self, LocationError> {
        LocationSample::new(latitude, longitude, accuracy_meters, 0)
            .map_err(|_| LocationError::Unavailable)?;
        Ok(Self {
            latitude,
            longitude,
            accuracy_meters,
            deny_permission: false,
        })
    }

    /// Simulates the user denying the location permission.
    pub fn denying_permission(mut self) -> Self {
        self.deny_permission = true;
        self
    }
}

impl LocationProvider for DeviceLocation {
    fn capture(&self, _timeout: Duration) -> Result<LocationSample, LocationError> {
        if self.deny_permission {
            return Err(LocationError::PermissionDenied);
        }
        LocationSample::new(
            self.latitude,
            self.longitude,
            self.accuracy_meters,
            unix_millis(),
        )
        .map_err(|_| LocationError::Unavailable)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
