//! Desktop location source.
//!
//! The desktop's post-login re-verification needs a location read on the same
//! device. In a browser deployment this seam is fed by the page's geolocation
//! API; the [`FixedLocationProvider`] here serves headless runs and tests
//! with a configured coordinate.

use std::time::Duration;

use labgate_core::{unix_millis, LocationError, LocationProvider, LocationSample};

/// Always reports the configured coordinate with the configured accuracy.
pub struct FixedLocationProvider {
    latitude: f64,
    longitude: f64,
    accuracy_meters: f64,
}

impl FixedLocationProvider {
    /// # Errors
    ///
    /// Returns [`LocationError::Unavailable`] if the coordinate is outside
    /// the valid domain.
    pub fn new(latitude: f64, longitude: f64, accuracy_meters: f64) -> Result<Self, LocationError> {
        // Validate once up front so capture() can't fail on bad config.
        LocationSample::new(latitude, longitude, accuracy_meters, 0)
            .map_err(|_| LocationError::Unavailable)?;
        Ok(Self {
            latitude,
            longitude,
            accuracy_meters,
        })
    }
}

impl LocationProvider for FixedLocationProvider {
    fn capture(&self, _timeout: Duration) -> Result<LocationSample, LocationError> {
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
