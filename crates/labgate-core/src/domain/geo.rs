//! Coordinates, location samples, and great-circle geometry.
//!
//! All distance math in LabGate goes through [`distance_meters`]: the geofence
//! verifier, the 15 m re-verification throttle, and the per-attempt
//! diagnostics shown to operators. The haversine formula with a spherical
//! Earth (R = 6 371 000 m) is accurate to well under 1% at facility-geofence
//! distances (tens of meters to a few kilometers), which is the operative
//! range here.
//!
//! Coordinate validity is enforced at construction: latitude ∈ [-90, 90],
//! longitude ∈ [-180, 180]. A [`LocationSample`] that fails validation never
//! enters the protocol — deserialization goes through the same check.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Mean Earth radius in meters, used by the haversine computation.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Errors produced by coordinate and sample validation.
#[derive(Debug, Error, PartialEq)]
pub enum GeoError {
    #[error("latitude {0} outside [-90, 90]")]
    LatitudeOutOfRange(f64),
    #[error("longitude {0} outside [-180, 180]")]
    LongitudeOutOfRange(f64),
    #[error("accuracy {0} must be a non-negative finite number of meters")]
    InvalidAccuracy(f64),
}

/// A validated WGS-84 coordinate pair.
///
/// Fields are private; construction goes through [`Coordinate::new`] so a
/// `Coordinate` in hand is always inside the valid domain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinate {
    latitude: f64,
    longitude: f64,
}

impl Coordinate {
    /// Validates and constructs a coordinate.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError::LatitudeOutOfRange`] or
    /// [`GeoError::LongitudeOutOfRange`] for values outside the WGS-84
    /// domain (NaN fails both comparisons and is rejected).
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, GeoError> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(GeoError::LatitudeOutOfRange(latitude));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(GeoError::LongitudeOutOfRange(longitude));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

/// One device location reading as reported by the mobile peer.
///
/// `accuracy_meters` is the platform-reported GPS accuracy. It is surfaced to
/// the user (see [`AccuracyGrade`]) but never gates the admission decision —
/// only distance versus radius does.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawLocationSample", rename_all = "camelCase")]
pub struct LocationSample {
    #[serde(flatten)]
    coordinate: Coordinate,
    accuracy_meters: f64,
    /// Milliseconds since the Unix epoch at capture time.
    captured_at: u64,
}

impl LocationSample {
    /// Validates and constructs a sample.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError`] if the coordinate is out of range or the accuracy
    /// is negative, NaN, or infinite.
    pub fn new(
        latitude: f64,
        longitude: f64,
        accuracy_meters: f64,
        captured_at: u64,
    ) -> Result<Self, GeoError> {
        let coordinate = Coordinate::new(latitude, longitude)?;
        if !accuracy_meters.is_finite() || accuracy_meters < 0.0 {
            return Err(GeoError::InvalidAccuracy(accuracy_meters));
        }
        Ok(Self {
            coordinate,
            accuracy_meters,
            captured_at,
        })
    }

    pub fn coordinate(&self) -> Coordinate {
        self.coordinate
    }

    pub fn accuracy_meters(&self) -> f64 {
        self.accuracy_meters
    }

    pub fn captured_at(&self) -> u64 {
        self.captured_at
    }

    /// Grades the platform-reported accuracy for user display.
    pub fn accuracy_grade(&self) -> AccuracyGrade {
        AccuracyGrade::from_meters(self.accuracy_meters)
    }
}

/// Unvalidated wire shape for [`LocationSample`]; deserialization funnels
/// through [`LocationSample::new`] so invalid samples are rejected at the
/// protocol boundary.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLocationSample {
    latitude: f64,
    longitude: f64,
    accuracy_meters: f64,
    captured_at: u64,
}

impl TryFrom<RawLocationSample> for LocationSample {
    type Error = GeoError;

    fn try_from(raw: RawLocationSample) -> Result<Self, Self::Error> {
        LocationSample::new(
            raw.latitude,
            raw.longitude,
            raw.accuracy_meters,
            raw.captured_at,
        )
    }
}

/// Qualitative GPS signal grade derived from the platform accuracy value.
///
/// Cut-offs: ≤ 5 m excellent, ≤ 15 m good, ≤ 30 m fair, poor otherwise.
/// Display-only; admission is never gated on accuracy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccuracyGrade {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl AccuracyGrade {
    pub fn from_meters(accuracy_meters: f64) -> Self {
        if accuracy_meters <= 5.0 {
            AccuracyGrade::Excellent
        } else if accuracy_meters <= 15.0 {
            AccuracyGrade::Good
        } else if accuracy_meters <= 30.0 {
            AccuracyGrade::Fair
        } else {
            AccuracyGrade::Poor
        }
    }

    /// User-facing description of the signal quality.
    pub fn description(&self) -> &'static str {
        match self {
            AccuracyGrade::Excellent => "Excellent GPS signal",
            AccuracyGrade::Good => "Good GPS signal",
            AccuracyGrade::Fair => "Fair GPS signal",
            AccuracyGrade::Poor => "Poor GPS signal - move to open area",
        }
    }
}

/// Seam to the platform geolocation service.
///
/// Implementations request a high-accuracy read and must give up after
/// `timeout`, mapping platform failures onto
/// [`LocationError`](crate::domain::error::LocationError). Reads may block;
/// async callers wrap them in a blocking task.
pub trait LocationProvider: Send + Sync {
    fn capture(
        &self,
        timeout: std::time::Duration,
    ) -> Result<LocationSample, crate::domain::error::LocationError>;
}

/// Great-circle distance between two coordinates in meters (haversine).
pub fn distance_meters(a: &Coordinate, b: &Coordinate) -> f64 {
    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    let d_phi = (b.latitude - a.latitude).to_radians();
    let d_lambda = (b.longitude - a.longitude).to_radians();

    let h = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);

    // asin of a value that can exceed 1.0 by a few ULPs for antipodal points;
    // clamp keeps the result finite.
    2.0 * EARTH_RADIUS_METERS * h.sqrt().min(1.0).asin()
}

/// Initial great-circle bearing from `a` to `b`, in degrees [0, 360).
///
/// Used only for operator diagnostics in decision logs.
pub fn bearing_degrees(a: &Coordinate, b: &Coordinate) -> f64 {
    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    let d_lambda = (b.longitude - a.longitude).to_radians();

    let y = d_lambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * d_lambda.cos();
    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

// ── Tests ─────────────────────────────────────────────────────────────────────
