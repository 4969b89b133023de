//! Geofence specification and admission evaluation.
//!
//! [`evaluate`] is the single admission decision point: distance from the
//! facility center versus the configured radius, boundary inclusive. The
//! [`GeofenceRegistry`] trait is the seam to the external configuration
//! store; [`StaticGeofenceRegistry`] is the in-memory implementation used by
//! the relay (seedable from a TOML file) and by tests.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::domain::geo::{distance_meters, Coordinate, GeoError, LocationSample};
use crate::domain::unix_millis;

/// Default facility radius in meters, applied when a registry entry omits
/// one.
pub const DEFAULT_RADIUS_METERS: f64 = 20.0;

/// Errors around geofence configuration.
#[derive(Debug, Error, PartialEq)]
pub enum GeofenceError {
    /// The account has no geofence configured. Callers must treat this as
    /// "admission denied, configuration error" — not as "outside radius".
    #[error("no geofence configured for account {0}")]
    NoGeofenceConfigured(String),

    #[error("geofence radius must be positive, got {0}")]
    InvalidRadius(f64),

    #[error("invalid geofence center: {0}")]
    InvalidCenter(#[from] GeoError),

    #[error("invalid geofence configuration: {0}")]
    InvalidConfig(String),

    /// The backing registry could not be reached. A failed lookup is not
    /// evidence of leaving the geofence; re-verification callers preserve
    /// the prior admitted state.
    #[error("geofence registry unavailable: {0}")]
    Unavailable(String),
}

/// A facility geofence: reference coordinate plus admission radius.
///
/// Owned by the registry, fetched per account, never mutated by the
/// protocol.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeofenceSpec {
    center: Coordinate,
    radius_meters: f64,
}

impl GeofenceSpec {
    /// # Errors
    ///
    /// Returns [`GeofenceError::InvalidRadius`] unless `radius_meters` is a
    /// positive finite number.
    pub fn new(center: Coordinate, radius_meters: f64) -> Result<Self, GeofenceError> {
        if !radius_meters.is_finite() || radius_meters <= 0.0 {
            return Err(GeofenceError::InvalidRadius(radius_meters));
        }
        Ok(Self {
            center,
            radius_meters,
        })
    }

    pub fn center(&self) -> Coordinate {
        self.center
    }

    pub fn radius_meters(&self) -> f64 {
        self.radius_meters
    }
}

/// The outcome of one geofence evaluation. Derived, not persisted by the
/// protocol itself.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeofenceDecision {
    pub distance_meters: f64,
    pub within_radius: bool,
    /// Milliseconds since the Unix epoch at evaluation time.
    pub evaluated_at: u64,
}

/// Evaluates a sample against a facility geofence.
///
/// The boundary is inclusive: a sample exactly on the radius is admitted.
/// Accuracy is deliberately not consulted — only distance gates admission.
pub fn evaluate(sample: &LocationSample, spec: &GeofenceSpec) -> GeofenceDecision {
    let distance = distance_meters(&sample.coordinate(), &spec.center);
    GeofenceDecision {
        distance_meters: distance,
        within_radius: distance <= spec.radius_meters,
        evaluated_at: unix_millis(),
    }
}

/// Seam to the external per-account geofence configuration store.
pub trait GeofenceRegistry: Send + Sync {
    /// Returns the geofence for an account.
    ///
    /// # Errors
    ///
    /// [`GeofenceError::NoGeofenceConfigured`] when the account has none.
    fn geofence_for(&self, account: &str) -> Result<GeofenceSpec, GeofenceError>;
}

/// In-memory geofence registry, seedable from a TOML document.
///
/// The relay loads one at startup; tests build one directly with
/// [`StaticGeofenceRegistry::insert`].
#[derive(Default)]
pub struct StaticGeofenceRegistry {
    entries: HashMap<String, GeofenceSpec>,
}

/// TOML shape for one registry entry:
///
/// ```toml
/// [[geofence]]
/// account = "admin@lab.example"
/// latitude = 52.1205
/// longitude = 11.6276
/// radius_meters = 20.0
/// ```
#[derive(Deserialize)]
struct GeofenceEntryToml {
    account: String,
    latitude: f64,
    longitude: f64,
    radius_meters: Option<f64>,
}

#[derive(Deserialize)]
struct GeofenceFileToml {
    #[serde(default)]
    geofence: Vec<GeofenceEntryToml>,
}

impl StaticGeofenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces an account's geofence.
    pub fn insert(&mut self, account: impl Into<String>, spec: GeofenceSpec) {
        self.entries.insert(account.into(), spec);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parses a TOML document into a registry. Entries without an explicit
    /// radius get [`DEFAULT_RADIUS_METERS`].
    ///
    /// # Errors
    ///
    /// Returns [`GeofenceError::InvalidConfig`] for unparseable TOML and the
    /// underlying [`GeofenceError`] for invalid coordinates or radii.
    pub fn from_toml_str(input: &str) -> Result<Self, GeofenceError> {
        let parsed: GeofenceFileToml =
            toml::from_str(input).map_err(|e| GeofenceError::InvalidConfig(e.to_string()))?;

        let mut registry = Self::new();
        for entry in parsed.geofence {
            let center = Coordinate::new(entry.latitude, entry.longitude)?;
            let radius = entry.radius_meters.unwrap_or(DEFAULT_RADIUS_METERS);
            registry.insert(entry.account, GeofenceSpec::new(center, radius)?);
        }
        debug!("loaded {} geofence entr(ies)", registry.len());
        Ok(registry)
    }
}

impl GeofenceRegistry for StaticGeofenceRegistry {
    fn geofence_for(&self, account: &str) -> Result<GeofenceSpec, GeofenceError> {
        self.entries
            .get(account)
            .copied()
            .ok_or_else(|| GeofenceError::NoGeofenceConfigured(account.to_string()))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn spec_at_origin(radius: f64) -> GeofenceSpec {
        GeofenceSpec::new(Coordinate::new(0.0, 0.0).unwrap(), radius).unwrap()
    }

    /// A sample `meters` east of the origin along the equator.
    fn sample_east_of_origin(meters: f64) -> LocationSample {
        let degrees = meters / (EARTH_RADIUS_METERS * std::f64::consts::PI / 180.0);
        LocationSample::new(0.0, degrees, 5.0, 0).unwrap()
    }

    use crate::domain::geo::EARTH_RADIUS_METERS;

    #[test]
    fn test_spec_rejects_zero_radius() {
        let center = Coordinate::new(0.0, 0.0).unwrap();
        assert_eq!(
            GeofenceSpec::new(center, 0.0),
            Err(GeofenceError::InvalidRadius(0.0))
        );
    }

    #[test]
    fn test_inside_radius_is_admitted() {
        let decision = evaluate(&sample_east_of_origin(99.0), &spec_at_origin(100.0));
        assert!(decision.within_radius);
        assert!((decision.distance_meters - 99.0).abs() < 1.0);
    }

    #[test]
    fn test_outside_radius_is_denied() {
        let decision = evaluate(&sample_east_of_origin(101.0), &spec_at_origin(100.0));
        assert!(!decision.within_radius);
    }

    #[test]
    fn test_boundary_distance_is_inclusive() {
        // Build the sample so the computed distance lands exactly on the
        // radius, then assert admission.
        let sample = sample_east_of_origin(100.0);
        let spec = spec_at_origin(100.0);
        let exact = distance_meters(&sample.coordinate(), &spec.center());
        let boundary_spec =
            GeofenceSpec::new(spec.center(), exact).unwrap();
        let decision = evaluate(&sample, &boundary_spec);
        assert!(
            decision.within_radius,
            "a sample exactly on the radius must be admitted"
        );
    }

    #[test]
    fn test_registry_returns_no_geofence_configured() {
        let registry = StaticGeofenceRegistry::new();
        let result = registry.geofence_for("nobody@lab.example");
        assert_eq!(
            result,
            Err(GeofenceError::NoGeofenceConfigured(
                "nobody@lab.example".to_string()
            ))
        );
    }

    #[test]
    fn test_registry_lookup_after_insert() {
        let mut registry = StaticGeofenceRegistry::new();
        registry.insert("admin@lab.example", spec_at_origin(20.0));
        let spec = registry.geofence_for("admin@lab.example").unwrap();
        assert_eq!(spec.radius_meters(), 20.0);
    }

    #[test]
    fn test_registry_parses_toml() {
        let toml = r#"
            [[geofence]]
            account = "admin@lab.example"
            latitude = 52.1205
            longitude = 11.6276
            radius_meters = 35.0

            [[geofence]]
            account = "second@lab.example"
            latitude = -1.0
            longitude = 30.0
        "#;
        let registry = StaticGeofenceRegistry::from_toml_str(toml).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry
                .geofence_for("admin@lab.example")
                .unwrap()
                .radius_meters(),
            35.0
        );
        // Entries without a radius get the default.
        assert_eq!(
            registry
                .geofence_for("second@lab.example")
                .unwrap()
                .radius_meters(),
            DEFAULT_RADIUS_METERS
        );
    }

    #[test]
    fn test_registry_rejects_invalid_toml_coordinates() {
        let toml = r#"
            [[geofence]]
            account = "bad@lab.example"
            latitude = 120.0
            longitude = 0.0
        "#;
        let result = StaticGeofenceRegistry::from_toml_str(toml);
        assert!(matches!(result, Err(GeofenceError::InvalidCenter(_))));
    }

    #[test]
    fn test_registry_rejects_malformed_toml() {
        let result = StaticGeofenceRegistry::from_toml_str("not = [valid");
        assert!(matches!(result, Err(GeofenceError::InvalidConfig(_))));
    }
}
