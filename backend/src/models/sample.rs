//! Water-quality samples and geographic positions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::api::SampleId;

/// Mean Earth radius used for great-circle distances.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// A position in signed decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Great-circle (haversine) distance to `other` in kilometres.
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let dlat = (other.latitude - self.latitude).to_radians();
        let dlon = (other.longitude - self.longitude).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_KM * c
    }
}

/// One validated water-quality observation.
///
/// Concentrations are in mg/L and keyed by metal name. Every metal declared
/// by the parameter set is present; blank cells were defaulted to `0.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub id: SampleId,
    pub latitude: f64,
    pub longitude: f64,
    pub date: DateTime<Utc>,
    pub metal_concentrations: BTreeMap<String, f64>,
}

impl Sample {
    pub fn location(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }

    /// Concentration for `metal`, if the sample declares it.
    pub fn concentration(&self, metal: &str) -> Option<f64> {
        self.metal_concentrations.get(metal).copied()
    }
}

/// Request body for scoring a single sample.
///
/// Metal concentrations are given as top-level keys next to the coordinates,
/// e.g. `{"latitude": 12.9, "longitude": 77.5, "lead": 0.02}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SampleInput {
    #[serde(default)]
    pub id: Option<SampleId>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(flatten)]
    pub metals: BTreeMap<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_zero() {
        let p = GeoPoint::new(12.97, 77.59);
        assert!(p.distance_km(&p) < 1e-9);
    }

    #[test]
    fn test_distance_known_pair() {
        // Bengaluru to Chennai is roughly 290 km as the crow flies.
        let blr = GeoPoint::new(12.9716, 77.5946);
        let maa = GeoPoint::new(13.0827, 80.2707);
        let d = blr.distance_km(&maa);
        assert!(d > 280.0 && d < 300.0, "distance was {}", d);
    }

    #[test]
    fn test_distance_symmetric() {
        let a = GeoPoint::new(-33.86, 151.21);
        let b = GeoPoint::new(51.51, -0.13);
        assert!((a.distance_km(&b) - b.distance_km(&a)).abs() < 1e-6);
    }

    #[test]
    fn test_sample_input_collects_metals() {
        let input: SampleInput = serde_json::from_str(
            r#"{"latitude": 10.5, "longitude": 20.25, "lead": 0.5, "arsenic": 1.5}"#,
        )
        .unwrap();
        assert_eq!(input.latitude, Some(10.5));
        assert_eq!(input.longitude, Some(20.25));
        assert_eq!(input.metals.len(), 2);
        assert_eq!(input.metals["lead"].as_f64(), Some(0.5));
    }

    #[test]
    fn test_sample_concentration_lookup() {
        let mut metals = BTreeMap::new();
        metals.insert("lead".to_string(), 3.0);
        let sample = Sample {
            id: SampleId::new(),
            latitude: 1.0,
            longitude: 2.0,
            date: Utc::now(),
            metal_concentrations: metals,
        };
        assert_eq!(sample.concentration("lead"), Some(3.0));
        assert_eq!(sample.concentration("zinc"), None);
        assert_eq!(sample.location(), GeoPoint::new(1.0, 2.0));
    }
}
