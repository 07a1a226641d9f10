/*!
 * Geodesic helpers: coordinates, haversine distance, and the county centroid table
 */

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::constants::EARTH_RADIUS_MILES;
use crate::data_types::CountyCentroid;
use crate::{NetworkError, Result};

/// A latitude/longitude pair in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Whether both components are finite and inside their valid ranges
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Great-circle distance in miles
    pub fn distance_miles(&self, other: &GeoPoint) -> f64 {
        haversine_miles(*self, *other)
    }
}

/// Haversine great-circle distance in miles
pub fn haversine_miles(from: GeoPoint, to: GeoPoint) -> f64 {
    let lat1 = from.latitude.to_radians();
    let lat2 = to.latitude.to_radians();
    let dlat = (to.latitude - from.latitude).to_radians();
    let dlon = (to.longitude - from.longitude).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    // Clamp guards against a drifting slightly above 1.0 for antipodal points
    let c = 2.0 * a.sqrt().min(1.0).asin();
    EARTH_RADIUS_MILES * c
}

/// Round to `places` decimal places, half away from zero
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Static county name to centroid lookup. Names match case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct CentroidTable {
    entries: HashMap<String, GeoPoint>,
}

impl CentroidTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: &[CountyCentroid]) -> Result<Self> {
        let mut table = Self::new();
        for row in rows {
            table.insert(&row.county, GeoPoint::new(row.latitude, row.longitude))?;
        }
        Ok(table)
    }

    /// Insert or replace a centroid; invalid coordinates are a data integrity error
    pub fn insert(&mut self, county: &str, point: GeoPoint) -> Result<()> {
        if !point.is_valid() {
            return Err(NetworkError::data_integrity(
                format!(
                    "invalid centroid ({}, {}) for county '{}'",
                    point.latitude, point.longitude, county
                ),
                "centroid",
                Some(county),
            ));
        }
        self.entries.insert(normalize_county(county), point);
        Ok(())
    }

    pub fn get(&self, county: &str) -> Option<GeoPoint> {
        self.entries.get(&normalize_county(county)).copied()
    }

    /// Resolve a county or fail with `InvalidArgument` naming the parameter
    pub fn resolve(&self, county: &str) -> Result<GeoPoint> {
        self.get(county).ok_or_else(|| NetworkError::InvalidArgument {
            parameter: "county".to_string(),
            message: format!("no centroid known for county '{}'", county),
            suggestion: Some("Add the county to county_centroids.csv or the claims feed".to_string()),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Canonical lookup key for a county name
pub(crate) fn normalize_county(county: &str) -> String {
    county.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_known_distance() {
        // Wichita to Topeka, roughly 130 miles
        let wichita = GeoPoint::new(37.6872, -97.3301);
        let topeka = GeoPoint::new(39.0473, -95.6752);
        let d = haversine_miles(wichita, topeka);
        assert!((d - 130.0).abs() < 5.0, "got {}", d);
        assert_eq!(haversine_miles(wichita, wichita), 0.0);
        assert!((haversine_miles(wichita, topeka) - haversine_miles(topeka, wichita)).abs() < 1e-9);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(62.5, 1), 62.5);
        assert_eq!(round_to(33.333333, 1), 33.3);
        assert_eq!(round_to(12.345678, 2), 12.35);
    }

    #[test]
    fn test_centroid_lookup_is_case_insensitive() {
        let mut table = CentroidTable::new();
        table.insert("Sedgwick", GeoPoint::new(37.68, -97.46)).unwrap();
        assert!(table.get("sedgwick").is_some());
        assert!(table.resolve(" SEDGWICK ").is_ok());
        assert!(table.resolve("Atlantis").is_err());
        assert!(table.insert("Bad", GeoPoint::new(91.0, 0.0)).is_err());
    }
}
