/*!
 * County aggregation: provider counts, claims pass-through and density class
 */

use std::collections::BTreeMap;
use std::fmt;

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::analytics::Analytics;
use crate::constants::{EARTH_RADIUS_MILES, HIGH_DENSITY_MIN, LOW_DENSITY_MIN, MEDIUM_DENSITY_MIN};
use crate::data_types::CountyRecord;
use crate::geo::{round_to, GeoPoint};
use crate::Result;

/// Provider density classification of a county
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DensityClass {
    Critical,
    Low,
    Medium,
    High,
}

impl DensityClass {
    /// `>=400` High, `100..400` Medium, `50..100` Low, otherwise Critical
    pub fn from_provider_count(count: usize) -> Self {
        if count >= HIGH_DENSITY_MIN {
            DensityClass::High
        } else if count >= MEDIUM_DENSITY_MIN {
            DensityClass::Medium
        } else if count >= LOW_DENSITY_MIN {
            DensityClass::Low
        } else {
            DensityClass::Critical
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DensityClass::Critical => "Critical",
            DensityClass::Low => "Low",
            DensityClass::Medium => "Medium",
            DensityClass::High => "High",
        }
    }
}

impl fmt::Display for DensityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How [`CountyMetrics::provider_spacing_miles`] was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpacingBasis {
    /// Mean distance from each active provider to its nearest active neighbour
    NearestNeighbour,
    /// `sqrt(area / providers)`, used when fewer than two providers can be paired
    CountyArea,
}

impl SpacingBasis {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpacingBasis::NearestNeighbour => "nearest_neighbour",
            SpacingBasis::CountyArea => "county_area",
        }
    }
}

/// Per-county projection recomputed from a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountyMetrics {
    pub county: String,
    pub provider_count: usize,
    /// 0 when the claims feed has no row for the county
    pub claims_count: u64,
    pub avg_claim_amount: Option<f64>,
    /// Whether the claims feed reported this county
    pub claims_reported: bool,
    pub density: DensityClass,
    /// `None` when the county has no active providers
    pub claims_per_provider: Option<u64>,
    /// Land area from the county area table
    pub area_sq_miles: Option<f64>,
    /// Active providers per square mile, 2 decimals
    pub providers_per_sq_mile: Option<f64>,
    /// Typical distance between active providers, 2 decimals
    pub provider_spacing_miles: Option<f64>,
    pub spacing_basis: Option<SpacingBasis>,
}

impl CountyMetrics {
    pub fn new(county: impl Into<String>, provider_count: usize, record: Option<&CountyRecord>) -> Self {
        let claims_reported = record.map_or(false, |r| r.claims_count.is_some());
        let claims_count = record.and_then(|r| r.claims_count).unwrap_or(0);
        let claims_per_provider = if provider_count > 0 {
            Some((claims_count as f64 / provider_count as f64).round() as u64)
        } else {
            None
        };

        Self {
            county: county.into(),
            provider_count,
            claims_count,
            avg_claim_amount: record.and_then(|r| r.avg_claim_amount),
            claims_reported,
            density: DensityClass::from_provider_count(provider_count),
            claims_per_provider,
            area_sq_miles: None,
            providers_per_sq_mile: None,
            provider_spacing_miles: None,
            spacing_basis: None,
        }
    }

    /// Attach the county area and derive the per-square-mile density
    pub fn with_area(mut self, area_sq_miles: Option<f64>) -> Self {
        self.area_sq_miles = area_sq_miles;
        self.providers_per_sq_mile = area_sq_miles.map(|area| round_to(self.provider_count as f64 / area, 2));
        self
    }

    /// Nearest-neighbour spacing when measured, otherwise the area estimate
    pub fn with_provider_spacing(mut self, nearest_neighbour_miles: Option<f64>) -> Self {
        let area_estimate = match (self.area_sq_miles, self.provider_count) {
            (Some(area), n) if n > 0 => Some(round_to((area / n as f64).sqrt(), 2)),
            _ => None,
        };
        (self.provider_spacing_miles, self.spacing_basis) = match (nearest_neighbour_miles, area_estimate) {
            (Some(miles), _) => (Some(miles), Some(SpacingBasis::NearestNeighbour)),
            (None, Some(miles)) => (Some(miles), Some(SpacingBasis::CountyArea)),
            (None, None) => (None, None),
        };
        self
    }

    /// Whether the county lacks claims data or active providers
    pub fn is_missing_data(&self) -> bool {
        !self.claims_reported || self.provider_count == 0
    }
}

/// Aggregate every county, or only `county_filter` (`NotFound` if unknown)
pub fn aggregate(analytics: &Analytics<'_>, county_filter: Option<&str>) -> Result<BTreeMap<String, CountyMetrics>> {
    let snapshot = analytics.snapshot();
    let counties: Vec<&str> = match county_filter {
        Some(county) => vec![snapshot.require_county(county)?],
        None => snapshot.county_names().collect(),
    };
    tracing::debug!(
        counties = counties.len(),
        as_of = %analytics.reference_time(),
        "aggregating county metrics"
    );

    #[cfg(feature = "parallel")]
    let rows: Vec<CountyMetrics> = counties
        .par_iter()
        .map(|county| county_metrics(analytics, county))
        .collect::<Result<_>>()?;

    #[cfg(not(feature = "parallel"))]
    let rows: Vec<CountyMetrics> = counties
        .iter()
        .map(|county| county_metrics(analytics, county))
        .collect::<Result<_>>()?;

    Ok(rows.into_iter().map(|m| (m.county.clone(), m)).collect())
}

/// Metrics for one county, named by its canonical display name, including provider spacing
pub(crate) fn county_metrics(analytics: &Analytics<'_>, county: &str) -> Result<CountyMetrics> {
    let active = active_locations(analytics, county)?;
    let nearest = sweep_nearest_neighbour(&active, || analytics.check_cancelled("provider spacing"))?;
    Ok(base_metrics(analytics, county, active.len()).with_provider_spacing(nearest))
}

/// Counts, claims and area density only; what the recommendation rules read
pub(crate) fn county_totals(analytics: &Analytics<'_>, county: &str) -> Result<CountyMetrics> {
    let snapshot = analytics.snapshot();
    let mut active = 0usize;
    for &position in snapshot.county_provider_positions(county) {
        analytics.check_cancelled("county aggregation")?;
        if analytics.is_position_active(position) {
            active += 1;
        }
    }
    Ok(base_metrics(analytics, county, active))
}

fn base_metrics(analytics: &Analytics<'_>, county: &str, active: usize) -> CountyMetrics {
    let snapshot = analytics.snapshot();
    CountyMetrics::new(county, active, snapshot.county_record(county)).with_area(snapshot.county_area(county))
}

fn active_locations(analytics: &Analytics<'_>, county: &str) -> Result<Vec<GeoPoint>> {
    let snapshot = analytics.snapshot();
    let positions = snapshot.county_provider_positions(county);
    let mut active = Vec::with_capacity(positions.len());
    for &position in positions {
        analytics.check_cancelled("county aggregation")?;
        if analytics.is_position_active(position) {
            active.push(snapshot.provider_at(position).location());
        }
    }
    Ok(active)
}

/// Mean nearest-neighbour distance, rounded to 2 decimals; `None` below two points
pub fn mean_nearest_neighbour_miles(points: &[GeoPoint]) -> Option<f64> {
    sweep_nearest_neighbour(points, || Ok(())).ok().flatten()
}

/// Latitude-sorted sweep. The great-circle distance is never shorter than the
/// meridian distance, so the scan in each direction stops once the latitude gap
/// alone exceeds the best candidate.
fn sweep_nearest_neighbour<F>(points: &[GeoPoint], mut checkpoint: F) -> Result<Option<f64>>
where
    F: FnMut() -> Result<()>,
{
    if points.len() < 2 {
        return Ok(None);
    }
    let mut sorted = points.to_vec();
    sorted.sort_by(|a, b| a.latitude.total_cmp(&b.latitude));
    let latitude_gap = |a: &GeoPoint, b: &GeoPoint| (b.latitude - a.latitude).abs().to_radians() * EARTH_RADIUS_MILES;

    let mut total = 0.0;
    for (i, p) in sorted.iter().enumerate() {
        checkpoint()?;
        let mut best = f64::INFINITY;
        for q in &sorted[i + 1..] {
            if latitude_gap(p, q) > best {
                break;
            }
            best = best.min(p.distance_miles(q));
        }
        for q in sorted[..i].iter().rev() {
            if latitude_gap(p, q) > best {
                break;
            }
            best = best.min(p.distance_miles(q));
        }
        total += best;
    }
    Ok(Some(round_to(total / sorted.len() as f64, 2)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_density_boundaries() {
        assert_eq!(DensityClass::from_provider_count(0), DensityClass::Critical);
        assert_eq!(DensityClass::from_provider_count(49), DensityClass::Critical);
        assert_eq!(DensityClass::from_provider_count(50), DensityClass::Low);
        assert_eq!(DensityClass::from_provider_count(99), DensityClass::Low);
        assert_eq!(DensityClass::from_provider_count(100), DensityClass::Medium);
        assert_eq!(DensityClass::from_provider_count(399), DensityClass::Medium);
        assert_eq!(DensityClass::from_provider_count(400), DensityClass::High);
    }

    #[test]
    fn test_claims_pass_through() {
        let record = CountyRecord::named("Sedgwick").with_claims(1000, 212.5);
        let metrics = CountyMetrics::new("Sedgwick", 25, Some(&record));
        assert_eq!(metrics.claims_count, 1000);
        assert_eq!(metrics.avg_claim_amount, Some(212.5));
        assert_eq!(metrics.claims_per_provider, Some(40));
        assert!(metrics.claims_reported);
        assert_eq!(metrics.density, DensityClass::Critical);
    }

    #[test]
    fn test_absent_claims() {
        let metrics = CountyMetrics::new("Greeley", 0, None);
        assert_eq!(metrics.claims_count, 0);
        assert_eq!(metrics.avg_claim_amount, None);
        assert_eq!(metrics.claims_per_provider, None);
        assert!(metrics.is_missing_data());

        let no_claims_row = CountyRecord::named("Greeley");
        let metrics = CountyMetrics::new("Greeley", 3, Some(&no_claims_row));
        assert!(!metrics.claims_reported);
        assert_eq!(metrics.claims_per_provider, Some(0));
    }

    #[test]
    fn test_claims_per_provider_rounds() {
        let record = CountyRecord::named("Butler").with_claims(1000, 100.0);
        assert_eq!(CountyMetrics::new("Butler", 3, Some(&record)).claims_per_provider, Some(333));
        let record = CountyRecord::named("Butler").with_claims(5, 100.0);
        assert_eq!(CountyMetrics::new("Butler", 2, Some(&record)).claims_per_provider, Some(3));
    }

    #[test]
    fn test_area_density_and_spacing_fallback() {
        let record = CountyRecord::named("Greeley").with_claims(40, 90.0);
        let one = CountyMetrics::new("Greeley", 1, Some(&record))
            .with_area(Some(778.0))
            .with_provider_spacing(None);
        assert_eq!(one.providers_per_sq_mile, Some(0.0));
        assert_eq!(one.provider_spacing_miles, Some(27.89));
        assert_eq!(one.spacing_basis, Some(SpacingBasis::CountyArea));

        let measured = CountyMetrics::new("Greeley", 2, Some(&record))
            .with_area(Some(778.0))
            .with_provider_spacing(Some(3.5));
        assert_eq!(measured.provider_spacing_miles, Some(3.5));
        assert_eq!(measured.spacing_basis, Some(SpacingBasis::NearestNeighbour));

        let dense = CountyMetrics::new("Wyandotte", 450, None).with_area(Some(156.0));
        assert_eq!(dense.providers_per_sq_mile, Some(2.88));

        let empty = CountyMetrics::new("Wallace", 0, None)
            .with_area(Some(914.0))
            .with_provider_spacing(None);
        assert_eq!(empty.provider_spacing_miles, None);
        assert_eq!(empty.spacing_basis, None);
    }

    fn brute_force(points: &[GeoPoint]) -> f64 {
        let total: f64 = points
            .iter()
            .enumerate()
            .map(|(i, p)| {
                points
                    .iter()
                    .enumerate()
                    .filter(|&(j, _)| j != i)
                    .map(|(_, q)| p.distance_miles(q))
                    .fold(f64::INFINITY, f64::min)
            })
            .sum();
        round_to(total / points.len() as f64, 2)
    }

    #[test]
    fn test_sweep_matches_all_pairs() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(7);
        for size in [2usize, 3, 17, 250] {
            let points: Vec<GeoPoint> = (0..size)
                .map(|_| GeoPoint::new(rng.gen_range(37.0..39.5), rng.gen_range(-101.0..-94.6)))
                .collect();
            let swept = mean_nearest_neighbour_miles(&points).unwrap();
            assert!((swept - brute_force(&points)).abs() < 0.011, "size {}", size);
        }

        // One shared latitude defeats the early break
        let row: Vec<GeoPoint> = (0..40).map(|i| GeoPoint::new(38.0, -99.0 + (i * 7 % 40) as f64 * 0.01)).collect();
        assert_eq!(mean_nearest_neighbour_miles(&row), Some(brute_force(&row)));
    }

    #[test]
    fn test_spacing_sweep_is_cancellable() {
        let points = vec![GeoPoint::new(37.0, -97.0), GeoPoint::new(37.1, -97.0)];
        let mut calls = 0;
        let result = sweep_nearest_neighbour(&points, || {
            calls += 1;
            Err(crate::NetworkError::Cancelled {
                operation: "provider spacing".to_string(),
            })
        });
        assert!(matches!(result, Err(crate::NetworkError::Cancelled { .. })));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_nearest_neighbour_spacing() {
        assert_eq!(mean_nearest_neighbour_miles(&[GeoPoint::new(37.0, -97.0)]), None);
        let a = GeoPoint::new(37.0, -97.0);
        let b = GeoPoint::new(37.0, -97.0);
        assert_eq!(mean_nearest_neighbour_miles(&[a, b]), Some(0.0));

        let c = GeoPoint::new(38.0, -97.0);
        let spacing = mean_nearest_neighbour_miles(&[a, c]).unwrap();
        // one degree of latitude, roughly 69 miles
        assert!((spacing - 69.1).abs() < 0.5, "got {}", spacing);
    }
}
