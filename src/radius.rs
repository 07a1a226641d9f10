/*!
 * Radius search around a county centroid
 *
 * Hits are ordered by unrounded distance and then provider id. The reported
 * distance is rounded to two decimals, but inclusion and ordering use the
 * exact value, so growing the radius only ever appends hits.
 */

use std::cmp::Ordering;

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::Serialize;

use crate::analytics::Analytics;
use crate::data_types::{NetworkId, Provider};
use crate::geo::{haversine_miles, round_to, GeoPoint};
use crate::{NetworkError, Result};

/// One provider within the search radius
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RadiusHit<'a> {
    pub provider: &'a Provider,
    /// Rounded to 2 decimals
    pub distance_miles: f64,
}

/// Reject radii that are not finite and strictly positive
pub fn validate_radius(radius_miles: f64) -> Result<f64> {
    if !radius_miles.is_finite() || radius_miles <= 0.0 {
        return Err(NetworkError::InvalidArgument {
            parameter: "radius".to_string(),
            message: format!("radius must be a positive number of miles, got {}", radius_miles),
            suggestion: Some("Use a radius such as 25".to_string()),
        });
    }
    Ok(radius_miles)
}

pub(crate) fn radius_search<'a>(
    analytics: &Analytics<'a>,
    county: &str,
    radius_miles: f64,
    network: NetworkId,
) -> Result<Vec<RadiusHit<'a>>> {
    let radius_miles = validate_radius(radius_miles)?;
    let snapshot = analytics.snapshot();
    let origin = snapshot.centroids().resolve(county)?;
    tracing::debug!(county, radius_miles, %network, "radius search");

    let evaluate = |position: usize| -> Result<Option<(f64, usize)>> {
        analytics.check_cancelled("radius search")?;
        if !analytics.is_position_in_network(position, network) {
            return Ok(None);
        }
        let distance = distance_to(origin, snapshot.provider_at(position));
        Ok((distance <= radius_miles).then_some((distance, position)))
    };

    #[cfg(feature = "parallel")]
    let found: Vec<Option<(f64, usize)>> = (0..snapshot.len())
        .into_par_iter()
        .map(evaluate)
        .collect::<Result<_>>()?;

    #[cfg(not(feature = "parallel"))]
    let found: Vec<Option<(f64, usize)>> = (0..snapshot.len()).map(evaluate).collect::<Result<_>>()?;

    let mut hits: Vec<(f64, usize)> = found.into_iter().flatten().collect();
    hits.sort_by(|a, b| compare_hits(snapshot.provider_at(a.1), a.0, snapshot.provider_at(b.1), b.0));

    Ok(hits
        .into_iter()
        .map(|(distance, position)| RadiusHit {
            provider: snapshot.provider_at(position),
            distance_miles: round_to(distance, 2),
        })
        .collect())
}

fn distance_to(origin: GeoPoint, provider: &Provider) -> f64 {
    haversine_miles(origin, provider.location())
}

fn compare_hits(a: &Provider, a_distance: f64, b: &Provider, b_distance: f64) -> Ordering {
    a_distance
        .total_cmp(&b_distance)
        .then_with(|| a.provider_id.cmp(&b.provider_id))
}
