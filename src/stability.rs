/*!
 * Network stability: how many enrollment rows of a network have terminated
 *
 * Every row counts once, historical and current alike. A row is terminated
 * when its termination timestamp is present and not after the reference time.
 */

use serde::{Deserialize, Serialize};

use crate::analytics::Analytics;
use crate::data_types::NetworkId;
use crate::geo::{normalize_county, round_to};
use crate::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminatedAnalysis {
    pub network_id: NetworkId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub county: Option<String>,
    pub term_network_count: usize,
    pub service_location_count: usize,
    /// 0 to 100, one decimal
    pub percentage_terminated: f64,
}

/// `terminated / total * 100` rounded to one decimal, or 0.0 for an empty total
pub fn percentage_terminated(terminated: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round_to(terminated as f64 / total as f64 * 100.0, 1)
}

pub(crate) fn terminated_analysis(
    analytics: &Analytics<'_>,
    network: NetworkId,
    county: Option<&str>,
) -> Result<TerminatedAnalysis> {
    let snapshot = analytics.snapshot();
    let as_of = analytics.reference_time();
    let scope = match county {
        Some(name) => Some(snapshot.require_county(name)?),
        None => None,
    };
    let scope_key = scope.map(normalize_county);
    tracing::debug!(%network, county = ?scope, %as_of, "terminated analysis");

    let mut service_location_count = 0;
    let mut term_network_count = 0;
    for row in snapshot.enrollments_for(network) {
        analytics.check_cancelled("terminated analysis")?;
        if let Some(key) = &scope_key {
            let in_scope = snapshot
                .provider(&row.provider_id)
                .map_or(false, |p| normalize_county(&p.county) == *key);
            if !in_scope {
                continue;
            }
        }
        service_location_count += 1;
        if row.is_terminated_by(as_of) {
            term_network_count += 1;
        }
    }

    Ok(TerminatedAnalysis {
        network_id: network,
        county: scope.map(str::to_string),
        term_network_count,
        service_location_count,
        percentage_terminated: percentage_terminated(term_network_count, service_location_count),
    })
}
