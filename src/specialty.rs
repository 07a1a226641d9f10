/*!
 * Specialty mix of the active providers in a county
 *
 * Two views over the same active-provider counts: the share of each specialty
 * among the county's active providers, and the county's density per square
 * mile measured against the specialty density standards.
 */

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::analytics::Analytics;
use crate::geo::round_to;
use crate::Result;

/// Share of one specialty among a county's active providers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpecialtyShare {
    pub count: usize,
    /// `count / active providers in the county`
    pub ratio: f64,
}

/// One specialty measured against its recommended density
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialtyGap {
    pub specialty: String,
    pub count: usize,
    /// Active providers per square mile, 4 decimals
    pub actual_density: f64,
    pub recommended_density: f64,
    /// `recommended - actual`; negative when the county exceeds the standard
    pub gap: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialtyGapReport {
    pub county: String,
    pub area_sq_miles: Option<f64>,
    /// Largest gap first; empty when the county has no area row
    pub gaps: Vec<SpecialtyGap>,
}

/// Active providers per trimmed specialty, and their total
fn active_specialty_counts(analytics: &Analytics<'_>, county: &str) -> Result<(BTreeMap<String, usize>, usize)> {
    let snapshot = analytics.snapshot();
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut active_total = 0usize;
    for &position in snapshot.county_provider_positions(county) {
        analytics.check_cancelled("specialty density")?;
        if analytics.is_position_active(position) {
            let specialty = snapshot.provider_at(position).provider_type.trim().to_string();
            *counts.entry(specialty).or_insert(0) += 1;
            active_total += 1;
        }
    }
    Ok((counts, active_total))
}

pub(crate) fn specialty_density(analytics: &Analytics<'_>, county: &str) -> Result<BTreeMap<String, SpecialtyShare>> {
    let canonical = analytics.snapshot().require_county(county)?;
    let (counts, active_total) = active_specialty_counts(analytics, canonical)?;

    Ok(counts
        .into_iter()
        .map(|(specialty, count)| {
            let ratio = if active_total == 0 {
                0.0
            } else {
                count as f64 / active_total as f64
            };
            (specialty, SpecialtyShare { count, ratio })
        })
        .collect())
}

pub(crate) fn specialty_gaps(analytics: &Analytics<'_>, county: &str) -> Result<SpecialtyGapReport> {
    let snapshot = analytics.snapshot();
    let canonical = snapshot.require_county(county)?;
    let area = snapshot.county_area(canonical);
    let Some(area_sq_miles) = area else {
        tracing::debug!(county = canonical, "no county area row; specialty gaps skipped");
        return Ok(SpecialtyGapReport {
            county: canonical.to_string(),
            area_sq_miles: None,
            gaps: Vec::new(),
        });
    };

    let (counts, _) = active_specialty_counts(analytics, canonical)?;
    let by_key: BTreeMap<String, usize> = counts
        .into_iter()
        .fold(BTreeMap::new(), |mut acc, (specialty, count)| {
            *acc.entry(specialty.to_lowercase()).or_insert(0) += count;
            acc
        });

    let mut gaps: Vec<SpecialtyGap> = snapshot
        .specialty_standards()
        .iter()
        .map(|standard| {
            let count = by_key.get(&standard.specialty.to_lowercase()).copied().unwrap_or(0);
            let actual = count as f64 / area_sq_miles;
            SpecialtyGap {
                specialty: standard.specialty.clone(),
                count,
                actual_density: round_to(actual, 4),
                recommended_density: standard.recommended_density,
                gap: round_to(standard.recommended_density - actual, 4),
            }
        })
        .collect();
    gaps.sort_by(|a, b| b.gap.total_cmp(&a.gap).then_with(|| a.specialty.cmp(&b.specialty)));

    Ok(SpecialtyGapReport {
        county: canonical.to_string(),
        area_sq_miles: area,
        gaps,
    })
}

#[cfg(test)]
mod tests {
    use crate::analytics::CancellationToken;
    use crate::data_types::*;
    use crate::snapshot::{Snapshot, SnapshotSource};
    use crate::NetworkError;

    fn provider(id: &str, specialty: &str, county: &str, status: ProviderStatus) -> Provider {
        Provider {
            provider_id: ProviderId::from(id),
            npi: None,
            name: format!("Provider {}", id),
            provider_type: specialty.to_string(),
            status,
            county: county.to_string(),
            latitude: 37.69,
            longitude: -97.34,
        }
    }

    fn medicare(id: &str, start: &str, end: Option<&str>) -> ProviderNetwork {
        ProviderNetwork {
            provider_id: ProviderId::from(id),
            network_id: NetworkId::Medicare,
            effective_date: parse_timestamp(start).unwrap(),
            termination_date: end.map(|e| parse_timestamp(e).unwrap()),
            termination_reason: String::new(),
        }
    }

    fn standard(specialty: &str, density: f64) -> SpecialtyStandard {
        SpecialtyStandard {
            specialty: specialty.to_string(),
            recommended_density: density,
        }
    }

    fn snapshot() -> Snapshot {
        let providers = vec![
            provider("P1", "Cardiology", "Sedgwick", ProviderStatus::Active),
            // Active through its Medicare interval despite the flag
            provider("P2", "Cardiology", "Sedgwick", ProviderStatus::Terminated),
            // Interval lapsed and flag off
            provider("P3", "Primary Care", "Sedgwick", ProviderStatus::Terminated),
            provider("P4", " Primary Care ", "Sedgwick", ProviderStatus::Active),
            provider("P5", "Oncology", "Sedgwick", ProviderStatus::Terminated),
            provider("P6", "Pediatrics", "Johnson", ProviderStatus::Terminated),
        ];
        let networks = vec![
            medicare("P2", "2020-01-01", None),
            medicare("P3", "2018-01-01", Some("2021-01-01")),
        ];
        let source = SnapshotSource::new(providers, networks, vec![])
            .with_county_areas(vec![CountyArea {
                county: "Sedgwick".to_string(),
                area_sq_miles: 100.0,
            }])
            .with_specialty_standards(vec![
                standard("Cardiology", 0.05),
                standard("Primary Care", 0.1),
                standard("Oncology", 0.02),
                standard("Neurology", 0.0),
            ]);
        Snapshot::build(source, 1).unwrap()
    }

    fn as_of() -> chrono::DateTime<chrono::Utc> {
        parse_timestamp("2024-06-01").unwrap()
    }

    #[test]
    fn test_counts_and_ratios_of_active_providers() {
        let snapshot = snapshot();
        let density = snapshot.analytics().as_of(as_of()).specialty_density("sedgwick").unwrap();

        assert_eq!(density.len(), 2);
        assert_eq!(density["Cardiology"].count, 2);
        assert!((density["Cardiology"].ratio - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(density["Primary Care"].count, 1);
        assert!((density["Primary Care"].ratio - 1.0 / 3.0).abs() < 1e-12);
        assert!(!density.contains_key("Oncology"));
        let total: f64 = density.values().map(|s| s.ratio).sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_activity_follows_the_reference_time() {
        let snapshot = snapshot();
        let earlier = parse_timestamp("2019-06-01").unwrap();
        let density = snapshot.analytics().as_of(earlier).specialty_density("Sedgwick").unwrap();
        // P3 was still enrolled, P2 not yet
        assert_eq!(density["Cardiology"].count, 1);
        assert_eq!(density["Primary Care"].count, 2);
        assert_eq!(density["Cardiology"].ratio, 1.0 / 3.0);
    }

    #[test]
    fn test_county_without_active_providers_is_empty() {
        let snapshot = snapshot();
        let density = snapshot.analytics().as_of(as_of()).specialty_density("Johnson").unwrap();
        assert!(density.is_empty());
    }

    #[test]
    fn test_unknown_county_is_not_found() {
        let snapshot = snapshot();
        let err = snapshot.analytics().specialty_density("Atlantis").unwrap_err();
        assert!(matches!(err, NetworkError::NotFound { .. }));
        assert_eq!(err.status_code(), 404);
        assert!(snapshot.analytics().specialty_gaps("Atlantis").is_err());
    }

    #[test]
    fn test_cancelled_density_query() {
        let snapshot = snapshot();
        let token = CancellationToken::new();
        token.cancel();
        let err = snapshot
            .analytics()
            .with_cancellation(&token)
            .specialty_density("Sedgwick")
            .unwrap_err();
        assert!(matches!(err, NetworkError::Cancelled { .. }));
    }

    #[test]
    fn test_gaps_sorted_by_shortfall() {
        let snapshot = snapshot();
        let report = snapshot.analytics().as_of(as_of()).specialty_gaps("Sedgwick").unwrap();
        assert_eq!(report.area_sq_miles, Some(100.0));

        let order: Vec<_> = report.gaps.iter().map(|g| g.specialty.as_str()).collect();
        assert_eq!(order, vec!["Primary Care", "Cardiology", "Oncology", "Neurology"]);

        let primary = &report.gaps[0];
        assert_eq!(primary.count, 1);
        assert_eq!(primary.actual_density, 0.01);
        assert_eq!(primary.gap, 0.09);
        assert_eq!(report.gaps[1].count, 2);
        assert_eq!(report.gaps[1].gap, 0.03);
        assert_eq!(report.gaps[3].gap, 0.0);
    }

    #[test]
    fn test_gaps_need_a_county_area() {
        let snapshot = snapshot();
        let report = snapshot.analytics().as_of(as_of()).specialty_gaps("johnson").unwrap();
        assert_eq!(report.county, "Johnson");
        assert_eq!(report.area_sq_miles, None);
        assert!(report.gaps.is_empty());
    }
}
