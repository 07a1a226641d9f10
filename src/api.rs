/*!
 * Transport-agnostic service layer for the HTTP boundary
 *
 * One method per endpoint. Parameters arrive already extracted from the
 * request; every method reads the current snapshot exactly once, so a
 * response never mixes data from two loads.
 *
 * | Endpoint | Method |
 * |---|---|
 * | `GET /county-data` | [`ApiService::county_data`] |
 * | `GET /county-data/{county}` | [`ApiService::county_data_for`] |
 * | `GET /providers` | [`ApiService::providers`] |
 * | `GET /provider-network` | [`ApiService::provider_networks`] |
 * | `POST /filters` | [`ApiService::filters`] |
 * | `GET /active-providers` | [`ApiService::active_providers`] |
 * | `GET /terminated-analysis[/{county}]?network_id=` | [`ApiService::terminated_analysis`] |
 * | `GET /specialty-density/{county}` | [`ApiService::specialty_density`] |
 * | `GET /recommendations/{county}` | [`ApiService::recommendations`] |
 * | `GET /radius-analysis/{county}?radius=&network=` | [`ApiService::radius_analysis`] |
 * | `GET /health` | [`ApiService::health`] |
 */

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::aggregate::CountyMetrics;
use crate::analytics::{Analytics, ProviderFilter};
use crate::config::EngineConfig;
use crate::data_types::{NetworkId, Provider, ProviderNetwork};
use crate::recommend::Recommendation;
use crate::snapshot::{Snapshot, SnapshotStore};
use crate::specialty::{SpecialtyGapReport, SpecialtyShare};
use crate::stability::TerminatedAnalysis;
use crate::NetworkError;

pub const SERVICE_NAME: &str = "carenet-api";

/// Error body returned to the transport
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[error("{status}: {message}")]
pub struct ApiError {
    #[serde(skip)]
    pub status: u16,
    #[serde(rename = "error")]
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: 400,
            message: message.into(),
        }
    }
}

impl From<NetworkError> for ApiError {
    fn from(err: NetworkError) -> Self {
        let status = err.status_code();
        if status >= 500 {
            tracing::error!(error = %err, "request failed");
        }
        Self {
            status,
            message: err.user_message(),
        }
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Body of `POST /filters`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub county: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveProvidersResponse {
    pub total_active_providers: usize,
}

/// One row of a radius analysis response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RadiusEntry {
    pub provider: Provider,
    pub distance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub service: &'static str,
    pub generation: u64,
    pub providers: usize,
}

/// Endpoint handlers over a shared [`SnapshotStore`]
#[derive(Clone)]
pub struct ApiService {
    store: Arc<SnapshotStore>,
    config: EngineConfig,
}

impl ApiService {
    pub fn new(store: Arc<SnapshotStore>) -> Self {
        Self::with_config(store, EngineConfig::default())
    }

    pub fn with_config(store: Arc<SnapshotStore>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    fn analytics<'s>(&self, snapshot: &'s Snapshot) -> Analytics<'s> {
        snapshot.analytics().as_of(self.config.reference_time())
    }

    pub fn county_data(&self) -> ApiResult<Vec<CountyMetrics>> {
        let snapshot = self.store.current();
        let metrics = self.analytics(&snapshot).county_metrics(None)?;
        tracing::info!(counties = metrics.len(), "county data");
        Ok(metrics.into_values().collect())
    }

    pub fn county_data_for(&self, county: &str) -> ApiResult<CountyMetrics> {
        let snapshot = self.store.current();
        Ok(self.analytics(&snapshot).county(county)?)
    }

    pub fn providers(&self) -> ApiResult<Vec<Provider>> {
        Ok(self.store.current().providers().to_vec())
    }

    /// Enrollment rows in interchange form
    pub fn provider_networks(&self) -> ApiResult<Vec<ProviderNetwork>> {
        Ok(self.store.current().provider_networks().to_vec())
    }

    /// Active providers matching the request. `"All"` or blank values mean no constraint.
    pub fn filters(&self, request: &FilterRequest) -> ApiResult<Vec<Provider>> {
        let mut filter = ProviderFilter::new();
        if let Some(specialty) = &request.specialty {
            filter = filter.with_specialty(specialty.as_str());
        }
        if let Some(network) = optional_param(request.network.as_deref()) {
            filter = filter.with_network(NetworkId::parse_param(network)?);
        }
        if let Some(county) = optional_param(request.county.as_deref()) {
            filter = filter.with_county(county);
        }
        tracing::info!(
            specialty = ?request.specialty,
            network = ?request.network,
            county = ?request.county,
            "filtering providers"
        );

        let snapshot = self.store.current();
        let providers = self.analytics(&snapshot).filter_providers(&filter)?;
        Ok(providers.into_iter().cloned().collect())
    }

    pub fn active_providers(&self) -> ApiResult<ActiveProvidersResponse> {
        let snapshot = self.store.current();
        Ok(ActiveProvidersResponse {
            total_active_providers: self.analytics(&snapshot).active_provider_count(),
        })
    }

    pub fn terminated_analysis(&self, network_id: &str, county: Option<&str>) -> ApiResult<TerminatedAnalysis> {
        let network = required_network(network_id, "network_id")?;
        let snapshot = self.store.current();
        Ok(self.analytics(&snapshot).terminated_analysis(network, county)?)
    }

    pub fn specialty_density(&self, county: &str) -> ApiResult<BTreeMap<String, SpecialtyShare>> {
        let snapshot = self.store.current();
        Ok(self.analytics(&snapshot).specialty_density(county)?)
    }

    /// Density per square mile against the specialty standards, largest gap first
    pub fn specialty_gaps(&self, county: &str) -> ApiResult<SpecialtyGapReport> {
        let snapshot = self.store.current();
        Ok(self.analytics(&snapshot).specialty_gaps(county)?)
    }

    /// Recommendations for a county; a network id adds the stability rule input
    pub fn recommendations(&self, county: &str, network_id: Option<&str>) -> ApiResult<Vec<Recommendation>> {
        let network = optional_param(network_id).map(NetworkId::parse_param).transpose()?;
        let snapshot = self.store.current();
        Ok(self.analytics(&snapshot).recommendations(county, network)?)
    }

    /// Providers around the county centroid; `radius` defaults to the configured radius
    pub fn radius_analysis(&self, county: &str, radius: Option<f64>, network: &str) -> ApiResult<Vec<RadiusEntry>> {
        let network = required_network(network, "network")?;
        let radius = radius.unwrap_or(self.config.default_radius_miles);
        let snapshot = self.store.current();
        let hits = self.analytics(&snapshot).radius_search(county, radius, network)?;
        Ok(hits
            .into_iter()
            .map(|hit| RadiusEntry {
                provider: hit.provider.clone(),
                distance: hit.distance_miles,
            })
            .collect())
    }

    pub fn health(&self) -> HealthResponse {
        let snapshot = self.store.current();
        HealthResponse {
            status: "healthy",
            timestamp: Utc::now(),
            service: SERVICE_NAME,
            generation: snapshot.generation(),
            providers: snapshot.len(),
        }
    }
}

fn optional_param(value: Option<&str>) -> Option<&str> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("all"))
}

fn required_network(value: &str, parameter: &str) -> ApiResult<NetworkId> {
    if value.trim().is_empty() {
        return Err(ApiError::bad_request(format!("{} query parameter is required", parameter)));
    }
    Ok(NetworkId::parse_param(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_types::*;
    use crate::aggregate::SpacingBasis;
    use crate::recommend::RecommendationType;
    use crate::snapshot::SnapshotSource;

    fn provider(id: &str, specialty: &str, county: &str, lat: f64, lon: f64) -> Provider {
        Provider {
            provider_id: ProviderId::from(id),
            npi: None,
            name: format!("Dr {}", id),
            provider_type: specialty.to_string(),
            status: ProviderStatus::Terminated,
            county: county.to_string(),
            latitude: lat,
            longitude: lon,
        }
    }

    fn enrollment(id: &str, network: NetworkId, end: Option<&str>) -> ProviderNetwork {
        ProviderNetwork {
            provider_id: ProviderId::from(id),
            network_id: network,
            effective_date: parse_timestamp("2020-01-01T00:00:00Z").unwrap(),
            termination_date: end.map(|e| parse_timestamp(e).unwrap()),
            termination_reason: if end.is_some() { "Left Network".to_string() } else { String::new() },
        }
    }

    fn service() -> ApiService {
        let source = SnapshotSource::new(
            vec![
                provider("P0001", "Cardiology", "Sedgwick", 37.6838, -97.4613),
                provider("P0002", "Pediatrics", "Sedgwick", 37.70, -97.40),
                provider("P0003", "Pediatrics", "Riley", 39.29, -96.73),
            ],
            vec![
                enrollment("P0001", NetworkId::Medicare, None),
                enrollment("P0002", NetworkId::Commercial, None),
                enrollment("P0002", NetworkId::Medicare, Some("2022-03-01T00:00:00Z")),
                enrollment("P0003", NetworkId::Tricare, Some("2021-06-01T00:00:00Z")),
            ],
            vec![CountyRecord::named("Sedgwick").with_claims(500, 210.0), CountyRecord::named("Riley")],
        )
        .with_centroids(vec![CountyCentroid {
            county: "Sedgwick".to_string(),
            latitude: 37.6838,
            longitude: -97.4613,
        }])
        .with_county_areas(vec![CountyArea {
            county: "Sedgwick".to_string(),
            area_sq_miles: 1008.0,
        }])
        .with_specialty_standards(vec![
            SpecialtyStandard {
                specialty: "Cardiology".to_string(),
                recommended_density: 0.002,
            },
            SpecialtyStandard {
                specialty: "Pediatrics".to_string(),
                recommended_density: 0.01,
            },
        ]);
        let store = Arc::new(SnapshotStore::with_source(source).unwrap());
        let config = EngineConfig {
            reference_date: Some(parse_timestamp("2024-01-01T00:00:00Z").unwrap()),
            ..EngineConfig::default()
        };
        ApiService::with_config(store, config)
    }

    #[test]
    fn test_county_data() {
        let api = service();
        let all = api.county_data().unwrap();
        assert_eq!(all.len(), 2);
        let sedgwick = api.county_data_for("sedgwick").unwrap();
        assert_eq!(sedgwick.provider_count, 2);
        assert_eq!(sedgwick.claims_per_provider, Some(250));

        let err = api.county_data_for("Atlantis").unwrap_err();
        assert_eq!(err.status, 404);
    }

    #[test]
    fn test_filters_and_active_count() {
        let api = service();
        assert_eq!(api.active_providers().unwrap().total_active_providers, 2);

        let request = FilterRequest {
            specialty: Some("All".to_string()),
            network: Some("medicare".to_string()),
            county: None,
        };
        let ids: Vec<_> = api
            .filters(&request)
            .unwrap()
            .into_iter()
            .map(|p| p.provider_id.0)
            .collect();
        assert_eq!(ids, vec!["P0001"]);

        let bad = FilterRequest {
            network: Some("Aetna".to_string()),
            ..FilterRequest::default()
        };
        assert_eq!(api.filters(&bad).unwrap_err().status, 400);
    }

    #[test]
    fn test_terminated_analysis_requires_network() {
        let api = service();
        let err = api.terminated_analysis("", None).unwrap_err();
        assert_eq!(err.status, 400);
        assert!(err.message.contains("network_id"));

        let medicare = api.terminated_analysis("Medicare", None).unwrap();
        assert_eq!(medicare.service_location_count, 2);
        assert_eq!(medicare.term_network_count, 1);
        assert_eq!(medicare.percentage_terminated, 50.0);
    }

    #[test]
    fn test_radius_and_recommendations() {
        let api = service();
        let hits = api.radius_analysis("Sedgwick", None, "Medicare").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].provider.provider_id.as_str(), "P0001");
        assert_eq!(hits[0].distance, 0.0);

        assert_eq!(api.radius_analysis("Sedgwick", Some(0.0), "Medicare").unwrap_err().status, 400);
        assert_eq!(api.radius_analysis("Riley", Some(10.0), "Medicare").unwrap_err().status, 400);

        let recs = api.recommendations("Riley", Some("Tricare")).unwrap();
        let kinds: Vec<_> = recs.iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![RecommendationType::ProviderShortage, RecommendationType::NetworkInstability]);
    }

    #[test]
    fn test_specialty_density_and_gaps() {
        let api = service();
        let density = api.specialty_density("SEDGWICK").unwrap();
        assert_eq!(density.len(), 2);
        assert_eq!(density["Cardiology"].count, 1);
        assert_eq!(density["Pediatrics"].ratio, 0.5);

        // P0003 lapsed out of Tricare, so Riley has no active providers
        assert!(api.specialty_density("Riley").unwrap().is_empty());
        assert_eq!(api.specialty_density("Atlantis").unwrap_err().status, 404);

        let report = api.specialty_gaps("Sedgwick").unwrap();
        assert_eq!(report.area_sq_miles, Some(1008.0));
        let order: Vec<_> = report.gaps.iter().map(|g| (g.specialty.as_str(), g.count)).collect();
        assert_eq!(order, vec![("Pediatrics", 1), ("Cardiology", 1)]);
        assert!(api.specialty_gaps("Riley").unwrap().gaps.is_empty());

        let sedgwick = api.county_data_for("Sedgwick").unwrap();
        assert_eq!(sedgwick.area_sq_miles, Some(1008.0));
        assert_eq!(sedgwick.spacing_basis, Some(SpacingBasis::NearestNeighbour));
    }

    #[test]
    fn test_health_reports_generation() {
        let api = service();
        let health = api.health();
        assert_eq!(health.status, "healthy");
        assert_eq!(health.providers, 3);
        assert_eq!(health.generation, api.store().current().generation());
    }
}
