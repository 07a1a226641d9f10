/*!
 * Analytics and querying over a provider network snapshot
 *
 * [`Analytics`] borrows one [`Snapshot`] and answers every analytic query
 * against a single reference time. Options are set builder style:
 *
 * ```rust,no_run
 * # use carenet::prelude::*;
 * # fn demo(store: &SnapshotStore) -> carenet::Result<()> {
 * let snapshot = store.current();
 * let diagnostics = Diagnostics::new();
 * let metrics = snapshot
 *     .analytics()
 *     .with_diagnostics(&diagnostics)
 *     .county_metrics(None)?;
 * # Ok(())
 * # }
 * ```
 */

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::{self, CountyMetrics};
use crate::data_types::*;
use crate::geo::normalize_county;
use crate::interval::{ActiveAt, Diagnostics, EnrollmentHistory, OverlapAnomaly};
use crate::radius::{self, RadiusHit};
use crate::recommend::{self, Recommendation};
use crate::snapshot::Snapshot;
use crate::specialty::{self, SpecialtyGapReport, SpecialtyShare};
use crate::stability::{self, TerminatedAnalysis};
use crate::{NetworkError, Result};

/// Cooperative cancellation flag shared between a caller and a running query
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Analytics engine bound to one snapshot and one reference time
#[derive(Debug, Clone, Copy)]
pub struct Analytics<'a> {
    snapshot: &'a Snapshot,
    as_of: DateTime<Utc>,
    diagnostics: Option<&'a Diagnostics>,
    cancellation: Option<&'a CancellationToken>,
}

impl<'a> Analytics<'a> {
    /// Analytics at the current wall-clock time
    pub fn new(snapshot: &'a Snapshot) -> Self {
        Self {
            snapshot,
            as_of: Utc::now(),
            diagnostics: None,
            cancellation: None,
        }
    }

    /// Evaluate "active" and "terminated" relative to `as_of`
    pub fn as_of(mut self, as_of: DateTime<Utc>) -> Self {
        self.as_of = as_of;
        self
    }

    /// Report overlapping enrollment intervals to `diagnostics`
    pub fn with_diagnostics(mut self, diagnostics: &'a Diagnostics) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    /// Abort long-running queries once `token` is cancelled
    pub fn with_cancellation(mut self, token: &'a CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn snapshot(&self) -> &'a Snapshot {
        self.snapshot
    }

    pub fn reference_time(&self) -> DateTime<Utc> {
        self.as_of
    }

    pub(crate) fn check_cancelled(&self, operation: &str) -> Result<()> {
        match self.cancellation {
            Some(token) if token.is_cancelled() => {
                tracing::debug!(operation, "query cancelled");
                Err(NetworkError::Cancelled {
                    operation: operation.to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    fn lookup(&self, position: usize, history: &EnrollmentHistory) -> bool {
        let found = history.active_at(self.as_of);
        if let (ActiveAt::Overlapping { selected, covering }, Some(sink)) = (found, self.diagnostics) {
            sink.record(OverlapAnomaly {
                provider_id: self.snapshot.provider_at(position).provider_id.clone(),
                network_id: history.network(),
                as_of: self.as_of,
                covering,
                selected_effective: selected.effective,
            });
        }
        found.is_active()
    }

    /// Active if any network interval covers the reference time or the status flag is set.
    ///
    /// With a diagnostics sink attached every network history is evaluated, so
    /// overlaps behind an earlier active network are still reported.
    pub(crate) fn is_position_active(&self, position: usize) -> bool {
        let histories = self.snapshot.histories_at(position);
        let in_any_network = if self.diagnostics.is_some() {
            histories
                .iter()
                .fold(false, |active, history| self.lookup(position, history) || active)
        } else {
            histories.iter().any(|history| self.lookup(position, history))
        };
        in_any_network || self.snapshot.provider_at(position).is_flagged_active()
    }

    /// Whether the provider has an interval in `network` covering the reference time
    pub(crate) fn is_position_in_network(&self, position: usize, network: NetworkId) -> bool {
        self.snapshot
            .history_at(position, network)
            .map_or(false, |history| self.lookup(position, history))
    }

    /// Whether a provider is active at the reference time
    pub fn is_active(&self, provider_id: &ProviderId) -> Result<bool> {
        let position = self
            .snapshot
            .provider_position(provider_id)
            .ok_or_else(|| NetworkError::not_found("Provider", provider_id.as_str()))?;
        Ok(self.is_position_active(position))
    }

    /// Metrics for every county, or only `county_filter`
    pub fn county_metrics(&self, county_filter: Option<&str>) -> Result<BTreeMap<String, CountyMetrics>> {
        aggregate::aggregate(self, county_filter)
    }

    /// Metrics for one county; `NotFound` if the snapshot does not know it
    pub fn county(&self, county: &str) -> Result<CountyMetrics> {
        let canonical = self.snapshot.require_county(county)?;
        aggregate::county_metrics(self, canonical)
    }

    /// Termination statistics for a network, optionally scoped to a county
    pub fn terminated_analysis(&self, network: NetworkId, county: Option<&str>) -> Result<TerminatedAnalysis> {
        stability::terminated_analysis(self, network, county)
    }

    /// Active providers per specialty in a county
    pub fn specialty_density(&self, county: &str) -> Result<BTreeMap<String, SpecialtyShare>> {
        specialty::specialty_density(self, county)
    }

    /// Actual density against each specialty standard, largest shortfall first
    pub fn specialty_gaps(&self, county: &str) -> Result<SpecialtyGapReport> {
        specialty::specialty_gaps(self, county)
    }

    /// Providers enrolled in `network` within `radius_miles` of the county centroid
    pub fn radius_search(&self, county: &str, radius_miles: f64, network: NetworkId) -> Result<Vec<RadiusHit<'a>>> {
        radius::radius_search(self, county, radius_miles, network)
    }

    /// Recommendations for a county, adding the stability rule when `network` is given
    pub fn recommendations(&self, county: &str, network: Option<NetworkId>) -> Result<Vec<Recommendation>> {
        let canonical = self.snapshot.require_county(county)?;
        let metrics = aggregate::county_totals(self, canonical)?;
        let stability = match network {
            Some(network) => Some(self.terminated_analysis(network, Some(&metrics.county))?),
            None => None,
        };
        Ok(recommend::recommend(&metrics, stability.as_ref()))
    }

    /// Number of providers active at the reference time
    pub fn active_provider_count(&self) -> usize {
        (0..self.snapshot.len())
            .filter(|&pos| self.is_position_active(pos))
            .count()
    }

    /// Providers active at the reference time, in load order
    pub fn active_providers(&self) -> Vec<&'a Provider> {
        let snapshot = self.snapshot;
        (0..snapshot.len())
            .filter(|&pos| self.is_position_active(pos))
            .map(|pos| snapshot.provider_at(pos))
            .collect()
    }

    /// Active providers matching the filter's specialty, network and county
    pub fn filter_providers(&self, filter: &ProviderFilter) -> Result<Vec<&'a Provider>> {
        let mut query = self.query().active_only();
        if let Some(specialty) = filter.specialty_constraint() {
            query = query.specialty(specialty);
        }
        if let Some(network) = filter.network {
            query = query.in_network(network);
        }
        if let Some(county) = filter.county.as_deref().filter(|c| !c.trim().is_empty()) {
            query = query.county(county);
        }
        query.execute()
    }

    /// Start an ad-hoc provider query
    pub fn query(&self) -> ProviderQuery<'_, 'a> {
        ProviderQuery::new(self)
    }

    /// Summary statistics about the snapshot
    pub fn dataset_stats(&self) -> DatasetStats {
        let snapshot = self.snapshot;
        let mut per_network = BTreeMap::new();
        for network in NetworkId::ALL {
            let active = (0..snapshot.len())
                .filter(|&pos| self.is_position_in_network(pos, network))
                .count();
            per_network.insert(network, active);
        }
        let open_enrollments = snapshot
            .provider_networks()
            .iter()
            .filter(|row| row.is_open_ended())
            .count();

        DatasetStats {
            generation: snapshot.generation(),
            total_providers: snapshot.len(),
            active_providers: self.active_provider_count(),
            counties: snapshot.county_count(),
            enrollments: snapshot.provider_networks().len(),
            open_enrollments,
            active_by_network: per_network,
        }
    }
}

/// Filter body of the provider search endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderFilter {
    #[serde(default)]
    pub specialty: Option<String>,
    #[serde(default)]
    pub network: Option<NetworkId>,
    #[serde(default)]
    pub county: Option<String>,
}

impl ProviderFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_specialty(mut self, specialty: impl Into<String>) -> Self {
        self.specialty = Some(specialty.into());
        self
    }

    pub fn with_network(mut self, network: NetworkId) -> Self {
        self.network = Some(network);
        self
    }

    pub fn with_county(mut self, county: impl Into<String>) -> Self {
        self.county = Some(county.into());
        self
    }

    /// The specialty to match, treating blank and "All" as no constraint
    fn specialty_constraint(&self) -> Option<&str> {
        self.specialty
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("all"))
    }
}

/// Statistics about a snapshot
#[derive(Debug, Clone, Serialize)]
pub struct DatasetStats {
    pub generation: u64,
    pub total_providers: usize,
    pub active_providers: usize,
    pub counties: usize,
    pub enrollments: usize,
    pub open_enrollments: usize,
    pub active_by_network: BTreeMap<NetworkId, usize>,
}

impl DatasetStats {
    /// Print formatted statistics
    pub fn print_summary(&self) {
        println!("=== Provider Network Snapshot (generation {}) ===", self.generation);
        println!("Total Providers: {}", self.total_providers);
        println!("Active Providers: {}", self.active_providers);
        println!("Counties: {}", self.counties);
        println!("Enrollments: {} ({} open-ended)", self.enrollments, self.open_enrollments);
        for (network, count) in &self.active_by_network {
            println!("  {} active: {}", network, count);
        }
        if self.total_providers > 0 {
            let active_percent = (self.active_providers as f64 / self.total_providers as f64) * 100.0;
            println!("Active Provider Percentage: {:.1}%", active_percent);
        }
    }
}

type PositionFilter<'q> = Box<dyn Fn(usize, &Provider) -> bool + 'q>;

/// Query builder for ad-hoc provider searches
pub struct ProviderQuery<'q, 'a> {
    analytics: &'q Analytics<'a>,
    filters: Vec<PositionFilter<'q>>,
}

impl<'q, 'a> ProviderQuery<'q, 'a> {
    pub fn new(analytics: &'q Analytics<'a>) -> Self {
        Self {
            analytics,
            filters: Vec::new(),
        }
    }

    /// Match specialty, ignoring case
    pub fn specialty(mut self, specialty: &str) -> Self {
        let specialty = specialty.trim().to_lowercase();
        self.filters
            .push(Box::new(move |_, p| p.provider_type.trim().to_lowercase() == specialty));
        self
    }

    /// Match county, ignoring case
    pub fn county(mut self, county: &str) -> Self {
        let county = normalize_county(county);
        self.filters.push(Box::new(move |_, p| normalize_county(&p.county) == county));
        self
    }

    /// Enrolled in `network` at the reference time
    pub fn in_network(mut self, network: NetworkId) -> Self {
        let analytics = self.analytics;
        self.filters
            .push(Box::new(move |pos, _| analytics.is_position_in_network(pos, network)));
        self
    }

    /// Active at the reference time
    pub fn active_only(mut self) -> Self {
        let analytics = self.analytics;
        self.filters.push(Box::new(move |pos, _| analytics.is_position_active(pos)));
        self
    }

    /// Match the recorded status flag
    pub fn status(mut self, status: ProviderStatus) -> Self {
        self.filters.push(Box::new(move |_, p| p.status == status));
        self
    }

    /// Name contains `fragment`, ignoring case
    pub fn name_contains(mut self, fragment: &str) -> Self {
        let fragment = fragment.to_lowercase();
        self.filters
            .push(Box::new(move |_, p| p.display_name().to_lowercase().contains(&fragment)));
        self
    }

    /// Execute the query and return matching providers in load order
    pub fn execute(self) -> Result<Vec<&'a Provider>> {
        let snapshot = self.analytics.snapshot();
        let mut matches = Vec::new();
        for (pos, provider) in snapshot.providers().iter().enumerate() {
            self.analytics.check_cancelled("provider query")?;
            if self.filters.iter().all(|filter| filter(pos, provider)) {
                matches.push(provider);
            }
        }
        Ok(matches)
    }

    /// Execute the query and return count only
    pub fn count(self) -> Result<usize> {
        Ok(self.execute()?.len())
    }
}
