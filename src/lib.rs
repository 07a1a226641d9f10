/*!
 * # carenet: provider network analytics
 *
 * Analytics over healthcare provider networks: which providers are active in
 * which payer networks at a point in time, and what that means per county.
 *
 * ## Features
 *
 * - **Atomic snapshots**: loads are validated off to the side and swapped in
 *   with a single pointer store; running queries keep the snapshot they started on
 * - **Interval-aware**: enrollments are half-open intervals with open-ended
 *   terminations, evaluated against any reference time
 * - **County analytics**: provider counts, claims pass-through, density classes
 *   and provider spacing
 * - **Network stability**: termination ratios per network, statewide or per county
 * - **Radius search**: haversine distance from county centroids with stable ordering
 * - **Recommendations**: a fixed, ordered rule table over county metrics
 *
 * ## Quick Start
 *
 * ```no_run
 * use carenet::prelude::*;
 *
 * # fn main() -> Result<()> {
 * let store = SnapshotStore::new();
 * store.load_from_dir("./data", &EngineConfig::default())?;
 *
 * let snapshot = store.current();
 * let analytics = snapshot.analytics();
 *
 * let sedgwick = analytics.county("Sedgwick")?;
 * println!("{} active providers ({})", sedgwick.provider_count, sedgwick.density);
 *
 * let nearby = analytics.radius_search("Sedgwick", 25.0, NetworkId::Medicare)?;
 * for hit in nearby.iter().take(5) {
 *     println!("{:>8.2} mi  {}", hit.distance_miles, hit.provider.display_name());
 * }
 *
 * for rec in analytics.recommendations("Sedgwick", Some(NetworkId::Medicare))? {
 *     println!("[{}] {}: {}", rec.priority, rec.kind, rec.description);
 * }
 * # Ok(())
 * # }
 * ```
 *
 * ## Reference time and diagnostics
 *
 * ```no_run
 * # use carenet::prelude::*;
 * # fn main() -> Result<()> {
 * # let store = SnapshotStore::new();
 * let snapshot = store.current();
 * let diagnostics = Diagnostics::new();
 * let as_of = parse_timestamp("2022-06-30")?;
 *
 * let medicare = snapshot
 *     .analytics()
 *     .as_of(as_of)
 *     .with_diagnostics(&diagnostics)
 *     .terminated_analysis(NetworkId::Medicare, None)?;
 *
 * for anomaly in diagnostics.take() {
 *     eprintln!("overlapping intervals for {} in {}", anomaly.provider_id, anomaly.network_id);
 * }
 * # Ok(())
 * # }
 * ```
 *
 * ## Data files
 *
 * A data directory holds `providers`, `provider_networks` and `claims` files
 * (JSON arrays or CSV) plus an optional `county_centroids.csv`. Open-ended
 * enrollments carry the termination `9999-12-31T00:00:00Z`.
 */

// Re-export error types from root
pub use error::{ErrorContext, ErrorKind, ExportFormat, NetworkError, Result};

pub mod aggregate;
pub mod analytics;
pub mod api;
pub mod config;
pub mod data_types;
pub mod dataset;
pub mod error;
pub mod export;
pub mod fixtures;
pub mod geo;
pub mod interval;
pub mod reader;
pub mod recommend;
pub mod radius;
pub mod schema;
pub mod snapshot;
pub mod specialty;
pub mod stability;

/// Prelude module for convenient imports
///
/// ```
/// use carenet::prelude::*;
/// ```
pub mod prelude {
    pub use crate::aggregate::{CountyMetrics, DensityClass, SpacingBasis};
    pub use crate::analytics::{Analytics, CancellationToken, DatasetStats, ProviderFilter, ProviderQuery};
    pub use crate::api::{ApiError, ApiService};
    pub use crate::config::{ConfigBuilder, EngineConfig};
    pub use crate::data_types::*;
    pub use crate::dataset::DatasetBuilder;
    pub use crate::error::{NetworkError, Result};
    pub use crate::export::{CsvExporter, JsonExporter, ReportExporter};
    pub use crate::geo::{CentroidTable, GeoPoint};
    pub use crate::interval::{Diagnostics, OverlapAnomaly};
    pub use crate::radius::RadiusHit;
    pub use crate::recommend::{recommend, Priority, Recommendation, RecommendationType};
    pub use crate::snapshot::{Snapshot, SnapshotHandle, SnapshotSource, SnapshotStore};
    pub use crate::specialty::{SpecialtyGap, SpecialtyGapReport, SpecialtyShare};
    pub use crate::stability::TerminatedAnalysis;
    pub use crate::ExportFormat;
}

/// Domain constants
pub mod constants {
    /// Wire value of an open-ended termination
    pub const OPEN_ENDED_SENTINEL: &str = "9999-12-31T00:00:00Z";

    /// Mean Earth radius used by the haversine distance
    pub const EARTH_RADIUS_MILES: f64 = 3958.8;

    /// Density class lower bounds, in active providers
    pub const HIGH_DENSITY_MIN: usize = 400;
    pub const MEDIUM_DENSITY_MIN: usize = 100;
    pub const LOW_DENSITY_MIN: usize = 50;

    /// Fewer active providers than this is a shortage
    pub const SHORTAGE_THRESHOLD: usize = 50;

    /// Claims per provider above which utilization is high
    pub const CLAIMS_PER_PROVIDER_LIMIT: u64 = 100;

    /// Termination percentage above which a network is unstable
    pub const INSTABILITY_PERCENT: f64 = 15.0;

    pub const DEFAULT_RADIUS_MILES: f64 = 25.0;

    /// Termination reason written by the fixture generator
    pub const LEFT_NETWORK_REASON: &str = "Left Network";

    /// Data directory file stems
    pub const PROVIDERS_FILE_STEM: &str = "providers";
    pub const NETWORKS_FILE_STEM: &str = "provider_networks";
    pub const CLAIMS_FILE_STEM: &str = "claims";
    pub const CENTROIDS_FILE_STEM: &str = "county_centroids";
    pub const AREAS_FILE_STEM: &str = "county_areas";
    pub const STANDARDS_FILE_STEM: &str = "specialty_density_standards";
}

/// Common recipes and utility functions
pub mod cookbook {
    use crate::prelude::*;
    use std::collections::BTreeMap;

    /// Counties the presentation layer should flag as missing data: no claims
    /// row, or no active providers
    ///
    /// # Example
    /// ```no_run
    /// # use carenet::prelude::*;
    /// # use carenet::cookbook::missing_data_counties;
    /// # fn main() -> Result<()> {
    /// # let store = SnapshotStore::new();
    /// let snapshot = store.current();
    /// let metrics = snapshot.analytics().county_metrics(None)?;
    /// for county in missing_data_counties(&metrics) {
    ///     println!("no data: {}", county);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn missing_data_counties(metrics: &BTreeMap<String, CountyMetrics>) -> Vec<&str> {
        metrics
            .values()
            .filter(|m| m.is_missing_data())
            .map(|m| m.county.as_str())
            .collect()
    }

    /// Counties grouped by density class
    pub fn counties_by_density(metrics: &BTreeMap<String, CountyMetrics>) -> BTreeMap<DensityClass, Vec<&str>> {
        let mut grouped: BTreeMap<DensityClass, Vec<&str>> = BTreeMap::new();
        for m in metrics.values() {
            grouped.entry(m.density).or_default().push(m.county.as_str());
        }
        grouped
    }

    /// Network with the highest termination percentage, statewide
    pub fn least_stable_network(analytics: &Analytics<'_>) -> Result<Option<TerminatedAnalysis>> {
        let mut worst: Option<TerminatedAnalysis> = None;
        for network in NetworkId::ALL {
            let analysis = analytics.terminated_analysis(network, None)?;
            if worst
                .as_ref()
                .map_or(true, |w| analysis.percentage_terminated > w.percentage_terminated)
            {
                worst = Some(analysis);
            }
        }
        Ok(worst)
    }
}
