/*!
 * Immutable snapshots and the atomically swapped snapshot store
 *
 * A [`Snapshot`] owns every provider, enrollment and county row of one load,
 * together with the indexes the analytics need. It is never mutated after
 * construction. [`SnapshotStore`] keeps the current snapshot behind an
 * [`ArcSwap`]: readers take a handle with a single atomic load and keep using it
 * for the whole query, while a successful `load` swaps the pointer.
 */

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};

use crate::analytics::Analytics;
use crate::config::EngineConfig;
use crate::data_types::*;
use crate::dataset::DatasetBuilder;
use crate::geo::{normalize_county, CentroidTable};
use crate::interval::{EnrollmentHistory, Interval};
use crate::{NetworkError, Result};

/// Shared, read-only handle to one snapshot
pub type SnapshotHandle = Arc<Snapshot>;

/// Raw rows handed to [`SnapshotStore::load`]
#[derive(Debug, Clone, Default)]
pub struct SnapshotSource {
    pub providers: Vec<Provider>,
    pub provider_networks: Vec<ProviderNetwork>,
    pub counties: Vec<CountyRecord>,
    /// Reference centroids; these override centroids carried by county rows
    pub centroids: Vec<CountyCentroid>,
    pub county_areas: Vec<CountyArea>,
    pub specialty_standards: Vec<SpecialtyStandard>,
}

impl SnapshotSource {
    pub fn new(
        providers: Vec<Provider>,
        provider_networks: Vec<ProviderNetwork>,
        counties: Vec<CountyRecord>,
    ) -> Self {
        Self {
            providers,
            provider_networks,
            counties,
            centroids: Vec::new(),
            county_areas: Vec::new(),
            specialty_standards: Vec::new(),
        }
    }

    pub fn with_centroids(mut self, centroids: Vec<CountyCentroid>) -> Self {
        self.centroids = centroids;
        self
    }

    pub fn with_county_areas(mut self, areas: Vec<CountyArea>) -> Self {
        self.county_areas = areas;
        self
    }

    pub fn with_specialty_standards(mut self, standards: Vec<SpecialtyStandard>) -> Self {
        self.specialty_standards = standards;
        self
    }
}

/// Point-in-time view of all provider, network and county rows
#[derive(Debug)]
pub struct Snapshot {
    generation: u64,
    loaded_at: DateTime<Utc>,
    providers: Vec<Provider>,
    provider_networks: Vec<ProviderNetwork>,
    counties: Vec<CountyRecord>,
    centroids: CentroidTable,
    /// normalized county -> land area in square miles
    county_areas: HashMap<String, f64>,
    /// sorted by specialty
    specialty_standards: Vec<SpecialtyStandard>,

    provider_index: HashMap<ProviderId, usize>,
    /// normalized county -> display name
    county_names: BTreeMap<String, String>,
    /// normalized county -> provider positions, ascending
    county_providers: HashMap<String, Vec<usize>>,
    /// normalized county -> position in `counties`
    county_records: HashMap<String, usize>,
    /// per provider position, one history per network
    histories: Vec<Vec<EnrollmentHistory>>,
    /// per network, enrollment row positions
    network_rows: HashMap<NetworkId, Vec<usize>>,
}

impl Snapshot {
    /// An empty snapshot, served before the first successful load
    pub fn empty() -> Self {
        Self {
            generation: 0,
            loaded_at: Utc::now(),
            providers: Vec::new(),
            provider_networks: Vec::new(),
            counties: Vec::new(),
            centroids: CentroidTable::new(),
            county_areas: HashMap::new(),
            specialty_standards: Vec::new(),
            provider_index: HashMap::new(),
            county_names: BTreeMap::new(),
            county_providers: HashMap::new(),
            county_records: HashMap::new(),
            histories: Vec::new(),
            network_rows: HashMap::new(),
        }
    }

    /// Validate the rows and build indexes.
    ///
    /// Fails with `DataIntegrity` on duplicate provider ids, invalid coordinates,
    /// enrollments for unknown providers, terminations before their effective date,
    /// non-positive county areas or duplicate specialty standards.
    pub fn build(source: SnapshotSource, generation: u64) -> Result<Self> {
        let SnapshotSource {
            providers,
            provider_networks,
            counties,
            centroids: centroid_rows,
            county_areas: area_rows,
            specialty_standards,
        } = source;

        let mut provider_index = HashMap::with_capacity(providers.len());
        let mut county_names = BTreeMap::new();
        let mut county_providers: HashMap<String, Vec<usize>> = HashMap::new();
        let mut county_records = HashMap::with_capacity(counties.len());
        let mut centroids = CentroidTable::new();

        for (idx, county) in counties.iter().enumerate() {
            let key = normalize_county(&county.county);
            if key.is_empty() {
                return Err(NetworkError::data_integrity("county name cannot be empty", "county", None));
            }
            if county_records.insert(key.clone(), idx).is_some() {
                return Err(NetworkError::data_integrity(
                    format!("duplicate county row '{}'", county.county),
                    "county",
                    Some(&county.county),
                ));
            }
            if let Some(centroid) = county.centroid() {
                centroids.insert(&county.county, centroid)?;
            }
            county_names.insert(key, county.county.trim().to_string());
        }
        for row in &centroid_rows {
            centroids.insert(&row.county, crate::geo::GeoPoint::new(row.latitude, row.longitude))?;
        }
        let county_areas = index_county_areas(&area_rows)?;
        let specialty_standards = sort_specialty_standards(specialty_standards)?;

        for (idx, provider) in providers.iter().enumerate() {
            if provider_index.insert(provider.provider_id.clone(), idx).is_some() {
                return Err(NetworkError::data_integrity(
                    format!("duplicate provider id '{}'", provider.provider_id),
                    "provider_id",
                    Some(provider.provider_id.as_str()),
                ));
            }
            if !provider.location().is_valid() {
                return Err(NetworkError::data_integrity(
                    format!(
                        "provider '{}' has invalid coordinates ({}, {})",
                        provider.provider_id, provider.latitude, provider.longitude
                    ),
                    "latitude",
                    Some(provider.provider_id.as_str()),
                ));
            }
            let key = normalize_county(&provider.county);
            if key.is_empty() {
                return Err(NetworkError::data_integrity(
                    format!("provider '{}' has no county", provider.provider_id),
                    "county",
                    Some(provider.provider_id.as_str()),
                ));
            }
            county_names
                .entry(key.clone())
                .or_insert_with(|| provider.county.trim().to_string());
            county_providers.entry(key).or_default().push(idx);
        }

        let mut histories: Vec<Vec<EnrollmentHistory>> = vec![Vec::new(); providers.len()];
        let mut network_rows: HashMap<NetworkId, Vec<usize>> = HashMap::new();
        for (row, enrollment) in provider_networks.iter().enumerate() {
            let Some(&provider_idx) = provider_index.get(&enrollment.provider_id) else {
                return Err(NetworkError::data_integrity(
                    format!(
                        "enrollment row {} references unknown provider '{}'",
                        row, enrollment.provider_id
                    ),
                    "provider_id",
                    Some(enrollment.provider_id.as_str()),
                ));
            };
            if let Some(end) = enrollment.termination_date {
                if end < enrollment.effective_date {
                    return Err(NetworkError::data_integrity(
                        format!(
                            "enrollment row {} for '{}' terminates ({}) before it takes effect ({})",
                            row, enrollment.provider_id, end, enrollment.effective_date
                        ),
                        "termination_date",
                        Some(enrollment.provider_id.as_str()),
                    ));
                }
            }

            let per_provider = &mut histories[provider_idx];
            let position = match per_provider.iter().position(|h| h.network() == enrollment.network_id) {
                Some(pos) => pos,
                None => {
                    per_provider.push(EnrollmentHistory::new(enrollment.network_id));
                    per_provider.len() - 1
                }
            };
            per_provider[position].push(Interval {
                effective: enrollment.effective_date,
                termination: enrollment.termination_date,
                row,
            });
            network_rows.entry(enrollment.network_id).or_default().push(row);
        }

        let mut overlapping_keys = 0usize;
        for per_provider in &mut histories {
            for history in per_provider.iter_mut() {
                history.finish();
                if history.has_overlap() {
                    overlapping_keys += 1;
                }
            }
        }
        if overlapping_keys > 0 {
            tracing::warn!(
                overlapping_keys,
                "snapshot contains overlapping enrollment intervals; queries will prefer the latest effective date"
            );
        }

        Ok(Self {
            generation,
            loaded_at: Utc::now(),
            providers,
            provider_networks,
            counties,
            centroids,
            county_areas,
            specialty_standards,
            provider_index,
            county_names,
            county_providers,
            county_records,
            histories,
            network_rows,
        })
    }

    /// Monotonic load counter; 0 is the initial empty snapshot
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn providers(&self) -> &[Provider] {
        &self.providers
    }

    pub fn provider_networks(&self) -> &[ProviderNetwork] {
        &self.provider_networks
    }

    pub fn county_records(&self) -> &[CountyRecord] {
        &self.counties
    }

    pub fn centroids(&self) -> &CentroidTable {
        &self.centroids
    }

    /// Land area of a county, if the area table lists it
    pub fn county_area(&self, county: &str) -> Option<f64> {
        self.county_areas.get(&normalize_county(county)).copied()
    }

    /// Specialty density standards, sorted by specialty
    pub fn specialty_standards(&self) -> &[SpecialtyStandard] {
        &self.specialty_standards
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn provider(&self, id: &ProviderId) -> Option<&Provider> {
        self.provider_index.get(id).and_then(|&idx| self.providers.get(idx))
    }

    pub(crate) fn provider_position(&self, id: &ProviderId) -> Option<usize> {
        self.provider_index.get(id).copied()
    }

    /// Canonical display name of a county, matched case-insensitively
    pub fn resolve_county(&self, county: &str) -> Option<&str> {
        self.county_names.get(&normalize_county(county)).map(String::as_str)
    }

    /// Like [`resolve_county`](Self::resolve_county) but failing with `NotFound`
    pub fn require_county(&self, county: &str) -> Result<&str> {
        self.resolve_county(county)
            .ok_or_else(|| NetworkError::not_found("County", county))
    }

    /// Every known county (claims feed and provider rows), sorted by normalized name
    pub fn county_names(&self) -> impl Iterator<Item = &str> {
        self.county_names.values().map(String::as_str)
    }

    pub fn county_count(&self) -> usize {
        self.county_names.len()
    }

    /// Claims row for a county, if the feed has one
    pub fn county_record(&self, county: &str) -> Option<&CountyRecord> {
        self.county_records
            .get(&normalize_county(county))
            .and_then(|&idx| self.counties.get(idx))
    }

    /// Provider positions located in a county, ascending
    pub(crate) fn county_provider_positions(&self, county: &str) -> &[usize] {
        self.county_providers
            .get(&normalize_county(county))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Providers located in a county, in load order
    pub fn providers_in_county(&self, county: &str) -> Vec<&Provider> {
        self.county_provider_positions(county)
            .iter()
            .map(|&idx| &self.providers[idx])
            .collect()
    }

    pub(crate) fn provider_at(&self, position: usize) -> &Provider {
        &self.providers[position]
    }

    pub(crate) fn histories_at(&self, position: usize) -> &[EnrollmentHistory] {
        self.histories.get(position).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn history_at(&self, position: usize, network: NetworkId) -> Option<&EnrollmentHistory> {
        self.histories_at(position).iter().find(|h| h.network() == network)
    }

    /// Enrollment rows of one network, in load order
    pub fn enrollments_for(&self, network: NetworkId) -> impl Iterator<Item = &ProviderNetwork> {
        self.network_rows
            .get(&network)
            .map(Vec::as_slice)
            .unwrap_or(&[])
            .iter()
            .map(move |&row| &self.provider_networks[row])
    }

    /// Analytics over this snapshot
    pub fn analytics(&self) -> Analytics<'_> {
        Analytics::new(self)
    }
}

fn index_county_areas(rows: &[CountyArea]) -> Result<HashMap<String, f64>> {
    let mut areas = HashMap::with_capacity(rows.len());
    for row in rows {
        let key = normalize_county(&row.county);
        if key.is_empty() {
            return Err(NetworkError::data_integrity("county area row has no county", "county", None));
        }
        if !(row.area_sq_miles.is_finite() && row.area_sq_miles > 0.0) {
            return Err(NetworkError::data_integrity(
                format!("county '{}' has invalid area {}", row.county, row.area_sq_miles),
                "area_sq_miles",
                Some(&row.county),
            ));
        }
        if areas.insert(key, row.area_sq_miles).is_some() {
            return Err(NetworkError::data_integrity(
                format!("duplicate county area row '{}'", row.county),
                "county",
                Some(&row.county),
            ));
        }
    }
    Ok(areas)
}

fn sort_specialty_standards(mut standards: Vec<SpecialtyStandard>) -> Result<Vec<SpecialtyStandard>> {
    for standard in &mut standards {
        standard.specialty = standard.specialty.trim().to_string();
        if standard.specialty.is_empty() {
            return Err(NetworkError::data_integrity("specialty standard has no specialty", "specialty", None));
        }
        if !(standard.recommended_density.is_finite() && standard.recommended_density >= 0.0) {
            return Err(NetworkError::data_integrity(
                format!(
                    "specialty '{}' has invalid recommended density {}",
                    standard.specialty, standard.recommended_density
                ),
                "recommended_density",
                Some(&standard.specialty),
            ));
        }
    }
    standards.sort_by_key(|s| s.specialty.to_lowercase());
    if let Some(pair) = standards
        .windows(2)
        .find(|pair| pair[0].specialty.eq_ignore_ascii_case(&pair[1].specialty))
    {
        return Err(NetworkError::data_integrity(
            format!("duplicate specialty standard '{}'", pair[1].specialty),
            "specialty",
            Some(&pair[1].specialty),
        ));
    }
    Ok(standards)
}

/// Holder of the current snapshot
pub struct SnapshotStore {
    current: ArcSwap<Snapshot>,
    next_generation: AtomicU64,
    /// Serializes loaders so generations are assigned in swap order; readers never take it
    load_lock: Mutex<()>,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore {
    /// A store serving an empty snapshot
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(Snapshot::empty()),
            next_generation: AtomicU64::new(1),
            load_lock: Mutex::new(()),
        }
    }

    /// A store whose first snapshot is built from `source`
    pub fn with_source(source: SnapshotSource) -> Result<Self> {
        let store = Self::new();
        store.load(source)?;
        Ok(store)
    }

    /// The snapshot queries should read. Hold it for the duration of one query.
    pub fn current(&self) -> SnapshotHandle {
        self.current.load_full()
    }

    /// Validate and index `source`, then atomically replace the current snapshot.
    ///
    /// On failure the previous snapshot stays current and the error is returned.
    pub fn load(&self, source: SnapshotSource) -> Result<SnapshotHandle> {
        let _guard = self.load_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let generation = self.next_generation.load(Ordering::Acquire);
        let (providers, enrollments, counties) = (
            source.providers.len(),
            source.provider_networks.len(),
            source.counties.len(),
        );

        match Snapshot::build(source, generation) {
            Ok(snapshot) => {
                let handle = Arc::new(snapshot);
                self.current.store(Arc::clone(&handle));
                self.next_generation.store(generation + 1, Ordering::Release);
                tracing::info!(
                    generation,
                    providers,
                    enrollments,
                    counties,
                    "snapshot loaded"
                );
                Ok(handle)
            }
            Err(err) => {
                tracing::error!(
                    error = %err,
                    serving_generation = self.current.load().generation(),
                    "snapshot load rejected; previous snapshot remains active"
                );
                Err(err)
            }
        }
    }

    /// Read the fixture files in `dir` and load them
    pub fn load_from_dir<P: AsRef<Path>>(&self, dir: P, config: &EngineConfig) -> Result<SnapshotHandle> {
        let source = match DatasetBuilder::from_directory(dir.as_ref())
            .and_then(|builder| builder.with_config(config).build())
        {
            Ok(source) => source,
            Err(err) => {
                tracing::error!(error = %err, dir = %dir.as_ref().display(), "failed to read snapshot files");
                return Err(err);
            }
        };
        self.load(source)
    }

    /// Run `load` on a background thread while the current snapshot keeps serving
    pub fn spawn_load(self: &Arc<Self>, source: SnapshotSource) -> JoinHandle<Result<SnapshotHandle>> {
        let store = Arc::clone(self);
        std::thread::spawn(move || store.load(source))
    }
}
