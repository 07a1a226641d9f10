/*!
 * Dataset builder: locate and read the source files of one snapshot
 *
 * The builder reads providers, enrollments, county claims and the optional
 * centroid, county area and specialty standard tables into a
 * [`SnapshotSource`], ready for [`SnapshotStore::load`].
 *
 * [`SnapshotStore::load`]: crate::snapshot::SnapshotStore::load
 */

use std::path::{Path, PathBuf};

use crate::config::EngineConfig;
use crate::constants::{
    AREAS_FILE_STEM, CENTROIDS_FILE_STEM, CLAIMS_FILE_STEM, NETWORKS_FILE_STEM, PROVIDERS_FILE_STEM,
    STANDARDS_FILE_STEM,
};
use crate::reader::NetworkReader;
use crate::snapshot::SnapshotSource;
use crate::{NetworkError, Result};

/// Builder for loading the files of one snapshot
///
/// # Example
/// ```no_run
/// # use carenet::dataset::DatasetBuilder;
/// let source = DatasetBuilder::new()
///     .providers("data/providers.json")
///     .provider_networks("data/provider_networks.json")
///     .claims("data/claims.json")
///     .centroids("data/county_centroids.csv")
///     .skip_invalid_records(true)
///     .build()?;
/// # Ok::<(), carenet::NetworkError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct DatasetBuilder {
    providers_path: Option<PathBuf>,
    provider_networks_path: Option<PathBuf>,
    claims_path: Option<PathBuf>,
    centroids_path: Option<PathBuf>,
    areas_path: Option<PathBuf>,
    standards_path: Option<PathBuf>,
    skip_invalid_records: bool,
    show_progress: bool,
}

impl DatasetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn providers<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.providers_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn provider_networks<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.provider_networks_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn claims<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.claims_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn centroids<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.centroids_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn county_areas<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.areas_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn specialty_standards<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.standards_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn skip_invalid_records(mut self, skip: bool) -> Self {
        self.skip_invalid_records = skip;
        self
    }

    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Apply loader settings from the engine configuration
    pub fn with_config(self, config: &EngineConfig) -> Self {
        self.skip_invalid_records(config.skip_invalid_records)
            .show_progress(config.enable_progress_bar)
    }

    /// Read every configured file. Providers and enrollments are required.
    pub fn build(self) -> Result<SnapshotSource> {
        let providers_path = self.providers_path.ok_or_else(|| NetworkError::Custom {
            message: "Providers file path not specified".to_string(),
            suggestion: Some("Use .providers() or place providers.json in the data directory".to_string()),
        })?;
        let networks_path = self.provider_networks_path.ok_or_else(|| NetworkError::Custom {
            message: "Provider networks file path not specified".to_string(),
            suggestion: Some(
                "Use .provider_networks() or place provider_networks.json in the data directory".to_string(),
            ),
        })?;

        #[allow(unused_mut)]
        let mut reader = NetworkReader::new().with_skip_invalid_records(self.skip_invalid_records);
        #[cfg(feature = "progress")]
        {
            reader = reader.with_progress_bar(self.show_progress);
        }

        tracing::debug!(path = %providers_path.display(), "loading providers");
        let providers = reader.load_providers(&providers_path)?;
        tracing::debug!(path = %networks_path.display(), "loading provider networks");
        let provider_networks = reader.load_provider_networks(&networks_path)?;

        let counties = match &self.claims_path {
            Some(path) => reader.load_counties(path)?,
            None => {
                tracing::warn!("no claims file configured; every county will report missing claims data");
                Vec::new()
            }
        };
        let centroids = match &self.centroids_path {
            Some(path) => reader.load_centroids(path)?,
            None => Vec::new(),
        };

        let county_areas = match &self.areas_path {
            Some(path) => reader.load_county_areas(path)?,
            None => Vec::new(),
        };
        let specialty_standards = match &self.standards_path {
            Some(path) => reader.load_specialty_standards(path)?,
            None => Vec::new(),
        };

        Ok(SnapshotSource::new(providers, provider_networks, counties)
            .with_centroids(centroids)
            .with_county_areas(county_areas)
            .with_specialty_standards(specialty_standards))
    }

    /// Discover the standard file names (`.json` preferred over `.csv`) in a directory
    pub fn from_directory<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(NetworkError::Custom {
                message: format!("'{}' is not a directory", dir.display()),
                suggestion: Some("Provide a directory containing providers and provider_networks files".to_string()),
            });
        }

        let mut builder = Self::new();
        if let Some(path) = find_file(dir, PROVIDERS_FILE_STEM) {
            builder = builder.providers(path);
        }
        if let Some(path) = find_file(dir, NETWORKS_FILE_STEM) {
            builder = builder.provider_networks(path);
        }
        if let Some(path) = find_file(dir, CLAIMS_FILE_STEM) {
            builder = builder.claims(path);
        }
        if let Some(path) = find_file(dir, CENTROIDS_FILE_STEM) {
            builder = builder.centroids(path);
        }
        if let Some(path) = find_file(dir, AREAS_FILE_STEM) {
            builder = builder.county_areas(path);
        }
        if let Some(path) = find_file(dir, STANDARDS_FILE_STEM) {
            builder = builder.specialty_standards(path);
        }
        Ok(builder)
    }

    /// Convenience for `from_directory(dir)?.build()`
    pub fn load_standard<P: AsRef<Path>>(dir: P) -> Result<SnapshotSource> {
        Self::from_directory(dir)?.build()
    }
}

fn find_file(dir: &Path, stem: &str) -> Option<PathBuf> {
    ["json", "csv"]
        .iter()
        .map(|ext| dir.join(format!("{}.{}", stem, ext)))
        .find(|path| path.is_file())
}
