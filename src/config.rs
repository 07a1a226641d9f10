/*!
 * Configuration support for the analytics engine
 *
 * Settings come from a TOML file, `CARENET_*` environment variables, or the
 * built-in defaults, in that order of precedence when using [`EngineConfig::load`].
 */

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_RADIUS_MILES;
use crate::data_types::parse_timestamp;
use crate::{ExportFormat, NetworkError, Result};

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory holding providers, provider_networks, claims and centroid files
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Whether to show progress bars while reading files
    #[serde(default = "default_enable_progress_bar")]
    pub enable_progress_bar: bool,

    /// Number of threads for parallel queries (None = use all available)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_threads: Option<usize>,

    /// Skip malformed rows with a warning instead of failing the load
    #[serde(default)]
    pub skip_invalid_records: bool,

    /// Radius used when a radius search omits one
    #[serde(default = "default_radius_miles")]
    pub default_radius_miles: f64,

    /// Fixed reference time for queries (None = wall clock)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_date: Option<DateTime<Utc>>,

    /// `tracing` filter directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    #[serde(default)]
    pub default_export_format: ExportFormat,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            enable_progress_bar: default_enable_progress_bar(),
            parallel_threads: None,
            skip_invalid_records: false,
            default_radius_miles: default_radius_miles(),
            reference_date: None,
            log_filter: default_log_filter(),
            default_export_format: ExportFormat::Json,
        }
    }
}

// Default value functions for serde
fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_enable_progress_bar() -> bool {
    true
}

fn default_radius_miles() -> f64 {
    DEFAULT_RADIUS_MILES
}

fn default_log_filter() -> String {
    "carenet=info".to_string()
}

fn parse_flag(val: &str) -> bool {
    matches!(val.trim().to_lowercase().as_str(), "true" | "1" | "yes")
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables
    ///
    /// Supported environment variables:
    /// - `CARENET_DATA_DIR`: directory path
    /// - `CARENET_PROGRESS_BAR`: "true" or "false"
    /// - `CARENET_PARALLEL_THREADS`: number or "auto"
    /// - `CARENET_SKIP_INVALID`: "true" or "false"
    /// - `CARENET_DEFAULT_RADIUS`: miles
    /// - `CARENET_REFERENCE_DATE`: RFC 3339 timestamp or YYYY-MM-DD
    /// - `CARENET_LOG`: tracing filter directive
    /// - `CARENET_EXPORT_FORMAT`: "json" or "csv"
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Apply `CARENET_*` overrides read through `lookup`; unparsable values are ignored
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("CARENET_DATA_DIR") {
            self.data_dir = PathBuf::from(val);
        }

        if let Some(val) = lookup("CARENET_PROGRESS_BAR") {
            self.enable_progress_bar = parse_flag(&val);
        }

        if let Some(val) = lookup("CARENET_PARALLEL_THREADS") {
            self.parallel_threads = match val.to_lowercase().as_str() {
                "auto" | "0" => None,
                num => num.parse().ok(),
            };
        }

        if let Some(val) = lookup("CARENET_SKIP_INVALID") {
            self.skip_invalid_records = parse_flag(&val);
        }

        if let Some(val) = lookup("CARENET_DEFAULT_RADIUS") {
            if let Ok(radius) = val.trim().parse::<f64>() {
                self.default_radius_miles = radius;
            }
        }

        if let Some(val) = lookup("CARENET_REFERENCE_DATE") {
            match parse_timestamp(&val) {
                Ok(ts) => self.reference_date = Some(ts),
                Err(e) => tracing::warn!(value = %val, error = %e, "ignoring CARENET_REFERENCE_DATE"),
            }
        }

        if let Some(val) = lookup("CARENET_LOG") {
            self.log_filter = val;
        }

        if let Some(val) = lookup("CARENET_EXPORT_FORMAT") {
            match val.to_lowercase().as_str() {
                "json" => self.default_export_format = ExportFormat::Json,
                "csv" => self.default_export_format = ExportFormat::Csv,
                _ => {}
            }
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&contents).map_err(|e| NetworkError::Configuration {
            message: format!("Failed to parse config file: {}", e),
            suggestion: Some("Check that the file is valid TOML format".to_string()),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self).map_err(|e| NetworkError::Configuration {
            message: format!("Failed to serialize config: {}", e),
            suggestion: None,
        })?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// `~/.config/carenet/config.toml` on Unix-like systems
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "carenet").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load from the default config file if present, then apply environment overrides
    pub fn load() -> Self {
        let mut config = Self::default_config_path()
            .filter(|path| path.exists())
            .and_then(|path| match Self::from_file(&path) {
                Ok(config) => Some(config),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable config file");
                    None
                }
            })
            .unwrap_or_default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Reject settings no query could run with
    pub fn validate(&self) -> Result<()> {
        if !self.default_radius_miles.is_finite() || self.default_radius_miles <= 0.0 {
            return Err(NetworkError::Configuration {
                message: format!("default_radius_miles must be positive, got {}", self.default_radius_miles),
                suggestion: Some(format!("Use the default of {}", DEFAULT_RADIUS_MILES)),
            });
        }
        if self.parallel_threads == Some(0) {
            return Err(NetworkError::Configuration {
                message: "parallel_threads cannot be 0".to_string(),
                suggestion: Some("Omit parallel_threads to use every core".to_string()),
            });
        }
        Ok(())
    }

    /// The configured reference time, or now
    pub fn reference_time(&self) -> DateTime<Utc> {
        self.reference_date.unwrap_or_else(Utc::now)
    }

    /// Size the global rayon pool; only the first call in a process takes effect
    #[cfg(feature = "parallel")]
    pub fn install_thread_pool(&self) {
        if let Some(threads) = self.parallel_threads {
            if let Err(e) = rayon::ThreadPoolBuilder::new().num_threads(threads).build_global() {
                tracing::debug!(error = %e, "rayon pool already initialised");
            }
        }
    }

    /// Every malformed row fails the load
    pub fn strict() -> Self {
        Self {
            enable_progress_bar: true,
            parallel_threads: Some(1),
            skip_invalid_records: false,
            ..Self::default()
        }
    }

    /// Quiet loading that skips malformed rows and uses every core
    pub fn performance() -> Self {
        Self {
            enable_progress_bar: false,
            parallel_threads: None,
            skip_invalid_records: true,
            log_filter: "carenet=warn".to_string(),
            ..Self::default()
        }
    }
}

lazy_static::lazy_static! {
    static ref GLOBAL_CONFIG: RwLock<Option<EngineConfig>> = RwLock::new(None);
}

/// Set the global configuration
pub fn set_global_config(config: EngineConfig) {
    *GLOBAL_CONFIG.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(config);
}

/// Get the global configuration (or the loaded default if not set)
pub fn global_config() -> EngineConfig {
    GLOBAL_CONFIG
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .as_ref()
        .cloned()
        .unwrap_or_else(EngineConfig::load)
}

/// Clear the global configuration
pub fn clear_global_config() {
    *GLOBAL_CONFIG.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
}

/// Builder for customizing configuration
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: EngineConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.config.data_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn progress_bar(mut self, enabled: bool) -> Self {
        self.config.enable_progress_bar = enabled;
        self
    }

    pub fn parallel_threads(mut self, threads: Option<usize>) -> Self {
        self.config.parallel_threads = threads;
        self
    }

    pub fn skip_invalid_records(mut self, skip: bool) -> Self {
        self.config.skip_invalid_records = skip;
        self
    }

    pub fn default_radius_miles(mut self, radius: f64) -> Self {
        self.config.default_radius_miles = radius;
        self
    }

    pub fn reference_date(mut self, at: DateTime<Utc>) -> Self {
        self.config.reference_date = Some(at);
        self
    }

    pub fn log_filter(mut self, filter: impl Into<String>) -> Self {
        self.config.log_filter = filter.into();
        self
    }

    pub fn export_format(mut self, format: ExportFormat) -> Self {
        self.config.default_export_format = format;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<EngineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_config_defaults() {
        let config = EngineConfig::default();
        assert!(config.enable_progress_bar);
        assert_eq!(config.default_radius_miles, 25.0);
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert!(config.reference_date.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .progress_bar(false)
            .parallel_threads(Some(4))
            .skip_invalid_records(true)
            .default_radius_miles(40.0)
            .export_format(ExportFormat::Csv)
            .build()
            .unwrap();

        assert!(!config.enable_progress_bar);
        assert_eq!(config.parallel_threads, Some(4));
        assert!(config.skip_invalid_records);
        assert_eq!(config.default_radius_miles, 40.0);
        assert_eq!(config.default_export_format, ExportFormat::Csv);

        assert!(ConfigBuilder::new().default_radius_miles(0.0).build().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("CARENET_DATA_DIR", "/srv/carenet"),
            ("CARENET_PROGRESS_BAR", "false"),
            ("CARENET_PARALLEL_THREADS", "auto"),
            ("CARENET_DEFAULT_RADIUS", "not-a-number"),
            ("CARENET_REFERENCE_DATE", "2024-01-01"),
            ("CARENET_EXPORT_FORMAT", "CSV"),
        ]
        .into_iter()
        .collect();

        let mut config = EngineConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.data_dir, PathBuf::from("/srv/carenet"));
        assert!(!config.enable_progress_bar);
        assert_eq!(config.parallel_threads, None);
        assert_eq!(config.default_radius_miles, 25.0);
        assert_eq!(config.reference_date, Some(parse_timestamp("2024-01-01").unwrap()));
        assert_eq!(config.default_export_format, ExportFormat::Csv);
    }

    #[test]
    fn test_toml_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let config = EngineConfig::strict();
        config.save(&path).unwrap();
        assert_eq!(EngineConfig::from_file(&path).unwrap(), config);
    }
}
