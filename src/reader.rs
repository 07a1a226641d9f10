/*!
 * Readers for the snapshot source files
 *
 * Providers, enrollments, county claims, centroids, county areas and specialty
 * standards can be stored as JSON arrays or as CSV files with the headers
 * defined in [`crate::schema`]. The format is chosen by file extension.
 * Specialty standards in JSON may also be an object of specialty to density.
 */

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Instant;

use csv::{ReaderBuilder, StringRecord};
use serde::de::DeserializeOwned;
use serde::Deserialize;

#[cfg(feature = "progress")]
use indicatif::{ProgressBar, ProgressStyle};

use crate::data_types::*;
use crate::schema::*;
use crate::{ErrorContext, NetworkError, Result};

/// Maximum number of skipped rows reported individually per file
const MAX_REPORTED_SKIPS: usize = 10;

/// JSON layouts accepted for the specialty standards file
#[derive(Deserialize)]
#[serde(untagged)]
enum StandardsJson {
    Rows(Vec<SpecialtyStandard>),
    BySpecialty(BTreeMap<String, f64>),
}

/// On-disk encoding of a snapshot file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Json,
    Csv,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("json") => Ok(SourceFormat::Json),
            Some("csv") => Ok(SourceFormat::Csv),
            _ => Err(NetworkError::Configuration {
                message: format!("cannot infer file format of {}", path.display()),
                suggestion: Some("Use a .json or .csv extension".to_string()),
            }),
        }
    }
}

/// Reader for provider network source files
pub struct NetworkReader {
    /// Whether to validate CSV headers against the expected schema
    validate_headers: bool,
    /// Whether to skip invalid records (true) or fail on the first one (false)
    skip_invalid_records: bool,
    #[cfg(feature = "progress")]
    show_progress_bar: bool,
}

impl Default for NetworkReader {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkReader {
    pub fn new() -> Self {
        Self {
            validate_headers: true,
            skip_invalid_records: false,
            #[cfg(feature = "progress")]
            show_progress_bar: false,
        }
    }

    pub fn with_header_validation(mut self, validate: bool) -> Self {
        self.validate_headers = validate;
        self
    }

    pub fn with_skip_invalid_records(mut self, skip: bool) -> Self {
        self.skip_invalid_records = skip;
        self
    }

    /// Show a byte progress bar while reading CSV files
    #[cfg(feature = "progress")]
    pub fn with_progress_bar(mut self, show: bool) -> Self {
        self.show_progress_bar = show;
        self
    }

    /// Load providers; NPIs, when present, must be 10 digits
    pub fn load_providers<P: AsRef<Path>>(&self, path: P) -> Result<Vec<Provider>> {
        let path = path.as_ref();
        match SourceFormat::from_path(path)? {
            SourceFormat::Json => {
                let rows: Vec<Provider> = self.read_json(path)?;
                self.retain_valid(path, rows, validate_provider)
            }
            SourceFormat::Csv => self.read_csv(
                path,
                "provider",
                ProviderSchema::validate_headers,
                parse_provider_record,
            ),
        }
    }

    /// Load enrollment intervals
    pub fn load_provider_networks<P: AsRef<Path>>(&self, path: P) -> Result<Vec<ProviderNetwork>> {
        let path = path.as_ref();
        match SourceFormat::from_path(path)? {
            SourceFormat::Json => self.read_json(path),
            SourceFormat::Csv => self.read_csv(
                path,
                "enrollment",
                ProviderNetworkSchema::validate_headers,
                parse_network_record,
            ),
        }
    }

    /// Load the county claims feed
    pub fn load_counties<P: AsRef<Path>>(&self, path: P) -> Result<Vec<CountyRecord>> {
        let path = path.as_ref();
        match SourceFormat::from_path(path)? {
            SourceFormat::Json => self.read_json(path),
            SourceFormat::Csv => self.read_csv(
                path,
                "county",
                ClaimsSchema::validate_headers,
                parse_claims_record,
            ),
        }
    }

    /// Load the county centroid reference table
    pub fn load_centroids<P: AsRef<Path>>(&self, path: P) -> Result<Vec<CountyCentroid>> {
        let path = path.as_ref();
        match SourceFormat::from_path(path)? {
            SourceFormat::Json => self.read_json(path),
            SourceFormat::Csv => self.read_csv(
                path,
                "centroid",
                CentroidSchema::validate_headers,
                parse_centroid_record,
            ),
        }
    }

    /// Load the county land-area table
    pub fn load_county_areas<P: AsRef<Path>>(&self, path: P) -> Result<Vec<CountyArea>> {
        let path = path.as_ref();
        match SourceFormat::from_path(path)? {
            SourceFormat::Json => self.read_json(path),
            SourceFormat::Csv => self.read_csv(
                path,
                "county area",
                CountyAreaSchema::validate_headers,
                parse_area_record,
            ),
        }
    }

    /// Load recommended densities per specialty
    pub fn load_specialty_standards<P: AsRef<Path>>(&self, path: P) -> Result<Vec<SpecialtyStandard>> {
        let path = path.as_ref();
        match SourceFormat::from_path(path)? {
            SourceFormat::Json => {
                let standards = match self.read_json_value::<StandardsJson>(path)? {
                    StandardsJson::Rows(rows) => rows,
                    StandardsJson::BySpecialty(map) => map
                        .into_iter()
                        .map(|(specialty, recommended_density)| SpecialtyStandard {
                            specialty,
                            recommended_density,
                        })
                        .collect(),
                };
                tracing::info!(file = %path.display(), records = standards.len(), "loaded specialty standards");
                Ok(standards)
            }
            SourceFormat::Csv => self.read_csv(
                path,
                "specialty standard",
                SpecialtyStandardSchema::validate_headers,
                parse_standard_record,
            ),
        }
    }

    fn read_json_value<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        if !path.exists() {
            return Err(NetworkError::file_not_found(path.to_path_buf()));
        }
        let file = File::open(path).map_err(|e| NetworkError::from(e).with_file(path.to_path_buf()))?;
        serde_json::from_reader(BufReader::new(file)).map_err(|e| NetworkError::from(e).with_file(path.to_path_buf()))
    }

    fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<Vec<T>> {
        if !path.exists() {
            return Err(NetworkError::file_not_found(path.to_path_buf()));
        }
        let start_time = Instant::now();
        let rows: Vec<T> = self.read_json_value(path)?;
        tracing::info!(
            file = %path.display(),
            records = rows.len(),
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "loaded JSON records"
        );
        Ok(rows)
    }

    /// Apply a row validator to already decoded rows
    fn retain_valid<T>(&self, path: &Path, rows: Vec<T>, validate: fn(&T) -> Result<()>) -> Result<Vec<T>> {
        let mut kept = Vec::with_capacity(rows.len());
        let mut invalid_count = 0;
        for (idx, row) in rows.into_iter().enumerate() {
            match validate(&row) {
                Ok(()) => kept.push(row),
                Err(e) if self.skip_invalid_records => {
                    invalid_count += 1;
                    if invalid_count <= MAX_REPORTED_SKIPS {
                        tracing::warn!(file = %path.display(), index = idx, error = %e, "skipping invalid record");
                    }
                }
                Err(e) => return Err(e.with_file(path.to_path_buf())),
            }
        }
        if invalid_count > 0 {
            tracing::warn!(file = %path.display(), skipped = invalid_count, "skipped invalid records");
        }
        Ok(kept)
    }

    fn read_csv<T>(
        &self,
        path: &Path,
        label: &str,
        validate_headers: fn(&[String]) -> Result<()>,
        parse: fn(&StringRecord, usize) -> Result<T>,
    ) -> Result<Vec<T>> {
        if !path.exists() {
            return Err(NetworkError::file_not_found(path.to_path_buf()));
        }

        let file = File::open(path)?;
        #[cfg(feature = "progress")]
        let file_size = file.metadata()?.len();

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(file);

        if self.validate_headers {
            let headers: Vec<String> = reader.headers()?.iter().map(|s| s.to_string()).collect();
            validate_headers(&headers)?;
        }

        #[cfg(feature = "progress")]
        let progress_bar = if self.show_progress_bar {
            let pb = ProgressBar::new(file_size);
            let style = ProgressStyle::with_template(
                "[{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
            )
            .map(|s| s.progress_chars("#>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
            pb.set_style(style);
            pb.set_message(format!("{} records", label));
            Some(pb)
        } else {
            None
        };

        let mut records = Vec::new();
        let mut invalid_count = 0;
        let start_time = Instant::now();

        for (idx, result) in reader.records().enumerate() {
            // +2 for the header row and the 0-based index
            let line_number = idx + 2;
            let parsed = match result {
                Ok(csv_record) => {
                    #[cfg(feature = "progress")]
                    if let Some(ref pb) = progress_bar {
                        pb.set_position(csv_record.position().map_or(0, |p| p.byte()));
                    }
                    parse(&csv_record, line_number)
                }
                Err(e) => Err(NetworkError::CsvParse {
                    message: e.to_string(),
                    line: Some(line_number),
                    column: None,
                    context: ErrorContext {
                        file_path: Some(path.to_path_buf()),
                        line_number: Some(line_number),
                        ..Default::default()
                    },
                }),
            };

            match parsed {
                Ok(record) => records.push(record),
                Err(e) if self.skip_invalid_records => {
                    invalid_count += 1;
                    if invalid_count <= MAX_REPORTED_SKIPS {
                        tracing::warn!(file = %path.display(), line = line_number, error = %e, "skipping invalid {} record", label);
                    }
                }
                Err(e) => return Err(e.with_file(path.to_path_buf())),
            }
        }

        #[cfg(feature = "progress")]
        if let Some(pb) = progress_bar {
            pb.finish_with_message(format!("{} {} records", records.len(), label));
        }

        tracing::info!(
            file = %path.display(),
            records = records.len(),
            skipped = invalid_count,
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "loaded {} records",
            label
        );

        Ok(records)
    }
}

fn missing_field(field_name: &str, line_number: usize) -> NetworkError {
    NetworkError::DataIntegrity {
        message: format!("Missing required field: {}", field_name),
        field: Some(field_name.to_string()),
        value: None,
        context: ErrorContext {
            line_number: Some(line_number),
            ..Default::default()
        },
    }
}

fn get_field(record: &StringRecord, index: usize) -> Option<&str> {
    record.get(index).map(str::trim).filter(|s| !s.is_empty())
}

fn get_required<'r>(record: &'r StringRecord, index: usize, field_name: &str, line_number: usize) -> Result<&'r str> {
    get_field(record, index).ok_or_else(|| missing_field(field_name, line_number))
}

fn parse_number<T: std::str::FromStr>(value: &str, field_name: &str) -> Result<T> {
    value.parse::<T>().map_err(|_| {
        NetworkError::data_integrity(
            format!("'{}' is not a valid {}", value, field_name),
            field_name,
            Some(value),
        )
    })
}

fn validate_provider(provider: &Provider) -> Result<()> {
    ProviderId::new(provider.provider_id.as_str())?;
    if let Some(npi) = &provider.npi {
        Npi::new(npi.as_str().to_string())?;
    }
    if provider.county.trim().is_empty() {
        return Err(NetworkError::data_integrity(
            format!("provider '{}' has no county", provider.provider_id),
            "county",
            Some(provider.provider_id.as_str()),
        ));
    }
    Ok(())
}

fn parse_provider_record(record: &StringRecord, line_number: usize) -> Result<Provider> {
    let provider_id = ProviderId::new(get_required(record, ProviderSchema::PROVIDER_ID, "provider_id", line_number)?)?;
    let npi = get_field(record, ProviderSchema::NPI)
        .map(|s| Npi::new(s.to_string()))
        .transpose()?;
    let status = match get_field(record, ProviderSchema::STATUS) {
        Some(code) => ProviderStatus::from_code(code)
            .ok_or_else(|| NetworkError::data_integrity(format!("unknown status '{}'", code), "status", Some(code)))?,
        None => ProviderStatus::default(),
    };

    Ok(Provider {
        provider_id,
        npi,
        name: get_field(record, ProviderSchema::NAME).unwrap_or_default().to_string(),
        provider_type: get_required(record, ProviderSchema::PROVIDER_TYPE, "provider_type", line_number)?.to_string(),
        status,
        county: get_required(record, ProviderSchema::COUNTY, "county", line_number)?.to_string(),
        latitude: parse_number(get_required(record, ProviderSchema::LATITUDE, "latitude", line_number)?, "latitude")?,
        longitude: parse_number(get_required(record, ProviderSchema::LONGITUDE, "longitude", line_number)?, "longitude")?,
    })
}

fn parse_network_record(record: &StringRecord, line_number: usize) -> Result<ProviderNetwork> {
    let provider_id = ProviderId::new(get_required(record, ProviderNetworkSchema::PROVIDER_ID, "provider_id", line_number)?)?;
    let network_code = get_required(record, ProviderNetworkSchema::NETWORK_ID, "network_id", line_number)?;
    let network_id = NetworkId::from_code(network_code).ok_or_else(|| {
        NetworkError::data_integrity(format!("unknown network '{}'", network_code), "network_id", Some(network_code))
    })?;

    Ok(ProviderNetwork {
        provider_id,
        network_id,
        effective_date: parse_timestamp(get_required(
            record,
            ProviderNetworkSchema::EFFECTIVE_DATE,
            "effective_date",
            line_number,
        )?)?,
        termination_date: parse_termination(get_field(record, ProviderNetworkSchema::TERMINATION_DATE).unwrap_or(""))?,
        termination_reason: get_field(record, ProviderNetworkSchema::TERMINATION_REASON)
            .unwrap_or_default()
            .to_string(),
    })
}

fn parse_claims_record(record: &StringRecord, line_number: usize) -> Result<CountyRecord> {
    let optional_number = |index: usize, field_name: &str| -> Result<Option<f64>> {
        get_field(record, index).map(|s| parse_number(s, field_name)).transpose()
    };

    Ok(CountyRecord {
        county: get_required(record, ClaimsSchema::COUNTY, "county", line_number)?.to_string(),
        claims_count: get_field(record, ClaimsSchema::CLAIMS_COUNT)
            .map(|s| parse_number(s, "claims_count"))
            .transpose()?,
        avg_claim_amount: optional_number(ClaimsSchema::AVG_CLAIM_AMOUNT, "avg_claim_amount")?,
        latitude: optional_number(ClaimsSchema::LATITUDE, "latitude")?,
        longitude: optional_number(ClaimsSchema::LONGITUDE, "longitude")?,
    })
}

fn parse_centroid_record(record: &StringRecord, line_number: usize) -> Result<CountyCentroid> {
    Ok(CountyCentroid {
        county: get_required(record, CentroidSchema::COUNTY, "county", line_number)?.to_string(),
        latitude: parse_number(get_required(record, CentroidSchema::LATITUDE, "latitude", line_number)?, "latitude")?,
        longitude: parse_number(get_required(record, CentroidSchema::LONGITUDE, "longitude", line_number)?, "longitude")?,
    })
}

fn parse_area_record(record: &StringRecord, line_number: usize) -> Result<CountyArea> {
    Ok(CountyArea {
        county: get_required(record, CountyAreaSchema::COUNTY, "county", line_number)?.to_string(),
        area_sq_miles: parse_number(
            get_required(record, CountyAreaSchema::AREA_SQ_MILES, "area_sq_miles", line_number)?,
            "area_sq_miles",
        )?,
    })
}

fn parse_standard_record(record: &StringRecord, line_number: usize) -> Result<SpecialtyStandard> {
    Ok(SpecialtyStandard {
        specialty: get_required(record, SpecialtyStandardSchema::SPECIALTY, "specialty", line_number)?.to_string(),
        recommended_density: parse_number(
            get_required(
                record,
                SpecialtyStandardSchema::RECOMMENDED_DENSITY,
                "recommended_density",
                line_number,
            )?,
            "recommended_density",
        )?,
    })
}
