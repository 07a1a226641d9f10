/*!
 * Report and snapshot export
 *
 * County metrics can be written as JSON or CSV through [`ReportExporter`].
 * Enrollment rows are always written in the interchange layout, with
 * open-ended terminations restored to the sentinel timestamp.
 */

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::SecondsFormat;
use serde::Serialize;

use crate::aggregate::CountyMetrics;
use crate::constants::*;
use crate::data_types::*;
use crate::schema::*;
use crate::snapshot::SnapshotSource;
use crate::{ExportFormat, NetworkError, Result};

/// Writes county reports and enrollment rows in one format
pub trait ReportExporter {
    /// Export county metrics, ordered by county
    fn export_metrics(&self, metrics: &BTreeMap<String, CountyMetrics>, writer: &mut dyn Write) -> Result<()>;

    /// Export enrollment rows in the interchange layout
    fn export_provider_networks(&self, rows: &[ProviderNetwork], writer: &mut dyn Write) -> Result<()>;

    fn format(&self) -> ExportFormat;

    /// Export county metrics to a file
    fn export_metrics_to_path(&self, metrics: &BTreeMap<String, CountyMetrics>, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.export_metrics(metrics, &mut writer)?;
        writer.flush()?;
        Ok(())
    }
}

/// Exporter for a configured format
pub fn exporter_for(format: ExportFormat) -> Box<dyn ReportExporter> {
    match format {
        ExportFormat::Json => Box::new(JsonExporter::new()),
        ExportFormat::Csv => Box::new(CsvExporter::new()),
    }
}

/// JSON exporter
pub struct JsonExporter {
    /// Whether to pretty-print the JSON
    pub pretty_print: bool,
    /// One record per line instead of a single array
    pub json_lines: bool,
}

impl Default for JsonExporter {
    fn default() -> Self {
        Self {
            pretty_print: true,
            json_lines: false,
        }
    }
}

impl JsonExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pretty_print(mut self, pretty: bool) -> Self {
        self.pretty_print = pretty;
        self
    }

    pub fn as_json_lines(mut self) -> Self {
        self.json_lines = true;
        self.pretty_print = false;
        self
    }

    fn write_all<T: Serialize>(&self, rows: &[T], writer: &mut dyn Write) -> Result<()> {
        if self.json_lines {
            for row in rows {
                serde_json::to_writer(&mut *writer, row)?;
                writeln!(writer)?;
            }
        } else if self.pretty_print {
            serde_json::to_writer_pretty(&mut *writer, rows)?;
        } else {
            serde_json::to_writer(&mut *writer, rows)?;
        }
        Ok(())
    }
}

impl ReportExporter for JsonExporter {
    fn export_metrics(&self, metrics: &BTreeMap<String, CountyMetrics>, writer: &mut dyn Write) -> Result<()> {
        let rows: Vec<&CountyMetrics> = metrics.values().collect();
        self.write_all(&rows, writer)
    }

    fn export_provider_networks(&self, rows: &[ProviderNetwork], writer: &mut dyn Write) -> Result<()> {
        self.write_all(rows, writer)
    }

    fn format(&self) -> ExportFormat {
        ExportFormat::Json
    }
}

/// CSV exporter
pub struct CsvExporter {
    pub include_headers: bool,
    pub delimiter: u8,
}

impl Default for CsvExporter {
    fn default() -> Self {
        Self {
            include_headers: true,
            delimiter: b',',
        }
    }
}

impl CsvExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_headers(mut self, include: bool) -> Self {
        self.include_headers = include;
        self
    }

    fn writer<'w>(&self, writer: &'w mut dyn Write) -> csv::Writer<&'w mut dyn Write> {
        csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(false)
            .from_writer(writer)
    }
}

/// Flat CSV row for county metrics
#[derive(Serialize)]
struct MetricsRow<'a> {
    county: &'a str,
    provider_count: usize,
    claims_count: u64,
    avg_claim_amount: Option<f64>,
    claims_reported: bool,
    density: &'static str,
    claims_per_provider: Option<u64>,
    area_sq_miles: Option<f64>,
    providers_per_sq_mile: Option<f64>,
    provider_spacing_miles: Option<f64>,
    spacing_basis: Option<&'static str>,
}

const METRICS_HEADER: [&str; 11] = [
    "county",
    "provider_count",
    "claims_count",
    "avg_claim_amount",
    "claims_reported",
    "density",
    "claims_per_provider",
    "area_sq_miles",
    "providers_per_sq_mile",
    "provider_spacing_miles",
    "spacing_basis",
];

impl ReportExporter for CsvExporter {
    fn export_metrics(&self, metrics: &BTreeMap<String, CountyMetrics>, writer: &mut dyn Write) -> Result<()> {
        let mut csv_writer = self.writer(writer);
        if self.include_headers {
            csv_writer.write_record(METRICS_HEADER)?;
        }
        for m in metrics.values() {
            csv_writer.serialize(MetricsRow {
                county: &m.county,
                provider_count: m.provider_count,
                claims_count: m.claims_count,
                avg_claim_amount: m.avg_claim_amount,
                claims_reported: m.claims_reported,
                density: m.density.as_str(),
                claims_per_provider: m.claims_per_provider,
                area_sq_miles: m.area_sq_miles,
                providers_per_sq_mile: m.providers_per_sq_mile,
                provider_spacing_miles: m.provider_spacing_miles,
                spacing_basis: m.spacing_basis.map(|b| b.as_str()),
            })?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    fn export_provider_networks(&self, rows: &[ProviderNetwork], writer: &mut dyn Write) -> Result<()> {
        let mut csv_writer = self.writer(writer);
        if self.include_headers {
            csv_writer.write_record(ProviderNetworkSchema::column_names())?;
        }
        for row in rows {
            let effective = format_timestamp(&row.effective_date);
            let termination = row
                .termination_date
                .as_ref()
                .map(format_timestamp)
                .unwrap_or_else(|| OPEN_ENDED_SENTINEL.to_string());
            csv_writer.write_record([
                row.provider_id.as_str(),
                row.network_id.as_code(),
                effective.as_str(),
                termination.as_str(),
                row.termination_reason.as_str(),
            ])?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    fn format(&self) -> ExportFormat {
        ExportFormat::Csv
    }
}

fn format_timestamp(ts: &chrono::DateTime<chrono::Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Write a snapshot source as a data directory readable by
/// [`DatasetBuilder::from_directory`](crate::dataset::DatasetBuilder::from_directory)
pub fn write_source_files(dir: &Path, source: &SnapshotSource, format: ExportFormat) -> Result<()> {
    fs::create_dir_all(dir)?;
    let ext = match format {
        ExportFormat::Json => "json",
        ExportFormat::Csv => "csv",
    };
    let path_for = |stem: &str| dir.join(format!("{}.{}", stem, ext));

    match format {
        ExportFormat::Json => {
            let json = JsonExporter::new();
            write_file(&path_for(PROVIDERS_FILE_STEM), |w| json.write_all(&source.providers, w))?;
            write_file(&path_for(NETWORKS_FILE_STEM), |w| {
                json.export_provider_networks(&source.provider_networks, w)
            })?;
            write_file(&path_for(CLAIMS_FILE_STEM), |w| json.write_all(&source.counties, w))?;
            if !source.county_areas.is_empty() {
                write_file(&path_for(AREAS_FILE_STEM), |w| json.write_all(&source.county_areas, w))?;
            }
            if !source.specialty_standards.is_empty() {
                write_file(&path_for(STANDARDS_FILE_STEM), |w| {
                    json.write_all(&source.specialty_standards, w)
                })?;
            }
        }
        ExportFormat::Csv => {
            let csv = CsvExporter::new();
            write_file(&path_for(PROVIDERS_FILE_STEM), |w| write_providers_csv(&source.providers, w))?;
            write_file(&path_for(NETWORKS_FILE_STEM), |w| {
                csv.export_provider_networks(&source.provider_networks, w)
            })?;
            write_file(&path_for(CLAIMS_FILE_STEM), |w| write_claims_csv(&source.counties, w))?;
            if !source.county_areas.is_empty() {
                write_file(&path_for(AREAS_FILE_STEM), |w| {
                    write_pairs_csv(
                        CountyAreaSchema::column_names(),
                        source.county_areas.iter().map(|a| (a.county.as_str(), a.area_sq_miles)),
                        w,
                    )
                })?;
            }
            if !source.specialty_standards.is_empty() {
                write_file(&path_for(STANDARDS_FILE_STEM), |w| {
                    write_pairs_csv(
                        SpecialtyStandardSchema::column_names(),
                        source
                            .specialty_standards
                            .iter()
                            .map(|s| (s.specialty.as_str(), s.recommended_density)),
                        w,
                    )
                })?;
            }
        }
    }

    if !source.centroids.is_empty() {
        write_file(&dir.join(format!("{}.csv", CENTROIDS_FILE_STEM)), |w| {
            let mut csv_writer = csv::Writer::from_writer(w);
            csv_writer.write_record(CentroidSchema::column_names())?;
            for c in &source.centroids {
                csv_writer.write_record([c.county.clone(), c.latitude.to_string(), c.longitude.to_string()])?;
            }
            csv_writer.flush()?;
            Ok(())
        })?;
    }

    tracing::info!(
        dir = %dir.display(),
        %format,
        providers = source.providers.len(),
        enrollments = source.provider_networks.len(),
        "wrote snapshot files"
    );
    Ok(())
}

fn write_file<F>(path: &Path, body: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    let file = File::create(path).map_err(|e| NetworkError::from(e).with_file(path.to_path_buf()))?;
    let mut writer = BufWriter::new(file);
    body(&mut writer).map_err(|e| match e {
        NetworkError::Io { .. } | NetworkError::Json { .. } | NetworkError::CsvParse { .. } => {
            NetworkError::Export {
                message: format!("failed to write {}: {}", path.display(), e),
                format: ExportFormat::default(),
                suggestion: None,
            }
        }
        other => other,
    })?;
    writer.flush()?;
    Ok(())
}

fn write_providers_csv(providers: &[Provider], writer: &mut dyn Write) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(ProviderSchema::column_names())?;
    for p in providers {
        csv_writer.write_record([
            p.provider_id.to_string(),
            p.npi.as_ref().map(Npi::to_string).unwrap_or_default(),
            p.name.clone(),
            p.provider_type.clone(),
            p.status.as_code().to_string(),
            p.county.clone(),
            p.latitude.to_string(),
            p.longitude.to_string(),
        ])?;
    }
    csv_writer.flush()?;
    Ok(())
}

fn write_claims_csv(counties: &[CountyRecord], writer: &mut dyn Write) -> Result<()> {
    let opt = |v: Option<String>| v.unwrap_or_default();
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(ClaimsSchema::column_names())?;
    for c in counties {
        csv_writer.write_record([
            c.county.clone(),
            opt(c.claims_count.map(|v| v.to_string())),
            opt(c.avg_claim_amount.map(|v| v.to_string())),
            opt(c.latitude.map(|v| v.to_string())),
            opt(c.longitude.map(|v| v.to_string())),
        ])?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Two-column name and value tables
fn write_pairs_csv<'r>(
    header: &[&str],
    rows: impl Iterator<Item = (&'r str, f64)>,
    writer: &mut dyn Write,
) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(header)?;
    for (name, value) in rows {
        csv_writer.write_record([name.to_string(), value.to_string()])?;
    }
    csv_writer.flush()?;
    Ok(())
}
