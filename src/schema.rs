/*!
 * Schema definitions for the CSV snapshot files
 *
 * Each file has a fixed header row. Readers validate the header before
 * parsing and then address fields by the column positions defined here.
 */

use crate::{NetworkError, Result};

/// Validate a header row against the expected column names
fn validate_columns(expected_columns: &[&str], headers: &[String]) -> Result<()> {
    if headers.len() != expected_columns.len() {
        return Err(NetworkError::schema_mismatch_detailed(
            expected_columns.len(),
            headers.len(),
            None,
        ));
    }

    for (i, (expected, actual)) in expected_columns.iter().zip(headers.iter()).enumerate() {
        if !expected.eq_ignore_ascii_case(actual.trim()) {
            return Err(NetworkError::schema_mismatch_detailed(
                expected_columns.len(),
                headers.len(),
                Some((i, expected.to_string(), actual.clone())),
            ));
        }
    }

    Ok(())
}

/// `providers.csv`
pub struct ProviderSchema;

impl ProviderSchema {
    pub const PROVIDER_ID: usize = 0;
    pub const NPI: usize = 1;
    pub const NAME: usize = 2;
    pub const PROVIDER_TYPE: usize = 3;
    pub const STATUS: usize = 4;
    pub const COUNTY: usize = 5;
    pub const LATITUDE: usize = 6;
    pub const LONGITUDE: usize = 7;

    pub fn column_names() -> &'static [&'static str] {
        &[
            "provider_id",
            "npi",
            "name",
            "provider_type",
            "status",
            "county",
            "latitude",
            "longitude",
        ]
    }

    pub fn validate_headers(headers: &[String]) -> Result<()> {
        validate_columns(Self::column_names(), headers)
    }
}

/// `provider_networks.csv`, one row per enrollment interval
pub struct ProviderNetworkSchema;

impl ProviderNetworkSchema {
    pub const PROVIDER_ID: usize = 0;
    pub const NETWORK_ID: usize = 1;
    pub const EFFECTIVE_DATE: usize = 2;
    pub const TERMINATION_DATE: usize = 3;
    pub const TERMINATION_REASON: usize = 4;

    pub fn column_names() -> &'static [&'static str] {
        &[
            "provider_id",
            "network_id",
            "effective_date",
            "termination_date",
            "termination_reason",
        ]
    }

    pub fn validate_headers(headers: &[String]) -> Result<()> {
        validate_columns(Self::column_names(), headers)
    }
}

/// `claims.csv`; claim and centroid columns may be blank
pub struct ClaimsSchema;

impl ClaimsSchema {
    pub const COUNTY: usize = 0;
    pub const CLAIMS_COUNT: usize = 1;
    pub const AVG_CLAIM_AMOUNT: usize = 2;
    pub const LATITUDE: usize = 3;
    pub const LONGITUDE: usize = 4;

    pub fn column_names() -> &'static [&'static str] {
        &["county", "claims_count", "avg_claim_amount", "latitude", "longitude"]
    }

    pub fn validate_headers(headers: &[String]) -> Result<()> {
        validate_columns(Self::column_names(), headers)
    }
}

/// `county_centroids.csv`
pub struct CentroidSchema;

impl CentroidSchema {
    pub const COUNTY: usize = 0;
    pub const LATITUDE: usize = 1;
    pub const LONGITUDE: usize = 2;

    pub fn column_names() -> &'static [&'static str] {
        &["county", "latitude", "longitude"]
    }

    pub fn validate_headers(headers: &[String]) -> Result<()> {
        validate_columns(Self::column_names(), headers)
    }
}

/// `county_areas.csv`
pub struct CountyAreaSchema;

impl CountyAreaSchema {
    pub const COUNTY: usize = 0;
    pub const AREA_SQ_MILES: usize = 1;

    pub fn column_names() -> &'static [&'static str] {
        &["county", "area_sq_miles"]
    }

    pub fn validate_headers(headers: &[String]) -> Result<()> {
        validate_columns(Self::column_names(), headers)
    }
}

/// `specialty_density_standards.csv`, recommended providers per square mile
pub struct SpecialtyStandardSchema;

impl SpecialtyStandardSchema {
    pub const SPECIALTY: usize = 0;
    pub const RECOMMENDED_DENSITY: usize = 1;

    pub fn column_names() -> &'static [&'static str] {
        &["specialty", "recommended_density"]
    }

    pub fn validate_headers(headers: &[String]) -> Result<()> {
        validate_columns(Self::column_names(), headers)
    }
}
