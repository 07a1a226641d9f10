/*!
 * Data type definitions for provider network records
 *
 * Providers, network enrollments and county rows as they are loaded into a
 * snapshot. The interchange format's far-future termination sentinel is
 * translated here, at the boundary, into an absent termination bound.
 */

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::constants::OPEN_ENDED_SENTINEL;
use crate::geo::GeoPoint;
use crate::{NetworkError, Result};

/// Unique provider identifier (e.g. `P0042`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(pub String);

impl ProviderId {
    /// Create a provider id, rejecting blank values
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(NetworkError::data_integrity(
                "provider_id cannot be empty",
                "provider_id",
                None,
            ));
        }
        Ok(ProviderId(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(id: &str) -> Self {
        ProviderId(id.to_string())
    }
}

/// NPI (National Provider Identifier) - 10 digit identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Npi(pub String);

impl Npi {
    /// Create a new NPI, validating format
    pub fn new(npi: String) -> Result<Self> {
        if npi.len() != 10 || !npi.chars().all(|c| c.is_ascii_digit()) {
            return Err(NetworkError::data_integrity(
                format!("NPI must be exactly 10 digits, found '{}'", npi),
                "npi",
                Some(&npi),
            ));
        }
        Ok(Npi(npi))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Npi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Payer network a provider can be enrolled in
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[non_exhaustive]
pub enum NetworkId {
    Commercial,
    Medicare,
    Tricare,
}

impl NetworkId {
    /// Every known network, in display order
    pub const ALL: [NetworkId; 3] = [NetworkId::Commercial, NetworkId::Medicare, NetworkId::Tricare];

    /// Parse a network code, ignoring case and surrounding whitespace
    pub fn from_code(code: &str) -> Option<Self> {
        let code = code.trim();
        Self::ALL.iter().copied().find(|n| n.as_code().eq_ignore_ascii_case(code))
    }

    /// Parse a network id supplied as a query parameter
    pub fn parse_param(code: &str) -> Result<Self> {
        Self::from_code(code).ok_or_else(|| NetworkError::unknown_network(code))
    }

    pub fn as_code(&self) -> &'static str {
        match self {
            NetworkId::Commercial => "Commercial",
            NetworkId::Medicare => "Medicare",
            NetworkId::Tricare => "Tricare",
        }
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_code())
    }
}

impl FromStr for NetworkId {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_param(s)
    }
}

impl Serialize for NetworkId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_code())
    }
}

impl<'de> Deserialize<'de> for NetworkId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let code = String::deserialize(deserializer)?;
        NetworkId::from_code(&code)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown network '{}'", code)))
    }
}

/// Provider status as recorded independently of network participation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ProviderStatus {
    #[default]
    Active,
    Terminated,
}

impl ProviderStatus {
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_lowercase().as_str() {
            "active" | "a" | "true" => Some(ProviderStatus::Active),
            "terminated" | "inactive" | "t" | "false" => Some(ProviderStatus::Terminated),
            _ => None,
        }
    }

    pub fn as_code(&self) -> &'static str {
        match self {
            ProviderStatus::Active => "Active",
            ProviderStatus::Terminated => "Terminated",
        }
    }
}

/// A healthcare provider. Immutable once loaded into a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub provider_id: ProviderId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub npi: Option<Npi>,
    #[serde(default)]
    pub name: String,
    /// Specialty, e.g. "Cardiology"
    pub provider_type: String,
    #[serde(default)]
    pub status: ProviderStatus,
    pub county: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Provider {
    /// Geocoordinate of the provider's practice
    pub fn location(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }

    /// Active-status flag, independent of network participation
    pub fn is_flagged_active(&self) -> bool {
        self.status == ProviderStatus::Active
    }

    /// Name for display, falling back to the identifier
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            self.provider_id.as_str()
        } else {
            &self.name
        }
    }
}

/// One network enrollment: the half-open interval `[effective_date, termination_date)`.
///
/// `termination_date == None` means the enrollment is open-ended. On the wire it is
/// written as `9999-12-31T00:00:00Z`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderNetwork {
    pub provider_id: ProviderId,
    pub network_id: NetworkId,
    pub effective_date: DateTime<Utc>,
    #[serde(with = "open_ended")]
    pub termination_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub termination_reason: String,
}

impl ProviderNetwork {
    pub fn is_open_ended(&self) -> bool {
        self.termination_date.is_none()
    }

    /// Whether the interval contains `at`
    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        self.effective_date <= at && self.termination_date.map_or(true, |end| at < end)
    }

    /// Whether the enrollment has already lapsed relative to `as_of`
    pub fn is_terminated_by(&self, as_of: DateTime<Utc>) -> bool {
        self.termination_date.map_or(false, |end| end <= as_of)
    }
}

/// Per-county row from the claims feed, optionally carrying the county centroid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountyRecord {
    pub county: String,
    #[serde(default)]
    pub claims_count: Option<u64>,
    #[serde(default)]
    pub avg_claim_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

impl CountyRecord {
    /// A county row without claims or centroid data
    pub fn named(county: impl Into<String>) -> Self {
        Self {
            county: county.into(),
            claims_count: None,
            avg_claim_amount: None,
            latitude: None,
            longitude: None,
        }
    }

    pub fn with_claims(mut self, claims_count: u64, avg_claim_amount: f64) -> Self {
        self.claims_count = Some(claims_count);
        self.avg_claim_amount = Some(avg_claim_amount);
        self
    }

    pub fn with_centroid(mut self, centroid: GeoPoint) -> Self {
        self.latitude = Some(centroid.latitude);
        self.longitude = Some(centroid.longitude);
        self
    }

    pub fn centroid(&self) -> Option<GeoPoint> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)),
            _ => None,
        }
    }
}

/// Row of the county centroid reference table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountyCentroid {
    pub county: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Row of the county land-area reference table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountyArea {
    pub county: String,
    pub area_sq_miles: f64,
}

/// Recommended density for one specialty, in providers per square mile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialtyStandard {
    pub specialty: String,
    pub recommended_density: f64,
}

/// Parse a timestamp in RFC 3339, `YYYY-MM-DD`, or `MM/DD/YYYY` form (dates are midnight UTC)
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(value, "%m/%d/%Y"))
        .map_err(|_| {
            NetworkError::date_parse_with_format(value, "RFC 3339, YYYY-MM-DD or MM/DD/YYYY")
        })?;
    Ok(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default()))
}

/// Parse a termination timestamp; blank values and the sentinel year map to `None`
pub fn parse_termination(value: &str) -> Result<Option<DateTime<Utc>>> {
    if value.trim().is_empty() {
        return Ok(None);
    }
    let ts = parse_timestamp(value)?;
    Ok(if is_sentinel(&ts) { None } else { Some(ts) })
}

/// Any timestamp in year 9999 is read as the open-ended sentinel
fn is_sentinel(ts: &DateTime<Utc>) -> bool {
    use chrono::Datelike;
    ts.year() == 9999
}

/// Serde adapter mapping `Option<DateTime<Utc>>` onto the sentinel wire format
pub mod open_ended {
    use super::*;

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        match value {
            Some(ts) => serializer.serialize_str(&ts.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)),
            None => serializer.serialize_str(OPEN_ENDED_SENTINEL),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Option<DateTime<Utc>>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(s) => parse_termination(&s).map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        parse_timestamp(s).unwrap()
    }

    #[test]
    fn test_network_codes() {
        assert_eq!(NetworkId::from_code("medicare"), Some(NetworkId::Medicare));
        assert_eq!(NetworkId::from_code(" Tricare "), Some(NetworkId::Tricare));
        assert!(NetworkId::from_code("Medicaid").is_none());
        assert!("Medicaid".parse::<NetworkId>().is_err());
    }

    #[test]
    fn test_npi_validation() {
        assert!(Npi::new("1234567890".to_string()).is_ok());
        assert!(Npi::new("123".to_string()).is_err());
        assert!(Npi::new("12345678AB".to_string()).is_err());
    }

    #[test]
    fn test_sentinel_becomes_open_ended() {
        let json = r#"{
            "provider_id": "P0001",
            "network_id": "Commercial",
            "effective_date": "2023-01-01T00:00:00Z",
            "termination_date": "9999-12-31T00:00:00Z",
            "termination_reason": ""
        }"#;
        let row: ProviderNetwork = serde_json::from_str(json).unwrap();
        assert!(row.is_open_ended());
        assert!(row.is_active_at(ts("2030-06-01T00:00:00Z")));
        assert!(!row.is_terminated_by(ts("9999-12-31T00:00:00Z")));

        let out = serde_json::to_value(&row).unwrap();
        assert_eq!(out["termination_date"], "9999-12-31T00:00:00Z");
    }

    #[test]
    fn test_interval_is_half_open() {
        let row = ProviderNetwork {
            provider_id: ProviderId::from("P1"),
            network_id: NetworkId::Medicare,
            effective_date: ts("2020-01-01T00:00:00Z"),
            termination_date: Some(ts("2021-03-15T00:00:00Z")),
            termination_reason: "Left Network".to_string(),
        };
        assert!(row.is_active_at(ts("2020-01-01T00:00:00Z")));
        assert!(row.is_active_at(ts("2021-03-14T23:59:59Z")));
        assert!(!row.is_active_at(ts("2021-03-15T00:00:00Z")));
        assert!(row.is_terminated_by(ts("2021-03-15T00:00:00Z")));
        assert!(!row.is_terminated_by(ts("2021-03-14T00:00:00Z")));
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert_eq!(ts("2022-05-01"), ts("2022-05-01T00:00:00Z"));
        assert_eq!(ts("05/01/2022"), ts("2022-05-01T00:00:00Z"));
        assert_eq!(parse_termination("12/31/9999").unwrap(), None);
        assert_eq!(parse_termination("").unwrap(), None);
        assert!(parse_timestamp("yesterday").is_err());
    }
}
