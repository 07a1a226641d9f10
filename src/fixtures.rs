/*!
 * Seeded synthetic data for tests, benchmarks and demos
 *
 * Generates providers over a table of Kansas counties, their claims rows,
 * centroids and land areas, a specialty density standard table, and network participation following a county and specialty
 * profile:
 *
 * | County class | Commercial | Medicare | Tricare |
 * |---|---|---|---|
 * | base | 0.80 | 0.60 | 0.30 |
 * | urban | 0.95 | 0.85 | 0.60 |
 * | rural | 0.50 | 0.90 | 0.20 |
 * | military | | | 0.80 |
 *
 * Specialists take 1.1x the commercial rate and 0.8x the medicare rate. 8% of
 * enrollments terminated between 2020 and 2022; the rest are open-ended from
 * 2023-01-01. The same seed always yields the same data.
 */

use chrono::{DateTime, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::constants::LEFT_NETWORK_REASON;
use crate::data_types::*;
use crate::geo::round_to;
use crate::snapshot::SnapshotSource;

const URBAN_COUNTIES: &[&str] = &["Johnson", "Sedgwick", "Shawnee", "Douglas"];
/// Urban counties plus the mid-size ones that keep the base profile
const NON_RURAL_COUNTIES: &[&str] = &["Johnson", "Sedgwick", "Shawnee", "Douglas", "Leavenworth", "Reno", "Saline"];
const MILITARY_COUNTIES: &[&str] = &["Geary", "Riley", "Leavenworth"];
const SPECIALIST_TYPES: &[&str] = &["Cardiology", "Neurology", "Oncology"];

const TERMINATION_RATE: f64 = 0.08;

pub const SPECIALTIES: &[&str] = &[
    "Primary Care",
    "Family Medicine",
    "Pediatrics",
    "Internal Medicine",
    "Cardiology",
    "Neurology",
    "Oncology",
    "Orthopedics",
    "Psychiatry",
];

/// A county the generator places providers in
#[derive(Debug, Clone, PartialEq)]
pub struct CountyProfile {
    pub name: &'static str,
    pub latitude: f64,
    pub longitude: f64,
    /// Relative share of generated providers
    pub weight: u32,
    /// Whether the claims feed reports this county
    pub reports_claims: bool,
    pub area_sq_miles: f64,
}

const fn county(
    name: &'static str,
    latitude: f64,
    longitude: f64,
    weight: u32,
    reports_claims: bool,
    area_sq_miles: f64,
) -> CountyProfile {
    CountyProfile {
        name,
        latitude,
        longitude,
        weight,
        reports_claims,
        area_sq_miles,
    }
}

/// Default county table with approximate centroids and areas
pub const KANSAS_COUNTIES: &[CountyProfile] = &[
    county("Johnson", 38.8838, -94.8223, 30, true, 480.0),
    county("Sedgwick", 37.6838, -97.4613, 28, true, 1008.0),
    county("Shawnee", 39.0416, -95.7561, 12, true, 556.0),
    county("Douglas", 38.8846, -95.2925, 8, true, 475.0),
    county("Wyandotte", 39.1149, -94.7637, 8, true, 156.0),
    county("Leavenworth", 39.1995, -95.0379, 4, true, 468.0),
    county("Reno", 37.9532, -98.0856, 4, true, 1271.0),
    county("Saline", 38.7838, -97.6498, 4, true, 721.0),
    county("Riley", 39.2964, -96.7349, 4, true, 622.0),
    county("Geary", 39.0023, -96.7525, 2, true, 404.0),
    county("Butler", 37.7812, -96.8392, 3, true, 1447.0),
    county("Finney", 38.0440, -100.7371, 2, true, 1303.0),
    county("Ford", 37.6917, -99.8880, 2, true, 1099.0),
    county("Ellis", 38.9147, -99.3172, 2, true, 900.0),
    county("Greeley", 38.4806, -101.8060, 1, true, 778.0),
    county("Wallace", 38.9167, -101.7636, 1, false, 914.0),
];

/// Recommended providers per square mile
pub const SPECIALTY_STANDARDS: &[(&str, f64)] = &[
    ("Primary Care", 0.08),
    ("Family Medicine", 0.05),
    ("Pediatrics", 0.03),
    ("Internal Medicine", 0.03),
    ("Cardiology", 0.01),
    ("Neurology", 0.005),
    ("Oncology", 0.005),
    ("Orthopedics", 0.01),
    ("Psychiatry", 0.02),
];

/// Participation probabilities `(commercial, medicare, tricare)` for a provider
pub fn participation_rates(county: &str, specialty: &str) -> (f64, f64, f64) {
    let (mut commercial, mut medicare, mut tricare) = (0.8, 0.6, 0.3);

    if URBAN_COUNTIES.contains(&county) {
        (commercial, medicare, tricare) = (0.95, 0.85, 0.6);
    }
    if !NON_RURAL_COUNTIES.contains(&county) {
        (commercial, medicare, tricare) = (0.5, 0.9, 0.2);
    }
    if MILITARY_COUNTIES.contains(&county) {
        tricare = 0.8;
    }
    if SPECIALIST_TYPES.contains(&specialty) {
        commercial *= 1.1;
        medicare *= 0.8;
    }

    (commercial, medicare, tricare)
}

/// Deterministic generator of snapshot fixtures
pub struct FixtureGenerator {
    rng: StdRng,
    provider_count: usize,
    counties: Vec<CountyProfile>,
}

impl FixtureGenerator {
    /// A generator producing 500 providers over [`KANSAS_COUNTIES`]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            provider_count: 500,
            counties: KANSAS_COUNTIES.to_vec(),
        }
    }

    pub fn with_provider_count(mut self, count: usize) -> Self {
        self.provider_count = count;
        self
    }

    pub fn with_counties(mut self, counties: Vec<CountyProfile>) -> Self {
        self.counties = counties;
        self
    }

    /// Generate a complete snapshot source
    pub fn generate(&mut self) -> SnapshotSource {
        let providers = self.generate_providers();
        let provider_networks = self.generate_networks(&providers);
        let counties = self.generate_claims(&providers);
        let centroids = self
            .counties
            .iter()
            .map(|c| CountyCentroid {
                county: c.name.to_string(),
                latitude: c.latitude,
                longitude: c.longitude,
            })
            .collect();
        let areas = self
            .counties
            .iter()
            .map(|c| CountyArea {
                county: c.name.to_string(),
                area_sq_miles: c.area_sq_miles,
            })
            .collect();
        let standards = SPECIALTY_STANDARDS
            .iter()
            .map(|&(specialty, recommended_density)| SpecialtyStandard {
                specialty: specialty.to_string(),
                recommended_density,
            })
            .collect();

        tracing::debug!(
            providers = providers.len(),
            enrollments = provider_networks.len(),
            "generated fixtures"
        );
        SnapshotSource::new(providers, provider_networks, counties)
            .with_centroids(centroids)
            .with_county_areas(areas)
            .with_specialty_standards(standards)
    }

    /// Providers with ids `P0001..`, spread over the county table by weight
    pub fn generate_providers(&mut self) -> Vec<Provider> {
        let total_weight: u32 = self.counties.iter().map(|c| c.weight).sum();
        if total_weight == 0 {
            return Vec::new();
        }

        (1..=self.provider_count)
            .map(|i| {
                let profile = self.pick_county(total_weight).clone();
                let specialty = SPECIALTIES[self.rng.gen_range(0..SPECIALTIES.len())];
                let status = if self.rng.gen::<f64>() < 0.9 {
                    ProviderStatus::Active
                } else {
                    ProviderStatus::Terminated
                };
                Provider {
                    provider_id: ProviderId(format!("P{:04}", i)),
                    npi: Some(Npi(format!("{}", 1_000_000_000u64 + i as u64))),
                    name: format!("Provider {:04}", i),
                    provider_type: specialty.to_string(),
                    status,
                    county: profile.name.to_string(),
                    latitude: round_to(profile.latitude + self.rng.gen_range(-0.15..0.15), 6),
                    longitude: round_to(profile.longitude + self.rng.gen_range(-0.15..0.15), 6),
                }
            })
            .collect()
    }

    fn pick_county(&mut self, total_weight: u32) -> &CountyProfile {
        let mut roll = self.rng.gen_range(0..total_weight);
        for profile in &self.counties {
            if roll < profile.weight {
                return profile;
            }
            roll -= profile.weight;
        }
        &self.counties[self.counties.len() - 1]
    }

    /// Network participation for each provider, in provider order
    pub fn generate_networks(&mut self, providers: &[Provider]) -> Vec<ProviderNetwork> {
        let mut rows = Vec::new();
        for provider in providers {
            let (commercial, medicare, tricare) = participation_rates(&provider.county, &provider.provider_type);
            for (network, rate) in [
                (NetworkId::Commercial, commercial),
                (NetworkId::Medicare, medicare),
                (NetworkId::Tricare, tricare),
            ] {
                if self.rng.gen::<f64>() >= rate {
                    continue;
                }
                rows.push(self.enrollment(&provider.provider_id, network));
            }
        }
        rows
    }

    fn enrollment(&mut self, provider_id: &ProviderId, network: NetworkId) -> ProviderNetwork {
        if self.rng.gen::<f64>() < TERMINATION_RATE {
            let year = 2020 + self.rng.gen_range(0..3);
            let month = self.rng.gen_range(1..=12);
            let day = self.rng.gen_range(1..=28);
            ProviderNetwork {
                provider_id: provider_id.clone(),
                network_id: network,
                effective_date: midnight(year - 1, 1, 1),
                termination_date: Some(midnight(year, month, day)),
                termination_reason: LEFT_NETWORK_REASON.to_string(),
            }
        } else {
            ProviderNetwork {
                provider_id: provider_id.clone(),
                network_id: network,
                effective_date: midnight(2023, 1, 1),
                termination_date: None,
                termination_reason: String::new(),
            }
        }
    }

    fn generate_claims(&mut self, providers: &[Provider]) -> Vec<CountyRecord> {
        let counties = self.counties.clone();
        counties
            .iter()
            .map(|profile| {
                let record = CountyRecord::named(profile.name);
                if !profile.reports_claims {
                    return record;
                }
                let in_county = providers.iter().filter(|p| p.county == profile.name).count() as u64;
                let per_provider = self.rng.gen_range(40..160);
                let avg = round_to(self.rng.gen_range(90.0..450.0), 2);
                record.with_claims(in_county.max(1) * per_provider, avg)
            })
            .collect()
    }
}

fn midnight(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
