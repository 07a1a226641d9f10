/*!
 * End-to-end tests over data directories written to disk
 *
 * Each test writes provider, enrollment and claims files to a temporary
 * directory, loads them through the snapshot store and checks the numbers
 * a dashboard would render.
 */

use carenet::api::ApiService;
use carenet::export::write_source_files;
use carenet::fixtures::FixtureGenerator;
use carenet::prelude::*;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

const SEDGWICK: (f64, f64) = (37.6838, -97.4613);

fn ts(value: &str) -> chrono::DateTime<chrono::Utc> {
    parse_timestamp(value).unwrap()
}

fn provider(id: &str, county: &str, status: ProviderStatus, at: (f64, f64)) -> Provider {
    Provider {
        provider_id: ProviderId::from(id),
        npi: None,
        name: format!("Provider {}", id),
        provider_type: "Primary Care".to_string(),
        status,
        county: county.to_string(),
        latitude: at.0,
        longitude: at.1,
    }
}

fn enrollment(id: &str, network: NetworkId, end: Option<&str>) -> ProviderNetwork {
    ProviderNetwork {
        provider_id: ProviderId::from(id),
        network_id: network,
        effective_date: ts("2019-01-01T00:00:00Z"),
        termination_date: end.map(ts),
        termination_reason: end.map(|_| "Left Network".to_string()).unwrap_or_default(),
    }
}

/// `count` active providers in one county with the given claims total
fn county_source(county: &str, count: usize, claims: u64) -> SnapshotSource {
    let providers = (1..=count)
        .map(|i| provider(&format!("P{:04}", i), county, ProviderStatus::Active, SEDGWICK))
        .collect();
    SnapshotSource::new(
        providers,
        Vec::new(),
        vec![CountyRecord::named(county).with_claims(claims, 180.0)],
    )
}

fn load_dir(source: &SnapshotSource, format: ExportFormat) -> (TempDir, SnapshotStore) {
    let dir = TempDir::new().unwrap();
    write_source_files(dir.path(), source, format).unwrap();
    let store = SnapshotStore::new();
    store.load_from_dir(dir.path(), &EngineConfig::default()).unwrap();
    (dir, store)
}

#[test]
fn test_shortage_is_first_recommendation() {
    let (_dir, store) = load_dir(&county_source("Butler", 25, 1000), ExportFormat::Csv);
    let snapshot = store.current();
    let recs = snapshot.analytics().recommendations("Butler", None).unwrap();

    assert_eq!(recs[0].priority, Priority::High);
    assert_eq!(recs[0].kind, RecommendationType::ProviderShortage);
    assert_eq!(recs.len(), 1);
}

#[test]
fn test_high_utilization_boundary() {
    let (_dir, store) = load_dir(&county_source("Finney", 10, 1500), ExportFormat::Json);
    let snapshot = store.current();
    let recs = snapshot.analytics().recommendations("Finney", None).unwrap();
    let kinds: Vec<_> = recs.iter().map(|r| r.kind).collect();
    assert_eq!(
        kinds,
        vec![RecommendationType::ProviderShortage, RecommendationType::HighUtilization]
    );
    assert_eq!(recs[1].priority, Priority::Medium);

    // Exactly 100 claims per provider does not fire
    let (_dir, store) = load_dir(&county_source("Finney", 10, 1000), ExportFormat::Json);
    let recs = store.current().analytics().recommendations("Finney", None).unwrap();
    assert!(recs.iter().all(|r| r.kind != RecommendationType::HighUtilization));
}

#[test]
fn test_terminated_analysis_from_files() {
    let mut providers = Vec::new();
    let mut rows = Vec::new();
    for i in 1..=40 {
        let id = format!("P{:04}", i);
        providers.push(provider(&id, "Sedgwick", ProviderStatus::Active, SEDGWICK));
        let end = match i {
            1..=25 => Some("2022-06-01T00:00:00Z"),
            // Scheduled terminations after the reference date have not lapsed
            26..=27 => Some("2030-01-01T00:00:00Z"),
            _ => None,
        };
        rows.push(enrollment(&id, NetworkId::Medicare, end));
    }
    rows.push(enrollment("P0001", NetworkId::Commercial, None));
    let source = SnapshotSource::new(providers, rows, vec![CountyRecord::named("Sedgwick")]);

    for format in [ExportFormat::Json, ExportFormat::Csv] {
        let (_dir, store) = load_dir(&source, format);
        let snapshot = store.current();
        let analysis = snapshot
            .analytics()
            .as_of(ts("2024-01-01T00:00:00Z"))
            .terminated_analysis(NetworkId::Medicare, None)
            .unwrap();
        assert_eq!(analysis.term_network_count, 25);
        assert_eq!(analysis.service_location_count, 40);
        assert_eq!(analysis.percentage_terminated, 62.5);

        let scoped = snapshot
            .analytics()
            .as_of(ts("2024-01-01T00:00:00Z"))
            .terminated_analysis(NetworkId::Medicare, Some("sedgwick"))
            .unwrap();
        assert_eq!(scoped.county.as_deref(), Some("Sedgwick"));
        assert_eq!(scoped.percentage_terminated, 62.5);

        let tricare = snapshot
            .analytics()
            .terminated_analysis(NetworkId::Tricare, None)
            .unwrap();
        assert_eq!(tricare.service_location_count, 0);
        assert_eq!(tricare.percentage_terminated, 0.0);
    }
}

#[test]
fn test_radius_search_bounds() {
    let offset = (SEDGWICK.0 + 0.005, SEDGWICK.1);
    let source = SnapshotSource::new(
        vec![
            provider("P0002", "Sedgwick", ProviderStatus::Terminated, SEDGWICK),
            provider("P0001", "Sedgwick", ProviderStatus::Terminated, SEDGWICK),
            provider("P0003", "Sedgwick", ProviderStatus::Terminated, offset),
            provider("P0004", "Sedgwick", ProviderStatus::Active, SEDGWICK),
        ],
        vec![
            enrollment("P0001", NetworkId::Medicare, None),
            enrollment("P0002", NetworkId::Medicare, None),
            enrollment("P0003", NetworkId::Medicare, None),
            enrollment("P0004", NetworkId::Commercial, None),
        ],
        vec![CountyRecord::named("Sedgwick")],
    )
    .with_centroids(vec![CountyCentroid {
        county: "Sedgwick".to_string(),
        latitude: SEDGWICK.0,
        longitude: SEDGWICK.1,
    }]);
    let (_dir, store) = load_dir(&source, ExportFormat::Csv);
    let snapshot = store.current();
    let analytics = snapshot.analytics();

    let err = analytics.radius_search("Sedgwick", 0.0, NetworkId::Medicare).unwrap_err();
    assert!(matches!(err, NetworkError::InvalidArgument { ref parameter, .. } if parameter == "radius"));

    let at_centroid = analytics.radius_search("Sedgwick", 0.01, NetworkId::Medicare).unwrap();
    let ids: Vec<_> = at_centroid.iter().map(|h| h.provider.provider_id.as_str()).collect();
    assert_eq!(ids, vec!["P0001", "P0002"]);
    assert!(at_centroid.iter().all(|h| h.distance_miles == 0.0));

    let wider = analytics.radius_search("Sedgwick", 1.0, NetworkId::Medicare).unwrap();
    let ids: Vec<_> = wider.iter().map(|h| h.provider.provider_id.as_str()).collect();
    assert_eq!(ids, vec!["P0001", "P0002", "P0003"]);
    assert!((wider[2].distance_miles - 0.35).abs() < 0.01);

    let err = analytics.radius_search("Atlantis", 5.0, NetworkId::Medicare).unwrap_err();
    assert!(matches!(err, NetworkError::InvalidArgument { .. }));
}

#[test]
fn test_open_ended_sentinel_on_the_wire() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("providers.json"),
        r#"[
            {"provider_id": "P0001", "name": "Dr. A", "provider_type": "Cardiology", "status": "Terminated",
             "county": "Riley", "latitude": 39.3, "longitude": -96.7},
            {"provider_id": "P0002", "name": "Dr. B", "provider_type": "Pediatrics", "status": "Terminated",
             "county": "Riley", "latitude": 39.2, "longitude": -96.6}
        ]"#,
    )
    .unwrap();
    fs::write(
        dir.path().join("provider_networks.json"),
        r#"[
            {"provider_id": "P0001", "network_id": "Tricare", "effective_date": "2023-01-01T00:00:00Z",
             "termination_date": "9999-12-31T00:00:00Z", "termination_reason": ""},
            {"provider_id": "P0002", "network_id": "Tricare", "effective_date": "2020-01-01T00:00:00Z",
             "termination_date": "2021-03-15T00:00:00Z", "termination_reason": "Left Network"}
        ]"#,
    )
    .unwrap();
    fs::write(
        dir.path().join("claims.json"),
        r#"[{"county": "Riley", "claims_count": 300, "avg_claim_amount": 95.5}]"#,
    )
    .unwrap();

    let store = SnapshotStore::new();
    store.load_from_dir(dir.path(), &EngineConfig::default()).unwrap();
    let snapshot = store.current();
    assert!(snapshot.provider_networks()[0].is_open_ended());

    let analytics = snapshot.analytics().as_of(ts("2024-06-01T00:00:00Z"));
    let riley = analytics.county("Riley").unwrap();
    assert_eq!(riley.provider_count, 1);
    assert_eq!(riley.claims_per_provider, Some(300));
    assert_eq!(riley.density, DensityClass::Critical);

    let mut out = Vec::new();
    JsonExporter::new()
        .export_provider_networks(snapshot.provider_networks(), &mut out)
        .unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("\"termination_date\": \"9999-12-31T00:00:00Z\""));
    assert!(text.contains("\"termination_date\": \"2021-03-15T00:00:00Z\""));
}

#[test]
fn test_failed_load_keeps_previous_snapshot() {
    let store = SnapshotStore::with_source(county_source("Butler", 3, 10)).unwrap();
    let before = store.current();

    let bad = SnapshotSource::new(
        vec![provider("P0001", "Butler", ProviderStatus::Active, SEDGWICK)],
        vec![enrollment("P9999", NetworkId::Medicare, None)],
        Vec::new(),
    );
    let err = store.load(bad).unwrap_err();
    assert!(matches!(err, NetworkError::DataIntegrity { .. }));

    let reversed = SnapshotSource::new(
        vec![provider("P0001", "Butler", ProviderStatus::Active, SEDGWICK)],
        vec![ProviderNetwork {
            effective_date: ts("2023-01-01T00:00:00Z"),
            termination_date: Some(ts("2022-01-01T00:00:00Z")),
            ..enrollment("P0001", NetworkId::Medicare, None)
        }],
        Vec::new(),
    );
    assert!(store.load(reversed).is_err());

    let after = store.current();
    assert_eq!(after.generation(), before.generation());
    assert_eq!(after.len(), 3);
}

#[test]
fn test_readers_see_whole_snapshots_during_swaps() {
    let store = Arc::new(SnapshotStore::with_source(county_source("Butler", 1, 10)).unwrap());

    std::thread::scope(|scope| {
        for _ in 0..4 {
            let store = Arc::clone(&store);
            scope.spawn(move || {
                for _ in 0..200 {
                    let snapshot = store.current();
                    let analytics = snapshot.analytics();
                    // Every provider in these sources is flagged active and lives in Butler
                    let metrics = analytics.county("Butler").unwrap();
                    assert_eq!(metrics.provider_count, snapshot.len());
                    assert_eq!(analytics.active_provider_count(), snapshot.len());
                    assert_eq!(metrics.claims_count, snapshot.len() as u64 * 10);
                }
            });
        }

        for count in 1..=20 {
            let handle = store.spawn_load(county_source("Butler", count, count as u64 * 10));
            let loaded = handle.join().unwrap().unwrap();
            assert_eq!(loaded.len(), count);
        }
    });

    assert_eq!(store.current().len(), 20);
}

#[test]
fn test_overlapping_intervals_reported() {
    let source = SnapshotSource::new(
        vec![provider("P0001", "Ford", ProviderStatus::Terminated, (37.69, -99.88))],
        vec![
            enrollment("P0001", NetworkId::Commercial, Some("2025-01-01T00:00:00Z")),
            ProviderNetwork {
                effective_date: ts("2022-01-01T00:00:00Z"),
                ..enrollment("P0001", NetworkId::Commercial, None)
            },
        ],
        Vec::new(),
    );
    let store = SnapshotStore::with_source(source).unwrap();
    let snapshot = store.current();
    let diagnostics = Diagnostics::new();
    let analytics = snapshot
        .analytics()
        .as_of(ts("2023-06-01T00:00:00Z"))
        .with_diagnostics(&diagnostics);

    assert!(analytics.is_active(&ProviderId::from("P0001")).unwrap());
    let anomalies = diagnostics.take();
    assert_eq!(anomalies.len(), 1);
    assert_eq!(anomalies[0].covering, 2);
    assert_eq!(anomalies[0].selected_effective, ts("2022-01-01T00:00:00Z"));
}

#[test]
fn test_cancelled_query_returns_no_partial_result() {
    let source = FixtureGenerator::new(3).with_provider_count(200).generate();
    let store = SnapshotStore::with_source(source).unwrap();
    let snapshot = store.current();
    let token = CancellationToken::new();
    token.cancel();

    let analytics = snapshot.analytics().with_cancellation(&token);
    let err = analytics.radius_search("Sedgwick", 50.0, NetworkId::Commercial).unwrap_err();
    assert!(matches!(err, NetworkError::Cancelled { .. }));
    assert!(analytics.county_metrics(None).is_err());
}

#[test]
fn test_large_county_spacing_and_recommendations() {
    // 80 x 75 grid, 0.005 degrees apart, every provider flagged active
    let providers: Vec<Provider> = (0..6000)
        .map(|i| {
            let at = (38.6 + (i % 80) as f64 * 0.005, -95.1 + (i / 80) as f64 * 0.005);
            provider(&format!("P{:05}", i), "Johnson", ProviderStatus::Active, at)
        })
        .collect();
    let source = SnapshotSource::new(
        providers,
        Vec::new(),
        vec![CountyRecord::named("Johnson").with_claims(300_000, 120.0)],
    )
    .with_county_areas(vec![CountyArea {
        county: "Johnson".to_string(),
        area_sq_miles: 480.0,
    }]);
    let store = SnapshotStore::with_source(source).unwrap();
    let snapshot = store.current();
    let analytics = snapshot.analytics();

    assert!(analytics.recommendations("Johnson", None).unwrap().is_empty());

    let johnson = analytics.county("Johnson").unwrap();
    assert_eq!(johnson.provider_count, 6000);
    assert_eq!(johnson.providers_per_sq_mile, Some(12.5));
    assert_eq!(johnson.spacing_basis, Some(SpacingBasis::NearestNeighbour));
    let spacing = johnson.provider_spacing_miles.unwrap();
    assert!((spacing - 0.27).abs() < 0.01, "spacing {}", spacing);

    let token = CancellationToken::new();
    token.cancel();
    let cancelled = snapshot.analytics().with_cancellation(&token);
    assert!(matches!(cancelled.county("Johnson"), Err(NetworkError::Cancelled { .. })));
    assert!(matches!(
        cancelled.recommendations("Johnson", None),
        Err(NetworkError::Cancelled { .. })
    ));
}

#[test]
fn test_generated_dataset_through_api() {
    let source = FixtureGenerator::new(11).with_provider_count(400).generate();
    let (_dir, store) = load_dir(&source, ExportFormat::Json);
    let config = EngineConfig {
        reference_date: Some(ts("2024-01-01T00:00:00Z")),
        ..EngineConfig::default()
    };
    let api = ApiService::with_config(Arc::new(store), config);

    let counties = api.county_data().unwrap();
    assert_eq!(counties.len(), carenet::fixtures::KANSAS_COUNTIES.len());
    let wallace = counties.iter().find(|m| m.county == "Wallace").unwrap();
    assert!(!wallace.claims_reported);
    assert_eq!(wallace.avg_claim_amount, None);
    assert_eq!(wallace.area_sq_miles, Some(914.0));

    let gaps = api.specialty_gaps("Sedgwick").unwrap();
    assert_eq!(gaps.gaps.len(), carenet::fixtures::SPECIALTY_STANDARDS.len());
    assert!(gaps.gaps.windows(2).all(|w| w[0].gap >= w[1].gap));

    for network in ["Commercial", "Medicare", "Tricare"] {
        let analysis = api.terminated_analysis(network, None).unwrap();
        assert!(analysis.service_location_count > 0);
        assert!((0.0..=100.0).contains(&analysis.percentage_terminated));
    }

    let hits = api.radius_analysis("Johnson", Some(30.0), "Commercial").unwrap();
    assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
    assert!(hits.iter().all(|h| h.distance <= 30.0));
}
