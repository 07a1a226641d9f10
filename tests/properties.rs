//! Property tests for the analytic contracts

use carenet::prelude::*;
use carenet::recommend::recommend;
use carenet::stability::percentage_terminated;
use proptest::prelude::*;

const ORIGIN: (f64, f64) = (38.8838, -94.8223);

fn provider_at(i: usize, lat_step: i32, lon_step: i32) -> Provider {
    Provider {
        provider_id: ProviderId(format!("P{:04}", i)),
        npi: None,
        name: String::new(),
        provider_type: "Primary Care".to_string(),
        status: ProviderStatus::Terminated,
        county: "Johnson".to_string(),
        latitude: ORIGIN.0 + lat_step as f64 * 0.05,
        longitude: ORIGIN.1 + lon_step as f64 * 0.05,
    }
}

/// Providers on a coarse grid around the origin so equal distances are common
fn arb_grid(max: usize) -> impl Strategy<Value = Vec<(i32, i32, bool)>> {
    prop::collection::vec((-6i32..=6, -6i32..=6, any::<bool>()), 1..=max)
}

fn grid_store(cells: &[(i32, i32, bool)]) -> SnapshotStore {
    let providers: Vec<_> = cells
        .iter()
        .enumerate()
        .map(|(i, &(lat, lon, _))| provider_at(i, lat, lon))
        .collect();
    let enrollments = cells
        .iter()
        .enumerate()
        .filter(|(_, cell)| cell.2)
        .map(|(i, _)| ProviderNetwork {
            provider_id: ProviderId(format!("P{:04}", i)),
            network_id: NetworkId::Medicare,
            effective_date: parse_timestamp("2020-01-01").unwrap(),
            termination_date: None,
            termination_reason: String::new(),
        })
        .collect();
    let source = SnapshotSource::new(providers, enrollments, Vec::new()).with_centroids(vec![CountyCentroid {
        county: "Johnson".to_string(),
        latitude: ORIGIN.0,
        longitude: ORIGIN.1,
    }]);
    SnapshotStore::with_source(source).unwrap()
}

fn arb_metrics() -> impl Strategy<Value = CountyMetrics> {
    (0usize..1000, prop::option::of(0u64..200_000)).prop_map(|(providers, claims)| {
        let record = claims.map(|c| CountyRecord::named("Reno").with_claims(c, 150.0));
        CountyMetrics::new("Reno", providers, record.as_ref())
    })
}

fn arb_analysis() -> impl Strategy<Value = Option<TerminatedAnalysis>> {
    prop::option::of((0usize..500, 0usize..500).prop_map(|(a, b)| {
        let (terminated, total) = (a.min(b), a.max(b));
        TerminatedAnalysis {
            network_id: NetworkId::Tricare,
            county: Some("Reno".to_string()),
            term_network_count: terminated,
            service_location_count: total,
            percentage_terminated: percentage_terminated(terminated, total),
        }
    }))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_percentage_bounded_with_one_decimal(total in 1usize..100_000, share in 0.0f64..=1.0) {
        let terminated = ((total as f64) * share).floor() as usize;
        let pct = percentage_terminated(terminated.min(total), total);
        prop_assert!((0.0..=100.0).contains(&pct));
        prop_assert!(((pct * 10.0).round() - pct * 10.0).abs() < 1e-6);
    }

    #[test]
    fn prop_density_partitions_counts(count in 0usize..5_000) {
        let class = DensityClass::from_provider_count(count);
        let expected = match count {
            0..=49 => DensityClass::Critical,
            50..=99 => DensityClass::Low,
            100..=399 => DensityClass::Medium,
            _ => DensityClass::High,
        };
        prop_assert_eq!(class, expected);
    }

    #[test]
    fn prop_radius_growth_only_appends(cells in arb_grid(40), r1 in 0.1f64..40.0, extra in 0.0f64..40.0) {
        let store = grid_store(&cells);
        let snapshot = store.current();
        let analytics = snapshot.analytics();

        let small = analytics.radius_search("Johnson", r1, NetworkId::Medicare).unwrap();
        let large = analytics.radius_search("Johnson", r1 + extra, NetworkId::Medicare).unwrap();

        prop_assert!(small.len() <= large.len());
        prop_assert_eq!(&large[..small.len()], &small[..]);
        for pair in large.windows(2) {
            prop_assert!(pair[0].distance_miles <= pair[1].distance_miles);
            let (a, b) = (pair[0].provider, pair[1].provider);
            if a.latitude == b.latitude && a.longitude == b.longitude {
                prop_assert!(a.provider_id < b.provider_id);
            }
        }
    }

    #[test]
    fn prop_recommendations_are_deterministic(metrics in arb_metrics(), analysis in arb_analysis()) {
        let first = recommend(&metrics, analysis.as_ref());
        let second = recommend(&metrics, analysis.as_ref());
        prop_assert_eq!(&first, &second);

        let order: Vec<usize> = first
            .iter()
            .map(|r| match r.kind {
                RecommendationType::ProviderShortage => 0,
                RecommendationType::HighUtilization => 1,
                RecommendationType::NetworkInstability => 2,
            })
            .collect();
        prop_assert!(order.windows(2).all(|w| w[0] < w[1]));
    }
}
