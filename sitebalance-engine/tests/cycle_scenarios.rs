use chrono::{Duration as ChronoDuration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sitebalance_core::{
    AssignmentStatus, Config, CrossSiteAssignment, LoadSample, LoadTrend, Site, SiteStatus,
};
use sitebalance_engine::{
    classify, FleetSnapshot, MemoryStore, RebalanceService, ScoreBreakdown, TransferPlanner,
};
use std::collections::HashMap;
use std::sync::Arc;

fn site(id: &str, capacity: u32, occupancy: u32) -> Site {
    Site {
        id: id.to_string(),
        name: format!("Site {}", id),
        total_capacity: capacity,
        base_occupancy: occupancy,
        current_occupancy: occupancy,
        status: SiteStatus::Active,
        supports_cross_site_work: true,
    }
}

fn random_fleet(rng: &mut StdRng, max_load_fraction: f64) -> Vec<Site> {
    let count = rng.random_range(2..25);
    (0..count)
        .map(|i| {
            let capacity = rng.random_range(20..300u32);
            let occupancy = (f64::from(capacity) * rng.random_range(0.0..max_load_fraction)) as u32;
            site(&format!("site-{:02}", i), capacity, occupancy)
        })
        .collect()
}

fn store_with(sites: &[Site]) -> MemoryStore {
    let store = MemoryStore::new();
    for s in sites {
        store.add_site(s.clone());
    }
    store
}

#[tokio::test]
async fn balanced_fleet_scenario() {
    let sites: Vec<Site> = ["a", "b", "c", "d", "e"]
        .iter()
        .map(|id| site(id, 100, 70))
        .collect();
    let service = RebalanceService::new(Config::default(), Arc::new(store_with(&sites))).unwrap();

    let metrics = service.execute_load_balancing().await.unwrap();

    assert_eq!(metrics.total_transfers, 0);
    assert_eq!(metrics.balanced_sites, 5);
    assert!(metrics.is_fully_balanced());
}

#[tokio::test]
async fn single_hotspot_scenario() {
    let mut sites = vec![site("a", 100, 90)];
    sites.extend(["b", "c", "d", "e"].iter().map(|id| site(id, 150, 40)));
    let store = store_with(&sites);
    let service = RebalanceService::new(Config::default(), Arc::new(store.clone())).unwrap();

    let outcome = service.run_cycle().await.unwrap();

    let to_b = outcome
        .decisions
        .iter()
        .find(|d| d.source_site_id == "a" && d.target_site_id == "b")
        .unwrap();
    assert!(to_b.volume_to_transfer > 0.0);
    assert!(to_b.volume_to_transfer <= 0.3 * (90.0 - 80.0) + 1e-9);
    assert_eq!(outcome.metrics.total_transfers, outcome.decisions.len());
    assert_eq!(store.decisions().len(), outcome.decisions.len());
}

#[tokio::test]
async fn no_underloaded_sites_scenario() {
    let sites = vec![
        site("a", 100, 85),
        site("b", 100, 60),
        site("c", 100, 70),
        site("d", 100, 80),
    ];
    let service = RebalanceService::new(Config::default(), Arc::new(store_with(&sites))).unwrap();

    let outcome = service.run_cycle().await.unwrap();

    assert_eq!(outcome.buckets.overloaded, 1);
    assert_eq!(outcome.buckets.underloaded, 0);
    assert!(outcome.decisions.is_empty());
}

#[tokio::test]
async fn cross_site_assignments_shift_load() {
    // 自有负载看起来过载，但已有 20 个单元借调出去
    let store = store_with(&[site("a", 100, 95), site("b", 100, 30)]);
    store.add_assignment(CrossSiteAssignment {
        id: "existing".to_string(),
        unit_id: "unit-1".to_string(),
        home_site_id: "a".to_string(),
        host_site_id: "b".to_string(),
        workload_percentage: 2000.0,
        status: AssignmentStatus::Active,
        start_date: Utc::now() - ChronoDuration::days(2),
        end_date: Some(Utc::now() + ChronoDuration::days(2)),
    });
    let service = RebalanceService::new(Config::default(), Arc::new(store.clone())).unwrap();

    let outcome = service.run_cycle().await.unwrap();

    assert!(outcome.decisions.is_empty());
    assert_eq!(outcome.buckets.optimal, 2);
    assert_eq!(store.site("a").unwrap().current_occupancy, 75);
    assert_eq!(store.site("b").unwrap().current_occupancy, 50);
}

#[tokio::test]
async fn snapshot_fleet_runs_end_to_end() {
    let json = r#"{
        "sites": [
            {"id": "north", "name": "North", "total_capacity": 100, "base_occupancy": 97},
            {"id": "south", "name": "South", "total_capacity": 200, "base_occupancy": 50},
            {"id": "closed", "name": "Closed", "total_capacity": 100, "base_occupancy": 99, "status": "inactive"}
        ]
    }"#;
    let store = MemoryStore::from_snapshot(FleetSnapshot::from_json(json).unwrap());
    let service = RebalanceService::new(Config::default(), Arc::new(store.clone())).unwrap();

    let outcome = service.run_cycle().await.unwrap();

    assert_eq!(outcome.metrics.total_sites, 2);
    assert_eq!(outcome.buckets.critical, 1);
    assert_eq!(outcome.decisions.len(), 1);
    assert_eq!(outcome.decisions[0].target_site_id, "south");

    let exported = store.snapshot();
    assert_eq!(exported.decisions.len(), 1);
    assert_eq!(exported.assignments.len(), 1);
}

#[tokio::test]
async fn classification_partitions_random_fleets() {
    let mut rng = StdRng::seed_from_u64(17);

    for _ in 0..25 {
        let sites = random_fleet(&mut rng, 1.4);
        let service = RebalanceService::new(Config::default(), Arc::new(store_with(&sites))).unwrap();

        let outcome = service.plan_only().await.unwrap();
        let b = &outcome.buckets;

        assert_eq!(
            b.critical + b.overloaded + b.optimal + b.underloaded,
            sites.len()
        );
        assert_eq!(outcome.metrics.total_sites, sites.len());
    }
}

#[tokio::test]
async fn decisions_respect_volume_bounds() {
    let mut rng = StdRng::seed_from_u64(42);
    let config = Config::default();

    for _ in 0..40 {
        let sites = random_fleet(&mut rng, 1.3);
        let by_id: HashMap<&str, &Site> = sites.iter().map(|s| (s.id.as_str(), s)).collect();
        let service = RebalanceService::new(config.clone(), Arc::new(store_with(&sites))).unwrap();

        let outcome = service.plan_only().await.unwrap();

        let mut shipped: HashMap<&str, f64> = HashMap::new();
        let mut received: HashMap<&str, f64> = HashMap::new();
        for d in &outcome.decisions {
            assert_ne!(d.source_site_id, d.target_site_id);
            assert!(d.volume_to_transfer > 0.0);
            *shipped.entry(d.source_site_id.as_str()).or_default() += d.volume_to_transfer;
            *received.entry(d.target_site_id.as_str()).or_default() += d.volume_to_transfer;
        }

        for (id, total) in shipped {
            let s = by_id[id];
            let excess = f64::from(s.base_occupancy)
                - f64::from(s.total_capacity) * config.thresholds.optimal_high();
            assert!(total <= excess + 1e-9, "{} shipped {} > excess {}", id, total, excess);
        }
        for (id, total) in received {
            let s = by_id[id];
            let headroom = f64::from(s.total_capacity) * config.thresholds.optimal_low()
                - f64::from(s.base_occupancy);
            assert!(total <= headroom + 1e-9, "{} received {} > headroom {}", id, total, headroom);
        }
    }
}

#[tokio::test]
async fn no_action_when_every_site_is_below_threshold() {
    let mut rng = StdRng::seed_from_u64(7);

    for _ in 0..20 {
        let sites = random_fleet(&mut rng, 0.84);
        let service = RebalanceService::new(Config::default(), Arc::new(store_with(&sites))).unwrap();

        let outcome = service.plan_only().await.unwrap();
        assert!(outcome.decisions.is_empty());
    }
}

#[test]
fn score_is_monotonic_in_balance_improvement() {
    let mut rng = StdRng::seed_from_u64(99);

    for _ in 0..200 {
        let breakdown = ScoreBreakdown {
            balance_improvement: rng.random_range(-0.5..1.0),
            response_time_differential: rng.random_range(0.0..1.0),
            capacity_utilization: rng.random_range(0.0..1.0),
            trend_alignment: if rng.random_bool(0.5) { 0.1 } else { 0.0 },
        };
        let improved = ScoreBreakdown {
            balance_improvement: breakdown.balance_improvement + rng.random_range(0.0..0.5),
            ..breakdown
        };

        assert!(improved.total() >= breakdown.total());
        assert!((0.0..=1.0).contains(&improved.total()));
    }
}

#[test]
fn planner_ignores_sources_below_threshold() {
    let now = Utc::now();
    let sample = |id: &str, load: f64| LoadSample::measure(id, load, 100.0, 0.0, LoadTrend::Stable, now);
    let samples = vec![sample("a", 84.0), sample("b", 10.0), sample("c", 20.0)];
    let config = Config::default();

    let classification = classify(&samples, &config.thresholds).unwrap();
    let plan = TransferPlanner::new(&config).plan(&samples, &classification.underloaded, now);

    assert!(plan.decisions.is_empty());
}
