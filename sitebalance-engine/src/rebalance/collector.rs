use chrono::{DateTime, Utc};
use futures::future;
use futures::stream::{self, StreamExt};
use sitebalance_core::{Config, CrossSiteAssignment, LoadSample, RebalanceError, Site, SiteId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::history::HistoryWriter;
use super::outcome::{CycleIssue, CycleStage};
use super::traits::SiteDataStore;
use super::trend::TrendAnalyzer;

/// 一次采集的结果
#[derive(Debug, Clone, Default)]
pub struct Collection {
    /// 按站点目录顺序排列
    pub samples: Vec<LoadSample>,
    /// 被跳过的站点和失败的回写
    pub issues: Vec<CycleIssue>,
}

/// 负载采集器
///
/// 每个周期先根据跨站点借调重新计算所有活跃站点的占用并回写，
/// 再并发读取各站点的性能指标生成采样。
pub struct LoadCollector {
    store: Arc<dyn SiteDataStore>,
    history: Arc<HistoryWriter>,
}

impl LoadCollector {
    pub fn new(store: Arc<dyn SiteDataStore>, history: Arc<HistoryWriter>) -> Self {
        Self { store, history }
    }

    pub fn history(&self) -> &HistoryWriter {
        &self.history
    }

    /// 采集所有参与重平衡站点的负载
    ///
    /// 站点目录或借调列表读取失败时返回 `Collection` 错误，周期中止；
    /// 单站点的失败只记录为问题，不影响其他站点。
    pub async fn collect_site_loads(&self, config: &Config) -> Result<Collection, RebalanceError> {
        let deadline = Instant::now() + config.collector.cycle_deadline();
        let sampled_at = Utc::now();

        let (sites, assignments) = tokio::try_join!(
            async {
                self.store
                    .get_active_sites()
                    .await
                    .map_err(|e| RebalanceError::collection("get_active_sites", e))
            },
            async {
                self.store
                    .get_active_cross_site_assignments()
                    .await
                    .map_err(|e| RebalanceError::collection("get_active_cross_site_assignments", e))
            }
        )?;

        let mut collection = Collection::default();
        let occupancy = blended_occupancy(&sites, &assignments);

        let writes = sites.iter().map(|site| {
            let store = self.store.clone();
            let site_id = site.id.clone();
            let load = occupancy.get(&site.id).copied().unwrap_or(0.0);
            let rounded = load.round().max(0.0) as u32;
            async move {
                store
                    .upsert_site_occupancy(&site_id, rounded)
                    .await
                    .map_err(|e| {
                        warn!("Failed to write occupancy {} for site {}: {}", rounded, site_id, e);
                        CycleIssue::from_error(
                            CycleStage::Collection,
                            site_id.clone(),
                            &RebalanceError::persistence("upsert_site_occupancy", e),
                        )
                    })
            }
        });
        for result in future::join_all(writes).await {
            if let Err(issue) = result {
                collection.issues.push(issue);
            }
        }

        let mut eligible = Vec::new();
        for site in sites.iter().filter(|s| s.is_rebalance_eligible()) {
            if site.total_capacity == 0 {
                warn!("Site {} has zero capacity, skipping", site.id);
                collection.issues.push(CycleIssue::new(
                    CycleStage::Collection,
                    site.id.clone(),
                    "zero total capacity",
                ));
                continue;
            }
            eligible.push(site);
        }

        let analyzer = TrendAnalyzer::new(self.store.clone(), &config.collector);
        let window_days = config.collector.performance_window_days;
        let concurrency = config.collector.collector_concurrency.max(1);

        // 每个采样任务持有自己的数据，整个 future 可以交给 tokio::spawn
        let tasks: Vec<_> = eligible
            .iter()
            .enumerate()
            .map(|(index, site)| {
                let site = (*site).clone();
                let load = occupancy.get(&site.id).copied().unwrap_or(0.0);
                let store = self.store.clone();
                let analyzer = analyzer.clone();
                async move {
                    let result = match tokio::time::timeout_at(
                        deadline,
                        sample_site(store, analyzer, &site, load, window_days, sampled_at),
                    )
                    .await
                    {
                        Ok(result) => result,
                        Err(_) => {
                            warn!("Sampling site {} missed the cycle deadline, skipping", site.id);
                            Err(CycleIssue::new(
                                CycleStage::Collection,
                                site.id.clone(),
                                "sample missed the cycle deadline",
                            ))
                        }
                    };
                    (index, result)
                }
            })
            .collect();

        let mut results: Vec<(usize, Result<LoadSample, CycleIssue>)> = stream::iter(tasks)
            .buffer_unordered(concurrency)
            .collect()
            .await;

        results.sort_by_key(|(index, _)| *index);

        for (_, result) in results {
            match result {
                Ok(sample) => {
                    self.history.submit(sample.clone());
                    collection.samples.push(sample);
                }
                Err(issue) => collection.issues.push(issue),
            }
        }

        info!(
            "Collected {} site samples ({} active sites, {} issues)",
            collection.samples.len(),
            sites.len(),
            collection.issues.len()
        );

        Ok(collection)
    }
}

async fn sample_site(
    store: Arc<dyn SiteDataStore>,
    analyzer: TrendAnalyzer,
    site: &Site,
    load: f64,
    window_days: u32,
    sampled_at: DateTime<Utc>,
) -> Result<LoadSample, CycleIssue> {
    let indicator = store
        .get_recent_performance(&site.id, window_days)
        .await
        .map_err(|e| {
            warn!("Failed to read recent performance for site {}: {}", site.id, e);
            CycleIssue::from_error(
                CycleStage::Collection,
                site.id.clone(),
                &RebalanceError::collection("get_recent_performance", e),
            )
        })?;

    let trend = analyzer.trend_with_current(&site.id, indicator).await;
    let sample = LoadSample::measure(
        site.id.clone(),
        load,
        f64::from(site.total_capacity),
        indicator.unwrap_or(0.0),
        trend,
        sampled_at,
    );

    debug!(
        "Site {}: load={:.2}/{:.0} ({:.1}%), indicator={:.2}, trend={}",
        sample.site_id,
        sample.current_load,
        sample.max_capacity,
        sample.load_percentage,
        sample.productivity_indicator,
        sample.trend
    );

    Ok(sample)
}

/// 自有负载加上借入、减去借出的工作单元，结果不小于 0
pub fn blended_occupancy(
    sites: &[Site],
    assignments: &[CrossSiteAssignment],
) -> HashMap<SiteId, f64> {
    let mut occupancy: HashMap<SiteId, f64> = sites
        .iter()
        .map(|s| (s.id.clone(), f64::from(s.base_occupancy)))
        .collect();

    for assignment in assignments.iter().filter(|a| a.is_active()) {
        if assignment.home_site_id == assignment.host_site_id {
            continue;
        }
        let units = assignment.workload_units();
        if !units.is_finite() {
            continue;
        }
        if let Some(host) = occupancy.get_mut(&assignment.host_site_id) {
            *host += units;
        }
        if let Some(home) = occupancy.get_mut(&assignment.home_site_id) {
            *home -= units;
        }
    }

    for value in occupancy.values_mut() {
        *value = value.max(0.0);
    }

    occupancy
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rebalance::memory_store::{FaultKind, MemoryStore};
    use chrono::Duration as ChronoDuration;
    use sitebalance_core::{AssignmentStatus, SiteStatus};
    use std::time::Duration;

    fn site(id: &str, capacity: u32, base: u32) -> Site {
        Site {
            id: id.to_string(),
            name: format!("Site {}", id),
            total_capacity: capacity,
            base_occupancy: base,
            current_occupancy: base,
            status: SiteStatus::Active,
            supports_cross_site_work: true,
        }
    }

    fn assignment(id: &str, home: &str, host: &str, pct: f64) -> CrossSiteAssignment {
        CrossSiteAssignment {
            id: id.to_string(),
            unit_id: format!("unit-{}", id),
            home_site_id: home.to_string(),
            host_site_id: host.to_string(),
            workload_percentage: pct,
            status: AssignmentStatus::Active,
            start_date: Utc::now() - ChronoDuration::days(1),
            end_date: None,
        }
    }

    fn collector(store: &MemoryStore) -> LoadCollector {
        let store: Arc<dyn SiteDataStore> = Arc::new(store.clone());
        let history = Arc::new(HistoryWriter::new(store.clone(), 64));
        LoadCollector::new(store, history)
    }

    #[test]
    fn test_blended_occupancy_moves_units() {
        let sites = vec![site("a", 100, 50), site("b", 100, 20)];
        let assignments = vec![
            assignment("1", "a", "b", 200.0),
            assignment("2", "a", "b", 50.0),
        ];

        let occupancy = blended_occupancy(&sites, &assignments);
        assert_eq!(occupancy["a"], 47.5);
        assert_eq!(occupancy["b"], 22.5);
    }

    #[test]
    fn test_blended_occupancy_never_negative() {
        let sites = vec![site("a", 100, 1), site("b", 100, 0)];
        let assignments = vec![assignment("1", "a", "b", 500.0)];

        let occupancy = blended_occupancy(&sites, &assignments);
        assert_eq!(occupancy["a"], 0.0);
        assert_eq!(occupancy["b"], 5.0);
    }

    #[tokio::test]
    async fn test_collect_writes_occupancy_and_samples() {
        let store = MemoryStore::new();
        store.add_site(site("a", 100, 50));
        store.add_site(site("b", 150, 60));
        store.add_assignment(assignment("1", "a", "b", 300.0));
        store.add_performance("a", Utc::now(), 4.0);

        let collection = collector(&store)
            .collect_site_loads(&Config::default())
            .await
            .unwrap();

        assert!(collection.issues.is_empty());
        assert_eq!(store.site("a").unwrap().current_occupancy, 47);
        assert_eq!(store.site("b").unwrap().current_occupancy, 63);

        let a = &collection.samples[0];
        assert_eq!(a.site_id, "a");
        assert!((a.load_percentage - 47.0).abs() < 1e-9);
        assert_eq!(a.productivity_indicator, 4.0);
        assert_eq!(collection.samples[1].productivity_indicator, 0.0);
    }

    #[tokio::test]
    async fn test_repeated_cycles_do_not_double_count() {
        let store = MemoryStore::new();
        store.add_site(site("a", 100, 50));
        store.add_site(site("b", 100, 50));
        store.add_assignment(assignment("1", "a", "b", 1000.0));
        let collector = collector(&store);

        collector.collect_site_loads(&Config::default()).await.unwrap();
        collector.collect_site_loads(&Config::default()).await.unwrap();

        assert_eq!(store.site("a").unwrap().current_occupancy, 40);
        assert_eq!(store.site("b").unwrap().current_occupancy, 60);
    }

    #[tokio::test]
    async fn test_ineligible_and_zero_capacity_sites_are_skipped() {
        let store = MemoryStore::new();
        store.add_site(site("a", 100, 50));
        store.add_site(site("empty", 0, 0));
        let mut local_only = site("local", 100, 90);
        local_only.supports_cross_site_work = false;
        store.add_site(local_only);

        let collection = collector(&store)
            .collect_site_loads(&Config::default())
            .await
            .unwrap();

        let ids: Vec<&str> = collection.samples.iter().map(|s| s.site_id.as_str()).collect();
        assert_eq!(ids, vec!["a"]);
        assert_eq!(collection.issues.len(), 1);
        assert_eq!(collection.issues[0].subject, "empty");
        // 不参与重平衡的站点仍然回写占用
        assert_eq!(store.site("local").unwrap().current_occupancy, 90);
    }

    #[tokio::test]
    async fn test_fleet_read_failure_aborts() {
        let store = MemoryStore::new();
        store.add_site(site("a", 100, 50));
        store.fail_next(FaultKind::ActiveAssignments, 1);

        let result = collector(&store).collect_site_loads(&Config::default()).await;
        assert!(matches!(result, Err(RebalanceError::Collection { .. })));
    }

    #[tokio::test]
    async fn test_occupancy_write_failure_still_samples() {
        let store = MemoryStore::new();
        store.add_site(site("a", 100, 50));
        store.fail_next(FaultKind::OccupancyWrite, 1);

        let collection = collector(&store)
            .collect_site_loads(&Config::default())
            .await
            .unwrap();

        assert_eq!(collection.samples.len(), 1);
        assert_eq!(collection.issues.len(), 1);
        assert_eq!(collection.issues[0].stage, CycleStage::Collection);
    }

    #[tokio::test]
    async fn test_performance_read_failure_skips_site() {
        let store = MemoryStore::new();
        store.add_site(site("a", 100, 50));
        store.fail_next(FaultKind::RecentPerformance, 1);

        let collection = collector(&store)
            .collect_site_loads(&Config::default())
            .await
            .unwrap();

        assert!(collection.samples.is_empty());
        assert_eq!(collection.issues[0].subject, "a");
    }

    #[tokio::test]
    async fn test_late_site_is_skipped() {
        let store = MemoryStore::new();
        store.add_site(site("a", 100, 50));
        store.add_site(site("slow", 100, 50));
        store.set_read_delay("slow", Duration::from_millis(500));

        let mut config = Config::default();
        config.collector.cycle_deadline_seconds = 0.05;

        let collection = collector(&store).collect_site_loads(&config).await.unwrap();

        let ids: Vec<&str> = collection.samples.iter().map(|s| s.site_id.as_str()).collect();
        assert_eq!(ids, vec!["a"]);
        assert_eq!(collection.issues[0].subject, "slow");
    }

    #[tokio::test]
    async fn test_samples_keep_directory_order() {
        let store = MemoryStore::new();
        for id in ["d", "a", "c", "b"] {
            store.add_site(site(id, 100, 50));
        }
        store.set_read_delay("d", Duration::from_millis(30));

        let collection = collector(&store)
            .collect_site_loads(&Config::default())
            .await
            .unwrap();

        let ids: Vec<&str> = collection.samples.iter().map(|s| s.site_id.as_str()).collect();
        assert_eq!(ids, vec!["d", "a", "c", "b"]);
    }

    #[tokio::test]
    async fn test_collection_runs_on_spawned_task() {
        let store = MemoryStore::new();
        for id in ["a", "b", "c"] {
            store.add_site(site(id, 100, 50));
        }
        let collector = Arc::new(collector(&store));
        let config = Config::default();

        let handle = tokio::spawn({
            let collector = collector.clone();
            async move { collector.collect_site_loads(&config).await }
        });

        let collection = handle.await.unwrap().unwrap();
        assert_eq!(collection.samples.len(), 3);
        assert!(collection.issues.is_empty());
    }

    #[tokio::test]
    async fn test_occupancy_writes_run_concurrently() {
        let store = MemoryStore::new();
        let ids: Vec<String> = (0..10).map(|i| format!("s{}", i)).collect();
        for id in &ids {
            store.add_site(site(id, 100, 50));
            store.set_write_delay(id, Duration::from_millis(40));
        }

        // 逐个回写需要 400ms，会把所有采样挤出截止时间
        let mut config = Config::default();
        config.collector.cycle_deadline_seconds = 0.2;

        let collection = collector(&store).collect_site_loads(&config).await.unwrap();

        assert_eq!(collection.samples.len(), ids.len());
        assert!(collection.issues.is_empty());
    }

    #[tokio::test]
    async fn test_occupancy_write_issues_keep_directory_order() {
        let store = MemoryStore::new();
        store.add_site(site("b", 100, 50));
        store.add_site(site("a", 100, 50));
        store.set_write_delay("b", Duration::from_millis(30));
        store.fail_next(FaultKind::OccupancyWrite, 2);

        let collection = collector(&store)
            .collect_site_loads(&Config::default())
            .await
            .unwrap();

        let subjects: Vec<&str> = collection.issues.iter().map(|i| i.subject.as_str()).collect();
        assert_eq!(subjects, vec!["b", "a"]);
        assert_eq!(collection.samples.len(), 2);
    }
}
