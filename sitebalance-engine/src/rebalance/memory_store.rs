use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sitebalance_core::{
    AssignmentStatus, CrossSiteAssignment, DecisionStatus, LoadSample, Site, SiteId,
    TransferDecision,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use super::traits::SiteDataStore;

/// 一条性能指标读数
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PerformanceReading {
    pub site_id: SiteId,
    pub recorded_at: DateTime<Utc>,
    pub indicator: f64,
}

/// 车队快照，内存存储的导入/导出格式（JSON）
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FleetSnapshot {
    #[serde(default)]
    pub sites: Vec<Site>,
    #[serde(default)]
    pub assignments: Vec<CrossSiteAssignment>,
    #[serde(default)]
    pub performance: Vec<PerformanceReading>,
    #[serde(default)]
    pub history: Vec<LoadSample>,
    #[serde(default)]
    pub decisions: Vec<TransferDecision>,
}

impl FleetSnapshot {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load_from_path(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// 可注入故障的操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    ActiveSites,
    ActiveAssignments,
    RecentPerformance,
    HistoricalSample,
    OccupancyWrite,
    HistoryWrite,
    DecisionWrite,
    DecisionStatusWrite,
    AssignmentWrite,
}

/// 默认保留最近 8 天的负载历史，覆盖 7 天趋势窗口及其半天容差
pub const DEFAULT_HISTORY_RETENTION_DAYS: u32 = 8;

#[derive(Debug, Default)]
struct FleetState {
    sites: Vec<Site>,
    assignments: Vec<CrossSiteAssignment>,
    performance: HashMap<SiteId, Vec<PerformanceReading>>,
    history: HashMap<SiteId, Vec<LoadSample>>,
    decisions: Vec<TransferDecision>,
    faults: HashMap<FaultKind, u32>,
    read_delays: HashMap<SiteId, Duration>,
    write_delays: HashMap<SiteId, Duration>,
}

impl FleetState {
    /// 如果该操作还有待触发的故障则消耗一次并返回错误
    fn take_fault(&mut self, kind: FaultKind) -> Result<()> {
        if let Some(remaining) = self.faults.get_mut(&kind) {
            if *remaining > 0 {
                *remaining -= 1;
                anyhow::bail!("injected {:?} failure", kind);
            }
        }
        Ok(())
    }
}

/// MemoryStore is a simple in-memory fleet store that implements the SiteDataStore trait.
/// Used by the CLI and the test suites; production deployments provide their own store.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<RwLock<FleetState>>,
    history_retention: ChronoDuration,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            inner: Arc::new(RwLock::new(FleetState::default())),
            history_retention: ChronoDuration::days(i64::from(DEFAULT_HISTORY_RETENTION_DAYS)),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置负载历史的保留天数，追加历史时丢弃更早的记录
    pub fn with_history_retention(mut self, days: u32) -> Self {
        self.history_retention = ChronoDuration::days(i64::from(days.max(1)));
        self
    }

    pub fn from_snapshot(snapshot: FleetSnapshot) -> Self {
        let mut performance: HashMap<SiteId, Vec<PerformanceReading>> = HashMap::new();
        for reading in snapshot.performance {
            performance
                .entry(reading.site_id.clone())
                .or_default()
                .push(reading);
        }

        let mut history: HashMap<SiteId, Vec<LoadSample>> = HashMap::new();
        for sample in snapshot.history {
            history.entry(sample.site_id.clone()).or_default().push(sample);
        }

        Self {
            inner: Arc::new(RwLock::new(FleetState {
                sites: snapshot.sites,
                assignments: snapshot.assignments,
                performance,
                history,
                decisions: snapshot.decisions,
                ..FleetState::default()
            })),
            ..Self::default()
        }
    }

    /// 导出当前状态
    pub fn snapshot(&self) -> FleetSnapshot {
        let state = self.inner.read();

        let mut performance: Vec<PerformanceReading> =
            state.performance.values().flatten().cloned().collect();
        performance.sort_by(|a, b| {
            a.site_id
                .cmp(&b.site_id)
                .then(a.recorded_at.cmp(&b.recorded_at))
        });

        let mut history: Vec<LoadSample> = state.history.values().flatten().cloned().collect();
        history.sort_by(|a, b| {
            a.site_id
                .cmp(&b.site_id)
                .then(a.sampled_at.cmp(&b.sampled_at))
        });

        FleetSnapshot {
            sites: state.sites.clone(),
            assignments: state.assignments.clone(),
            performance,
            history,
            decisions: state.decisions.clone(),
        }
    }

    pub fn add_site(&self, site: Site) {
        let mut state = self.inner.write();
        state.sites.retain(|s| s.id != site.id);
        state.sites.push(site);
    }

    pub fn add_assignment(&self, assignment: CrossSiteAssignment) {
        self.inner.write().assignments.push(assignment);
    }

    pub fn add_performance(&self, site_id: &str, recorded_at: DateTime<Utc>, indicator: f64) {
        self.inner
            .write()
            .performance
            .entry(site_id.to_string())
            .or_default()
            .push(PerformanceReading {
                site_id: site_id.to_string(),
                recorded_at,
                indicator,
            });
    }

    pub fn add_history(&self, sample: LoadSample) {
        self.inner
            .write()
            .history
            .entry(sample.site_id.clone())
            .or_default()
            .push(sample);
    }

    /// 让接下来 `times` 次该操作失败
    pub fn fail_next(&self, kind: FaultKind, times: u32) {
        self.inner.write().faults.insert(kind, times);
    }

    /// 为某站点的性能读取增加延迟，用于模拟慢查询
    pub fn set_read_delay(&self, site_id: &str, delay: Duration) {
        self.inner
            .write()
            .read_delays
            .insert(site_id.to_string(), delay);
    }

    /// 为某站点的占用回写增加延迟
    pub fn set_write_delay(&self, site_id: &str, delay: Duration) {
        self.inner
            .write()
            .write_delays
            .insert(site_id.to_string(), delay);
    }

    pub fn site(&self, site_id: &str) -> Option<Site> {
        self.inner
            .read()
            .sites
            .iter()
            .find(|s| s.id == site_id)
            .cloned()
    }

    pub fn decisions(&self) -> Vec<TransferDecision> {
        self.inner.read().decisions.clone()
    }

    pub fn assignments(&self) -> Vec<CrossSiteAssignment> {
        self.inner.read().assignments.clone()
    }

    pub fn history_for(&self, site_id: &str) -> Vec<LoadSample> {
        self.inner
            .read()
            .history
            .get(site_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl SiteDataStore for MemoryStore {
    async fn get_active_sites(&self) -> Result<Vec<Site>> {
        let mut state = self.inner.write();
        state.take_fault(FaultKind::ActiveSites)?;
        Ok(state.sites.iter().filter(|s| s.is_active()).cloned().collect())
    }

    async fn get_active_cross_site_assignments(&self) -> Result<Vec<CrossSiteAssignment>> {
        let now = Utc::now();
        let mut state = self.inner.write();
        state.take_fault(FaultKind::ActiveAssignments)?;

        Ok(state
            .assignments
            .iter()
            .filter(|a| a.status == AssignmentStatus::Active)
            .filter(|a| a.start_date <= now && a.end_date.is_none_or(|end| end >= now))
            .cloned()
            .collect())
    }

    async fn get_recent_performance(&self, site_id: &str, window_days: u32) -> Result<Option<f64>> {
        let delay = {
            let mut state = self.inner.write();
            state.take_fault(FaultKind::RecentPerformance)?;
            state.read_delays.get(site_id).copied()
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let since = Utc::now() - ChronoDuration::days(i64::from(window_days));
        let state = self.inner.read();
        let readings: Vec<f64> = state
            .performance
            .get(site_id)
            .map(|readings| {
                readings
                    .iter()
                    .filter(|r| r.recorded_at >= since)
                    .map(|r| r.indicator)
                    .collect()
            })
            .unwrap_or_default();

        if readings.is_empty() {
            return Ok(None);
        }

        Ok(Some(readings.iter().sum::<f64>() / readings.len() as f64))
    }

    async fn get_historical_sample(
        &self,
        site_id: &str,
        days_ago: u32,
    ) -> Result<Option<LoadSample>> {
        let mut state = self.inner.write();
        state.take_fault(FaultKind::HistoricalSample)?;

        // 取落在目标时刻前后半天内、且最接近目标时刻的那一条
        let target = Utc::now() - ChronoDuration::days(i64::from(days_ago));
        let tolerance = ChronoDuration::hours(12);

        Ok(state.history.get(site_id).and_then(|samples| {
            samples
                .iter()
                .filter(|s| (s.sampled_at - target).abs() <= tolerance)
                .min_by_key(|s| (s.sampled_at - target).abs())
                .cloned()
        }))
    }

    async fn upsert_site_occupancy(&self, site_id: &str, occupancy: u32) -> Result<()> {
        let delay = {
            let mut state = self.inner.write();
            state.take_fault(FaultKind::OccupancyWrite)?;
            state.write_delays.get(site_id).copied()
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.inner.write();

        match state.sites.iter_mut().find(|s| s.id == site_id) {
            Some(site) => {
                site.current_occupancy = occupancy;
                Ok(())
            }
            None => anyhow::bail!("Site '{}' not found", site_id),
        }
    }

    async fn append_load_history(&self, sample: &LoadSample) -> Result<()> {
        let mut state = self.inner.write();
        state.take_fault(FaultKind::HistoryWrite)?;

        let cutoff = Utc::now() - self.history_retention;
        let samples = state.history.entry(sample.site_id.clone()).or_default();
        let before = samples.len();
        samples.retain(|s| s.sampled_at >= cutoff);
        if samples.len() < before {
            debug!(
                "Dropped {} expired history samples for site {}",
                before - samples.len(),
                sample.site_id
            );
        }
        samples.push(sample.clone());
        Ok(())
    }

    async fn insert_transfer_decision(&self, decision: &TransferDecision) -> Result<()> {
        let mut state = self.inner.write();
        state.take_fault(FaultKind::DecisionWrite)?;

        if state.decisions.iter().any(|d| d.id == decision.id) {
            debug!("Decision {} already recorded, skipping duplicate", decision.id);
            return Ok(());
        }
        state.decisions.push(decision.clone());
        Ok(())
    }

    async fn update_transfer_decision_status(
        &self,
        decision_id: Uuid,
        status: DecisionStatus,
    ) -> Result<()> {
        let mut state = self.inner.write();
        state.take_fault(FaultKind::DecisionStatusWrite)?;

        match state.decisions.iter_mut().find(|d| d.id == decision_id) {
            Some(decision) => {
                decision.status = status;
                Ok(())
            }
            None => anyhow::bail!("Decision '{}' not found", decision_id),
        }
    }

    async fn insert_cross_site_assignment(&self, assignment: &CrossSiteAssignment) -> Result<()> {
        let mut state = self.inner.write();
        state.take_fault(FaultKind::AssignmentWrite)?;

        if state.assignments.iter().any(|a| a.id == assignment.id) {
            debug!("Assignment {} already recorded, skipping duplicate", assignment.id);
            return Ok(());
        }
        state.assignments.push(assignment.clone());
        Ok(())
    }
}
