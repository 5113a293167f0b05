use chrono::{DateTime, Utc};
use serde::Serialize;
use sitebalance_core::{
    Config, LoadSample, LoadTrend, NewTransferDecision, PlannerSettings, PriorityLevel,
    RebalanceError, ThresholdSettings, TransferDecision, TransferMethod,
};
use tracing::{debug, info, warn};

/// 体积和阈值比较时的浮点容差
const EPSILON: f64 = 1e-9;

const BALANCE_WEIGHT: f64 = 0.4;
const RESPONSE_TIME_WEIGHT: f64 = 0.3;
const CAPACITY_WEIGHT: f64 = 0.2;
const TREND_BONUS: f64 = 0.1;

/// 高于该负载百分比的源站点，决策优先级为 High
const HIGH_PRIORITY_LOAD_PERCENTAGE: f64 = 90.0;

const MIN_DURATION_MINUTES: f64 = 15.0;
const MAX_DURATION_MINUTES: f64 = 120.0;

/// 候选评分的各项分量
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    /// 源站点负载比例下降量减去目标站点上升量的一半
    pub balance_improvement: f64,
    /// 源站点性能指标比目标差多少（相对值）
    pub response_time_differential: f64,
    /// 本次转移占目标剩余容量的比例
    pub capacity_utilization: f64,
    pub trend_alignment: f64,
}

impl ScoreBreakdown {
    /// 加权总分，截断到 [0, 1]
    pub fn total(&self) -> f64 {
        let raw = BALANCE_WEIGHT * self.balance_improvement
            + RESPONSE_TIME_WEIGHT * self.response_time_differential
            + CAPACITY_WEIGHT * self.capacity_utilization
            + self.trend_alignment;
        raw.clamp(0.0, 1.0)
    }
}

/// 一个源站点的转移候选
#[derive(Debug, Clone, Serialize)]
pub struct TransferCandidate {
    /// 在目标工作副本列表中的位置
    pub target_index: usize,
    pub target_site_id: String,
    pub volume: f64,
    pub score: f64,
    pub breakdown: ScoreBreakdown,
}

/// 规划结果
#[derive(Debug, Default)]
pub struct PlanOutcome {
    pub decisions: Vec<TransferDecision>,
    /// 评分或构造失败而被跳过的候选
    pub skipped: Vec<RebalanceError>,
}

/// 转移规划器
///
/// 按源站点从最严重到最轻依次贪心分配：每个源站点挑选得分最高的若干目标，
/// 选中后立即更新目标的工作副本，后续源站点看到的是已经被占用过的余量。
#[derive(Debug, Clone)]
pub struct TransferPlanner {
    thresholds: ThresholdSettings,
    settings: PlannerSettings,
}

impl TransferPlanner {
    pub fn new(config: &Config) -> Self {
        Self {
            thresholds: config.thresholds.clone(),
            settings: config.planner.clone(),
        }
    }

    /// 为过载站点规划转移
    ///
    /// `sources` 应按处理顺序排列（先临界后过载，最严重的在前），
    /// 低于高负载阈值的源站点会被忽略。
    pub fn plan(
        &self,
        sources: &[LoadSample],
        underloaded: &[LoadSample],
        decided_at: DateTime<Utc>,
    ) -> PlanOutcome {
        let mut outcome = PlanOutcome::default();

        if sources.is_empty() || underloaded.is_empty() {
            debug!(
                "Nothing to plan: {} sources, {} targets",
                sources.len(),
                underloaded.len()
            );
            return outcome;
        }

        let high_pct = self.thresholds.high_percentage();
        let mut targets: Vec<LoadSample> = underloaded.to_vec();

        for source in sources {
            if source.load_percentage + EPSILON < high_pct {
                debug!(
                    "Source {} at {:.1}% is below the high load threshold, ignoring",
                    source.site_id, source.load_percentage
                );
                continue;
            }

            let excess = source.current_load - source.max_capacity * self.thresholds.optimal_high();
            if excess.is_nan() || excess <= EPSILON {
                debug!("Source {} has no excess above the optimal range", source.site_id);
                continue;
            }

            let candidates = self.rank_candidates(source, &targets, excess, &mut outcome.skipped);
            let mut remaining = excess;

            for candidate in candidates
                .into_iter()
                .take(self.settings.max_transfers_per_source)
            {
                let volume = candidate.volume.min(remaining);
                if volume <= EPSILON {
                    break;
                }

                let target = &targets[candidate.target_index];
                match self.materialize(source, target, volume, decided_at) {
                    Ok(decision) => {
                        debug!(
                            "Planned transfer {} -> {}: volume={:.2}, score={:.3}",
                            decision.source_site_id,
                            decision.target_site_id,
                            volume,
                            candidate.score
                        );
                        remaining -= volume;
                        let updated = target.with_load(target.current_load + volume);
                        targets[candidate.target_index] = updated;
                        outcome.decisions.push(decision);
                    }
                    Err(e) => {
                        warn!("Skipping transfer {} -> {}: {}", source.site_id, candidate.target_site_id, e);
                        outcome.skipped.push(e);
                    }
                }
            }
        }

        if !outcome.decisions.is_empty() {
            info!(
                "Planned {} transfers ({} candidates skipped)",
                outcome.decisions.len(),
                outcome.skipped.len()
            );
        }

        outcome
    }

    /// 计算一个源站点对所有目标的候选，按得分降序、目标ID升序排列
    pub fn rank_candidates(
        &self,
        source: &LoadSample,
        targets: &[LoadSample],
        excess: f64,
        skipped: &mut Vec<RebalanceError>,
    ) -> Vec<TransferCandidate> {
        let per_transfer_cap = self.settings.max_excess_fraction_per_transfer * excess;
        let mut candidates = Vec::new();

        for (index, target) in targets.iter().enumerate() {
            if target.site_id == source.site_id {
                continue;
            }

            let headroom = target.max_capacity * self.thresholds.optimal_low() - target.current_load;
            if headroom.is_nan() || headroom <= EPSILON {
                continue;
            }

            let volume = excess.min(headroom).min(per_transfer_cap);
            if volume <= EPSILON {
                continue;
            }

            match Self::score_candidate(source, target, volume) {
                Ok(breakdown) => candidates.push(TransferCandidate {
                    target_index: index,
                    target_site_id: target.site_id.clone(),
                    volume,
                    score: breakdown.total(),
                    breakdown,
                }),
                Err(e) => {
                    warn!("Skipping candidate {} -> {}: {}", source.site_id, target.site_id, e);
                    skipped.push(e);
                }
            }
        }

        candidates.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.target_site_id.cmp(&b.target_site_id))
        });

        candidates
    }

    /// 给一次转移打分
    pub fn score_candidate(
        source: &LoadSample,
        target: &LoadSample,
        volume: f64,
    ) -> Result<ScoreBreakdown, RebalanceError> {
        let fail = |reason: &str| RebalanceError::planning(&source.site_id, &target.site_id, reason);

        if source.max_capacity <= 0.0 || target.max_capacity <= 0.0 {
            return Err(fail("zero capacity"));
        }
        if target.available_capacity <= 0.0 {
            return Err(fail("target has no available capacity"));
        }

        let source_delta = volume / source.max_capacity;
        let target_delta = volume / target.max_capacity;
        let balance_improvement = source_delta - 0.5 * target_delta;

        let response_time_differential =
            if source.productivity_indicator > target.productivity_indicator
                && source.productivity_indicator > 0.0
            {
                (source.productivity_indicator - target.productivity_indicator)
                    / source.productivity_indicator
            } else {
                0.0
            };

        let capacity_utilization = (volume / target.available_capacity).min(1.0);

        let trend_alignment =
            if source.trend == LoadTrend::Increasing && target.trend != LoadTrend::Increasing {
                TREND_BONUS
            } else {
                0.0
            };

        let breakdown = ScoreBreakdown {
            balance_improvement,
            response_time_differential,
            capacity_utilization,
            trend_alignment,
        };

        let raw = [
            balance_improvement,
            response_time_differential,
            capacity_utilization,
            trend_alignment,
        ];
        if raw.iter().any(|v| !v.is_finite()) {
            return Err(fail("non-finite score"));
        }

        Ok(breakdown)
    }

    fn materialize(
        &self,
        source: &LoadSample,
        target: &LoadSample,
        volume: f64,
        decided_at: DateTime<Utc>,
    ) -> Result<TransferDecision, RebalanceError> {
        let priority_level = if source.load_percentage > HIGH_PRIORITY_LOAD_PERCENTAGE {
            PriorityLevel::High
        } else {
            PriorityLevel::Medium
        };

        let transfer_method =
            if source.load_percentage + EPSILON >= self.thresholds.critical_percentage() {
                TransferMethod::QueueRedirect
            } else {
                TransferMethod::StaffReassignment
            };

        let estimated_duration_minutes =
            (volume * 2.0).clamp(MIN_DURATION_MINUTES, MAX_DURATION_MINUTES).round() as u32;

        TransferDecision::new(
            NewTransferDecision {
                source_site_id: source.site_id.clone(),
                target_site_id: target.site_id.clone(),
                workload_type: self.settings.workload_type.clone(),
                volume_to_transfer: volume,
                priority_level,
                estimated_duration_minutes,
                transfer_method,
                cost_impact: volume * self.settings.transfer_unit_cost,
                expected_benefit: source.load_percentage * volume * self.settings.benefit_factor,
            },
            decided_at,
        )
    }
}
