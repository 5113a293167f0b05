use serde::Serialize;
use sitebalance_core::{LoadBalancingMetrics, RebalanceError, TransferDecision};
use std::fmt;

/// 问题发生的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStage {
    Collection,
    Planning,
    Persistence,
}

impl fmt::Display for CycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleStage::Collection => write!(f, "collection"),
            CycleStage::Planning => write!(f, "planning"),
            CycleStage::Persistence => write!(f, "persistence"),
        }
    }
}

/// 被隔离的单站点/单候选失败，不会中止周期
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleIssue {
    pub stage: CycleStage,
    /// 出问题的站点ID或 `源->目标`
    pub subject: String,
    pub message: String,
}

impl CycleIssue {
    pub fn new(stage: CycleStage, subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage,
            subject: subject.into(),
            message: message.into(),
        }
    }

    pub fn from_error(stage: CycleStage, subject: impl Into<String>, error: &RebalanceError) -> Self {
        Self::new(stage, subject, error.to_string())
    }
}

impl fmt::Display for CycleIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.stage, self.subject, self.message)
    }
}

/// 各分类桶的站点数
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BucketCounts {
    pub critical: usize,
    pub overloaded: usize,
    pub optimal: usize,
    pub underloaded: usize,
}

/// 一个周期的完整结果：汇总指标、生效的决策和被隔离的问题
#[derive(Debug, Clone, Serialize)]
pub struct CycleOutcome {
    pub metrics: LoadBalancingMetrics,
    pub buckets: BucketCounts,
    pub decisions: Vec<TransferDecision>,
    pub issues: Vec<CycleIssue>,
    /// 演练模式下决策只规划不持久化
    pub dry_run: bool,
}

impl CycleOutcome {
    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }

    pub fn issues_in(&self, stage: CycleStage) -> impl Iterator<Item = &CycleIssue> {
        self.issues.iter().filter(move |i| i.stage == stage)
    }
}
