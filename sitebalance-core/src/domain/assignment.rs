use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::decision::TransferDecision;
use super::site::SiteId;

/// 跨站点借调状态
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    #[default]
    Requested,
    Active,
    Completed,
    Cancelled,
}

/// 跨站点借调记录
///
/// `workload_percentage` 以“一个工作单元”为基准：100.0 表示一个完整的工作单元槽位，
/// 50.0 表示半个。
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CrossSiteAssignment {
    pub id: String,
    pub unit_id: String,
    pub home_site_id: SiteId,
    pub host_site_id: SiteId,
    pub workload_percentage: f64,
    #[serde(default)]
    pub status: AssignmentStatus,
    pub start_date: DateTime<Utc>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
}

impl CrossSiteAssignment {
    /// 借调折算的工作单元数
    pub fn workload_units(&self) -> f64 {
        self.workload_percentage / 100.0
    }

    pub fn is_active(&self) -> bool {
        self.status == AssignmentStatus::Active
    }

    /// 将转移决策物化为一条待执行的借调请求，下游排班系统可直接消费
    pub fn requested_from(decision: &TransferDecision) -> Self {
        Self {
            id: format!("assignment-{}", decision.id),
            unit_id: format!("transfer-{}", decision.id),
            home_site_id: decision.source_site_id.clone(),
            host_site_id: decision.target_site_id.clone(),
            workload_percentage: decision.volume_to_transfer * 100.0,
            status: AssignmentStatus::Requested,
            start_date: decision.decision_timestamp,
            end_date: None,
        }
    }
}
