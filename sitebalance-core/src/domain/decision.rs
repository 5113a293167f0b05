use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::site::SiteId;
use crate::error::RebalanceError;

/// 决策ID的命名空间，保证同一时间戳/源/目标生成相同的ID
const DECISION_NAMESPACE: Uuid = Uuid::from_u128(0x6d3f_1c2a_8b4e_4f7a_9c21_5e0b_a7d4_3f18);

/// 决策优先级
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PriorityLevel {
    High,
    Medium,
}

impl fmt::Display for PriorityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriorityLevel::High => write!(f, "high"),
            PriorityLevel::Medium => write!(f, "medium"),
        }
    }
}

/// 转移方式
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransferMethod {
    /// 源站点已处于临界状态，直接把排队中的工作改道到目标站点
    QueueRedirect,
    /// 通过跨站点借调人员分担负载
    StaffReassignment,
}

impl fmt::Display for TransferMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferMethod::QueueRedirect => write!(f, "queue_redirect"),
            TransferMethod::StaffReassignment => write!(f, "staff_reassignment"),
        }
    }
}

/// 决策执行状态，引擎只写入 `Pending`，其余由下游更新
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    #[default]
    Pending,
    Executing,
    Completed,
    Failed,
    Cancelled,
}

/// 构造 [`TransferDecision`] 所需的输入
#[derive(Debug, Clone)]
pub struct NewTransferDecision {
    pub source_site_id: SiteId,
    pub target_site_id: SiteId,
    pub workload_type: String,
    pub volume_to_transfer: f64,
    pub priority_level: PriorityLevel,
    pub estimated_duration_minutes: u32,
    pub transfer_method: TransferMethod,
    pub cost_impact: f64,
    pub expected_benefit: f64,
}

/// 转移决策，引擎的主要输出
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TransferDecision {
    pub id: Uuid,
    pub source_site_id: SiteId,
    pub target_site_id: SiteId,
    pub workload_type: String,
    pub volume_to_transfer: f64,
    pub priority_level: PriorityLevel,
    pub estimated_duration_minutes: u32,
    pub transfer_method: TransferMethod,
    pub cost_impact: f64,
    pub expected_benefit: f64,
    pub status: DecisionStatus,
    pub decision_timestamp: DateTime<Utc>,
}

impl TransferDecision {
    /// 校验并创建决策
    pub fn new(input: NewTransferDecision, decided_at: DateTime<Utc>) -> Result<Self, RebalanceError> {
        if input.source_site_id == input.target_site_id {
            return Err(RebalanceError::InvalidDecision(format!(
                "source and target are the same site '{}'",
                input.source_site_id
            )));
        }

        if !input.volume_to_transfer.is_finite() || input.volume_to_transfer <= 0.0 {
            return Err(RebalanceError::InvalidDecision(format!(
                "volume {} from '{}' to '{}' must be positive",
                input.volume_to_transfer, input.source_site_id, input.target_site_id
            )));
        }

        if !input.cost_impact.is_finite() || !input.expected_benefit.is_finite() {
            return Err(RebalanceError::InvalidDecision(format!(
                "non-finite cost or benefit for '{}' -> '{}'",
                input.source_site_id, input.target_site_id
            )));
        }

        Ok(Self {
            id: Self::derive_id(decided_at, &input.source_site_id, &input.target_site_id),
            source_site_id: input.source_site_id,
            target_site_id: input.target_site_id,
            workload_type: input.workload_type,
            volume_to_transfer: input.volume_to_transfer,
            priority_level: input.priority_level,
            estimated_duration_minutes: input.estimated_duration_minutes,
            transfer_method: input.transfer_method,
            cost_impact: input.cost_impact,
            expected_benefit: input.expected_benefit,
            status: DecisionStatus::Pending,
            decision_timestamp: decided_at,
        })
    }

    /// 由时间戳、源站点、目标站点派生决策ID，重复提交同一决策时可据此去重
    pub fn derive_id(decided_at: DateTime<Utc>, source: &str, target: &str) -> Uuid {
        let name = format!(
            "{}|{}|{}",
            decided_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            source,
            target
        );
        Uuid::new_v5(&DECISION_NAMESPACE, name.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_decision(source: &str, target: &str, volume: f64) -> NewTransferDecision {
        NewTransferDecision {
            source_site_id: source.to_string(),
            target_site_id: target.to_string(),
            workload_type: "general".to_string(),
            volume_to_transfer: volume,
            priority_level: PriorityLevel::Medium,
            estimated_duration_minutes: 15,
            transfer_method: TransferMethod::StaffReassignment,
            cost_impact: volume * 10.0,
            expected_benefit: 1.0,
        }
    }

    #[test]
    fn test_rejects_self_transfer() {
        let result = TransferDecision::new(new_decision("a", "a", 3.0), Utc::now());
        assert!(matches!(result, Err(RebalanceError::InvalidDecision(_))));
    }

    #[test]
    fn test_rejects_non_positive_volume() {
        assert!(TransferDecision::new(new_decision("a", "b", 0.0), Utc::now()).is_err());
        assert!(TransferDecision::new(new_decision("a", "b", -1.0), Utc::now()).is_err());
        assert!(TransferDecision::new(new_decision("a", "b", f64::NAN), Utc::now()).is_err());
    }

    #[test]
    fn test_id_is_derived_deterministically() {
        let now = Utc::now();
        let first = TransferDecision::new(new_decision("a", "b", 3.0), now).unwrap();
        let second = TransferDecision::new(new_decision("a", "b", 2.0), now).unwrap();
        let other_target = TransferDecision::new(new_decision("a", "c", 3.0), now).unwrap();

        assert_eq!(first.id, second.id);
        assert_ne!(first.id, other_target.id);
        assert_eq!(first.status, DecisionStatus::Pending);
    }
}
