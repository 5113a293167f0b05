use serde::Serialize;
use sitebalance_core::{
    CrossSiteAssignment, DecisionStatus, RebalanceError, RecorderSettings, TransferDecision,
};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::traits::SiteDataStore;

/// 重试后仍无法持久化、被丢弃的决策
#[derive(Debug, Clone, Serialize)]
pub struct DroppedDecision {
    pub decision_id: Uuid,
    pub source_site_id: String,
    pub target_site_id: String,
    pub reason: String,
}

/// 一次记录的结果
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecordReport {
    pub persisted: Vec<TransferDecision>,
    pub dropped: Vec<DroppedDecision>,
}

impl RecordReport {
    pub fn persisted_count(&self) -> usize {
        self.persisted.len()
    }
}

/// 决策记录器
///
/// 每个决策先写审计记录，再写一条状态为 Requested 的跨站点借调供下游执行。
/// 两次写入各自按配置重试，仍失败时丢弃该决策并记录错误日志，不影响其他决策。
/// 借调写入失败时审计记录改为 Failed，不会留下没有对应借调的 Pending 决策。
pub struct DecisionRecorder {
    store: Arc<dyn SiteDataStore>,
}

impl DecisionRecorder {
    pub fn new(store: Arc<dyn SiteDataStore>) -> Self {
        Self { store }
    }

    pub async fn record(
        &self,
        decisions: &[TransferDecision],
        settings: &RecorderSettings,
    ) -> RecordReport {
        let mut report = RecordReport::default();

        for decision in decisions {
            match self.record_one(decision, settings).await {
                Ok(()) => {
                    debug!(
                        "Recorded decision {} ({} -> {}, volume={:.2})",
                        decision.id,
                        decision.source_site_id,
                        decision.target_site_id,
                        decision.volume_to_transfer
                    );
                    report.persisted.push(decision.clone());
                }
                Err(e) => {
                    error!(
                        "Dropping decision {} ({} -> {}): {}",
                        decision.id, decision.source_site_id, decision.target_site_id, e
                    );
                    report.dropped.push(DroppedDecision {
                        decision_id: decision.id,
                        source_site_id: decision.source_site_id.clone(),
                        target_site_id: decision.target_site_id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if !decisions.is_empty() {
            info!(
                "Recorded {}/{} transfer decisions",
                report.persisted.len(),
                decisions.len()
            );
        }

        report
    }

    async fn record_one(
        &self,
        decision: &TransferDecision,
        settings: &RecorderSettings,
    ) -> Result<(), RebalanceError> {
        with_retry("insert_transfer_decision", settings, || {
            self.store.insert_transfer_decision(decision)
        })
        .await?;

        let assignment = CrossSiteAssignment::requested_from(decision);
        let result = with_retry("insert_cross_site_assignment", settings, || {
            self.store.insert_cross_site_assignment(&assignment)
        })
        .await;

        if result.is_err() {
            self.mark_failed(decision, settings).await;
        }
        result
    }

    async fn mark_failed(&self, decision: &TransferDecision, settings: &RecorderSettings) {
        let marked = with_retry("update_transfer_decision_status", settings, || {
            self.store
                .update_transfer_decision_status(decision.id, DecisionStatus::Failed)
        })
        .await;

        if let Err(e) = marked {
            error!(
                "Decision {} has no assignment and could not be marked failed: {}",
                decision.id, e
            );
        }
    }
}

/// 首次尝试失败后最多再重试 `decision_write_retries` 次，每次间隔固定退避
async fn with_retry<F, Fut>(
    operation: &'static str,
    settings: &RecorderSettings,
    mut attempt: F,
) -> Result<(), RebalanceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    let max_attempts = settings.decision_write_retries.saturating_add(1);
    let mut tries = 0;

    loop {
        tries += 1;
        match attempt().await {
            Ok(()) => return Ok(()),
            Err(e) if tries < max_attempts => {
                warn!(
                    "{} failed (attempt {}/{}), retrying in {:?}: {}",
                    operation,
                    tries,
                    max_attempts,
                    settings.retry_backoff(),
                    e
                );
                tokio::time::sleep(settings.retry_backoff()).await;
            }
            Err(e) => return Err(RebalanceError::persistence(operation, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rebalance::memory_store::{FaultKind, MemoryStore};
    use chrono::Utc;
    use sitebalance_core::{
        AssignmentStatus, NewTransferDecision, PriorityLevel, TransferMethod,
    };

    fn decision(source: &str, target: &str) -> TransferDecision {
        TransferDecision::new(
            NewTransferDecision {
                source_site_id: source.to_string(),
                target_site_id: target.to_string(),
                workload_type: "general".to_string(),
                volume_to_transfer: 2.5,
                priority_level: PriorityLevel::Medium,
                estimated_duration_minutes: 15,
                transfer_method: TransferMethod::StaffReassignment,
                cost_impact: 31.25,
                expected_benefit: 2.2,
            },
            Utc::now(),
        )
        .unwrap()
    }

    fn settings() -> RecorderSettings {
        RecorderSettings {
            decision_write_retries: 1,
            retry_backoff_ms: 1,
        }
    }

    #[tokio::test]
    async fn test_records_decision_and_assignment() {
        let store = MemoryStore::new();
        let recorder = DecisionRecorder::new(Arc::new(store.clone()));

        let report = recorder.record(&[decision("a", "b")], &settings()).await;

        assert_eq!(report.persisted_count(), 1);
        assert_eq!(store.decisions().len(), 1);

        let assignments = store.assignments();
        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments[0].home_site_id, "a");
        assert_eq!(assignments[0].host_site_id, "b");
        assert_eq!(assignments[0].status, AssignmentStatus::Requested);
        assert_eq!(assignments[0].workload_percentage, 250.0);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let store = MemoryStore::new();
        store.fail_next(FaultKind::DecisionWrite, 1);
        let recorder = DecisionRecorder::new(Arc::new(store.clone()));

        let report = recorder.record(&[decision("a", "b")], &settings()).await;

        assert_eq!(report.persisted_count(), 1);
        assert!(report.dropped.is_empty());
        assert_eq!(store.decisions().len(), 1);
    }

    #[tokio::test]
    async fn test_persistent_failure_drops_only_that_decision() {
        let store = MemoryStore::new();
        store.fail_next(FaultKind::DecisionWrite, 2);
        let recorder = DecisionRecorder::new(Arc::new(store.clone()));

        let report = recorder
            .record(&[decision("a", "b"), decision("a", "c")], &settings())
            .await;

        assert_eq!(report.dropped.len(), 1);
        assert_eq!(report.dropped[0].target_site_id, "b");
        assert_eq!(report.persisted.len(), 1);
        assert_eq!(report.persisted[0].target_site_id, "c");
    }

    #[tokio::test]
    async fn test_assignment_failure_drops_decision() {
        let store = MemoryStore::new();
        store.fail_next(FaultKind::AssignmentWrite, 2);
        let recorder = DecisionRecorder::new(Arc::new(store.clone()));

        let report = recorder.record(&[decision("a", "b")], &settings()).await;

        assert_eq!(report.dropped.len(), 1);
        assert!(report.dropped[0].reason.contains("insert_cross_site_assignment"));
        assert!(store.assignments().is_empty());
    }

    #[tokio::test]
    async fn test_dropped_decision_leaves_no_pending_audit_row() {
        let store = MemoryStore::new();
        store.fail_next(FaultKind::AssignmentWrite, 2);
        let recorder = DecisionRecorder::new(Arc::new(store.clone()));

        let report = recorder
            .record(&[decision("a", "b"), decision("a", "c")], &settings())
            .await;

        assert_eq!(report.dropped.len(), 1);
        let dropped_id = report.dropped[0].decision_id;

        let decisions = store.decisions();
        let dropped = decisions.iter().find(|d| d.id == dropped_id).unwrap();
        assert_eq!(dropped.status, DecisionStatus::Failed);

        // 仍为 Pending 的决策都有对应的借调请求
        let assignments = store.assignments();
        for d in decisions.iter().filter(|d| d.status == DecisionStatus::Pending) {
            let expected = CrossSiteAssignment::requested_from(d);
            assert!(assignments.iter().any(|a| a.id == expected.id));
        }
        assert_eq!(assignments.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_status_update_still_drops_decision() {
        let store = MemoryStore::new();
        store.fail_next(FaultKind::AssignmentWrite, 2);
        store.fail_next(FaultKind::DecisionStatusWrite, 2);
        let recorder = DecisionRecorder::new(Arc::new(store.clone()));

        let report = recorder.record(&[decision("a", "b")], &settings()).await;

        assert_eq!(report.dropped.len(), 1);
        assert!(report.persisted.is_empty());
        assert!(store.assignments().is_empty());
    }

    #[tokio::test]
    async fn test_recording_twice_is_idempotent() {
        let store = MemoryStore::new();
        let recorder = DecisionRecorder::new(Arc::new(store.clone()));
        let d = decision("a", "b");

        recorder.record(std::slice::from_ref(&d), &settings()).await;
        recorder.record(std::slice::from_ref(&d), &settings()).await;

        assert_eq!(store.decisions().len(), 1);
        assert_eq!(store.assignments().len(), 1);
    }
}
