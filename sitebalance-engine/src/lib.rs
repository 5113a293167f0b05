//! Sitebalance Engine Library
//!
//! This library provides the cross-site rebalancing cycle including:
//! - Load telemetry collection with bounded fan-out
//! - Imbalance classification and trend analysis
//! - Transfer planning and scoring
//! - Decision recording and cycle metrics

pub mod rebalance;

// Re-export commonly used types
pub use rebalance::{
    classify, summarize, BucketCounts, Classification, Collection, CycleIssue, CycleOutcome,
    CycleStage, DecisionRecorder, DroppedDecision, FaultKind, FleetSnapshot, HistoryWriter,
    LoadCollector, MemoryStore, PerformanceReading, PlanOutcome, RebalanceService, RecordReport,
    ScoreBreakdown, SiteDataStore, TransferCandidate, TransferPlanner, TrendAnalyzer,
};
