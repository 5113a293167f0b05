pub mod classifier;
pub mod collector;
pub mod history;
pub mod memory_store;
pub mod metrics;
pub mod outcome;
pub mod planner;
pub mod recorder;
pub mod service;
pub mod traits;
pub mod trend;


pub use classifier::{classify, Classification};
pub use collector::{Collection, LoadCollector};
pub use history::HistoryWriter;
pub use memory_store::{FaultKind, FleetSnapshot, MemoryStore, PerformanceReading};
pub use metrics::summarize;
pub use outcome::{BucketCounts, CycleIssue, CycleOutcome, CycleStage};
pub use planner::{PlanOutcome, ScoreBreakdown, TransferCandidate, TransferPlanner};
pub use recorder::{DecisionRecorder, DroppedDecision, RecordReport};
pub use service::RebalanceService;
pub use traits::SiteDataStore;
pub use trend::TrendAnalyzer;
