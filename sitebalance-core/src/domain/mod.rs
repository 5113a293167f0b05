//! 重平衡引擎使用的强类型实体

pub mod assignment;
pub mod decision;
pub mod metrics;
pub mod sample;
pub mod site;

pub use assignment::{AssignmentStatus, CrossSiteAssignment};
pub use decision::{DecisionStatus, NewTransferDecision, PriorityLevel, TransferDecision, TransferMethod};
pub use metrics::LoadBalancingMetrics;
pub use sample::{LoadSample, LoadTrend};
pub use site::{Site, SiteId, SiteStatus};
