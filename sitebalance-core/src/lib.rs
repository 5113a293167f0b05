//! Sitebalance Core Library
//!
//! This library provides core functionality for the sitebalance system including:
//! - Configuration management
//! - Domain types shared by the engine and its stores
//! - The rebalancing error taxonomy

pub mod config;
pub mod domain;
pub mod error;

// Re-export commonly used types
pub use config::model::{
    CollectorSettings, Config, PlannerSettings, RecorderSettings, ScheduleSettings,
    ThresholdSettings,
};
pub use domain::{
    AssignmentStatus, CrossSiteAssignment, DecisionStatus, LoadBalancingMetrics, LoadSample,
    LoadTrend, NewTransferDecision, PriorityLevel, Site, SiteId, SiteStatus, TransferDecision,
    TransferMethod,
};
pub use error::RebalanceError;
