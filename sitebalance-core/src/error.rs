use thiserror::Error;

/// 重平衡周期中的错误分类
///
/// - `Collection`: 读路径失败，本周期中止并上报调用方
/// - `Classification`: 纯函数不应出错，出现即为程序缺陷，不重试
/// - `Planning`: 单个候选评分失败，只跳过该候选
/// - `Persistence`: 历史写入尽力而为；决策写入重试后仍失败则记录并丢弃
#[derive(Debug, Error)]
pub enum RebalanceError {
    #[error("telemetry collection failed during {operation}: {message}")]
    Collection {
        operation: &'static str,
        message: String,
    },

    #[error("classification defect: {0}")]
    Classification(String),

    #[error("planning failed for candidate {source_site} -> {target_site}: {reason}")]
    Planning {
        source_site: String,
        target_site: String,
        reason: String,
    },

    #[error("persistence failed during {operation}: {message}")]
    Persistence {
        operation: &'static str,
        message: String,
    },

    #[error("invalid transfer decision: {0}")]
    InvalidDecision(String),

    #[error("a rebalancing cycle is already in progress")]
    CycleInProgress,

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl RebalanceError {
    pub fn collection(operation: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Collection {
            operation,
            message: err.to_string(),
        }
    }

    pub fn persistence(operation: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Persistence {
            operation,
            message: err.to_string(),
        }
    }

    pub fn planning(source: &str, target: &str, reason: impl Into<String>) -> Self {
        Self::Planning {
            source_site: source.to_string(),
            target_site: target.to_string(),
            reason: reason.into(),
        }
    }

    /// 是否需要中止整个周期
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Collection { .. } | Self::Classification(_) | Self::Config(_)
        )
    }
}
