use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::site::SiteId;

/// 负载趋势
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoadTrend {
    Increasing,
    Decreasing,
    #[default]
    Stable,
}

impl fmt::Display for LoadTrend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadTrend::Increasing => write!(f, "increasing"),
            LoadTrend::Decreasing => write!(f, "decreasing"),
            LoadTrend::Stable => write!(f, "stable"),
        }
    }
}

/// 某一时刻的站点负载采样
///
/// 每个周期重新生成，生成后不再修改；规划器需要调整时通过 [`LoadSample::with_load`]
/// 得到一份新的工作副本。
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoadSample {
    pub site_id: SiteId,
    pub current_load: f64,
    pub max_capacity: f64,
    /// 0-100，不做上限截断，超额承诺是合法且需要被识别的状态
    pub load_percentage: f64,
    pub available_capacity: f64,
    /// 超出容量部分积压的工作单元数
    pub queue_depth: u32,
    /// 近期性能指标的滚动平均，作为响应时间的代理信号（越高越差）
    pub productivity_indicator: f64,
    #[serde(default)]
    pub trend: LoadTrend,
    pub sampled_at: DateTime<Utc>,
}

impl LoadSample {
    /// 根据负载和容量生成采样，派生字段在这里统一计算
    pub fn measure(
        site_id: impl Into<SiteId>,
        current_load: f64,
        max_capacity: f64,
        productivity_indicator: f64,
        trend: LoadTrend,
        sampled_at: DateTime<Utc>,
    ) -> Self {
        let load_percentage = if max_capacity > 0.0 {
            current_load / max_capacity * 100.0
        } else {
            0.0
        };
        let overflow = (current_load - max_capacity).max(0.0);

        Self {
            site_id: site_id.into(),
            current_load,
            max_capacity,
            load_percentage,
            available_capacity: (max_capacity - current_load).max(0.0),
            queue_depth: overflow.ceil() as u32,
            productivity_indicator,
            trend,
            sampled_at,
        }
    }

    /// 返回负载替换为 `current_load` 后的新采样
    pub fn with_load(&self, current_load: f64) -> Self {
        Self::measure(
            self.site_id.clone(),
            current_load,
            self.max_capacity,
            self.productivity_indicator,
            self.trend,
            self.sampled_at,
        )
    }

    pub fn with_trend(mut self, trend: LoadTrend) -> Self {
        self.trend = trend;
        self
    }

    /// 负载占容量的比例（0.0-1.0+）
    pub fn load_fraction(&self) -> f64 {
        self.load_percentage / 100.0
    }
}
