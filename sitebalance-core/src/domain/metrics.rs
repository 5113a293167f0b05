use serde::{Deserialize, Serialize};

/// 单个重平衡周期的汇总指标，不单独持久化，直接返回给调用方
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct LoadBalancingMetrics {
    pub total_sites: usize,
    pub balanced_sites: usize,
    pub imbalanced_sites: usize,
    pub total_transfers: usize,
    pub avg_load_percentage: f64,
    pub load_variance: f64,
    pub processing_time_seconds: f64,
    pub efficiency_score: f64,
}

impl LoadBalancingMetrics {
    /// 效率评分
    ///
    /// `0.5 * 均衡站点比例 + 0.3 * clamp(1 - 方差/1000) + 0.2 * clamp(1 - 耗时/5s)`，结果截断到 [0,1]
    pub fn efficiency(
        balanced_sites: usize,
        total_sites: usize,
        load_variance: f64,
        elapsed_seconds: f64,
    ) -> f64 {
        let balanced_ratio = if total_sites > 0 {
            balanced_sites as f64 / total_sites as f64
        } else {
            0.0
        };
        let variance_term = (1.0 - load_variance / 1000.0).clamp(0.0, 1.0);
        let speed_term = (1.0 - elapsed_seconds / 5.0).clamp(0.0, 1.0);

        (0.5 * balanced_ratio + 0.3 * variance_term + 0.2 * speed_term).clamp(0.0, 1.0)
    }

    /// 是否所有站点都处于最优区间
    pub fn is_fully_balanced(&self) -> bool {
        self.total_sites > 0 && self.imbalanced_sites == 0
    }
}
