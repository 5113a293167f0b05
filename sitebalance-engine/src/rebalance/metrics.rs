use sitebalance_core::{LoadBalancingMetrics, TransferDecision};
use std::time::Duration;

use super::classifier::Classification;

/// 汇总一个周期的指标
///
/// 方差为总体方差，少于两个站点时为 0。
pub fn summarize(
    classification: &Classification,
    decisions: &[TransferDecision],
    elapsed: Duration,
) -> LoadBalancingMetrics {
    let loads: Vec<f64> = classification.all().map(|s| s.load_percentage).collect();
    let total_sites = loads.len();
    let balanced_sites = classification.balanced_count();

    let avg_load_percentage = if total_sites > 0 {
        loads.iter().sum::<f64>() / total_sites as f64
    } else {
        0.0
    };

    let load_variance = if total_sites >= 2 {
        loads
            .iter()
            .map(|load| (load - avg_load_percentage).powi(2))
            .sum::<f64>()
            / total_sites as f64
    } else {
        0.0
    };

    let processing_time_seconds = elapsed.as_secs_f64();

    LoadBalancingMetrics {
        total_sites,
        balanced_sites,
        imbalanced_sites: total_sites - balanced_sites,
        total_transfers: decisions.len(),
        avg_load_percentage,
        load_variance,
        processing_time_seconds,
        efficiency_score: LoadBalancingMetrics::efficiency(
            balanced_sites,
            total_sites,
            load_variance,
            processing_time_seconds,
        ),
    }
}
