use serde::Serialize;
use sitebalance_core::{LoadSample, RebalanceError, ThresholdSettings};
use std::cmp::Ordering;

use super::outcome::BucketCounts;

/// 阈值比较时容忍的浮点误差（百分点）
const THRESHOLD_EPSILON: f64 = 1e-9;

/// 负载分类结果
///
/// `critical`/`overloaded` 按负载百分比降序（最严重的在前），
/// `underloaded` 按升序（空闲最多的在前），相同负载按站点ID排序，保证处理顺序确定。
#[derive(Debug, Clone, Default, Serialize)]
pub struct Classification {
    pub critical: Vec<LoadSample>,
    pub overloaded: Vec<LoadSample>,
    pub optimal: Vec<LoadSample>,
    pub underloaded: Vec<LoadSample>,
}

impl Classification {
    /// 需要向外转移负载的站点：先临界，再过载
    pub fn sources(&self) -> Vec<LoadSample> {
        self.critical
            .iter()
            .chain(self.overloaded.iter())
            .cloned()
            .collect()
    }

    /// 所有站点的采样
    pub fn all(&self) -> impl Iterator<Item = &LoadSample> {
        self.critical
            .iter()
            .chain(self.overloaded.iter())
            .chain(self.optimal.iter())
            .chain(self.underloaded.iter())
    }

    pub fn len(&self) -> usize {
        self.critical.len() + self.overloaded.len() + self.optimal.len() + self.underloaded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn balanced_count(&self) -> usize {
        self.optimal.len()
    }

    pub fn counts(&self) -> BucketCounts {
        BucketCounts {
            critical: self.critical.len(),
            overloaded: self.overloaded.len(),
            optimal: self.optimal.len(),
            underloaded: self.underloaded.len(),
        }
    }
}

fn descending(a: &LoadSample, b: &LoadSample) -> Ordering {
    b.load_percentage
        .total_cmp(&a.load_percentage)
        .then_with(|| a.site_id.cmp(&b.site_id))
}

fn ascending(a: &LoadSample, b: &LoadSample) -> Ordering {
    a.load_percentage
        .total_cmp(&b.load_percentage)
        .then_with(|| a.site_id.cmp(&b.site_id))
}

/// 按阈值把站点分到四个桶中，每个站点恰好属于一个桶
///
/// 输入中出现非有限的负载百分比说明上游计算有缺陷，直接返回 `Classification` 错误。
pub fn classify(
    samples: &[LoadSample],
    thresholds: &ThresholdSettings,
) -> Result<Classification, RebalanceError> {
    let critical_pct = thresholds.critical_percentage();
    let high_pct = thresholds.high_percentage();
    let low_pct = thresholds.low_percentage();

    let mut classification = Classification::default();

    for sample in samples {
        let pct = sample.load_percentage;
        if !pct.is_finite() {
            return Err(RebalanceError::Classification(format!(
                "site '{}' has non-finite load percentage {}",
                sample.site_id, pct
            )));
        }

        let bucket = if pct + THRESHOLD_EPSILON >= critical_pct {
            &mut classification.critical
        } else if pct + THRESHOLD_EPSILON >= high_pct {
            &mut classification.overloaded
        } else if pct <= low_pct + THRESHOLD_EPSILON {
            &mut classification.underloaded
        } else {
            &mut classification.optimal
        };
        bucket.push(sample.clone());
    }

    classification.critical.sort_by(descending);
    classification.overloaded.sort_by(descending);
    classification.underloaded.sort_by(ascending);
    classification.optimal.sort_by(|a, b| a.site_id.cmp(&b.site_id));

    Ok(classification)
}
