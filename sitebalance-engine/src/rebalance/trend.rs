use sitebalance_core::{CollectorSettings, LoadTrend};
use std::sync::Arc;
use tracing::{debug, warn};

use super::traits::SiteDataStore;

/// 趋势分析器
///
/// 用最近 N 天性能指标的滚动平均，与 N 天前那一条历史采样的指标比较，
/// 差值超过阈值即判定为上升/下降。缺少数据或读取失败时一律视为平稳，不向调用方报错。
#[derive(Clone)]
pub struct TrendAnalyzer {
    store: Arc<dyn SiteDataStore>,
    window_days: u32,
    delta_threshold: f64,
}

impl TrendAnalyzer {
    pub fn new(store: Arc<dyn SiteDataStore>, settings: &CollectorSettings) -> Self {
        Self {
            store,
            window_days: settings.trend_window_days,
            delta_threshold: settings.trend_delta_threshold,
        }
    }

    /// 计算站点的负载趋势
    pub async fn trend_for(&self, site_id: &str) -> LoadTrend {
        let current = match self
            .store
            .get_recent_performance(site_id, self.window_days)
            .await
        {
            Ok(current) => current,
            Err(e) => {
                warn!("Failed to read recent performance for trend of site {}: {}", site_id, e);
                return LoadTrend::Stable;
            }
        };

        self.trend_with_current(site_id, current).await
    }

    /// 已经拿到当前滚动平均时使用，避免重复读取
    pub async fn trend_with_current(&self, site_id: &str, current: Option<f64>) -> LoadTrend {
        let Some(current) = current else {
            debug!("No recent performance for site {}, trend defaults to stable", site_id);
            return LoadTrend::Stable;
        };

        let historical = match self
            .store
            .get_historical_sample(site_id, self.window_days)
            .await
        {
            Ok(Some(sample)) => sample.productivity_indicator,
            Ok(None) => {
                debug!(
                    "No sample from {} days ago for site {}, trend defaults to stable",
                    self.window_days, site_id
                );
                return LoadTrend::Stable;
            }
            Err(e) => {
                warn!("Failed to read historical sample for site {}: {}", site_id, e);
                return LoadTrend::Stable;
            }
        };

        let trend = Self::compare(current, historical, self.delta_threshold);
        debug!(
            "Trend for site {}: current={:.2}, historical={:.2}, trend={}",
            site_id, current, historical, trend
        );
        trend
    }

    /// 纯比较函数
    pub fn compare(current: f64, historical: f64, delta_threshold: f64) -> LoadTrend {
        let delta = current - historical;

        if !delta.is_finite() {
            return LoadTrend::Stable;
        }

        if delta > delta_threshold {
            LoadTrend::Increasing
        } else if delta < -delta_threshold {
            LoadTrend::Decreasing
        } else {
            LoadTrend::Stable
        }
    }
}
