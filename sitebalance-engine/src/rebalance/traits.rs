use anyhow::Result;
use async_trait::async_trait;
use sitebalance_core::{CrossSiteAssignment, DecisionStatus, LoadSample, Site, TransferDecision};
use uuid::Uuid;

/// 站点数据存储接口
///
/// 引擎只依赖这个trait访问外部数据：读路径提供站点、借调和性能数据，
/// 写路径持久化占用、负载历史与转移决策。具体实现由部署方提供，
/// 测试和命令行使用 [`super::MemoryStore`]。
#[async_trait]
pub trait SiteDataStore: Send + Sync {
    /// 获取所有启用的站点（按目录顺序）
    async fn get_active_sites(&self) -> Result<Vec<Site>>;

    /// 获取当前生效的跨站点借调
    async fn get_active_cross_site_assignments(&self) -> Result<Vec<CrossSiteAssignment>>;

    /// 最近 `window_days` 天性能指标的平均值，没有数据时返回 `None`
    async fn get_recent_performance(&self, site_id: &str, window_days: u32) -> Result<Option<f64>>;

    /// `days_ago` 天前记录的负载采样
    async fn get_historical_sample(&self, site_id: &str, days_ago: u32)
        -> Result<Option<LoadSample>>;

    /// 回写重新计算后的站点占用
    async fn upsert_site_occupancy(&self, site_id: &str, occupancy: u32) -> Result<()>;

    /// 追加负载历史（尽力而为）
    async fn append_load_history(&self, sample: &LoadSample) -> Result<()>;

    /// 写入转移决策审计记录
    async fn insert_transfer_decision(&self, decision: &TransferDecision) -> Result<()>;

    /// 更新已写入审计记录的状态
    async fn update_transfer_decision_status(
        &self,
        decision_id: Uuid,
        status: DecisionStatus,
    ) -> Result<()>;

    /// 写入物化后的借调请求
    async fn insert_cross_site_assignment(&self, assignment: &CrossSiteAssignment) -> Result<()>;
}
