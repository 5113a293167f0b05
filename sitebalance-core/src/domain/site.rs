use serde::{Deserialize, Serialize};

pub type SiteId = String;

/// 站点状态
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SiteStatus {
    #[default]
    Active,
    Inactive,
}

/// 运营站点
///
/// 由外部目录服务维护，引擎只读取；每个周期开始时回写重新计算后的 `current_occupancy`。
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Site {
    pub id: SiteId,
    pub name: String,
    /// 工作单元槽位总数
    pub total_capacity: u32,
    /// 本站点自有的负载，不含跨站点借调
    #[serde(default)]
    pub base_occupancy: u32,
    /// 当前占用，允许超过容量
    #[serde(default)]
    pub current_occupancy: u32,
    #[serde(default)]
    pub status: SiteStatus,
    #[serde(default = "default_true")]
    pub supports_cross_site_work: bool,
}

impl Site {
    pub fn is_active(&self) -> bool {
        self.status == SiteStatus::Active
    }

    /// 是否参与负载采集与重平衡
    pub fn is_rebalance_eligible(&self) -> bool {
        self.is_active() && self.supports_cross_site_work
    }
}

fn default_true() -> bool {
    true
}
