use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 重平衡引擎配置
///
/// 每个周期开始时取一份不可变快照，热更新只影响之后的周期。
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub thresholds: ThresholdSettings,
    #[serde(default)]
    pub planner: PlannerSettings,
    #[serde(default)]
    pub collector: CollectorSettings,
    #[serde(default)]
    pub recorder: RecorderSettings,
    #[serde(default)]
    pub schedule: ScheduleSettings,
}

/// 负载分类阈值，均为容量比例（0.85 即 85%）
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ThresholdSettings {
    #[serde(default = "default_high_load_threshold")]
    pub high_load_threshold: f64,
    #[serde(default = "default_low_load_threshold")]
    pub low_load_threshold: f64,
    #[serde(default = "default_critical_load_threshold")]
    pub critical_load_threshold: f64,
    /// 最优负载区间 [下限, 上限]
    #[serde(default = "default_optimal_range")]
    pub optimal_range: [f64; 2],
}

/// 转移规划参数
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PlannerSettings {
    #[serde(default = "default_max_transfers_per_source")]
    pub max_transfers_per_source: usize,
    /// 单次转移最多占源站点超额负载的比例
    #[serde(default = "default_max_excess_fraction_per_transfer")]
    pub max_excess_fraction_per_transfer: f64,
    /// 每转移一个工作单元的成本
    #[serde(default = "default_transfer_unit_cost")]
    pub transfer_unit_cost: f64,
    #[serde(default = "default_benefit_factor")]
    pub benefit_factor: f64,
    #[serde(default = "default_workload_type")]
    pub workload_type: String,
}

/// 负载采集参数
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CollectorSettings {
    /// 整个采集扇出的截止时间，超时的站点本周期跳过
    #[serde(default = "default_cycle_deadline_seconds")]
    pub cycle_deadline_seconds: f64,
    /// 同时进行的站点采集任务数
    #[serde(default = "default_collector_concurrency")]
    pub collector_concurrency: usize,
    /// 性能指标滚动平均窗口
    #[serde(default = "default_window_days")]
    pub performance_window_days: u32,
    /// 趋势比较的回溯天数
    #[serde(default = "default_window_days")]
    pub trend_window_days: u32,
    #[serde(default = "default_trend_delta_threshold")]
    pub trend_delta_threshold: f64,
    /// 历史写入缓冲区大小，满了直接丢弃
    #[serde(default = "default_history_buffer_size")]
    pub history_buffer_size: usize,
}

/// 决策持久化参数
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RecorderSettings {
    /// 首次写入失败后的额外重试次数
    #[serde(default = "default_decision_write_retries")]
    pub decision_write_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

/// 定时调度参数
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScheduleSettings {
    #[serde(default = "default_schedule_interval")]
    pub interval_seconds: u64,
    #[serde(default = "default_true")]
    pub run_on_start: bool,
}

impl Default for ThresholdSettings {
    fn default() -> Self {
        Self {
            high_load_threshold: default_high_load_threshold(),
            low_load_threshold: default_low_load_threshold(),
            critical_load_threshold: default_critical_load_threshold(),
            optimal_range: default_optimal_range(),
        }
    }
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            max_transfers_per_source: default_max_transfers_per_source(),
            max_excess_fraction_per_transfer: default_max_excess_fraction_per_transfer(),
            transfer_unit_cost: default_transfer_unit_cost(),
            benefit_factor: default_benefit_factor(),
            workload_type: default_workload_type(),
        }
    }
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            cycle_deadline_seconds: default_cycle_deadline_seconds(),
            collector_concurrency: default_collector_concurrency(),
            performance_window_days: default_window_days(),
            trend_window_days: default_window_days(),
            trend_delta_threshold: default_trend_delta_threshold(),
            history_buffer_size: default_history_buffer_size(),
        }
    }
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            decision_write_retries: default_decision_write_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            interval_seconds: default_schedule_interval(),
            run_on_start: true,
        }
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_high_load_threshold() -> f64 {
    0.85
}

fn default_low_load_threshold() -> f64 {
    0.40
}

fn default_critical_load_threshold() -> f64 {
    0.95
}

fn default_optimal_range() -> [f64; 2] {
    [0.60, 0.80]
}

fn default_max_transfers_per_source() -> usize {
    2
}

fn default_max_excess_fraction_per_transfer() -> f64 {
    0.30
}

fn default_transfer_unit_cost() -> f64 {
    12.5
}

fn default_benefit_factor() -> f64 {
    0.01
}

fn default_workload_type() -> String {
    "general".to_string()
}

fn default_cycle_deadline_seconds() -> f64 {
    2.0
}

fn default_collector_concurrency() -> usize {
    16
}

fn default_window_days() -> u32 {
    7
}

fn default_trend_delta_threshold() -> f64 {
    10.0
}

fn default_history_buffer_size() -> usize {
    1024
}

fn default_decision_write_retries() -> u32 {
    1 // 至少重试一次
}

fn default_retry_backoff_ms() -> u64 {
    50
}

fn default_schedule_interval() -> u64 {
    300 // 5分钟一个周期
}

impl ThresholdSettings {
    pub fn optimal_low(&self) -> f64 {
        self.optimal_range[0]
    }

    pub fn optimal_high(&self) -> f64 {
        self.optimal_range[1]
    }

    /// 百分比形式的阈值（0-100）
    pub fn critical_percentage(&self) -> f64 {
        self.critical_load_threshold * 100.0
    }

    pub fn high_percentage(&self) -> f64 {
        self.high_load_threshold * 100.0
    }

    pub fn low_percentage(&self) -> f64 {
        self.low_load_threshold * 100.0
    }
}

impl CollectorSettings {
    pub fn cycle_deadline(&self) -> Duration {
        Duration::from_secs_f64(self.cycle_deadline_seconds)
    }
}

impl RecorderSettings {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl ScheduleSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}

impl Config {
    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        self.validate_thresholds()?;
        self.validate_planner()?;
        self.validate_collector()?;
        self.validate_recorder()?;

        if self.schedule.interval_seconds == 0 {
            anyhow::bail!("schedule.interval_seconds cannot be 0");
        }

        Ok(())
    }

    /// 验证阈值之间的顺序关系
    fn validate_thresholds(&self) -> Result<()> {
        let t = &self.thresholds;

        for (name, value) in [
            ("high_load_threshold", t.high_load_threshold),
            ("low_load_threshold", t.low_load_threshold),
            ("critical_load_threshold", t.critical_load_threshold),
            ("optimal_range[0]", t.optimal_low()),
            ("optimal_range[1]", t.optimal_high()),
        ] {
            if !value.is_finite() || value <= 0.0 {
                anyhow::bail!("thresholds.{} must be a positive fraction, got {}", name, value);
            }
            if value > 2.0 {
                anyhow::bail!(
                    "thresholds.{} is too large: {} (thresholds are fractions of capacity, maximum 2.0)",
                    name,
                    value
                );
            }
        }

        if t.low_load_threshold >= t.high_load_threshold {
            anyhow::bail!(
                "thresholds.low_load_threshold ({}) must be below high_load_threshold ({})",
                t.low_load_threshold,
                t.high_load_threshold
            );
        }

        if t.high_load_threshold > t.critical_load_threshold {
            anyhow::bail!(
                "thresholds.high_load_threshold ({}) must not exceed critical_load_threshold ({})",
                t.high_load_threshold,
                t.critical_load_threshold
            );
        }

        if t.optimal_low() >= t.optimal_high() {
            anyhow::bail!(
                "thresholds.optimal_range is inverted: [{}, {}]",
                t.optimal_low(),
                t.optimal_high()
            );
        }

        if t.optimal_high() > t.high_load_threshold {
            anyhow::bail!(
                "thresholds.optimal_range upper bound ({}) must not exceed high_load_threshold ({})",
                t.optimal_high(),
                t.high_load_threshold
            );
        }

        Ok(())
    }

    fn validate_planner(&self) -> Result<()> {
        let p = &self.planner;

        if p.max_transfers_per_source == 0 {
            anyhow::bail!("planner.max_transfers_per_source cannot be 0");
        }

        if !(p.max_excess_fraction_per_transfer > 0.0 && p.max_excess_fraction_per_transfer <= 1.0) {
            anyhow::bail!(
                "planner.max_excess_fraction_per_transfer must be within (0, 1], got {}",
                p.max_excess_fraction_per_transfer
            );
        }

        if !p.transfer_unit_cost.is_finite() || p.transfer_unit_cost < 0.0 {
            anyhow::bail!(
                "planner.transfer_unit_cost must be non-negative, got {}",
                p.transfer_unit_cost
            );
        }

        if !p.benefit_factor.is_finite() || p.benefit_factor < 0.0 {
            anyhow::bail!(
                "planner.benefit_factor must be non-negative, got {}",
                p.benefit_factor
            );
        }

        if p.workload_type.trim().is_empty() {
            anyhow::bail!("planner.workload_type cannot be empty");
        }

        Ok(())
    }

    fn validate_collector(&self) -> Result<()> {
        let c = &self.collector;

        if !c.cycle_deadline_seconds.is_finite() || c.cycle_deadline_seconds <= 0.0 {
            anyhow::bail!(
                "collector.cycle_deadline_seconds must be positive, got {}",
                c.cycle_deadline_seconds
            );
        }

        if c.cycle_deadline_seconds > 60.0 {
            anyhow::bail!(
                "collector.cycle_deadline_seconds too large: {} (maximum 60 seconds)",
                c.cycle_deadline_seconds
            );
        }

        if c.collector_concurrency == 0 {
            anyhow::bail!("collector.collector_concurrency cannot be 0");
        }

        if c.performance_window_days == 0 || c.trend_window_days == 0 {
            anyhow::bail!("collector window days cannot be 0");
        }

        if !c.trend_delta_threshold.is_finite() || c.trend_delta_threshold < 0.0 {
            anyhow::bail!(
                "collector.trend_delta_threshold must be non-negative, got {}",
                c.trend_delta_threshold
            );
        }

        if c.history_buffer_size == 0 {
            anyhow::bail!("collector.history_buffer_size cannot be 0");
        }

        Ok(())
    }

    fn validate_recorder(&self) -> Result<()> {
        let r = &self.recorder;

        if r.decision_write_retries == 0 {
            anyhow::bail!("recorder.decision_write_retries must be at least 1");
        }

        if r.decision_write_retries > 10 {
            anyhow::bail!(
                "recorder.decision_write_retries too large: {} (maximum 10)",
                r.decision_write_retries
            );
        }

        Ok(())
    }
}
