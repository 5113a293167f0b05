use anyhow::Result;
use chrono::Utc;
use parking_lot::{Mutex as SyncMutex, RwLock as SyncRwLock};
use sitebalance_core::{Config, LoadBalancingMetrics, RebalanceError};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::classifier::classify;
use super::collector::LoadCollector;
use super::history::HistoryWriter;
use super::metrics::summarize;
use super::outcome::{CycleIssue, CycleOutcome, CycleStage};
use super::planner::TransferPlanner;
use super::recorder::DecisionRecorder;
use super::traits::SiteDataStore;

/// 重平衡服务
/// 串联采集、分类、规划、记录四个阶段，提供单次执行和定时调度两种入口
pub struct RebalanceService {
    config: SyncRwLock<Arc<Config>>,
    collector: LoadCollector,
    recorder: DecisionRecorder,
    /// 同一时刻只允许一个周期运行
    cycle_gate: Mutex<()>,
    is_running: Arc<RwLock<bool>>,
    scheduler: SyncMutex<Option<Scheduler>>,
    last_metrics: SyncRwLock<Option<LoadBalancingMetrics>>,
}

/// 一次 start() 产生的调度任务，唤醒信号只属于这一次
struct Scheduler {
    task: JoinHandle<()>,
    shutdown: Arc<Notify>,
}

impl RebalanceService {
    /// 创建新的重平衡服务
    pub fn new(config: Config, store: Arc<dyn SiteDataStore>) -> Result<Self> {
        // 验证配置
        config.validate()?;

        let history = Arc::new(HistoryWriter::new(
            store.clone(),
            config.collector.history_buffer_size,
        ));

        Ok(Self {
            config: SyncRwLock::new(Arc::new(config)),
            collector: LoadCollector::new(store.clone(), history),
            recorder: DecisionRecorder::new(store),
            cycle_gate: Mutex::new(()),
            is_running: Arc::new(RwLock::new(false)),
            scheduler: SyncMutex::new(None),
            last_metrics: SyncRwLock::new(None),
        })
    }

    /// 当前配置快照，周期内始终使用同一份
    pub fn config(&self) -> Arc<Config> {
        self.config.read().clone()
    }

    /// 热更新配置，下一个周期生效；校验失败时保留旧配置
    pub fn reload_config(&self, config: Config) -> Result<()> {
        config.validate()?;
        *self.config.write() = Arc::new(config);
        info!("Rebalancing configuration reloaded");
        Ok(())
    }

    /// 执行一次完整的重平衡周期，返回汇总指标
    pub async fn execute_load_balancing(&self) -> Result<LoadBalancingMetrics, RebalanceError> {
        self.run_cycle().await.map(|outcome| outcome.metrics)
    }

    /// 执行一次完整的重平衡周期，返回指标、生效的决策和被隔离的问题
    pub async fn run_cycle(&self) -> Result<CycleOutcome, RebalanceError> {
        let _guard = self
            .cycle_gate
            .try_lock()
            .map_err(|_| RebalanceError::CycleInProgress)?;

        let config = self.config();
        self.cycle(&config, false).await
    }

    /// 演练：采集、分类、规划，但不记录决策
    pub async fn plan_only(&self) -> Result<CycleOutcome, RebalanceError> {
        let _guard = self
            .cycle_gate
            .try_lock()
            .map_err(|_| RebalanceError::CycleInProgress)?;

        let config = self.config();
        self.cycle(&config, true).await
    }

    async fn cycle(&self, config: &Config, dry_run: bool) -> Result<CycleOutcome, RebalanceError> {
        let started = Instant::now();
        let decided_at = Utc::now();

        info!("Starting rebalancing cycle{}", if dry_run { " (dry run)" } else { "" });

        let collection = self
            .collector
            .collect_site_loads(config)
            .await
            .inspect_err(|e| error!("Rebalancing cycle aborted: {}", e))?;
        let mut issues = collection.issues;

        let classification = classify(&collection.samples, &config.thresholds)?;
        let counts = classification.counts();
        debug!(
            "Classification: critical={}, overloaded={}, optimal={}, underloaded={}",
            counts.critical, counts.overloaded, counts.optimal, counts.underloaded
        );

        let planner = TransferPlanner::new(config);
        let plan = planner.plan(
            &classification.sources(),
            &classification.underloaded,
            decided_at,
        );
        issues.extend(plan.skipped.iter().map(|e| {
            CycleIssue::from_error(CycleStage::Planning, planning_subject(e), e)
        }));

        let decisions = if dry_run {
            plan.decisions
        } else {
            let report = self.recorder.record(&plan.decisions, &config.recorder).await;
            issues.extend(report.dropped.iter().map(|dropped| {
                CycleIssue::new(
                    CycleStage::Persistence,
                    format!("{}->{}", dropped.source_site_id, dropped.target_site_id),
                    dropped.reason.clone(),
                )
            }));
            report.persisted
        };

        let metrics = summarize(&classification, &decisions, started.elapsed());
        *self.last_metrics.write() = Some(metrics.clone());

        info!(
            "Rebalancing cycle finished: sites={}, balanced={}, transfers={}, variance={:.2}, efficiency={:.3}, issues={}, elapsed={:.3}s",
            metrics.total_sites,
            metrics.balanced_sites,
            metrics.total_transfers,
            metrics.load_variance,
            metrics.efficiency_score,
            issues.len(),
            metrics.processing_time_seconds
        );

        Ok(CycleOutcome {
            metrics,
            buckets: counts,
            decisions,
            issues,
            dry_run,
        })
    }

    /// 启动定时调度
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        {
            let mut running = self.is_running.write().await;
            if *running {
                return Ok(());
            }
            *running = true;
        }

        let interval = self.config().schedule.interval();
        info!("Starting rebalancing scheduler (interval {:?})", interval);

        let shutdown = Arc::new(Notify::new());
        let service = self.clone();
        let wakeup = shutdown.clone();
        let task = tokio::spawn(async move {
            let mut first = true;
            while *service.is_running.read().await {
                let config = service.config();

                if !first || config.schedule.run_on_start {
                    match service.execute_load_balancing().await {
                        Ok(_) => {}
                        Err(e) if e.is_fatal() => error!("Scheduled rebalancing cycle failed: {}", e),
                        Err(e) => warn!("Scheduled rebalancing cycle skipped: {}", e),
                    }
                }
                first = false;

                // 等待下一次周期，stop() 会提前唤醒
                tokio::select! {
                    _ = tokio::time::sleep(config.schedule.interval()) => {}
                    _ = wakeup.notified() => {}
                }
            }
            debug!("Rebalancing scheduler loop exited");
        });

        *self.scheduler.lock() = Some(Scheduler { task, shutdown });
        Ok(())
    }

    /// 停止定时调度并等待调度任务退出，正在运行的周期会执行完
    pub async fn stop(&self) {
        {
            let mut running = self.is_running.write().await;
            *running = false;
        }

        let scheduler = self.scheduler.lock().take();
        let Some(scheduler) = scheduler else {
            debug!("Rebalancing scheduler is not running");
            return;
        };

        scheduler.shutdown.notify_one();
        if let Err(e) = scheduler.task.await {
            error!("Rebalancing scheduler task failed: {}", e);
        }
        info!("Rebalancing scheduler stopped");
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    /// 等待已提交的负载历史写完
    pub async fn flush_history(&self) {
        self.collector.history().flush().await;
    }

    pub fn history(&self) -> &HistoryWriter {
        self.collector.history()
    }

    /// 最近一次完成的周期指标
    pub fn last_metrics(&self) -> Option<LoadBalancingMetrics> {
        self.last_metrics.read().clone()
    }
}

fn planning_subject(error: &RebalanceError) -> String {
    match error {
        RebalanceError::Planning {
            source_site,
            target_site,
            ..
        } => format!("{}->{}", source_site, target_site),
        _ => "plan".to_string(),
    }
}
