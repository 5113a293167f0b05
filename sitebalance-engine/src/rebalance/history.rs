use parking_lot::Mutex;
use sitebalance_core::LoadSample;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::traits::SiteDataStore;

enum HistoryCommand {
    Append(LoadSample),
    Flush(oneshot::Sender<()>),
}

/// 负载历史写入器
///
/// 采样通过有界通道交给后台任务写入存储，与决策主路径解耦。
/// 通道满时直接丢弃采样，写入失败只记录日志，都不会影响当前周期。
pub struct HistoryWriter {
    sender: mpsc::Sender<HistoryCommand>,
    pending: Mutex<Option<(mpsc::Receiver<HistoryCommand>, Arc<dyn SiteDataStore>)>>,
    dropped: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
}

impl HistoryWriter {
    pub fn new(store: Arc<dyn SiteDataStore>, buffer_size: usize) -> Self {
        let (sender, receiver) = mpsc::channel(buffer_size.max(1));
        Self {
            sender,
            pending: Mutex::new(Some((receiver, store))),
            dropped: Arc::new(AtomicU64::new(0)),
            failed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// 首次使用时在当前运行时上启动后台写入任务
    fn ensure_running(&self) {
        let Some((mut receiver, store)) = self.pending.lock().take() else {
            return;
        };
        let failed = self.failed.clone();

        tokio::spawn(async move {
            debug!("Load history writer started");
            while let Some(command) = receiver.recv().await {
                match command {
                    HistoryCommand::Append(sample) => {
                        if let Err(e) = store.append_load_history(&sample).await {
                            failed.fetch_add(1, Ordering::Relaxed);
                            warn!("Failed to append load history for site {}: {}", sample.site_id, e);
                        }
                    }
                    HistoryCommand::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            debug!("Load history writer stopped");
        });
    }

    /// 提交一条采样，不等待写入完成
    pub fn submit(&self, sample: LoadSample) {
        self.ensure_running();

        match self.sender.try_send(HistoryCommand::Append(sample)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(HistoryCommand::Append(sample))) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                debug!("History buffer full, dropping sample for site {}", sample.site_id);
            }
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("History writer is closed, dropping sample");
            }
        }
    }

    /// 等待此前提交的采样全部处理完
    pub async fn flush(&self) {
        self.ensure_running();

        let (done_tx, done_rx) = oneshot::channel();
        if self.sender.send(HistoryCommand::Flush(done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }
    }

    /// 因缓冲区满或通道关闭而丢弃的采样数
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// 写入存储失败的采样数
    pub fn failed_count(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rebalance::memory_store::{FaultKind, MemoryStore};
    use chrono::Utc;
    use sitebalance_core::LoadTrend;

    fn sample(site_id: &str) -> LoadSample {
        LoadSample::measure(site_id, 50.0, 100.0, 1.0, LoadTrend::Stable, Utc::now())
    }

    #[tokio::test]
    async fn test_submitted_samples_are_written() {
        let store = MemoryStore::new();
        let writer = HistoryWriter::new(Arc::new(store.clone()), 16);

        writer.submit(sample("a"));
        writer.submit(sample("a"));
        writer.flush().await;

        assert_eq!(store.history_for("a").len(), 2);
        assert_eq!(writer.dropped_count(), 0);
    }

    #[tokio::test]
    async fn test_write_failures_are_counted_not_raised() {
        let store = MemoryStore::new();
        store.fail_next(FaultKind::HistoryWrite, 1);
        let writer = HistoryWriter::new(Arc::new(store.clone()), 16);

        writer.submit(sample("a"));
        writer.submit(sample("b"));
        writer.flush().await;

        assert_eq!(writer.failed_count(), 1);
        assert_eq!(store.history_for("b").len(), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_full_buffer_drops_samples() {
        let store = MemoryStore::new();
        let writer = HistoryWriter::new(Arc::new(store.clone()), 2);

        // 单线程运行时下后台任务在让出之前不会消费，第三条必然被丢弃
        writer.submit(sample("a"));
        writer.submit(sample("a"));
        writer.submit(sample("a"));

        assert_eq!(writer.dropped_count(), 1);
        writer.flush().await;
        assert_eq!(store.history_for("a").len(), 2);
    }
}
