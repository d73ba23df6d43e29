//! 删除管道
//!
//! 有界队列 + 单消费者：
//! - 累计达到 `batch_size` 立即刷盘
//! - 定时器触发时刷掉非空缓冲
//! - 关闭或所有发送端释放时排空队列、最后刷盘一次后退出

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep};
use tracing::{debug, error, info, trace, warn};

use super::DeletionSink;
use crate::config::DeletionConfig;
use crate::storage::UrlToDelete;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub queue_capacity: usize,
    pub batch_size: usize,
    pub flush_interval: Duration,
    /// 0 表示失败后直接丢弃
    pub max_flush_retries: u32,
    pub retry_base_delay: Duration,
}

impl From<&DeletionConfig> for PipelineOptions {
    fn from(config: &DeletionConfig) -> Self {
        Self {
            queue_capacity: config.queue_capacity.max(1),
            batch_size: config.batch_size.max(1),
            flush_interval: Duration::from_secs(config.flush_interval_secs.max(1)),
            max_flush_retries: config.max_flush_retries,
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
        }
    }
}

#[derive(Default)]
struct Counters {
    flushed: AtomicU64,
    dropped: AtomicU64,
    /// 挂在溢出任务上、尚未进入队列的请求
    deferred: AtomicU64,
}

pub struct DeletionPipeline {
    tx: mpsc::Sender<UrlToDelete>,
    shutdown_tx: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl DeletionPipeline {
    /// 在当前 Tokio 运行时上启动消费者任务
    pub fn spawn(sink: Arc<dyn DeletionSink>, config: &DeletionConfig) -> Self {
        Self::with_options(sink, PipelineOptions::from(config))
    }

    pub fn with_options(sink: Arc<dyn DeletionSink>, options: PipelineOptions) -> Self {
        let (tx, rx) = mpsc::channel(options.queue_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let counters = Arc::new(Counters::default());

        info!(
            "Deletion pipeline started (capacity {}, batch {}, interval {:?})",
            options.queue_capacity, options.batch_size, options.flush_interval
        );

        let consumer = Consumer {
            sink,
            options,
            counters: Arc::clone(&counters),
        };
        let handle = tokio::spawn(consumer.run(rx, shutdown_rx));

        Self {
            tx,
            shutdown_tx,
            handle: Mutex::new(Some(handle)),
            counters,
        }
    }

    /// 入队，不等待
    ///
    /// 队列满时剩余部分交给独立任务等待空位，调用方不被阻塞。
    /// 溢出任务本身不设上限：持续过载时内存随 `deferred_count()` 增长。
    pub fn enqueue(&self, items: Vec<UrlToDelete>) {
        let mut items = items.into_iter();
        while let Some(item) = items.next() {
            match self.tx.try_send(item) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(item)) => {
                    let rest: Vec<UrlToDelete> = std::iter::once(item).chain(items).collect();
                    warn!(
                        "Deletion queue full, deferring {} requests",
                        rest.len()
                    );
                    let tx = self.tx.clone();
                    let counters = Arc::clone(&self.counters);
                    counters
                        .deferred
                        .fetch_add(rest.len() as u64, Ordering::Relaxed);
                    tokio::spawn(async move {
                        let total = rest.len();
                        for (sent, item) in rest.into_iter().enumerate() {
                            if tx.send(item).await.is_err() {
                                let lost = (total - sent) as u64;
                                counters.deferred.fetch_sub(lost, Ordering::Relaxed);
                                counters.dropped.fetch_add(lost, Ordering::Relaxed);
                                warn!("Deletion pipeline closed, {} deferred requests lost", lost);
                                break;
                            }
                            counters.deferred.fetch_sub(1, Ordering::Relaxed);
                        }
                    });
                    return;
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    let lost = 1 + items.len() as u64;
                    self.counters.dropped.fetch_add(lost, Ordering::Relaxed);
                    warn!("Deletion pipeline closed, dropping {} requests", lost);
                    return;
                }
            }
        }
    }

    /// 队列中尚未被消费者取走的请求数（不含消费者的累积缓冲）
    pub fn pending(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn flushed_count(&self) -> u64 {
        self.counters.flushed.load(Ordering::Relaxed)
    }

    pub fn dropped_count(&self) -> u64 {
        self.counters.dropped.load(Ordering::Relaxed)
    }

    /// 队列满时被推迟、仍在等待入队的请求数
    pub fn deferred_count(&self) -> u64 {
        self.counters.deferred.load(Ordering::Relaxed)
    }

    /// 通知消费者退出并等待最后一次刷盘完成，可重复调用
    pub async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);

        let handle = self.handle.lock().take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            error!("Deletion consumer task failed: {}", e);
        }
    }
}

struct Consumer {
    sink: Arc<dyn DeletionSink>,
    options: PipelineOptions,
    counters: Arc<Counters>,
}

impl Consumer {
    async fn run(self, mut rx: mpsc::Receiver<UrlToDelete>, mut shutdown_rx: watch::Receiver<bool>) {
        let batch_size = self.options.batch_size;
        let period = self.options.flush_interval;
        let mut buffer: Vec<UrlToDelete> = Vec::with_capacity(batch_size);

        // 跳过 interval 的立即触发
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Some(item) => {
                        trace!("Queued deletion of {} by user {}", item.short_code, item.user_id);
                        buffer.push(item);
                        if buffer.len() >= batch_size {
                            self.flush(std::mem::take(&mut buffer)).await;
                        }
                    }
                    None => {
                        debug!("All deletion producers dropped");
                        break;
                    }
                },
                _ = ticker.tick() => {
                    if !buffer.is_empty() {
                        self.flush(std::mem::take(&mut buffer)).await;
                    }
                }
                _ = shutdown_rx.changed() => {
                    debug!("Deletion pipeline received shutdown");
                    break;
                }
            }
        }

        rx.close();
        while let Ok(item) = rx.try_recv() {
            buffer.push(item);
        }

        let remaining = buffer.len();
        for chunk in buffer.chunks(batch_size) {
            self.flush(chunk.to_vec()).await;
        }
        info!(
            "Deletion pipeline stopped, final flush of {} requests",
            remaining
        );
    }

    async fn flush(&self, batch: Vec<UrlToDelete>) {
        let count = batch.len();
        let mut attempt = 0;

        loop {
            match self.sink.flush_deletions(batch.clone()).await {
                Ok(()) => {
                    self.counters
                        .flushed
                        .fetch_add(count as u64, Ordering::Relaxed);
                    debug!("Flushed {} deletion requests", count);
                    return;
                }
                Err(e) if attempt < self.options.max_flush_retries => {
                    attempt += 1;
                    let delay = self
                        .options
                        .retry_base_delay
                        .saturating_mul(2u32.saturating_pow(attempt - 1));
                    warn!(
                        "Deletion flush failed (attempt {}/{}): {}; retrying in {:?}",
                        attempt,
                        self.options.max_flush_retries + 1,
                        e,
                        delay
                    );
                    sleep(delay).await;
                }
                Err(e) => {
                    self.counters
                        .dropped
                        .fetch_add(count as u64, Ordering::Relaxed);
                    let dump = serde_json::to_string(&batch)
                        .unwrap_or_else(|err| format!("<unserializable: {}>", err));
                    error!(
                        "Dropping {} deletion requests after {} attempts: {}; batch={}",
                        count,
                        attempt + 1,
                        e,
                        dump
                    );
                    return;
                }
            }
        }
    }
}
