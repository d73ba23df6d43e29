//! Deletion pipeline tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use linkvault::deletion::{DeletionPipeline, DeletionSink, PipelineOptions, StorageDeletionSink};
use linkvault::storage::{MemoryStorage, NewUrl, Storage, UrlToDelete};

#[derive(Default)]
struct RecordingSink {
    batches: Mutex<Vec<Vec<UrlToDelete>>>,
}

impl RecordingSink {
    fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().unwrap().iter().map(Vec::len).collect()
    }
}

#[async_trait::async_trait]
impl DeletionSink for RecordingSink {
    async fn flush_deletions(&self, batch: Vec<UrlToDelete>) -> anyhow::Result<()> {
        self.batches.lock().unwrap().push(batch);
        Ok(())
    }
}

/// Fails the first `failures` calls
struct FlakySink {
    failures: usize,
    calls: AtomicUsize,
}

#[async_trait::async_trait]
impl DeletionSink for FlakySink {
    async fn flush_deletions(&self, _batch: Vec<UrlToDelete>) -> anyhow::Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            anyhow::bail!("storage unavailable (call {})", call);
        }
        Ok(())
    }
}

fn options(batch_size: usize, flush_interval: Duration) -> PipelineOptions {
    PipelineOptions {
        queue_capacity: 1024,
        batch_size,
        flush_interval,
        max_flush_retries: 3,
        retry_base_delay: Duration::from_millis(5),
    }
}

fn requests(n: usize) -> Vec<UrlToDelete> {
    (0..n).map(|i| UrlToDelete::new(1, format!("c{:04}", i))).collect()
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 2s");
}

#[tokio::test]
async fn test_full_batch_flushes_without_timer() {
    let sink = Arc::new(RecordingSink::default());
    let pipeline =
        DeletionPipeline::with_options(sink.clone(), options(1000, Duration::from_secs(3600)));

    pipeline.enqueue(requests(1000));
    wait_until(|| pipeline.flushed_count() == 1000).await;
    assert_eq!(sink.batch_sizes(), vec![1000]);

    pipeline.shutdown().await;
    assert_eq!(sink.batch_sizes(), vec![1000]);
}

#[tokio::test]
async fn test_single_item_flushes_on_interval() {
    let sink = Arc::new(RecordingSink::default());
    let pipeline =
        DeletionPipeline::with_options(sink.clone(), options(1000, Duration::from_millis(50)));

    pipeline.enqueue(requests(1));
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(pipeline.flushed_count(), 0);

    wait_until(|| pipeline.flushed_count() == 1).await;
    assert_eq!(sink.batch_sizes(), vec![1]);
    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_flushes_remainder() {
    let sink = Arc::new(RecordingSink::default());
    let pipeline =
        DeletionPipeline::with_options(sink.clone(), options(1000, Duration::from_secs(3600)));

    pipeline.enqueue(requests(7));
    pipeline.shutdown().await;

    assert_eq!(pipeline.flushed_count(), 7);
    assert_eq!(sink.batch_sizes().iter().sum::<usize>(), 7);

    // 重复关闭无副作用
    pipeline.shutdown().await;
    assert_eq!(pipeline.flushed_count(), 7);
}

#[tokio::test]
async fn test_overflow_is_deferred_not_dropped() {
    let sink = Arc::new(RecordingSink::default());
    let pipeline = DeletionPipeline::with_options(
        sink.clone(),
        PipelineOptions {
            queue_capacity: 4,
            ..options(1000, Duration::from_millis(20))
        },
    );

    // 同步入队 10 个，超过容量的部分交给后台任务
    pipeline.enqueue(requests(10));
    assert!(pipeline.pending() <= 4);
    assert_eq!(pipeline.deferred_count(), 6);

    wait_until(|| pipeline.flushed_count() == 10).await;
    assert_eq!(pipeline.deferred_count(), 0);
    assert_eq!(pipeline.dropped_count(), 0);
    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_failing_sink_retries_then_drops() {
    let sink = Arc::new(FlakySink {
        failures: usize::MAX,
        calls: AtomicUsize::new(0),
    });
    let pipeline = DeletionPipeline::with_options(sink.clone(), options(2, Duration::from_secs(3600)));

    pipeline.enqueue(requests(2));
    wait_until(|| pipeline.dropped_count() == 2).await;

    // 1 次初始尝试 + 3 次重试
    assert_eq!(sink.calls.load(Ordering::SeqCst), 4);
    assert_eq!(pipeline.flushed_count(), 0);
    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_flaky_sink_recovers() {
    let sink = Arc::new(FlakySink {
        failures: 2,
        calls: AtomicUsize::new(0),
    });
    let pipeline = DeletionPipeline::with_options(sink.clone(), options(3, Duration::from_secs(3600)));

    pipeline.enqueue(requests(3));
    wait_until(|| pipeline.flushed_count() == 3).await;

    assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
    assert_eq!(pipeline.dropped_count(), 0);
    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_zero_retries_drops_after_one_attempt() {
    let sink = Arc::new(FlakySink {
        failures: 1,
        calls: AtomicUsize::new(0),
    });
    let pipeline = DeletionPipeline::with_options(
        sink.clone(),
        PipelineOptions {
            max_flush_retries: 0,
            ..options(1, Duration::from_secs(3600))
        },
    );

    pipeline.enqueue(requests(1));
    wait_until(|| pipeline.dropped_count() == 1).await;
    assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_storage_sink_applies_ownership() {
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    storage
        .save(NewUrl::new("owned", "https://owned.com", 1))
        .await
        .unwrap();
    storage
        .save(NewUrl::new("other", "https://other.com", 2))
        .await
        .unwrap();

    let pipeline = DeletionPipeline::with_options(
        Arc::new(StorageDeletionSink::new(Arc::clone(&storage))),
        options(1000, Duration::from_secs(3600)),
    );
    pipeline.enqueue(vec![
        UrlToDelete::new(1, "owned"),
        UrlToDelete::new(1, "other"),
    ]);
    pipeline.shutdown().await;

    assert!(storage.find_by_short_url("owned").await.unwrap().is_deleted);
    assert!(!storage.find_by_short_url("other").await.unwrap().is_deleted);
}
