use std::sync::Arc;

use crate::storage::{Storage, UrlToDelete};

/// 删除批次的落盘目标
#[async_trait::async_trait]
pub trait DeletionSink: Send + Sync {
    async fn flush_deletions(&self, batch: Vec<UrlToDelete>) -> anyhow::Result<()>;
}

/// 把删除批次写入存储后端
pub struct StorageDeletionSink {
    storage: Arc<dyn Storage>,
}

impl StorageDeletionSink {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }
}

#[async_trait::async_trait]
impl DeletionSink for StorageDeletionSink {
    async fn flush_deletions(&self, batch: Vec<UrlToDelete>) -> anyhow::Result<()> {
        let marked = self.storage.delete_urls(&batch).await?;
        tracing::debug!(
            "{} storage marked {} of {} urls deleted",
            self.storage.backend_name(),
            marked,
            batch.len()
        );
        Ok(())
    }
}
