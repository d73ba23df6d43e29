//! Storage backends
//!
//! One `Storage` contract, three interchangeable implementations:
//! in-process map, append-only JSON-lines file and relational database.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::StorageConfig;
use crate::errors::{Result, ShortenerError};

pub mod backend;
pub mod file;
pub mod memory;
pub mod models;

pub use backend::SeaOrmStorage;
pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use models::{NewUrl, StorageStats, UrlRecord, UrlToDelete};

#[async_trait]
pub trait Storage: Send + Sync {
    /// 原子去重插入：原始 URL 已存在时返回 `AlreadyExists(已有短码)`
    async fn save(&self, url: NewUrl) -> Result<UrlRecord>;

    /// 批量插入，全部成功或全部不生效
    async fn save_batch(&self, urls: Vec<NewUrl>) -> Result<Vec<UrlRecord>>;

    /// 按短码查找（包括已软删除的记录）
    async fn find_by_short_url(&self, code: &str) -> Result<UrlRecord>;

    /// 按用户查找；没有任何记录时返回 `NotFound`
    async fn find_by_user(&self, user_id: i64) -> Result<Vec<UrlRecord>>;

    async fn is_short_url_exists(&self, code: &str) -> Result<bool>;

    /// 软删除，返回本次新标记的记录数
    async fn delete_urls(&self, urls: &[UrlToDelete]) -> Result<usize>;

    /// 分配下一个用户 ID（单调递增，不复用）
    fn next_user_id(&self) -> i64;

    async fn ping(&self) -> bool;

    async fn get_stats(&self) -> Result<StorageStats>;

    fn backend_name(&self) -> &'static str;
}

/// 存储后端类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageKind {
    Database(String),
    File(String),
    Memory,
}

impl StorageKind {
    /// 优先级：database_url > file_storage_path > 内存
    pub fn from_config(config: &StorageConfig) -> Self {
        if !config.database_url.trim().is_empty() {
            StorageKind::Database(config.database_url.trim().to_string())
        } else if !config.file_storage_path.trim().is_empty() {
            StorageKind::File(config.file_storage_path.trim().to_string())
        } else {
            StorageKind::Memory
        }
    }
}

pub struct StorageFactory;

impl StorageFactory {
    pub async fn create(config: &StorageConfig) -> Result<Arc<dyn Storage>> {
        let storage: Arc<dyn Storage> = match StorageKind::from_config(config) {
            StorageKind::Database(url) => {
                // 从 URL 自动推断数据库类型
                let backend_type = backend::infer_backend_from_url(&url)?;
                Arc::new(SeaOrmStorage::new(&url, backend_type, config).await?)
            }
            StorageKind::File(path) => Arc::new(FileStorage::new(path)?),
            StorageKind::Memory => Arc::new(MemoryStorage::new()),
        };

        info!("Using storage backend: {}", storage.backend_name());
        Ok(storage)
    }
}

/// 批量插入前的批内校验：原始 URL 与短码在批内都不能重复
pub(crate) fn ensure_unique_within_batch(urls: &[NewUrl]) -> Result<()> {
    let mut originals = HashSet::with_capacity(urls.len());
    let mut codes = HashSet::with_capacity(urls.len());
    for url in urls {
        if !originals.insert(url.original_url.as_str()) {
            return Err(ShortenerError::validation(format!(
                "批量请求中原始 URL 重复: {}",
                url.original_url
            )));
        }
        if !codes.insert(url.short_code.as_str()) {
            return Err(ShortenerError::validation(format!(
                "批量请求中短码重复: {}",
                url.short_code
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_precedence() {
        let mut config = StorageConfig::default();
        assert_eq!(StorageKind::from_config(&config), StorageKind::Memory);

        config.file_storage_path = "urls.jsonl".into();
        assert_eq!(
            StorageKind::from_config(&config),
            StorageKind::File("urls.jsonl".into())
        );

        config.database_url = "sqlite://urls.db".into();
        assert_eq!(
            StorageKind::from_config(&config),
            StorageKind::Database("sqlite://urls.db".into())
        );
    }

    #[test]
    fn test_blank_settings_mean_memory() {
        let config = StorageConfig {
            database_url: "  ".into(),
            file_storage_path: "".into(),
            ..Default::default()
        };
        assert_eq!(StorageKind::from_config(&config), StorageKind::Memory);
    }

    #[test]
    fn test_batch_duplicates_rejected() {
        let urls = vec![
            NewUrl::new("aaaaa", "https://a.com", 1),
            NewUrl::new("bbbbb", "https://a.com", 1),
        ];
        assert!(matches!(
            ensure_unique_within_batch(&urls),
            Err(ShortenerError::Validation(_))
        ));

        let urls = vec![
            NewUrl::new("aaaaa", "https://a.com", 1),
            NewUrl::new("aaaaa", "https://b.com", 1),
        ];
        assert!(ensure_unique_within_batch(&urls).is_err());

        let urls = vec![
            NewUrl::new("aaaaa", "https://a.com", 1),
            NewUrl::new("bbbbb", "https://b.com", 1),
        ];
        assert!(ensure_unique_within_batch(&urls).is_ok());
    }
}
