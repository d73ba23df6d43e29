//! SeaORM storage backend
//!
//! Relational storage over SQLite, MySQL/MariaDB and PostgreSQL. Uniqueness
//! of `short_url` and `original_url` is enforced by the schema; inserts run
//! in transactions and transient failures go through [`retry::with_retry`].

mod connection;
mod converters;
mod mutations;
mod query;
pub mod retry;

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use sea_orm::{DatabaseConnection, EntityTrait, QueryOrder};
use tracing::info;

use crate::config::StorageConfig;
use crate::errors::{Result, ShortenerError};
use crate::storage::{NewUrl, Storage, StorageStats, UrlRecord, UrlToDelete};
use migration::entities::url;

pub use connection::{connect_generic, connect_sqlite, run_migrations};
pub use converters::{model_to_record, new_url_to_active_model};

/// 从数据库 URL 推断数据库类型
pub fn infer_backend_from_url(database_url: &str) -> Result<&'static str> {
    if database_url.starts_with("sqlite:")
        || database_url.ends_with(".db")
        || database_url.ends_with(".sqlite")
    {
        Ok("sqlite")
    } else if database_url.starts_with("mysql://") || database_url.starts_with("mariadb://") {
        Ok("mysql")
    } else if database_url.starts_with("postgres://") || database_url.starts_with("postgresql://") {
        Ok("postgres")
    } else {
        Err(ShortenerError::database_config(format!(
            "无法从 URL 推断数据库类型: {}. 支持的 URL 格式: sqlite://, mysql://, mariadb://, postgres://",
            database_url
        )))
    }
}

/// mariadb 与 mysql 使用同一驱动
pub fn normalize_backend_name(backend: &str) -> Result<&'static str> {
    match backend {
        "sqlite" => Ok("sqlite"),
        "mysql" | "mariadb" => Ok("mysql"),
        "postgres" | "postgresql" => Ok("postgres"),
        other => Err(ShortenerError::database_config(format!(
            "不支持的数据库类型: {}",
            other
        ))),
    }
}

pub struct SeaOrmStorage {
    db: DatabaseConnection,
    backend_name: &'static str,
    retry_config: retry::RetryConfig,
    user_seq: AtomicI64,
}

impl SeaOrmStorage {
    pub async fn new(database_url: &str, backend: &str, config: &StorageConfig) -> Result<Self> {
        if database_url.is_empty() {
            return Err(ShortenerError::database_config("database_url 未设置"));
        }

        let backend_name = normalize_backend_name(backend)?;
        // mysql 驱动不识别 mariadb:// 前缀
        let database_url = match database_url.strip_prefix("mariadb://") {
            Some(rest) => format!("mysql://{}", rest),
            None => database_url.to_string(),
        };

        let db = if backend_name == "sqlite" {
            connect_sqlite(&database_url).await?
        } else {
            connect_generic(&database_url, backend_name, config.pool_size).await?
        };

        run_migrations(&db).await?;

        let max_user = url::Entity::find()
            .order_by_desc(url::Column::CreatedBy)
            .one(&db)
            .await?
            .map(|m| m.created_by)
            .unwrap_or(0);

        info!(
            "{} storage initialized, next user id {}",
            backend_name.to_uppercase(),
            max_user.max(0) + 1
        );

        Ok(SeaOrmStorage {
            db,
            backend_name,
            retry_config: retry::RetryConfig::from(config),
            user_seq: AtomicI64::new(max_user.max(0) + 1),
        })
    }

    pub fn get_db(&self) -> &DatabaseConnection {
        &self.db
    }

    fn observe_user(&self, created_by: i64) {
        if created_by > 0 {
            self.user_seq.fetch_max(created_by + 1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl Storage for SeaOrmStorage {
    async fn save(&self, url: NewUrl) -> Result<UrlRecord> {
        let created_by = url.created_by;
        let record = self.insert_one(&url).await?;
        self.observe_user(created_by);
        Ok(record)
    }

    async fn save_batch(&self, urls: Vec<NewUrl>) -> Result<Vec<UrlRecord>> {
        let records = self.insert_batch(&urls).await?;
        for record in &records {
            self.observe_user(record.created_by);
        }
        Ok(records)
    }

    async fn find_by_short_url(&self, code: &str) -> Result<UrlRecord> {
        self.select_by_code(code)
            .await?
            .ok_or_else(|| ShortenerError::not_found(format!("短链接不存在: {}", code)))
    }

    async fn find_by_user(&self, user_id: i64) -> Result<Vec<UrlRecord>> {
        let records = if user_id == 0 {
            Vec::new()
        } else {
            self.select_by_user(user_id).await?
        };
        if records.is_empty() {
            return Err(ShortenerError::not_found(format!(
                "用户 {} 没有短链接",
                user_id
            )));
        }
        Ok(records)
    }

    async fn is_short_url_exists(&self, code: &str) -> Result<bool> {
        Ok(self.select_by_code(code).await?.is_some())
    }

    async fn delete_urls(&self, urls: &[UrlToDelete]) -> Result<usize> {
        self.mark_deleted(urls).await
    }

    fn next_user_id(&self) -> i64 {
        self.user_seq.fetch_add(1, Ordering::SeqCst)
    }

    async fn ping(&self) -> bool {
        self.db.ping().await.is_ok()
    }

    async fn get_stats(&self) -> Result<StorageStats> {
        self.count_stats().await
    }

    fn backend_name(&self) -> &'static str {
        self.backend_name
    }
}
