//! Read-only queries for SeaOrmStorage

use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect};
use tracing::debug;

use super::converters::model_to_record;
use super::{SeaOrmStorage, retry};
use crate::errors::{Result, ShortenerError};
use crate::storage::{StorageStats, UrlRecord};

use migration::entities::url;

impl SeaOrmStorage {
    pub(super) async fn select_by_code(&self, code: &str) -> Result<Option<UrlRecord>> {
        let db = &self.db;
        let model = retry::with_retry(&format!("find({})", code), self.retry_config, || {
            url::Entity::find()
                .filter(url::Column::ShortUrl.eq(code))
                .one(db)
        })
        .await
        .map_err(|e| ShortenerError::database_operation(format!("查询短链接失败: {}", e)))?;

        Ok(model.map(model_to_record))
    }

    pub(super) async fn select_by_user(&self, user_id: i64) -> Result<Vec<UrlRecord>> {
        let db = &self.db;
        let models = retry::with_retry(
            &format!("find_by_user({})", user_id),
            self.retry_config,
            || {
                url::Entity::find()
                    .filter(url::Column::CreatedBy.eq(user_id))
                    .order_by_asc(url::Column::Id)
                    .all(db)
            },
        )
        .await
        .map_err(|e| ShortenerError::database_operation(format!("查询用户短链接失败: {}", e)))?;

        debug!("User {} owns {} urls", user_id, models.len());
        Ok(models.into_iter().map(model_to_record).collect())
    }

    pub(super) async fn count_stats(&self) -> Result<StorageStats> {
        let db = &self.db;

        let urls = retry::with_retry("count_urls", self.retry_config, || {
            url::Entity::find()
                .filter(url::Column::IsDeleted.eq(false))
                .count(db)
        })
        .await
        .map_err(|e| ShortenerError::database_operation(format!("统计短链接失败: {}", e)))?;

        let users = retry::with_retry("count_users", self.retry_config, || {
            url::Entity::find()
                .select_only()
                .column(url::Column::CreatedBy)
                .distinct()
                .filter(url::Column::CreatedBy.ne(0))
                .count(db)
        })
        .await
        .map_err(|e| ShortenerError::database_operation(format!("统计用户失败: {}", e)))?;

        Ok(StorageStats {
            urls: urls as usize,
            users: users as usize,
        })
    }
}
