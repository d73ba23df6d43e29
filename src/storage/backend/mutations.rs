//! Write operations for SeaOrmStorage

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, SqlErr, TransactionTrait,
};
use tracing::{debug, info};

use super::converters::{model_to_record, new_url_to_active_model};
use super::{SeaOrmStorage, retry};
use crate::errors::{Result, ShortenerError};
use crate::storage::{NewUrl, UrlRecord, UrlToDelete, ensure_unique_within_batch};

use migration::entities::url;

enum SaveOutcome {
    Inserted(url::Model),
    /// 原始 URL 已存在，携带已有短码
    Exists(String),
    Collision(String),
}

enum BatchOutcome {
    Inserted(Vec<url::Model>),
    Exists(String),
    Collision(String),
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

fn original_url_conflict() -> OnConflict {
    OnConflict::column(url::Column::OriginalUrl)
        .do_nothing()
        .to_owned()
}

/// INSERT ... ON CONFLICT(original_url) DO NOTHING，未插入时在同一事务内查出已有短码
async fn try_save(db: &DatabaseConnection, new_url: &NewUrl) -> std::result::Result<SaveOutcome, DbErr> {
    let txn = db.begin().await?;

    let inserted = match url::Entity::insert(new_url_to_active_model(new_url, Utc::now()))
        .on_conflict(original_url_conflict())
        .exec(&txn)
        .await
    {
        Ok(_) => true,
        Err(DbErr::RecordNotInserted) => false,
        Err(e) if is_unique_violation(&e) => {
            txn.rollback().await?;
            return Ok(SaveOutcome::Collision(new_url.short_code.clone()));
        }
        Err(e) => return Err(e),
    };

    let row = url::Entity::find()
        .filter(url::Column::OriginalUrl.eq(new_url.original_url.as_str()))
        .one(&txn)
        .await?;

    match row {
        Some(model) if inserted && model.short_url == new_url.short_code => {
            txn.commit().await?;
            Ok(SaveOutcome::Inserted(model))
        }
        Some(model) => {
            txn.rollback().await?;
            Ok(SaveOutcome::Exists(model.short_url))
        }
        // MySQL 的 DO NOTHING 也会吞掉 short_url 冲突
        None => {
            txn.rollback().await?;
            Ok(SaveOutcome::Collision(new_url.short_code.clone()))
        }
    }
}

async fn try_save_batch(
    db: &DatabaseConnection,
    urls: &[NewUrl],
) -> std::result::Result<BatchOutcome, DbErr> {
    let txn = db.begin().await?;
    let now = Utc::now();
    let models: Vec<url::ActiveModel> = urls
        .iter()
        .map(|u| new_url_to_active_model(u, now))
        .collect();

    let inserted = match url::Entity::insert_many(models)
        .on_conflict(original_url_conflict())
        .exec_without_returning(&txn)
        .await
    {
        Ok(rows) => rows,
        Err(DbErr::RecordNotInserted) => 0,
        Err(e) if is_unique_violation(&e) => {
            txn.rollback().await?;
            let taken = url::Entity::find()
                .filter(url::Column::ShortUrl.is_in(urls.iter().map(|u| u.short_code.as_str())))
                .one(db)
                .await?
                .map(|m| m.short_url)
                .unwrap_or_default();
            return Ok(BatchOutcome::Collision(taken));
        }
        Err(e) => return Err(e),
    };

    let mut rows: HashMap<String, url::Model> = url::Entity::find()
        .filter(url::Column::OriginalUrl.is_in(urls.iter().map(|u| u.original_url.as_str())))
        .all(&txn)
        .await?
        .into_iter()
        .map(|m| (m.original_url.clone(), m))
        .collect();

    if (inserted as usize) < urls.len() {
        debug!(
            "Batch inserted {} of {} rows, locating conflict",
            inserted,
            urls.len()
        );
        for new_url in urls {
            match rows.get(&new_url.original_url) {
                Some(model) if model.short_url == new_url.short_code => {}
                Some(model) => {
                    let existing = model.short_url.clone();
                    txn.rollback().await?;
                    return Ok(BatchOutcome::Exists(existing));
                }
                None => {
                    txn.rollback().await?;
                    return Ok(BatchOutcome::Collision(new_url.short_code.clone()));
                }
            }
        }
    }

    let mut created = Vec::with_capacity(urls.len());
    for new_url in urls {
        match rows.remove(&new_url.original_url) {
            Some(model) => created.push(model),
            None => {
                txn.rollback().await?;
                return Ok(BatchOutcome::Collision(new_url.short_code.clone()));
            }
        }
    }

    txn.commit().await?;
    Ok(BatchOutcome::Inserted(created))
}

/// 按用户分组的条件更新，全部在一个事务内
async fn try_mark_deleted(
    db: &DatabaseConnection,
    by_user: &BTreeMap<i64, Vec<String>>,
) -> std::result::Result<u64, DbErr> {
    let txn = db.begin().await?;
    let mut marked = 0;
    for (user_id, codes) in by_user {
        let result = url::Entity::update_many()
            .col_expr(url::Column::IsDeleted, Expr::value(true))
            .filter(url::Column::ShortUrl.is_in(codes.iter().map(String::as_str)))
            .filter(url::Column::CreatedBy.eq(*user_id))
            .filter(url::Column::IsDeleted.eq(false))
            .exec(&txn)
            .await?;
        marked += result.rows_affected;
    }
    txn.commit().await?;
    Ok(marked)
}

impl SeaOrmStorage {
    pub(super) async fn insert_one(&self, new_url: &NewUrl) -> Result<UrlRecord> {
        let db = &self.db;
        let outcome = retry::with_retry(
            &format!("save({})", new_url.short_code),
            self.retry_config,
            || try_save(db, new_url),
        )
        .await
        .map_err(|e| ShortenerError::database_operation(format!("保存短链接失败: {}", e)))?;

        match outcome {
            SaveOutcome::Inserted(model) => {
                debug!("Saved {} -> {}", model.short_url, model.original_url);
                Ok(model_to_record(model))
            }
            SaveOutcome::Exists(code) => Err(ShortenerError::already_exists(code)),
            SaveOutcome::Collision(code) => Err(ShortenerError::code_collision(code)),
        }
    }

    pub(super) async fn insert_batch(&self, urls: &[NewUrl]) -> Result<Vec<UrlRecord>> {
        if urls.is_empty() {
            return Ok(Vec::new());
        }
        ensure_unique_within_batch(urls)?;

        let db = &self.db;
        let outcome = retry::with_retry("save_batch", self.retry_config, || {
            try_save_batch(db, urls)
        })
        .await
        .map_err(|e| ShortenerError::database_operation(format!("批量保存失败: {}", e)))?;

        match outcome {
            BatchOutcome::Inserted(models) => {
                info!("Batch inserted {} urls", models.len());
                Ok(models.into_iter().map(model_to_record).collect())
            }
            BatchOutcome::Exists(code) => Err(ShortenerError::already_exists(code)),
            BatchOutcome::Collision(code) => Err(ShortenerError::code_collision(code)),
        }
    }

    pub(super) async fn mark_deleted(&self, urls: &[UrlToDelete]) -> Result<usize> {
        let mut by_user: BTreeMap<i64, Vec<String>> = BTreeMap::new();
        for item in urls.iter().filter(|u| u.user_id != 0) {
            by_user
                .entry(item.user_id)
                .or_default()
                .push(item.short_code.clone());
        }
        if by_user.is_empty() {
            return Ok(0);
        }

        let db = &self.db;
        let marked = retry::with_retry("delete_urls", self.retry_config, || {
            try_mark_deleted(db, &by_user)
        })
        .await
        .map_err(|e| ShortenerError::database_operation(format!("删除短链接失败: {}", e)))?;

        debug!("Marked {} of {} urls as deleted", marked, urls.len());
        Ok(marked as usize)
    }
}
