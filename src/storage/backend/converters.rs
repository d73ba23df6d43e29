use chrono::{DateTime, Utc};
use sea_orm::ActiveValue::{NotSet, Set};

use crate::storage::{NewUrl, UrlRecord};
use migration::entities::url;

pub fn model_to_record(model: url::Model) -> UrlRecord {
    UrlRecord {
        id: i64::from(model.id),
        short_code: model.short_url,
        original_url: model.original_url,
        created_by: model.created_by,
        created_at: model.created_at,
        is_deleted: model.is_deleted,
    }
}

/// id 交给数据库自增
pub fn new_url_to_active_model(url: &NewUrl, created_at: DateTime<Utc>) -> url::ActiveModel {
    url::ActiveModel {
        id: NotSet,
        short_url: Set(url.short_code.clone()),
        original_url: Set(url.original_url.clone()),
        created_by: Set(url.created_by),
        created_at: Set(created_at),
        is_deleted: Set(false),
    }
}
