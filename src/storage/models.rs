use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 已存储的短链接记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlRecord {
    pub id: i64,
    pub short_code: String,
    pub original_url: String,
    /// 创建者，0 表示匿名
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub is_deleted: bool,
}

/// 待插入的短链接（id、创建时间由后端分配）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUrl {
    pub short_code: String,
    pub original_url: String,
    pub created_by: i64,
}

impl NewUrl {
    pub fn new(
        short_code: impl Into<String>,
        original_url: impl Into<String>,
        created_by: i64,
    ) -> Self {
        Self {
            short_code: short_code.into(),
            original_url: original_url.into(),
            created_by,
        }
    }
}

/// 删除请求：只有 (short_code, user_id) 与记录所有者匹配时才生效
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UrlToDelete {
    pub user_id: i64,
    pub short_code: String,
}

impl UrlToDelete {
    pub fn new(user_id: i64, short_code: impl Into<String>) -> Self {
        Self {
            user_id,
            short_code: short_code.into(),
        }
    }
}

/// 存储统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageStats {
    /// 未删除的短链接数
    pub urls: usize,
    /// 创建过短链接的非匿名用户数
    pub users: usize,
}
