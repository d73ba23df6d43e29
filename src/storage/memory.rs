//! In-process storage backend
//!
//! All state lives in one struct behind a single `RwLock`; every
//! check-then-insert happens under the write lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, info};

use super::{NewUrl, Storage, StorageStats, UrlRecord, UrlToDelete, ensure_unique_within_batch};
use crate::errors::{Result, ShortenerError};

#[derive(Default)]
struct State {
    urls: HashMap<String, UrlRecord>,
    /// original_url -> short_code
    by_original: HashMap<String, String>,
    /// created_by -> short_codes（不包含匿名用户）
    by_user: HashMap<i64, Vec<String>>,
    last_id: i64,
}

impl State {
    fn conflict_for(&self, url: &NewUrl) -> Option<ShortenerError> {
        if let Some(existing) = self.by_original.get(&url.original_url) {
            return Some(ShortenerError::already_exists(existing.clone()));
        }
        if self.urls.contains_key(&url.short_code) {
            return Some(ShortenerError::code_collision(url.short_code.clone()));
        }
        None
    }

    fn insert(&mut self, url: NewUrl) -> UrlRecord {
        self.last_id += 1;
        let record = UrlRecord {
            id: self.last_id,
            short_code: url.short_code,
            original_url: url.original_url,
            created_by: url.created_by,
            created_at: Utc::now(),
            is_deleted: false,
        };

        self.by_original
            .insert(record.original_url.clone(), record.short_code.clone());
        if record.created_by != 0 {
            self.by_user
                .entry(record.created_by)
                .or_default()
                .push(record.short_code.clone());
        }
        self.urls.insert(record.short_code.clone(), record.clone());
        record
    }
}

pub struct MemoryStorage {
    state: RwLock<State>,
    /// 下一个可分配的用户 ID
    user_seq: AtomicI64,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        info!("Memory storage initialized");
        Self {
            state: RwLock::new(State::default()),
            user_seq: AtomicI64::new(1),
        }
    }

    fn observe_user(&self, created_by: i64) {
        if created_by > 0 {
            self.user_seq.fetch_max(created_by + 1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn save(&self, url: NewUrl) -> Result<UrlRecord> {
        let created_by = url.created_by;
        let record = {
            let mut state = self.state.write();
            if let Some(err) = state.conflict_for(&url) {
                return Err(err);
            }
            state.insert(url)
        };
        self.observe_user(created_by);
        debug!("Saved {} -> {}", record.short_code, record.original_url);
        Ok(record)
    }

    async fn save_batch(&self, urls: Vec<NewUrl>) -> Result<Vec<UrlRecord>> {
        if urls.is_empty() {
            return Ok(Vec::new());
        }
        ensure_unique_within_batch(&urls)?;

        let records: Vec<UrlRecord> = {
            let mut state = self.state.write();
            if let Some(err) = urls.iter().find_map(|url| state.conflict_for(url)) {
                return Err(err);
            }
            urls.into_iter().map(|url| state.insert(url)).collect()
        };

        for record in &records {
            self.observe_user(record.created_by);
        }
        debug!("Saved batch of {} urls", records.len());
        Ok(records)
    }

    async fn find_by_short_url(&self, code: &str) -> Result<UrlRecord> {
        self.state
            .read()
            .urls
            .get(code)
            .cloned()
            .ok_or_else(|| ShortenerError::not_found(format!("短链接不存在: {}", code)))
    }

    async fn find_by_user(&self, user_id: i64) -> Result<Vec<UrlRecord>> {
        let state = self.state.read();
        let records: Vec<UrlRecord> = state
            .by_user
            .get(&user_id)
            .map(|codes| {
                codes
                    .iter()
                    .filter_map(|code| state.urls.get(code).cloned())
                    .collect()
            })
            .unwrap_or_default();

        if records.is_empty() {
            return Err(ShortenerError::not_found(format!(
                "用户 {} 没有短链接",
                user_id
            )));
        }
        Ok(records)
    }

    async fn is_short_url_exists(&self, code: &str) -> Result<bool> {
        Ok(self.state.read().urls.contains_key(code))
    }

    async fn delete_urls(&self, urls: &[UrlToDelete]) -> Result<usize> {
        let mut state = self.state.write();
        let mut marked = 0;
        for item in urls {
            if item.user_id == 0 {
                continue;
            }
            if let Some(record) = state.urls.get_mut(&item.short_code)
                && record.created_by == item.user_id
                && !record.is_deleted
            {
                record.is_deleted = true;
                marked += 1;
            }
        }
        debug!("Marked {} of {} urls as deleted", marked, urls.len());
        Ok(marked)
    }

    fn next_user_id(&self) -> i64 {
        self.user_seq.fetch_add(1, Ordering::SeqCst)
    }

    async fn ping(&self) -> bool {
        true
    }

    async fn get_stats(&self) -> Result<StorageStats> {
        let state = self.state.read();
        Ok(StorageStats {
            urls: state.urls.values().filter(|r| !r.is_deleted).count(),
            users: state.by_user.len(),
        })
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_anonymous_urls_not_indexed_by_user() {
        let storage = MemoryStorage::new();
        storage
            .save(NewUrl::new("aaaaa", "https://a.com", 0))
            .await
            .unwrap();

        assert!(matches!(
            storage.find_by_user(0).await,
            Err(ShortenerError::NotFound(_))
        ));
        let stats = storage.get_stats().await.unwrap();
        assert_eq!(stats, StorageStats { urls: 1, users: 0 });
    }

    #[tokio::test]
    async fn test_user_seq_bumped_past_observed_creators() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.next_user_id(), 1);

        storage
            .save(NewUrl::new("aaaaa", "https://a.com", 41))
            .await
            .unwrap();
        assert_eq!(storage.next_user_id(), 42);
        assert_eq!(storage.next_user_id(), 43);
    }

    #[tokio::test]
    async fn test_failed_batch_leaves_no_trace() {
        let storage = MemoryStorage::new();
        storage
            .save(NewUrl::new("aaaaa", "https://a.com", 1))
            .await
            .unwrap();

        let result = storage
            .save_batch(vec![
                NewUrl::new("bbbbb", "https://b.com", 1),
                NewUrl::new("ccccc", "https://a.com", 1),
            ])
            .await;
        assert_eq!(result, Err(ShortenerError::already_exists("aaaaa")));
        assert!(!storage.is_short_url_exists("bbbbb").await.unwrap());
    }
}
