//! URL shortener service
//!
//! Orchestrates code generation and storage, and owns the background
//! deletion pipeline. Transport handlers (HTTP/RPC) sit on top of this.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{DeletionConfig, ShortenerConfig, StaticConfig};
use crate::deletion::{DeletionPipeline, StorageDeletionSink};
use crate::errors::{Result, ShortenerError};
use crate::storage::{NewUrl, Storage, StorageStats, UrlToDelete};
use crate::utils::{CodeGenerator, RandomCodeGenerator};

// ============ Request/Response DTOs ============

/// One item of a batch create request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchUrlRequest {
    /// Opaque caller-side id, echoed back in the response
    pub correlation_id: String,
    pub original_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchUrlResponse {
    pub correlation_id: String,
    pub short_code: String,
}

/// A live URL owned by a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserUrl {
    pub short_code: String,
    pub original_url: String,
}

// ============ ShortenerService Implementation ============

pub struct ShortenerService {
    storage: Arc<dyn Storage>,
    generator: Arc<dyn CodeGenerator>,
    pipeline: DeletionPipeline,
    max_generate_attempts: u32,
    base_url: String,
}

impl ShortenerService {
    /// Create a service with the default random code generator.
    ///
    /// Must be called inside a Tokio runtime: the deletion consumer is
    /// spawned here.
    pub fn new(
        storage: Arc<dyn Storage>,
        shortener: &ShortenerConfig,
        deletion: &DeletionConfig,
    ) -> Self {
        Self::with_generator(storage, Arc::new(RandomCodeGenerator), shortener, deletion)
    }

    /// Links from `short_link` stay root-relative until `with_base_url` is set.
    pub fn with_generator(
        storage: Arc<dyn Storage>,
        generator: Arc<dyn CodeGenerator>,
        shortener: &ShortenerConfig,
        deletion: &DeletionConfig,
    ) -> Self {
        let sink = Arc::new(StorageDeletionSink::new(Arc::clone(&storage)));
        Self {
            storage,
            generator,
            pipeline: DeletionPipeline::spawn(sink, deletion),
            max_generate_attempts: shortener.max_generate_attempts.max(1),
            base_url: String::new(),
        }
    }

    /// Build everything from the loaded static configuration
    pub fn from_config(storage: Arc<dyn Storage>, config: &StaticConfig) -> Self {
        Self::new(storage, &config.shortener, &config.deletion)
            .with_base_url(config.server.base_url.clone())
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn pipeline(&self) -> &DeletionPipeline {
        &self.pipeline
    }

    /// Draw codes until one is free in storage and not in `reserved`
    async fn generate_unique_code(&self, reserved: &HashSet<String>) -> Result<String> {
        for _ in 0..self.max_generate_attempts {
            let code = self.generator.generate();
            if reserved.contains(&code) {
                continue;
            }
            if !self.storage.is_short_url_exists(&code).await? {
                return Ok(code);
            }
            debug!("Generated code {} already taken", code);
        }
        Err(ShortenerError::code_generation(format!(
            "no free short code after {} attempts",
            self.max_generate_attempts
        )))
    }

    // ============ Operations ============

    /// Shorten one URL.
    ///
    /// If the URL is already shortened the error is
    /// `AlreadyExists(existing_code)`.
    pub async fn create_short_url(&self, user_id: i64, original_url: &str) -> Result<String> {
        if original_url.trim().is_empty() {
            return Err(ShortenerError::validation("original url is empty"));
        }

        let reserved = HashSet::new();
        for _ in 0..self.max_generate_attempts {
            let code = self.generate_unique_code(&reserved).await?;
            match self
                .storage
                .save(NewUrl::new(code.as_str(), original_url, user_id))
                .await
            {
                Ok(record) => {
                    info!(
                        "Created {} -> {} (user {})",
                        record.short_code, record.original_url, user_id
                    );
                    return Ok(record.short_code);
                }
                Err(ShortenerError::CodeCollision(taken)) => {
                    debug!("Short code {} taken concurrently, regenerating", taken);
                }
                Err(e) => return Err(e),
            }
        }

        Err(ShortenerError::code_generation(format!(
            "short code kept colliding after {} attempts",
            self.max_generate_attempts
        )))
    }

    /// Shorten a batch of URLs atomically.
    ///
    /// A conflict with any stored URL aborts the whole batch with
    /// `AlreadyExists` for the first conflicting item.
    pub async fn create_batch_short_url(
        &self,
        user_id: i64,
        requests: Vec<BatchUrlRequest>,
    ) -> Result<Vec<BatchUrlResponse>> {
        if requests.is_empty() {
            return Err(ShortenerError::validation("batch is empty"));
        }

        let mut seen = HashSet::with_capacity(requests.len());
        for req in &requests {
            if req.original_url.trim().is_empty() {
                return Err(ShortenerError::validation(format!(
                    "original url is empty (correlation_id {})",
                    req.correlation_id
                )));
            }
            if !seen.insert(req.original_url.as_str()) {
                return Err(ShortenerError::validation(format!(
                    "duplicate original url in batch: {}",
                    req.original_url
                )));
            }
        }

        for _ in 0..self.max_generate_attempts {
            let mut codes = HashSet::with_capacity(requests.len());
            let mut urls = Vec::with_capacity(requests.len());
            for req in &requests {
                let code = self.generate_unique_code(&codes).await?;
                codes.insert(code.clone());
                urls.push(NewUrl::new(code, req.original_url.as_str(), user_id));
            }

            match self.storage.save_batch(urls).await {
                Ok(records) => {
                    info!("Created batch of {} urls (user {})", records.len(), user_id);
                    return Ok(requests
                        .into_iter()
                        .zip(records)
                        .map(|(req, record)| BatchUrlResponse {
                            correlation_id: req.correlation_id,
                            short_code: record.short_code,
                        })
                        .collect());
                }
                Err(ShortenerError::CodeCollision(taken)) => {
                    debug!("Batch code {} taken concurrently, regenerating batch", taken);
                }
                Err(e) => return Err(e),
            }
        }

        Err(ShortenerError::code_generation(format!(
            "batch codes kept colliding after {} attempts",
            self.max_generate_attempts
        )))
    }

    /// Resolve a code to its original URL
    pub async fn get_by_short_url(&self, code: &str) -> Result<String> {
        let record = self.storage.find_by_short_url(code).await?;
        if record.is_deleted {
            return Err(ShortenerError::gone(code));
        }
        Ok(record.original_url)
    }

    /// Live URLs created by `user_id`
    pub async fn get_urls_by_user(&self, user_id: i64) -> Result<Vec<UserUrl>> {
        let urls: Vec<UserUrl> = self
            .storage
            .find_by_user(user_id)
            .await?
            .into_iter()
            .filter(|record| !record.is_deleted)
            .map(|record| UserUrl {
                short_code: record.short_code,
                original_url: record.original_url,
            })
            .collect();

        if urls.is_empty() {
            return Err(ShortenerError::not_found(format!(
                "user {} has no urls",
                user_id
            )));
        }
        Ok(urls)
    }

    /// Queue codes for soft deletion and return immediately.
    ///
    /// Codes not owned by `user_id` are silently ignored when the batch is applied.
    pub async fn delete_urls_by_user(&self, user_id: i64, codes: Vec<String>) -> Result<()> {
        if user_id == 0 {
            return Err(ShortenerError::validation(
                "anonymous user cannot delete urls",
            ));
        }
        if codes.is_empty() {
            return Ok(());
        }

        debug!("User {} requested deletion of {} urls", user_id, codes.len());
        self.pipeline.enqueue(
            codes
                .into_iter()
                .map(|code| UrlToDelete::new(user_id, code))
                .collect(),
        );
        Ok(())
    }

    pub async fn ping_storage(&self) -> bool {
        let alive = self.storage.ping().await;
        if !alive {
            warn!("{} storage ping failed", self.storage.backend_name());
        }
        alive
    }

    pub async fn get_stats(&self) -> Result<StorageStats> {
        self.storage.get_stats().await
    }

    pub fn issue_user_id(&self) -> i64 {
        self.storage.next_user_id()
    }

    /// Public link for a code, `/<code>` when no base URL is configured
    pub fn short_link(&self, code: &str) -> String {
        format!("{}/{}", self.base_url, code)
    }

    /// Stop the deletion consumer after its final flush
    pub async fn shutdown(&self) {
        self.pipeline.shutdown().await;
        info!("Shortener service stopped");
    }
}
