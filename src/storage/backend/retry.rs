//! Transient database error retry
//!
//! Deadlocks, lock timeouts, SQLite BUSY and pool exhaustion are retried with
//! exponential backoff plus jitter. Everything else fails on the first try.

use std::future::Future;
use std::time::Duration;

use sea_orm::DbErr;
use sea_orm::error::RuntimeErr;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::StorageConfig;

/// MySQL 1213/1205, PostgreSQL 40001/40P01, SQLite 5/6
const RETRYABLE_SQL_CODES: &[&str] = &["1213", "1205", "40001", "40P01", "5", "6"];

const RETRYABLE_MESSAGES: &[&str] = &[
    "deadlock",
    "lock wait timeout",
    "database is locked",
    "serialization failure",
];

pub fn is_retryable_error(err: &DbErr) -> bool {
    match err {
        DbErr::ConnectionAcquire(_) | DbErr::Conn(_) => true,
        DbErr::Exec(runtime_err) | DbErr::Query(runtime_err) => is_retryable_runtime(runtime_err),
        _ => false,
    }
}

fn is_retryable_runtime(err: &RuntimeErr) -> bool {
    match err {
        RuntimeErr::SqlxError(sqlx_err) => {
            let code = sqlx_err
                .as_database_error()
                .and_then(|db_err| db_err.code().map(|c| c.into_owned()));
            match code {
                Some(code) => RETRYABLE_SQL_CODES.contains(&code.as_str()),
                None => matches_retryable_message(&sqlx_err.to_string()),
            }
        }
        RuntimeErr::Internal(msg) => matches_retryable_message(msg),
        #[allow(unreachable_patterns)]
        _ => false,
    }
}

fn matches_retryable_message(msg: &str) -> bool {
    let msg = msg.to_lowercase();
    RETRYABLE_MESSAGES.iter().any(|needle| msg.contains(needle))
}

#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 2000,
        }
    }
}

impl From<&StorageConfig> for RetryConfig {
    fn from(config: &StorageConfig) -> Self {
        Self {
            max_retries: config.retry_count,
            base_delay_ms: config.retry_base_delay_ms,
            max_delay_ms: config.retry_max_delay_ms,
        }
    }
}

/// 执行 `operation`，对可重试错误按指数退避重试
pub async fn with_retry<T, F, Fut>(
    operation_name: &str,
    config: RetryConfig,
    mut operation: F,
) -> Result<T, DbErr>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DbErr>>,
{
    let mut attempt = 0;
    loop {
        let err = match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!("'{}' succeeded after {} retries", operation_name, attempt);
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !is_retryable_error(&err) || attempt >= config.max_retries {
            return Err(err);
        }

        attempt += 1;
        let delay = calculate_backoff(attempt, config.base_delay_ms, config.max_delay_ms);
        warn!(
            "'{}' failed (attempt {}/{}): {}; retrying in {} ms",
            operation_name,
            attempt,
            config.max_retries + 1,
            err,
            delay
        );
        sleep(Duration::from_millis(delay)).await;
    }
}

/// base * 2^(attempt-1)，上限 max，再加 0-25% 抖动
fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> u64 {
    let exp = base_ms.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
    let capped = exp.min(max_ms);
    capped.saturating_add(rand::random_range(0..=capped / 4))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryConfig {
        RetryConfig {
            max_retries: 2,
            base_delay_ms: 5,
            max_delay_ms: 20,
        }
    }

    #[test]
    fn test_classification() {
        assert!(is_retryable_error(&DbErr::ConnectionAcquire(
            sea_orm::error::ConnAcquireErr::Timeout
        )));
        assert!(is_retryable_error(&DbErr::Query(RuntimeErr::Internal(
            "database is locked".to_string()
        ))));
        assert!(is_retryable_error(&DbErr::Exec(RuntimeErr::Internal(
            "Deadlock found when trying to get lock".to_string()
        ))));
        assert!(!is_retryable_error(&DbErr::RecordNotInserted));
        assert!(!is_retryable_error(&DbErr::Custom("boom".to_string())));
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        assert!((100..=125).contains(&calculate_backoff(1, 100, 2000)));
        assert!((400..=500).contains(&calculate_backoff(3, 100, 2000)));
        assert!((2000..=2500).contains(&calculate_backoff(12, 100, 2000)));
    }

    #[tokio::test]
    async fn test_transient_error_retried() {
        let calls = AtomicU32::new(0);
        let result = with_retry("op", fast(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(DbErr::Conn(RuntimeErr::Internal("reset".to_string())))
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let result: Result<(), DbErr> = with_retry("op", fast(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(DbErr::ConnectionAcquire(sea_orm::error::ConnAcquireErr::Timeout)) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), DbErr> = with_retry("op", fast(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(DbErr::RecordNotFound("x".to_string())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
