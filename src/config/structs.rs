use serde::{Deserialize, Serialize};

/// 静态配置（从 TOML 加载，启动时使用）
///
/// 包含：
/// - server: 对外短链接前缀
/// - storage: 存储后端选择与数据库连接配置
/// - shortener: 短码生成配置
/// - deletion: 异步删除管道配置
/// - logging: 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StaticConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub shortener: ShortenerConfig,
    #[serde(default)]
    pub deletion: DeletionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl StaticConfig {
    /// 从 config.toml 和环境变量加载配置
    ///
    /// 优先级：ENV > config.toml > 默认值
    /// ENV 前缀：LV，分隔符：__
    /// 示例：LV__STORAGE__DATABASE_URL=postgres://...
    pub fn load() -> Self {
        Self::load_from("config.toml")
    }

    /// 从指定路径的 TOML 文件和环境变量加载配置
    pub fn load_from<P: AsRef<std::path::Path>>(path: P) -> Self {
        use config::{Config, Environment, File};

        let path = path.as_ref();

        let builder = Config::builder()
            // 1. 从 TOML 文件加载（可选）
            .add_source(File::from(path).required(false))
            // 2. 从环境变量覆盖，前缀 LV，分隔符 __
            .add_source(
                Environment::with_prefix("LV")
                    .separator("__")
                    .try_parsing(true),
            );

        match builder.build() {
            Ok(settings) => match settings.try_deserialize::<StaticConfig>() {
                Ok(config) => {
                    if path.exists() {
                        eprintln!("[INFO] Configuration loaded from: {}", path.display());
                    }
                    config
                }
                Err(e) => {
                    eprintln!("[ERROR] Failed to deserialize config: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("[ERROR] Failed to build config: {}", e);
                Self::default()
            }
        }
    }

    /// 生成示例 TOML 配置文件
    pub fn generate_sample_config() -> String {
        let sample_config = Self::default();
        toml::to_string_pretty(&sample_config)
            .unwrap_or_else(|e| format!("Error generating sample config: {}", e))
    }
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 返回完整短链接时使用的前缀
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

/// 存储配置
///
/// 后端选择优先级：database_url > file_storage_path > 内存
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub database_url: String,
    #[serde(default)]
    pub file_storage_path: String,
    #[serde(default = "default_database_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

/// 短码生成配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortenerConfig {
    /// 生成-检查循环的最大尝试次数
    #[serde(default = "default_max_generate_attempts")]
    pub max_generate_attempts: u32,
}

/// 删除管道配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletionConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,
    /// 0 表示失败后直接丢弃
    #[serde(default = "default_max_flush_retries")]
    pub max_flush_retries: u32,
    #[serde(default = "default_flush_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default = "default_log_file")]
    pub file: Option<String>,
    #[serde(default = "default_max_backups")]
    pub max_backups: u32,
    #[serde(default = "default_enable_rotation")]
    pub enable_rotation: bool,
}

// ============================================================
// Default value functions for static config
// ============================================================

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_database_pool_size() -> u32 {
    10
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    100
}

fn default_retry_max_delay_ms() -> u64 {
    2000
}

fn default_max_generate_attempts() -> u32 {
    100
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_batch_size() -> usize {
    1000
}

fn default_flush_interval_secs() -> u64 {
    10
}

fn default_max_flush_retries() -> u32 {
    3
}

fn default_flush_retry_base_delay_ms() -> u64 {
    200
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_log_file() -> Option<String> {
    None
}

fn default_max_backups() -> u32 {
    5
}

fn default_enable_rotation() -> bool {
    false
}

// ============================================================
// Default implementations
// ============================================================

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            file_storage_path: String::new(),
            pool_size: default_database_pool_size(),
            retry_count: default_retry_count(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

impl Default for ShortenerConfig {
    fn default() -> Self {
        Self {
            max_generate_attempts: default_max_generate_attempts(),
        }
    }
}

impl Default for DeletionConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            batch_size: default_batch_size(),
            flush_interval_secs: default_flush_interval_secs(),
            max_flush_retries: default_max_flush_retries(),
            retry_base_delay_ms: default_flush_retry_base_delay_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: default_log_file(),
            max_backups: default_max_backups(),
            enable_rotation: default_enable_rotation(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_pipeline_contract() {
        let config = StaticConfig::default();
        assert_eq!(config.deletion.queue_capacity, 1024);
        assert_eq!(config.deletion.batch_size, 1000);
        assert_eq!(config.deletion.flush_interval_secs, 10);
        assert!(config.storage.database_url.is_empty());
        assert!(config.storage.file_storage_path.is_empty());
        assert_eq!(config.server.base_url, "http://localhost:8080");
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[server]
base_url = "https://sho.rt"

[storage]
file_storage_path = "/tmp/urls.jsonl"

[deletion]
batch_size = 10
"#
        )
        .unwrap();

        let config = StaticConfig::load_from(&path);
        assert_eq!(config.server.base_url, "https://sho.rt");
        assert_eq!(config.storage.file_storage_path, "/tmp/urls.jsonl");
        assert_eq!(config.deletion.batch_size, 10);
        // 未配置的字段保持默认值
        assert_eq!(config.deletion.queue_capacity, 1024);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = StaticConfig::load_from("/definitely/not/here/config.toml");
        assert_eq!(config.shortener.max_generate_attempts, 100);
    }

    #[test]
    fn test_sample_config_round_trips() {
        let sample = StaticConfig::generate_sample_config();
        assert!(sample.contains("[deletion]"));
        let parsed: StaticConfig = toml::from_str(&sample).unwrap();
        assert_eq!(parsed.deletion.batch_size, 1000);
    }
}
