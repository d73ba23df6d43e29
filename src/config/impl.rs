use std::sync::{Arc, OnceLock};

use arc_swap::ArcSwap;

use super::StaticConfig;

static CONFIG: OnceLock<ArcSwap<StaticConfig>> = OnceLock::new();

/// Get the global configuration instance
///
/// Returns an Arc pointer to the configuration, which is cheap to clone
/// and doesn't hold any locks.
pub fn get_config() -> Arc<StaticConfig> {
    CONFIG
        .get()
        .expect("Config not initialized. Call init_config() first.")
        .load_full()
}

/// Initialize the global configuration
///
/// Loads configuration from "config.toml" in the current directory.
/// If the file doesn't exist, uses in-memory defaults.
pub fn init_config() {
    CONFIG.get_or_init(|| ArcSwap::from_pointee(StaticConfig::load()));
}

/// Replace the global configuration (e.g. after a reload)
pub fn update_config(config: StaticConfig) {
    match CONFIG.get() {
        Some(current) => current.store(Arc::new(config)),
        None => {
            CONFIG.get_or_init(|| ArcSwap::from_pointee(config));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_replaces_global_config() {
        let mut config = StaticConfig::default();
        config.server.base_url = "https://lv.example".to_string();
        config.deletion.batch_size = 7;
        update_config(config);

        // 已初始化后 init_config 不会覆盖
        init_config();
        let current = get_config();
        assert_eq!(current.server.base_url, "https://lv.example");
        assert_eq!(current.deletion.batch_size, 7);
    }
}
