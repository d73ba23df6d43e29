use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use linkvault::config::{get_config, init_config};
use linkvault::services::ShortenerService;
use linkvault::storage::StorageFactory;
use linkvault::system::{init_logging, shutdown_service, wait_for_signal};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    init_config();
    let config = get_config();
    let _guard = init_logging(&config.logging)?;

    info!("Starting linkvault {}", env!("CARGO_PKG_VERSION"));

    let storage = StorageFactory::create(&config.storage).await?;
    let service = Arc::new(ShortenerService::from_config(storage, &config));

    match service.get_stats().await {
        Ok(stats) => info!(
            "{} storage ready: {} urls, {} users",
            service.storage().backend_name(),
            stats.urls,
            stats.users
        ),
        Err(e) => error!("Failed to read storage stats: {}", e),
    }
    if !service.ping_storage().await {
        error!("Storage is not reachable");
    }

    wait_for_signal().await?;
    shutdown_service(&service, SHUTDOWN_TIMEOUT).await;
    Ok(())
}
