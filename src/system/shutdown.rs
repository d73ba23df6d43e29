use std::time::Duration;

use tokio::signal;
use tracing::{error, warn};

use crate::services::ShortenerService;

/// 等待 Ctrl+C
pub async fn wait_for_signal() -> std::io::Result<()> {
    signal::ctrl_c().await?;
    warn!("Shutdown signal received, flushing pending deletions...");
    Ok(())
}

/// 关闭服务，超时则放弃等待最后一次刷盘
pub async fn shutdown_service(service: &ShortenerService, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, service.shutdown()).await {
        Ok(()) => {
            warn!("Deletion pipeline flushed, shutting down");
            true
        }
        Err(_) => {
            error!(
                "Deletion pipeline did not finish within {:?}, {} requests still queued",
                timeout,
                service.pipeline().pending()
            );
            false
        }
    }
}
