//! Process-level plumbing: logging setup and graceful shutdown

pub mod logging;
pub mod shutdown;

pub use logging::init_logging;
pub use shutdown::{shutdown_service, wait_for_signal};
