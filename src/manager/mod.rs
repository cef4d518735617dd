//! Serve mode - a management service backed by local descriptor files
//!
//! Exposes the tools found by [`LocalCatalog`](crate::service::LocalCatalog)
//! over the IPC socket so remote-strategy clients can enumerate and run them.

mod handler;
mod server;

pub use server::Manager;

use crate::common::{config::Config, Result};

/// Run in serve mode
///
/// This is the entry point when the binary is invoked with the `serve` command.
/// The manager:
/// 1. Scans the descriptor directories once
/// 2. Creates an IPC socket/pipe for client connections
/// 3. Answers each connection on its own task
/// 4. Removes the socket on SIGTERM or SIGINT
pub async fn run(config: &Config) -> Result<()> {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = std::process::id(),
        "Starting management service"
    );

    Manager::new(config)?.run().await
}
