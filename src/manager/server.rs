//! Manager server - IPC listener and accept loop

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use interprocess::local_socket::traits::tokio::Listener as ListenerTrait;
use tokio::io::BufReader;

use crate::common::{config::Config, error::IpcError, paths, Result};
use crate::ipc::{
    protocol::{Request, Response},
    transport,
};
use crate::service::LocalCatalog;

use super::handler::{self, ManagerState};

/// Idle time after which a client connection is dropped
const CLIENT_TIMEOUT: Duration = Duration::from_secs(300);

/// Management service backed by the local descriptor catalog
pub struct Manager {
    state: Arc<ManagerState>,
    socket: String,
}

impl Manager {
    pub fn new(config: &Config) -> Result<Self> {
        let catalog = LocalCatalog::scan(&config.local)?;
        tracing::info!(tools = catalog.len(), "Loaded tool catalog");

        Ok(Self {
            state: Arc::new(ManagerState {
                catalog,
                service: config.service.clone(),
                owner: owner_token(),
            }),
            socket: paths::socket_name(config.service.socket.as_deref()),
        })
    }

    pub fn socket(&self) -> &str {
        &self.socket
    }

    pub fn owner(&self) -> &str {
        &self.state.owner
    }

    /// Serve until SIGTERM or SIGINT
    pub async fn run(self) -> Result<()> {
        self.serve(shutdown_signal()).await
    }

    /// Serve until `shutdown` resolves, then remove the socket
    pub async fn serve(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let listener = transport::create_listener(&self.socket).await?;
        tracing::info!(socket = %self.socket, owner = %self.state.owner, "Manager listening");

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accept_result = listener.accept() => match accept_result {
                    Ok(stream) => {
                        let state = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            if let Err(e) = handle_client(&state, stream).await {
                                tracing::error!("Error handling client: {}", e);
                            }
                        });
                    }
                    Err(e) => tracing::error!("Accept error: {}", e),
                },
            }
        }

        paths::remove_socket(&self.socket)?;
        tracing::info!("Manager shutdown complete");
        Ok(())
    }
}

/// Token that differs between manager instances
fn owner_token() -> String {
    let started = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("{}-{}", std::process::id(), started)
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigterm, mut sigint) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(term), Ok(int)) => (term, int),
        (Err(e), _) | (_, Err(e)) => {
            tracing::error!("Failed to install signal handlers: {}", e);
            return std::future::pending().await;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down gracefully"),
        _ = sigint.recv() => tracing::info!("Received SIGINT (Ctrl+C), shutting down gracefully"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Received Ctrl+C, shutting down gracefully");
}

/// Handle a single client connection
async fn handle_client(state: &ManagerState, stream: transport::platform::Stream) -> Result<()> {
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);

    loop {
        let request_data = tokio::select! {
            result = transport::recv_message(&mut reader) => match result {
                Ok(data) => data,
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    tracing::debug!("Client disconnected");
                    break;
                }
                Err(e) => {
                    tracing::error!("Error reading request: {}", e);
                    break;
                }
            },
            _ = tokio::time::sleep(CLIENT_TIMEOUT) => {
                tracing::debug!("Client timeout");
                break;
            }
        };

        let request: Request = match serde_json::from_slice(&request_data) {
            Ok(req) => req,
            Err(e) => {
                tracing::error!("Invalid request: {}", e);
                let response = Response::error(
                    0,
                    IpcError {
                        code: "INVALID_REQUEST".to_string(),
                        message: e.to_string(),
                    },
                );
                let json = serde_json::to_vec(&response)?;
                transport::send_message(&mut writer, &json).await?;
                continue;
            }
        };

        tracing::debug!("Received command: {:?}", request.command);

        let response = handler::handle_command(state, request.id, request.command).await;
        let json = serde_json::to_vec(&response)?;
        transport::send_message(&mut writer, &json).await?;
    }

    Ok(())
}
