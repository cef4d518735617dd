//! Command handler for processing IPC requests
//!
//! Translates method calls into catalog operations.

use serde_json::json;

use crate::common::{config::ServiceConfig, error::IpcError, Error, Result};
use crate::ipc::protocol::{Command, ReportData, Response, StatusResult};
use crate::service::{Endpoint, LocalCatalog, RemoteService};

/// State shared by all client connections
pub struct ManagerState {
    pub catalog: LocalCatalog,
    pub service: ServiceConfig,
    /// Identity of this manager instance
    pub owner: String,
}

/// Handle an IPC command
pub async fn handle_command(state: &ManagerState, id: u64, command: Command) -> Response {
    match handle_command_inner(state, command).await {
        Ok(result) => Response::success(id, result),
        Err(e) => {
            tracing::debug!(error = %e, "Command failed");
            Response::error(id, IpcError::from(&e))
        }
    }
}

async fn handle_command_inner(state: &ManagerState, command: Command) -> Result<serde_json::Value> {
    match command {
        Command::Status => Ok(serde_json::to_value(StatusResult {
            owner: state.owner.clone(),
            service: state.service.name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            tools: state.catalog.len(),
        })?),

        Command::Call {
            object,
            interface,
            method,
            args,
        } => call(state, &object, &interface, &method, &args).await,
    }
}

async fn call(
    state: &ManagerState,
    object: &str,
    interface: &str,
    method: &str,
    args: &[String],
) -> Result<serde_json::Value> {
    let service = &state.service;
    let catalog = &state.catalog;

    let unknown = || Error::UnknownMethod {
        interface: interface.to_string(),
        method: method.to_string(),
    };

    if interface == service.manager_interface {
        if method == service.get_objects_method {
            return Ok(json!(catalog.list_objects().await?));
        }
        return Err(unknown());
    }

    if interface != service.diag_interface {
        return Err(unknown());
    }

    let endpoint = Endpoint::for_object(service, object);
    match method {
        m if m == service.info_method => Ok(json!(catalog.info(&endpoint).await?)),
        m if m == service.list_method => Ok(json!(catalog.list_tests(&endpoint).await?)),
        m if m == service.run_method => {
            tracing::info!(object, ?args, "Running test");
            Ok(serde_json::to_value(catalog.run(&endpoint, args).await?)?)
        }
        m if m == service.report_method => {
            let report = catalog.report(&endpoint).await?;
            tracing::debug!(object, bytes = report.len(), "Sending report");
            Ok(serde_json::to_value(ReportData::encode(&report))?)
        }
        _ => Err(unknown()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> ManagerState {
        let dir = tempfile::tempdir().unwrap();
        let config = crate::service::catalog::tests::config_for(dir.path());
        ManagerState {
            catalog: LocalCatalog::scan(&config).unwrap(),
            service: ServiceConfig::default(),
            owner: "owner-1".into(),
        }
    }

    #[tokio::test]
    async fn test_status() {
        let response = handle_command(&state(), 4, Command::Status).await;
        assert!(response.success);
        assert_eq!(response.id, 4);

        let status: StatusResult = serde_json::from_value(response.result.unwrap()).unwrap();
        assert_eq!(status.owner, "owner-1");
        assert_eq!(status.tools, 0);
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let service = ServiceConfig::default();
        let command = Command::Call {
            object: "network".into(),
            interface: service.diag_interface.clone(),
            method: "Explode".into(),
            args: Vec::new(),
        };

        let response = handle_command(&state(), 1, command).await;
        assert!(!response.success);
        assert_eq!(response.error.unwrap().code, "UNKNOWN_METHOD");
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let service = ServiceConfig::default();
        let command = Command::Call {
            object: "missing".into(),
            interface: service.diag_interface.clone(),
            method: service.info_method.clone(),
            args: Vec::new(),
        };

        let response = handle_command(&state(), 2, command).await;
        assert_eq!(response.error.unwrap().code, "TOOL_NOT_FOUND");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_large_report_fits_in_a_frame() {
        use crate::ipc::transport::{recv_message, send_message};
        use crate::service::catalog::tests::{config_for, write_tool, NETWORK_DESCRIPTOR};

        const REPORT_SIZE: usize = 20 * 1024 * 1024;

        let dir = tempfile::tempdir().unwrap();
        write_tool(
            dir.path(),
            "network",
            NETWORK_DESCRIPTOR,
            "#!/bin/sh\nhead -c 20971520 /dev/zero | tr '\\000' '\\377'\n",
        );
        let state = ManagerState {
            catalog: LocalCatalog::scan(&config_for(dir.path())).unwrap(),
            service: ServiceConfig::default(),
            owner: "owner-1".into(),
        };

        let command = Command::Call {
            object: "network".into(),
            interface: state.service.diag_interface.clone(),
            method: state.service.report_method.clone(),
            args: Vec::new(),
        };
        let response = handle_command(&state, 5, command).await;
        assert!(response.success, "{:?}", response.error);

        let mut frame = Vec::new();
        send_message(&mut frame, &serde_json::to_vec(&response).unwrap())
            .await
            .unwrap();
        let data = recv_message(&mut std::io::Cursor::new(frame)).await.unwrap();

        let received: Response = serde_json::from_slice(&data).unwrap();
        let report: ReportData = serde_json::from_value(received.result.unwrap()).unwrap();
        let bytes = report.decode().unwrap();
        assert_eq!(bytes.len(), REPORT_SIZE);
        assert!(bytes.iter().all(|&b| b == 0xff));
    }
}
