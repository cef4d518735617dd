//! Client side of the management service
//!
//! Every call opens its own connection, so a service restart between calls
//! is picked up without any reconnect logic.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::io::BufReader;

use crate::common::{config::ServiceConfig, paths, Error, Result};
use crate::ipc::protocol::{Command, ReportData, Request, Response, StatusResult};
use crate::ipc::transport;

use super::{Endpoint, RemoteService, RunOutput};

/// Client for the management service socket
pub struct ServiceClient {
    config: ServiceConfig,
    socket: String,
    next_id: AtomicU64,
}

impl ServiceClient {
    pub fn new(config: ServiceConfig) -> Self {
        let socket = paths::socket_name(config.socket.as_deref());
        Self {
            config,
            socket,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn socket(&self) -> &str {
        &self.socket
    }

    /// Send a command and wait for the response
    pub async fn send_command(&self, command: Command) -> Result<serde_json::Value> {
        let stream = transport::connect(&self.socket).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound
                || e.kind() == std::io::ErrorKind::ConnectionRefused
            {
                Error::ServiceUnavailable
            } else {
                Error::ServiceConnectionFailed(e)
            }
        })?;

        let (reader, mut writer) = tokio::io::split(stream);
        let mut reader = BufReader::new(reader);

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = Request { id, command };
        let json = serde_json::to_vec(&request)?;

        transport::send_message(&mut writer, &json)
            .await
            .map_err(|e| Error::ServiceCommunication(e.to_string()))?;

        let response_data = transport::recv_message(&mut reader)
            .await
            .map_err(|e| Error::ServiceCommunication(e.to_string()))?;

        let response: Response = serde_json::from_slice(&response_data)?;

        if response.id != id {
            return Err(Error::ServiceCommunication(format!(
                "Response ID mismatch: expected {}, got {}",
                id, response.id
            )));
        }

        if response.success {
            Ok(response.result.unwrap_or(serde_json::Value::Null))
        } else {
            let error = response
                .error
                .unwrap_or_else(|| crate::common::error::IpcError {
                    code: "UNKNOWN".to_string(),
                    message: "Unknown error".to_string(),
                });
            Err(error.into())
        }
    }

    /// Call a method on an object and decode its result
    async fn call<T: DeserializeOwned>(
        &self,
        object: &str,
        interface: &str,
        method: &str,
        args: &[String],
    ) -> Result<T> {
        tracing::debug!(object, method, ?args, "Remote call");

        let value = self
            .send_command(Command::Call {
                object: object.to_string(),
                interface: interface.to_string(),
                method: method.to_string(),
                args: args.to_vec(),
            })
            .await
            .map_err(|e| match e {
                Error::ServiceCommunication(message) => Error::remote_call(method, &message),
                other => other,
            })?;

        serde_json::from_value(value)
            .map_err(|e| Error::remote_call(method, &format!("Malformed reply: {}", e)))
    }

    /// Status of the running service
    pub async fn status(&self) -> Result<StatusResult> {
        let value = self.send_command(Command::Status).await?;
        Ok(serde_json::from_value(value)?)
    }
}

#[async_trait]
impl RemoteService for ServiceClient {
    async fn list_objects(&self) -> Result<Vec<String>> {
        self.call(
            &self.config.manager_path,
            &self.config.manager_interface,
            &self.config.get_objects_method,
            &[],
        )
        .await
    }

    async fn info(&self, endpoint: &Endpoint) -> Result<String> {
        self.call(&endpoint.object, &endpoint.interface, &endpoint.info_method, &[])
            .await
    }

    async fn list_tests(&self, endpoint: &Endpoint) -> Result<Vec<String>> {
        self.call(&endpoint.object, &endpoint.interface, &endpoint.list_method, &[])
            .await
    }

    async fn run(&self, endpoint: &Endpoint, args: &[String]) -> Result<RunOutput> {
        self.call(&endpoint.object, &endpoint.interface, &endpoint.run_method, args)
            .await
    }

    async fn report(&self, endpoint: &Endpoint) -> Result<Vec<u8>> {
        let report: ReportData = self
            .call(&endpoint.object, &endpoint.interface, &endpoint.report_method, &[])
            .await?;
        report.decode().map_err(|e| {
            Error::remote_call(&endpoint.report_method, &format!("Malformed report: {}", e))
        })
    }

    async fn owner(&self) -> Result<Option<String>> {
        match self.status().await {
            Ok(status) => Ok(Some(status.owner)),
            Err(e) if e.is_unavailable() => Ok(None),
            Err(e) => Err(e),
        }
    }
}
