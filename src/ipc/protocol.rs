//! IPC protocol message types
//!
//! Defines the request/response format between the CLI and the management
//! service. Every remote operation is a generic method call on an object.

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::common::error::IpcError;

/// IPC request from client to service
#[derive(Debug, Serialize, Deserialize)]
pub struct Request {
    /// Request ID for matching responses
    pub id: u64,
    /// The command to execute
    pub command: Command,
}

/// IPC response from service to client
#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    /// Request ID this response corresponds to
    pub id: u64,
    /// Whether the command succeeded
    pub success: bool,
    /// Result data on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Error information on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<IpcError>,
}

impl Response {
    /// Create a success response
    pub fn success(id: u64, result: serde_json::Value) -> Self {
        Self {
            id,
            success: true,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(id: u64, error: IpcError) -> Self {
        Self {
            id,
            success: false,
            result: None,
            error: Some(error),
        }
    }
}

/// Commands that can be sent to the management service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Service identity and health
    Status,

    /// Call `method` of `interface` on `object`
    Call {
        object: String,
        interface: String,
        method: String,
        #[serde(default)]
        args: Vec<String>,
    },
}

/// Status response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResult {
    /// Token that changes every time the service is restarted
    pub owner: String,
    pub service: String,
    pub version: String,
    pub tools: usize,
}

/// Report archive carried as base64 so binary data stays compact in a JSON frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportData {
    pub data: String,
}

impl ReportData {
    pub fn encode(bytes: &[u8]) -> Self {
        Self {
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    }

    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        base64::engine::general_purpose::STANDARD.decode(&self.data)
    }
}
