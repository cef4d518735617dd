//! Error types for the diagnostic tool runner
//!
//! Runtime lookup and report failures carry the exit codes of the textual
//! front end, so the binary can hand them straight to the shell.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the diagnostic tool runner
#[derive(Error, Debug)]
pub enum Error {
    // === Service/Connection Errors ===
    #[error("Management service is not running. Start it with 'diag-tool serve' or use --local")]
    ServiceUnavailable,

    #[error("Failed to connect to management service: {0}")]
    ServiceConnectionFailed(#[source] io::Error),

    #[error("Management service communication error: {0}")]
    ServiceCommunication(String),

    #[error("Remote call '{method}' failed: {message}")]
    RemoteCall { method: String, message: String },

    #[error("Unknown method '{method}' of interface '{interface}'")]
    UnknownMethod { interface: String, method: String },

    // === Descriptor Errors ===
    #[error("Descriptor of '{0}' has no entry section")]
    MissingEntrySection(String),

    // === Lookup Errors ===
    #[error("Can't find tool: {0}")]
    ToolNotFound(String),

    #[error("Can't find tests in tool: {0}")]
    NoTests(String),

    #[error("Can't find test: {test} in tool: {tool}")]
    TestNotFound { tool: String, test: String },

    // === Report Errors ===
    #[error("Can't get report from tool: {0}")]
    EmptyReport(String),

    #[error("Can't save report to file '{path}': {error}")]
    ReportWrite { path: String, error: String },

    // === Execution Errors ===
    #[error("Cannot change the task list while tasks are running")]
    ExecutorBusy,

    #[error("Failed to launch '{program}': {error}")]
    Launch { program: String, error: String },

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a test not found error
    pub fn test_not_found(tool: &str, test: &str) -> Self {
        Self::TestNotFound {
            tool: tool.to_string(),
            test: test.to_string(),
        }
    }

    /// Create a remote call failed error
    pub fn remote_call(method: &str, message: &str) -> Self {
        Self::RemoteCall {
            method: method.to_string(),
            message: message.to_string(),
        }
    }

    /// Create a report write error
    pub fn report_write(path: &std::path::Path, error: &io::Error) -> Self {
        Self::ReportWrite {
            path: path.display().to_string(),
            error: error.to_string(),
        }
    }

    /// Process exit code reported by the textual front end
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::NoTests(_) => 2,
            Error::TestNotFound { .. } => 3,
            _ => 1,
        }
    }

    /// Whether the error means the service is unreachable rather than broken
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Error::ServiceUnavailable | Error::ServiceConnectionFailed(_)
        )
    }
}

/// IPC-serializable error for service responses
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct IpcError {
    pub code: String,
    pub message: String,
}

impl From<&Error> for IpcError {
    fn from(e: &Error) -> Self {
        let code = match e {
            Error::ToolNotFound(_) => "TOOL_NOT_FOUND",
            Error::NoTests(_) => "NO_TESTS",
            Error::TestNotFound { .. } => "TEST_NOT_FOUND",
            Error::EmptyReport(_) => "EMPTY_REPORT",
            Error::MissingEntrySection(_) => "INVALID_DESCRIPTOR",
            Error::Launch { .. } => "LAUNCH_FAILED",
            Error::RemoteCall { .. } => "REMOTE_CALL_FAILED",
            Error::UnknownMethod { .. } => "UNKNOWN_METHOD",
            _ => "INTERNAL_ERROR",
        }
        .to_string();

        Self {
            code,
            message: e.to_string(),
        }
    }
}

impl From<IpcError> for Error {
    fn from(e: IpcError) -> Self {
        Error::ServiceCommunication(format!("{}: {}", e.code, e.message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_follow_front_end_contract() {
        assert_eq!(Error::ToolNotFound("net".into()).exit_code(), 1);
        assert_eq!(Error::EmptyReport("net".into()).exit_code(), 1);
        assert_eq!(Error::NoTests("net".into()).exit_code(), 2);
        assert_eq!(Error::test_not_found("net", "missing").exit_code(), 3);
        assert_eq!(Error::ServiceUnavailable.exit_code(), 1);
    }

    #[test]
    fn test_ipc_error_round_trip_keeps_message() {
        let err = Error::ToolNotFound("network-diag".into());
        let ipc = IpcError::from(&err);
        assert_eq!(ipc.code, "TOOL_NOT_FOUND");

        match Error::from(ipc) {
            Error::ServiceCommunication(message) => {
                assert!(message.starts_with("TOOL_NOT_FOUND"));
                assert!(message.contains("network-diag"));
            }
            other => panic!("Expected ServiceCommunication, got {other:?}"),
        }
    }
}
