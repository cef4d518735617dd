//! Management service capability
//!
//! The core only relies on [`RemoteService`]: enumerate tool objects, then
//! call `Info`, `List`, `Run` and `Report` on one of them. [`ServiceClient`]
//! reaches a running management service over the local socket;
//! [`LocalCatalog`] answers the same calls from descriptor files on disk.

pub mod catalog;
pub mod client;
pub mod watcher;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::common::{config::ServiceConfig, Result};

pub use catalog::LocalCatalog;
pub use client::ServiceClient;
pub use watcher::{ServiceEvent, ServiceWatcher};

/// Coordinates of one tool object on the management service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub service: String,
    pub object: String,
    pub interface: String,
    pub info_method: String,
    pub list_method: String,
    pub run_method: String,
    pub report_method: String,
}

impl Endpoint {
    pub fn for_object(config: &ServiceConfig, object: &str) -> Self {
        Self {
            service: config.name.clone(),
            object: object.to_string(),
            interface: config.diag_interface.clone(),
            info_method: config.info_method.clone(),
            list_method: config.list_method.clone(),
            run_method: config.run_method.clone(),
            report_method: config.report_method.clone(),
        }
    }
}

/// Captured result of a remote `Run` call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutput {
    pub exit_code: i32,
    #[serde(default)]
    pub stdout: Vec<String>,
    #[serde(default)]
    pub stderr: Vec<String>,
}

/// Calls the core makes on the management service
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Object identities of all registered tools
    async fn list_objects(&self) -> Result<Vec<String>>;

    /// Descriptor text of a tool
    async fn info(&self, endpoint: &Endpoint) -> Result<String>;

    /// Test names of a tool, in the tool's order
    async fn list_tests(&self, endpoint: &Endpoint) -> Result<Vec<String>>;

    async fn run(&self, endpoint: &Endpoint, args: &[String]) -> Result<RunOutput>;

    /// Opaque report payload
    async fn report(&self, endpoint: &Endpoint) -> Result<Vec<u8>>;

    /// Identity of the current service instance; `None` while unreachable
    async fn owner(&self) -> Result<Option<String>>;
}
