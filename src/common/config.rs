//! Configuration file handling

use serde::Deserialize;
use std::path::PathBuf;

use super::paths::config_path;
use super::Result;

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Management service coordinates
    #[serde(default)]
    pub service: ServiceConfig,

    /// Local descriptor discovery
    #[serde(default)]
    pub local: LocalConfig,

    /// Availability watcher settings
    #[serde(default)]
    pub watcher: WatcherConfig,

    /// Default settings
    #[serde(default)]
    pub defaults: Defaults,
}

/// Where tools are discovered from
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Ask the management service for everything
    #[default]
    Remote,
    /// Read descriptor files and run tool executables directly
    Local,
}

/// Identifiers used when calling the management service
#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    /// Override for the IPC socket name
    #[serde(default)]
    pub socket: Option<String>,

    #[serde(default = "default_service_name")]
    pub name: String,

    #[serde(default = "default_manager_path")]
    pub manager_path: String,

    #[serde(default = "default_manager_interface")]
    pub manager_interface: String,

    #[serde(default = "default_get_objects_method")]
    pub get_objects_method: String,

    /// Interface every diagnostic tool object implements
    #[serde(default = "default_diag_interface")]
    pub diag_interface: String,

    #[serde(default = "default_info_method")]
    pub info_method: String,

    #[serde(default = "default_list_method")]
    pub list_method: String,

    #[serde(default = "default_run_method")]
    pub run_method: String,

    #[serde(default = "default_report_method")]
    pub report_method: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            socket: None,
            name: default_service_name(),
            manager_path: default_manager_path(),
            manager_interface: default_manager_interface(),
            get_objects_method: default_get_objects_method(),
            diag_interface: default_diag_interface(),
            info_method: default_info_method(),
            list_method: default_list_method(),
            run_method: default_run_method(),
            report_method: default_report_method(),
        }
    }
}

fn default_service_name() -> String {
    "ru.basealt.alterator".to_string()
}
fn default_manager_path() -> String {
    "/ru/basealt/alterator".to_string()
}
fn default_manager_interface() -> String {
    "ru.basealt.alterator.manager".to_string()
}
fn default_get_objects_method() -> String {
    "GetObjects".to_string()
}
fn default_diag_interface() -> String {
    "ru.basealt.alterator.diag1".to_string()
}
fn default_info_method() -> String {
    "Info".to_string()
}
fn default_list_method() -> String {
    "List".to_string()
}
fn default_run_method() -> String {
    "Run".to_string()
}
fn default_report_method() -> String {
    "Report".to_string()
}

/// Local descriptor discovery settings
#[derive(Debug, Deserialize, Clone)]
pub struct LocalConfig {
    /// Directories scanned for tool descriptors
    #[serde(default = "default_descriptor_dirs")]
    pub descriptor_dirs: Vec<PathBuf>,

    /// File extension of descriptor files (without the dot)
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Arguments that make a tool executable print its test names
    #[serde(default = "default_list_args")]
    pub list_args: Vec<String>,

    /// Arguments that make a tool executable print its report
    #[serde(default = "default_report_args")]
    pub report_args: Vec<String>,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            descriptor_dirs: default_descriptor_dirs(),
            extension: default_extension(),
            list_args: default_list_args(),
            report_args: default_report_args(),
        }
    }
}

fn default_descriptor_dirs() -> Vec<PathBuf> {
    vec![
        PathBuf::from("/usr/share/alterator/objects"),
        PathBuf::from("/usr/lib/alterator/backends"),
    ]
}
fn default_extension() -> String {
    "diag".to_string()
}
fn default_list_args() -> Vec<String> {
    vec!["-l".to_string()]
}
fn default_report_args() -> Vec<String> {
    vec!["-r".to_string()]
}

/// Availability watcher settings
#[derive(Debug, Deserialize, Clone)]
pub struct WatcherConfig {
    /// Interval between service probes
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
        }
    }
}

fn default_poll_interval() -> u64 {
    500
}

/// Default settings
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Defaults {
    /// Build strategy used when no flag overrides it
    #[serde(default)]
    pub strategy: StrategyKind,

    /// Locale tag used for display names; falls back to the environment
    #[serde(default)]
    pub locale: Option<String>,
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = config_path() {
            if path.exists() {
                let content = std::fs::read_to_string(&path).map_err(|e| {
                    super::Error::FileRead {
                        path: path.display().to_string(),
                        error: e.to_string(),
                    }
                })?;
                return Self::parse(&content);
            }
        }
        Ok(Self::default())
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| super::Error::ConfigParse(e.to_string()))
    }
}
