//! Task records for tools and tests

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::descriptor::parser::DEFAULT_ICON;
use crate::descriptor::{Locale, LocalizedText};
use crate::service::Endpoint;

/// How a task is executed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Remote coordinates for the run, info and report operations
    pub endpoint: Endpoint,
    /// When set, the task runs as a local subprocess of this executable
    pub executable: Option<PathBuf>,
}

impl Invocation {
    pub fn remote(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            executable: None,
        }
    }

    pub fn local(endpoint: Endpoint, executable: PathBuf) -> Self {
        Self {
            endpoint,
            executable: Some(executable),
        }
    }
}

/// Result of the last execution of a task
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskReport {
    pub exit_code: Option<i32>,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

impl TaskReport {
    /// A report for a task that could not be started or reached
    pub fn failed(exit_code: i32, message: String) -> Self {
        Self {
            exit_code: Some(exit_code),
            stdout: Vec::new(),
            stderr: vec![message],
        }
    }

    pub fn passed(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// A tool or one of its tests
#[derive(Debug)]
pub struct Task {
    /// Stable identity, unique within the parent node
    pub id: String,
    /// Display name for the active locale
    pub name: String,
    pub description: String,
    pub icon: String,
    pub arguments: Vec<String>,
    pub report_suffix: String,
    pub invocation: Invocation,

    pub(crate) names: LocalizedText,
    pub(crate) descriptions: LocalizedText,
    pub(crate) icons: LocalizedText,

    report: Mutex<TaskReport>,
}

impl Task {
    pub fn new(id: &str, invocation: Invocation) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            icon: DEFAULT_ICON.to_string(),
            arguments: Vec::new(),
            report_suffix: String::new(),
            invocation,
            names: LocalizedText::default(),
            descriptions: LocalizedText::default(),
            icons: LocalizedText::default(),
            report: Mutex::new(TaskReport::default()),
        }
    }

    /// Resolve the display strings for a locale
    pub fn localize(&mut self, locale: &Locale) {
        self.name = self.names.resolve_or(locale, &self.id);
        self.description = self.descriptions.resolve_or(locale, "");
        self.icon = self.icons.resolve_or(locale, DEFAULT_ICON);
    }

    /// Snapshot of the last execution result
    pub fn report(&self) -> TaskReport {
        self.lock_report().clone()
    }

    pub fn set_report(&self, report: TaskReport) {
        *self.lock_report() = report;
    }

    pub fn clear_reports(&self) {
        *self.lock_report() = TaskReport::default();
    }

    fn lock_report(&self) -> MutexGuard<'_, TaskReport> {
        // A panic while holding the lock cannot leave a report half-written
        self.report.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Two tasks are equal when their definitions are; results are not compared
impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.description == other.description
            && self.icon == other.icon
            && self.arguments == other.arguments
            && self.report_suffix == other.report_suffix
            && self.invocation == other.invocation
            && self.names == other.names
            && self.descriptions == other.descriptions
            && self.icons == other.icons
    }
}

impl Eq for Task {}
