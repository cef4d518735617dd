//! diagtool - a runner for system diagnostic tools
//!
//! Tools describe themselves with desktop-entry-style descriptors. This
//! library parses them into a two-level task tree, runs tests sequentially
//! with cancellation and outage handling, and talks to the management
//! service that hosts the tools.

pub mod cli;
pub mod commands;
pub mod common;
pub mod descriptor;
pub mod executor;
pub mod ipc;
pub mod manager;
pub mod model;
pub mod service;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use executor::{Executor, ExecutorEvent};
pub use model::{Task, TaskRef, ToolView, Tree};
