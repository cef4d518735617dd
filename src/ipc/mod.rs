//! IPC communication with the management service
//!
//! Uses Unix domain sockets on Unix/macOS and named pipes on Windows
//! via the interprocess crate.

pub mod protocol;
pub mod transport;
