//! Cross-platform socket and configuration paths
//!
//! Unix/macOS: Uses Unix domain sockets at $XDG_RUNTIME_DIR or /tmp
//! Windows: Uses named pipes at \\.\pipe\diag-tool-<username>

use std::io;
use std::path::PathBuf;

/// Name used for the IPC socket/pipe and the project directories
const APP_NAME: &str = "diag-tool";

/// Get the socket/pipe path of the management service
///
/// Platform-specific:
/// - Unix: `$XDG_RUNTIME_DIR/diag-tool/manager.sock` or `/tmp/diag-tool-<uid>/manager.sock`
/// - Windows: Named pipe path (handled by interprocess crate)
#[cfg(unix)]
pub fn socket_path() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir)
            .join(APP_NAME)
            .join("manager.sock");
    }

    // Fallback to /tmp with uid for security
    let uid = unsafe { libc::getuid() };
    PathBuf::from(format!("/tmp/{}-{}", APP_NAME, uid)).join("manager.sock")
}

#[cfg(windows)]
pub fn socket_path() -> PathBuf {
    let username = std::env::var("USERNAME").unwrap_or_else(|_| "default".to_string());
    PathBuf::from(format!("{}-{}", APP_NAME, username))
}

/// Get the socket name for interprocess LocalSocketName
///
/// An explicit override from the configuration wins over the default location.
#[cfg(unix)]
pub fn socket_name(override_name: Option<&str>) -> String {
    match override_name {
        Some(name) => name.to_string(),
        None => socket_path().to_string_lossy().into_owned(),
    }
}

#[cfg(windows)]
pub fn socket_name(override_name: Option<&str>) -> String {
    match override_name {
        Some(name) => name.to_string(),
        None => {
            let username = std::env::var("USERNAME").unwrap_or_else(|_| "default".to_string());
            format!("{}-{}", APP_NAME, username)
        }
    }
}

/// Ensure the socket directory exists with proper permissions
///
/// On Unix, creates the directory with mode 0700
#[cfg(unix)]
pub fn ensure_socket_dir(socket: &str) -> io::Result<()> {
    let socket = PathBuf::from(socket);
    let dir = socket.parent().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "Invalid socket path")
    })?;

    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))?;
    }

    Ok(())
}

#[cfg(windows)]
pub fn ensure_socket_dir(_socket: &str) -> io::Result<()> {
    // Named pipes don't need a directory on Windows
    Ok(())
}

/// Remove the socket file if it exists (for cleanup)
#[cfg(unix)]
pub fn remove_socket(socket: &str) -> io::Result<()> {
    let path = PathBuf::from(socket);
    if path.exists() {
        std::fs::remove_file(&path)?;
    }
    Ok(())
}

#[cfg(windows)]
pub fn remove_socket(_socket: &str) -> io::Result<()> {
    // Named pipes are automatically cleaned up on Windows
    Ok(())
}

/// Get the configuration directory path
///
/// Uses the directories crate for platform-appropriate locations:
/// - Linux: `~/.config/diag-tool/`
/// - macOS: `~/Library/Application Support/diag-tool/`
/// - Windows: `%APPDATA%\diag-tool\`
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME)
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the path to the log directory
pub fn log_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME)
        .map(|dirs| dirs.data_dir().join("logs"))
}
