//! Tool discovery from descriptor files on disk
//!
//! Each `<object>.<extension>` file in the configured directories describes
//! one tool. The tool executable answers the `List` and `Report` calls when
//! started with the configured arguments, and runs a test when started with
//! the test's arguments.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use async_trait::async_trait;
use tokio::process::Command;

use crate::common::config::LocalConfig;
use crate::common::{Error, Result};
use crate::descriptor::parser::{ENTRY_SECTION, EXEC_KEY};
use crate::descriptor::Sections;

use super::{Endpoint, RemoteService, RunOutput};

/// Owner token reported by a catalog; it never restarts
pub const LOCAL_OWNER: &str = "local";

/// A discovered descriptor file
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub object: String,
    pub descriptor: PathBuf,
    pub text: String,
    pub executable: Option<PathBuf>,
}

/// Descriptor files found in the configured directories
#[derive(Debug, Clone)]
pub struct LocalCatalog {
    config: LocalConfig,
    entries: Vec<CatalogEntry>,
}

impl LocalCatalog {
    /// Scan the descriptor directories
    ///
    /// Missing directories are skipped. When two directories carry the same
    /// object, the one listed first wins.
    pub fn scan(config: &LocalConfig) -> Result<Self> {
        let mut entries: Vec<CatalogEntry> = Vec::new();

        for dir in &config.descriptor_dirs {
            if !dir.is_dir() {
                tracing::debug!(dir = %dir.display(), "Descriptor directory not present");
                continue;
            }

            let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
                .map_err(|e| Error::FileRead {
                    path: dir.display().to_string(),
                    error: e.to_string(),
                })?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| {
                    path.is_file()
                        && path.extension().and_then(|ext| ext.to_str())
                            == Some(config.extension.as_str())
                })
                .collect();
            files.sort();

            for path in files {
                let Some(object) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                if entries.iter().any(|e| e.object == object) {
                    tracing::debug!(object, path = %path.display(), "Shadowed descriptor");
                    continue;
                }

                let text = match std::fs::read_to_string(&path) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "Unreadable descriptor");
                        continue;
                    }
                };

                let executable = resolve_executable(&text, object, dir);
                tracing::debug!(
                    object,
                    executable = ?executable,
                    "Discovered tool descriptor"
                );

                entries.push(CatalogEntry {
                    object: object.to_string(),
                    descriptor: path.clone(),
                    text,
                    executable,
                });
            }
        }

        Ok(Self {
            config: config.clone(),
            entries,
        })
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, object: &str) -> Result<&CatalogEntry> {
        self.entries
            .iter()
            .find(|e| e.object == object)
            .ok_or_else(|| Error::ToolNotFound(object.to_string()))
    }

    /// Executable of a tool object, when it could be resolved
    pub fn executable(&self, object: &str) -> Option<PathBuf> {
        self.entry(object).ok().and_then(|e| e.executable.clone())
    }

    async fn exec(&self, object: &str, args: &[String]) -> Result<Output> {
        let entry = self.entry(object)?;
        let program = entry.executable.as_ref().ok_or_else(|| Error::Launch {
            program: object.to_string(),
            error: "executable not found".to_string(),
        })?;

        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::Launch {
                program: program.display().to_string(),
                error: e.to_string(),
            })
    }
}

/// Find the tool executable named by `Exec`, or by the object name
fn resolve_executable(text: &str, object: &str, dir: &Path) -> Option<PathBuf> {
    let sections = Sections::parse(text);
    let exec = sections
        .get(ENTRY_SECTION)
        .and_then(|entry| entry.get(EXEC_KEY))
        .filter(|exec| !exec.is_empty())
        .unwrap_or(object);

    let path = Path::new(exec);
    if path.is_absolute() {
        return path.exists().then(|| path.to_path_buf());
    }

    let beside = dir.join(path);
    if beside.is_file() {
        return Some(beside);
    }

    which::which(exec).ok()
}

fn lines(data: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(data)
        .lines()
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl RemoteService for LocalCatalog {
    async fn list_objects(&self) -> Result<Vec<String>> {
        Ok(self.entries.iter().map(|e| e.object.clone()).collect())
    }

    async fn info(&self, endpoint: &Endpoint) -> Result<String> {
        Ok(self.entry(&endpoint.object)?.text.clone())
    }

    async fn list_tests(&self, endpoint: &Endpoint) -> Result<Vec<String>> {
        let output = self.exec(&endpoint.object, &self.config.list_args).await?;
        if !output.status.success() {
            return Err(Error::remote_call(
                &endpoint.list_method,
                &format!(
                    "exit code {}: {}",
                    output.status.code().unwrap_or(-1),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }

        Ok(lines(&output.stdout)
            .into_iter()
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
            .collect())
    }

    async fn run(&self, endpoint: &Endpoint, args: &[String]) -> Result<RunOutput> {
        let output = self.exec(&endpoint.object, args).await?;
        Ok(RunOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: lines(&output.stdout),
            stderr: lines(&output.stderr),
        })
    }

    async fn report(&self, endpoint: &Endpoint) -> Result<Vec<u8>> {
        let output = self.exec(&endpoint.object, &self.config.report_args).await?;
        if !output.status.success() {
            return Err(Error::remote_call(
                &endpoint.report_method,
                &format!("exit code {}", output.status.code().unwrap_or(-1)),
            ));
        }
        Ok(output.stdout)
    }

    async fn owner(&self) -> Result<Option<String>> {
        Ok(Some(LOCAL_OWNER.to_string()))
    }
}
