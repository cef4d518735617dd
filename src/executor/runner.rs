//! Execution of a single task
//!
//! A task with an executable runs as a local subprocess whose output is
//! streamed line by line. Any other task is run through the management
//! service's `Run` call.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, watch};

use crate::model::{TaskRef, TaskReport};
use crate::service::RemoteService;

use super::{ExecutorEvent, Flags, OutputStream};

/// Exit code recorded when a task could not be launched or reached
pub const SYNTHETIC_FAILURE: i32 = -1;

/// Forwards output lines of the running task to the executor's consumer
pub struct OutputSink {
    task: TaskRef,
    events: mpsc::UnboundedSender<ExecutorEvent>,
}

impl OutputSink {
    pub(crate) fn new(task: TaskRef, events: mpsc::UnboundedSender<ExecutorEvent>) -> Self {
        Self { task, events }
    }

    pub fn line(&self, stream: OutputStream, line: &str) {
        // Consumer gone: nobody left to show the output to
        let _ = self.events.send(ExecutorEvent::Output {
            task: self.task.clone(),
            stream,
            line: line.to_string(),
        });
    }
}

/// Observes the executor's stop flag from inside a running task
#[derive(Clone)]
pub struct StopSignal {
    flags: watch::Receiver<Flags>,
}

impl StopSignal {
    pub(crate) fn new(flags: watch::Receiver<Flags>) -> Self {
        Self { flags }
    }

    pub fn is_set(&self) -> bool {
        self.flags.borrow().stop
    }

    /// Resolves once the stop flag is set
    pub async fn stopped(&mut self) {
        if self.flags.wait_for(|flags| flags.stop).await.is_err() {
            // Executor dropped; a stop can no longer arrive
            std::future::pending::<()>().await;
        }
    }
}

/// Executes one task and captures its result
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(&self, task: &TaskRef, output: &OutputSink, stop: StopSignal) -> TaskReport;
}

/// Runs local executables directly and everything else through the service
pub struct DefaultRunner {
    service: Option<Arc<dyn RemoteService>>,
}

impl DefaultRunner {
    pub fn new(service: Arc<dyn RemoteService>) -> Self {
        Self {
            service: Some(service),
        }
    }

    /// A runner that can only launch local executables
    pub fn local_only() -> Self {
        Self { service: None }
    }

    async fn run_process(
        &self,
        program: &Path,
        task: &TaskRef,
        output: &OutputSink,
        mut stop: StopSignal,
    ) -> TaskReport {
        tracing::debug!(task = %task.id, program = %program.display(), args = ?task.arguments, "Spawning test");

        let mut child = match Command::new(program)
            .args(&task.arguments)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                let message = format!("Failed to launch '{}': {}", program.display(), e);
                output.line(OutputStream::Stderr, &message);
                return TaskReport::failed(SYNTHETIC_FAILURE, message);
            }
        };

        let mut stdout = child.stdout.take().map(RawLines::new);
        let mut stderr = child.stderr.take().map(RawLines::new);
        let mut report = TaskReport::default();
        let mut kill_requested = false;

        while stdout.is_some() || stderr.is_some() {
            tokio::select! {
                line = next_line(&mut stdout), if stdout.is_some() => match line {
                    Some(line) => {
                        output.line(OutputStream::Stdout, &line);
                        report.stdout.push(line);
                    }
                    None => stdout = None,
                },
                line = next_line(&mut stderr), if stderr.is_some() => match line {
                    Some(line) => {
                        output.line(OutputStream::Stderr, &line);
                        report.stderr.push(line);
                    }
                    None => stderr = None,
                },
                _ = stop.stopped(), if !kill_requested => {
                    tracing::info!(task = %task.id, "Terminating running test");
                    if let Err(e) = child.start_kill() {
                        tracing::debug!(task = %task.id, error = %e, "Kill request failed");
                    }
                    kill_requested = true;
                }
            }
        }

        report.exit_code = Some(match child.wait().await {
            Ok(status) => status.code().unwrap_or(SYNTHETIC_FAILURE),
            Err(e) => {
                tracing::warn!(task = %task.id, error = %e, "Failed to reap test process");
                SYNTHETIC_FAILURE
            }
        });
        report
    }

    async fn run_remote(&self, task: &TaskRef, output: &OutputSink) -> TaskReport {
        let Some(service) = &self.service else {
            let message = format!("No executable or service to run '{}'", task.id);
            output.line(OutputStream::Stderr, &message);
            return TaskReport::failed(SYNTHETIC_FAILURE, message);
        };

        match service.run(&task.invocation.endpoint, &task.arguments).await {
            Ok(result) => {
                for line in &result.stdout {
                    output.line(OutputStream::Stdout, line);
                }
                for line in &result.stderr {
                    output.line(OutputStream::Stderr, line);
                }
                TaskReport {
                    exit_code: Some(result.exit_code),
                    stdout: result.stdout,
                    stderr: result.stderr,
                }
            }
            Err(e) => {
                tracing::warn!(task = %task.id, error = %e, "Remote run failed");
                let message = e.to_string();
                output.line(OutputStream::Stderr, &message);
                TaskReport::failed(SYNTHETIC_FAILURE, message)
            }
        }
    }
}

#[async_trait]
impl TaskRunner for DefaultRunner {
    async fn run(&self, task: &TaskRef, output: &OutputSink, stop: StopSignal) -> TaskReport {
        match &task.invocation.executable {
            Some(program) => self.run_process(program, task, output, stop).await,
            None => self.run_remote(task, output).await,
        }
    }
}

/// Output lines of a child pipe, decoded lossily so that bytes that are not
/// valid UTF-8 never end the stream early
struct RawLines<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> RawLines<R> {
    fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            buf: Vec::new(),
        }
    }

    /// Next line without its terminator, `None` at end of stream.
    ///
    /// Partially read bytes stay in `buf` when the future is dropped inside
    /// `select!`, so the next call continues the same line.
    async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        let read = self.reader.read_until(b'\n', &mut self.buf).await?;
        if read == 0 && self.buf.is_empty() {
            return Ok(None);
        }

        let mut end = self.buf.len();
        if self.buf[..end].ends_with(b"\n") {
            end -= 1;
        }
        if self.buf[..end].ends_with(b"\r") {
            end -= 1;
        }
        let line = String::from_utf8_lossy(&self.buf[..end]).into_owned();
        self.buf.clear();
        Ok(Some(line))
    }
}

async fn next_line<R: AsyncRead + Unpin>(lines: &mut Option<RawLines<R>>) -> Option<String> {
    match lines {
        Some(lines) => match lines.next_line().await {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read test output");
                None
            }
        },
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    use crate::common::{Error, Result};
    use crate::model::{Invocation, Task, Tree};
    use crate::service::{Endpoint, RunOutput};

    fn single_task(invocation: Invocation, arguments: &[&str]) -> TaskRef {
        let mut tree = Tree::new();
        let mut test = Task::new("ping", invocation.clone());
        test.arguments = arguments.iter().map(|s| s.to_string()).collect();
        let tool = tree.insert_tool(Task::new("network-diag", invocation), vec![test]);
        let tree = Arc::new(tree);
        let node = tree.child(tool, 0).unwrap();
        tree.task_ref(node).unwrap()
    }

    fn endpoint() -> Endpoint {
        Endpoint::for_object(&Default::default(), "network")
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ExecutorEvent>) -> Vec<(OutputStream, String)> {
        let mut lines = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let ExecutorEvent::Output { stream, line, .. } = event {
                lines.push((stream, line));
            }
        }
        lines
    }

    struct FixedService(Result<RunOutput>);

    #[async_trait]
    impl RemoteService for FixedService {
        async fn list_objects(&self) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
        async fn info(&self, _: &Endpoint) -> Result<String> {
            Ok(String::new())
        }
        async fn list_tests(&self, _: &Endpoint) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
        async fn run(&self, _: &Endpoint, _: &[String]) -> Result<RunOutput> {
            match &self.0 {
                Ok(output) => Ok(output.clone()),
                Err(_) => Err(Error::ServiceUnavailable),
            }
        }
        async fn report(&self, _: &Endpoint) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }
        async fn owner(&self) -> Result<Option<String>> {
            Ok(None)
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_output_is_streamed_and_captured() {
        let task = single_task(
            Invocation::local(endpoint(), PathBuf::from("/bin/sh")),
            &["-c", "echo one; echo two >&2; exit 4"],
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (_flags, flags_rx) = watch::channel(Flags::default());

        let report = DefaultRunner::local_only()
            .run(&task, &OutputSink::new(task.clone(), tx), StopSignal::new(flags_rx))
            .await;

        assert_eq!(report.exit_code, Some(4));
        assert_eq!(report.stdout, vec!["one".to_string()]);
        assert_eq!(report.stderr, vec!["two".to_string()]);

        let lines = drain(&mut rx);
        assert!(lines.contains(&(OutputStream::Stdout, "one".to_string())));
        assert!(lines.contains(&(OutputStream::Stderr, "two".to_string())));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_invalid_utf8_output_keeps_streaming() {
        let task = single_task(
            Invocation::local(endpoint(), PathBuf::from("/bin/sh")),
            &[
                "-c",
                "printf 'bad \\377\\n'; sleep 0.2; i=0; \
                 while [ $i -lt 2000 ]; do echo after-$i; i=$((i+1)); done; exit 0",
            ],
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (_flags, flags_rx) = watch::channel(Flags::default());

        let report = DefaultRunner::local_only()
            .run(&task, &OutputSink::new(task.clone(), tx), StopSignal::new(flags_rx))
            .await;

        assert_eq!(report.exit_code, Some(0));
        assert_eq!(report.stdout.len(), 2001);
        assert_eq!(report.stdout[0], "bad \u{FFFD}");
        assert_eq!(report.stdout[2000], "after-1999");
        assert_eq!(drain(&mut rx).len(), 2001);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_terminates_process() {
        let task = single_task(
            Invocation::local(endpoint(), PathBuf::from("/bin/sh")),
            &["-c", "exec sleep 30"],
        );
        let (tx, _rx) = mpsc::unbounded_channel();
        let (flags, flags_rx) = watch::channel(Flags::default());

        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            flags.send_modify(|f| f.stop = true);
            flags
        });

        let report = tokio::time::timeout(
            Duration::from_secs(10),
            DefaultRunner::local_only().run(
                &task,
                &OutputSink::new(task.clone(), tx),
                StopSignal::new(flags_rx),
            ),
        )
        .await
        .expect("killed process should be reaped");

        assert!(!report.passed());
        drop(stopper.await.unwrap());
    }

    #[tokio::test]
    async fn test_launch_failure_is_task_result() {
        let task = single_task(
            Invocation::local(endpoint(), PathBuf::from("/nonexistent/diag-tool-test")),
            &[],
        );
        let (tx, _rx) = mpsc::unbounded_channel();
        let (_flags, flags_rx) = watch::channel(Flags::default());

        let report = DefaultRunner::local_only()
            .run(&task, &OutputSink::new(task.clone(), tx), StopSignal::new(flags_rx))
            .await;

        assert_eq!(report.exit_code, Some(SYNTHETIC_FAILURE));
        assert!(report.stderr[0].contains("Failed to launch"));
    }

    #[tokio::test]
    async fn test_remote_run_result() {
        let task = single_task(Invocation::remote(endpoint()), &["ping"]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (_flags, flags_rx) = watch::channel(Flags::default());
        let service = Arc::new(FixedService(Ok(RunOutput {
            exit_code: 0,
            stdout: vec!["64 bytes from gateway".into()],
            stderr: Vec::new(),
        })));

        let report = DefaultRunner::new(service)
            .run(&task, &OutputSink::new(task.clone(), tx), StopSignal::new(flags_rx))
            .await;

        assert!(report.passed());
        assert_eq!(
            drain(&mut rx),
            vec![(OutputStream::Stdout, "64 bytes from gateway".to_string())]
        );
    }

    #[tokio::test]
    async fn test_unreachable_service_gives_synthetic_failure() {
        let task = single_task(Invocation::remote(endpoint()), &["ping"]);
        let (tx, _rx) = mpsc::unbounded_channel();
        let (_flags, flags_rx) = watch::channel(Flags::default());
        let service = Arc::new(FixedService(Err(Error::ServiceUnavailable)));

        let report = DefaultRunner::new(service)
            .run(&task, &OutputSink::new(task.clone(), tx), StopSignal::new(flags_rx))
            .await;

        assert_eq!(report.exit_code, Some(SYNTHETIC_FAILURE));
        assert_eq!(report.stderr.len(), 1);
    }
}
