//! Textual front end over the tool views and the executor
//!
//! Runs the executor on the caller's task and prints progress as the
//! lifecycle events arrive. Service availability changes are forwarded to
//! the executor while a run is in progress.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use colored::Colorize;
use tokio::sync::mpsc;

use crate::common::{Error, Result};
use crate::executor::{Executor, ExecutorEvent};
use crate::model::{TaskRef, TaskReport, ToolView};
use crate::service::{RemoteService, ServiceEvent};

/// Next thing the event pump has to deal with
enum Step {
    Executor(Option<ExecutorEvent>),
    Service(ServiceEvent),
}

pub struct CliController {
    views: Vec<ToolView>,
    service: Arc<dyn RemoteService>,
    executor: Executor,
    events: mpsc::UnboundedReceiver<ExecutorEvent>,
    service_events: Option<mpsc::UnboundedReceiver<ServiceEvent>>,
    out: Box<dyn Write + Send>,
    verbose: bool,
}

impl CliController {
    pub fn new(
        views: Vec<ToolView>,
        service: Arc<dyn RemoteService>,
        executor: Executor,
        events: mpsc::UnboundedReceiver<ExecutorEvent>,
    ) -> Self {
        Self {
            views,
            service,
            executor,
            events,
            service_events: None,
            out: Box::new(std::io::stdout()),
            verbose: false,
        }
    }

    /// Forward availability changes of the service to running tests
    pub fn with_service_events(mut self, events: mpsc::UnboundedReceiver<ServiceEvent>) -> Self {
        self.service_events = Some(events);
        self
    }

    pub fn with_output(mut self, out: Box<dyn Write + Send>) -> Self {
        self.out = out;
        self
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    fn tool(&self, id: &str) -> Result<&ToolView> {
        self.views
            .iter()
            .find(|view| view.id() == id)
            .ok_or_else(|| Error::ToolNotFound(id.to_string()))
    }

    pub fn list_objects(&mut self) -> Result<()> {
        for view in &self.views {
            writeln!(self.out, "{}", view.id())?;
        }
        Ok(())
    }

    pub fn list_tests_of_object(&mut self, tool: &str) -> Result<()> {
        let tests = self.tool(tool)?.all_tasks();
        for test in tests {
            writeln!(self.out, "{}", test.id)?;
        }
        Ok(())
    }

    pub async fn run_all_tests_of_object(&mut self, tool: &str) -> Result<()> {
        let tests = self.tool(tool)?.all_tasks();
        if tests.is_empty() {
            return Err(Error::NoTests(tool.to_string()));
        }
        self.execute(tests).await
    }

    pub async fn run_specified_test_of_object(&mut self, tool: &str, test: &str) -> Result<()> {
        let view = self.tool(tool)?;
        if view.all_tasks().is_empty() {
            return Err(Error::NoTests(tool.to_string()));
        }
        let task = view
            .test_task(test)
            .ok_or_else(|| Error::test_not_found(tool, test))?;
        self.execute(vec![task]).await
    }

    /// Fetch the tool's report and write it to `file`
    ///
    /// Nothing is written when the report is empty.
    pub async fn get_tool_report(&mut self, tool: &str, file: &Path) -> Result<()> {
        let report = self.tool(tool)?.report(self.service.as_ref()).await;
        if report.is_empty() {
            return Err(Error::EmptyReport(tool.to_string()));
        }

        std::fs::write(file, &report).map_err(|e| Error::report_write(file, &e))?;
        tracing::info!(tool, file = %file.display(), bytes = report.len(), "Report saved");
        Ok(())
    }

    async fn execute(&mut self, tasks: Vec<TaskRef>) -> Result<()> {
        self.executor.reset_stop_flag();
        self.executor.reset_wait_flag();
        self.executor.set_tasks(tasks)?;

        let executor = self.executor.clone();
        let (run, pumped) = tokio::join!(executor.run_tasks(), self.pump_events());
        run?;
        pumped
    }

    /// Print lifecycle events until the run has finished
    async fn pump_events(&mut self) -> Result<()> {
        loop {
            let step = match self.service_events.as_mut() {
                Some(service_events) => tokio::select! {
                    event = self.events.recv() => Step::Executor(event),
                    Some(event) = service_events.recv() => Step::Service(event),
                },
                None => Step::Executor(self.events.recv().await),
            };

            match step {
                Step::Executor(Some(ExecutorEvent::AllFinished)) => return Ok(()),
                Step::Executor(Some(event)) => self.on_executor_event(event)?,
                Step::Executor(None) => {
                    return Err(Error::Internal("executor event channel closed".into()))
                }
                Step::Service(event) => self.on_service_event(&event)?,
            }
        }
    }

    fn on_executor_event(&mut self, event: ExecutorEvent) -> Result<()> {
        match event {
            ExecutorEvent::BeginTask(task) => {
                write!(self.out, "Running test: {}...", task.id)?;
                self.out.flush()?;
            }
            ExecutorEvent::FinishTask { report, .. } => {
                if report.passed() {
                    writeln!(self.out, "{}", "OK".green())?;
                } else {
                    writeln!(self.out, "{}", "ERROR".red())?;
                }
                if self.verbose {
                    self.print_report(&report)?;
                }
            }
            ExecutorEvent::Output { task, stream, line } => {
                tracing::trace!(task = %task.id, ?stream, %line, "Test output");
            }
            ExecutorEvent::AllBegin | ExecutorEvent::AllFinished => {}
        }
        Ok(())
    }

    fn on_service_event(&mut self, event: &ServiceEvent) -> Result<()> {
        if !self.executor.is_running() {
            return Ok(());
        }

        let notice = match event {
            ServiceEvent::Unregistered => {
                "Management service was unregistered! Please restart the service. Waiting..."
            }
            ServiceEvent::Registered => "Management service was registered! Working...",
            ServiceEvent::OwnerChanged { .. } => {
                "The owner of the management service was changed! Stopping..."
            }
        };
        writeln!(self.out)?;
        writeln!(self.out, "{}", notice.yellow())?;

        self.executor.on_service_event(event);
        Ok(())
    }

    fn print_report(&mut self, report: &TaskReport) -> Result<()> {
        for line in &report.stdout {
            writeln!(self.out, "    {}", line)?;
        }
        for line in &report.stderr {
            writeln!(self.out, "    {}", line.dimmed())?;
        }
        Ok(())
    }
}
