//! Sequential task executor
//!
//! Runs an ordered list of tasks one after another and reports lifecycle
//! events on a single ordered channel. Two flags steer the loop from other
//! contexts: `stop` ends the run before the next task, `wait` holds the loop
//! before the next task until it is cleared or `stop` is set. Both are only
//! observed between tasks; a running subprocess is asked to terminate when
//! `stop` is set.

pub mod runner;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::common::{Error, Result};
use crate::model::{TaskRef, TaskReport};
use crate::service::ServiceEvent;

pub use runner::{DefaultRunner, OutputSink, StopSignal, TaskRunner};

/// Executor lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutorState {
    #[default]
    Idle,
    Running,
    /// Held between tasks until the wait flag is cleared
    Waiting,
    /// Stop requested; the current task is being finished or terminated
    Cancelling,
    Finished,
}

impl ExecutorState {
    /// Whether a run is in progress
    pub fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::Waiting | Self::Cancelling)
    }
}

impl fmt::Display for ExecutorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Waiting => write!(f, "waiting"),
            Self::Cancelling => write!(f, "cancelling"),
            Self::Finished => write!(f, "finished"),
        }
    }
}

/// Control flags shared between the controller and the task loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
    pub stop: bool,
    pub wait: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Lifecycle events, delivered in order to the single consumer
#[derive(Debug, Clone)]
pub enum ExecutorEvent {
    AllBegin,
    BeginTask(TaskRef),
    Output {
        task: TaskRef,
        stream: OutputStream,
        line: String,
    },
    FinishTask {
        task: TaskRef,
        report: TaskReport,
    },
    AllFinished,
}

struct Shared {
    flags: watch::Sender<Flags>,
    state: watch::Sender<ExecutorState>,
    tasks: Mutex<Vec<TaskRef>>,
    events: mpsc::UnboundedSender<ExecutorEvent>,
    runner: Arc<dyn TaskRunner>,
}

/// Handle to the executor; clones share the same loop and flags
#[derive(Clone)]
pub struct Executor {
    shared: Arc<Shared>,
}

impl Executor {
    /// Create an executor and the receiving end of its event channel
    pub fn new(runner: Arc<dyn TaskRunner>) -> (Self, mpsc::UnboundedReceiver<ExecutorEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let executor = Self {
            shared: Arc::new(Shared {
                flags: watch::Sender::new(Flags::default()),
                state: watch::Sender::new(ExecutorState::Idle),
                tasks: Mutex::new(Vec::new()),
                events,
                runner,
            }),
        };
        (executor, rx)
    }

    /// Replace the queue of the next run
    pub fn set_tasks(&self, tasks: Vec<TaskRef>) -> Result<()> {
        let mut queue = self.lock_tasks();
        if self.is_running() {
            return Err(Error::ExecutorBusy);
        }
        *queue = tasks;
        Ok(())
    }

    pub fn tasks(&self) -> Vec<TaskRef> {
        self.lock_tasks().clone()
    }

    pub fn reset_stop_flag(&self) {
        self.shared.flags.send_modify(|flags| flags.stop = false);
    }

    /// Clear the wait flag; a waiting loop resumes with the next task
    pub fn reset_wait_flag(&self) {
        self.shared.flags.send_modify(|flags| flags.wait = false);
    }

    /// Hold the loop before the next task
    pub fn pause(&self) {
        self.shared.flags.send_modify(|flags| flags.wait = true);
    }

    /// Stop after the current task and ask a running subprocess to terminate
    pub fn cancel_tasks(&self) {
        self.shared.flags.send_modify(|flags| flags.stop = true);
        self.shared.state.send_if_modified(|state| {
            if state.is_active() {
                *state = ExecutorState::Cancelling;
                true
            } else {
                false
            }
        });
    }

    pub fn flags(&self) -> Flags {
        *self.shared.flags.borrow()
    }

    pub fn state(&self) -> ExecutorState {
        *self.shared.state.borrow()
    }

    /// True between the all-begin and all-finished events
    pub fn is_running(&self) -> bool {
        self.state().is_active()
    }

    /// Wait until the current run has finished
    ///
    /// Must not be awaited from code the loop itself is waiting on.
    pub async fn wait(&self) {
        let mut state = self.shared.state.subscribe();
        // The sender lives as long as `self`
        let _ = state.wait_for(|state| !state.is_active()).await;
    }

    /// Run the queued tasks on the caller's context
    pub async fn run_tasks(&self) -> Result<()> {
        let mut started = false;
        self.shared.state.send_if_modified(|state| {
            if state.is_active() {
                false
            } else {
                *state = ExecutorState::Running;
                started = true;
                true
            }
        });
        if !started {
            return Err(Error::ExecutorBusy);
        }

        let tasks = self.tasks();
        tracing::debug!(count = tasks.len(), "Starting task run");
        self.emit(ExecutorEvent::AllBegin);

        let mut flags = self.shared.flags.subscribe();
        for task in tasks {
            if !self.checkpoint(&mut flags).await {
                tracing::info!(next = %task.id, "Task run stopped");
                break;
            }

            task.clear_reports();
            self.emit(ExecutorEvent::BeginTask(task.clone()));

            let output = OutputSink::new(task.clone(), self.shared.events.clone());
            let stop = StopSignal::new(self.shared.flags.subscribe());
            let report = self.shared.runner.run(&task, &output, stop).await;
            tracing::debug!(task = %task.id, exit_code = ?report.exit_code, "Task finished");

            task.set_report(report.clone());
            self.emit(ExecutorEvent::FinishTask { task, report });
        }

        self.shared.state.send_replace(ExecutorState::Finished);
        self.emit(ExecutorEvent::AllFinished);
        Ok(())
    }

    /// Run the queued tasks on a worker task
    pub fn start(&self) -> JoinHandle<Result<()>> {
        let executor = self.clone();
        tokio::spawn(async move { executor.run_tasks().await })
    }

    /// Apply a service availability change to a running loop
    pub fn on_service_event(&self, event: &ServiceEvent) {
        if !self.is_running() {
            return;
        }

        match event {
            ServiceEvent::Unregistered => {
                tracing::warn!("Management service went away, holding task run");
                self.pause();
            }
            ServiceEvent::Registered => {
                tracing::info!("Management service is back, resuming task run");
                self.reset_wait_flag();
            }
            ServiceEvent::OwnerChanged { old, new } => {
                tracing::warn!(%old, %new, "Management service was replaced, cancelling task run");
                self.cancel_tasks();
                self.reset_wait_flag();
            }
        }
    }

    /// Returns false when the run must end before the next task
    async fn checkpoint(&self, flags: &mut watch::Receiver<Flags>) -> bool {
        let current = *flags.borrow_and_update();
        if current.stop {
            return false;
        }
        if !current.wait {
            return true;
        }

        self.shift_state(ExecutorState::Running, ExecutorState::Waiting);
        tracing::info!("Task run waiting");

        let resume = match flags.wait_for(|flags| flags.stop || !flags.wait).await {
            Ok(flags) => !flags.stop,
            Err(_) => false,
        };

        if resume {
            self.shift_state(ExecutorState::Waiting, ExecutorState::Running);
            tracing::info!("Task run resumed");
        }
        resume
    }

    fn shift_state(&self, from: ExecutorState, to: ExecutorState) {
        self.shared.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        });
    }

    fn emit(&self, event: ExecutorEvent) {
        if self.shared.events.send(event).is_err() {
            tracing::trace!("Executor event dropped, consumer gone");
        }
    }

    fn lock_tasks(&self) -> MutexGuard<'_, Vec<TaskRef>> {
        self.shared
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use crate::model::{Invocation, Task, ToolView, Tree};
    use crate::service::Endpoint;

    #[derive(Clone)]
    enum Behavior {
        Pass,
        Gate(Arc<Notify>),
        UntilStopped,
    }

    #[derive(Default)]
    struct ScriptedRunner {
        behaviors: HashMap<String, Behavior>,
        runs: Mutex<Vec<String>>,
    }

    impl ScriptedRunner {
        fn with(mut self, id: &str, behavior: Behavior) -> Self {
            self.behaviors.insert(id.to_string(), behavior);
            self
        }

        fn runs(&self) -> Vec<String> {
            self.runs.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TaskRunner for ScriptedRunner {
        async fn run(&self, task: &TaskRef, output: &OutputSink, mut stop: StopSignal) -> TaskReport {
            self.runs.lock().unwrap().push(task.id.clone());
            output.line(OutputStream::Stdout, &format!("running {}", task.id));

            let behavior = self.behaviors.get(&task.id).cloned().unwrap_or(Behavior::Pass);
            match behavior {
                Behavior::Pass => {}
                Behavior::Gate(gate) => gate.notified().await,
                Behavior::UntilStopped => {
                    stop.stopped().await;
                    return TaskReport::failed(-1, "terminated".into());
                }
            }

            TaskReport {
                exit_code: Some(0),
                stdout: vec![format!("running {}", task.id)],
                stderr: Vec::new(),
            }
        }
    }

    fn tasks() -> Vec<TaskRef> {
        let invocation = Invocation::remote(Endpoint::for_object(&Default::default(), "network"));
        let mut tree = Tree::new();
        let node = tree.insert_tool(
            Task::new("network-diag", invocation.clone()),
            ["t1", "t2", "t3"]
                .iter()
                .map(|id| Task::new(id, invocation.clone()))
                .collect(),
        );
        ToolView::new(&Arc::new(tree), node).unwrap().all_tasks()
    }

    /// Compact trace of the lifecycle events, output lines left out
    fn trace(event: &ExecutorEvent) -> Option<String> {
        match event {
            ExecutorEvent::AllBegin => Some("all-begin".into()),
            ExecutorEvent::BeginTask(task) => Some(format!("begin({})", task.id)),
            ExecutorEvent::FinishTask { task, .. } => Some(format!("finish({})", task.id)),
            ExecutorEvent::AllFinished => Some("all-finished".into()),
            ExecutorEvent::Output { .. } => None,
        }
    }

    async fn next_trace(rx: &mut mpsc::UnboundedReceiver<ExecutorEvent>) -> String {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("event should arrive")
                .expect("channel open");
            if let Some(trace) = trace(&event) {
                return trace;
            }
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ExecutorEvent>) -> Vec<String> {
        let mut traces = Vec::new();
        while let Ok(event) = rx.try_recv() {
            traces.extend(trace(&event));
        }
        traces
    }

    #[tokio::test]
    async fn test_events_are_ordered() {
        let (executor, mut rx) = Executor::new(Arc::new(ScriptedRunner::default()));
        executor.set_tasks(tasks()).unwrap();

        executor.run_tasks().await.unwrap();

        assert_eq!(
            drain(&mut rx),
            vec![
                "all-begin",
                "begin(t1)",
                "finish(t1)",
                "begin(t2)",
                "finish(t2)",
                "begin(t3)",
                "finish(t3)",
                "all-finished",
            ]
        );
        assert_eq!(executor.state(), ExecutorState::Finished);
        assert!(!executor.is_running());
    }

    #[tokio::test]
    async fn test_output_is_delivered_between_begin_and_finish() {
        let (executor, mut rx) = Executor::new(Arc::new(ScriptedRunner::default()));
        executor.set_tasks(tasks().into_iter().take(1).collect()).unwrap();
        executor.run_tasks().await.unwrap();

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(match event {
                ExecutorEvent::Output { line, .. } => line,
                other => trace(&other).unwrap(),
            });
        }
        assert_eq!(
            kinds,
            vec!["all-begin", "begin(t1)", "running t1", "finish(t1)", "all-finished"]
        );
    }

    #[tokio::test]
    async fn test_reports_are_stored_on_tasks() {
        let (executor, _rx) = Executor::new(Arc::new(ScriptedRunner::default()));
        let queue = tasks();
        executor.set_tasks(queue.clone()).unwrap();
        executor.run_tasks().await.unwrap();

        for task in &queue {
            assert!(task.report().passed());
        }
    }

    #[tokio::test]
    async fn test_cancel_during_second_task() {
        let runner = Arc::new(ScriptedRunner::default().with("t2", Behavior::UntilStopped));
        let (executor, mut rx) = Executor::new(runner.clone());
        executor.set_tasks(tasks()).unwrap();

        let handle = executor.start();
        assert_eq!(next_trace(&mut rx).await, "all-begin");
        assert_eq!(next_trace(&mut rx).await, "begin(t1)");
        assert_eq!(next_trace(&mut rx).await, "finish(t1)");
        assert_eq!(next_trace(&mut rx).await, "begin(t2)");
        assert!(executor.is_running());

        executor.cancel_tasks();
        handle.await.unwrap().unwrap();

        assert_eq!(drain(&mut rx), vec!["finish(t2)", "all-finished"]);
        assert_eq!(runner.runs(), vec!["t1", "t2"]);
        assert!(!executor.is_running());
    }

    #[tokio::test]
    async fn test_pause_holds_next_task_until_resumed() {
        let gate = Arc::new(Notify::new());
        let runner = Arc::new(ScriptedRunner::default().with("t1", Behavior::Gate(gate.clone())));
        let (executor, mut rx) = Executor::new(runner.clone());
        executor.set_tasks(tasks()).unwrap();

        let handle = executor.start();
        assert_eq!(next_trace(&mut rx).await, "all-begin");
        assert_eq!(next_trace(&mut rx).await, "begin(t1)");

        executor.pause();
        gate.notify_one();
        assert_eq!(next_trace(&mut rx).await, "finish(t1)");

        let mut state = executor.shared.state.subscribe();
        tokio::time::timeout(
            Duration::from_secs(5),
            state.wait_for(|s| *s == ExecutorState::Waiting),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(executor.is_running());
        assert!(drain(&mut rx).is_empty());

        executor.reset_wait_flag();
        handle.await.unwrap().unwrap();

        assert_eq!(
            drain(&mut rx),
            vec!["begin(t2)", "finish(t2)", "begin(t3)", "finish(t3)", "all-finished"]
        );
        assert_eq!(runner.runs(), vec!["t1", "t2", "t3"]);
    }

    #[tokio::test]
    async fn test_stop_while_waiting_ends_run() {
        let gate = Arc::new(Notify::new());
        let runner = Arc::new(ScriptedRunner::default().with("t1", Behavior::Gate(gate.clone())));
        let (executor, mut rx) = Executor::new(runner);
        executor.set_tasks(tasks()).unwrap();

        let handle = executor.start();
        assert_eq!(next_trace(&mut rx).await, "all-begin");
        assert_eq!(next_trace(&mut rx).await, "begin(t1)");

        executor.pause();
        gate.notify_one();
        assert_eq!(next_trace(&mut rx).await, "finish(t1)");

        executor.cancel_tasks();
        executor.wait().await;
        handle.await.unwrap().unwrap();

        assert_eq!(drain(&mut rx), vec!["all-finished"]);
    }

    #[tokio::test]
    async fn test_outage_protocol() {
        let gate = Arc::new(Notify::new());
        let runner = Arc::new(ScriptedRunner::default().with("t1", Behavior::Gate(gate.clone())));
        let (executor, mut rx) = Executor::new(runner);

        // Ignored while idle
        executor.on_service_event(&ServiceEvent::Unregistered);
        assert_eq!(executor.flags(), Flags::default());

        executor.set_tasks(tasks()).unwrap();
        let handle = executor.start();
        assert_eq!(next_trace(&mut rx).await, "all-begin");
        assert_eq!(next_trace(&mut rx).await, "begin(t1)");

        executor.on_service_event(&ServiceEvent::Unregistered);
        assert!(executor.flags().wait);
        executor.on_service_event(&ServiceEvent::Registered);
        assert!(!executor.flags().wait);

        executor.on_service_event(&ServiceEvent::Unregistered);
        executor.on_service_event(&ServiceEvent::OwnerChanged {
            old: "one".into(),
            new: "two".into(),
        });
        assert_eq!(executor.flags(), Flags { stop: true, wait: false });
        assert_eq!(executor.state(), ExecutorState::Cancelling);

        gate.notify_one();
        handle.await.unwrap().unwrap();
        assert_eq!(drain(&mut rx), vec!["finish(t1)", "all-finished"]);
    }

    #[tokio::test]
    async fn test_set_tasks_refused_while_running() {
        let runner = Arc::new(ScriptedRunner::default().with("t1", Behavior::UntilStopped));
        let (executor, mut rx) = Executor::new(runner);
        executor.set_tasks(tasks()).unwrap();

        let handle = executor.start();
        assert_eq!(next_trace(&mut rx).await, "all-begin");

        assert!(matches!(executor.set_tasks(Vec::new()), Err(Error::ExecutorBusy)));
        assert!(matches!(executor.run_tasks().await, Err(Error::ExecutorBusy)));

        executor.cancel_tasks();
        handle.await.unwrap().unwrap();
        executor.set_tasks(Vec::new()).unwrap();
    }

    #[tokio::test]
    async fn test_stop_flag_persists_until_reset() {
        let runner = Arc::new(ScriptedRunner::default());
        let (executor, mut rx) = Executor::new(runner.clone());
        executor.set_tasks(tasks()).unwrap();

        executor.cancel_tasks();
        executor.run_tasks().await.unwrap();
        assert_eq!(drain(&mut rx), vec!["all-begin", "all-finished"]);
        assert!(runner.runs().is_empty());

        executor.reset_stop_flag();
        executor.reset_wait_flag();
        executor.run_tasks().await.unwrap();
        assert_eq!(runner.runs(), vec!["t1", "t2", "t3"]);
    }
}
