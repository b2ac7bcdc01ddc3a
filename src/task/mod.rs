//! Background task manager
//!
//! Runs arbitrary functions as forked OS processes. Each task moves through
//! `stopped -> running -> ended`; stopping a running task terminates its
//! descendants, then the task itself, and removes it from the table.
//!
//! Task output goes to `<temp_dir>/<name>-<pid>.out`, opened in append mode
//! by the child after the fork.

pub mod process;
pub mod status;

use crate::task_span;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

pub use status::{FileStatusChannel, StatusChannel, TaskState, TaskStatus};

/// Time a task gets to exit after SIGTERM before it is killed
const STOP_GRACE: Duration = Duration::from_millis(500);

const DEFAULT_TASK_NAME: &str = "task";

pub type TaskResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

pub type TaskFunction = Arc<dyn Fn(&TaskArgs) -> TaskResult + Send + Sync>;

/// Positional and keyword arguments handed to a task function.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskArgs {
    pub positional: Vec<Value>,
    pub keyword: BTreeMap<String, Value>,
}

impl TaskArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(mut self, value: Value) -> Self {
        self.positional.push(value);
        self
    }

    pub fn kwarg<S: Into<String>>(mut self, name: S, value: Value) -> Self {
        self.keyword.insert(name.into(), value);
        self
    }
}

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Task not found: {0}")]
    NotFound(String),
    #[error("Task {name} is {state}, not stopped")]
    NotStopped { name: String, state: TaskState },
    #[error("Task {name} is {state}, not running")]
    NotRunning { name: String, state: TaskState },
    #[error("Failed to fork task {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("Task I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Task status unavailable for {name}: {source}")]
    Status {
        name: String,
        #[source]
        source: io::Error,
    },
}

/// One row of the task listing.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSummary {
    pub pid: Option<u32>,
    pub name: String,
    pub state: TaskState,
    pub output: Option<PathBuf>,
}

impl TaskSummary {
    /// `[pid, name, state, output]`
    pub fn to_row(&self) -> Vec<String> {
        vec![
            self.pid.map_or_else(|| "-".to_string(), |pid| pid.to_string()),
            self.name.clone(),
            self.state.to_string(),
            self.output
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_default(),
        ]
    }

    fn matches(&self, pattern: &str) -> bool {
        self.name.contains(pattern)
            || self.pid.is_some_and(|pid| pid.to_string().contains(pattern))
            || self.state.as_str().contains(pattern)
    }
}

pub struct Task {
    name: String,
    function: TaskFunction,
    args: TaskArgs,
    state: TaskState,
    pid: Option<u32>,
    output: Option<PathBuf>,
    status: Box<dyn StatusChannel>,
    reaped: bool,
}

impl Task {
    fn new(name: String, function: TaskFunction, args: TaskArgs, temp_dir: &Path) -> Self {
        let status = Box::new(FileStatusChannel::new(temp_dir, &name));
        Self {
            name,
            function,
            args,
            state: TaskState::Stopped,
            pid: None,
            output: None,
            status,
            reaped: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn output(&self) -> Option<&Path> {
        self.output.as_deref()
    }

    /// Pick up transitions made by the task process and collect it once it exits.
    fn refresh(&mut self) {
        if self.state != TaskState::Running {
            return;
        }
        let Some(pid) = self.pid else {
            return;
        };

        if !self.reaped && process::try_reap(pid) == process::Reap::Exited {
            self.reaped = true;
        }

        let reported = match self.status.get() {
            Ok(status) => status.state,
            Err(e) => {
                warn!(task = %self.name, "Failed to read task status: {}", e);
                self.state
            }
        };

        // A process that died without reporting (killed externally) has still ended
        if reported == TaskState::Ended || self.reaped {
            self.state = TaskState::Ended;
        }
    }

    fn summary(&self) -> TaskSummary {
        TaskSummary {
            pid: self.pid,
            name: self.name.clone(),
            state: self.state,
            output: self.output.clone(),
        }
    }

    /// Body of the forked process.
    ///
    /// Only this thread survives the fork, so nothing here logs through
    /// `tracing`: a subscriber lock held by another parent thread would never
    /// be released. Failures go straight to the output file instead.
    fn run_child(&self, temp_dir: &Path) {
        process::reset_signals();
        let pid = std::process::id();

        let output = output_path(temp_dir, &self.name, pid);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&output)
            .ok();
        if let Some(file) = &file {
            let _ = process::redirect_stdout(file);
        }

        let _ = self.status.set(&TaskStatus::new(TaskState::Running, Some(pid)));

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| (self.function)(&self.args)));
        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some("task panicked".to_string()),
        };
        if let Some(message) = failure {
            // keep the error after whatever the task already printed
            let _ = io::stdout().flush();
            let line = format!("Error in task {}: {}\n", self.name, message);
            let _ = match file.as_ref() {
                Some(mut file) => file.write_all(line.as_bytes()),
                None => io::stdout().write_all(line.as_bytes()),
            };
        }

        let _ = self.status.set(&TaskStatus::new(TaskState::Ended, Some(pid)));
    }

    /// Collect an ended process and drop its status record.
    fn cleanup(&mut self) {
        if let Some(pid) = self.pid {
            if !self.reaped {
                self.reaped = process::try_reap(pid) == process::Reap::Exited;
            }
        }
        if let Err(e) = self.status.close() {
            debug!(task = %self.name, "Failed to remove status record: {}", e);
        }
    }
}

/// `<temp_dir>/<name>-<pid>.out`
pub fn output_path(temp_dir: &Path, name: &str, pid: u32) -> PathBuf {
    temp_dir.join(format!("{name}-{pid}.out"))
}

pub struct TaskManager {
    temp_dir: PathBuf,
    tasks: BTreeMap<String, Task>,
}

impl TaskManager {
    pub fn new<P: Into<PathBuf>>(temp_dir: P) -> Self {
        Self {
            temp_dir: temp_dir.into(),
            tasks: BTreeMap::new(),
        }
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Register a stopped task and return its unique name.
    ///
    /// A taken name gets `.1`, `.2`, ... appended; an empty name becomes `task`.
    pub fn add_task<F>(&mut self, name: &str, function: F, args: TaskArgs) -> String
    where
        F: Fn(&TaskArgs) -> TaskResult + Send + Sync + 'static,
    {
        let base = if name.is_empty() {
            DEFAULT_TASK_NAME
        } else {
            name
        };
        let mut unique = base.to_string();
        let mut counter = 1;
        while self.tasks.contains_key(&unique) {
            unique = format!("{base}.{counter}");
            counter += 1;
        }

        let task = Task::new(unique.clone(), Arc::new(function), args, &self.temp_dir);
        self.tasks.insert(unique.clone(), task);
        debug!(task = %unique, "Task added");
        unique
    }

    /// Fork the task's process; returns its pid.
    pub fn try_start_task(&mut self, name: &str) -> Result<u32, TaskError> {
        let temp_dir = self.temp_dir.clone();
        let task = self
            .tasks
            .get_mut(name)
            .ok_or_else(|| TaskError::NotFound(name.to_string()))?;
        task.refresh();
        if task.state != TaskState::Stopped {
            return Err(TaskError::NotStopped {
                name: name.to_string(),
                state: task.state,
            });
        }

        let span = task_span!(task = %name);
        let _enter = span.enter();

        std::fs::create_dir_all(&temp_dir)?;
        task.status
            .set(&TaskStatus::new(TaskState::Running, None))
            .map_err(|source| TaskError::Status {
                name: name.to_string(),
                source,
            })?;

        let forked = process::spawn_forked(|| task.run_child(&temp_dir));
        let pid = match forked {
            Ok(pid) => pid,
            Err(source) => {
                let _ = task.status.close();
                return Err(TaskError::Spawn {
                    name: name.to_string(),
                    source,
                });
            }
        };

        task.pid = Some(pid);
        task.state = TaskState::Running;
        task.output = Some(output_path(&temp_dir, name, pid));
        info!(pid, "Task started");
        Ok(pid)
    }

    pub fn start_task(&mut self, name: &str) -> bool {
        match self.try_start_task(name) {
            Ok(_) => true,
            Err(e) => {
                debug!("Task not started: {}", e);
                false
            }
        }
    }

    /// Terminate a running task and its descendants and forget it.
    pub fn try_stop_task(&mut self, name: &str) -> Result<(), TaskError> {
        let task = self
            .tasks
            .get_mut(name)
            .ok_or_else(|| TaskError::NotFound(name.to_string()))?;
        task.refresh();
        let pid = match (task.state, task.pid) {
            (TaskState::Running, Some(pid)) => pid,
            (state, _) => {
                return Err(TaskError::NotRunning {
                    name: name.to_string(),
                    state,
                })
            }
        };

        for child in process::descendants(pid) {
            debug!(task = %name, child, "Terminating task child");
            process::send_signal(child, libc::SIGTERM);
        }
        process::terminate(pid, STOP_GRACE);

        if let Some(mut task) = self.tasks.remove(name) {
            task.reaped = true;
            task.cleanup();
        }
        info!(task = %name, pid, "Task stopped");
        Ok(())
    }

    pub fn stop_task(&mut self, name: &str) -> bool {
        match self.try_stop_task(name) {
            Ok(()) => true,
            Err(e) => {
                debug!("Task not stopped: {}", e);
                false
            }
        }
    }

    /// Stop (if running), rebuild from the same function and arguments, and start.
    pub fn try_restart_task(&mut self, name: &str) -> Result<u32, TaskError> {
        let (function, args) = {
            let task = self
                .tasks
                .get_mut(name)
                .ok_or_else(|| TaskError::NotFound(name.to_string()))?;
            task.refresh();
            (task.function.clone(), task.args.clone())
        };

        if self.try_stop_task(name).is_err() {
            if let Some(mut task) = self.tasks.remove(name) {
                task.cleanup();
            }
        }

        let task = Task::new(name.to_string(), function, args, &self.temp_dir);
        self.tasks.insert(name.to_string(), task);
        self.try_start_task(name)
    }

    /// Returns `false` for an unknown name, creating nothing.
    pub fn restart_task(&mut self, name: &str) -> bool {
        match self.try_restart_task(name) {
            Ok(_) => true,
            Err(e) => {
                debug!("Task not restarted: {}", e);
                false
            }
        }
    }

    /// Stop every running task and drop the rest.
    pub fn stop_all(&mut self) {
        let names: Vec<String> = self.tasks.keys().cloned().collect();
        for name in names {
            if self.task_state(&name) == Some(TaskState::Running) {
                self.stop_task(&name);
            } else if let Some(mut task) = self.tasks.remove(&name) {
                task.cleanup();
            }
        }
    }

    pub fn task_pid(&self, name: &str) -> Option<u32> {
        self.tasks.get(name).and_then(Task::pid)
    }

    pub fn task_state(&mut self, name: &str) -> Option<TaskState> {
        let task = self.tasks.get_mut(name)?;
        task.refresh();
        Some(task.state)
    }

    pub fn task(&self, name: &str) -> Option<&Task> {
        self.tasks.get(name)
    }

    /// Tasks whose name, pid or state contains `pattern`
    pub fn list(&mut self, pattern: &str) -> Vec<TaskSummary> {
        self.tasks
            .values_mut()
            .map(|task| {
                task.refresh();
                task.summary()
            })
            .filter(|summary| summary.matches(pattern))
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.tasks.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl Drop for TaskManager {
    fn drop(&mut self) {
        self.stop_all();
    }
}
