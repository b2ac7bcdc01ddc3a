//! Task status channel
//!
//! A forked task shares no memory with the orchestrator, so lifecycle state
//! travels through a small JSON record on disk. The orchestrator writes
//! `running` before forking; the task process writes `running` again with its
//! own pid, then `ended` when its function returns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static CHANNEL_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Stopped,
    Running,
    Ended,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Stopped => "stopped",
            TaskState::Running => "running",
            TaskState::Ended => "ended",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub state: TaskState,
    pub pid: Option<u32>,
    pub updated_at: DateTime<Utc>,
}

impl TaskStatus {
    pub fn new(state: TaskState, pid: Option<u32>) -> Self {
        Self {
            state,
            pid,
            updated_at: Utc::now(),
        }
    }
}

/// Get/set access to one task's status, readable across processes.
pub trait StatusChannel: Send {
    fn get(&self) -> io::Result<TaskStatus>;

    fn set(&self, status: &TaskStatus) -> io::Result<()>;

    /// Release whatever backs the channel
    fn close(&self) -> io::Result<()>;
}

/// Status record stored at `<dir>/<name>.<ppid>-<seq>.status`
#[derive(Debug, Clone)]
pub struct FileStatusChannel {
    path: PathBuf,
}

impl FileStatusChannel {
    pub fn new(dir: &Path, name: &str) -> Self {
        let seq = CHANNEL_SEQ.fetch_add(1, Ordering::Relaxed);
        let token = format!("{}-{}", std::process::id(), seq);
        Self {
            path: dir.join(format!("{name}.{token}.status")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StatusChannel for FileStatusChannel {
    fn get(&self) -> io::Result<TaskStatus> {
        let content = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write to a sibling file then rename, so readers never see a torn record.
    fn set(&self, status: &TaskStatus) -> io::Result<()> {
        let tmp = self.path.with_extension("status.tmp");
        std::fs::write(&tmp, serde_json::to_vec(status)?)?;
        std::fs::rename(&tmp, &self.path)
    }

    fn close(&self) -> io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}
