//! Tasks: the units of work tracked by a mission.

pub mod graph;
pub mod store;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MissionError;
use crate::stage::Stage;
use crate::timestamp;

pub use store::TaskStore;

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    /// Finished. Older missions wrote this as `complete`.
    #[serde(alias = "complete")]
    Done,
    Blocked,
}

/// The status that counts as finished for readiness, advancement rules,
/// strict checks and summaries.
pub const TERMINAL_STATUS: TaskStatus = TaskStatus::Done;

impl TaskStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::Blocked => "blocked",
        }
    }

    /// Whether this is [`TERMINAL_STATUS`].
    pub fn is_terminal(self) -> bool {
        self == TERMINAL_STATUS
    }

    /// Glyph used in dependency trees.
    pub const fn icon(self) -> &'static str {
        match self {
            Self::Pending => "○",
            Self::InProgress => "◐",
            Self::Done => "●",
            Self::Blocked => "✕",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = MissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "done" | "complete" => Ok(Self::Done),
            "blocked" => Ok(Self::Blocked),
            _ => Err(MissionError::InvalidStatus(s.to_string())),
        }
    }
}

/// A unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Content-derived id, see [`crate::ids::task_id`]
    pub id: String,

    pub name: String,

    /// Stage the task belongs to
    pub stage: Stage,

    /// Area of the codebase the task touches
    #[serde(default)]
    pub zone: String,

    /// Role expected to carry the task out (developer, reviewer, ...)
    #[serde(default)]
    pub persona: String,

    pub status: TaskStatus,

    /// Ids of tasks that must be done first. May be cyclic.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    /// Path patterns the task may commit to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scope_paths: Vec<String>,

    /// Worker process currently assigned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,

    #[serde(with = "timestamp::rfc3339")]
    pub created_at: DateTime<Utc>,

    #[serde(with = "timestamp::rfc3339")]
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// A new pending task with its id derived from its content.
    pub fn new(name: impl Into<String>, stage: Stage, zone: impl Into<String>, persona: impl Into<String>) -> Self {
        let name = name.into();
        let zone = zone.into();
        let persona = persona.into();
        let now = timestamp::now();
        Self {
            id: crate::ids::task_id(&name, stage.as_str(), &zone, &persona),
            name,
            stage,
            zone,
            persona,
            status: TaskStatus::Pending,
            depends_on: Vec::new(),
            scope_paths: Vec::new(),
            worker_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Add dependencies.
    #[must_use]
    pub fn with_depends_on(mut self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.depends_on.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Add scope path patterns.
    #[must_use]
    pub fn with_scope_paths(mut self, paths: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.scope_paths.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Change status and bump `updated_at`.
    pub fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
        self.updated_at = timestamp::now();
    }

    pub fn is_done(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Per-stage task counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub total: usize,
    pub done: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub blocked: usize,
}

impl TaskSummary {
    /// Count tasks by status.
    pub fn of<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Self {
        let mut summary = Self::default();
        for task in tasks {
            summary.total += 1;
            match task.status {
                TaskStatus::Done => summary.done += 1,
                TaskStatus::Pending => summary.pending += 1,
                TaskStatus::InProgress => summary.in_progress += 1,
                TaskStatus::Blocked => summary.blocked += 1,
            }
        }
        summary
    }
}

/// Tasks belonging to `stage`, in collection order.
pub fn in_stage(tasks: &[Task], stage: Stage) -> Vec<&Task> {
    tasks.iter().filter(|t| t.stage == stage).collect()
}
