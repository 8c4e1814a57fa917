//! Append-only audit trail in `.mission/audit.jsonl`.
//!
//! Writing is best-effort: a failure is logged and never reaches the caller.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::MissionResult;
use crate::{fsutil, timestamp};

/// Kinds of recorded events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    ProjectInitialized,
    ProjectMigrated,
    TaskCreated,
    TaskUpdated,
    TaskCompleted,
    GateSatisfied,
    GateApproved,
    StageAdvanced,
    StageSet,
    CheckpointCreated,
    SessionStarted,
    SessionEnded,
    HandoffReceived,
}

impl AuditAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ProjectInitialized => "project_initialized",
            Self::ProjectMigrated => "project_migrated",
            Self::TaskCreated => "task_created",
            Self::TaskUpdated => "task_updated",
            Self::TaskCompleted => "task_completed",
            Self::GateSatisfied => "gate_satisfied",
            Self::GateApproved => "gate_approved",
            Self::StageAdvanced => "stage_advanced",
            Self::StageSet => "stage_set",
            Self::CheckpointCreated => "checkpoint_created",
            Self::SessionStarted => "session_started",
            Self::SessionEnded => "session_ended",
            Self::HandoffReceived => "handoff_received",
        }
    }
}

/// One line of the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    #[serde(with = "timestamp::rfc3339")]
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub actor: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub details: Map<String, Value>,
}

/// Writer and reader for the audit trail.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
    actor: String,
}

impl AuditLog {
    pub fn new(path: impl AsRef<Path>, actor: impl Into<String>) -> Self {
        Self { path: path.as_ref().to_path_buf(), actor: actor.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record an event. `details` should be a JSON object; anything else is
    /// stored under a `value` key.
    pub fn record(&self, action: AuditAction, details: Value) {
        let details = match details {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        let entry = AuditEntry {
            timestamp: timestamp::now(),
            action: action.as_str().to_string(),
            actor: self.actor.clone(),
            details,
        };
        if let Err(e) = fsutil::append_json_line(&self.path, &entry) {
            tracing::warn!(action = action.as_str(), error = %e, "Failed to write audit log");
        }
    }

    /// All readable entries, oldest first.
    pub fn entries(&self) -> MissionResult<Vec<AuditEntry>> {
        fsutil::read_json_lines(&self.path, false)
    }

    /// The last `n` entries, oldest first.
    pub fn tail(&self, n: usize) -> MissionResult<Vec<AuditEntry>> {
        let mut entries = self.entries()?;
        let skip = entries.len().saturating_sub(n);
        entries.drain(..skip);
        Ok(entries)
    }
}
