//! Session bookkeeping in `orchestrator/sessions.jsonl`.
//!
//! The log is append-only. A session is opened by a record with `started_at`
//! and closed by a later record for the same id with `ended_at`.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::SessionConfig;
use crate::error::MissionResult;
use crate::stage::Stage;
use crate::{fsutil, timestamp};

/// Reason recorded when a session is closed by a restart.
pub const RESTART_REASON: &str = "restart";

/// One line of the session log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,

    #[serde(default, with = "timestamp::rfc3339_opt", skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, with = "timestamp::rfc3339_opt", skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,

    /// Checkpoint active at this boundary
    pub checkpoint_id: String,

    pub stage: Stage,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl SessionRecord {
    /// Record opening `session_id`.
    pub fn opened(session_id: &str, checkpoint_id: &str, stage: Stage, at: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.to_string(),
            started_at: Some(at),
            ended_at: None,
            checkpoint_id: checkpoint_id.to_string(),
            stage,
            reason: None,
        }
    }

    /// Record closing `session_id`.
    pub fn closed(
        session_id: &str,
        checkpoint_id: &str,
        stage: Stage,
        at: DateTime<Utc>,
        reason: &str,
    ) -> Self {
        Self {
            session_id: session_id.to_string(),
            started_at: None,
            ended_at: Some(at),
            checkpoint_id: checkpoint_id.to_string(),
            stage,
            reason: Some(reason.to_string()),
        }
    }

    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }
}

/// Append-only log of session boundaries.
#[derive(Debug, Clone)]
pub struct SessionLog {
    path: PathBuf,
}

impl SessionLog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }

    pub fn append(&self, record: &SessionRecord) -> MissionResult<()> {
        fsutil::append_json_line(&self.path, record)
    }

    /// Every readable record, oldest first.
    pub fn history(&self) -> MissionResult<Vec<SessionRecord>> {
        fsutil::read_json_lines(&self.path, false)
    }

    /// The session currently open, if any.
    pub fn open_session(&self) -> MissionResult<Option<SessionRecord>> {
        Ok(open_session(&self.history()?).cloned())
    }
}

/// Most recent record without `ended_at` whose session was not closed later.
pub fn open_session(records: &[SessionRecord]) -> Option<&SessionRecord> {
    let mut closed: HashSet<&str> = HashSet::new();
    for record in records.iter().rev() {
        if record.is_open() {
            if !closed.contains(record.session_id.as_str()) {
                return Some(record);
            }
        } else {
            closed.insert(&record.session_id);
        }
    }
    None
}

/// Advisory session health band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    Green,
    Yellow,
    Red,
}

impl Health {
    /// Band for a session that has run for `minutes`.
    pub fn classify(minutes: i64, thresholds: &SessionConfig) -> Self {
        let minutes = u64::try_from(minutes).unwrap_or(0);
        if minutes > thresholds.red_after_minutes {
            Self::Red
        } else if minutes > thresholds.yellow_after_minutes {
            Self::Yellow
        } else {
            Self::Green
        }
    }

    pub const fn recommendation(self) -> &'static str {
        match self {
            Self::Green => "Session is healthy",
            Self::Yellow => "Session approaching limit. Consider checkpointing soon.",
            Self::Red => "Session is long. Consider running 'mc checkpoint restart' to preserve context.",
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Green => "green",
            Self::Yellow => "yellow",
            Self::Red => "red",
        }
    }
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the running session, for display only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub stage: Stage,
    #[serde(with = "timestamp::rfc3339")]
    pub session_start: DateTime<Utc>,
    pub duration_minutes: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_checkpoint: Option<String>,
    pub tasks_total: usize,
    pub tasks_done: usize,
    pub health: Health,
    pub recommendation: String,
}

impl SessionStatus {
    /// Measure the session that started at `started` (or `now` if none is
    /// open) against the configured thresholds.
    pub fn measure(
        started: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        thresholds: &SessionConfig,
    ) -> (DateTime<Utc>, i64, Health) {
        let start = started.unwrap_or(now);
        let minutes = (now - start).num_minutes().max(0);
        (start, minutes, Health::classify(minutes, thresholds))
    }
}
