//! The fixed stage sequence and the ledger that records the current stage.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MissionError, MissionResult};
use crate::{fsutil, timestamp};

/// One step of the delivery workflow.
///
/// Declaration order is the workflow order; `Ord` follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Discovery,
    Goal,
    Requirements,
    Planning,
    Design,
    Implement,
    Verify,
    Validate,
    Document,
    Release,
}

impl Stage {
    /// Every stage, in workflow order.
    pub const ALL: [Self; 10] = [
        Self::Discovery,
        Self::Goal,
        Self::Requirements,
        Self::Planning,
        Self::Design,
        Self::Implement,
        Self::Verify,
        Self::Validate,
        Self::Document,
        Self::Release,
    ];

    /// Stages that may advance without any tasks.
    pub const EXEMPT: [Self; 4] = [Self::Goal, Self::Requirements, Self::Planning, Self::Design];

    /// Lowercase name as stored on disk.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Discovery => "discovery",
            Self::Goal => "goal",
            Self::Requirements => "requirements",
            Self::Planning => "planning",
            Self::Design => "design",
            Self::Implement => "implement",
            Self::Verify => "verify",
            Self::Validate => "validate",
            Self::Document => "document",
            Self::Release => "release",
        }
    }

    /// Names of all stages, in order.
    pub fn names() -> [&'static str; 10] {
        Self::ALL.map(Self::as_str)
    }

    /// Zero-based position in the sequence.
    pub fn index(self) -> usize {
        self as usize
    }

    /// The stage after this one, `None` at the end.
    pub fn next(self) -> Option<Self> {
        Self::ALL.get(self.index() + 1).copied()
    }

    /// The stage before this one, `None` at the start.
    pub fn prev(self) -> Option<Self> {
        self.index().checked_sub(1).map(|i| Self::ALL[i])
    }

    pub fn is_first(self) -> bool {
        self == Self::Discovery
    }

    pub fn is_final(self) -> bool {
        self == Self::Release
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = MissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str() == wanted)
            .ok_or_else(|| MissionError::InvalidStage(s.to_string()))
    }
}

/// Content of `state/stage.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageState {
    /// The stage work is currently in
    pub current: Stage,

    /// When `current` last changed. `None` if the stored value is unreadable.
    #[serde(default, with = "timestamp::rfc3339_opt")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl StageState {
    /// A state entering `current` now.
    pub fn entered(current: Stage) -> Self {
        Self { current, updated_at: Some(timestamp::now()) }
    }

    /// Time spent in the current stage as of `now`.
    ///
    /// `None` when the entry time is unknown. A clock that went backwards
    /// reads as zero elapsed.
    pub fn elapsed(&self, now: DateTime<Utc>) -> Option<Duration> {
        let entered = self.updated_at?;
        Some((now - entered).to_std().unwrap_or(Duration::ZERO))
    }
}

/// Persists the current-stage pointer.
#[derive(Debug, Clone)]
pub struct StageLedger {
    path: PathBuf,
}

impl StageLedger {
    /// Ledger stored in `<state_dir>/stage.json`.
    pub fn new(state_dir: &Path) -> Self {
        Self { path: state_dir.join("stage.json") }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn read(&self) -> MissionResult<StageState> {
        fsutil::read_json(&self.path)
    }

    pub fn write(&self, state: &StageState) -> MissionResult<()> {
        fsutil::write_json(&self.path, state)
    }

    /// Point the ledger at `stage`, stamped with the current time.
    pub fn enter(&self, stage: Stage) -> MissionResult<StageState> {
        let state = StageState::entered(stage);
        self.write(&state)?;
        tracing::debug!(stage = %stage, "Stage ledger updated");
        Ok(state)
    }
}
