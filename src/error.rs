//! Error types for mission operations.
//!
//! Three families are kept apart: validation errors (bad input), policy blocks
//! (a rule refused the operation, `force` may override) and storage errors
//! (I/O or corrupt state, always fatal for the operation).

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::stage::Stage;

/// Result type for mission operations.
pub type MissionResult<T> = Result<T, MissionError>;

/// Coarse classification of a [`MissionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or conflicting input.
    Validation,
    /// An advancement rule refused the operation.
    Policy,
    /// Reading or writing mission state failed.
    Storage,
}

/// A rule that refused a stage transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyBlock {
    /// A non-exempt stage has no tasks.
    #[error("stage {stage} has no tasks - create at least one or use --force")]
    NoTasks { stage: Stage },

    /// The stage was entered moments ago and nothing in it is done.
    #[error(
        "stage {stage} lasted {elapsed_secs}s (<{threshold_secs}s) with no completed tasks - are you rubber-stamping?"
    )]
    TooFast { stage: Stage, elapsed_secs: u64, threshold_secs: u64 },

    /// The verify stage has no reviewer task at all.
    #[error("verify stage requires a reviewer task - none exists")]
    ReviewerMissing,

    /// The verify stage has reviewer tasks but none is done.
    #[error("verify stage has a reviewer task but it is not done")]
    ReviewerNotDone,

    /// The gate of the stage still has unsatisfied criteria.
    #[error("gate criteria not met for stage {stage}: {}", .unmet.join("; "))]
    GateUnmet { stage: Stage, unmet: Vec<String> },
}

/// Errors that can occur during mission operations.
#[derive(Debug, Error)]
pub enum MissionError {
    /// No `.mission` directory was found.
    #[error("no mission found at or above {0} (run `mc init` first)")]
    NotInitialized(PathBuf),

    /// `init` was run on a directory that already has a mission.
    #[error("mission already initialized at {0}")]
    AlreadyInitialized(PathBuf),

    /// The project still uses the phase-based layout.
    #[error("phase-based project detected - run `mc migrate` to upgrade to the stage layout")]
    NeedsMigration,

    /// `migrate` was run on a project that is not in the phase-based layout.
    #[error("nothing to migrate: {0}")]
    NothingToMigrate(String),

    /// Unknown stage name.
    #[error("invalid stage: {} (valid: {})", .0, Stage::names().join(", "))]
    InvalidStage(String),

    /// Unknown task status.
    #[error("invalid task status: {0} (valid: pending, in_progress, done, blocked)")]
    InvalidStatus(String),

    /// A required field was empty.
    #[error("{0} is required")]
    MissingField(&'static str),

    /// A task with the same content-derived id already exists.
    #[error("task with this ID already exists: {id} (name={name:?})")]
    DuplicateTask { id: String, name: String },

    /// No task matched an id or prefix.
    #[error("task not found: {0}")]
    TaskNotFound(String),

    /// A task id prefix matched more than one task.
    #[error("ambiguous task prefix {prefix:?} matches: {}", .candidates.join(", "))]
    AmbiguousTaskPrefix { prefix: String, candidates: Vec<String> },

    /// A task was requested for a stage after the current one.
    #[error(
        "cannot create task for stage {requested} - current stage is {current}; advance first or use --force"
    )]
    FutureStageTask { requested: Stage, current: Stage },

    /// The gate registry has no entry for the stage.
    #[error("gate not found: {0}")]
    GateNotFound(Stage),

    /// No criterion of the gate contains the query.
    #[error("no criterion matching {query:?} in {stage} gate")]
    NoCriterionMatch { stage: Stage, query: String },

    /// Several criteria contain the query.
    #[error("ambiguous match for {query:?} in {stage} gate: {}", .candidates.join("; "))]
    AmbiguousCriterion { stage: Stage, query: String, candidates: Vec<String> },

    /// Gate approval for a stage that is not current.
    #[error(
        "cannot approve gate for {requested}: current stage is {current} (gate approval only allowed for the current stage)"
    )]
    WrongStage { requested: Stage, current: Stage },

    /// The gate was approved before.
    #[error("gate for {0} is already approved")]
    AlreadyApproved(Stage),

    /// There is no stage after the current one.
    #[error("already at final stage: {0}")]
    AtFinalStage(Stage),

    /// `set_stage` was asked for the stage the mission is already in.
    #[error("already at stage {0}")]
    AlreadyAtStage(Stage),

    /// No checkpoint matched an id.
    #[error("checkpoint not found: {0}")]
    CheckpointNotFound(String),

    /// Several checkpoints matched a partial id.
    #[error("ambiguous checkpoint {query:?} matches: {}", .candidates.join(", "))]
    AmbiguousCheckpoint { query: String, candidates: Vec<String> },

    /// A handoff report is not valid JSON of the expected shape.
    #[error("invalid handoff {path}: {source}")]
    MalformedHandoff {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Unknown handoff status.
    #[error("invalid status: {0} (valid: complete, blocked, in_progress)")]
    InvalidHandoffStatus(String),

    /// A handoff finding lacks a required field.
    #[error("finding {index}: {field} is required")]
    IncompleteFinding { index: usize, field: &'static str },

    /// A handoff id that would escape its directory when used as a file name.
    #[error("{field} {value:?} cannot be used as a file name")]
    UnsafeHandoffId { field: &'static str, value: String },

    /// The external validator reported errors.
    #[error("handoff rejected: {}", .0.join("; "))]
    HandoffRejected(Vec<String>),

    /// The project is not inside a Git repository.
    #[error("not a git repository: {0}")]
    NoRepository(PathBuf),

    /// An advancement rule refused the transition.
    #[error(transparent)]
    Blocked(#[from] PolicyBlock),

    /// I/O failure on a mission file.
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A state file could not be decoded.
    #[error("corrupt state file {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The configuration file could not be parsed.
    #[error("invalid configuration {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// The configuration could not be encoded.
    #[error("failed to encode configuration {path}: {source}")]
    ConfigEncode {
        path: PathBuf,
        #[source]
        source: toml::ser::Error,
    },

    /// Reading the Git index failed.
    #[cfg(feature = "git")]
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    /// A value could not be encoded for writing.
    #[error("failed to encode {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl MissionError {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io { path: path.as_ref().to_path_buf(), source }
    }

    /// Wrap a decode error with the file it came from.
    pub fn corrupt(path: impl AsRef<Path>, source: serde_json::Error) -> Self {
        Self::Corrupt { path: path.as_ref().to_path_buf(), source }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Blocked(_) => ErrorKind::Policy,
            Self::Io { .. }
            | Self::Corrupt { .. }
            | Self::Config { .. }
            | Self::ConfigEncode { .. }
            | Self::Encode { .. } => ErrorKind::Storage,
            #[cfg(feature = "git")]
            Self::Git(_) => ErrorKind::Storage,
            _ => ErrorKind::Validation,
        }
    }

    /// Whether a policy rule refused the operation.
    pub fn is_policy_block(&self) -> bool {
        self.kind() == ErrorKind::Policy
    }

    /// Whether the caller supplied bad or conflicting input.
    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }

    /// The policy block behind this error, if any.
    pub fn as_policy_block(&self) -> Option<&PolicyBlock> {
        match self {
            Self::Blocked(block) => Some(block),
            _ => None,
        }
    }
}
