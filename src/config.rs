//! Mission configuration.
//!
//! Loaded from `.mission/config.toml`. Every section and field is optional;
//! anything missing takes its default.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MissionError, MissionResult};
use crate::fsutil;
use crate::guard::Policy;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MissionConfig {
    /// Name recorded as the actor of audit events
    pub actor: String,

    /// Advancement policy
    pub workflow: Policy,

    /// Session health thresholds
    pub session: SessionConfig,

    /// External briefing compiler
    pub briefing: BriefingConfig,

    /// External handoff validator
    pub handoff: HandoffConfig,

    /// Which mutations trigger a git commit
    pub auto_commit: AutoCommitConfig,

    /// Scope-restricted commit staging
    pub scope: ScopeConfig,
}

impl Default for MissionConfig {
    fn default() -> Self {
        Self {
            actor: "cli".to_string(),
            workflow: Policy::default(),
            session: SessionConfig::default(),
            briefing: BriefingConfig::default(),
            handoff: HandoffConfig::default(),
            auto_commit: AutoCommitConfig::default(),
            scope: ScopeConfig::default(),
        }
    }
}

/// Session health thresholds, in minutes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Sessions older than this are yellow
    pub yellow_after_minutes: u64,

    /// Sessions older than this are red
    pub red_after_minutes: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { yellow_after_minutes: 60, red_after_minutes: 120 }
    }
}

/// How restart briefings are compiled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BriefingConfig {
    /// Whether to try the external compiler at all
    pub enabled: bool,

    /// Program and leading arguments; the checkpoint file path is appended
    pub command: Vec<String>,

    /// Hard limit for the compiler process
    pub timeout_secs: u64,
}

impl Default for BriefingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: vec!["mc-core".to_string(), "checkpoint-compile".to_string()],
            timeout_secs: 10,
        }
    }
}

/// The optional external handoff validator. Off unless asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandoffConfig {
    pub validate: bool,

    /// Program and leading arguments; the handoff file path is appended
    pub command: Vec<String>,

    pub timeout_secs: u64,
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self {
            validate: false,
            command: vec!["mc-core".to_string(), "validate-handoff".to_string()],
            timeout_secs: 10,
        }
    }
}

/// Categories of state mutation that can trigger a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommitCategory {
    Checkpoint,
    Task,
    Gate,
    Stage,
    Worker,
    Handoff,
}

impl CommitCategory {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Checkpoint => "checkpoint",
            Self::Task => "task",
            Self::Gate => "gate",
            Self::Stage => "stage",
            Self::Worker => "worker",
            Self::Handoff => "handoff",
        }
    }
}

/// Per-category auto-commit switches plus a master switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoCommitConfig {
    pub enabled: bool,
    pub checkpoint: bool,
    pub task: bool,
    pub gate: bool,
    pub stage: bool,
    pub worker: bool,
    pub handoff: bool,
}

impl Default for AutoCommitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            checkpoint: true,
            task: true,
            gate: true,
            stage: true,
            worker: true,
            handoff: true,
        }
    }
}

impl AutoCommitConfig {
    /// Everything off.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            checkpoint: false,
            task: false,
            gate: false,
            stage: false,
            worker: false,
            handoff: false,
        }
    }

    /// Whether a mutation of `category` should be committed.
    pub fn allows(&self, category: CommitCategory) -> bool {
        self.enabled
            && match category {
                CommitCategory::Checkpoint => self.checkpoint,
                CommitCategory::Task => self.task,
                CommitCategory::Gate => self.gate,
                CommitCategory::Stage => self.stage,
                CommitCategory::Worker => self.worker,
                CommitCategory::Handoff => self.handoff,
            }
    }
}

/// Scope staging settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    /// Patterns any task may stage
    pub exempt_paths: Vec<String>,
}

impl MissionConfig {
    /// Load from `path`, or defaults if it does not exist.
    pub fn load_or_default(path: &Path) -> MissionResult<Self> {
        match fsutil::read_optional(path)? {
            Some(content) => Self::parse(path, &content),
            None => Ok(Self::default()),
        }
    }

    /// Load from an existing file.
    pub fn load_from_file(path: &Path) -> MissionResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| MissionError::io(path, e))?;
        Self::parse(path, &content)
    }

    fn parse(path: &Path, content: &str) -> MissionResult<Self> {
        toml::from_str(content).map_err(|source| MissionError::Config { path: path.to_path_buf(), source })
    }

    /// Write the configuration as TOML.
    pub fn save(&self, path: &Path) -> MissionResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|source| MissionError::ConfigEncode { path: path.to_path_buf(), source })?;
        fsutil::write_atomic(path, content.as_bytes())
    }
}
