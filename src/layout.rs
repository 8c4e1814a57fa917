//! Where mission files live under a project.

use std::path::{Path, PathBuf};

use crate::MISSION_DIR;

/// Paths of every mission file, derived from the project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Project the mission belongs to
    pub project_root: PathBuf,
    /// `<project>/.mission`
    pub mission_dir: PathBuf,
    /// Live state: stage, tasks, gates
    pub state_dir: PathBuf,
    /// Checkpoints and session bookkeeping
    pub orchestrator_dir: PathBuf,
    pub checkpoints_dir: PathBuf,
    /// Raw worker handoff reports
    pub handoffs_dir: PathBuf,
    /// Accumulated findings, one file per task
    pub findings_dir: PathBuf,
    /// Completion markers polled by orchestrators
    pub status_dir: PathBuf,
}

impl Layout {
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        let project_root = project_root.as_ref().to_path_buf();
        let mission_dir = project_root.join(MISSION_DIR);
        let state_dir = mission_dir.join("state");
        let orchestrator_dir = mission_dir.join("orchestrator");
        let checkpoints_dir = orchestrator_dir.join("checkpoints");
        let handoffs_dir = mission_dir.join("handoffs");
        let findings_dir = mission_dir.join("findings");
        let status_dir = mission_dir.join("status");
        Self {
            project_root,
            mission_dir,
            state_dir,
            orchestrator_dir,
            checkpoints_dir,
            handoffs_dir,
            findings_dir,
            status_dir,
        }
    }

    pub fn config_path(&self) -> PathBuf {
        self.mission_dir.join("config.toml")
    }

    pub fn audit_path(&self) -> PathBuf {
        self.mission_dir.join("audit.jsonl")
    }

    pub fn stage_path(&self) -> PathBuf {
        self.state_dir.join("stage.json")
    }

    /// Stage pointer of phase-based missions.
    pub fn phase_path(&self) -> PathBuf {
        self.state_dir.join("phase.json")
    }

    pub fn current_path(&self) -> PathBuf {
        self.orchestrator_dir.join("current.json")
    }

    pub fn sessions_path(&self) -> PathBuf {
        self.orchestrator_dir.join("sessions.jsonl")
    }

    pub fn decisions_path(&self) -> PathBuf {
        self.orchestrator_dir.join("decisions.json")
    }

    pub fn blockers_path(&self) -> PathBuf {
        self.orchestrator_dir.join("blockers.json")
    }

    /// Whether the project still uses the phase-based layout.
    pub fn is_phase_layout(&self) -> bool {
        self.phase_path().exists() && !self.stage_path().exists()
    }
}
