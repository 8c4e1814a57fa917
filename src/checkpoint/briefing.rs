//! Restart briefings.
//!
//! The external compiler gets the checkpoint as a JSON file and prints the
//! briefing on stdout. When it is disabled, missing, slow, failing or silent,
//! a plain markdown summary is produced instead.

use std::fmt::Write as _;
use std::io::Write;
use std::path::Path;
use std::process::ExitStatus;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::config::BriefingConfig;
use crate::external::{ExternalCommand, ExternalError};
use crate::gate;
use crate::task::TaskSummary;

use super::Checkpoint;

/// Where a briefing came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BriefingSource {
    Compiler,
    Fallback,
}

/// Compiled briefing text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Briefing {
    pub text: String,
    pub source: BriefingSource,
}

#[derive(Debug, Error)]
enum CompileError {
    #[error(transparent)]
    External(#[from] ExternalError),
    #[error("exited with {0}")]
    Failed(ExitStatus),
    #[error("produced no output")]
    Empty,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Encode(#[from] serde_json::Error),
}

/// Turns a checkpoint into a briefing.
#[derive(Debug, Clone)]
pub struct BriefingCompiler {
    command: ExternalCommand,
    enabled: bool,
}

impl BriefingCompiler {
    pub fn new(command: Vec<String>, timeout: Duration) -> Self {
        Self { command: ExternalCommand::new(command, timeout), enabled: true }
    }

    pub fn from_config(config: &BriefingConfig) -> Self {
        Self {
            command: ExternalCommand::new(config.command.clone(), Duration::from_secs(config.timeout_secs)),
            enabled: config.enabled,
        }
    }

    /// Never runs a process.
    pub fn fallback_only() -> Self {
        Self { command: ExternalCommand::new(Vec::new(), Duration::ZERO), enabled: false }
    }

    /// Compile `checkpoint`, writing the temp file into `scratch_dir`.
    pub fn compile(&self, checkpoint: &Checkpoint, scratch_dir: &Path) -> Briefing {
        if !self.enabled {
            tracing::debug!("Briefing compiler disabled, using fallback");
            return Briefing { text: fallback(checkpoint), source: BriefingSource::Fallback };
        }

        match self.run(checkpoint, scratch_dir) {
            Ok(text) => Briefing { text, source: BriefingSource::Compiler },
            Err(e) => {
                tracing::warn!(
                    command = %self.command.display(),
                    reason = %e,
                    "Briefing compiler unavailable, using fallback briefing"
                );
                Briefing { text: fallback(checkpoint), source: BriefingSource::Fallback }
            }
        }
    }

    fn run(&self, checkpoint: &Checkpoint, scratch_dir: &Path) -> Result<String, CompileError> {
        std::fs::create_dir_all(scratch_dir)?;
        let mut input = tempfile::Builder::new()
            .prefix(".tmp-checkpoint-")
            .suffix(".json")
            .tempfile_in(scratch_dir)?;
        serde_json::to_writer_pretty(input.as_file_mut(), checkpoint)?;
        input.as_file_mut().flush()?;

        let finished = self.command.run(input.path())?;
        if !finished.status.success() {
            return Err(CompileError::Failed(finished.status));
        }

        let text = finished.stdout.trim();
        if text.is_empty() {
            return Err(CompileError::Empty);
        }
        Ok(text.to_string())
    }
}

/// Plain markdown briefing built from the checkpoint alone.
pub fn fallback(checkpoint: &Checkpoint) -> String {
    let mut b = String::new();

    let _ = writeln!(b, "# Session Briefing\n");
    let _ = writeln!(b, "**Stage:** {}", checkpoint.stage);
    if !checkpoint.session_id.is_empty() {
        let _ = writeln!(b, "**Previous Session:** {}", checkpoint.session_id);
    }
    b.push('\n');

    if !checkpoint.decisions.is_empty() {
        b.push_str("## Decisions\n");
        for decision in &checkpoint.decisions {
            let _ = writeln!(b, "- {decision}");
        }
        b.push('\n');
    }

    let summary = TaskSummary::of(&checkpoint.tasks);
    b.push_str("## Tasks\n");
    let _ = writeln!(
        b,
        "- Total: {}, Done: {}, Pending: {}\n",
        summary.total, summary.done, summary.pending
    );

    if !checkpoint.blockers.is_empty() {
        b.push_str("## Blockers\n");
        for blocker in &checkpoint.blockers {
            let _ = writeln!(b, "- {blocker}");
        }
        b.push('\n');
    }

    let (approved, pending) = gate::partition_names(&checkpoint.gates);
    if !approved.is_empty() {
        let _ = writeln!(b, "## Gates Approved\n{}\n", approved.join(", "));
    }
    if !pending.is_empty() {
        let _ = writeln!(b, "## Gates Pending\n{}\n", pending.join(", "));
    }

    b
}
