//! Worker handoffs.
//!
//! A worker that finishes, stalls on or pauses a task reports back with a
//! JSON file. The report is stored verbatim under `.mission/handoffs/`, and
//! its findings accumulate per task under `.mission/findings/`.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::HandoffConfig;
use crate::error::{MissionError, MissionResult};
use crate::external::ExternalCommand;
use crate::fsutil;
use crate::layout::Layout;
use crate::task::TaskStatus;

/// Upper bound on `-N` suffixes tried for a handoff file name.
const MAX_NAME_SUFFIX: usize = 1000;

/// File name prefix for reports without a worker id.
const ANONYMOUS_WORKER: &str = "anonymous";

/// Status a worker reports for its task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffStatus {
    Complete,
    Blocked,
    InProgress,
}

impl HandoffStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Blocked => "blocked",
            Self::InProgress => "in_progress",
        }
    }

    /// The task status a report moves its task to.
    pub const fn task_status(self) -> TaskStatus {
        match self {
            Self::Complete => TaskStatus::Done,
            Self::Blocked => TaskStatus::Blocked,
            Self::InProgress => TaskStatus::InProgress,
        }
    }
}

impl fmt::Display for HandoffStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HandoffStatus {
    type Err = MissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Err(MissionError::MissingField("status")),
            "complete" => Ok(Self::Complete),
            "blocked" => Ok(Self::Blocked),
            "in_progress" => Ok(Self::InProgress),
            _ => Err(MissionError::InvalidHandoffStatus(s.to_string())),
        }
    }
}

/// One observation reported by a worker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Finding {
    #[serde(rename = "type")]
    pub kind: String,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
}

/// A worker's report on a task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Handoff {
    pub task_id: String,
    pub worker_id: String,
    /// Kept as text so a bad value is reported by [`Handoff::validate`]
    pub status: String,
    pub findings: Vec<Finding>,
    pub artifacts: Vec<String>,
    pub open_questions: Vec<String>,
}

impl Handoff {
    /// Decode a report read from `path`.
    pub fn from_json(path: &Path, content: &str) -> MissionResult<Self> {
        serde_json::from_str(content)
            .map_err(|source| MissionError::MalformedHandoff { path: path.to_path_buf(), source })
    }

    /// Check the report and return its status.
    ///
    /// The status is checked first, then each finding in order; the first
    /// problem found is the one reported.
    pub fn validate(&self) -> MissionResult<HandoffStatus> {
        let status = self.status.parse()?;
        for (index, finding) in self.findings.iter().enumerate() {
            if finding.kind.trim().is_empty() {
                return Err(MissionError::IncompleteFinding { index, field: "type" });
            }
            if finding.summary.trim().is_empty() {
                return Err(MissionError::IncompleteFinding { index, field: "summary" });
            }
        }
        check_file_name("task_id", &self.task_id)?;
        check_file_name("worker_id", &self.worker_id)?;
        Ok(status)
    }

    /// The task id, if the report names one.
    pub fn task(&self) -> Option<&str> {
        Some(self.task_id.as_str()).filter(|id| !id.is_empty())
    }
}

/// Ids end up in file names, so they must stay inside their directory.
fn check_file_name(field: &'static str, value: &str) -> MissionResult<()> {
    if value == "." || value == ".." || value.contains(['/', '\\', '\0']) {
        return Err(MissionError::UnsafeHandoffId { field, value: value.to_string() });
    }
    Ok(())
}

/// What [`crate::Mission::handoff`] did with a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandoffReceipt {
    /// Where the raw report was stored
    pub stored_at: PathBuf,
    pub status: HandoffStatus,
    /// Full id of the task the report was for
    pub task_id: Option<String>,
    pub findings_path: Option<PathBuf>,
    pub findings_recorded: usize,
    /// Warnings printed by the external validator
    pub warnings: Vec<String>,
}

/// Verdict printed by the external validator.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ValidatorReport {
    errors: Vec<String>,
    warnings: Vec<String>,
}

/// The optional external handoff check.
#[derive(Debug, Clone)]
pub struct HandoffValidator {
    command: ExternalCommand,
    enabled: bool,
}

impl HandoffValidator {
    pub fn from_config(config: &HandoffConfig) -> Self {
        Self {
            command: ExternalCommand::new(config.command.clone(), Duration::from_secs(config.timeout_secs)),
            enabled: config.validate,
        }
    }

    /// Run the validator on the report at `path` and return its warnings.
    ///
    /// A validator that cannot be started or times out is skipped. One that
    /// exits non-zero rejects the report with the errors it printed.
    pub fn check(&self, path: &Path) -> MissionResult<Vec<String>> {
        if !self.enabled {
            return Ok(Vec::new());
        }

        let finished = match self.command.run(path) {
            Ok(finished) => finished,
            Err(e) => {
                tracing::warn!(
                    command = %self.command.display(),
                    reason = %e,
                    "Handoff validator unavailable, using built-in checks only"
                );
                return Ok(Vec::new());
            }
        };

        let report = serde_json::from_str::<ValidatorReport>(finished.stdout.trim()).ok();
        if finished.status.success() {
            return Ok(report.map(|r| r.warnings).unwrap_or_default());
        }

        let errors = match report {
            Some(report) if !report.errors.is_empty() => report.errors,
            _ => match finished.stdout.trim() {
                "" => vec![format!("validator exited with {}", finished.status)],
                output => vec![output.to_string()],
            },
        };
        Err(MissionError::HandoffRejected(errors))
    }
}

/// Handoff reports, findings and completion markers on disk.
#[derive(Debug, Clone)]
pub struct HandoffStore {
    handoffs_dir: PathBuf,
    findings_dir: PathBuf,
    status_dir: PathBuf,
}

impl HandoffStore {
    pub fn new(layout: &Layout) -> Self {
        Self {
            handoffs_dir: layout.handoffs_dir.clone(),
            findings_dir: layout.findings_dir.clone(),
            status_dir: layout.status_dir.clone(),
        }
    }

    /// Store a raw report as `<worker>-<YYYYMMDD-HHMMSS>.json`, suffixing
    /// `-1`, `-2`, ... when the worker already reported that second.
    pub fn store_raw(&self, worker_id: &str, raw: &[u8], at: DateTime<Utc>) -> MissionResult<PathBuf> {
        let worker = if worker_id.is_empty() { ANONYMOUS_WORKER } else { worker_id };
        let base = format!("{worker}-{}", at.format("%Y%m%d-%H%M%S"));
        for n in 0..MAX_NAME_SUFFIX {
            let name = if n == 0 { format!("{base}.json") } else { format!("{base}-{n}.json") };
            let path = self.handoffs_dir.join(name);
            if fsutil::write_new(&path, raw)? {
                return Ok(path);
            }
        }
        Err(MissionError::io(
            &self.handoffs_dir,
            io::Error::new(io::ErrorKind::AlreadyExists, format!("no free handoff name for {base}")),
        ))
    }

    pub fn findings_path(&self, task_id: &str) -> PathBuf {
        self.findings_dir.join(format!("{task_id}.json"))
    }

    /// Every finding recorded for a task, oldest first.
    pub fn findings(&self, task_id: &str) -> MissionResult<Vec<Finding>> {
        Ok(fsutil::read_json_optional(&self.findings_path(task_id))?.unwrap_or_default())
    }

    /// Append findings to a task's file. Returns the file's path.
    pub fn append_findings(&self, task_id: &str, findings: &[Finding]) -> MissionResult<PathBuf> {
        let path = self.findings_path(task_id);
        let mut all = self.findings(task_id)?;
        all.extend_from_slice(findings);
        fsutil::write_json(&path, &all)?;
        Ok(path)
    }

    pub fn status_marker_path(&self, task_id: &str) -> PathBuf {
        self.status_dir.join(format!("task-{task_id}.status"))
    }

    /// Drop the `DONE` marker orchestrators poll for.
    pub fn mark_done(&self, task_id: &str) -> MissionResult<PathBuf> {
        let path = self.status_marker_path(task_id);
        fsutil::write_atomic(&path, b"DONE\n")?;
        Ok(path)
    }
}
