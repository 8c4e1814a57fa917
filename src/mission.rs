//! The mission context: every engine operation goes through [`Mission`].
//!
//! Each operation is one read-modify-write cycle over the state files. After
//! a successful mutation an audit event is recorded and `.mission/` is
//! committed for the operation's category; both side effects are
//! best-effort.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::json;

use crate::audit::{AuditAction, AuditEntry, AuditLog};
use crate::checkpoint::{BriefingCompiler, Checkpoint, CheckpointStore, RestartOutcome, SessionRecord, SessionStatus};
use crate::config::{CommitCategory, MissionConfig};
use crate::error::{MissionError, MissionResult, PolicyBlock};
use crate::gate::{Gate, GateRegistry, GateStore};
use crate::guard::{self, StrictFailure, Verdict};
use crate::handoff::{Finding, Handoff, HandoffReceipt, HandoffStatus, HandoffStore, HandoffValidator};
use crate::layout::Layout;
use crate::migrate::{self, PhaseMigration};
use crate::scope::{self, ScopeReport};
use crate::stage::{Stage, StageLedger, StageState};
use crate::task::{self, graph, Task, TaskStatus, TaskStore, TaskSummary};
use crate::{fsutil, ids, timestamp, MISSION_DIR};

/// Result of approving a gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ApprovalOutcome {
    /// The stage pointer moved one step forward.
    Advanced { from: Stage, to: Stage, checkpoint_id: Option<String> },
    /// The approved gate belongs to the last stage; nothing moved.
    FinalStage { stage: Stage, checkpoint_id: Option<String> },
}

/// A stage pointer move made by [`Mission::advance`] or [`Mission::set_stage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: Stage,
    pub to: Stage,
    pub verdict: Verdict,
}

/// Input for [`Mission::create_task`].
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub name: String,
    /// Defaults to the current stage
    pub stage: Option<Stage>,
    pub zone: String,
    pub persona: String,
    pub depends_on: Vec<String>,
    pub scope_paths: Vec<String>,
}

impl NewTask {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    #[must_use]
    pub fn in_stage(mut self, stage: Stage) -> Self {
        self.stage = Some(stage);
        self
    }

    #[must_use]
    pub fn zone(mut self, zone: impl Into<String>) -> Self {
        self.zone = zone.into();
        self
    }

    #[must_use]
    pub fn persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = persona.into();
        self
    }

    #[must_use]
    pub fn depends_on(mut self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.depends_on.extend(ids.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn scope_paths(mut self, paths: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.scope_paths.extend(paths.into_iter().map(Into::into));
        self
    }
}

/// Which tasks [`Mission::tasks`] returns.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskFilter {
    pub stage: Option<Stage>,
    pub status: Option<TaskStatus>,
    /// Only tasks that are ready to start
    pub ready_only: bool,
}

/// A gate together with the state of its stage's tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateReport {
    pub stage: Stage,
    pub gate: Option<Gate>,
    pub tasks: TaskSummary,
    /// Every criterion is satisfied
    pub ready: bool,
}

/// An opened mission.
#[derive(Debug, Clone)]
pub struct Mission {
    layout: Layout,
    config: MissionConfig,
    ledger: StageLedger,
    tasks: TaskStore,
    gates: GateStore,
    checkpoints: CheckpointStore,
    handoffs: HandoffStore,
    audit: AuditLog,
    #[cfg(feature = "git")]
    committer: crate::git::AutoCommitter,
}

impl Mission {
    /// Create a new mission in `project_root`.
    ///
    /// Writes the stage pointer at discovery, an empty task list, default
    /// gates for every stage and a default `config.toml` if none exists.
    pub fn init(project_root: impl AsRef<Path>) -> MissionResult<Self> {
        let layout = Layout::new(project_root);
        if layout.stage_path().exists() || layout.phase_path().exists() {
            return Err(MissionError::AlreadyInitialized(layout.mission_dir));
        }

        fsutil::ensure_dir(&layout.state_dir)?;
        fsutil::ensure_dir(&layout.checkpoints_dir)?;

        StageLedger::new(&layout.state_dir).enter(Stage::Discovery)?;
        TaskStore::new(&layout.state_dir).save(&[])?;
        GateStore::new(&layout.state_dir).write(&GateRegistry::with_defaults())?;

        let config_path = layout.config_path();
        if !config_path.exists() {
            MissionConfig::default().save(&config_path)?;
        }

        let mission = Self::open(&layout.project_root)?;
        mission.audit.record(
            AuditAction::ProjectInitialized,
            json!({ "path": mission.layout.project_root.display().to_string() }),
        );
        mission.commit(CommitCategory::Stage, "init mission");
        tracing::info!(path = ?mission.layout.mission_dir, "Mission initialized");
        Ok(mission)
    }

    /// Open the mission in `project_root`.
    pub fn open(project_root: impl AsRef<Path>) -> MissionResult<Self> {
        let layout = Layout::new(project_root);
        if !layout.mission_dir.is_dir() {
            return Err(MissionError::NotInitialized(layout.project_root));
        }
        let config = MissionConfig::load_or_default(&layout.config_path())?;
        Ok(Self::with_config(layout, config))
    }

    /// Open the nearest mission at or above `start_dir`.
    pub fn discover(start_dir: impl AsRef<Path>) -> MissionResult<Self> {
        let start_dir = start_dir.as_ref();
        let root = start_dir
            .ancestors()
            .find(|dir| dir.join(MISSION_DIR).is_dir())
            .ok_or_else(|| MissionError::NotInitialized(start_dir.to_path_buf()))?;
        tracing::debug!(root = ?root, "Found mission");
        Self::open(root)
    }

    fn with_config(layout: Layout, config: MissionConfig) -> Self {
        Self {
            ledger: StageLedger::new(&layout.state_dir),
            tasks: TaskStore::new(&layout.state_dir),
            gates: GateStore::new(&layout.state_dir),
            checkpoints: CheckpointStore::new(&layout),
            handoffs: HandoffStore::new(&layout),
            audit: AuditLog::new(layout.audit_path(), config.actor.clone()),
            #[cfg(feature = "git")]
            committer: crate::git::AutoCommitter::new(&layout.project_root, config.auto_commit.clone()),
            layout,
            config,
        }
    }

    /// Replace the loaded configuration, e.g. to switch off auto-commits.
    #[must_use]
    pub fn configured(self, config: MissionConfig) -> Self {
        Self::with_config(self.layout, config)
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn root(&self) -> &Path {
        &self.layout.project_root
    }

    pub fn config(&self) -> &MissionConfig {
        &self.config
    }

    /// Engine operations refuse to run on a phase-based mission.
    fn require_current(&self) -> MissionResult<()> {
        if self.layout.is_phase_layout() {
            return Err(MissionError::NeedsMigration);
        }
        if !self.ledger.exists() {
            return Err(MissionError::NotInitialized(self.layout.project_root.clone()));
        }
        Ok(())
    }

    #[cfg(feature = "git")]
    fn commit(&self, category: CommitCategory, message: &str) {
        self.committer.commit(category, message);
    }

    #[cfg(not(feature = "git"))]
    fn commit(&self, category: CommitCategory, message: &str) {
        tracing::trace!(category = category.as_str(), message, "Git support disabled, not committing");
    }

    // -----------------------------------------------------------------------
    // Migration
    // -----------------------------------------------------------------------

    /// Upgrade a phase-based mission to the stage layout.
    pub fn migrate(&self) -> MissionResult<PhaseMigration> {
        let outcome = migrate::migrate_phase_project(&self.layout)?;
        self.audit.record(
            AuditAction::ProjectMigrated,
            json!({
                "from_phase": outcome.from_phase,
                "to_stage": outcome.to_stage,
                "tasks_migrated": outcome.tasks_migrated,
            }),
        );
        self.commit(
            CommitCategory::Stage,
            &format!("migrate phase {} → stage {}", outcome.from_phase, outcome.to_stage),
        );
        Ok(outcome)
    }

    // -----------------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------------

    pub fn stage(&self) -> MissionResult<StageState> {
        self.require_current()?;
        self.ledger.read()
    }

    /// Run the advancement rules and the gate check for leaving `state.current`.
    fn check_leave(&self, state: &StageState, force: bool) -> MissionResult<Verdict> {
        let stage = state.current;
        let tasks = self.tasks.load()?;
        let in_stage = task::in_stage(&tasks, stage);
        let elapsed = state.elapsed(timestamp::now());

        let verdict = guard::can_advance(&self.config.workflow, stage, &in_stage, elapsed, force)?;

        let registry = self.gates.read()?;
        if !registry.all_criteria_met(stage) {
            let mut unmet = registry.unmet_criteria(stage);
            if unmet.is_empty() {
                unmet.push("gate has no criteria".to_string());
            }
            let block = PolicyBlock::GateUnmet { stage, unmet };
            if !force {
                return Err(block.into());
            }
            tracing::warn!(stage = %stage, reason = %block, "--force: advancing past unmet gate");
            if verdict == Verdict::Forced(None) {
                return Ok(Verdict::Forced(Some(block)));
            }
        }
        Ok(verdict)
    }

    /// Make sure `stage` has a gate, inserting the default one if needed.
    fn ensure_gate(&self, stage: Stage) {
        let result = self.gates.read().and_then(|mut registry| {
            if registry.ensure_stage(stage) {
                self.gates.write(&registry)?;
            }
            Ok(())
        });
        if let Err(e) = result {
            tracing::warn!(stage = %stage, error = %e, "Could not initialize gate");
        }
    }

    /// Move to the next stage.
    ///
    /// Blocked by the advancement policy and by unsatisfied criteria of the
    /// current gate, unless `force` is set.
    pub fn advance(&self, force: bool) -> MissionResult<Transition> {
        self.require_current()?;
        let state = self.ledger.read()?;
        let from = state.current;
        let to = from.next().ok_or(MissionError::AtFinalStage(from))?;

        let verdict = self.check_leave(&state, force)?;
        self.ledger.enter(to)?;

        self.audit.record(
            AuditAction::StageAdvanced,
            json!({ "from_stage": from, "to_stage": to, "forced": force }),
        );
        self.commit(CommitCategory::Stage, &format!("advance {from} → {to}"));
        self.ensure_gate(to);

        tracing::info!(from = %from, to = %to, "Stage advanced");
        Ok(Transition { from, to, verdict })
    }

    /// Point the ledger at `target`.
    ///
    /// A forward jump runs the same checks as [`Mission::advance`] against
    /// the current stage; moving back is unchecked. Setting the current
    /// stage again is rejected and leaves the entry time alone.
    pub fn set_stage(&self, target: Stage, force: bool) -> MissionResult<Transition> {
        self.require_current()?;
        let state = self.ledger.read()?;
        let from = state.current;
        if target == from {
            return Err(MissionError::AlreadyAtStage(from));
        }

        let verdict = if target > from { self.check_leave(&state, force)? } else { Verdict::Allowed };
        self.ledger.enter(target)?;

        self.audit.record(AuditAction::StageSet, json!({ "stage": target, "from_stage": from }));
        self.commit(CommitCategory::Stage, &format!("set {target}"));
        self.ensure_gate(target);

        Ok(Transition { from, to: target, verdict })
    }

    // -----------------------------------------------------------------------
    // Gates
    // -----------------------------------------------------------------------

    /// Approve the gate of the current stage, checkpoint, and move one stage
    /// forward.
    ///
    /// Approval does not look at the criteria. A failed checkpoint is logged
    /// and does not undo the approval.
    pub fn approve_gate(&self, stage: Stage, note: &str) -> MissionResult<ApprovalOutcome> {
        self.require_current()?;
        let current = self.ledger.read()?.current;
        if stage != current {
            return Err(MissionError::WrongStage { requested: stage, current });
        }

        let mut registry = self.gates.read()?;
        let note = registry.approve(stage, note, timestamp::now())?.approval_note.clone();
        self.gates.write(&registry)?;

        self.audit.record(AuditAction::GateApproved, json!({ "stage": stage, "note": note }));
        self.commit(CommitCategory::Gate, &format!("approve {stage}"));

        let checkpoint_id = match self.checkpoint() {
            Ok(cp) => Some(cp.id),
            Err(e) => {
                tracing::warn!(stage = %stage, error = %e, "Checkpoint after gate approval failed");
                None
            }
        };

        let Some(next) = stage.next() else {
            tracing::info!(stage = %stage, "Final gate approved");
            return Ok(ApprovalOutcome::FinalStage { stage, checkpoint_id });
        };

        self.ledger.enter(next)?;
        self.audit.record(AuditAction::StageAdvanced, json!({ "from_stage": stage, "to_stage": next }));
        self.commit(CommitCategory::Stage, &format!("advance {stage} → {next} (gate approved)"));
        self.ensure_gate(next);

        Ok(ApprovalOutcome::Advanced { from: stage, to: next, checkpoint_id })
    }

    /// Load the registry with a gate guaranteed for `stage`.
    fn registry_for(&self, stage: Stage) -> MissionResult<GateRegistry> {
        let mut registry = self.gates.read()?;
        registry.ensure_stage(stage);
        Ok(registry)
    }

    /// Satisfy the criterion of the current gate matching `query`.
    pub fn satisfy(&self, query: &str) -> MissionResult<String> {
        self.require_current()?;
        let stage = self.ledger.read()?.current;
        let mut registry = self.registry_for(stage)?;

        let description = registry.satisfy_criterion(stage, query)?;
        self.gates.write(&registry)?;

        self.audit.record(AuditAction::GateSatisfied, json!({ "stage": stage, "criterion": description }));
        self.commit(CommitCategory::Gate, &format!("satisfy {stage}: {description}"));
        Ok(description)
    }

    /// Satisfy every criterion of the current gate. Returns how many.
    pub fn satisfy_all(&self) -> MissionResult<usize> {
        self.require_current()?;
        let stage = self.ledger.read()?.current;
        let mut registry = self.registry_for(stage)?;

        let count = registry.satisfy_all(stage)?;
        self.gates.write(&registry)?;

        self.audit.record(AuditAction::GateSatisfied, json!({ "stage": stage, "all": true, "count": count }));
        self.commit(CommitCategory::Gate, &format!("satisfy all {stage}"));
        Ok(count)
    }

    /// The gate of `stage` (default: current) and its stage's task counts.
    pub fn gate_report(&self, stage: Option<Stage>) -> MissionResult<GateReport> {
        self.require_current()?;
        let stage = match stage {
            Some(stage) => stage,
            None => self.ledger.read()?.current,
        };
        let registry = self.gates.read()?;
        let tasks = self.tasks.load()?;
        Ok(GateReport {
            stage,
            gate: registry.get(stage).cloned(),
            tasks: TaskSummary::of(task::in_stage(&tasks, stage)),
            ready: registry.all_criteria_met(stage),
        })
    }

    pub fn gates(&self) -> MissionResult<GateRegistry> {
        self.require_current()?;
        self.gates.read()
    }

    // -----------------------------------------------------------------------
    // Tasks
    // -----------------------------------------------------------------------

    /// Create a pending task.
    ///
    /// The stage defaults to the current one. A later stage is rejected
    /// unless `force` is set.
    pub fn create_task(&self, new: NewTask, force: bool) -> MissionResult<Task> {
        self.require_current()?;
        let name = new.name.trim();
        if name.is_empty() {
            return Err(MissionError::MissingField("task name"));
        }

        let current = self.ledger.read()?.current;
        let stage = new.stage.unwrap_or(current);
        if stage > current {
            if !force {
                return Err(MissionError::FutureStageTask { requested: stage, current });
            }
            tracing::warn!(stage = %stage, current = %current, "--force: creating task for a future stage");
        }

        let task = Task::new(name, stage, new.zone, new.persona)
            .with_depends_on(new.depends_on)
            .with_scope_paths(new.scope_paths);
        let task = self.tasks.insert(task)?;

        self.audit.record(
            AuditAction::TaskCreated,
            json!({
                "task_id": task.id,
                "name": task.name,
                "stage": task.stage,
                "zone": task.zone,
                "persona": task.persona,
            }),
        );
        self.commit(CommitCategory::Task, &format!("create {} {:?}", ids::short_id(&task.id), task.name));
        Ok(task)
    }

    /// Set the status of the task matching `id_or_prefix`.
    pub fn update_task_status(&self, id_or_prefix: &str, status: TaskStatus) -> MissionResult<Task> {
        self.require_current()?;
        let (before, after) = self.tasks.update(id_or_prefix, |t| t.set_status(status))?;

        let action = if status.is_terminal() { AuditAction::TaskCompleted } else { AuditAction::TaskUpdated };
        self.audit.record(
            action,
            json!({ "task_id": after.id, "old_status": before.status, "new_status": after.status }),
        );
        self.commit(
            CommitCategory::Task,
            &format!("update {} {:?}", ids::short_id(&after.id), status.as_str()),
        );
        Ok(after)
    }

    /// Record which worker process carries a task; `None` clears it.
    pub fn assign_worker(&self, id_or_prefix: &str, worker_id: Option<&str>) -> MissionResult<Task> {
        self.require_current()?;
        let worker_id = worker_id.map(str::trim).filter(|w| !w.is_empty()).map(str::to_string);
        let (_, after) = self.tasks.update(id_or_prefix, |t| {
            t.worker_id.clone_from(&worker_id);
            t.updated_at = timestamp::now();
        })?;

        self.audit.record(AuditAction::TaskUpdated, json!({ "task_id": after.id, "worker_id": worker_id }));
        let message = match &worker_id {
            Some(worker) => format!("assign {} to {}", ids::short_id(&after.id), ids::short_id(worker)),
            None => format!("unassign {}", ids::short_id(&after.id)),
        };
        self.commit(CommitCategory::Worker, &message);
        Ok(after)
    }

    /// Tasks matching `filter`, in collection order.
    pub fn tasks(&self, filter: &TaskFilter) -> MissionResult<Vec<Task>> {
        self.require_current()?;
        let tasks = self.tasks.load()?;
        let index = graph::build_index(&tasks);
        Ok(tasks
            .iter()
            .filter(|t| filter.stage.is_none_or(|s| t.stage == s))
            .filter(|t| filter.status.is_none_or(|s| t.status == s))
            .filter(|t| !filter.ready_only || graph::is_ready(t, &index))
            .cloned()
            .collect())
    }

    pub fn task(&self, id_or_prefix: &str) -> MissionResult<Task> {
        self.require_current()?;
        self.tasks.find(id_or_prefix)
    }

    /// Tasks ready to start, in collection order.
    pub fn queue(&self) -> MissionResult<Vec<Task>> {
        self.tasks(&TaskFilter { ready_only: true, ..TaskFilter::default() })
    }

    /// Transitive dependencies of a task.
    pub fn deps(&self, id_or_prefix: &str) -> MissionResult<Vec<Task>> {
        self.require_current()?;
        let tasks = self.tasks.load()?;
        let index = graph::build_index(&tasks);
        let root = graph::find_by_prefix(&tasks, id_or_prefix)?;
        Ok(graph::collect_deps(root, &index).into_iter().cloned().collect())
    }

    /// Printable dependency tree of a task.
    pub fn dep_tree(&self, id_or_prefix: &str) -> MissionResult<String> {
        self.require_current()?;
        let tasks = self.tasks.load()?;
        let index = graph::build_index(&tasks);
        let root = graph::find_by_prefix(&tasks, id_or_prefix)?;
        Ok(graph::render_tree(root, &index))
    }

    /// Structural checks of the current stage. Empty means clean.
    pub fn validate_strict(&self) -> MissionResult<Vec<StrictFailure>> {
        self.require_current()?;
        let stage = self.ledger.read()?.current;
        let tasks = self.tasks.load()?;
        Ok(guard::strict_checks(stage, &task::in_stage(&tasks, stage)))
    }

    // -----------------------------------------------------------------------
    // Checkpoints and sessions
    // -----------------------------------------------------------------------

    pub fn checkpoint(&self) -> MissionResult<Checkpoint> {
        self.require_current()?;
        let cp = self.checkpoints.create(None)?;
        self.audit.record(
            AuditAction::CheckpointCreated,
            json!({ "checkpoint_id": cp.id, "stage": cp.stage, "session_id": cp.session_id }),
        );
        self.commit(CommitCategory::Checkpoint, &format!("checkpoint {}", cp.id));
        Ok(cp)
    }

    /// Close the current session and open a new one with a briefing.
    pub fn restart(&self, from: Option<&str>) -> MissionResult<RestartOutcome> {
        self.require_current()?;
        let compiler = BriefingCompiler::from_config(&self.config.briefing);
        let outcome = self.checkpoints.restart(from, &compiler)?;

        self.audit.record(
            AuditAction::CheckpointCreated,
            json!({
                "checkpoint_id": outcome.checkpoint_id,
                "stage": outcome.stage,
                "session_id": outcome.old_session,
            }),
        );
        self.audit.record(
            AuditAction::SessionEnded,
            json!({ "session_id": outcome.old_session, "checkpoint_id": outcome.checkpoint_id }),
        );
        self.audit.record(
            AuditAction::SessionStarted,
            json!({
                "session_id": outcome.new_session,
                "checkpoint_id": outcome.checkpoint_id,
                "stage": outcome.stage,
            }),
        );
        self.commit(
            CommitCategory::Checkpoint,
            &format!("session restart {} → {}", outcome.old_session, outcome.new_session),
        );
        Ok(outcome)
    }

    pub fn session_status(&self) -> MissionResult<SessionStatus> {
        self.require_current()?;
        self.checkpoints.status(timestamp::now(), &self.config.session)
    }

    pub fn session_history(&self) -> MissionResult<Vec<SessionRecord>> {
        self.checkpoints.sessions().history()
    }

    pub fn load_checkpoint(&self, id: &str) -> MissionResult<Checkpoint> {
        self.checkpoints.load(id)
    }

    pub fn list_checkpoints(&self) -> MissionResult<Vec<String>> {
        self.checkpoints.list()
    }

    pub fn record_decision(&self, text: &str) -> MissionResult<()> {
        self.checkpoints.record_decision(text)?;
        self.commit(CommitCategory::Checkpoint, "record decision");
        Ok(())
    }

    pub fn record_blocker(&self, text: &str) -> MissionResult<()> {
        self.checkpoints.record_blocker(text)?;
        self.commit(CommitCategory::Checkpoint, "record blocker");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Handoffs
    // -----------------------------------------------------------------------

    /// Validate and store the worker handoff report at `path`.
    ///
    /// The raw report is always stored. When it names a task, its findings
    /// are appended to the task's findings file, the task takes the reported
    /// status and a `complete` report drops a `DONE` marker. The task is
    /// resolved before anything is written, so an unknown task leaves no
    /// trace.
    pub fn handoff(&self, path: &Path) -> MissionResult<HandoffReceipt> {
        self.require_current()?;
        let raw = std::fs::read_to_string(path).map_err(|e| MissionError::io(path, e))?;
        let report = Handoff::from_json(path, &raw)?;

        let warnings = HandoffValidator::from_config(&self.config.handoff).check(path)?;
        let status = report.validate()?;
        let task = report.task().map(|id| self.tasks.find(id)).transpose()?;

        let stored_at = self.handoffs.store_raw(&report.worker_id, raw.as_bytes(), timestamp::now())?;

        let mut findings_path = None;
        if let Some(task) = &task {
            findings_path = Some(self.handoffs.append_findings(&task.id, &report.findings)?);

            let target = status.task_status();
            let (before, after) = self.tasks.update(&task.id, |t| t.set_status(target))?;
            let action = if target.is_terminal() { AuditAction::TaskCompleted } else { AuditAction::TaskUpdated };
            self.audit.record(
                action,
                json!({ "task_id": after.id, "old_status": before.status, "new_status": after.status }),
            );

            if status == HandoffStatus::Complete {
                self.handoffs.mark_done(&task.id)?;
            }
        }

        let task_id = task.map(|t| t.id);
        self.audit.record(
            AuditAction::HandoffReceived,
            json!({
                "task_id": task_id,
                "worker_id": report.worker_id,
                "status": status,
                "findings": report.findings.len(),
                "path": stored_at.display().to_string(),
            }),
        );
        self.commit(
            CommitCategory::Handoff,
            &format!("handoff: worker {}, status {status}", ids::short_id(&report.worker_id)),
        );
        tracing::info!(worker = %report.worker_id, status = %status, path = ?stored_at, "Handoff stored");

        Ok(HandoffReceipt {
            stored_at,
            status,
            task_id,
            findings_path,
            findings_recorded: report.findings.len(),
            warnings,
        })
    }

    /// Findings recorded for a task by its handoffs.
    pub fn findings(&self, id_or_prefix: &str) -> MissionResult<Vec<Finding>> {
        self.require_current()?;
        let task = self.tasks.find(id_or_prefix)?;
        self.handoffs.findings(&task.id)
    }

    // -----------------------------------------------------------------------
    // Scope and audit
    // -----------------------------------------------------------------------

    /// Check `files` against the scope of a task.
    pub fn scope_check(&self, id_or_prefix: &str, files: &[String]) -> MissionResult<ScopeReport> {
        self.require_current()?;
        let task = self.tasks.find(id_or_prefix)?;
        Ok(scope::validate_scope(&task, &self.config.scope.exempt_paths, files))
    }

    /// Files currently staged in the project's repository.
    #[cfg(feature = "git")]
    pub fn staged_files(&self) -> MissionResult<Vec<String>> {
        let repo = crate::git::GitRepository::discover(&self.layout.project_root)
            .ok_or_else(|| MissionError::NoRepository(self.layout.project_root.clone()))?;
        Ok(repo.staged_files()?)
    }

    /// The last `n` audit entries.
    pub fn audit_tail(&self, n: usize) -> MissionResult<Vec<AuditEntry>> {
        self.audit.tail(n)
    }

    pub fn mission_dir(&self) -> PathBuf {
        self.layout.mission_dir.clone()
    }
}
