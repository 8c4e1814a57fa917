//! Checkpoints and session continuity.
//!
//! A checkpoint is an immutable snapshot of the stage, tasks and gates plus
//! the free-form decision and blocker notes. Creating one only reads live
//! state; the files it writes all live under `orchestrator/`.

pub mod briefing;
pub mod session;

use std::collections::BTreeMap;
use std::fs;
use std::io;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::SessionConfig;
use crate::error::{MissionError, MissionResult};
use crate::gate::{Gate, GateStore};
use crate::layout::Layout;
use crate::stage::{Stage, StageLedger};
use crate::task::{Task, TaskStore};
use crate::{fsutil, ids, migrate, timestamp};

pub use briefing::{Briefing, BriefingCompiler, BriefingSource};
pub use session::{Health, SessionLog, SessionRecord, SessionStatus};

/// Upper bound on `-N` suffixes tried for one second's checkpoint id.
const MAX_ID_SUFFIX: u32 = 1000;

/// Point-in-time snapshot of mission state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub stage: Stage,
    #[serde(with = "timestamp::rfc3339")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub session_id: String,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default, deserialize_with = "migrate::deserialize_gate_map")]
    pub gates: BTreeMap<Stage, Gate>,
    #[serde(default)]
    pub decisions: Vec<String>,
    #[serde(default)]
    pub blockers: Vec<String>,
}

/// Content of `orchestrator/current.json`: the latest checkpoint and the
/// session it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentPointer {
    pub checkpoint_id: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(with = "timestamp::rfc3339")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub briefing: Option<String>,
}

/// Result of closing one session and opening the next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestartOutcome {
    pub old_session: String,
    pub new_session: String,
    pub checkpoint_id: String,
    pub stage: Stage,
    pub briefing: String,
    pub briefing_source: BriefingSource,
}

/// Reads and writes checkpoints, the current pointer, session records and
/// the decision/blocker notes.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    layout: Layout,
    ledger: StageLedger,
    tasks: TaskStore,
    gates: GateStore,
    sessions: SessionLog,
}

impl CheckpointStore {
    pub fn new(layout: &Layout) -> Self {
        Self {
            layout: layout.clone(),
            ledger: StageLedger::new(&layout.state_dir),
            tasks: TaskStore::new(&layout.state_dir),
            gates: GateStore::new(&layout.state_dir),
            sessions: SessionLog::new(layout.sessions_path()),
        }
    }

    pub fn sessions(&self) -> &SessionLog {
        &self.sessions
    }

    /// Snapshot live state into a new checkpoint and point `current.json`
    /// at it.
    ///
    /// An empty or missing `session_id` means the current pointer's session,
    /// or a fresh id when there is none.
    pub fn create(&self, session_id: Option<&str>) -> MissionResult<Checkpoint> {
        let session_id = match session_id.filter(|s| !s.is_empty()) {
            Some(id) => id.to_string(),
            None => self.current_session_id()?.unwrap_or_else(ids::session_id),
        };

        let created_at = timestamp::now();
        let mut checkpoint = Checkpoint {
            id: ids::checkpoint_id(&created_at),
            stage: self.ledger.read()?.current,
            created_at,
            session_id,
            tasks: self.tasks.load()?,
            gates: self.gates.read()?.into_gates(),
            decisions: self.decisions()?,
            blockers: self.blockers()?,
        };

        self.write_new(&mut checkpoint)?;
        self.write_pointer(&CurrentPointer {
            checkpoint_id: checkpoint.id.clone(),
            session_id: checkpoint.session_id.clone(),
            created_at,
            briefing: None,
        })?;

        tracing::info!(checkpoint = %checkpoint.id, stage = %checkpoint.stage, "Checkpoint created");
        Ok(checkpoint)
    }

    /// Write `checkpoint` under a file name nobody has used yet, suffixing
    /// the id with `-1`, `-2`, ... on collision.
    fn write_new(&self, checkpoint: &mut Checkpoint) -> MissionResult<()> {
        let base = checkpoint.id.clone();
        for n in 0..MAX_ID_SUFFIX {
            if n > 0 {
                checkpoint.id = format!("{base}-{n}");
            }
            let path = self.layout.checkpoints_dir.join(format!("{}.json", checkpoint.id));
            let mut content = serde_json::to_string_pretty(checkpoint)
                .map_err(|source| MissionError::Encode { path: path.clone(), source })?;
            content.push('\n');
            if fsutil::write_new(&path, content.as_bytes())? {
                return Ok(());
            }
        }
        Err(MissionError::io(
            &self.layout.checkpoints_dir,
            io::Error::new(io::ErrorKind::AlreadyExists, format!("no free checkpoint id for {base}")),
        ))
    }

    /// Ids of every checkpoint, oldest first.
    pub fn list(&self) -> MissionResult<Vec<String>> {
        let dir = &self.layout.checkpoints_dir;
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(MissionError::io(dir, e)),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| MissionError::io(dir, e))?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(id) = name.strip_suffix(".json") {
                if !id.starts_with('.') {
                    ids.push(id.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Load a checkpoint by exact id, or by a substring matching exactly one id.
    pub fn load(&self, query: &str) -> MissionResult<Checkpoint> {
        let query = query.trim();
        if query.is_empty() {
            return Err(MissionError::MissingField("checkpoint id"));
        }

        let exact = self.layout.checkpoints_dir.join(format!("{query}.json"));
        if exact.exists() {
            return fsutil::read_json(&exact);
        }

        let matches: Vec<String> = self.list()?.into_iter().filter(|id| id.contains(query)).collect();
        match matches.as_slice() {
            [] => Err(MissionError::CheckpointNotFound(query.to_string())),
            [id] => fsutil::read_json(&self.layout.checkpoints_dir.join(format!("{id}.json"))),
            _ => Err(MissionError::AmbiguousCheckpoint { query: query.to_string(), candidates: matches }),
        }
    }

    pub fn current_pointer(&self) -> MissionResult<Option<CurrentPointer>> {
        fsutil::read_json_optional(&self.layout.current_path())
    }

    fn write_pointer(&self, pointer: &CurrentPointer) -> MissionResult<()> {
        fsutil::write_json(&self.layout.current_path(), pointer)
    }

    /// Session id recorded in the current pointer, if any.
    pub fn current_session_id(&self) -> MissionResult<Option<String>> {
        Ok(self.current_pointer()?.map(|p| p.session_id).filter(|id| !id.is_empty()))
    }

    pub fn decisions(&self) -> MissionResult<Vec<String>> {
        Ok(fsutil::read_json_optional(&self.layout.decisions_path())?.unwrap_or_default())
    }

    pub fn blockers(&self) -> MissionResult<Vec<String>> {
        Ok(fsutil::read_json_optional(&self.layout.blockers_path())?.unwrap_or_default())
    }

    pub fn record_decision(&self, text: &str) -> MissionResult<()> {
        let mut decisions = self.decisions()?;
        decisions.push(non_empty(text, "decision")?);
        fsutil::write_json(&self.layout.decisions_path(), &decisions)
    }

    pub fn record_blocker(&self, text: &str) -> MissionResult<()> {
        let mut blockers = self.blockers()?;
        blockers.push(non_empty(text, "blocker")?);
        fsutil::write_json(&self.layout.blockers_path(), &blockers)
    }

    /// End the current session with a final checkpoint and open a new one.
    ///
    /// The briefing summarizes the checkpoint named by `from` when given,
    /// otherwise the one just created. `from` is resolved before anything is
    /// written.
    pub fn restart(&self, from: Option<&str>, compiler: &BriefingCompiler) -> MissionResult<RestartOutcome> {
        let from = from.map(str::trim).filter(|s| !s.is_empty()).map(|id| self.load(id)).transpose()?;

        let old_session = self.current_session_id()?.unwrap_or_else(ids::session_id);
        let checkpoint = self.create(Some(&old_session))?;
        let briefing = compiler.compile(from.as_ref().unwrap_or(&checkpoint), &self.layout.orchestrator_dir);

        let now = timestamp::now();
        let new_session = ids::session_id();
        self.sessions.append(&SessionRecord::closed(
            &old_session,
            &checkpoint.id,
            checkpoint.stage,
            now,
            session::RESTART_REASON,
        ))?;
        self.sessions.append(&SessionRecord::opened(&new_session, &checkpoint.id, checkpoint.stage, now))?;

        self.write_pointer(&CurrentPointer {
            checkpoint_id: checkpoint.id.clone(),
            session_id: new_session.clone(),
            created_at: now,
            briefing: Some(briefing.text.clone()),
        })?;

        tracing::info!(old = %old_session, new = %new_session, checkpoint = %checkpoint.id, "Session restarted");
        Ok(RestartOutcome {
            old_session,
            new_session,
            checkpoint_id: checkpoint.id,
            stage: checkpoint.stage,
            briefing: briefing.text,
            briefing_source: briefing.source,
        })
    }

    /// Health of the running session as of `now`.
    pub fn status(&self, now: DateTime<Utc>, thresholds: &SessionConfig) -> MissionResult<SessionStatus> {
        let stage = self.ledger.read()?.current;
        let tasks = self.tasks.load()?;
        let open = self.sessions.open_session()?;

        let session_id = match self.current_session_id()? {
            Some(id) => Some(id),
            None => open.as_ref().map(|r| r.session_id.clone()),
        };
        let (session_start, duration_minutes, health) =
            SessionStatus::measure(open.and_then(|r| r.started_at), now, thresholds);

        Ok(SessionStatus {
            session_id,
            stage,
            session_start,
            duration_minutes,
            last_checkpoint: self.list()?.pop(),
            tasks_total: tasks.len(),
            tasks_done: tasks.iter().filter(|t| t.is_done()).count(),
            health,
            recommendation: health.recommendation().to_string(),
        })
    }
}

fn non_empty(text: &str, field: &'static str) -> MissionResult<String> {
    let text = text.trim();
    if text.is_empty() {
        return Err(MissionError::MissingField(field));
    }
    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::{GateRegistry, GateStatus};
    use crate::task::TaskStatus;
    use chrono::Duration;
    use tempfile::TempDir;

    fn mission() -> (TempDir, Layout, CheckpointStore) {
        let dir = TempDir::new().unwrap();
        let layout = Layout::new(dir.path());
        StageLedger::new(&layout.state_dir).enter(Stage::Goal).unwrap();
        TaskStore::new(&layout.state_dir).save(&[]).unwrap();
        GateStore::new(&layout.state_dir).write(&GateRegistry::with_defaults()).unwrap();
        let store = CheckpointStore::new(&layout);
        (dir, layout, store)
    }

    #[test]
    fn test_create_snapshots_state() {
        let (_dir, layout, store) = mission();
        TaskStore::new(&layout.state_dir).insert(Task::new("Define goal", Stage::Goal, "", "pm")).unwrap();
        store.record_decision("Ship the CLI first").unwrap();

        let cp = store.create(None).unwrap();
        assert!(cp.id.starts_with("cp-"));
        assert_eq!(cp.stage, Stage::Goal);
        assert_eq!(cp.tasks.len(), 1);
        assert_eq!(cp.gates.len(), 10);
        assert_eq!(cp.decisions, vec!["Ship the CLI first"]);
        assert_eq!(cp.session_id.len(), 8);

        let pointer = store.current_pointer().unwrap().unwrap();
        assert_eq!(pointer.checkpoint_id, cp.id);
        assert_eq!(pointer.session_id, cp.session_id);

        // The next checkpoint keeps the session
        let again = store.create(None).unwrap();
        assert_eq!(again.session_id, cp.session_id);
    }

    #[test]
    fn test_same_second_ids_get_suffixes() {
        let (_dir, _layout, store) = mission();
        let a = store.create(Some("s1")).unwrap();
        let b = store.create(Some("s1")).unwrap();
        let c = store.create(Some("s1")).unwrap();
        assert_ne!(a.id, b.id);
        assert_ne!(b.id, c.id);
        assert_eq!(store.list().unwrap().len(), 3);

        // Earlier files are untouched
        assert_eq!(store.load(&a.id).unwrap(), a);
    }

    #[test]
    fn test_checkpoint_does_not_follow_live_state() {
        let (_dir, layout, store) = mission();
        let cp = store.create(None).unwrap();

        StageLedger::new(&layout.state_dir).enter(Stage::Requirements).unwrap();
        let gates = GateStore::new(&layout.state_dir);
        let mut registry = gates.read().unwrap();
        registry.approve(Stage::Goal, "done", timestamp::now()).unwrap();
        gates.write(&registry).unwrap();

        let loaded = store.load(&cp.id).unwrap();
        assert_eq!(loaded.stage, Stage::Goal);
        assert_eq!(loaded.gates[&Stage::Goal].status, GateStatus::Pending);
    }

    #[test]
    fn test_load_by_substring() {
        let (_dir, _layout, store) = mission();
        let cp = store.create(Some("s1")).unwrap();

        let tail = &cp.id[cp.id.len() - 6..];
        assert_eq!(store.load(tail).unwrap().id, cp.id);
        assert!(matches!(store.load("nope").unwrap_err(), MissionError::CheckpointNotFound(_)));

        store.create(Some("s1")).unwrap();
        assert!(matches!(store.load("cp-").unwrap_err(), MissionError::AmbiguousCheckpoint { .. }));
    }

    #[test]
    fn test_restart_rotates_session() {
        let (_dir, _layout, store) = mission();
        let first = store.create(None).unwrap();

        let outcome = store.restart(None, &BriefingCompiler::fallback_only()).unwrap();
        assert_eq!(outcome.old_session, first.session_id);
        assert_ne!(outcome.new_session, outcome.old_session);
        assert_eq!(outcome.briefing_source, BriefingSource::Fallback);
        assert!(outcome.briefing.contains("**Previous Session:**"));

        let history = store.sessions().history().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].session_id, outcome.old_session);
        assert!(history[0].ended_at.is_some());
        assert_eq!(history[1].session_id, outcome.new_session);
        assert!(history[1].started_at.is_some());

        let pointer = store.current_pointer().unwrap().unwrap();
        assert_eq!(pointer.session_id, outcome.new_session);
        assert_eq!(pointer.checkpoint_id, outcome.checkpoint_id);
        assert_eq!(pointer.briefing.as_deref(), Some(outcome.briefing.as_str()));

        let status = store.status(timestamp::now(), &SessionConfig::default()).unwrap();
        assert_eq!(status.session_id.as_deref(), Some(outcome.new_session.as_str()));
        assert_eq!(status.health, Health::Green);
    }

    #[test]
    fn test_restart_from_unknown_checkpoint_writes_nothing() {
        let (_dir, _layout, store) = mission();
        let err = store.restart(Some("cp-19990101"), &BriefingCompiler::fallback_only()).unwrap_err();
        assert!(matches!(err, MissionError::CheckpointNotFound(_)));
        assert!(store.list().unwrap().is_empty());
        assert!(store.sessions().history().unwrap().is_empty());
    }

    #[test]
    fn test_restart_briefs_from_older_checkpoint() {
        let (_dir, _layout, store) = mission();
        store.record_blocker("Waiting on API keys").unwrap();
        let old = store.create(Some("s1")).unwrap();

        let outcome = store.restart(Some(&old.id), &BriefingCompiler::fallback_only()).unwrap();
        assert_ne!(outcome.checkpoint_id, old.id);
        assert!(outcome.briefing.contains("Waiting on API keys"));
    }

    #[test]
    fn test_status_health_from_open_session() {
        let (_dir, _layout, store) = mission();
        let started = timestamp::now() - Duration::minutes(90);
        store.sessions().append(&SessionRecord::opened("abcd1234", "cp-x", Stage::Goal, started)).unwrap();

        let mut tasks = vec![Task::new("a", Stage::Goal, "", ""), Task::new("b", Stage::Goal, "", "")];
        tasks[0].set_status(TaskStatus::Done);
        TaskStore::new(&store.layout.state_dir).save(&tasks).unwrap();

        let status = store.status(timestamp::now(), &SessionConfig::default()).unwrap();
        assert_eq!(status.session_id.as_deref(), Some("abcd1234"));
        assert_eq!(status.health, Health::Yellow);
        assert_eq!(status.tasks_total, 2);
        assert_eq!(status.tasks_done, 1);
        assert!(status.last_checkpoint.is_none());
    }

    #[test]
    fn test_empty_notes_rejected() {
        let (_dir, _layout, store) = mission();
        assert!(store.record_decision("   ").unwrap_err().is_validation());
        assert!(store.blockers().unwrap().is_empty());
    }
}
