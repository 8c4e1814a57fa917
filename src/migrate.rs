//! Readers for older on-disk formats.
//!
//! Three generations are handled here so the rest of the crate only sees
//! current shapes:
//!
//! - gates with plain-string criteria (decoded on every read, rewritten in
//!   the current schema on the next save)
//! - `state/tasks.json` holding `{"tasks": [...]}` (converted to JSON lines
//!   on first read, original renamed to `tasks.json.migrated`)
//! - phase-based missions with `state/phase.json` (upgraded explicitly by
//!   [`migrate_phase_project`])

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{MissionError, MissionResult};
use crate::gate::{Criterion, Gate, GateRegistry, GateStatus, GateStore};
use crate::layout::Layout;
use crate::stage::{Stage, StageLedger};
use crate::task::{Task, TaskStore};
use crate::{fsutil, timestamp};

/// Suffix given to files that have been migrated.
pub const MIGRATED_SUFFIX: &str = ".migrated";

// ---------------------------------------------------------------------------
// Gates
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct GatesV2 {
    #[serde(default)]
    gates: BTreeMap<Stage, GateV2>,
}

#[derive(Debug, Deserialize)]
struct GateV2 {
    #[serde(default)]
    stage: Option<Stage>,
    #[serde(default)]
    status: GateStatus,
    #[serde(default)]
    criteria: Vec<Criterion>,
    #[serde(default, deserialize_with = "timestamp::rfc3339_opt::deserialize")]
    approved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    approval_note: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GatesV1 {
    #[serde(default)]
    gates: BTreeMap<Stage, GateV1>,
}

#[derive(Debug, Deserialize)]
struct GateV1 {
    #[serde(default)]
    stage: Option<Stage>,
    #[serde(default)]
    status: GateStatus,
    #[serde(default)]
    criteria: Vec<String>,
    #[serde(default, deserialize_with = "timestamp::rfc3339_opt::deserialize")]
    approved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    approval_note: Option<String>,
}

/// A decoded `gates.json`, tagged by schema generation.
#[derive(Debug)]
enum GateSchema {
    /// Criteria are `{description, satisfied}` objects.
    V2(GatesV2),
    /// Criteria are plain strings, implicitly unsatisfied.
    V1(GatesV1),
}

impl GateSchema {
    /// Try the current schema first, then the legacy one. If neither fits,
    /// the current-schema error is reported.
    fn detect(content: &str) -> Result<Self, serde_json::Error> {
        match serde_json::from_str::<GatesV2>(content) {
            Ok(v2) => Ok(Self::V2(v2)),
            Err(v2_err) => match serde_json::from_str::<GatesV1>(content) {
                Ok(v1) => {
                    tracing::debug!("Decoded gates with legacy string criteria");
                    Ok(Self::V1(v1))
                }
                Err(_) => Err(v2_err),
            },
        }
    }

    fn normalize(self) -> BTreeMap<Stage, Gate> {
        match self {
            Self::V2(file) => file
                .gates
                .into_iter()
                .map(|(key, g)| {
                    let gate = Gate {
                        stage: g.stage.unwrap_or(key),
                        status: g.status,
                        criteria: g.criteria,
                        approved_at: g.approved_at,
                        approval_note: non_empty(g.approval_note),
                    };
                    (key, gate)
                })
                .collect(),
            Self::V1(file) => file
                .gates
                .into_iter()
                .map(|(key, g)| {
                    let gate = Gate {
                        stage: g.stage.unwrap_or(key),
                        status: g.status,
                        criteria: g.criteria.into_iter().map(Criterion::new).collect(),
                        approved_at: g.approved_at,
                        approval_note: non_empty(g.approval_note),
                    };
                    (key, gate)
                })
                .collect(),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Decode `gates.json` content of either schema generation.
pub fn decode_gates(content: &str) -> Result<BTreeMap<Stage, Gate>, serde_json::Error> {
    GateSchema::detect(content).map(GateSchema::normalize)
}

/// Serde hook for a bare stage-to-gate map of either generation, as embedded
/// in checkpoints.
pub fn deserialize_gate_map<'de, D>(deserializer: D) -> Result<BTreeMap<Stage, Gate>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let gates = Value::deserialize(deserializer)?;
    let wrapped = serde_json::json!({ "gates": gates }).to_string();
    decode_gates(&wrapped).map_err(serde::de::Error::custom)
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// Map a phase name from the phase-based layout to a stage.
pub fn phase_to_stage(phase: &str) -> Stage {
    match phase {
        "idea" => Stage::Discovery,
        "design" => Stage::Design,
        "implement" => Stage::Implement,
        "verify" => Stage::Verify,
        "document" => Stage::Document,
        "release" => Stage::Release,
        other => other.parse().unwrap_or(Stage::Discovery),
    }
}

/// Rewrite one legacy task object into the current field layout.
fn upgrade_task_value(mut object: Map<String, Value>, now: &str) -> Map<String, Value> {
    if let Some(Value::String(phase)) = object.remove("phase") {
        object.entry("stage").or_insert_with(|| Value::String(phase_to_stage(&phase).to_string()));
    }
    for field in ["created_at", "updated_at"] {
        let missing = object.get(field).and_then(Value::as_str).is_none_or(|s| s.trim().is_empty());
        if missing {
            object.insert(field.to_string(), Value::String(now.to_string()));
        }
    }
    object
}

/// Decode the legacy `{"tasks": [...]}` document.
fn decode_legacy_tasks(path: &Path, content: &str) -> MissionResult<Vec<Task>> {
    let root: Value = serde_json::from_str(content).map_err(|e| MissionError::corrupt(path, e))?;
    let items = match root.get("tasks") {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::Null) | None => Vec::new(),
        Some(_) => {
            let err = <serde_json::Error as serde::de::Error>::custom("\"tasks\" must be an array");
            return Err(MissionError::corrupt(path, err));
        }
    };

    let now = timestamp::format(&timestamp::now());
    items
        .into_iter()
        .map(|item| {
            let value = match item {
                Value::Object(object) => Value::Object(upgrade_task_value(object, &now)),
                other => other,
            };
            serde_json::from_value(value).map_err(|e| MissionError::corrupt(path, e))
        })
        .collect()
}

/// Convert a legacy `tasks.json` into the store's JSON-lines file and rename
/// the original with [`MIGRATED_SUFFIX`].
pub fn migrate_legacy_tasks(legacy_path: &Path, store: &TaskStore) -> MissionResult<Vec<Task>> {
    let content = fs::read_to_string(legacy_path).map_err(|e| MissionError::io(legacy_path, e))?;
    let tasks = decode_legacy_tasks(legacy_path, &content)?;
    store.save(&tasks)?;

    let renamed = migrated_path(legacy_path);
    fs::rename(legacy_path, &renamed).map_err(|e| MissionError::io(legacy_path, e))?;
    tracing::info!(count = tasks.len(), from = ?legacy_path, "Migrated tasks to JSON lines");
    Ok(tasks)
}

fn migrated_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(MIGRATED_SUFFIX);
    PathBuf::from(name)
}

// ---------------------------------------------------------------------------
// Phase-based missions
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PhaseState {
    current: String,
}

/// What [`migrate_phase_project`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseMigration {
    pub from_phase: String,
    pub to_stage: Stage,
    pub tasks_migrated: usize,
}

/// Upgrade a phase-based mission to the stage layout.
///
/// Writes `stage.json`, regenerates default gates for all stages, converts
/// tasks, creates the checkpoint directory and removes `phase.json`.
pub fn migrate_phase_project(layout: &Layout) -> MissionResult<PhaseMigration> {
    let ledger = StageLedger::new(&layout.state_dir);
    if ledger.exists() {
        return Err(MissionError::NothingToMigrate(
            "already a stage-based project (stage.json exists)".to_string(),
        ));
    }
    let phase_path = layout.phase_path();
    if !phase_path.exists() {
        return Err(MissionError::NothingToMigrate("no phase.json found".to_string()));
    }

    let phase: PhaseState = fsutil::read_json(&phase_path)?;
    let to_stage = phase_to_stage(&phase.current);

    ledger.enter(to_stage)?;
    GateStore::new(&layout.state_dir).write(&GateRegistry::with_defaults())?;

    let store = TaskStore::new(&layout.state_dir);
    let legacy_tasks = layout.state_dir.join("tasks.json");
    let tasks_migrated = if legacy_tasks.exists() {
        match migrate_legacy_tasks(&legacy_tasks, &store) {
            Ok(tasks) => tasks.len(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to migrate tasks; leaving tasks.json in place");
                0
            }
        }
    } else {
        0
    };

    fsutil::ensure_dir(&layout.checkpoints_dir)?;
    fs::remove_file(&phase_path).map_err(|e| MissionError::io(&phase_path, e))?;

    tracing::info!(phase = %phase.current, stage = %to_stage, "Migrated phase-based mission");
    Ok(PhaseMigration { from_phase: phase.current, to_stage, tasks_migrated })
}
