//! Per-stage gates: criteria that must be satisfied and a one-time approval.
//!
//! Gates live in `state/gates.json` as `{"gates": {"<stage>": Gate}}`. Older
//! files with plain-string criteria are decoded by [`crate::migrate`]; this
//! module only ever sees the current shape.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MissionError, MissionResult};
use crate::stage::Stage;
use crate::{fsutil, migrate, timestamp};

/// Approval state of a gate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateStatus {
    #[default]
    Pending,
    Approved,
}

impl GateStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
        }
    }
}

impl std::fmt::Display for GateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One independently satisfiable condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criterion {
    pub description: String,
    #[serde(default)]
    pub satisfied: bool,
}

impl Criterion {
    pub fn new(description: impl Into<String>) -> Self {
        Self { description: description.into(), satisfied: false }
    }
}

/// The gate guarding the exit of one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gate {
    pub stage: Stage,

    #[serde(default)]
    pub status: GateStatus,

    #[serde(default)]
    pub criteria: Vec<Criterion>,

    #[serde(default, skip_serializing_if = "Option::is_none", with = "timestamp::rfc3339_opt")]
    pub approved_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_note: Option<String>,
}

impl Gate {
    /// A pending gate with unsatisfied criteria.
    pub fn new<I, S>(stage: Stage, criteria: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            stage,
            status: GateStatus::Pending,
            criteria: criteria.into_iter().map(Criterion::new).collect(),
            approved_at: None,
            approval_note: None,
        }
    }

    /// A pending gate with the built-in criteria for `stage`.
    pub fn with_defaults(stage: Stage) -> Self {
        Self::new(stage, default_criteria(stage).iter().copied())
    }

    pub fn is_approved(&self) -> bool {
        self.status == GateStatus::Approved
    }

    /// At least one criterion, and all of them satisfied.
    pub fn all_met(&self) -> bool {
        !self.criteria.is_empty() && self.criteria.iter().all(|c| c.satisfied)
    }

    /// Descriptions of unsatisfied criteria.
    pub fn unmet(&self) -> Vec<String> {
        self.criteria.iter().filter(|c| !c.satisfied).map(|c| c.description.clone()).collect()
    }

    pub fn satisfied_count(&self) -> usize {
        self.criteria.iter().filter(|c| c.satisfied).count()
    }
}

/// Built-in criteria for each stage.
pub fn default_criteria(stage: Stage) -> &'static [&'static str] {
    match stage {
        Stage::Discovery => &["Problem space explored", "Stakeholders identified"],
        Stage::Goal => &["Goal statement defined", "Success metrics established"],
        Stage::Requirements => &["Requirements documented", "Acceptance criteria defined"],
        Stage::Planning => &["Tasks broken down", "Dependencies mapped"],
        Stage::Design => &["Spec document complete", "Technical approach approved"],
        Stage::Implement => &["All tasks complete", "Code compiles"],
        Stage::Verify => &["Tests passing", "Review complete"],
        Stage::Validate => &["Acceptance criteria met", "Stakeholder sign-off"],
        Stage::Document => &["README updated", "API documented"],
        Stage::Release => &["Deployed successfully", "Smoke tests pass"],
    }
}

/// On-disk shape of `gates.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatesFile {
    #[serde(default)]
    pub gates: BTreeMap<Stage, Gate>,
}

/// All gates of a mission, keyed by stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GateRegistry {
    gates: BTreeMap<Stage, Gate>,
}

impl GateRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with a default gate for every stage.
    pub fn with_defaults() -> Self {
        Self { gates: Stage::ALL.into_iter().map(|s| (s, Gate::with_defaults(s))).collect() }
    }

    pub fn from_gates(gates: BTreeMap<Stage, Gate>) -> Self {
        Self { gates }
    }

    pub fn gates(&self) -> &BTreeMap<Stage, Gate> {
        &self.gates
    }

    pub fn into_gates(self) -> BTreeMap<Stage, Gate> {
        self.gates
    }

    pub fn get(&self, stage: Stage) -> Option<&Gate> {
        self.gates.get(&stage)
    }

    pub fn insert(&mut self, gate: Gate) {
        self.gates.insert(gate.stage, gate);
    }

    /// Insert the default gate for `stage` if it has none. Returns whether
    /// anything was added.
    pub fn ensure_stage(&mut self, stage: Stage) -> bool {
        if self.gates.contains_key(&stage) {
            return false;
        }
        self.gates.insert(stage, Gate::with_defaults(stage));
        true
    }

    fn gate_mut(&mut self, stage: Stage) -> MissionResult<&mut Gate> {
        self.gates.get_mut(&stage).ok_or(MissionError::GateNotFound(stage))
    }

    /// Mark the criterion matching `query` as satisfied and return its
    /// description.
    ///
    /// An exact description match wins. Otherwise exactly one description
    /// must contain `query`; an empty query therefore only works for a gate
    /// with a single criterion. Satisfying twice is fine.
    pub fn satisfy_criterion(&mut self, stage: Stage, query: &str) -> MissionResult<String> {
        let gate = self.gate_mut(stage)?;

        if let Some(criterion) = gate.criteria.iter_mut().find(|c| c.description == query) {
            criterion.satisfied = true;
            return Ok(criterion.description.clone());
        }

        let matches: Vec<usize> = gate
            .criteria
            .iter()
            .enumerate()
            .filter(|(_, c)| c.description.contains(query))
            .map(|(i, _)| i)
            .collect();

        match matches.as_slice() {
            [] => Err(MissionError::NoCriterionMatch { stage, query: query.to_string() }),
            [i] => {
                let criterion = &mut gate.criteria[*i];
                criterion.satisfied = true;
                Ok(criterion.description.clone())
            }
            _ => Err(MissionError::AmbiguousCriterion {
                stage,
                query: query.to_string(),
                candidates: matches.iter().map(|i| gate.criteria[*i].description.clone()).collect(),
            }),
        }
    }

    /// Satisfy every criterion of `stage`. Returns how many there are.
    pub fn satisfy_all(&mut self, stage: Stage) -> MissionResult<usize> {
        let gate = self.gate_mut(stage)?;
        for criterion in &mut gate.criteria {
            criterion.satisfied = true;
        }
        Ok(gate.criteria.len())
    }

    /// Whether `stage` has a gate with at least one criterion, all satisfied.
    pub fn all_criteria_met(&self, stage: Stage) -> bool {
        self.get(stage).is_some_and(Gate::all_met)
    }

    /// Descriptions of unsatisfied criteria; empty if the stage has no gate.
    pub fn unmet_criteria(&self, stage: Stage) -> Vec<String> {
        self.get(stage).map(Gate::unmet).unwrap_or_default()
    }

    /// Record approval of the gate for `stage`.
    ///
    /// Only the gate itself is checked here; the caller makes sure `stage` is
    /// the current one.
    pub fn approve(&mut self, stage: Stage, note: &str, at: DateTime<Utc>) -> MissionResult<&Gate> {
        let note = note.trim();
        if note.is_empty() {
            return Err(MissionError::MissingField("--note (explain why you're approving this gate)"));
        }
        let gate = self.gate_mut(stage)?;
        if gate.is_approved() {
            return Err(MissionError::AlreadyApproved(stage));
        }
        gate.status = GateStatus::Approved;
        gate.approved_at = Some(at);
        gate.approval_note = Some(note.to_string());
        Ok(&*gate)
    }

    /// Stage names of approved and not-yet-approved gates, each alphabetical.
    pub fn partition_names(&self) -> (Vec<String>, Vec<String>) {
        partition_names(&self.gates)
    }
}

/// Split gate stage names into (approved, pending), each sorted alphabetically.
pub fn partition_names(gates: &BTreeMap<Stage, Gate>) -> (Vec<String>, Vec<String>) {
    let (mut approved, mut pending): (Vec<String>, Vec<String>) = (Vec::new(), Vec::new());
    for (stage, gate) in gates {
        if gate.is_approved() {
            approved.push(stage.to_string());
        } else {
            pending.push(stage.to_string());
        }
    }
    approved.sort();
    pending.sort();
    (approved, pending)
}

/// Loads and saves `state/gates.json`.
#[derive(Debug, Clone)]
pub struct GateStore {
    path: PathBuf,
}

impl GateStore {
    pub fn new(state_dir: &Path) -> Self {
        Self { path: state_dir.join("gates.json") }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the registry, accepting either schema generation. A missing file
    /// is an empty registry.
    pub fn read(&self) -> MissionResult<GateRegistry> {
        match fsutil::read_optional(&self.path)? {
            Some(content) => migrate::decode_gates(&content)
                .map(GateRegistry::from_gates)
                .map_err(|e| MissionError::corrupt(&self.path, e)),
            None => Ok(GateRegistry::new()),
        }
    }

    /// Save the registry in the current schema.
    pub fn write(&self, registry: &GateRegistry) -> MissionResult<()> {
        let file = GatesFile { gates: registry.gates.clone() };
        fsutil::write_json(&self.path, &file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registry_with(stage: Stage, criteria: &[&str]) -> GateRegistry {
        let mut registry = GateRegistry::new();
        registry.insert(Gate::new(stage, criteria.iter().copied()));
        registry
    }

    #[test]
    fn test_defaults_cover_every_stage() {
        let registry = GateRegistry::with_defaults();
        for stage in Stage::ALL {
            let gate = registry.get(stage).unwrap();
            assert_eq!(gate.criteria.len(), 2);
            assert!(!gate.all_met());
            assert_eq!(gate.status, GateStatus::Pending);
        }
    }

    #[test]
    fn test_exact_match_short_circuits() {
        let mut registry = registry_with(Stage::Verify, &["Tests", "Tests passing"]);
        let desc = registry.satisfy_criterion(Stage::Verify, "Tests").unwrap();
        assert_eq!(desc, "Tests");
        assert_eq!(registry.get(Stage::Verify).unwrap().satisfied_count(), 1);
    }

    #[test]
    fn test_substring_match() {
        let mut registry = GateRegistry::with_defaults();
        let desc = registry.satisfy_criterion(Stage::Verify, "Review").unwrap();
        assert_eq!(desc, "Review complete");
        assert!(!registry.all_criteria_met(Stage::Verify));

        registry.satisfy_criterion(Stage::Verify, "passing").unwrap();
        assert!(registry.all_criteria_met(Stage::Verify));
    }

    #[test]
    fn test_resatisfy_is_idempotent() {
        let mut registry = GateRegistry::with_defaults();
        registry.satisfy_criterion(Stage::Goal, "Goal statement").unwrap();
        registry.satisfy_criterion(Stage::Goal, "Goal statement").unwrap();
        assert_eq!(registry.get(Stage::Goal).unwrap().satisfied_count(), 1);
    }

    #[test]
    fn test_no_match_and_ambiguity() {
        let mut registry = GateRegistry::with_defaults();

        let err = registry.satisfy_criterion(Stage::Implement, "nothing like it").unwrap_err();
        assert!(matches!(err, MissionError::NoCriterionMatch { .. }));

        let err = registry.satisfy_criterion(Stage::Implement, "o").unwrap_err();
        match err {
            MissionError::AmbiguousCriterion { candidates, .. } => {
                assert_eq!(candidates, vec!["All tasks complete", "Code compiles"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(registry.get(Stage::Implement).unwrap().satisfied_count(), 0);
    }

    #[test]
    fn test_empty_query() {
        let mut two = GateRegistry::with_defaults();
        assert!(matches!(
            two.satisfy_criterion(Stage::Design, ""),
            Err(MissionError::AmbiguousCriterion { .. })
        ));

        let mut one = registry_with(Stage::Design, &["Only one"]);
        assert_eq!(one.satisfy_criterion(Stage::Design, "").unwrap(), "Only one");
        assert!(one.all_criteria_met(Stage::Design));
    }

    #[test]
    fn test_zero_criteria_never_met() {
        let mut registry = registry_with(Stage::Planning, &[]);
        assert!(!registry.all_criteria_met(Stage::Planning));
        assert_eq!(registry.satisfy_all(Stage::Planning).unwrap(), 0);
        assert!(!registry.all_criteria_met(Stage::Planning));
    }

    #[test]
    fn test_missing_gate() {
        let mut registry = GateRegistry::new();
        assert!(!registry.all_criteria_met(Stage::Release));
        assert!(matches!(
            registry.satisfy_criterion(Stage::Release, "x"),
            Err(MissionError::GateNotFound(Stage::Release))
        ));
    }

    #[test]
    fn test_approve_once() {
        let mut registry = GateRegistry::with_defaults();
        let at = timestamp::now();

        assert!(matches!(
            registry.approve(Stage::Discovery, "   ", at),
            Err(MissionError::MissingField(_))
        ));

        let gate = registry.approve(Stage::Discovery, " explored ", at).unwrap();
        assert!(gate.is_approved());
        assert_eq!(gate.approval_note.as_deref(), Some("explored"));
        assert_eq!(gate.approved_at, Some(at));

        assert!(matches!(
            registry.approve(Stage::Discovery, "again", at),
            Err(MissionError::AlreadyApproved(Stage::Discovery))
        ));
    }

    #[test]
    fn test_partition_names_sorted() {
        let mut registry = GateRegistry::with_defaults();
        let at = timestamp::now();
        registry.approve(Stage::Goal, "ok", at).unwrap();
        registry.approve(Stage::Discovery, "ok", at).unwrap();

        let (approved, pending) = registry.partition_names();
        assert_eq!(approved, vec!["discovery", "goal"]);
        assert_eq!(pending.first().map(String::as_str), Some("design"));
        assert_eq!(pending.len(), 8);
    }

    #[test]
    fn test_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = GateStore::new(dir.path());
        assert_eq!(store.read().unwrap(), GateRegistry::new());

        let mut registry = GateRegistry::with_defaults();
        registry.satisfy_criterion(Stage::Discovery, "Problem").unwrap();
        store.write(&registry).unwrap();

        assert_eq!(store.read().unwrap(), registry);
    }
}
