//! Advancement policy.
//!
//! Stateless checks run before the stage pointer moves forward. Ordinary
//! advancement applies [`can_advance`]; [`strict_checks`] is an opt-in
//! structural audit of the current stage.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::PolicyBlock;
use crate::stage::Stage;
use crate::task::Task;

/// Persona required in the verify stage for ordinary advancement.
pub const REVIEWER: &str = "reviewer";

/// Personas strict validation wants done in the verify stage.
pub const VERIFY_PERSONAS: [&str; 3] = [REVIEWER, "security", "tester"];

/// Persona strict validation wants done in a multi-task implement stage.
pub const INTEGRATOR: &str = "integrator";

/// Tunable inputs of the advancement rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    /// Stages that may advance without tasks and skip the velocity rule
    pub exempt_stages: Vec<Stage>,

    /// A non-exempt stage left sooner than this needs a done task
    pub velocity_threshold_secs: u64,
}

impl Default for Policy {
    fn default() -> Self {
        Self { exempt_stages: Stage::EXEMPT.to_vec(), velocity_threshold_secs: 10 }
    }
}

impl Policy {
    pub fn is_exempt(&self, stage: Stage) -> bool {
        self.exempt_stages.contains(&stage)
    }

    pub fn velocity_threshold(&self) -> Duration {
        Duration::from_secs(self.velocity_threshold_secs)
    }
}

/// Outcome of a permitted advancement check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Every rule passed.
    Allowed,
    /// `force` was set; carries the rule that would have blocked, if any.
    Forced(Option<PolicyBlock>),
}

/// Decide whether `stage` may be left.
///
/// Rules, first failure wins:
/// 1. a non-exempt stage needs at least one task
/// 2. a non-exempt stage entered less than the velocity threshold ago needs
///    a done task
/// 3. the verify stage needs a done reviewer task
///
/// `elapsed` is the time since the stage was entered; `None` (unknown) skips
/// rule 2. With `force` nothing blocks, but the bypass is logged.
pub fn can_advance(
    policy: &Policy,
    stage: Stage,
    tasks_in_stage: &[&Task],
    elapsed: Option<Duration>,
    force: bool,
) -> Result<Verdict, PolicyBlock> {
    let outcome = evaluate(policy, stage, tasks_in_stage, elapsed);
    if !force {
        return outcome.map(|()| Verdict::Allowed);
    }

    match outcome {
        Err(block) => {
            tracing::warn!(stage = %stage, reason = %block, "--force: bypassing advancement check");
            Ok(Verdict::Forced(Some(block)))
        }
        Ok(()) => {
            tracing::warn!(stage = %stage, "--force: advancement checks skipped");
            Ok(Verdict::Forced(None))
        }
    }
}

fn evaluate(
    policy: &Policy,
    stage: Stage,
    tasks_in_stage: &[&Task],
    elapsed: Option<Duration>,
) -> Result<(), PolicyBlock> {
    let exempt = policy.is_exempt(stage);

    if !exempt && tasks_in_stage.is_empty() {
        return Err(PolicyBlock::NoTasks { stage });
    }

    if !exempt {
        let done = tasks_in_stage.iter().filter(|t| t.is_done()).count();
        if let Some(elapsed) = elapsed {
            let threshold = policy.velocity_threshold();
            if elapsed < threshold && done == 0 {
                return Err(PolicyBlock::TooFast {
                    stage,
                    elapsed_secs: elapsed.as_secs(),
                    threshold_secs: threshold.as_secs(),
                });
            }
        }
    }

    if stage == Stage::Verify {
        let reviewers: Vec<&&Task> = tasks_in_stage.iter().filter(|t| t.persona == REVIEWER).collect();
        if reviewers.is_empty() {
            return Err(PolicyBlock::ReviewerMissing);
        }
        if !reviewers.iter().any(|t| t.is_done()) {
            return Err(PolicyBlock::ReviewerNotDone);
        }
    }

    Ok(())
}

/// One structural problem found by [`strict_checks`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrictFailure {
    /// No done task carries this persona.
    MissingPersona { stage: Stage, persona: String },
    /// An integrator task exists but is not done.
    IntegratorNotDone,
    /// Several implement tasks and no integrator at all.
    IntegratorMissing,
}

impl fmt::Display for StrictFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingPersona { stage, persona } => {
                write!(f, "{stage} stage requires a done task with persona {persona:?} - none found")
            }
            Self::IntegratorNotDone => f.write_str(
                "implement stage has an integrator task but it is not done - complete it before gating",
            ),
            Self::IntegratorMissing => f.write_str(
                "implement stage has multiple tasks but no integrator task - add a task with persona \"integrator\"",
            ),
        }
    }
}

/// Structural checks beyond ordinary advancement. Every failure is reported
/// on its own.
pub fn strict_checks(stage: Stage, tasks_in_stage: &[&Task]) -> Vec<StrictFailure> {
    let mut failures = Vec::new();

    match stage {
        Stage::Verify => {
            for persona in VERIFY_PERSONAS {
                let covered = tasks_in_stage.iter().any(|t| t.persona == persona && t.is_done());
                if !covered {
                    failures.push(StrictFailure::MissingPersona { stage, persona: persona.to_string() });
                }
            }
        }
        Stage::Implement if tasks_in_stage.len() > 1 => {
            let integrators: Vec<&&Task> =
                tasks_in_stage.iter().filter(|t| t.persona == INTEGRATOR).collect();
            if integrators.is_empty() {
                failures.push(StrictFailure::IntegratorMissing);
            } else if !integrators.iter().any(|t| t.is_done()) {
                failures.push(StrictFailure::IntegratorNotDone);
            }
        }
        _ => {}
    }

    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskStatus;

    fn task(stage: Stage, persona: &str, status: TaskStatus) -> Task {
        let mut task = Task::new(format!("{persona} work"), stage, "", persona);
        task.status = status;
        task
    }

    fn long_ago() -> Option<Duration> {
        Some(Duration::from_secs(3600))
    }

    #[test]
    fn test_zero_tasks_blocks_non_exempt() {
        let policy = Policy::default();
        let result = can_advance(&policy, Stage::Implement, &[], long_ago(), false);
        assert_eq!(result, Err(PolicyBlock::NoTasks { stage: Stage::Implement }));
        assert!(result.unwrap_err().to_string().contains("no tasks"));
    }

    #[test]
    fn test_exempt_stages_need_no_tasks() {
        let policy = Policy::default();
        for stage in Stage::EXEMPT {
            let result = can_advance(&policy, stage, &[], Some(Duration::ZERO), false);
            assert_eq!(result, Ok(Verdict::Allowed), "{stage} should be exempt");
        }
    }

    #[test]
    fn test_velocity_block() {
        let policy = Policy::default();
        let pending = task(Stage::Implement, "developer", TaskStatus::Pending);

        let result = can_advance(&policy, Stage::Implement, &[&pending], Some(Duration::from_secs(3)), false);
        assert!(matches!(result, Err(PolicyBlock::TooFast { elapsed_secs: 3, threshold_secs: 10, .. })));

        // Past the threshold the same stage may advance
        let result = can_advance(&policy, Stage::Implement, &[&pending], Some(Duration::from_secs(11)), false);
        assert_eq!(result, Ok(Verdict::Allowed));
    }

    #[test]
    fn test_one_done_task_bypasses_velocity() {
        let policy = Policy::default();
        let done = task(Stage::Implement, "developer", TaskStatus::Done);
        let result = can_advance(&policy, Stage::Implement, &[&done], Some(Duration::ZERO), false);
        assert_eq!(result, Ok(Verdict::Allowed));
    }

    #[test]
    fn test_unknown_elapsed_skips_velocity() {
        let policy = Policy::default();
        let pending = task(Stage::Document, "writer", TaskStatus::Pending);
        assert_eq!(can_advance(&policy, Stage::Document, &[&pending], None, false), Ok(Verdict::Allowed));
    }

    #[test]
    fn test_reviewer_rule() {
        let policy = Policy::default();
        let tester = task(Stage::Verify, "tester", TaskStatus::Done);
        let reviewer = task(Stage::Verify, REVIEWER, TaskStatus::InProgress);

        assert_eq!(
            can_advance(&policy, Stage::Verify, &[&tester], long_ago(), false),
            Err(PolicyBlock::ReviewerMissing)
        );
        assert_eq!(
            can_advance(&policy, Stage::Verify, &[&tester, &reviewer], long_ago(), false),
            Err(PolicyBlock::ReviewerNotDone)
        );

        let reviewed = task(Stage::Verify, REVIEWER, TaskStatus::Done);
        assert_eq!(
            can_advance(&policy, Stage::Verify, &[&tester, &reviewer, &reviewed], long_ago(), false),
            Ok(Verdict::Allowed)
        );
    }

    #[test]
    fn test_force_bypasses_everything() {
        let policy = Policy::default();
        let result = can_advance(&policy, Stage::Verify, &[], Some(Duration::ZERO), true);
        assert_eq!(result, Ok(Verdict::Forced(Some(PolicyBlock::NoTasks { stage: Stage::Verify }))));

        let result = can_advance(&policy, Stage::Goal, &[], None, true);
        assert_eq!(result, Ok(Verdict::Forced(None)));
    }

    #[test]
    fn test_custom_policy() {
        let policy = Policy { exempt_stages: vec![Stage::Implement], velocity_threshold_secs: 0 };
        assert_eq!(can_advance(&policy, Stage::Implement, &[], Some(Duration::ZERO), false), Ok(Verdict::Allowed));
        assert!(can_advance(&policy, Stage::Goal, &[], None, false).is_err());
    }

    #[test]
    fn test_strict_verify_reports_each_persona() {
        let reviewer = task(Stage::Verify, REVIEWER, TaskStatus::Done);
        let security = task(Stage::Verify, "security", TaskStatus::Pending);

        let failures = strict_checks(Stage::Verify, &[&reviewer, &security]);
        assert_eq!(
            failures,
            vec![
                StrictFailure::MissingPersona { stage: Stage::Verify, persona: "security".into() },
                StrictFailure::MissingPersona { stage: Stage::Verify, persona: "tester".into() },
            ]
        );
        assert!(failures[0].to_string().contains("\"security\""));

        assert_eq!(strict_checks(Stage::Verify, &[]).len(), 3);
    }

    #[test]
    fn test_strict_implement_integrator() {
        let dev = task(Stage::Implement, "developer", TaskStatus::Done);
        let dev2 = task(Stage::Implement, "frontend", TaskStatus::Done);
        let integrator = task(Stage::Implement, INTEGRATOR, TaskStatus::InProgress);

        // A single task needs no integrator
        assert!(strict_checks(Stage::Implement, &[&dev]).is_empty());

        assert_eq!(strict_checks(Stage::Implement, &[&dev, &dev2]), vec![StrictFailure::IntegratorMissing]);
        assert_eq!(
            strict_checks(Stage::Implement, &[&dev, &integrator]),
            vec![StrictFailure::IntegratorNotDone]
        );

        let integrated = task(Stage::Implement, INTEGRATOR, TaskStatus::Done);
        assert!(strict_checks(Stage::Implement, &[&dev, &integrator, &integrated]).is_empty());
    }

    #[test]
    fn test_strict_other_stages_pass() {
        assert!(strict_checks(Stage::Document, &[]).is_empty());
    }
}
