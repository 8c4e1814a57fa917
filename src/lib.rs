#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::trivially_copy_pass_by_ref)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::single_char_pattern)]

//! # missionctl
//!
//! Stage-gated mission control for software delivery carried out by humans and AI workers.
//!
//! A mission lives in a `.mission/` directory next to the project it drives. The engine keeps
//! three pieces of live state there: the current stage, the task collection and the per-stage
//! gates. Everything else (checkpoints, session records, the audit trail) is derived from them.
//!
//! ## Features
//!
//! - **Ordered stages**: ten fixed stages, advanced exactly one step at a time
//! - **Gates**: per-stage criteria that must be satisfied, approved exactly once
//! - **Task graph**: dependency-aware readiness, cycle-safe traversal
//! - **Advancement policy**: zero-task, velocity and reviewer rules with an explicit `force`
//! - **Checkpoints**: immutable snapshots plus session restart briefings
//! - **Handoffs**: validated worker reports with per-task findings
//! - **Legacy formats**: older gate, task and phase layouts load transparently
//!
//! ## Quick Start
//!
//! ```bash
//! mc init
//! mc task create "Survey existing tooling" --persona researcher
//! mc gate satisfy --all
//! mc gate approve discovery --note "problem space mapped"
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
// Allow common patterns that are intentional in this codebase
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::redundant_else)]
#![allow(clippy::if_not_else)]
#![allow(clippy::manual_let_else)]
#![allow(clippy::derivable_impls)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::map_unwrap_or)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::items_after_statements)]

pub mod audit;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod external;
pub mod fsutil;
pub mod gate;
#[cfg(feature = "git")]
pub mod git;
pub mod guard;
pub mod handoff;
pub mod ids;
pub mod layout;
pub mod migrate;
pub mod mission;
pub mod scope;
pub mod stage;
pub mod task;
pub mod timestamp;

pub use checkpoint::{
    Checkpoint, CheckpointStore, CurrentPointer, Health, RestartOutcome, SessionRecord, SessionStatus,
};
pub use config::MissionConfig;
pub use error::{ErrorKind, MissionError, MissionResult, PolicyBlock};
pub use gate::{Criterion, Gate, GateRegistry, GateStatus};
pub use guard::{Policy, Verdict};
pub use handoff::{Finding, Handoff, HandoffReceipt, HandoffStatus};
pub use mission::{ApprovalOutcome, GateReport, Mission, NewTask, TaskFilter};
pub use stage::{Stage, StageLedger, StageState};
pub use task::{Task, TaskStatus, TaskStore, TERMINAL_STATUS};

/// Name of the directory that holds a mission's state.
pub const MISSION_DIR: &str = ".mission";
