//! mc - stage-gated mission control.
//!
//! Thin command-line front end over [`missionctl::Mission`].

#![allow(clippy::single_match_else)]

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use serde::Serialize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use missionctl::guard::Verdict;
use missionctl::mission::Transition;
use missionctl::{
    ApprovalOutcome, ErrorKind, Mission, MissionConfig, MissionError, NewTask, Stage, TaskFilter, TaskStatus,
};

/// Stage-gated mission control for human and AI workers
#[derive(Parser)]
#[command(name = "mc")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Project directory (defaults to the nearest directory with a .mission/)
    #[arg(short = 'C', long, global = true, env = "MC_PROJECT_DIR")]
    dir: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .mission/ in the project directory
    Init,

    /// Upgrade a phase-based mission to stages
    Migrate,

    /// Show stage, gate and session overview
    Status,

    /// Show the current stage, advance with `next`, or jump to a stage
    Stage {
        /// `next` or a stage name
        target: Option<String>,

        /// Bypass advancement checks (logged)
        #[arg(short, long)]
        force: bool,
    },

    /// Inspect and approve gates
    Gate {
        #[command(subcommand)]
        operation: GateOperation,
    },

    /// Manage tasks
    Task {
        #[command(subcommand)]
        operation: TaskOperation,
    },

    /// Run strict structural checks on the current stage
    Validate,

    /// Create a checkpoint, or manage sessions
    Checkpoint {
        #[command(subcommand)]
        operation: Option<CheckpointOperation>,
    },

    /// Validate and store a worker handoff report
    Handoff {
        /// Handoff JSON file
        file: PathBuf,

        /// Also run the external validator
        #[arg(long)]
        external: bool,
    },

    /// Record a decision for the next briefing
    Decision {
        text: String,
    },

    /// Record a blocker for the next briefing
    Blocker {
        text: String,
    },

    /// Check files against a task's scope
    Scope {
        /// Task id or prefix
        task: String,

        /// Files to check (defaults to the staged files)
        files: Vec<String>,
    },

    /// Show recent audit events
    Audit {
        /// Number of entries
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },

    /// Show configuration
    Config {
        /// Show config file path
        #[arg(long)]
        path: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum GateOperation {
    /// Show a gate and its stage's tasks
    Status {
        /// Stage (defaults to the current one)
        stage: Option<Stage>,
    },

    /// Satisfy a criterion of the current gate
    Satisfy {
        /// Exact description or unique substring
        criterion: Option<String>,

        /// Satisfy every criterion
        #[arg(long, conflicts_with = "criterion")]
        all: bool,
    },

    /// Approve the current gate and advance
    Approve {
        stage: Stage,

        /// Why the gate is approved
        #[arg(short, long)]
        note: String,
    },
}

#[derive(Subcommand)]
enum TaskOperation {
    /// Create a task
    Create {
        name: String,

        /// Stage (defaults to the current one)
        #[arg(short, long)]
        stage: Option<Stage>,

        #[arg(short, long, default_value = "")]
        zone: String,

        #[arg(short, long, default_value = "")]
        persona: String,

        /// Ids of tasks that must be done first
        #[arg(short, long = "depends-on", value_delimiter = ',')]
        depends_on: Vec<String>,

        /// Path patterns the task may commit to
        #[arg(long = "scope-path", value_delimiter = ',')]
        scope_paths: Vec<String>,

        /// Allow a stage after the current one
        #[arg(short, long)]
        force: bool,
    },

    /// List tasks
    List {
        #[arg(short, long)]
        stage: Option<Stage>,

        #[arg(long)]
        status: Option<TaskStatus>,

        /// Only tasks ready to start
        #[arg(short, long)]
        ready: bool,
    },

    /// Show one task
    Show {
        id: String,
    },

    /// Change a task's status
    Update {
        id: String,

        #[arg(short, long)]
        status: TaskStatus,
    },

    /// Assign a worker to a task
    Assign {
        id: String,

        /// Worker id; omit to clear
        #[arg(short, long)]
        worker: Option<String>,
    },

    /// Show a task's dependencies
    Deps {
        id: String,

        /// Print as a tree
        #[arg(short, long)]
        tree: bool,
    },

    /// List tasks ready to start
    Queue,
}

#[derive(Subcommand)]
enum CheckpointOperation {
    /// Show session health
    Status,

    /// List past sessions
    History,

    /// List checkpoint ids
    List,

    /// View a checkpoint
    Query {
        /// Checkpoint id or unique part of it
        id: String,
    },

    /// Close this session and start a new one with a briefing
    Restart {
        /// Build the briefing from this checkpoint
        #[arg(long)]
        from: Option<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose { EnvFilter::new("debug") } else { EnvFilter::new("warn") };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .with(filter)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}

/// 2 for bad input, 3 for a policy block, 1 for everything else.
fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<MissionError>().map(MissionError::kind) {
        Some(ErrorKind::Validation) => 2,
        Some(ErrorKind::Policy) => 3,
        Some(ErrorKind::Storage) | None => 1,
    }
}

fn run(cli: Cli) -> Result<()> {
    let json = cli.json;

    match cli.command {
        Commands::Init => cmd_init(cli.dir, json),
        Commands::Completions { shell } => {
            cmd_completions(shell);
            Ok(())
        }
        Commands::Config { path } => cmd_config(cli.dir, path),
        command => {
            let mission = open_mission(cli.dir)?;
            match command {
                Commands::Migrate => cmd_migrate(&mission, json),
                Commands::Status => cmd_status(&mission, json),
                Commands::Stage { target, force } => cmd_stage(&mission, target.as_deref(), force, json),
                Commands::Gate { operation } => cmd_gate(&mission, operation, json),
                Commands::Task { operation } => cmd_task(&mission, operation, json),
                Commands::Validate => cmd_validate(&mission, json),
                Commands::Checkpoint { operation } => cmd_checkpoint(&mission, operation, json),
                Commands::Handoff { file, external } => cmd_handoff(&mission, &file, external, json),
                Commands::Decision { text } => {
                    mission.record_decision(&text)?;
                    println!("Decision recorded");
                    Ok(())
                }
                Commands::Blocker { text } => {
                    mission.record_blocker(&text)?;
                    println!("Blocker recorded");
                    Ok(())
                }
                Commands::Scope { task, files } => cmd_scope(&mission, &task, files, json),
                Commands::Audit { limit } => cmd_audit(&mission, limit, json),
                Commands::Init | Commands::Completions { .. } | Commands::Config { .. } => Ok(()),
            }
        }
    }
}

fn project_dir(dir: Option<PathBuf>) -> Result<PathBuf> {
    match dir {
        Some(dir) => Ok(dir),
        None => std::env::current_dir().context("Failed to get current directory"),
    }
}

fn open_mission(dir: Option<PathBuf>) -> Result<Mission> {
    let explicit = dir.is_some();
    let dir = project_dir(dir)?;
    let mission = if explicit { Mission::open(&dir)? } else { Mission::discover(&dir)? };
    Ok(mission)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_init(dir: Option<PathBuf>, json: bool) -> Result<()> {
    let dir = project_dir(dir)?;
    let mission = Mission::init(&dir)?;
    if json {
        return print_json(&serde_json::json!({ "path": mission.mission_dir(), "stage": Stage::Discovery }));
    }
    println!("Initialized {} at {}", missionctl::MISSION_DIR, dir.display());
    println!("Stage: {}", Stage::Discovery);
    Ok(())
}

fn cmd_migrate(mission: &Mission, json: bool) -> Result<()> {
    let migration = mission.migrate()?;
    if json {
        return print_json(&serde_json::json!({
            "from_phase": migration.from_phase,
            "to_stage": migration.to_stage,
            "tasks_migrated": migration.tasks_migrated,
        }));
    }
    println!("Migrated phase {} → stage {}", migration.from_phase, migration.to_stage);
    println!("Tasks migrated: {}", migration.tasks_migrated);
    Ok(())
}

fn cmd_status(mission: &Mission, json: bool) -> Result<()> {
    let report = mission.gate_report(None)?;
    let session = mission.session_status()?;
    if json {
        return print_json(&serde_json::json!({ "gate": report, "session": session }));
    }

    println!("Stage: {} ({}/{})", report.stage, report.stage.index() + 1, Stage::ALL.len());
    if let Some(gate) = &report.gate {
        println!("Gate: {} ({}/{} criteria met)", gate.status, gate.satisfied_count(), gate.criteria.len());
    }
    let t = report.tasks;
    println!(
        "Tasks: {} total, {} done, {} in progress, {} pending, {} blocked",
        t.total, t.done, t.in_progress, t.pending, t.blocked
    );
    println!("Session: {} ({} min) - {}", session.health, session.duration_minutes, session.recommendation);
    Ok(())
}

fn print_transition(transition: &Transition) {
    if let Verdict::Forced(Some(block)) = &transition.verdict {
        eprintln!("⚠ forced past: {block}");
    }
    println!("Stage transitioned: {} → {}", transition.from, transition.to);
}

fn cmd_stage(mission: &Mission, target: Option<&str>, force: bool, json: bool) -> Result<()> {
    let transition = match target {
        None => {
            let state = mission.stage()?;
            if json {
                return print_json(&state);
            }
            println!("{}", state.current);
            return Ok(());
        }
        Some("next") => mission.advance(force)?,
        Some(name) => mission.set_stage(name.parse()?, force)?,
    };

    if json {
        return print_json(&serde_json::json!({ "from": transition.from, "to": transition.to }));
    }
    print_transition(&transition);
    Ok(())
}

fn cmd_gate(mission: &Mission, operation: GateOperation, json: bool) -> Result<()> {
    match operation {
        GateOperation::Status { stage } => {
            let report = mission.gate_report(stage)?;
            if json {
                return print_json(&report);
            }
            println!("Gate: {}", report.stage);
            match &report.gate {
                Some(gate) => {
                    println!("Status: {}", gate.status);
                    for criterion in &gate.criteria {
                        let mark = if criterion.satisfied { "✓" } else { " " };
                        println!("  [{mark}] {}", criterion.description);
                    }
                    println!("\nStatus: {}/{} criteria met", gate.satisfied_count(), gate.criteria.len());
                }
                None => println!("No gate defined"),
            }
            println!("Tasks: {} total, {} done", report.tasks.total, report.tasks.done);
        }
        GateOperation::Satisfy { criterion, all } => {
            if all {
                let count = mission.satisfy_all()?;
                println!("All {count} criteria satisfied");
            } else {
                let description = mission.satisfy(criterion.as_deref().unwrap_or(""))?;
                println!("Satisfied: {description}");
            }
        }
        GateOperation::Approve { stage, note } => {
            let outcome = mission.approve_gate(stage, &note)?;
            if json {
                return print_json(&outcome);
            }
            match outcome {
                ApprovalOutcome::Advanced { from, to, checkpoint_id } => {
                    if let Some(id) = checkpoint_id {
                        println!("Checkpoint created: {id}");
                    }
                    println!("Gate approved: {from} → {to}");
                }
                ApprovalOutcome::FinalStage { stage, checkpoint_id } => {
                    if let Some(id) = checkpoint_id {
                        println!("Checkpoint created: {id}");
                    }
                    println!("Gate approved: {stage} (final stage)");
                }
            }
        }
    }
    Ok(())
}

fn print_tasks(tasks: &[missionctl::Task]) {
    for task in tasks {
        println!("{} {} [{}] {} {}", task.status.icon(), task.name, task.id, task.stage, task.persona);
    }
    println!("\nTotal: {} tasks", tasks.len());
}

fn cmd_task(mission: &Mission, operation: TaskOperation, json: bool) -> Result<()> {
    match operation {
        TaskOperation::Create { name, stage, zone, persona, depends_on, scope_paths, force } => {
            let new = NewTask { name, stage, zone, persona, depends_on, scope_paths };
            let task = mission.create_task(new, force)?;
            if json {
                return print_json(&task);
            }
            println!("Created task {} [{}] in {}", task.name, task.id, task.stage);
        }
        TaskOperation::List { stage, status, ready } => {
            let tasks = mission.tasks(&TaskFilter { stage, status, ready_only: ready })?;
            if json {
                return print_json(&tasks);
            }
            print_tasks(&tasks);
        }
        TaskOperation::Show { id } => print_json(&mission.task(&id)?)?,
        TaskOperation::Update { id, status } => {
            let task = mission.update_task_status(&id, status)?;
            if json {
                return print_json(&task);
            }
            println!("{} {} [{}] → {}", task.status.icon(), task.name, task.id, task.status);
        }
        TaskOperation::Assign { id, worker } => {
            let task = mission.assign_worker(&id, worker.as_deref())?;
            if json {
                return print_json(&task);
            }
            match &task.worker_id {
                Some(worker) => println!("{} [{}] assigned to {worker}", task.name, task.id),
                None => println!("{} [{}] unassigned", task.name, task.id),
            }
        }
        TaskOperation::Deps { id, tree } => {
            if tree {
                print!("{}", mission.dep_tree(&id)?);
                return Ok(());
            }
            let deps = mission.deps(&id)?;
            if json {
                return print_json(&deps);
            }
            print_tasks(&deps);
        }
        TaskOperation::Queue => {
            let tasks = mission.queue()?;
            if json {
                return print_json(&tasks);
            }
            print_tasks(&tasks);
        }
    }
    Ok(())
}

fn cmd_validate(mission: &Mission, json: bool) -> Result<()> {
    let failures = mission.validate_strict()?;
    if json {
        print_json(&failures)?;
    } else if failures.is_empty() {
        println!("✓ strict checks passed");
    } else {
        for failure in &failures {
            println!("✗ {failure}");
        }
    }
    if !failures.is_empty() {
        anyhow::bail!("{} strict check(s) failed", failures.len());
    }
    Ok(())
}

fn cmd_checkpoint(mission: &Mission, operation: Option<CheckpointOperation>, json: bool) -> Result<()> {
    match operation {
        None => {
            let cp = mission.checkpoint()?;
            if json {
                return print_json(&cp);
            }
            println!("Checkpoint created: {} (stage {}, session {})", cp.id, cp.stage, cp.session_id);
        }
        Some(CheckpointOperation::Status) => {
            let status = mission.session_status()?;
            if json {
                return print_json(&status);
            }
            println!("Session: {}", status.session_id.as_deref().unwrap_or("none"));
            println!("Stage: {}", status.stage);
            println!("Duration: {} min", status.duration_minutes);
            println!("Health: {} - {}", status.health, status.recommendation);
            println!("Tasks: {}/{} done", status.tasks_done, status.tasks_total);
            if let Some(cp) = &status.last_checkpoint {
                println!("Last checkpoint: {cp}");
            }
        }
        Some(CheckpointOperation::History) => print_json(&mission.session_history()?)?,
        Some(CheckpointOperation::List) => {
            let ids = mission.list_checkpoints()?;
            if json {
                return print_json(&ids);
            }
            for id in ids {
                println!("{id}");
            }
        }
        Some(CheckpointOperation::Query { id }) => print_json(&mission.load_checkpoint(&id)?)?,
        Some(CheckpointOperation::Restart { from }) => {
            let outcome = mission.restart(from.as_deref())?;
            if json {
                return print_json(&outcome);
            }
            println!("Session restarted: {} → {}", outcome.old_session, outcome.new_session);
            println!("Checkpoint: {}\n", outcome.checkpoint_id);
            println!("{}", outcome.briefing);
        }
    }
    Ok(())
}

fn cmd_handoff(mission: &Mission, file: &Path, external: bool, json: bool) -> Result<()> {
    let receipt = if external {
        let mut config = mission.config().clone();
        config.handoff.validate = true;
        mission.clone().configured(config).handoff(file)?
    } else {
        mission.handoff(file)?
    };

    if json {
        return print_json(&receipt);
    }
    if !receipt.warnings.is_empty() {
        println!("Warnings:");
        for warning in &receipt.warnings {
            println!("  - {warning}");
        }
    }
    println!("Handoff stored: {}", receipt.stored_at.display());
    if let Some(path) = &receipt.findings_path {
        println!("Findings updated: {} (+{})", path.display(), receipt.findings_recorded);
    }
    Ok(())
}

fn cmd_scope(mission: &Mission, task: &str, files: Vec<String>, json: bool) -> Result<()> {
    let files = if files.is_empty() { staged_files(mission)? } else { files };
    let report = mission.scope_check(task, &files)?;
    if json {
        print_json(&report)?;
    } else {
        for file in &report.allowed {
            println!("✓ {file}");
        }
        for file in &report.out_of_scope {
            println!("✗ {file} (out of scope)");
        }
    }
    if !report.is_clean() {
        anyhow::bail!("{} file(s) outside the scope of task {task}", report.out_of_scope.len());
    }
    Ok(())
}

#[cfg(feature = "git")]
fn staged_files(mission: &Mission) -> Result<Vec<String>> {
    Ok(mission.staged_files()?)
}

#[cfg(not(feature = "git"))]
fn staged_files(_mission: &Mission) -> Result<Vec<String>> {
    anyhow::bail!("built without git support - pass the files to check explicitly")
}

fn cmd_audit(mission: &Mission, limit: usize, json: bool) -> Result<()> {
    let entries = mission.audit_tail(limit)?;
    if json {
        return print_json(&entries);
    }
    for entry in &entries {
        let details = serde_json::Value::Object(entry.details.clone());
        println!("{} {} {} {}", missionctl::timestamp::format(&entry.timestamp), entry.actor, entry.action, details);
    }
    Ok(())
}

fn cmd_config(dir: Option<PathBuf>, show_path: bool) -> Result<()> {
    let dir = project_dir(dir)?;
    let mission = Mission::discover(&dir).ok();
    let path = mission.as_ref().map_or_else(
        || dir.join(missionctl::MISSION_DIR).join("config.toml"),
        |m| m.layout().config_path(),
    );

    if show_path {
        println!("{}", path.display());
        return Ok(());
    }

    let config = match &mission {
        Some(m) => m.config().clone(),
        None => MissionConfig::default(),
    };
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

/// Generate shell completions.
fn cmd_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "mc", &mut io::stdout());
}
