//! CLI Integration Tests
//!
//! Tests the command-line interface end-to-end.

use assert_cmd::Command;
use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;

/// Get the binary to test.
fn mc() -> Command {
    let mut cmd = Command::cargo_bin("mc").unwrap();
    cmd.env_remove("MC_PROJECT_DIR");
    cmd
}

/// A temp project with an initialized mission.
fn initialized() -> TempDir {
    let dir = TempDir::new().unwrap();
    mc().arg("-C").arg(dir.path()).arg("init").assert().success();
    dir
}

fn in_dir(dir: &TempDir) -> Command {
    let mut cmd = mc();
    cmd.arg("-C").arg(dir.path());
    cmd
}

// ============================================================================
// Help & Version Tests
// ============================================================================

#[test]
fn test_help_flag() {
    mc().arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Stage-gated mission control"));
}

#[test]
fn test_version_flag() {
    mc().arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_task_help_lists_subcommands() {
    mc().args(["task", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("create").and(predicate::str::contains("queue")));
}

// ============================================================================
// Init & Stage Tests
// ============================================================================

#[test]
fn test_init_creates_layout() {
    let dir = TempDir::new().unwrap();
    in_dir(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Stage: discovery"));

    dir.child(".mission/state/stage.json").assert(predicate::path::exists());
    dir.child(".mission/state/tasks.jsonl").assert(predicate::path::exists());
    dir.child(".mission/state/gates.json").assert(predicate::path::exists());
    dir.child(".mission/config.toml").assert(predicate::path::exists());
}

#[test]
fn test_init_twice_fails() {
    let dir = initialized();
    in_dir(&dir)
        .arg("init")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("already initialized"));
}

#[test]
fn test_stage_prints_current() {
    let dir = initialized();
    in_dir(&dir).arg("stage").assert().success().stdout("discovery\n");
}

#[test]
fn test_stage_next_blocked_without_tasks() {
    let dir = initialized();
    in_dir(&dir)
        .args(["stage", "next"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("has no tasks"));
    in_dir(&dir).arg("stage").assert().stdout("discovery\n");
}

#[test]
fn test_stage_next_forced() {
    let dir = initialized();
    in_dir(&dir)
        .args(["stage", "next", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("discovery → goal"));
}

#[test]
fn test_invalid_stage_name() {
    let dir = initialized();
    in_dir(&dir)
        .args(["stage", "shipping"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("invalid stage: shipping (valid: discovery"));
}

#[test]
fn test_stage_set_to_current_rejected() {
    let dir = initialized();
    in_dir(&dir)
        .args(["stage", "discovery"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("already at stage discovery"));
}

#[test]
fn test_not_initialized() {
    let dir = TempDir::new().unwrap();
    in_dir(&dir)
        .arg("status")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("mc init"));
}

#[test]
fn test_project_dir_from_env() {
    let dir = initialized();
    mc().env("MC_PROJECT_DIR", dir.path()).arg("stage").assert().success().stdout("discovery\n");
}

// ============================================================================
// Task Tests
// ============================================================================

#[test]
fn test_task_create_json() {
    let dir = initialized();
    let output = in_dir(&dir)
        .args(["--json", "task", "create", "Survey tooling", "--persona", "researcher"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let task: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(task["name"], "Survey tooling");
    assert_eq!(task["stage"], "discovery");
    assert_eq!(task["status"], "pending");
    assert_eq!(task["id"].as_str().unwrap().len(), 10);
}

#[test]
fn test_task_create_future_stage_rejected() {
    let dir = initialized();
    in_dir(&dir)
        .args(["task", "create", "Ship it", "--stage", "release"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("advance first"));
}

#[test]
fn test_task_queue_and_update() {
    let dir = initialized();
    in_dir(&dir).args(["task", "create", "First"]).assert().success();
    in_dir(&dir).args(["task", "list"]).assert().success().stdout(predicate::str::contains("Total: 1 tasks"));

    let output = in_dir(&dir).args(["--json", "task", "queue"]).output().unwrap();
    let queue: Vec<serde_json::Value> = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(queue.len(), 1);
    let id = queue[0]["id"].as_str().unwrap().to_string();

    in_dir(&dir).args(["task", "update", &id[..6], "--status", "done"]).assert().success();
    in_dir(&dir).args(["--json", "task", "queue"]).assert().success().stdout(predicate::str::starts_with("[]"));
}

// ============================================================================
// Gate Tests
// ============================================================================

#[test]
fn test_gate_approve_advances() {
    let dir = initialized();
    in_dir(&dir)
        .args(["gate", "approve", "discovery", "--note", "mapped"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Gate approved: discovery → goal"));
    in_dir(&dir).arg("stage").assert().stdout("goal\n");
}

#[test]
fn test_gate_approve_wrong_stage() {
    let dir = initialized();
    in_dir(&dir)
        .args(["gate", "approve", "design", "--note", "premature"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("current stage is discovery"));
}

// ============================================================================
// Handoff Tests
// ============================================================================

#[test]
fn test_handoff_completes_task() {
    let dir = initialized();
    let output = in_dir(&dir).args(["--json", "task", "create", "Survey"]).output().unwrap();
    let task: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let id = task["id"].as_str().unwrap();

    let report = dir.child("report.json");
    report
        .write_str(&format!(
            r#"{{"task_id": "{id}", "worker_id": "w-1", "status": "complete",
                "findings": [{{"type": "discovery", "summary": "Two tools exist"}}]}}"#
        ))
        .unwrap();

    in_dir(&dir)
        .arg("handoff")
        .arg(report.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Handoff stored:").and(predicate::str::contains("Findings updated:")));

    dir.child(format!(".mission/findings/{id}.json")).assert(predicate::str::contains("Two tools exist"));
    dir.child(format!(".mission/status/task-{id}.status")).assert("DONE\n");
    in_dir(&dir).args(["task", "list", "--status", "done"]).assert().success().stdout(predicate::str::contains("Survey"));
}

#[test]
fn test_handoff_invalid_status() {
    let dir = initialized();
    let report = dir.child("report.json");
    report.write_str(r#"{"worker_id": "w-1", "status": "finished"}"#).unwrap();

    in_dir(&dir)
        .arg("handoff")
        .arg(report.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("invalid status: finished"));
    dir.child(".mission/handoffs").assert(predicate::path::missing());
}

// ============================================================================
// Checkpoint Tests
// ============================================================================

#[test]
fn test_checkpoint_creates_file() {
    let dir = initialized();
    in_dir(&dir)
        .arg("checkpoint")
        .assert()
        .success()
        .stdout(predicate::str::contains("Checkpoint created: cp-"));

    let checkpoints = std::fs::read_dir(dir.path().join(".mission/orchestrator/checkpoints")).unwrap().count();
    assert_eq!(checkpoints, 1);
    dir.child(".mission/orchestrator/current.json").assert(predicate::path::exists());
}

#[test]
fn test_restart_prints_briefing() {
    let dir = initialized();
    in_dir(&dir).args(["decision", "Keep state in plain JSON"]).assert().success();
    in_dir(&dir)
        .args(["checkpoint", "restart"])
        .assert()
        .success()
        .stdout(predicate::str::contains("# Session Briefing").and(predicate::str::contains("Keep state in plain JSON")));
    dir.child(".mission/orchestrator/sessions.jsonl").assert(predicate::path::exists());
}

#[test]
fn test_checkpoint_query_unknown() {
    let dir = initialized();
    in_dir(&dir)
        .args(["checkpoint", "query", "cp-nope"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("checkpoint not found"));
}

// ============================================================================
// Misc
// ============================================================================

#[test]
fn test_audit_lists_init() {
    let dir = initialized();
    in_dir(&dir).arg("audit").assert().success().stdout(predicate::str::contains("project_initialized"));
}

#[test]
fn test_completions_bash() {
    mc().args(["completions", "bash"]).assert().success().stdout(predicate::str::contains("_mc"));
}
