use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;

fn seed_backlog(root: &Path) {
    fs::create_dir_all(root.join("data")).unwrap();
    fs::create_dir_all(root.join("items")).unwrap();
    fs::write(
        root.join("data/backlog.csv"),
        "id,title,type,area,priority,status,sprint,est_tokens\n\
         BACKLOG-001,Fix login redirect,bug,ui,High,Pending,-,~20K\n\
         BACKLOG-002,Offline sync,feature,service,Low,Completed,SPRINT-001,-\n",
    )
    .unwrap();
    fs::write(
        root.join("data/sprints.csv"),
        "sprint_id,name,status\nSPRINT-001,First,completed\n",
    )
    .unwrap();
    fs::write(root.join("items/BACKLOG-001.md"), "# BACKLOG-001: Fix login redirect\n").unwrap();
    fs::write(
        root.join("items/BACKLOG-002.md"),
        "# BACKLOG-002: Offline sync\n\n## Description\nQueue writes while offline.\n",
    )
    .unwrap();
}

fn backlog(root: &Path) -> Command {
    let mut cmd = Command::cargo_bin("backlog").unwrap();
    cmd.arg("--root").arg(root);
    cmd
}

#[test]
fn validate_passes_on_clean_registers() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    seed_backlog(dir.path());
    backlog(dir.path())
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("VALIDATION PASSED"));
    Ok(())
}

#[test]
fn validate_fails_with_issue_list() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    seed_backlog(dir.path());
    fs::write(
        dir.path().join("data/backlog.csv"),
        "id,title,priority\nBACKLOG-001,,Urgent\n",
    )?;
    backlog(dir.path())
        .arg("validate")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("VALIDATION FAILED"))
        .stdout(predicate::str::contains("BACKLOG-001: Missing title"))
        .stdout(predicate::str::contains("BACKLOG-001: Invalid priority 'Urgent'"));
    Ok(())
}

#[test]
fn root_can_come_from_environment() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    seed_backlog(dir.path());
    Command::cargo_bin("backlog")?
        .env("BACKLOG_ROOT", dir.path())
        .args(["query", "open"])
        .assert()
        .success()
        .stdout(predicate::str::contains("BACKLOG-001: Fix login redirect"))
        .stdout(predicate::str::contains("BACKLOG-002").not());
    Ok(())
}

#[test]
fn query_without_value_fails() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    seed_backlog(dir.path());
    backlog(dir.path())
        .args(["query", "status"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("status query requires a value"));
    Ok(())
}

#[test]
fn analyze_json_is_machine_readable() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    seed_backlog(dir.path());
    let output = backlog(dir.path()).args(["analyze", "--json"]).output()?;
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(json["summary"]["total_items"], 2);
    assert_eq!(json["summary"]["open_items"], 1);
    Ok(())
}

#[test]
fn sync_reports_and_fixes_missing_rows() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    seed_backlog(dir.path());
    fs::write(
        dir.path().join("items/BACKLOG-003.md"),
        "# BACKLOG-003: Export\n**Priority**: High\n",
    )?;

    backlog(dir.path())
        .arg("sync")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Missing from CSV (1):"))
        .stdout(predicate::str::contains("Run with --fix"));

    backlog(dir.path())
        .args(["sync", "--fix"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Added 1 items to CSV"));

    let csv = fs::read_to_string(dir.path().join("data/backlog.csv"))?;
    assert!(csv.contains("BACKLOG-003,Export"));
    Ok(())
}

#[test]
fn dashboard_writes_html_with_descriptions() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    seed_backlog(dir.path());
    let output = dir.path().join("out/dashboard.html");
    backlog(dir.path())
        .arg("dashboard")
        .arg("-o")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Dashboard generated:"));

    let html = fs::read_to_string(output)?;
    assert!(html.contains("Queue writes while offline."));
    assert!(!html.contains("BACKLOG_DATA_PLACEHOLDER"));
    Ok(())
}

#[test]
fn find_searches_descriptions() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    seed_backlog(dir.path());
    backlog(dir.path())
        .args(["find", "queue", "writes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("BACKLOG-002: Offline sync [Completed]"))
        .stdout(predicate::str::contains("[Queue"));
    Ok(())
}

#[test]
fn metrics_log_then_sum() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let metrics_dir = dir.path().join("metrics");
    let metrics = |args: &[&str]| {
        let mut cmd = Command::cargo_bin("backlog").unwrap();
        cmd.arg("--metrics-dir").arg(&metrics_dir).arg("metrics").args(args);
        cmd
    };

    metrics(&["log", "-t", "engineer", "-i", "TASK-7", "--input", "1500", "--output", "500"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Tokens: 2,000 total (1,500 in, 500 out)"));
    metrics(&["log", "-t", "qa", "-i", "TASK-7", "--agent-id", "q1", "--input", "10"])
        .assert()
        .success();
    metrics(&["log", "-t", "wizard"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid agent type 'wizard'"));

    metrics(&["query", "--task", "TASK-7", "--count"])
        .assert()
        .success()
        .stdout("2\n");

    let output = metrics(&["sum", "--task", "TASK-7"]).output()?;
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(json["task_id"], "TASK-7");
    assert_eq!(json["total_tokens"], 2010);
    assert_eq!(json["agent_sessions"], 1);
    assert_eq!(json["entries"], 2);
    Ok(())
}

#[test]
fn metrics_sum_rejects_missing_ledger() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    Command::cargo_bin("backlog")?
        .arg("--metrics-dir")
        .arg(dir.path())
        .args(["metrics", "sum", "--agent-id", "a1"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("No metrics file found or empty"));
    Ok(())
}

#[test]
fn metrics_sum_accepts_exactly_one_selector() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    Command::cargo_bin("backlog")?
        .arg("--metrics-dir")
        .arg(dir.path())
        .args(["metrics", "sum", "--task", "TASK-1", "--agent-id", "a1"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("cannot be used with"));

    Command::cargo_bin("backlog")?
        .arg("--metrics-dir")
        .arg(dir.path())
        .args(["metrics", "sum", "--pretty"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("required"));
    Ok(())
}
