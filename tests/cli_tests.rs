//! Integration tests for the Strand CLI
//!
//! These run the actual binary. Only offline commands are exercised;
//! anything that needs the backend is covered by the dispatch tests
//! over the mock backend.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn strand_cmd() -> Command {
    Command::cargo_bin("strand").unwrap()
}

#[test]
fn test_help_flag() {
    strand_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "linear AI-agent pipeline builder and runner",
        ))
        .stdout(predicate::str::contains("agents"))
        .stdout(predicate::str::contains("run"));
}

#[test]
fn test_version_flag() {
    strand_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("strand"));
}

#[test]
fn test_new_creates_draft_and_show_reads_it() {
    let temp_dir = TempDir::new().unwrap();
    let draft = temp_dir.path().join("strand.draft.json");

    strand_cmd()
        .args(["--draft", draft.to_str().unwrap(), "new", "Meeting Minutes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Meeting Minutes"));
    assert!(draft.exists());

    strand_cmd()
        .args(["--draft", draft.to_str().unwrap(), "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Meeting Minutes"))
        .stdout(predicate::str::contains("(unset)"))
        .stdout(predicate::str::contains("(no steps)"));
}

#[test]
fn test_new_rejects_invalid_name() {
    let temp_dir = TempDir::new().unwrap();
    let draft = temp_dir.path().join("strand.draft.json");

    strand_cmd()
        .args(["--draft", draft.to_str().unwrap(), "new", " bad name"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("STRAND-017"))
        .stderr(predicate::str::contains("Fix:"));
    assert!(!draft.exists());
}

#[test]
fn test_bind_unknown_step_fails_with_hint() {
    let temp_dir = TempDir::new().unwrap();
    let draft = temp_dir.path().join("strand.draft.json");

    strand_cmd()
        .args(["--draft", draft.to_str().unwrap(), "new", "svc"])
        .assert()
        .success();

    strand_cmd()
        .args([
            "--draft",
            draft.to_str().unwrap(),
            "bind",
            "s1",
            "--key-id",
            "k1",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("STRAND-019"))
        .stderr(predicate::str::contains("strand show"));
}

#[test]
fn test_bind_requires_exactly_one_source() {
    let temp_dir = TempDir::new().unwrap();
    let draft = temp_dir.path().join("strand.draft.json");

    strand_cmd()
        .args(["--draft", draft.to_str().unwrap(), "bind", "s1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));

    strand_cmd()
        .args([
            "--draft",
            draft.to_str().unwrap(),
            "bind",
            "s1",
            "--key-id",
            "k1",
            "--literal",
            "sk-x",
        ])
        .assert()
        .failure();
}

#[test]
fn test_show_without_draft_reports_io_error() {
    let temp_dir = TempDir::new().unwrap();
    let draft = temp_dir.path().join("missing.json");

    strand_cmd()
        .args(["--draft", draft.to_str().unwrap(), "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn test_run_before_save_reports_not_deployed() {
    let temp_dir = TempDir::new().unwrap();
    let draft = temp_dir.path().join("strand.draft.json");

    strand_cmd()
        .args(["--draft", draft.to_str().unwrap(), "new", "svc"])
        .assert()
        .success();

    strand_cmd()
        .args([
            "--draft",
            draft.to_str().unwrap(),
            "run",
            "--input",
            "hello",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not been deployed"))
        .stderr(predicate::str::contains("strand save"));
}
