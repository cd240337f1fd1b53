//! End-to-end tests driving the `tk` binary.
//!
//! Covers the one-shot lifecycle commands, snapshot export and import, and
//! the JSON-lines protocol of `tk run`.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use tempfile::TempDir;

fn tk_binary() -> String {
    env!("CARGO_BIN_EXE_tk").to_string()
}

fn db_path(temp: &Path) -> PathBuf {
    temp.join("data/tk.db")
}

/// Builds a command isolated from the user's real config and data.
fn tk(temp: &Path) -> Command {
    let mut command = Command::new(tk_binary());
    command
        .env("HOME", temp)
        .env("XDG_CONFIG_HOME", temp.join("config"))
        .env("XDG_DATA_HOME", temp.join("share"))
        .env("TK_DATABASE_PATH", db_path(temp))
        .env_remove("TK_TICK_INTERVAL_MS")
        .env_remove("TK_RETAIN_TERMINAL");
    command
}

fn run_ok(temp: &Path, args: &[&str]) -> String {
    let output = tk(temp).args(args).output().expect("failed to run tk");
    assert!(
        output.status.success(),
        "tk {args:?} should succeed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).unwrap()
}

fn run_with_stdin(temp: &Path, args: &[&str], stdin: &str) -> Output {
    let mut child = tk(temp)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn tk");
    child
        .stdin
        .take()
        .unwrap()
        .write_all(stdin.as_bytes())
        .unwrap();
    child.wait_with_output().unwrap()
}

fn active_timers(temp: &Path) -> Vec<serde_json::Value> {
    let stdout = run_ok(temp, &["status", "--json"]);
    serde_json::from_str(&stdout).expect("status --json should print a JSON array")
}

#[test]
fn test_lifecycle_commands_persist_between_invocations() {
    let temp = TempDir::new().unwrap();

    let stdout = run_ok(temp.path(), &["start", "PROJ-1", "--name", "Login page", "--points", "3"]);
    assert_eq!(stdout.trim(), "PROJ-1: running (total 00:00:00)");
    run_ok(temp.path(), &["queue", "PROJ-2"]);

    let timers = active_timers(temp.path());
    assert_eq!(timers.len(), 2);
    assert_eq!(timers[0]["ticketNumber"], "PROJ-1");
    assert_eq!(timers[0]["ticketName"], "Login page");
    assert_eq!(timers[0]["isRunning"], true);
    assert_eq!(timers[1]["status"], "queue");

    run_ok(temp.path(), &["pause", "PROJ-1"]);
    let stdout = run_ok(temp.path(), &["pause", "PROJ-1"]);
    assert_eq!(stdout.trim(), "PROJ-1: already paused");

    run_ok(temp.path(), &["complete", "PROJ-1"]);
    let timers = active_timers(temp.path());
    assert_eq!(timers.len(), 1);
    assert_eq!(timers[0]["ticketNumber"], "PROJ-2");

    assert!(db_path(temp.path()).exists());
}

#[test]
fn test_illegal_action_is_reported_not_failed() {
    let temp = TempDir::new().unwrap();
    run_ok(temp.path(), &["queue", "PROJ-5"]);

    let stdout = run_ok(temp.path(), &["pause", "PROJ-5"]);
    assert_eq!(stdout.trim(), "PROJ-5: cannot pause a queue timer");

    let stdout = run_ok(temp.path(), &["resume", "PROJ-404"]);
    assert_eq!(stdout.trim(), "PROJ-404: no timer for this ticket");
}

#[test]
fn test_blank_ticket_fails() {
    let temp = TempDir::new().unwrap();
    let output = tk(temp.path()).args(["start", " "]).output().unwrap();
    assert!(!output.status.success());
}

#[test]
fn test_export_import_round_trip_through_binary() {
    let source = TempDir::new().unwrap();
    let target = TempDir::new().unwrap();

    run_ok(source.path(), &["start", "PROJ-1", "--name", "Search"]);
    run_ok(source.path(), &["hold", "PROJ-1"]);
    let snapshot = run_ok(source.path(), &["export"]);

    let output = run_with_stdin(target.path(), &["import"], &snapshot);
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8(output.stdout).unwrap().trim(),
        "Imported 1 session(s)."
    );

    let timers = active_timers(target.path());
    assert_eq!(timers.len(), 1);
    assert_eq!(timers[0]["ticketName"], "Search");
    assert_eq!(timers[0]["status"], "hold");
}

#[test]
fn test_reset_clears_everything() {
    let temp = TempDir::new().unwrap();
    run_ok(temp.path(), &["start", "PROJ-1"]);

    let output = tk(temp.path()).arg("reset").output().unwrap();
    assert!(!output.status.success(), "reset without --yes should fail");

    let stdout = run_ok(temp.path(), &["reset", "--yes"]);
    assert_eq!(stdout.trim(), "Deleted 1 session(s).");
    assert!(active_timers(temp.path()).is_empty());
}

#[test]
fn test_run_reports_active_count_and_persists() {
    let temp = TempDir::new().unwrap();
    let input = [
        r#"{"command":"start","ticket":"PROJ-1","name":"Billing","storyPoints":2}"#,
        r#"{"event":"started","ticket":"PROJ-1"}"#,
        "garbage",
        r#"{"event":"started","ticket":"PROJ-2"}"#,
        r#"{"event":"stopped","ticket":"PROJ-2"}"#,
        "",
    ]
    .join("\n");

    let output = run_with_stdin(temp.path(), &["run"], &input);
    assert!(
        output.status.success(),
        "tk run should exit cleanly on EOF: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let signals: Vec<serde_json::Value> = String::from_utf8(output.stdout)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    let counts: Vec<u64> = signals
        .iter()
        .map(|signal| {
            assert_eq!(signal["signal"], "activeCount");
            signal["count"].as_u64().unwrap()
        })
        .collect();
    assert_eq!(counts, [0, 1, 2, 1]);

    let timers = active_timers(temp.path());
    assert_eq!(timers.len(), 1);
    assert_eq!(timers[0]["ticketNumber"], "PROJ-1");
    assert_eq!(timers[0]["storyPoints"], 2.0);
}
