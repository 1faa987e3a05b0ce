//! CLI tests against a temporary state file

use std::fs;
use std::process::{Command, Output};
use tempfile::TempDir;

const STATE: &str = r#"{
  "users": {
    "42": {"id": 42, "name": "Anna", "age": 61, "gender": "female", "height_cm": 165, "weight_kg": 70}
  },
  "measurements": {
    "42": [
      {
        "timestamp": "2024-05-01T09:05:00+03:00",
        "first": {"systolic": 150, "diastolic": 95},
        "second": {"systolic": 130, "diastolic": 85}
      }
    ]
  },
  "reminder_settings": {
    "42": {"times": ["09:00", "21:30"], "active": true}
  }
}"#;

fn cli(temp_dir: &TempDir, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_pressure-assistant"))
        .args(args)
        .env("PRESSURE_STATE_FILE", temp_dir.path().join("state.json"))
        .env_remove("TELEGRAM_BOT_TOKEN")
        .env_remove("OPENAI_API_KEY")
        .env_remove("PRESSURE_UTC_OFFSET_MINUTES")
        .output()
        .unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_status_empty_state() {
    let temp_dir = TempDir::new().unwrap();
    let output = cli(&temp_dir, &["status"]);

    assert!(output.status.success());
    assert!(stdout(&output).contains("Users: 0"));
    assert!(stdout(&output).contains("Measurements: 0"));
}

#[test]
fn test_status_counts() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("state.json"), STATE).unwrap();
    let output = cli(&temp_dir, &["status"]);

    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("Users: 1"));
    assert!(out.contains("Measurements: 1"));
    assert!(out.contains("Active reminders: 1"));
}

#[test]
fn test_export_to_stdout() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("state.json"), STATE).unwrap();
    let output = cli(&temp_dir, &["export", "42"]);

    assert!(output.status.success());
    assert_eq!(
        stdout(&output),
        "date,first,second\n01.05.2024 09:05,150/95,130/85\n"
    );
}

#[test]
fn test_export_to_file() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("state.json"), STATE).unwrap();
    let out = temp_dir.path().join("anna.csv");
    let output = cli(&temp_dir, &["export", "42", "--out", out.to_str().unwrap()]);

    assert!(output.status.success());
    let csv = fs::read_to_string(&out).unwrap();
    assert!(csv.contains("150/95,130/85"));
}

#[test]
fn test_export_unknown_user_fails() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("state.json"), STATE).unwrap();
    let output = cli(&temp_dir, &["export", "7"]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("not registered"));
}

#[test]
fn test_run_requires_bot_token() {
    let temp_dir = TempDir::new().unwrap();
    let output = cli(&temp_dir, &["run"]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("TELEGRAM_BOT_TOKEN"));
}

#[test]
fn test_corrupt_state_file_reported() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("state.json"), "{ broken").unwrap();
    let output = cli(&temp_dir, &["status"]);

    assert!(!output.status.success());
    assert!(stderr(&output).contains("Failed to load state file"));
}
