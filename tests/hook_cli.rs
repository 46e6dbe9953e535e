//! End-to-end: the installed `log-token-stats` copy records a session, the viewer shows it.

use serde_json::{json, Value};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

fn stats_bin(home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_claude-stats"));
    cmd.env("HOME", home).env("NO_COLOR", "1");
    cmd
}

fn run_with_stdin(mut cmd: Command, input: &str) -> Output {
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn");
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(input.as_bytes())
        .expect("write stdin");
    child.wait_with_output().expect("wait")
}

fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

fn write_transcript(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("transcript.jsonl");
    let lines = [
        json!({ "type": "user", "message": { "content": "hello" } }),
        json!({
            "type": "assistant", "requestId": "req_a", "timestamp": "2026-01-15T10:00:00.000Z",
            "message": { "model": "claude-sonnet-4-20250514",
                         "usage": { "input_tokens": 1200, "output_tokens": 3,
                                    "cache_read_input_tokens": 5000, "cache_creation_input_tokens": 0 } }
        }),
        json!({
            "type": "assistant", "requestId": "req_a", "timestamp": "2026-01-15T10:00:03.000Z",
            "message": { "model": "claude-sonnet-4-20250514",
                         "usage": { "input_tokens": 1200, "output_tokens": 450,
                                    "cache_read_input_tokens": 5000, "cache_creation_input_tokens": 0 } }
        }),
    ];
    let text: Vec<String> = lines.iter().map(Value::to_string).collect();
    fs::write(&path, text.join("\n") + "\n").unwrap();
    path
}

#[test]
fn installed_hook_handler_records_session() {
    let home = tempfile::tempdir().expect("tempdir");
    let out = stats_bin(home.path()).arg("install").output().expect("install");
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let transcript = write_transcript(home.path());
    let handler = home.path().join(".claude/hooks/log-token-stats");
    let mut cmd = Command::new(&handler);
    cmd.env("HOME", home.path());
    let input = json!({ "session_id": "sess-1", "transcript_path": transcript, "cwd": "/work/app" });
    let out = run_with_stdin(cmd, &input.to_string());

    assert!(out.status.success());
    assert!(out.stdout.is_empty(), "hook must not print on success");

    let day: Value = serde_json::from_str(
        &fs::read_to_string(home.path().join(format!(".claude/stats/{}.json", today()))).unwrap(),
    )
    .unwrap();
    assert_eq!(day["sessions"][0]["session_id"], "sess-1");
    assert_eq!(day["daily_totals"]["output_tokens"], 450);
    assert_eq!(day["daily_totals"]["total_tokens"], 1200 + 450 + 5000);
    assert_eq!(day["daily_totals"]["session_count"], 1);
    assert_eq!(day["by_model"]["claude-sonnet-4-20250514"]["request_count"], 1);
}

#[test]
fn hook_subcommand_ignores_garbage_input() {
    let home = tempfile::tempdir().expect("tempdir");
    let mut cmd = stats_bin(home.path());
    cmd.arg("hook");
    let out = run_with_stdin(cmd, "this is not json");

    assert!(out.status.success());
    let log = fs::read_to_string(home.path().join(".claude/stats/debug.log")).unwrap();
    assert!(log.contains("Invalid JSON input from hook"));
}

#[test]
fn viewer_shows_recorded_day() {
    let home = tempfile::tempdir().expect("tempdir");
    let transcript = write_transcript(home.path());
    let mut cmd = stats_bin(home.path());
    cmd.arg("hook");
    let input = json!({ "session_id": "sess-1", "transcript_path": transcript, "cwd": "/work/app" });
    assert!(run_with_stdin(cmd, &input.to_string()).status.success());

    let out = stats_bin(home.path()).output().expect("run viewer");
    assert!(out.status.success());
    let text = String::from_utf8_lossy(&out.stdout);
    assert!(text.contains("By Model:"), "{}", text);
    assert!(text.contains("claude-sonnet-4-20250514"), "{}", text);
    assert!(text.contains("app"), "{}", text);

    let out = stats_bin(home.path())
        .args(["show", "--format", "json"])
        .output()
        .expect("run viewer json");
    let doc: Value = serde_json::from_slice(&out.stdout).expect("json output");
    assert_eq!(doc["date"], today());
    assert_eq!(doc["sessions"].as_array().unwrap().len(), 1);
}

#[test]
fn viewer_without_data_is_friendly() {
    let home = tempfile::tempdir().expect("tempdir");
    let out = stats_bin(home.path())
        .args(["show", "--date", "2026-01-01"])
        .output()
        .expect("run viewer");
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).contains("No token stats for 2026-01-01"));
}

#[test]
fn viewer_rejects_bad_date() {
    let home = tempfile::tempdir().expect("tempdir");
    let out = stats_bin(home.path())
        .args(["show", "--date", "15/01/2026"])
        .output()
        .expect("run viewer");
    assert!(!out.status.success());
}

#[test]
fn status_reflects_install() {
    let home = tempfile::tempdir().expect("tempdir");
    let before = stats_bin(home.path()).arg("status").output().expect("status");
    assert!(String::from_utf8_lossy(&before.stdout).contains("Hook not registered"));

    assert!(stats_bin(home.path())
        .arg("install")
        .output()
        .expect("install")
        .status
        .success());
    let after = stats_bin(home.path()).arg("status").output().expect("status");
    let text = String::from_utf8_lossy(&after.stdout);
    assert!(text.contains("Hook registered"), "{}", text);
}
