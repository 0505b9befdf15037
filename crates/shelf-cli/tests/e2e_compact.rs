//! E2E tests for the `shelf init` → `ingest` → `compact` workflow.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

fn shelf_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("shelf"));
    cmd.current_dir(dir);
    cmd.env("SHELF_LOG", "error");
    cmd.env_remove("SHELF_FORMAT");
    cmd.env_remove("SHELF_STORE_ROOT");
    cmd.env_remove("SHELF_BASE_PREFIX");
    cmd.env_remove("SHELF_ORACLE_KIND");
    cmd.env_remove("SHELF_INDEX_ENDPOINT");
    cmd
}

fn json_of(dir: &Path, args: &[&str]) -> Value {
    let output = shelf_cmd(dir)
        .args(args)
        .arg("--json")
        .output()
        .expect("command should not crash");
    assert!(
        output.status.success(),
        "{args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("valid JSON")
}

/// Initialized project with two identical reports and one unrelated note.
fn seeded_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    shelf_cmd(dir.path()).arg("init").assert().success();

    let report = "Quarterly revenue report for the data platform team";
    fs::write(dir.path().join("report.md"), report).unwrap();
    fs::write(dir.path().join("report-copy.md"), report).unwrap();
    fs::write(dir.path().join("soup.md"), "Tomato soup with basil and garlic").unwrap();

    json_of(
        dir.path(),
        &["ingest", "report.md", "--summary", "Q1 revenue", "--category", "finance"],
    );
    json_of(
        dir.path(),
        &["ingest", "report-copy.md", "--category", "reports", "--tag", "q1"],
    );
    json_of(dir.path(), &["ingest", "soup.md"]);
    dir
}

fn document_keys(listing: &Value) -> Vec<String> {
    listing["documents"]
        .as_array()
        .expect("documents array")
        .iter()
        .map(|d| d["key"].as_str().unwrap().to_string())
        .collect()
}

#[test]
fn init_creates_config_and_bucket() {
    let dir = TempDir::new().unwrap();
    shelf_cmd(dir.path()).arg("init").assert().success();

    assert!(dir.path().join(".shelf/config.toml").is_file());
    assert!(dir.path().join("bucket").is_dir());

    let config = fs::read_to_string(dir.path().join(".shelf/config.toml")).unwrap();
    assert!(config.contains("base_prefix = \"knowledge-base\""));

    // Idempotent.
    shelf_cmd(dir.path()).arg("init").assert().success();
}

#[test]
fn ingest_places_file_and_sidecar() {
    let dir = TempDir::new().unwrap();
    shelf_cmd(dir.path()).arg("init").assert().success();
    fs::write(dir.path().join("notes.md"), "hello shelf").unwrap();

    let out = json_of(
        dir.path(),
        &["ingest", "notes.md", "--summary", "greeting", "--tag", "a", "--tag", "b"],
    );
    let key = out["key"].as_str().unwrap();
    assert!(key.starts_with("knowledge-base/notes/"), "key: {key}");
    assert!(key.ends_with("/notes.md"));

    let sidecar = dir.path().join("bucket").join(format!("{key}.metadata.json"));
    let envelope: Value = serde_json::from_str(&fs::read_to_string(sidecar).unwrap()).unwrap();
    let attrs = &envelope["metadataAttributes"];
    assert_eq!(attrs["summary"], "greeting");
    assert_eq!(attrs["tags"], "a,b");
    assert_eq!(attrs["source_type"], "md");

    let listing = json_of(dir.path(), &["ls"]);
    assert_eq!(listing["count"], 1);
    assert_eq!(listing["documents"][0]["summary"], "greeting");
    assert_eq!(listing["documents"][0]["tags"], serde_json::json!(["a", "b"]));
}

#[test]
fn unlabelled_ingest_is_analyzed_and_synced() {
    let dir = TempDir::new().unwrap();
    shelf_cmd(dir.path()).arg("init").assert().success();
    fs::write(dir.path().join("soup.txt"), "Tomato soup\nwith basil").unwrap();

    let out = json_of(dir.path(), &["ingest", "soup.txt"]);
    assert_eq!(out["sync"]["outcome"], "started");

    let key = out["key"].as_str().unwrap();
    let sidecar = dir.path().join("bucket").join(format!("{key}.metadata.json"));
    let envelope: Value = serde_json::from_str(&fs::read_to_string(sidecar).unwrap()).unwrap();
    let attrs = &envelope["metadataAttributes"];
    assert_eq!(attrs["summary"], "Tomato soup with basil");
    assert_eq!(attrs["categories"], "other");
}

#[test]
fn unsupported_file_type_is_refused() {
    let dir = TempDir::new().unwrap();
    shelf_cmd(dir.path()).arg("init").assert().success();
    fs::write(dir.path().join("page.html"), "<p>hi</p>").unwrap();

    shelf_cmd(dir.path())
        .args(["ingest", "page.html"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E2003"));
    assert_eq!(json_of(dir.path(), &["ls"])["count"], 0);
}

#[test]
fn compact_merges_duplicates_and_removes_originals() {
    let dir = seeded_project();

    let result = json_of(dir.path(), &["compact"]);
    assert_eq!(result["status"], "completed");
    assert_eq!(result["trigger"], "manual");
    assert_eq!(result["merged"], 1);
    assert_eq!(result["deleted"], 4);
    assert_eq!(result["dry_run"], false);
    assert_eq!(result["deleted_keys"].as_array().unwrap().len(), 4);

    let corpus = document_keys(&json_of(dir.path(), &["ls"]));
    assert_eq!(corpus.len(), 1);
    assert!(corpus[0].ends_with("/soup.md"));

    let merged = json_of(dir.path(), &["ls", "--compacted"]);
    let merged_keys = document_keys(&merged);
    assert_eq!(
        merged_keys,
        vec!["compacted-knowledge-base/finance-reports-q1/report-copy.md".to_string()]
    );
    assert_eq!(merged["documents"][0]["summary"], "Q1 revenue");

    // Nothing left to merge.
    let again = json_of(dir.path(), &["compact"]);
    assert_eq!(again["merged"], 0);
    assert_eq!(again["deleted"], 0);
}

#[test]
fn dry_run_reports_plan_without_touching_bucket() {
    let dir = seeded_project();
    let before = document_keys(&json_of(dir.path(), &["ls"]));

    let result = json_of(dir.path(), &["compact", "--dry-run"]);
    assert_eq!(result["dry_run"], true);
    assert_eq!(result["merged"], 1);
    assert_eq!(result["deleted"], 0);
    let planned = result["planned"].as_array().unwrap();
    assert_eq!(planned.len(), 1);
    assert_eq!(planned[0]["sources"].as_array().unwrap().len(), 2);

    assert_eq!(document_keys(&json_of(dir.path(), &["ls"])), before);
    assert_eq!(json_of(dir.path(), &["ls", "--compacted"])["count"], 0);
}

#[test]
fn event_payload_from_stdin_is_honoured() {
    let dir = seeded_project();

    let output = shelf_cmd(dir.path())
        .args(["compact", "--event", "-", "--json"])
        .write_stdin(r#"{"trigger":"api","dry_run":true}"#)
        .output()
        .unwrap();
    assert!(output.status.success());
    let result: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["trigger"], "api");
    assert_eq!(result["dry_run"], true);
    assert_eq!(result["deleted"], 0);
}

#[test]
fn free_form_trigger_is_echoed() {
    let dir = seeded_project();

    let output = shelf_cmd(dir.path())
        .args(["compact", "--event", "-", "--json"])
        .write_stdin(r#"{"trigger":"cron","dry_run":true}"#)
        .output()
        .unwrap();
    assert!(output.status.success());
    let result: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["trigger"], "cron");
    assert_eq!(result["status"], "completed");
}

#[test]
fn invalid_event_payload_reports_failed_result() {
    let dir = seeded_project();

    let output = shelf_cmd(dir.path())
        .args(["compact", "--event", "-", "--json"])
        .write_stdin("{ not json")
        .output()
        .unwrap();
    assert!(!output.status.success());
    let result: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["status"], "failed");
    assert_eq!(result["merged"], 0);
    assert_eq!(result["deleted"], 0);
    assert!(String::from_utf8_lossy(&output.stderr).contains("E6001"));

    assert_eq!(json_of(dir.path(), &["ls"])["count"], 3);
}

#[test]
fn held_lock_fails_the_run() {
    let dir = seeded_project();
    let lock_file = dir.path().join(".shelf/locks/knowledge-base.lock");
    let _held = shelf_core::lock::RunLock::acquire(&lock_file, Duration::from_secs(1)).unwrap();

    let output = shelf_cmd(dir.path())
        .args(["compact", "--wait", "0", "--json"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let result: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["status"], "failed");
    assert_eq!(result["merged"], 0);
    assert!(String::from_utf8_lossy(&output.stderr).contains("E5002"));

    // The corpus is untouched.
    assert_eq!(json_of(dir.path(), &["ls"])["count"], 3);
}

#[test]
fn commands_require_init() {
    let dir = TempDir::new().unwrap();
    shelf_cmd(dir.path())
        .arg("compact")
        .assert()
        .failure()
        .stderr(predicate::str::contains("E1001"));
}

#[test]
fn sync_status_without_index_reports_not_configured() {
    let dir = TempDir::new().unwrap();
    shelf_cmd(dir.path()).arg("init").assert().success();
    shelf_cmd(dir.path())
        .args(["sync-status", "JOB1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("index sync is not configured"));
}

#[test]
fn completions_are_generated() {
    let dir = TempDir::new().unwrap();
    shelf_cmd(dir.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("shelf"));
}
