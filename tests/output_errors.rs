use std::fs;
use std::path::Path;
use std::process::Command;

use serde_json::Value;

const USERS: &str = "def load_users(db):\n    rows = db.query(\"users\")\n    result = [r for r in rows]\n    total = len(result)\n    return result\n";
const ORDERS: &str = "def load_orders(db):\n    rows = db.query(\"orders\")\n    result = [r for r in rows]\n    total = len(result)\n    return result\n";

/// Run the CLI with an isolated config dir; returns (exit code, parsed stdout).
fn unclone(config_dir: &Path, args: &[&str]) -> (i32, Value) {
    let output = Command::new(env!("CARGO_BIN_EXE_unclone"))
        .args(args)
        .env("UNCLONE_CONFIG_DIR", config_dir)
        .output()
        .unwrap();
    let stdout = String::from_utf8(output.stdout).unwrap();
    let json: Value = serde_json::from_str(&stdout)
        .unwrap_or_else(|e| panic!("stdout is not JSON ({}): {}", e, stdout));
    (output.status.code().unwrap(), json)
}

fn project() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("users.py"), USERS).unwrap();
    fs::write(dir.path().join("orders.py"), ORDERS).unwrap();
    dir
}

fn error_code(json: &Value) -> &str {
    json["error"]["code"].as_str().unwrap()
}

#[test]
fn unknown_backup_is_not_found_with_exit_code_4() {
    let config = tempfile::tempdir().unwrap();
    let dir = project();
    let root = dir.path().to_str().unwrap();

    let (code, json) = unclone(config.path(), &["rollback", "20260101-000000-deadbeef", "--root", root]);
    assert_eq!(code, 4);
    assert_eq!(json["success"], false);
    assert_eq!(error_code(&json), "backup.not_found");
    assert!(json["error"]["hints"][0]["message"]
        .as_str()
        .unwrap()
        .contains("backups list"));
}

#[test]
fn missing_root_is_a_validation_error() {
    let config = tempfile::tempdir().unwrap();
    let (code, json) = unclone(config.path(), &["analyze", "/nonexistent/unclone-root"]);
    assert_eq!(code, 2);
    assert_eq!(error_code(&json), "validation.invalid_argument");
}

#[test]
fn missing_ast_grep_is_a_search_error() {
    let config = tempfile::tempdir().unwrap();
    let dir = project();
    let root = dir.path().to_str().unwrap();
    let (code, json) = unclone(
        config.path(),
        &["analyze", root, "--backend", "ast-grep", "--ast-grep-bin", "/nonexistent/ast-grep"],
    );
    assert_eq!(code, 20);
    assert_eq!(error_code(&json), "search.tool_unavailable");
}

#[test]
fn analyze_reports_duplicates_with_exit_code_1() {
    let config = tempfile::tempdir().unwrap();
    let dir = project();
    let root = dir.path().to_str().unwrap();
    let (code, json) = unclone(
        config.path(),
        &["analyze", root, "--backend", "builtin", "-l", "python", "--min-lines", "3"],
    );
    assert_eq!(code, 1);
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["command"], "analyze");
    assert_eq!(json["data"]["summary"]["duplicate_groups"], 1);
    assert_eq!(json["data"]["backend"], "builtin");
}

#[test]
fn bad_plan_json_is_rejected() {
    let config = tempfile::tempdir().unwrap();
    let dir = project();
    let root = dir.path().to_str().unwrap();
    let (code, json) = unclone(config.path(), &["apply", "--root", root, "--plan", "{not json"]);
    assert_eq!(code, 2);
    assert_eq!(error_code(&json), "validation.invalid_json");
}

#[test]
fn apply_without_confirmation_writes_nothing() {
    let config = tempfile::tempdir().unwrap();
    let dir = project();
    let root = dir.path().to_str().unwrap();

    let (_, analysis) = unclone(
        config.path(),
        &["analyze", root, "--backend", "builtin", "-l", "python", "--min-lines", "3", "--group", "0"],
    );
    assert_eq!(analysis["data"]["command"], "analyze.group");
    let plan_path = config.path().join("plan.json");
    fs::write(&plan_path, analysis.to_string()).unwrap();
    let plan_arg = format!("@{}", plan_path.display());

    let (code, json) = unclone(config.path(), &["apply", "--root", root, "--plan", &plan_arg]);
    assert_eq!(code, 2);
    assert_eq!(error_code(&json), "validation.invalid_argument");
    assert_eq!(fs::read_to_string(dir.path().join("users.py")).unwrap(), USERS);

    let (code, json) = unclone(
        config.path(),
        &["apply", "--root", root, "--plan", &plan_arg, "--dry-run"],
    );
    assert_eq!(code, 0);
    assert_eq!(json["data"]["applied"], false);
    assert_eq!(json["data"]["dry_run"], true);
    assert_eq!(fs::read_to_string(dir.path().join("users.py")).unwrap(), USERS);

    let (code, json) = unclone(config.path(), &["apply", "--root", root, "--plan", &plan_arg, "--yes"]);
    assert_eq!(code, 0);
    let backup_id = json["data"]["backup_id"].as_str().unwrap().to_string();
    assert_ne!(fs::read_to_string(dir.path().join("users.py")).unwrap(), USERS);

    let (code, json) = unclone(config.path(), &["backups", "list", "--root", root]);
    assert_eq!(code, 0);
    assert_eq!(json["data"]["backups"][0]["backup_id"], backup_id.as_str());

    let (code, _) = unclone(config.path(), &["rollback", &backup_id, "--root", root]);
    assert_eq!(code, 0);
    assert_eq!(fs::read_to_string(dir.path().join("users.py")).unwrap(), USERS);
    assert_eq!(fs::read_to_string(dir.path().join("orders.py")).unwrap(), ORDERS);
}

#[test]
fn config_path_honours_config_dir_override() {
    let config = tempfile::tempdir().unwrap();
    let (code, json) = unclone(config.path(), &["config", "path"]);
    assert_eq!(code, 0);
    assert_eq!(json["data"]["exists"], false);
    assert!(json["data"]["path"]
        .as_str()
        .unwrap()
        .starts_with(config.path().to_str().unwrap()));

    let (code, json) = unclone(config.path(), &["config", "set", "/analysis/min_lines", "7"]);
    assert_eq!(code, 0);
    assert_eq!(json["data"]["config"]["analysis"]["min_lines"], 7);
    assert!(config.path().join("unclone.json").exists());

    let (code, json) = unclone(config.path(), &["config", "set", "/search/timeout_secs", "0"]);
    assert_eq!(code, 2);
    assert_eq!(error_code(&json), "config.invalid_value");
}

#[test]
fn custom_backup_dir_is_left_out_of_analysis() {
    let config = tempfile::tempdir().unwrap();
    let dir = project();
    let root = dir.path().to_str().unwrap();
    let (code, _) = unclone(config.path(), &["config", "set", "/backups/dir_name", "\"snapshots\""]);
    assert_eq!(code, 0);

    let analyze = ["analyze", root, "--backend", "builtin", "-l", "python", "--min-lines", "3"];
    let (code, _) = unclone(config.path(), &["apply", "--root", root, "--group", "0", "--backend", "builtin", "--yes"]);
    assert_eq!(code, 0);
    assert!(dir.path().join("snapshots").is_dir());

    let (code, json) = unclone(config.path(), &analyze);
    assert_eq!(code, 0, "{}", json);
    assert_eq!(json["data"]["summary"]["duplicate_groups"], 0);
    assert!(!json.to_string().contains("snapshots"));

    let (code, json) = unclone(config.path(), &["backups", "list", "--root", root]);
    assert_eq!(code, 0);
    assert_eq!(json["data"]["backups"].as_array().unwrap().len(), 1);
}
