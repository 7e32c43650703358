use std::fs;
use std::path::Path;
use std::time::Duration;

use unclone::dedup::{self, AnalysisOptions, RefactoringPlan, SimilarityConfig, SimilarityContext};
use unclone::language::Language;
use unclone::refactor::{self, ApplyOptions, BackupStore, ProjectLock, DEFAULT_DIR_NAME};
use unclone::search::WalkSearch;

const USERS: &str = "import db\n\n\ndef load_users(conn):\n    rows = conn.query(\"users\")\n    result = [r for r in rows]\n    total = len(result)\n    return result\n";
const ORDERS: &str = "def load_orders(conn):\n    rows = conn.query(\"orders\")\n    result = [r for r in rows]\n    total = len(result)\n    return result\n";

fn project() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("app")).unwrap();
    fs::write(dir.path().join("app/users.py"), USERS).unwrap();
    fs::write(dir.path().join("app/orders.py"), ORDERS).unwrap();
    dir
}

fn plan_for(root: &Path) -> RefactoringPlan {
    let options = AnalysisOptions {
        languages: vec![Language::Python],
        min_lines: 3,
        skip_impact: true,
        ..Default::default()
    };
    let search = WalkSearch::new(Duration::from_secs(30));
    let ctx = SimilarityContext::new(SimilarityConfig::default());
    let report = dedup::analyze_path(root, &options, &search, &ctx).unwrap();
    assert_eq!(report.candidates.len(), 1);
    report.candidates[0].plan.clone()
}

#[test]
fn apply_then_rollback_is_byte_for_byte() {
    let dir = project();
    let plan = plan_for(dir.path());
    let helper = plan.generated_code.extract_to_file.clone().unwrap();
    assert!(!helper.exists());

    let result = refactor::apply(&plan, &ApplyOptions::new(dir.path())).unwrap();
    let backup_id = result.backup_id.clone().unwrap();
    assert_eq!(result.files_modified.len(), 2);
    assert_eq!(result.files_created.len(), 1);
    assert!(helper.exists());
    assert_ne!(fs::read_to_string(dir.path().join("app/users.py")).unwrap(), USERS);

    let restored = refactor::rollback(&backup_id, dir.path(), DEFAULT_DIR_NAME).unwrap();
    assert_eq!(restored.backup_id, backup_id);
    assert_eq!(fs::read_to_string(dir.path().join("app/users.py")).unwrap(), USERS);
    assert_eq!(fs::read_to_string(dir.path().join("app/orders.py")).unwrap(), ORDERS);
    assert!(!helper.exists());
}

#[test]
fn dry_run_leaves_project_and_backups_untouched() {
    let dir = project();
    let plan = plan_for(dir.path());
    let mut options = ApplyOptions::new(dir.path());
    options.dry_run = true;

    let result = refactor::apply(&plan, &options).unwrap();
    assert!(result.dry_run);
    assert!(result.backup_id.is_none());
    assert_eq!(result.diffs.len(), 3);
    assert_eq!(fs::read_to_string(dir.path().join("app/users.py")).unwrap(), USERS);
    assert!(!dir.path().join(DEFAULT_DIR_NAME).exists());
}

#[test]
fn stale_plans_are_refused() {
    let dir = project();
    let plan = plan_for(dir.path());
    fs::write(dir.path().join("app/orders.py"), format!("{}\n# edited\n", ORDERS)).unwrap();

    let err = refactor::apply(&plan, &ApplyOptions::new(dir.path())).unwrap_err();
    assert_eq!(err.code.as_str(), "validation.invalid_plan");
    assert_eq!(fs::read_to_string(dir.path().join("app/users.py")).unwrap(), USERS);
    assert!(refactor::list_backups(dir.path(), DEFAULT_DIR_NAME).unwrap().is_empty());
}

#[test]
fn tampered_backups_restore_nothing() {
    let dir = project();
    let plan = plan_for(dir.path());
    let result = refactor::apply(&plan, &ApplyOptions::new(dir.path())).unwrap();
    let backup_id = result.backup_id.unwrap();
    let applied = fs::read_to_string(dir.path().join("app/users.py")).unwrap();

    let store = BackupStore::new(dir.path());
    fs::write(store.dir().join(&backup_id).join("app/orders.py"), "tampered\n").unwrap();

    let err = refactor::rollback(&backup_id, dir.path(), DEFAULT_DIR_NAME).unwrap_err();
    assert_eq!(err.code.as_str(), "backup.corrupt");
    assert_eq!(fs::read_to_string(dir.path().join("app/users.py")).unwrap(), applied);
}

#[test]
fn unknown_backup_ids_are_not_found() {
    let dir = project();
    let err = refactor::rollback("20260101-000000-deadbeef", dir.path(), DEFAULT_DIR_NAME).unwrap_err();
    assert_eq!(err.code.as_str(), "backup.not_found");
}

#[test]
fn second_lock_on_a_project_is_refused() {
    let dir = project();
    let backup_dir = dir.path().join(DEFAULT_DIR_NAME);
    let lock = ProjectLock::acquire(&backup_dir).unwrap();
    assert!(ProjectLock::acquire(&backup_dir).is_err());
    drop(lock);
    assert!(ProjectLock::acquire(&backup_dir).is_ok());
}
