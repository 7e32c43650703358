//! Applying refactoring plans: validation, backup, ordered writes and
//! rollback.
//!
//! `apply` computes every write in memory first (see [`Transaction`]), so a
//! plan that fails validation or reads leaves the project untouched. Once
//! writing starts, recovery is by [`rollback`] over the backup id.

mod backup;
mod lock;
mod transaction;
mod validate;

use std::path::{Path, PathBuf};

use serde::Serialize;

pub use backup::{BackupFile, BackupManifest, BackupStore, BackupSummary, RestoreResult, DEFAULT_DIR_NAME};
pub use lock::ProjectLock;
pub use transaction::{CommitOutcome, FileDiff, PendingWrite, SkippedFile, Transaction};
pub use validate::validate_plan;

use crate::dedup::RefactoringPlan;
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct ApplyOptions {
    pub project_root: PathBuf,
    pub dry_run: bool,
    pub backup: bool,
    /// Backup directory name under the project root.
    pub backup_dir_name: String,
}

impl ApplyOptions {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            dry_run: false,
            backup: true,
            backup_dir_name: DEFAULT_DIR_NAME.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplyResult {
    pub dry_run: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_id: Option<String>,
    pub files_modified: Vec<PathBuf>,
    pub files_created: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedFile>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diffs: Vec<FileDiff>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

/// Apply `plan` to the project. With `dry_run` nothing is written and the
/// result carries a unified diff per file instead.
pub fn apply(plan: &RefactoringPlan, options: &ApplyOptions) -> Result<ApplyResult> {
    let tx = Transaction::prepare(plan, &options.project_root)?;
    let skipped = tx.skipped().to_vec();

    if options.dry_run {
        let (files_modified, files_created) = partition_writes(tx.writes());
        return Ok(ApplyResult {
            dry_run: true,
            backup_id: None,
            files_modified,
            files_created,
            skipped,
            diffs: tx.diffs(),
            notes: plan.notes.clone(),
        });
    }

    let store = options
        .backup
        .then(|| BackupStore::with_dir_name(&options.project_root, &options.backup_dir_name));
    let outcome = tx.commit(store.as_ref())?;

    Ok(ApplyResult {
        dry_run: false,
        backup_id: outcome.backup_id,
        files_modified: outcome.files_modified,
        files_created: outcome.files_created,
        skipped,
        diffs: Vec::new(),
        notes: plan.notes.clone(),
    })
}

fn partition_writes(writes: &[PendingWrite]) -> (Vec<PathBuf>, Vec<PathBuf>) {
    let (modified, created): (Vec<&PendingWrite>, Vec<&PendingWrite>) =
        writes.iter().partition(|w| w.original.is_some());
    (
        modified.into_iter().map(|w| w.path.clone()).collect(),
        created.into_iter().map(|w| w.path.clone()).collect(),
    )
}

/// Restore a project from a backup taken by [`apply`]. `dir_name` is the
/// backup directory the apply wrote to.
pub fn rollback(backup_id: &str, project_root: &Path, dir_name: &str) -> Result<RestoreResult> {
    BackupStore::with_dir_name(project_root, dir_name).restore(backup_id)
}

pub fn list_backups(project_root: &Path, dir_name: &str) -> Result<Vec<BackupSummary>> {
    BackupStore::with_dir_name(project_root, dir_name).list()
}

pub fn remove_backup(project_root: &Path, dir_name: &str, backup_id: &str) -> Result<()> {
    BackupStore::with_dir_name(project_root, dir_name).remove(backup_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::{FileReplacement, GeneratedCode, Strategy};
    use crate::language::Language;
    use crate::utils::io;
    use std::collections::BTreeMap;
    use std::fs;

    const ORIGINAL: &str = "def greet():\n    print(\"Hello\")\n";

    fn setup() -> (tempfile::TempDir, RefactoringPlan) {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("greet.py");
        fs::write(&file, ORIGINAL).unwrap();

        let mut replacements = BTreeMap::new();
        replacements.insert(
            file.clone(),
            FileReplacement {
                new_content: "def say(text):\n    print(text)\n\n\ndef greet():\n    return say(\"Hello\")\n"
                    .to_string(),
                changes: vec![],
                base_sha256: Some(io::sha256_hex(ORIGINAL.as_bytes())),
            },
        );
        let plan = RefactoringPlan {
            strategy: Strategy::ExtractFunction,
            language: Language::Python,
            files_affected: vec![file],
            generated_code: GeneratedCode {
                extracted_function: "def say(text):\n    print(text)".to_string(),
                function_name: "say".to_string(),
                replacements,
                ..Default::default()
            },
            group_id: Some(0),
            notes: vec!["review me".to_string()],
        };
        (dir, plan)
    }

    #[test]
    fn dry_run_writes_nothing() {
        let (dir, plan) = setup();
        let mut options = ApplyOptions::new(dir.path());
        options.dry_run = true;

        let result = apply(&plan, &options).unwrap();
        assert!(result.dry_run);
        assert_eq!(result.files_modified.len(), 1);
        assert_eq!(result.diffs.len(), 1);
        assert!(result.diffs[0].diff.contains("+    return say(\"Hello\")"));
        assert_eq!(fs::read_to_string(dir.path().join("greet.py")).unwrap(), ORIGINAL);
        assert!(!dir.path().join(DEFAULT_DIR_NAME).exists());
    }

    #[test]
    fn apply_then_rollback_restores_bytes() {
        let (dir, plan) = setup();
        let result = apply(&plan, &ApplyOptions::new(dir.path())).unwrap();
        let backup_id = result.backup_id.clone().unwrap();
        assert_eq!(result.notes, vec!["review me".to_string()]);
        assert_ne!(fs::read_to_string(dir.path().join("greet.py")).unwrap(), ORIGINAL);

        assert_eq!(list_backups(dir.path(), DEFAULT_DIR_NAME).unwrap().len(), 1);
        let restored = rollback(&backup_id, dir.path(), DEFAULT_DIR_NAME).unwrap();
        assert_eq!(restored.restored.len(), 1);
        assert_eq!(fs::read_to_string(dir.path().join("greet.py")).unwrap(), ORIGINAL);

        remove_backup(dir.path(), DEFAULT_DIR_NAME, &backup_id).unwrap();
        assert!(list_backups(dir.path(), DEFAULT_DIR_NAME).unwrap().is_empty());
    }

    #[test]
    fn custom_backup_dir_is_used_end_to_end() {
        let (dir, plan) = setup();
        let mut options = ApplyOptions::new(dir.path());
        options.backup_dir_name = "snapshots".to_string();
        let backup_id = apply(&plan, &options).unwrap().backup_id.unwrap();

        assert!(dir.path().join("snapshots").join(&backup_id).exists());
        assert!(!dir.path().join(DEFAULT_DIR_NAME).exists());
        assert!(list_backups(dir.path(), DEFAULT_DIR_NAME).unwrap().is_empty());
        assert_eq!(list_backups(dir.path(), "snapshots").unwrap().len(), 1);

        rollback(&backup_id, dir.path(), "snapshots").unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("greet.py")).unwrap(), ORIGINAL);
        remove_backup(dir.path(), "snapshots", &backup_id).unwrap();
        assert!(list_backups(dir.path(), "snapshots").unwrap().is_empty());
    }

    #[test]
    fn apply_without_backup_has_no_id() {
        let (dir, plan) = setup();
        let mut options = ApplyOptions::new(dir.path());
        options.backup = false;
        let result = apply(&plan, &options).unwrap();
        assert!(result.backup_id.is_none());
        assert!(list_backups(dir.path(), DEFAULT_DIR_NAME).unwrap().is_empty());
    }

    #[test]
    fn invalid_plans_touch_nothing() {
        let (dir, mut plan) = setup();
        plan.files_affected.clear();
        let err = apply(&plan, &ApplyOptions::new(dir.path())).unwrap_err();
        assert_eq!(err.code.as_str(), "validation.invalid_plan");
        assert_eq!(fs::read_to_string(dir.path().join("greet.py")).unwrap(), ORIGINAL);
    }
}
