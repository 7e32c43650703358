//! On-disk backups taken before a plan is applied.
//!
//! Layout: `<root>/<dir>/<backup_id>/backup-metadata.json` plus a copy of
//! every backed-up file at its path relative to the project root.

use std::fs;
use std::path::{Component, Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::transaction::io_error_text;
use crate::dedup::Strategy;
use crate::error::{Error, Result};
use crate::utils::io;

pub const DEFAULT_DIR_NAME: &str = ".unclone-backups";
const MANIFEST_FILE: &str = "backup-metadata.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupFile {
    /// Relative to the project root.
    pub path: PathBuf,
    /// Digest of the original bytes; absent when the file did not exist.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    pub existed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupManifest {
    pub backup_id: String,
    pub strategy: Strategy,
    #[serde(default)]
    pub group_id: Option<usize>,
    /// RFC 3339.
    pub timestamp: String,
    pub project_root: PathBuf,
    pub files: Vec<BackupFile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackupSummary {
    pub backup_id: String,
    pub timestamp: String,
    pub strategy: Strategy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<usize>,
    pub files: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RestoreResult {
    pub backup_id: String,
    pub restored: Vec<PathBuf>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub removed: Vec<PathBuf>,
}

/// Backups for one project root.
#[derive(Debug, Clone)]
pub struct BackupStore {
    project_root: PathBuf,
    dir: PathBuf,
}

fn storage_err(e: std::io::Error, backup_id: &str, path: &Path) -> Error {
    Error::storage_io(
        e.to_string(),
        Some(backup_id.to_string()),
        Some(path.display().to_string()),
    )
}

fn new_backup_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", Utc::now().format("%Y%m%d-%H%M%S"), &suffix[..8])
}

fn check_id(backup_id: &str) -> Result<()> {
    let path = Path::new(backup_id);
    let single = path.components().count() == 1
        && matches!(path.components().next(), Some(Component::Normal(_)));
    if backup_id.is_empty() || !single {
        return Err(Error::validation_invalid_argument(
            "backup_id",
            "Backup ids are single path segments",
            Some(backup_id.to_string()),
            None,
        ));
    }
    Ok(())
}

impl BackupStore {
    pub fn new(project_root: &Path) -> Self {
        Self::with_dir_name(project_root, DEFAULT_DIR_NAME)
    }

    pub fn with_dir_name(project_root: &Path, dir_name: &str) -> Self {
        Self {
            project_root: project_root.to_path_buf(),
            dir: project_root.join(dir_name),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    fn backup_dir(&self, backup_id: &str) -> PathBuf {
        self.dir.join(backup_id)
    }

    fn relative(&self, path: &Path, backup_id: &str) -> Result<PathBuf> {
        path.strip_prefix(&self.project_root)
            .map(Path::to_path_buf)
            .map_err(|_| {
                Error::storage_io(
                    "Path is outside the project root",
                    Some(backup_id.to_string()),
                    Some(path.display().to_string()),
                )
            })
    }

    /// Snapshot `paths` (absolute, inside the project root). Paths that do
    /// not exist yet are recorded so a restore deletes them.
    pub fn create(
        &self,
        strategy: Strategy,
        group_id: Option<usize>,
        paths: &[PathBuf],
    ) -> Result<BackupManifest> {
        let backup_id = new_backup_id();
        let target = self.backup_dir(&backup_id);
        fs::create_dir_all(&target).map_err(|e| storage_err(e, &backup_id, &target))?;

        let mut files = Vec::new();
        for path in paths {
            let rel = self.relative(path, &backup_id)?;
            if !path.exists() {
                files.push(BackupFile {
                    path: rel,
                    sha256: None,
                    existed: false,
                });
                continue;
            }
            let bytes = fs::read(path).map_err(|e| storage_err(e, &backup_id, path))?;
            let copy = target.join(&rel);
            if let Some(parent) = copy.parent() {
                fs::create_dir_all(parent).map_err(|e| storage_err(e, &backup_id, parent))?;
            }
            fs::write(&copy, &bytes).map_err(|e| storage_err(e, &backup_id, &copy))?;
            files.push(BackupFile {
                path: rel,
                sha256: Some(io::sha256_hex(&bytes)),
                existed: true,
            });
        }

        let manifest = BackupManifest {
            backup_id: backup_id.clone(),
            strategy,
            group_id,
            timestamp: Utc::now().to_rfc3339(),
            project_root: self.project_root.clone(),
            files,
        };
        let json = serde_json::to_string_pretty(&manifest)
            .map_err(|e| Error::internal_json(e.to_string(), Some("serialize backup manifest".into())))?;
        let manifest_path = target.join(MANIFEST_FILE);
        fs::write(&manifest_path, json).map_err(|e| storage_err(e, &backup_id, &manifest_path))?;

        log_status!("backup", "Saved {} file(s) as {}", manifest.files.len(), backup_id);
        Ok(manifest)
    }

    pub fn load(&self, backup_id: &str) -> Result<BackupManifest> {
        check_id(backup_id)?;
        let path = self.backup_dir(backup_id).join(MANIFEST_FILE);
        if !path.is_file() {
            return Err(Error::backup_not_found(backup_id));
        }
        let content = fs::read_to_string(&path).map_err(|e| storage_err(e, backup_id, &path))?;
        serde_json::from_str(&content)
            .map_err(|e| Error::backup_corrupt(backup_id, path.display().to_string(), e.to_string()))
    }

    /// Backups oldest first. A missing backup directory is an empty list.
    pub fn list(&self) -> Result<Vec<BackupSummary>> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return Ok(Vec::new());
        };
        let mut backups: Vec<BackupSummary> = entries
            .flatten()
            .filter(|e| e.path().join(MANIFEST_FILE).is_file())
            .filter_map(|e| self.load(&e.file_name().to_string_lossy()).ok())
            .map(|m| BackupSummary {
                files: m.files.len(),
                backup_id: m.backup_id,
                timestamp: m.timestamp,
                strategy: m.strategy,
                group_id: m.group_id,
            })
            .collect();
        backups.sort_by(|a, b| a.backup_id.cmp(&b.backup_id));
        Ok(backups)
    }

    pub fn remove(&self, backup_id: &str) -> Result<()> {
        check_id(backup_id)?;
        let dir = self.backup_dir(backup_id);
        if !dir.is_dir() {
            return Err(Error::backup_not_found(backup_id));
        }
        fs::remove_dir_all(&dir).map_err(|e| storage_err(e, backup_id, &dir))
    }

    /// Restore every file in a backup.
    ///
    /// All copies are verified against the manifest first; if any is missing
    /// or altered nothing in the project is touched.
    pub fn restore(&self, backup_id: &str) -> Result<RestoreResult> {
        let manifest = self.load(backup_id)?;
        let source = self.backup_dir(backup_id);

        let mut verified: Vec<(PathBuf, Option<Vec<u8>>)> = Vec::new();
        for file in &manifest.files {
            if file.path.is_absolute()
                || file.path.components().any(|c| matches!(c, Component::ParentDir))
            {
                return Err(Error::backup_corrupt(
                    backup_id,
                    file.path.display().to_string(),
                    "Manifest path escapes the project root",
                ));
            }
            if !file.existed {
                verified.push((file.path.clone(), None));
                continue;
            }
            let copy = source.join(&file.path);
            let bytes = fs::read(&copy).map_err(|e| {
                Error::backup_corrupt(backup_id, copy.display().to_string(), e.to_string())
            })?;
            if Some(io::sha256_hex(&bytes)) != file.sha256 {
                return Err(Error::backup_corrupt(
                    backup_id,
                    copy.display().to_string(),
                    "Checksum does not match the manifest",
                ));
            }
            verified.push((file.path.clone(), Some(bytes)));
        }

        let mut restored = Vec::new();
        let mut removed = Vec::new();
        for (rel, bytes) in verified {
            let target = self.project_root.join(&rel);
            match bytes {
                Some(bytes) => {
                    io::write_file_atomic(&target, &bytes, "restore backup").map_err(|e| {
                        Error::storage_io(
                            io_error_text(e),
                            Some(backup_id.to_string()),
                            Some(target.display().to_string()),
                        )
                    })?;
                    restored.push(target);
                }
                None => {
                    if target.exists() {
                        fs::remove_file(&target).map_err(|e| storage_err(e, backup_id, &target))?;
                        removed.push(target);
                    }
                }
            }
        }

        log_status!(
            "rollback",
            "Restored {} file(s), removed {} from {}",
            restored.len(),
            removed.len(),
            backup_id
        );
        Ok(RestoreResult {
            backup_id: backup_id.to_string(),
            restored,
            removed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, BackupStore) {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/a.py"), "original a\n").unwrap();
        let store = BackupStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn create_writes_manifest_and_copies() {
        let (dir, store) = setup();
        let paths = vec![dir.path().join("src/a.py"), dir.path().join("src/new.py")];
        let manifest = store.create(Strategy::ExtractFunction, Some(2), &paths).unwrap();

        assert_eq!(manifest.files.len(), 2);
        assert!(manifest.files[0].existed);
        assert!(!manifest.files[1].existed);
        assert!(chrono::DateTime::parse_from_rfc3339(&manifest.timestamp).is_ok());

        let backup = store.dir().join(&manifest.backup_id);
        assert!(backup.join("backup-metadata.json").is_file());
        assert_eq!(fs::read_to_string(backup.join("src/a.py")).unwrap(), "original a\n");
        assert_eq!(store.load(&manifest.backup_id).unwrap(), manifest);
    }

    #[test]
    fn restore_round_trips_and_removes_created_files() {
        let (dir, store) = setup();
        let a = dir.path().join("src/a.py");
        let created = dir.path().join("src/new.py");
        let manifest = store
            .create(Strategy::ExtractFunction, None, &[a.clone(), created.clone()])
            .unwrap();

        fs::write(&a, "changed").unwrap();
        fs::write(&created, "helper").unwrap();

        let result = store.restore(&manifest.backup_id).unwrap();
        assert_eq!(fs::read_to_string(&a).unwrap(), "original a\n");
        assert!(!created.exists());
        assert_eq!(result.restored, vec![a]);
        assert_eq!(result.removed, vec![created]);
    }

    #[test]
    fn tampered_copies_abort_before_touching_files() {
        let (dir, store) = setup();
        let a = dir.path().join("src/a.py");
        let manifest = store.create(Strategy::ExtractFunction, None, &[a.clone()]).unwrap();
        fs::write(&a, "changed").unwrap();
        fs::write(store.dir().join(&manifest.backup_id).join("src/a.py"), "tampered").unwrap();

        let err = store.restore(&manifest.backup_id).unwrap_err();
        assert_eq!(err.code.as_str(), "backup.corrupt");
        assert_eq!(fs::read_to_string(&a).unwrap(), "changed");
    }

    #[test]
    fn unknown_and_malformed_ids() {
        let (_dir, store) = setup();
        assert_eq!(
            store.restore("20240101-000000-deadbeef").unwrap_err().code.as_str(),
            "backup.not_found"
        );
        assert_eq!(
            store.restore("../etc").unwrap_err().code.as_str(),
            "validation.invalid_argument"
        );
    }

    #[test]
    fn list_and_remove() {
        let (dir, store) = setup();
        assert!(store.list().unwrap().is_empty());
        let a = dir.path().join("src/a.py");
        let first = store.create(Strategy::ExtractFunction, Some(0), &[a.clone()]).unwrap();
        let second = store.create(Strategy::ExtractMethod, Some(1), &[a]).unwrap();

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().any(|b| b.backup_id == first.backup_id));

        store.remove(&second.backup_id).unwrap();
        assert_eq!(store.list().unwrap().len(), 1);
        assert_eq!(store.remove(&second.backup_id).unwrap_err().code.as_str(), "backup.not_found");
    }
}
