use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

const LOCK_FILE: &str = ".lock";

/// Exclusive lock on a project's backup directory. Released on drop.
#[derive(Debug)]
pub struct ProjectLock {
    path: PathBuf,
}

impl ProjectLock {
    pub fn acquire(backup_dir: &Path) -> Result<Self> {
        fs::create_dir_all(backup_dir).map_err(|e| {
            Error::storage_io(e.to_string(), None, Some(backup_dir.display().to_string()))
        })?;
        let path = backup_dir.join(LOCK_FILE);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(Error::validation_invalid_argument(
                    "root",
                    "Another unclone operation is running against this project",
                    Some(path.display().to_string()),
                    None,
                )
                .with_hint(format!(
                    "If no other unclone process is running, delete {}",
                    path.display()
                )));
            }
            Err(e) => {
                return Err(Error::storage_io(
                    e.to_string(),
                    None,
                    Some(path.display().to_string()),
                ))
            }
        };
        let _ = writeln!(file, "{}", std::process::id());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ProjectLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
