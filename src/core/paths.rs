use crate::error::{Error, Result};
use std::env;
use std::path::PathBuf;

/// Overrides the config directory (useful for tests and sandboxes).
pub const CONFIG_DIR_ENV: &str = "UNCLONE_CONFIG_DIR";

/// Base unclone config directory (universal ~/.config/unclone/ on all platforms)
pub fn unclone() -> Result<PathBuf> {
    if let Ok(dir) = env::var(CONFIG_DIR_ENV) {
        if !dir.trim().is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }

    #[cfg(windows)]
    {
        let appdata = env::var("APPDATA").map_err(|_| {
            Error::internal_unexpected(
                "APPDATA environment variable not set on Windows".to_string(),
            )
        })?;
        Ok(PathBuf::from(appdata).join("unclone"))
    }

    #[cfg(not(windows))]
    {
        let home = env::var("HOME").map_err(|_| {
            Error::internal_unexpected(
                "HOME environment variable not set on Unix-like system".to_string(),
            )
        })?;
        Ok(PathBuf::from(home).join(".config").join("unclone"))
    }
}

/// Global unclone.json config file path
pub fn unclone_json() -> Result<PathBuf> {
    Ok(unclone()?.join("unclone.json"))
}
