use clap::Args;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use unclone::defaults::UncloneConfig;
use unclone::search::{self, BackendChoice, SearchBackend};

pub type CmdResult<T> = unclone::Result<(T, i32)>;

/// Settings shared by every command, resolved once in main.
pub(crate) struct GlobalArgs {
    pub config: UncloneConfig,
}

/// Search backend flags. Unset flags fall back to unclone.json.
#[derive(Args, Default, Debug)]
pub struct SearchArgs {
    /// Search backend: auto, ast-grep, builtin
    #[arg(long, value_name = "BACKEND")]
    pub backend: Option<String>,

    /// ast-grep binary name or path
    #[arg(long, value_name = "PATH")]
    pub ast_grep_bin: Option<String>,

    /// Timeout for each search call, in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

impl SearchArgs {
    pub fn backend(&self, config: &UncloneConfig) -> unclone::Result<Box<dyn SearchBackend>> {
        let choice = match &self.backend {
            Some(name) => BackendChoice::parse(name)?,
            None => config.search.backend,
        };
        let binary = self
            .ast_grep_bin
            .as_deref()
            .unwrap_or(&config.search.binary);
        let timeout = match self.timeout {
            Some(0) => {
                return Err(unclone::Error::validation_invalid_argument(
                    "timeout",
                    "Timeout must be at least 1 second",
                    None,
                    None,
                ))
            }
            Some(secs) => Duration::from_secs(secs),
            None => config.search_timeout(),
        };
        Ok(search::backend_for(
            choice,
            binary,
            timeout,
            &config.backups.dir_name,
        ))
    }
}

// ============================================================================
// Input helpers (CLI layer)
// ============================================================================

/// Expand `~` and canonicalize a project root. The directory must exist.
pub fn resolve_root(root: &str) -> unclone::Result<PathBuf> {
    let expanded = shellexpand::tilde(root);
    let path = Path::new(expanded.as_ref());
    if !path.is_dir() {
        return Err(unclone::Error::validation_invalid_argument(
            "root",
            format!("Not a directory: {}", path.display()),
            Some(root.to_string()),
            None,
        ));
    }
    path.canonicalize().map_err(|e| {
        unclone::Error::internal_io(e.to_string(), Some(format!("resolve {}", path.display())))
    })
}

/// Read a JSON document from string, file (@path), or stdin (-).
pub fn read_json_spec_to_string(spec: &str) -> unclone::Result<String> {
    use std::io::IsTerminal;

    if spec.trim() == "-" {
        let mut buf = String::new();
        let mut stdin = std::io::stdin();
        if stdin.is_terminal() {
            return Err(unclone::Error::validation_invalid_argument(
                "plan",
                "Cannot read JSON from stdin when stdin is a TTY",
                None,
                None,
            ));
        }
        stdin.read_to_string(&mut buf).map_err(|e| {
            unclone::Error::internal_io(e.to_string(), Some("read stdin".to_string()))
        })?;
        return Ok(buf);
    }

    if let Some(path) = spec.strip_prefix('@') {
        if path.trim().is_empty() {
            return Err(unclone::Error::validation_invalid_argument(
                "plan",
                "Invalid JSON spec '@' (missing file path)",
                None,
                None,
            ));
        }
        let expanded = shellexpand::tilde(path);
        return unclone::io::read_file(Path::new(expanded.as_ref()), "read plan file");
    }

    Ok(spec.to_string())
}

pub mod analyze;
pub mod apply;
pub mod backups;
pub mod config;
pub mod rollback;
pub mod similarity;

/// Dispatch a command to its handler and map result to JSON.
macro_rules! dispatch {
    ($args:expr, $global:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args, $global))
    };
}

pub(crate) fn run_json(
    command: crate::Commands,
    global: &GlobalArgs,
) -> (unclone::Result<serde_json::Value>, i32) {
    crate::tty::status("unclone is working...");

    match command {
        crate::Commands::Analyze(args) => dispatch!(args, global, analyze),
        crate::Commands::Apply(args) => dispatch!(args, global, apply),
        crate::Commands::Rollback(args) => dispatch!(args, global, rollback),
        crate::Commands::Backups(args) => dispatch!(args, global, backups),
        crate::Commands::Similarity(args) => dispatch!(args, global, similarity),
        crate::Commands::Config(args) => dispatch!(args, global, config),
    }
}
