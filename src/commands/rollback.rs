use clap::Args;
use serde::Serialize;

use unclone::refactor::{BackupStore, ProjectLock, RestoreResult};

use super::{CmdResult, GlobalArgs};

#[derive(Args)]
pub struct RollbackArgs {
    /// Backup id printed by `apply`
    pub backup_id: String,

    /// Project root the backup belongs to
    #[arg(long, default_value = ".")]
    pub root: String,
}

#[derive(Serialize)]
pub struct RollbackOutput {
    command: String,
    #[serde(flatten)]
    result: RestoreResult,
}

pub fn run(args: RollbackArgs, global: &GlobalArgs) -> CmdResult<RollbackOutput> {
    let root = super::resolve_root(&args.root)?;
    let store = BackupStore::with_dir_name(&root, &global.config.backups.dir_name);

    // Fail on an unknown id before creating the lock.
    store.load(&args.backup_id)?;
    let _lock = ProjectLock::acquire(store.dir())?;
    let result = store.restore(&args.backup_id)?;

    Ok((
        RollbackOutput {
            command: "rollback".to_string(),
            result,
        },
        0,
    ))
}
