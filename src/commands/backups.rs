use clap::{Args, Subcommand};
use serde::Serialize;

use unclone::refactor::{BackupManifest, BackupStore, BackupSummary};

use super::{CmdResult, GlobalArgs};

#[derive(Args)]
pub struct BackupsArgs {
    #[command(subcommand)]
    command: BackupsCommand,
}

#[derive(Subcommand)]
enum BackupsCommand {
    /// List backups, oldest first
    List {
        #[arg(long, default_value = ".")]
        root: String,
    },
    /// Show a backup manifest
    Show {
        backup_id: String,
        #[arg(long, default_value = ".")]
        root: String,
    },
    /// Delete a backup
    Remove {
        backup_id: String,
        #[arg(long, default_value = ".")]
        root: String,
    },
}

#[derive(Serialize)]
#[serde(tag = "command")]
pub enum BackupsOutput {
    #[serde(rename = "backups.list")]
    List {
        root: String,
        backups: Vec<BackupSummary>,
    },

    #[serde(rename = "backups.show")]
    Show(BackupManifest),

    #[serde(rename = "backups.remove")]
    Remove { root: String, backup_id: String },
}

pub fn run(args: BackupsArgs, global: &GlobalArgs) -> CmdResult<BackupsOutput> {
    let dir_name = &global.config.backups.dir_name;
    match args.command {
        BackupsCommand::List { root } => {
            let root = super::resolve_root(&root)?;
            let backups = BackupStore::with_dir_name(&root, dir_name).list()?;
            Ok((
                BackupsOutput::List {
                    root: root.display().to_string(),
                    backups,
                },
                0,
            ))
        }
        BackupsCommand::Show { backup_id, root } => {
            let root = super::resolve_root(&root)?;
            let manifest = BackupStore::with_dir_name(&root, dir_name).load(&backup_id)?;
            Ok((BackupsOutput::Show(manifest), 0))
        }
        BackupsCommand::Remove { backup_id, root } => {
            let root = super::resolve_root(&root)?;
            BackupStore::with_dir_name(&root, dir_name).remove(&backup_id)?;
            Ok((
                BackupsOutput::Remove {
                    root: root.display().to_string(),
                    backup_id,
                },
                0,
            ))
        }
    }
}
