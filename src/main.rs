use clap::{Parser, Subcommand};

use commands::GlobalArgs;

mod commands;
mod output;
mod tty;

use commands::{analyze, apply, backups, config, rollback, similarity};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "unclone")]
#[command(version = VERSION)]
#[command(about = "Find duplicated code and extract it into shared functions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a project for duplicated functions, methods and classes
    Analyze(analyze::AnalyzeArgs),
    /// Apply a refactoring plan with backup
    Apply(apply::ApplyArgs),
    /// Restore files from a backup taken by apply
    Rollback(rollback::RollbackArgs),
    /// List, inspect and delete backups
    Backups(backups::BackupsArgs),
    /// Score the similarity of two files or snippets
    Similarity(similarity::SimilarityArgs),
    /// Manage global unclone configuration
    Config(config::ConfigArgs),
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let global = GlobalArgs {
        config: unclone::defaults::load_config(),
    };

    let (json_result, exit_code) = commands::run_json(cli.command, &global);
    let _ = output::print_json_result(json_result);

    std::process::ExitCode::from(exit_code_to_u8(exit_code))
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}
