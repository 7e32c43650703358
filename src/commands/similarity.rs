use clap::Args;
use serde::Serialize;
use std::path::Path;

use unclone::dedup::{self, SimilarityResult};

use super::{CmdResult, GlobalArgs};

#[derive(Args)]
pub struct SimilarityArgs {
    /// First file (or code with --inline)
    pub a: String,

    /// Second file (or code with --inline)
    pub b: String,

    /// Treat A and B as source text instead of file paths
    #[arg(long)]
    pub inline: bool,

    /// Compare identifiers literally instead of normalizing them
    #[arg(long)]
    pub exact_identifiers: bool,
}

#[derive(Serialize)]
pub struct SimilarityOutput {
    command: String,
    a: String,
    b: String,
    #[serde(flatten)]
    result: SimilarityResult,
}

pub fn run(args: SimilarityArgs, global: &GlobalArgs) -> CmdResult<SimilarityOutput> {
    let (code_a, code_b) = if args.inline {
        (args.a.clone(), args.b.clone())
    } else {
        (read_source(&args.a)?, read_source(&args.b)?)
    };

    let mut config = global.config.similarity.clone();
    if args.exact_identifiers {
        config.normalize_identifiers = false;
    }
    let result = dedup::similarity(&code_a, &code_b, &config);

    Ok((
        SimilarityOutput {
            command: "similarity".to_string(),
            a: args.a,
            b: args.b,
            result,
        },
        0,
    ))
}

fn read_source(path: &str) -> unclone::Result<String> {
    let expanded = shellexpand::tilde(path);
    let path = Path::new(expanded.as_ref());
    if !path.is_file() {
        return Err(unclone::Error::validation_invalid_argument(
            "path",
            format!("Not a file: {}", path.display()),
            None,
            None,
        ));
    }
    unclone::io::read_file(path, "read source")
}
