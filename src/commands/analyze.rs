use clap::Args;
use serde::Serialize;

use unclone::construct::ConstructKind;
use unclone::dedup::{self, AnalysisReport, Candidate};
use unclone::language::Language;

use super::{CmdResult, GlobalArgs, SearchArgs};

#[derive(Args)]
pub struct AnalyzeArgs {
    /// Project directory to scan
    #[arg(default_value = ".")]
    pub root: String,

    /// Minimum similarity for two constructs to be grouped (0-1)
    #[arg(long, value_name = "SCORE")]
    pub min_similarity: Option<f64>,

    /// Ignore constructs shorter than this many non-blank lines
    #[arg(long, value_name = "LINES")]
    pub min_lines: Option<usize>,

    /// Restrict to a language (repeatable)
    #[arg(long = "language", short = 'l', value_name = "LANG")]
    pub languages: Vec<String>,

    /// Construct kinds to compare: function, method, class (repeatable)
    #[arg(long = "kind", short = 'k', value_name = "KIND")]
    pub kinds: Vec<String>,

    /// Skip files matching this root-relative glob (repeatable)
    #[arg(long, value_name = "GLOB")]
    pub exclude: Vec<String>,

    /// Skip the external-reference search
    #[arg(long)]
    pub skip_impact: bool,

    /// Keep only the N highest-ranked candidates
    #[arg(long, value_name = "N")]
    pub top: Option<usize>,

    /// Print only the refactoring plan for one group (input for `apply --plan`)
    #[arg(long, value_name = "GROUP_ID")]
    pub group: Option<usize>,

    #[command(flatten)]
    pub search: SearchArgs,
}

#[derive(Serialize)]
#[serde(tag = "command")]
pub enum AnalyzeOutput {
    #[serde(rename = "analyze")]
    Report(AnalysisReport),

    #[serde(rename = "analyze.group")]
    Group(Box<Candidate>),
}

pub fn run(args: AnalyzeArgs, global: &GlobalArgs) -> CmdResult<AnalyzeOutput> {
    let root = super::resolve_root(&args.root)?;
    let options = analysis_options(&args, global)?;
    let backend = args.search.backend(&global.config)?;
    let ctx = global.config.similarity_context();

    let mut report = dedup::analyze_path(&root, &options, backend.as_ref(), &ctx)?;

    if let Some(group_id) = args.group {
        let candidate = report
            .candidates
            .into_iter()
            .find(|c| c.group.id == group_id)
            .ok_or_else(|| {
                unclone::Error::validation_invalid_argument(
                    "group",
                    format!("No duplication group with id {}", group_id),
                    Some(group_id.to_string()),
                    None,
                )
            })?;
        return Ok((AnalyzeOutput::Group(Box::new(candidate)), 0));
    }

    if let Some(top) = args.top {
        report.candidates.truncate(top);
        report.recommendations.truncate(top);
    }

    let exit_code = if report.summary.duplicate_groups > 0 { 1 } else { 0 };
    Ok((AnalyzeOutput::Report(report), exit_code))
}

pub(crate) fn analysis_options(
    args: &AnalyzeArgs,
    global: &GlobalArgs,
) -> unclone::Result<dedup::AnalysisOptions> {
    let mut options = global.config.analysis_options()?;

    if let Some(min_similarity) = args.min_similarity {
        if !(0.0..=1.0).contains(&min_similarity) {
            return Err(unclone::Error::validation_invalid_argument(
                "min_similarity",
                "Must be within [0, 1]",
                Some(min_similarity.to_string()),
                None,
            ));
        }
        options.min_similarity = min_similarity;
    }
    if let Some(min_lines) = args.min_lines {
        options.min_lines = min_lines;
    }
    if !args.languages.is_empty() {
        options.languages = args
            .languages
            .iter()
            .map(|l| Language::parse(l))
            .collect::<unclone::Result<Vec<_>>>()?;
    }
    if !args.kinds.is_empty() {
        options.kinds = args
            .kinds
            .iter()
            .map(|k| {
                ConstructKind::parse(k).ok_or_else(|| {
                    unclone::Error::validation_invalid_argument(
                        "kind",
                        format!("Unknown construct kind '{}'", k),
                        None,
                        Some(vec!["function".into(), "method".into(), "class".into()]),
                    )
                })
            })
            .collect::<unclone::Result<Vec<_>>>()?;
    }
    options.exclude.extend(args.exclude.iter().cloned());
    options.skip_impact = args.skip_impact;

    Ok(options)
}
