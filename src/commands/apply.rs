use clap::Args;
use serde::Serialize;
use serde_json::Value;

use unclone::dedup::{self, RefactoringPlan};
use unclone::refactor::{self, ApplyOptions, ApplyResult, ProjectLock};

use super::{CmdResult, GlobalArgs, SearchArgs};

#[derive(Args)]
pub struct ApplyArgs {
    /// Project root the plan's paths live under
    #[arg(long, default_value = ".")]
    pub root: String,

    /// Refactoring plan JSON (inline, @file, or - for stdin)
    #[arg(long, value_name = "JSON", conflicts_with = "group", required_unless_present = "group")]
    pub plan: Option<String>,

    /// Re-run analysis and apply the plan for this group id
    #[arg(long, value_name = "GROUP_ID")]
    pub group: Option<usize>,

    /// Show per-file diffs without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Do not snapshot files before writing
    #[arg(long)]
    pub no_backup: bool,

    /// Skip the confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,

    #[command(flatten)]
    pub search: SearchArgs,
}

#[derive(Serialize)]
pub struct ApplyOutput {
    command: String,
    root: String,
    applied: bool,
    #[serde(flatten)]
    result: Option<ApplyResult>,
}

pub fn run(args: ApplyArgs, global: &GlobalArgs) -> CmdResult<ApplyOutput> {
    let root = super::resolve_root(&args.root)?;
    let plan = match (&args.plan, args.group) {
        (Some(spec), _) => parse_plan(&super::read_json_spec_to_string(spec)?)?,
        (None, Some(group_id)) => plan_for_group(&root, group_id, &args.search, global)?,
        (None, None) => {
            return Err(unclone::Error::validation_missing_argument(vec![
                "plan".to_string(),
                "group".to_string(),
            ]))
        }
    };

    let mut options = ApplyOptions::new(&root);
    options.dry_run = args.dry_run;
    options.backup = !args.no_backup;
    options.backup_dir_name = global.config.backups.dir_name.clone();

    if args.dry_run {
        let result = refactor::apply(&plan, &options)?;
        return Ok((output(&root, false, Some(result)), 0));
    }

    if !args.yes && !confirmed(&plan)? {
        return Ok((output(&root, false, None), 1));
    }

    let _lock = ProjectLock::acquire(&root.join(&options.backup_dir_name))?;
    let result = refactor::apply(&plan, &options)?;
    Ok((output(&root, true, Some(result)), 0))
}

fn output(root: &std::path::Path, applied: bool, result: Option<ApplyResult>) -> ApplyOutput {
    ApplyOutput {
        command: "apply".to_string(),
        root: root.display().to_string(),
        applied,
        result,
    }
}

/// Accepts a bare plan, an `analyze --group` candidate, or either wrapped
/// in the CLI response envelope.
pub(crate) fn parse_plan(raw: &str) -> unclone::Result<RefactoringPlan> {
    let mut value: Value = serde_json::from_str(raw).map_err(|e| {
        unclone::Error::validation_invalid_json(
            e,
            Some("parse plan".to_string()),
            Some(raw.chars().take(200).collect::<String>()),
        )
    })?;
    if let Some(data) = value.get_mut("data").map(Value::take) {
        value = data;
    }
    if let Some(plan) = value.get_mut("plan").map(Value::take) {
        value = plan;
    }
    serde_json::from_value(value).map_err(|e| {
        unclone::Error::validation_invalid_json(e, Some("deserialize plan".to_string()), None)
    })
}

fn plan_for_group(
    root: &std::path::Path,
    group_id: usize,
    search: &SearchArgs,
    global: &GlobalArgs,
) -> unclone::Result<RefactoringPlan> {
    let mut options = global.config.analysis_options()?;
    options.skip_impact = true;
    let backend = search.backend(&global.config)?;
    let report = dedup::analyze_path(
        root,
        &options,
        backend.as_ref(),
        &global.config.similarity_context(),
    )?;
    report
        .candidates
        .into_iter()
        .find(|c| c.group.id == group_id)
        .map(|c| c.plan)
        .ok_or_else(|| {
            unclone::Error::validation_invalid_argument(
                "group",
                format!("No duplication group with id {}", group_id),
                Some(group_id.to_string()),
                None,
            )
            .with_hint("Run 'unclone analyze <root>' to list group ids")
        })
}

fn confirmed(plan: &RefactoringPlan) -> unclone::Result<bool> {
    if !crate::tty::is_stdin_tty() {
        return Err(unclone::Error::validation_invalid_argument(
            "yes",
            "Refusing to write without confirmation on a non-interactive stdin",
            None,
            None,
        )
        .with_hint("Pass --yes to apply, or --dry-run to preview"));
    }
    for path in plan.written_paths() {
        eprintln!("  {}", path.display());
    }
    crate::tty::confirm(&format!(
        "Extract '{}' and rewrite the files above?",
        plan.generated_code.function_name
    ))
}
