//! Duplicate detection and refactor planning.
//!
//! Works in phases:
//!
//! 1. Asking the search backend for constructs of each language
//! 2. Grouping near-duplicates with the two-stage similarity engine
//! 3. Inferring parameters and generating a refactoring plan per group
//! 4. Scoring complexity and impact, then ranking the candidates

mod cache;
pub mod codegen;
pub mod complexity;
mod grouper;
pub mod impact;
pub mod naming;
pub mod parameters;
mod plan;
pub mod similarity;
pub mod types;

use std::path::{Path, PathBuf};

use glob_match::glob_match;
use rayon::prelude::*;
use serde::Serialize;

pub use cache::{CacheStats, EvictionPolicy, LruTtl, NoExpiry, SimilarityCache, SimilarityContext};
pub use complexity::{Complexity, ComplexityFactors, ComplexityLevel, Rankable};
pub use grouper::{group, DuplicationGroup};
pub use impact::{ImpactReport, RiskLevel};
pub use parameters::{ParameterCandidate, ParameterOrigin, UnalignedRegion};
pub use plan::{FileReplacement, GeneratedCode, LineChange, RefactoringPlan, Strategy};
pub use similarity::{similarity, SimilarityConfig, SimilarityResult};
pub use types::InferredType;

use crate::construct::ConstructKind;
use crate::error::{Error, Result};
use crate::language::Language;
use crate::search::SearchBackend;

#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    /// Languages to scan. Empty means every supported language.
    pub languages: Vec<Language>,
    pub kinds: Vec<ConstructKind>,
    pub min_similarity: f64,
    pub min_lines: usize,
    /// Skip the external-reference search.
    pub skip_impact: bool,
    /// Glob patterns, matched against root-relative paths, whose files are
    /// left out of grouping.
    pub exclude: Vec<String>,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            languages: Vec::new(),
            kinds: vec![ConstructKind::Function, ConstructKind::Method],
            min_similarity: 0.8,
            min_lines: 5,
            skip_impact: false,
            exclude: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisSummary {
    pub total_constructs: usize,
    pub duplicate_groups: usize,
    pub duplicated_lines: usize,
    pub potential_savings: usize,
}

/// One duplication group with everything needed to decide on and apply it.
#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    pub group: DuplicationGroup,
    pub similarity: f64,
    pub parameters: Vec<ParameterCandidate>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unaligned_regions: Vec<UnalignedRegion>,
    pub complexity: Complexity,
    pub plan: RefactoringPlan,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub impact: Option<ImpactReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub impact_error: Option<String>,
    pub has_tests: bool,
    pub lines_saved: usize,
    pub score: f64,
}

impl Rankable for Candidate {
    fn lines_saved(&self) -> usize {
        self.lines_saved
    }

    fn complexity_score(&self) -> f64 {
        self.complexity.score
    }

    fn has_tests(&self) -> bool {
        self.has_tests
    }

    fn affected_files(&self) -> usize {
        self.plan.files_affected.len()
    }

    fn external_call_sites(&self) -> usize {
        self.impact
            .as_ref()
            .map(|i| i.external_call_sites.len())
            .unwrap_or(0)
    }

    fn score(&self) -> f64 {
        self.score
    }

    fn set_score(&mut self, score: f64) {
        self.score = score;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    pub group_id: usize,
    pub function_name: String,
    pub strategy: Strategy,
    pub score: f64,
    pub lines_saved: usize,
    pub complexity: ComplexityLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskLevel>,
    pub files: Vec<PathBuf>,
}

/// A group that could not be planned.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateError {
    pub group_id: usize,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub root: PathBuf,
    pub backend: String,
    pub summary: AnalysisSummary,
    pub candidates: Vec<Candidate>,
    pub recommendations: Vec<Recommendation>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<CandidateError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheStats>,
}

// ============================================================================
// Public API
// ============================================================================

/// Find duplicated constructs under `root` and plan a refactor for each group.
pub fn analyze_path(
    root: &Path,
    options: &AnalysisOptions,
    search: &dyn SearchBackend,
    ctx: &SimilarityContext,
) -> Result<AnalysisReport> {
    if !root.exists() {
        return Err(Error::validation_invalid_argument(
            "root",
            format!("Path does not exist: {}", root.display()),
            None,
            None,
        ));
    }
    if options.kinds.is_empty() {
        return Err(Error::validation_invalid_argument(
            "kinds",
            "At least one construct kind is required",
            None,
            Some(vec!["function".into(), "method".into(), "class".into()]),
        ));
    }

    let languages: Vec<Language> = if options.languages.is_empty() {
        Language::ALL.to_vec()
    } else {
        options.languages.clone()
    };

    log_status!("analyze", "Scanning {} with {}...", root.display(), search.name());

    // Phase 1: constructs per language
    let mut constructs = Vec::new();
    for language in languages {
        constructs.extend(search.find_constructs(root, language, &options.kinds)?);
    }
    if !options.exclude.is_empty() {
        constructs.retain(|c| !is_excluded(&c.file, root, &options.exclude));
    }

    // Phase 2: grouping
    let mut groups = group(constructs.as_slice(), options.min_similarity, options.min_lines, ctx)?;
    for (id, g) in groups.iter_mut().enumerate() {
        g.id = id;
    }
    log_status!(
        "analyze",
        "{} constructs, {} duplicate group(s)",
        constructs.len(),
        groups.len()
    );

    // Phase 3: plans, scored in parallel
    let outcomes: Vec<std::result::Result<Candidate, CandidateError>> = groups
        .par_iter()
        .map(|g| build_candidate(g, root, search, options.skip_impact))
        .collect();

    let mut candidates = Vec::new();
    let mut errors = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(candidate) => candidates.push(candidate),
            Err(error) => errors.push(error),
        }
    }

    // Phase 4: ranking
    let candidates = complexity::rank(&candidates);
    let recommendations = candidates.iter().map(recommendation).collect();

    let summary = AnalysisSummary {
        total_constructs: constructs.len(),
        duplicate_groups: groups.len(),
        duplicated_lines: groups.iter().map(DuplicationGroup::duplicated_lines).sum(),
        potential_savings: candidates.iter().map(|c| c.lines_saved).sum(),
    };

    log_status!(
        "analyze",
        "Complete: {} candidate(s), ~{} line(s) saveable",
        candidates.len(),
        summary.potential_savings
    );

    Ok(AnalysisReport {
        root: root.to_path_buf(),
        backend: search.name().to_string(),
        summary,
        candidates,
        recommendations,
        errors,
        cache: ctx.stats(),
    })
}

fn is_excluded(file: &Path, root: &Path, patterns: &[String]) -> bool {
    let relative = file.strip_prefix(root).unwrap_or(file);
    let value = relative.to_string_lossy().replace('\\', "/");
    patterns.iter().any(|pattern| glob_match(pattern, &value))
}

fn build_candidate(
    group: &DuplicationGroup,
    root: &Path,
    search: &dyn SearchBackend,
    skip_impact: bool,
) -> std::result::Result<Candidate, CandidateError> {
    let fail = |e: Error| CandidateError {
        group_id: group.id,
        code: e.code.as_str().to_string(),
        message: e.message,
    };

    let inference = parameters::infer_detailed(group);
    let mut plan = codegen::generate(group, &inference.parameters, group.language).map_err(fail)?;
    plan.notes.extend(inference.notes.iter().cloned());

    let factors = ComplexityFactors::from_group(group, &inference.parameters, &plan);
    let complexity = complexity::complexity(&factors);

    // A failed search only costs this candidate its impact report.
    let (impact, impact_error) = if skip_impact {
        (None, None)
    } else {
        match impact::analyze(group, root, group.language, search, Some(&plan)) {
            Ok(report) => (Some(report), None),
            Err(e) => (None, Some(e.message)),
        }
    };

    let files = group.files();
    Ok(Candidate {
        similarity: group.similarity,
        parameters: inference.parameters,
        unaligned_regions: inference.unaligned_regions,
        complexity,
        impact,
        impact_error,
        has_tests: impact::has_test_coverage(&files, root),
        lines_saved: group.instances.len().saturating_sub(1) * group.lines_per_instance(),
        score: 0.0,
        plan,
        group: group.clone(),
    })
}

fn recommendation(candidate: &Candidate) -> Recommendation {
    Recommendation {
        group_id: candidate.group.id,
        function_name: candidate.plan.generated_code.function_name.clone(),
        strategy: candidate.plan.strategy,
        score: candidate.score,
        lines_saved: candidate.lines_saved,
        complexity: candidate.complexity.level,
        risk: candidate.impact.as_ref().map(|i| i.breaking_change_risk.level),
        files: candidate.group.files(),
    }
}
