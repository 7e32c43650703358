//! Refactor difficulty scoring and candidate ranking.

use serde::{Deserialize, Serialize};

use super::grouper::DuplicationGroup;
use super::parameters::ParameterCandidate;
use super::plan::RefactoringPlan;
use crate::lexer::{self, TokenKind};

const MAX_RAW: f64 = 30.0;
const LINE_CAP: usize = 50;

const BRANCH_WORDS: &[&str] = &[
    "if", "elif", "elsif", "unless", "for", "foreach", "while", "until", "case", "when",
    "catch", "except", "rescue", "&&", "||", "and", "or",
];

/// Inputs to [`complexity`]. Every factor defaults to zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplexityFactors {
    pub parameter_count: usize,
    pub parameter_type_complexity: f64,
    pub control_flow_branches: usize,
    pub import_count: usize,
    pub cross_file_dependency: usize,
    pub line_count: usize,
    pub nesting_depth: usize,
    pub return_complexity: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityLevel {
    Low,
    Medium,
    High,
}

impl ComplexityLevel {
    fn for_score(score: f64) -> Self {
        if score <= 3.0 {
            ComplexityLevel::Low
        } else if score <= 6.0 {
            ComplexityLevel::Medium
        } else {
            ComplexityLevel::High
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Complexity {
    /// 1.0 (trivial) to 10.0 (hard).
    pub score: f64,
    pub level: ComplexityLevel,
    pub raw: f64,
    pub factors: ComplexityFactors,
}

/// Weighted sum of `factors`, clamped to [0, 30] and rescaled to [1, 10].
pub fn complexity(factors: &ComplexityFactors) -> Complexity {
    let raw = factors.parameter_count as f64 * 1.5
        + factors.parameter_type_complexity
        + factors.control_flow_branches as f64 * 2.5
        + factors.import_count as f64
        + factors.cross_file_dependency as f64 * 2.0
        + factors.line_count.min(LINE_CAP) as f64 * 0.1
        + factors.nesting_depth as f64 * 1.5
        + factors.return_complexity as f64;
    let raw = raw.clamp(0.0, MAX_RAW);
    let score = 1.0 + raw / MAX_RAW * 9.0;
    Complexity {
        score,
        level: ComplexityLevel::for_score(score),
        raw,
        factors: factors.clone(),
    }
}

impl ComplexityFactors {
    /// Derive factors from a group's representative, its parameters and plan.
    pub fn from_group(
        group: &DuplicationGroup,
        parameters: &[ParameterCandidate],
        plan: &RefactoringPlan,
    ) -> Self {
        let rep = group.representative();
        let signature = rep.signature();
        let body = signature.body(&rep.text);
        let tokens = lexer::tokenize(body, Some(rep.language));

        let control_flow_branches = tokens
            .iter()
            .filter(|t| matches!(t.kind, TokenKind::Keyword | TokenKind::Punct | TokenKind::Ident))
            .filter(|t| BRANCH_WORDS.contains(&t.text))
            .count();
        let returns = tokens.iter().filter(|t| t.is("return")).count();

        Self {
            parameter_count: parameters.len(),
            parameter_type_complexity: parameters
                .iter()
                .map(|p| p.inferred_type.complexity())
                .sum(),
            control_flow_branches,
            import_count: plan.generated_code.imports.values().map(Vec::len).sum(),
            cross_file_dependency: group.files().len().saturating_sub(1),
            line_count: group.lines_per_instance(),
            nesting_depth: nesting_depth(&rep.text),
            return_complexity: returns.max(usize::from(signature.returns_value)),
        }
    }
}

/// Indentation levels below the shallowest body line.
fn nesting_depth(text: &str) -> usize {
    let widths: Vec<usize> = text
        .lines()
        .skip(1)
        .filter(|l| {
            let t = l.trim();
            !t.is_empty() && !matches!(t, "}" | "};" | "end" | ")" | "});")
        })
        .map(|l| {
            l.chars()
                .take_while(|c| c.is_whitespace())
                .map(|c| if c == '\t' { 4 } else { 1 })
                .sum()
        })
        .collect();
    let Some(&base) = widths.iter().min() else {
        return 0;
    };
    let unit = widths
        .iter()
        .map(|w| w - base)
        .filter(|d| *d > 0)
        .min()
        .unwrap_or(4);
    widths.iter().map(|w| (w - base) / unit).max().unwrap_or(0)
}

/// Priority of a candidate in [0, 100]; higher means refactor first.
pub fn dedup_score(
    lines_saved: usize,
    complexity: f64,
    has_tests: bool,
    affected_files: usize,
    external_call_sites: usize,
) -> f64 {
    let savings = (lines_saved as f64 / 50.0).min(1.0) * 40.0;
    let ease = (10.0 - complexity) / 9.0 * 20.0;
    let tests = if has_tests { 25.0 } else { 0.0 };
    let footprint = (1.0 - ((affected_files + external_call_sites) as f64 / 20.0).min(1.0)) * 15.0;
    (savings + ease + tests + footprint).clamp(0.0, 100.0)
}

/// Anything [`rank`] can order.
pub trait Rankable {
    fn lines_saved(&self) -> usize;
    fn complexity_score(&self) -> f64;
    fn has_tests(&self) -> bool;
    fn affected_files(&self) -> usize;
    fn external_call_sites(&self) -> usize;
    fn score(&self) -> f64;
    fn set_score(&mut self, score: f64);
}

/// Score copies of `candidates` and sort them best first. Ties keep input order.
pub fn rank<T: Rankable + Clone>(candidates: &[T]) -> Vec<T> {
    let mut ranked: Vec<T> = candidates
        .iter()
        .map(|c| {
            let mut scored = c.clone();
            scored.set_score(dedup_score(
                c.lines_saved(),
                c.complexity_score(),
                c.has_tests(),
                c.affected_files(),
                c.external_call_sites(),
            ));
            scored
        })
        .collect();
    ranked.sort_by(|a, b| b.score().total_cmp(&a.score()));
    ranked
}
