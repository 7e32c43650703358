//! Two-stage code similarity.
//!
//! Stage 1 estimates Jaccard similarity of token shingles with a min-hash
//! signature and exits early for clearly unrelated inputs. Stage 2 verifies
//! survivors with a longest-common-subsequence ratio over normalized tokens,
//! or over a per-statement structural summary for very long inputs.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use similar::{capture_diff_slices, Algorithm, DiffOp};

use crate::error::{Error, Result};
use crate::lexer::{self, IdentMode};

const WEIGHT_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityConfig {
    pub shingle_size: usize,
    pub num_hashes: usize,
    pub early_exit_threshold: f64,
    pub stage1_weight: f64,
    pub stage2_weight: f64,
    pub max_lines_for_full_compare: usize,
    pub normalize_identifiers: bool,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            shingle_size: 3,
            num_hashes: 128,
            early_exit_threshold: 0.5,
            stage1_weight: 0.4,
            stage2_weight: 0.6,
            max_lines_for_full_compare: 400,
            normalize_identifiers: true,
        }
    }
}

impl SimilarityConfig {
    /// Build a config with custom stage weights and early-exit threshold.
    pub fn new(stage1_weight: f64, stage2_weight: f64, early_exit_threshold: f64) -> Result<Self> {
        let config = Self {
            stage1_weight,
            stage2_weight,
            early_exit_threshold,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if (self.stage1_weight + self.stage2_weight - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(Error::config_invalid_value(
                "similarity.stage1_weight",
                Some(format!("{} + {}", self.stage1_weight, self.stage2_weight)),
                "Stage weights must sum to 1.0",
            ));
        }
        for (key, value) in [
            ("similarity.stage1_weight", self.stage1_weight),
            ("similarity.stage2_weight", self.stage2_weight),
            ("similarity.early_exit_threshold", self.early_exit_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::config_invalid_value(
                    key,
                    Some(value.to_string()),
                    "Must be within [0, 1]",
                ));
            }
        }
        if self.shingle_size == 0 {
            return Err(Error::config_invalid_value(
                "similarity.shingle_size",
                Some("0".to_string()),
                "Must be at least 1",
            ));
        }
        if self.num_hashes == 0 {
            return Err(Error::config_invalid_value(
                "similarity.num_hashes",
                Some("0".to_string()),
                "Must be at least 1",
            ));
        }
        Ok(())
    }

    fn ident_mode(&self) -> IdentMode {
        if self.normalize_identifiers {
            IdentMode::Positional
        } else {
            IdentMode::Verbatim
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarityResult {
    pub score: f64,
    pub stage1_score: f64,
    pub stage2_score: Option<f64>,
    pub verified: bool,
    pub early_exit: bool,
}

impl SimilarityResult {
    fn empty() -> Self {
        Self {
            score: 0.0,
            stage1_score: 0.0,
            stage2_score: None,
            verified: false,
            early_exit: false,
        }
    }
}

/// Score two code fragments in `[0, 1]`. Deterministic and symmetric.
pub fn similarity(code_a: &str, code_b: &str, config: &SimilarityConfig) -> SimilarityResult {
    if code_a.trim().is_empty() || code_b.trim().is_empty() {
        return SimilarityResult::empty();
    }

    let mode = config.ident_mode();
    let tokens_a = lexer::normalize(&lexer::tokenize(code_a, None), mode);
    let tokens_b = lexer::normalize(&lexer::tokenize(code_b, None), mode);
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return SimilarityResult::empty();
    }

    let sig_a = MinHash::from_tokens(&tokens_a, config.shingle_size, config.num_hashes);
    let sig_b = MinHash::from_tokens(&tokens_b, config.shingle_size, config.num_hashes);
    let stage1 = sig_a.jaccard_estimate(&sig_b);

    if stage1 < config.early_exit_threshold {
        return SimilarityResult {
            score: stage1,
            stage1_score: stage1,
            stage2_score: None,
            verified: false,
            early_exit: true,
        };
    }

    let stage2 = verify(code_a, code_b, config);
    let score = (config.stage1_weight * stage1 + config.stage2_weight * stage2).clamp(0.0, 1.0);

    SimilarityResult {
        score,
        stage1_score: stage1,
        stage2_score: Some(stage2),
        verified: true,
        early_exit: false,
    }
}

fn verify(code_a: &str, code_b: &str, config: &SimilarityConfig) -> f64 {
    let norm_a = normalize_source(code_a);
    let norm_b = normalize_source(code_b);
    let too_long = norm_a.lines().count() > config.max_lines_for_full_compare
        || norm_b.lines().count() > config.max_lines_for_full_compare;

    let (seq_a, seq_b) = if too_long {
        (structural_summary(&norm_a), structural_summary(&norm_b))
    } else {
        let mode = config.ident_mode();
        (
            lexer::normalize(&lexer::tokenize(&norm_a, None), mode),
            lexer::normalize(&lexer::tokenize(&norm_b, None), mode),
        )
    };
    lcs_ratio(&seq_a, &seq_b)
}

/// `2 * LCS / (|a| + |b|)` computed from an optimal diff.
pub fn lcs_ratio<T: Eq + Hash + Ord>(a: &[T], b: &[T]) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let matched: usize = capture_diff_slices(Algorithm::Myers, a, b)
        .iter()
        .map(|op| match op {
            DiffOp::Equal { len, .. } => *len,
            _ => 0,
        })
        .sum();
    (2 * matched) as f64 / (a.len() + b.len()) as f64
}

/// Strip comments, drop blank lines and re-indent with canonical two-space steps.
pub fn normalize_source(code: &str) -> String {
    let masked = lexer::mask_comments(code, None);
    let mut indents: Vec<usize> = Vec::new();
    let mut out = Vec::new();
    for line in masked.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let width = line
            .chars()
            .take_while(|c| c.is_whitespace())
            .map(|c| if c == '\t' { 4 } else { 1 })
            .sum::<usize>();
        while indents.last().map(|w| *w > width).unwrap_or(false) {
            indents.pop();
        }
        if indents.last().map(|w| *w < width).unwrap_or(true) {
            indents.push(width);
        }
        let level = indents.len().saturating_sub(1);
        out.push(format!("{}{}", "  ".repeat(level), trimmed));
    }
    out.join("\n")
}

/// One symbolic token per statement.
pub fn structural_summary(normalized: &str) -> Vec<String> {
    normalized
        .lines()
        .map(|line| statement_kind(line.trim()).to_string())
        .collect()
}

fn statement_kind(line: &str) -> &'static str {
    let first = line
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .find(|w| !w.is_empty())
        .unwrap_or("");
    let starts_word = |words: &[&str]| words.contains(&first);

    if line.chars().all(|c| matches!(c, '}' | ')' | ']' | ';' | ',')) || line == "end" {
        return "CLOSE";
    }
    if starts_word(&["import", "from", "use", "require", "require_once", "include", "package", "using"]) {
        return "IMPORT";
    }
    if starts_word(&["class", "struct", "interface", "trait", "impl", "module", "enum"]) {
        return "CLASS";
    }
    if starts_word(&["def", "function", "fn", "func"]) {
        return "DEF";
    }
    if line.starts_with('}') && line.contains("else") || starts_word(&["else", "elif", "elsif"]) {
        return "ELSE";
    }
    if starts_word(&["if", "unless", "switch", "match", "case", "when"]) {
        return "IF";
    }
    if starts_word(&["for", "while", "loop", "foreach", "until", "do"]) {
        return "LOOP";
    }
    if starts_word(&["return", "yield"]) {
        return "RETURN";
    }
    if starts_word(&["try", "begin"]) {
        return "TRY";
    }
    if starts_word(&["except", "catch", "rescue", "finally", "ensure"]) || line.starts_with("} catch") {
        return "CATCH";
    }
    if has_assignment(line) {
        return "ASSIGN";
    }
    if line.contains('(') {
        return "CALL";
    }
    "OTHER"
}

fn has_assignment(line: &str) -> bool {
    let bytes = line.as_bytes();
    bytes.iter().enumerate().any(|(i, &b)| {
        b == b'='
            && bytes.get(i + 1) != Some(&b'=')
            && bytes.get(i + 1) != Some(&b'>')
            && !matches!(
                i.checked_sub(1).and_then(|p| bytes.get(p)),
                Some(b'=') | Some(b'!') | Some(b'<') | Some(b'>')
            )
    })
}

/// Min-hash signature over k-token shingles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinHash {
    hashes: Vec<u64>,
}

impl MinHash {
    pub fn from_tokens(tokens: &[String], k: usize, num_hashes: usize) -> Self {
        let shingles = shingles(tokens, k);
        let mut hashes = vec![u64::MAX; num_hashes];
        for &shingle in &shingles {
            for (i, slot) in hashes.iter_mut().enumerate() {
                let h = mix(shingle ^ mix(i as u64 + 1));
                *slot = (*slot).min(h);
            }
        }
        Self { hashes }
    }

    pub fn jaccard_estimate(&self, other: &Self) -> f64 {
        if self.hashes.is_empty() || self.hashes.len() != other.hashes.len() {
            return 0.0;
        }
        let matches = self
            .hashes
            .iter()
            .zip(&other.hashes)
            .filter(|(a, b)| a == b)
            .count();
        matches as f64 / self.hashes.len() as f64
    }
}

fn shingles(tokens: &[String], k: usize) -> HashSet<u64> {
    let mut set = HashSet::new();
    if tokens.len() < k {
        set.insert(hash_of(tokens));
        return set;
    }
    for window in tokens.windows(k) {
        set.insert(hash_of(window));
    }
    set
}

fn hash_of<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

// splitmix64 finalizer
fn mix(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

/// Content fingerprint used as a cache key component.
pub fn content_hash(code: &str) -> u64 {
    hash_of(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADD: &str = "def add_totals(items):\n    total = 0\n    for item in items:\n        total += item.price\n    return total";

    #[test]
    fn identical_input_scores_high() {
        let result = similarity(ADD, ADD, &SimilarityConfig::default());
        assert!(result.score >= 0.95, "score {}", result.score);
        assert!(result.verified);
        assert!(!result.early_exit);
    }

    #[test]
    fn empty_input_scores_zero_without_stages() {
        let result = similarity("   \n", ADD, &SimilarityConfig::default());
        assert_eq!(result.score, 0.0);
        assert!(!result.verified);
        assert!(!result.early_exit);
        assert_eq!(result.stage2_score, None);
    }

    #[test]
    fn unrelated_input_exits_at_stage_one() {
        let other = "class Logger:\n    level = \"info\"\n    handlers = []\n    enabled = True";
        let result = similarity(ADD, other, &SimilarityConfig::default());
        assert!(result.score < 0.5, "score {}", result.score);
        assert!(result.early_exit);
        assert_eq!(result.stage2_score, None);
    }

    #[test]
    fn renamed_identifiers_and_literals_still_match() {
        let a = "def greet_user(user):\n    message = \"Hello, \" + user.name\n    print(message)\n    return message";
        let b = "def greet_admin(user):\n    text = \"Welcome, \" + user.name\n    print(text)\n    return text";
        let result = similarity(a, b, &SimilarityConfig::default());
        assert!(result.score >= 0.95, "score {}", result.score);
    }

    #[test]
    fn similarity_is_symmetric() {
        let a = "function sum(xs) {\n  let t = 0;\n  for (const x of xs) { t += x; }\n  return t;\n}";
        let b = "function sum(xs) {\n  let t = 1;\n  for (const x of xs) { t *= x; }\n  console.log(t);\n  return t;\n}";
        let config = SimilarityConfig::default();
        let ab = similarity(a, b, &config);
        let ba = similarity(b, a, &config);
        assert_eq!(ab, ba);
    }

    #[test]
    fn identifier_normalization_can_be_disabled() {
        let a = "x = compute(alpha, beta)\ny = x + 1";
        let b = "p = compute(gamma, delta)\nq = p + 1";
        let strict = SimilarityConfig {
            normalize_identifiers: false,
            ..SimilarityConfig::default()
        };
        let loose = similarity(a, b, &SimilarityConfig::default()).score;
        let exact = similarity(a, b, &strict).score;
        assert!(loose > exact);
    }

    #[test]
    fn long_inputs_use_structural_summary() {
        let config = SimilarityConfig {
            max_lines_for_full_compare: 2,
            ..SimilarityConfig::default()
        };
        let result = similarity(ADD, ADD, &config);
        assert_eq!(result.stage2_score, Some(1.0));
    }

    #[test]
    fn config_rejects_bad_weights_and_sizes() {
        assert!(SimilarityConfig::new(0.5, 0.6, 0.5).is_err());
        assert!(SimilarityConfig::new(0.3, 0.7, 1.5).is_err());
        let err = SimilarityConfig::new(0.7, 0.2, 0.5).unwrap_err();
        assert_eq!(err.code.as_str(), "config.invalid_value");

        let zero_shingles = SimilarityConfig {
            shingle_size: 0,
            ..SimilarityConfig::default()
        };
        assert!(zero_shingles.validate().is_err());
        let zero_hashes = SimilarityConfig {
            num_hashes: 0,
            ..SimilarityConfig::default()
        };
        assert!(zero_hashes.validate().is_err());
        assert!(SimilarityConfig::new(0.25, 0.75, 0.4).is_ok());
    }

    #[test]
    fn structural_summary_kinds() {
        let code = "def f(x):\n  if x:\n    y = 1\n  else:\n    call(y)\n  return y";
        assert_eq!(
            structural_summary(&normalize_source(code)),
            vec!["DEF", "IF", "ASSIGN", "ELSE", "CALL", "RETURN"]
        );
    }

    #[test]
    fn normalize_source_canonicalizes_indentation() {
        let code = "if a:\n\n\tb = 1\n\t# note\n\tc = 2\nd = 3";
        assert_eq!(normalize_source(code), "if a:\n  b = 1\n  c = 2\nd = 3");
    }

    #[test]
    fn lcs_ratio_bounds() {
        let a = vec!["a", "b", "c"];
        let b = vec!["a", "x", "c"];
        assert!((lcs_ratio(&a, &b) - 4.0 / 6.0).abs() < 1e-9);
        assert_eq!(lcs_ratio(&a, &a), 1.0);
    }
}
