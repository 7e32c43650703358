use std::collections::BTreeSet;
use std::path::PathBuf;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::cache::SimilarityContext;
use crate::construct::{Construct, ConstructKind};
use crate::error::{Error, Result};
use crate::language::Language;

/// Constructs judged similar enough to refactor together.
///
/// Instance 0 is the seed and acts as the representative for inference and
/// code generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicationGroup {
    pub id: usize,
    pub language: Language,
    pub instances: Vec<Construct>,
    /// Mean seed-to-member similarity.
    pub similarity: f64,
}

impl DuplicationGroup {
    pub fn representative(&self) -> &Construct {
        &self.instances[0]
    }

    pub fn kind(&self) -> ConstructKind {
        self.representative().kind
    }

    /// Distinct files in first-seen order.
    pub fn files(&self) -> Vec<PathBuf> {
        let mut seen = BTreeSet::new();
        self.instances
            .iter()
            .filter(|c| seen.insert(c.file.clone()))
            .map(|c| c.file.clone())
            .collect()
    }

    pub fn is_multi_file(&self) -> bool {
        self.files().len() > 1
    }

    /// Non-blank lines of the representative.
    pub fn lines_per_instance(&self) -> usize {
        self.representative().line_count()
    }

    pub fn duplicated_lines(&self) -> usize {
        self.instances.iter().map(|c| c.line_count()).sum()
    }
}

/// Greedy first-fit clustering in input order.
///
/// Each unclustered construct seeds a group and absorbs every later
/// unclustered construct of the same language scoring at least
/// `min_similarity` against the seed. Singletons are dropped.
pub fn group(
    constructs: &[Construct],
    min_similarity: f64,
    min_lines: usize,
    ctx: &SimilarityContext,
) -> Result<Vec<DuplicationGroup>> {
    if !(0.0..=1.0).contains(&min_similarity) {
        return Err(Error::validation_invalid_argument(
            "min_similarity",
            format!("Must be within [0, 1], got {}", min_similarity),
            None,
            None,
        ));
    }

    let eligible: Vec<&Construct> = constructs
        .iter()
        .filter(|c| c.line_count() >= min_lines)
        .collect();
    if eligible.len() < 2 {
        return Ok(Vec::new());
    }

    let mut used = vec![false; eligible.len()];
    let mut groups = Vec::new();

    for seed_idx in 0..eligible.len() {
        if used[seed_idx] {
            continue;
        }
        let seed = eligible[seed_idx];

        let candidates: Vec<usize> = (seed_idx + 1..eligible.len())
            .filter(|&j| !used[j] && eligible[j].language == seed.language)
            .collect();
        let scores: Vec<(usize, f64)> = candidates
            .par_iter()
            .map(|&j| (j, ctx.compare(&seed.text, &eligible[j].text).score))
            .filter(|(_, score)| *score >= min_similarity)
            .collect();

        if scores.is_empty() {
            continue;
        }

        used[seed_idx] = true;
        let mut instances = vec![seed.clone()];
        for (j, _) in &scores {
            used[*j] = true;
            instances.push(eligible[*j].clone());
        }
        let similarity = scores.iter().map(|(_, s)| s).sum::<f64>() / scores.len() as f64;

        groups.push(DuplicationGroup {
            id: groups.len(),
            language: seed.language,
            instances,
            similarity,
        });
    }

    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::similarity::SimilarityConfig;

    fn construct(file: &str, line: usize, text: &str) -> Construct {
        let lines = text.lines().count();
        Construct::new(Language::Python, file, (line, 0), (line + lines - 1, 0), text)
    }

    fn ctx() -> SimilarityContext {
        SimilarityContext::new(SimilarityConfig::default())
    }

    const A: &str = "def load_users(db):\n    rows = db.query(\"users\")\n    result = []\n    for row in rows:\n        result.append(row)\n    return result";
    const B: &str = "def load_orders(db):\n    rows = db.query(\"orders\")\n    result = []\n    for row in rows:\n        result.append(row)\n    return result";
    const C: &str = "class Settings:\n    debug = False\n    verbose = True\n    name = \"app\"\n    level = 3";

    #[test]
    fn groups_similar_constructs() {
        let items = vec![construct("/p/a.py", 1, A), construct("/p/b.py", 1, C), construct("/p/c.py", 10, B)];
        let groups = group(&items, 0.8, 3, &ctx()).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].instances.len(), 2);
        assert_eq!(groups[0].representative().file, PathBuf::from("/p/a.py"));
        assert_eq!(groups[0].id, 0);
        assert!(groups[0].similarity >= 0.8);
        assert!(groups[0].is_multi_file());
    }

    #[test]
    fn empty_and_single_inputs_yield_nothing() {
        assert!(group(&[], 0.8, 3, &ctx()).unwrap().is_empty());
        assert!(group(&[construct("/p/a.py", 1, A)], 0.8, 3, &ctx())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn short_constructs_are_filtered() {
        let items = vec![construct("/p/a.py", 1, A), construct("/p/b.py", 1, B)];
        assert!(group(&items, 0.8, 10, &ctx()).unwrap().is_empty());
    }

    #[test]
    fn invalid_threshold_is_rejected() {
        let err = group(&[], 1.5, 3, &ctx()).unwrap_err();
        assert_eq!(err.code.as_str(), "validation.invalid_argument");
    }

    #[test]
    fn grouping_is_deterministic() {
        let items = vec![
            construct("/p/a.py", 1, A),
            construct("/p/b.py", 1, B),
            construct("/p/c.py", 1, A),
            construct("/p/d.py", 1, C),
        ];
        let first = group(&items, 0.8, 3, &ctx()).unwrap();
        let second = group(&items, 0.8, 3, &ctx()).unwrap();
        assert_eq!(first.len(), second.len());
        for (g1, g2) in first.iter().zip(&second) {
            let f1: Vec<_> = g1.instances.iter().map(|c| c.file.clone()).collect();
            let f2: Vec<_> = g2.instances.iter().map(|c| c.file.clone()).collect();
            assert_eq!(f1, f2);
            assert!(g1.instances.len() >= 2);
        }
    }

    #[test]
    fn languages_are_never_mixed() {
        let js = Construct::new(Language::JavaScript, "/p/a.js", (1, 0), (6, 0), A);
        let items = vec![construct("/p/a.py", 1, A), js];
        assert!(group(&items, 0.5, 3, &ctx()).unwrap().is_empty());
    }
}
