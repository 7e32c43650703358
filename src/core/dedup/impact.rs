//! Blast radius of a refactor: who else calls the duplicated code and how
//! risky changing it is.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::grouper::DuplicationGroup;
use super::plan::RefactoringPlan;
use crate::error::Result;
use crate::language::Language;
use crate::search::{Reference, SearchBackend};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    fn for_points(points: usize) -> Self {
        match points {
            0..=1 => RiskLevel::Low,
            2..=4 => RiskLevel::Medium,
            _ => RiskLevel::High,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinesChanged {
    pub additions: usize,
    pub deletions: usize,
    pub net_change: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakingChangeRisk {
    pub level: RiskLevel,
    pub factors: Vec<String>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactReport {
    /// Number of files the refactor writes.
    pub files_affected: usize,
    pub affected_paths: Vec<PathBuf>,
    pub external_call_sites: Vec<Reference>,
    pub lines_changed: LinesChanged,
    pub breaking_change_risk: BreakingChangeRisk,
}

/// Analyze the impact of refactoring `group`.
///
/// Search failures propagate; callers decide whether they are fatal.
pub fn analyze(
    group: &DuplicationGroup,
    project_root: &Path,
    language: Language,
    search: &dyn SearchBackend,
    plan: Option<&RefactoringPlan>,
) -> Result<ImpactReport> {
    let own_files = group.files();
    let names: BTreeSet<String> = group
        .instances
        .iter()
        .filter_map(|c| c.name.clone())
        .collect();

    let mut sites = BTreeSet::new();
    for name in &names {
        for reference in search.find_references(project_root, name, language, &own_files)? {
            sites.insert(reference);
        }
    }
    // One site per line even when several names appear on it.
    let mut seen_lines = BTreeSet::new();
    let external_call_sites: Vec<Reference> = sites
        .into_iter()
        .filter(|r| seen_lines.insert((r.file.clone(), r.line)))
        .collect();

    let affected_paths = plan
        .map(|p| p.files_affected.clone())
        .unwrap_or_else(|| own_files.clone());

    Ok(ImpactReport {
        lines_changed: lines_changed(group, plan, external_call_sites.len()),
        breaking_change_risk: assess_risk(group, project_root, &external_call_sites),
        files_affected: affected_paths.len(),
        affected_paths,
        external_call_sites,
    })
}

fn lines_changed(
    group: &DuplicationGroup,
    plan: Option<&RefactoringPlan>,
    external_sites: usize,
) -> LinesChanged {
    let n = group.instances.len();
    let per_instance = group.lines_per_instance();
    let (extracted, imports) = match plan {
        Some(p) => (
            p.generated_code
                .extracted_function
                .lines()
                .filter(|l| !l.trim().is_empty())
                .count(),
            p.generated_code.imports.values().map(Vec::len).sum(),
        ),
        None => (per_instance, 0),
    };
    let deletions = n.saturating_sub(1) * per_instance;
    let additions = extracted + imports + n + external_sites;
    LinesChanged {
        additions,
        deletions,
        net_change: additions as i64 - deletions as i64,
    }
}

fn assess_risk(
    group: &DuplicationGroup,
    project_root: &Path,
    external: &[Reference],
) -> BreakingChangeRisk {
    let profile = group.language.profile();
    let files = group.files();
    let mut points = 0usize;
    let mut factors = Vec::new();
    let mut recommendations = Vec::new();

    if !external.is_empty() {
        points += external.len();
        factors.push(format!("{} external reference(s) to the duplicated code", external.len()));
        recommendations.push(format!(
            "Review the {} external call site(s); original signatures are kept so they should keep working",
            external.len()
        ));
    }

    let exported: Vec<&str> = group
        .instances
        .iter()
        .filter(|c| profile.is_module_root_file(&c.file) || is_public(&c.text, c.name.as_deref(), group.language))
        .filter_map(|c| c.name.as_deref())
        .collect();
    if !exported.is_empty() {
        points += 2;
        factors.push(format!("Public or exported symbol(s): {}", exported.join(", ")));
        recommendations.push("Keep the existing public entry points; only their bodies delegate".to_string());
    }

    let dirs: BTreeSet<&Path> = files.iter().filter_map(|f| f.parent()).collect();
    if dirs.len() >= 3 {
        points += 2;
        factors.push(format!("Duplicates span {} directories", dirs.len()));
        recommendations.push("Check that the shared module location suits every directory".to_string());
    }

    if !files.is_empty() && files.iter().all(|f| profile.is_test_file(f)) {
        points = points.saturating_sub(2);
        factors.push("All affected files are tests".to_string());
    } else if !has_test_coverage(&files, project_root) {
        recommendations.push("Add tests covering the duplicated behaviour before applying".to_string());
    }

    recommendations.push("Run the test suite after applying and review the generated helper".to_string());

    BreakingChangeRisk {
        level: RiskLevel::for_points(points),
        factors,
        recommendations,
    }
}

/// Whether a construct is visible outside its module under the language's
/// naming and modifier conventions.
fn is_public(text: &str, name: Option<&str>, language: Language) -> bool {
    let header = text.lines().next().unwrap_or("").trim_start();
    match language {
        Language::Python => name.map(|n| !n.starts_with('_')).unwrap_or(false),
        Language::JavaScript | Language::TypeScript => header.starts_with("export"),
        Language::Rust => header.starts_with("pub ") || header.starts_with("pub("),
        Language::Go => name
            .and_then(|n| n.chars().next())
            .map(|c| c.is_uppercase())
            .unwrap_or(false),
        Language::Java => header.contains("public "),
        Language::Php => !header.contains("private ") && !header.contains("protected "),
        Language::Ruby => true,
    }
}

/// Whether every file has a conventional test file beside it or under a
/// top-level test directory.
pub fn has_test_coverage(files: &[PathBuf], project_root: &Path) -> bool {
    !files.is_empty() && files.iter().all(|f| file_has_tests(f, project_root))
}

fn file_has_tests(file: &Path, project_root: &Path) -> bool {
    let Some(language) = Language::from_path(file) else {
        return false;
    };
    if language == Language::Rust {
        if let Ok(content) = std::fs::read_to_string(file) {
            if content.contains("#[cfg(test)]") {
                return true;
            }
        }
    }

    let Some(stem) = file.file_stem().map(|s| s.to_string_lossy().to_string()) else {
        return false;
    };
    let ext = file
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_default();
    let candidates = test_file_names(&stem, &ext, language);

    let mut dirs: Vec<PathBuf> = Vec::new();
    if let Some(parent) = file.parent() {
        dirs.push(parent.to_path_buf());
        dirs.push(parent.join("tests"));
        dirs.push(parent.join("__tests__"));
    }
    for dir in ["tests", "test", "spec", "__tests__"] {
        dirs.push(project_root.join(dir));
    }

    dirs.iter().any(|dir| {
        candidates.iter().any(|name| {
            let candidate = dir.join(name);
            candidate != file && candidate.is_file()
        })
    })
}

fn test_file_names(stem: &str, ext: &str, language: Language) -> Vec<String> {
    match language {
        Language::Python => vec![format!("test_{}.py", stem), format!("{}_test.py", stem)],
        Language::JavaScript | Language::TypeScript => vec![
            format!("{}.test.{}", stem, ext),
            format!("{}.spec.{}", stem, ext),
        ],
        Language::Rust => vec![
            format!("{}.rs", stem),
            format!("{}_test.rs", stem),
            format!("{}_tests.rs", stem),
        ],
        Language::Go => vec![format!("{}_test.go", stem)],
        Language::Java => vec![format!("{}Test.java", stem), format!("{}Tests.java", stem)],
        Language::Php => vec![format!("{}Test.php", stem)],
        Language::Ruby => vec![format!("{}_spec.rb", stem), format!("test_{}.rb", stem)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::construct::{Construct, ConstructKind};
    use crate::error::Error;
    use crate::search::ReferenceKind;

    struct FixedSearch(Vec<Reference>);

    impl SearchBackend for FixedSearch {
        fn name(&self) -> &'static str {
            "fixed"
        }
        fn find_constructs(&self, _: &Path, _: Language, _: &[ConstructKind]) -> Result<Vec<Construct>> {
            Ok(Vec::new())
        }
        fn find_references(&self, _: &Path, _: &str, _: Language, _: &[PathBuf]) -> Result<Vec<Reference>> {
            Ok(self.0.clone())
        }
    }

    struct FailingSearch;

    impl SearchBackend for FailingSearch {
        fn name(&self) -> &'static str {
            "failing"
        }
        fn find_constructs(&self, _: &Path, _: Language, _: &[ConstructKind]) -> Result<Vec<Construct>> {
            Ok(Vec::new())
        }
        fn find_references(&self, _: &Path, _: &str, _: Language, _: &[PathBuf]) -> Result<Vec<Reference>> {
            Err(Error::search_timeout("ast-grep scan", 1))
        }
    }

    fn group(files: &[&str], name: &str) -> DuplicationGroup {
        let instances = files
            .iter()
            .map(|f| {
                let text = format!("def {}(a):\n    x = a + 1\n    return x", name);
                Construct::new(Language::Python, *f, (1, 0), (3, 12), text)
            })
            .collect();
        DuplicationGroup {
            id: 0,
            language: Language::Python,
            instances,
            similarity: 1.0,
        }
    }

    fn reference(file: &str, line: usize) -> Reference {
        Reference {
            file: PathBuf::from(file),
            line,
            kind: ReferenceKind::Call,
        }
    }

    #[test]
    fn private_local_duplicates_are_low_risk() {
        let g = group(&["/p/a.py", "/p/b.py"], "_helper");
        let report = analyze(&g, Path::new("/p"), Language::Python, &FixedSearch(vec![]), None).unwrap();
        assert_eq!(report.breaking_change_risk.level, RiskLevel::Low);
        assert!(!report.breaking_change_risk.recommendations.is_empty());
        assert_eq!(report.lines_changed.deletions, 3);
        assert_eq!(report.lines_changed.additions, 3 + 2);
        assert_eq!(report.lines_changed.net_change, 2);
    }

    #[test]
    fn files_affected_serializes_as_a_count() {
        let g = group(&["/p/a.py", "/p/b.py"], "load");
        let report = analyze(&g, Path::new("/p"), Language::Python, &FixedSearch(vec![]), None).unwrap();
        assert_eq!(report.files_affected, 2);
        assert_eq!(report.affected_paths, vec![PathBuf::from("/p/a.py"), PathBuf::from("/p/b.py")]);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["files_affected"], 2);
        assert_eq!(json["affected_paths"][1], "/p/b.py");
    }

    #[test]
    fn external_references_and_exports_escalate() {
        let g = group(&["/p/a/x.py", "/p/b/y.py", "/p/c/z.py"], "load");
        let refs = vec![reference("/p/main.py", 3), reference("/p/main.py", 3), reference("/p/cli.py", 9)];
        let report = analyze(&g, Path::new("/p"), Language::Python, &FixedSearch(refs), None).unwrap();
        assert_eq!(report.external_call_sites.len(), 2);
        // 2 references + exported + three directories
        assert_eq!(report.breaking_change_risk.level, RiskLevel::High);
        assert_eq!(report.breaking_change_risk.factors.len(), 3);
    }

    #[test]
    fn test_only_duplicates_reduce_risk() {
        let g = group(&["/p/tests/test_a.py", "/p/tests/test_b.py"], "load");
        let report = analyze(&g, Path::new("/p"), Language::Python, &FixedSearch(vec![]), None).unwrap();
        assert_eq!(report.breaking_change_risk.level, RiskLevel::Low);
    }

    #[test]
    fn search_failures_propagate() {
        let g = group(&["/p/a.py", "/p/b.py"], "load");
        let err = analyze(&g, Path::new("/p"), Language::Python, &FailingSearch, None).unwrap_err();
        assert_eq!(err.code.as_str(), "search.timeout");
    }

    #[test]
    fn public_conventions_per_language() {
        assert!(is_public("export function a() {}", Some("a"), Language::JavaScript));
        assert!(!is_public("function a() {}", Some("a"), Language::JavaScript));
        assert!(is_public("pub(crate) fn a() {}", Some("a"), Language::Rust));
        assert!(is_public("func Load() {}", Some("Load"), Language::Go));
        assert!(!is_public("func load() {}", Some("load"), Language::Go));
        assert!(!is_public("private function a() {}", Some("a"), Language::Php));
    }

    #[test]
    fn test_coverage_looks_beside_and_under_tests() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::create_dir_all(root.join("tests")).unwrap();
        let a = root.join("src/users.py");
        let b = root.join("src/orders.js");
        std::fs::write(&a, "").unwrap();
        std::fs::write(&b, "").unwrap();

        assert!(!has_test_coverage(&[a.clone()], root));
        std::fs::write(root.join("tests/test_users.py"), "").unwrap();
        assert!(has_test_coverage(&[a.clone()], root));

        assert!(!has_test_coverage(&[a.clone(), b.clone()], root));
        std::fs::write(root.join("src/orders.test.js"), "").unwrap();
        assert!(has_test_coverage(&[a, b], root));
        assert!(!has_test_coverage(&[], root));
    }
}
