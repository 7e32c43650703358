//! Plan validation. Runs before any filesystem access.

use std::path::{Component, Path, PathBuf};

use crate::dedup::RefactoringPlan;
use crate::error::{Error, Result};

/// Resolve a plan path against the project root.
pub(crate) fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Whether `path` stays lexically inside `root`.
fn inside_root(root: &Path, path: &Path) -> bool {
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return false;
    }
    path.starts_with(root)
}

/// Check a plan's structure. Every problem is collected, not just the first.
pub fn validate_plan(plan: &RefactoringPlan, root: &Path) -> Result<()> {
    let mut problems = Vec::new();
    let code = &plan.generated_code;

    if plan.files_affected.is_empty() {
        problems.push("files_affected is empty".to_string());
    }
    if code.function_name.trim().is_empty() {
        problems.push("function_name is empty".to_string());
    }
    if code.extracted_function.trim().is_empty() {
        problems.push("extracted_function is empty".to_string());
    }

    let affected: Vec<PathBuf> = plan
        .files_affected
        .iter()
        .map(|p| resolve(root, p))
        .collect();

    for (path, replacement) in &code.replacements {
        if !affected.contains(&resolve(root, path)) {
            problems.push(format!(
                "replacement for {} is not listed in files_affected",
                path.display()
            ));
        }
        if replacement.changes.iter().any(|c| c.line == 0) {
            problems.push(format!("changes for {} contain line 0", path.display()));
        }
    }
    for path in code.imports.keys() {
        if !affected.contains(&resolve(root, path)) {
            problems.push(format!(
                "imports for {} are not listed in files_affected",
                path.display()
            ));
        }
    }

    let mut written: Vec<&PathBuf> = plan.files_affected.iter().collect();
    written.extend(code.extract_to_file.iter());
    for path in written {
        if !inside_root(root, &resolve(root, path)) {
            problems.push(format!("{} is outside the project root", path.display()));
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(Error::validation_invalid_plan(problems))
    }
}

/// Symlink-aware containment check, run once the filesystem may be touched.
pub(crate) fn ensure_contained(root: &Path, path: &Path) -> Result<()> {
    let Ok(canonical_root) = root.canonicalize() else {
        return Err(Error::validation_invalid_argument(
            "root",
            format!("Project root does not exist: {}", root.display()),
            None,
            None,
        ));
    };
    // The file itself may not exist yet; check its nearest existing ancestor.
    let existing = path.ancestors().find(|p| p.exists());
    let contained = existing
        .and_then(|p| p.canonicalize().ok())
        .map(|p| p.starts_with(&canonical_root))
        .unwrap_or(false);
    if contained {
        Ok(())
    } else {
        Err(Error::validation_invalid_plan(vec![format!(
            "{} resolves outside the project root",
            path.display()
        )]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::{FileReplacement, GeneratedCode, LineChange, Strategy};
    use crate::language::Language;
    use std::collections::BTreeMap;

    fn plan(files: &[&str]) -> RefactoringPlan {
        let mut replacements = BTreeMap::new();
        for f in files {
            replacements.insert(
                PathBuf::from(f),
                FileReplacement {
                    new_content: "x".to_string(),
                    changes: vec![LineChange { line: 1, old: "a".into(), new: "x".into() }],
                    base_sha256: None,
                },
            );
        }
        RefactoringPlan {
            strategy: Strategy::ExtractFunction,
            language: Language::Python,
            files_affected: files.iter().map(PathBuf::from).collect(),
            generated_code: GeneratedCode {
                extracted_function: "def helper():\n    pass".to_string(),
                function_name: "helper".to_string(),
                replacements,
                ..Default::default()
            },
            group_id: Some(0),
            notes: vec![],
        }
    }

    #[test]
    fn accepts_well_formed_plans() {
        assert!(validate_plan(&plan(&["/p/a.py", "b.py"]), Path::new("/p")).is_ok());
    }

    #[test]
    fn collects_every_problem() {
        let mut p = plan(&["/p/a.py"]);
        p.generated_code.function_name = " ".to_string();
        p.generated_code
            .replacements
            .insert(PathBuf::from("/p/other.py"), FileReplacement {
                new_content: String::new(),
                changes: vec![LineChange { line: 0, old: String::new(), new: String::new() }],
                base_sha256: None,
            });
        let err = validate_plan(&p, Path::new("/p")).unwrap_err();
        assert_eq!(err.code.as_str(), "validation.invalid_plan");
        assert_eq!(err.details["problems"].as_array().map(|a| a.len()), Some(3));
    }

    #[test]
    fn empty_plans_are_rejected() {
        let mut p = plan(&[]);
        p.generated_code.extracted_function.clear();
        let err = validate_plan(&p, Path::new("/p")).unwrap_err();
        assert_eq!(err.details["problems"].as_array().map(|a| a.len()), Some(2));
    }

    #[test]
    fn paths_must_stay_inside_the_root() {
        assert!(validate_plan(&plan(&["/elsewhere/a.py"]), Path::new("/p")).is_err());
        assert!(validate_plan(&plan(&["../a.py"]), Path::new("/p")).is_err());

        let mut p = plan(&["/p/a.py"]);
        p.generated_code.extract_to_file = Some(PathBuf::from("/tmp/helpers.py"));
        assert!(validate_plan(&p, Path::new("/p")).is_err());
    }

    #[test]
    fn containment_follows_the_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        assert!(ensure_contained(root, &root.join("new/dir/file.py")).is_ok());
        let outside = tempfile::tempdir().unwrap();
        assert!(ensure_contained(root, &outside.path().join("x.py")).is_err());
    }
}
