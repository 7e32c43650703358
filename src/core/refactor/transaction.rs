//! Pending writes for one plan, computed in memory before anything touches
//! the project.

use std::path::{Path, PathBuf};

use serde::Serialize;
use similar::TextDiff;

use super::backup::BackupStore;
use super::validate::{ensure_contained, resolve, validate_plan};
use crate::dedup::RefactoringPlan;
use crate::error::{Error, Result};
use crate::language::Language;
use crate::lexer::{self, TokenKind};
use crate::utils::io;

const IMPORT_PREFIXES: &[&str] = &[
    "import ", "from ", "use ", "require ", "require(", "require_relative ", "require_once ",
    "package ", "namespace ", "<?php", "extern crate ",
];

#[derive(Debug, Clone, Serialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileDiff {
    pub path: PathBuf,
    pub diff: String,
}

#[derive(Debug, Clone)]
pub struct PendingWrite {
    pub path: PathBuf,
    pub content: String,
    /// `None` when the write creates the file.
    pub original: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CommitOutcome {
    pub backup_id: Option<String>,
    pub files_modified: Vec<PathBuf>,
    pub files_created: Vec<PathBuf>,
}

#[derive(Debug)]
pub struct Transaction {
    root: PathBuf,
    plan: RefactoringPlan,
    writes: Vec<PendingWrite>,
    skipped: Vec<SkippedFile>,
}

impl Transaction {
    /// Validate `plan` and compute every write. Reads files, writes nothing.
    pub fn prepare(plan: &RefactoringPlan, root: &Path) -> Result<Self> {
        validate_plan(plan, root)?;

        let mut writes = Vec::new();
        let mut skipped = Vec::new();
        let code = &plan.generated_code;

        // 1. The shared module comes first.
        if let Some(target) = &code.extract_to_file {
            let target = resolve(root, target);
            ensure_contained(root, &target)?;
            if target.exists() {
                let existing = io::read_file(&target, "read shared module")?;
                if defines(&existing, &code.function_name, plan.language) {
                    skipped.push(SkippedFile {
                        path: target.clone(),
                        reason: format!("already defines {}", code.function_name),
                    });
                } else {
                    writes.push(PendingWrite {
                        content: append_construct(&existing, &code.extracted_function, &code.postamble),
                        path: target,
                        original: Some(existing),
                    });
                }
            } else {
                writes.push(PendingWrite {
                    path: target,
                    content: format!("{}{}\n{}", code.preamble, code.extracted_function, code.postamble),
                    original: None,
                });
            }
        }

        // 2 + 3. Imports and replacement content, one write per file.
        let mut stale = Vec::new();
        for path in &plan.files_affected {
            let abs = resolve(root, path);
            if !abs.is_file() {
                skipped.push(SkippedFile {
                    path: abs,
                    reason: "file not found".to_string(),
                });
                continue;
            }
            ensure_contained(root, &abs)?;
            let original = io::read_file(&abs, "read file for refactor")?;

            let replacement = code
                .replacements
                .get(path)
                .or_else(|| code.replacements.get(&abs));
            if let Some(expected) = replacement.and_then(|r| r.base_sha256.as_deref()) {
                if io::sha256_hex(original.as_bytes()) != expected {
                    stale.push(format!("{} changed since the plan was generated", abs.display()));
                    continue;
                }
            }

            let mut content = replacement
                .map(|r| r.new_content.clone())
                .unwrap_or_else(|| original.clone());
            let imports = code.imports.get(path).or_else(|| code.imports.get(&abs));
            if let Some(statements) = imports {
                content = inject_imports(&content, statements);
            }
            if content != original {
                writes.push(PendingWrite {
                    path: abs,
                    content,
                    original: Some(original),
                });
            }
        }
        if !stale.is_empty() {
            return Err(Error::validation_invalid_plan(stale)
                .with_hint("Re-run analysis to regenerate the plan"));
        }

        Ok(Self {
            root: root.to_path_buf(),
            plan: plan.clone(),
            writes,
            skipped,
        })
    }

    pub fn writes(&self) -> &[PendingWrite] {
        &self.writes
    }

    pub fn skipped(&self) -> &[SkippedFile] {
        &self.skipped
    }

    /// Unified diff per pending write.
    pub fn diffs(&self) -> Vec<FileDiff> {
        self.writes
            .iter()
            .map(|w| {
                let rel = w.path.strip_prefix(&self.root).unwrap_or(&w.path);
                let old = w.original.as_deref().unwrap_or("");
                let diff = TextDiff::from_lines(old, w.content.as_str())
                    .unified_diff()
                    .context_radius(3)
                    .header(&format!("a/{}", rel.display()), &format!("b/{}", rel.display()))
                    .to_string();
                FileDiff {
                    path: w.path.clone(),
                    diff,
                }
            })
            .collect()
    }

    /// Back up (when a store is given), then write in order.
    pub fn commit(self, store: Option<&BackupStore>) -> Result<CommitOutcome> {
        let mut outcome = CommitOutcome::default();
        if self.writes.is_empty() {
            return Ok(outcome);
        }

        if let Some(store) = store {
            let paths: Vec<PathBuf> = self.writes.iter().map(|w| w.path.clone()).collect();
            let manifest = store.create(self.plan.strategy, self.plan.group_id, &paths)?;
            outcome.backup_id = Some(manifest.backup_id);
        }

        for write in &self.writes {
            if let Err(e) = io::write_file_atomic(&write.path, write.content.as_bytes(), "apply plan") {
                return Err(match &outcome.backup_id {
                    Some(id) => Error::storage_io(
                        io_error_text(e),
                        Some(id.clone()),
                        Some(write.path.display().to_string()),
                    )
                    .with_hint(format!("unclone rollback {} --root {}", id, self.root.display())),
                    None => e,
                });
            }
            if write.original.is_some() {
                outcome.files_modified.push(write.path.clone());
            } else {
                outcome.files_created.push(write.path.clone());
            }
        }

        log_status!(
            "apply",
            "Wrote {} file(s), created {}",
            outcome.files_modified.len(),
            outcome.files_created.len()
        );
        Ok(outcome)
    }
}

pub(crate) fn io_error_text(e: Error) -> String {
    e.details
        .get("error")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or(e.message)
}

/// Whether `content` already defines `name`.
fn defines(content: &str, name: &str, language: Language) -> bool {
    let profile = language.profile();
    let tokens = lexer::tokenize(content, Some(language));
    tokens.windows(3).any(|w| {
        if w[1].text.trim_start_matches('$') != name {
            return false;
        }
        if profile.is_definition_keyword(w[0].text) {
            return true;
        }
        // Java has no definition keyword: `Type name(`
        language == Language::Java
            && w[2].is("(")
            && matches!(w[0].kind, TokenKind::Ident | TokenKind::Keyword)
            && !matches!(w[0].text, "return" | "new" | "throw")
    })
}

/// Append a construct to an existing module, inside its closing wrapper when
/// the module has one.
fn append_construct(existing: &str, construct: &str, postamble: &str) -> String {
    let closing = postamble.trim();
    if !closing.is_empty() && existing.trim_end().ends_with(closing) {
        if let Some(idx) = existing.rfind(closing) {
            return format!(
                "{}\n\n{}\n{}",
                existing[..idx].trim_end(),
                construct,
                &existing[idx..]
            );
        }
    }
    format!("{}\n\n\n{}\n", existing.trim_end(), construct)
}

/// Insert missing import statements after the last top-level import or
/// package line, or at the top of the file.
fn inject_imports(content: &str, statements: &[String]) -> String {
    let mut lines: Vec<&str> = content.lines().collect();
    let missing: Vec<&str> = statements
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty() && !lines.iter().any(|l| l.trim() == *s))
        .collect();
    if missing.is_empty() {
        return content.to_string();
    }

    let anchor = lines
        .iter()
        .rposition(|l| IMPORT_PREFIXES.iter().any(|p| l.starts_with(p)))
        .map(|idx| {
            // Step past a parenthesized or braced import list.
            let opens = lines[idx].trim_end().ends_with('(') || lines[idx].trim_end().ends_with('{');
            if !opens {
                return idx;
            }
            (idx + 1..lines.len())
                .find(|&i| {
                    let t = lines[i].trim_start();
                    t.starts_with(')') || t.starts_with('}')
                })
                .unwrap_or(idx)
        });
    match anchor {
        Some(idx) => {
            for (offset, stmt) in missing.iter().enumerate() {
                lines.insert(idx + 1 + offset, *stmt);
            }
        }
        None => {
            let mut head = missing;
            head.push("");
            head.extend(lines);
            lines = head;
        }
    }

    let mut out = lines.join("\n");
    if content.ends_with('\n') {
        out.push('\n');
    }
    out
}
