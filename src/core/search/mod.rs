//! Structural search collaborators.
//!
//! Analysis never parses source trees itself; it asks a [`SearchBackend`] for
//! constructs and references. `AstGrepSearch` drives the external `ast-grep`
//! binary, `WalkSearch` is a built-in fallback driven by syntax profiles.

mod ast_grep;
mod walk;

pub use ast_grep::AstGrepSearch;
pub use walk::WalkSearch;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::construct::{Construct, ConstructKind};
use crate::error::{Error, Result};
use crate::language::Language;
use crate::lexer::{self, TokenKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Call,
    Import,
    Reference,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Reference {
    pub file: PathBuf,
    pub line: usize,
    #[serde(rename = "type")]
    pub kind: ReferenceKind,
}

pub trait SearchBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Constructs of `language` under `root`, ordered by file then position.
    fn find_constructs(
        &self,
        root: &Path,
        language: Language,
        kinds: &[ConstructKind],
    ) -> Result<Vec<Construct>>;

    /// Uses of `name` under `root`, skipping files in `exclude`.
    fn find_references(
        &self,
        root: &Path,
        name: &str,
        language: Language,
        exclude: &[PathBuf],
    ) -> Result<Vec<Reference>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendChoice {
    #[default]
    Auto,
    AstGrep,
    Builtin,
}

impl BackendChoice {
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "auto" => Ok(Self::Auto),
            "ast-grep" | "ast_grep" | "sg" => Ok(Self::AstGrep),
            "builtin" | "walk" => Ok(Self::Builtin),
            other => Err(Error::validation_invalid_argument(
                "backend",
                format!("Unknown search backend '{}'", other),
                None,
                Some(vec!["auto".into(), "ast-grep".into(), "builtin".into()]),
            )),
        }
    }
}

/// Resolve a backend. `Auto` prefers ast-grep when the binary answers.
/// Both backends leave `backup_dir` out of every scan.
pub fn backend_for(
    choice: BackendChoice,
    binary: &str,
    timeout: Duration,
    backup_dir: &str,
) -> Box<dyn SearchBackend> {
    let walk = || -> Box<dyn SearchBackend> {
        Box::new(WalkSearch::new(timeout).skip_dir(backup_dir))
    };
    let ast_grep = AstGrepSearch::new(binary, timeout).skip_dir(backup_dir);
    match choice {
        BackendChoice::AstGrep => Box::new(ast_grep),
        BackendChoice::Builtin => walk(),
        BackendChoice::Auto => {
            if ast_grep.is_available() {
                Box::new(ast_grep)
            } else {
                crate::log_status!("search", "{} not found, using built-in walker", binary);
                walk()
            }
        }
    }
}

const IMPORT_PREFIXES: &[&str] = &[
    "import ", "from ", "use ", "require ", "require(", "require_relative", "require_once",
    "include", "using ", "export {",
];

/// Classify a use of `name` on a source line.
pub(crate) fn classify_line(line: &str, name: &str, language: Language) -> ReferenceKind {
    let trimmed = line.trim_start();
    if IMPORT_PREFIXES.iter().any(|p| trimmed.starts_with(p)) {
        return ReferenceKind::Import;
    }
    let tokens = lexer::tokenize(line, Some(language));
    let called = tokens.windows(2).any(|w| {
        w[0].text == name && w[0].kind == TokenKind::Ident && w[1].is("(")
    });
    if called {
        ReferenceKind::Call
    } else {
        ReferenceKind::Reference
    }
}

/// Leading whitespace of a line.
pub(crate) fn leading_whitespace(line: &str) -> &str {
    &line[..line.len() - line.trim_start().len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_reference_lines() {
        assert_eq!(
            classify_line("from helpers import load_users", "load_users", Language::Python),
            ReferenceKind::Import
        );
        assert_eq!(
            classify_line("    rows = load_users(db)", "load_users", Language::Python),
            ReferenceKind::Call
        );
        assert_eq!(
            classify_line("handlers = [load_users]", "load_users", Language::Python),
            ReferenceKind::Reference
        );
        assert_eq!(
            classify_line("import { loadUsers } from './users';", "loadUsers", Language::JavaScript),
            ReferenceKind::Import
        );
    }

    #[test]
    fn backend_choice_parses_aliases() {
        assert_eq!(BackendChoice::parse("ast-grep").unwrap(), BackendChoice::AstGrep);
        assert_eq!(BackendChoice::parse("builtin").unwrap(), BackendChoice::Builtin);
        let err = BackendChoice::parse("grep").unwrap_err();
        assert_eq!(err.code.as_str(), "validation.invalid_argument");
    }

    #[test]
    fn builtin_backend_is_named() {
        let backend = backend_for(
            BackendChoice::Builtin,
            "ast-grep",
            Duration::from_secs(5),
            ".unclone-backups",
        );
        assert_eq!(backend.name(), "builtin");
    }
}
