use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use super::{classify_line, leading_whitespace, Reference, SearchBackend};
use crate::construct::{Construct, ConstructKind};
use crate::error::{Error, Result, SearchCommandFailedDetails};
use crate::language::Language;
use crate::refactor::DEFAULT_DIR_NAME;
use crate::utils::command::{self, Completion};

/// Drives `ast-grep scan` with inline rules and streamed JSON output.
#[derive(Debug, Clone)]
pub struct AstGrepSearch {
    binary: String,
    timeout: Duration,
    skip_dirs: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Match {
    text: String,
    file: String,
    range: MatchRange,
    #[serde(default)]
    lines: String,
}

#[derive(Debug, Deserialize)]
struct MatchRange {
    start: Position,
    end: Position,
}

#[derive(Debug, Deserialize)]
struct Position {
    line: usize,
    column: usize,
}

impl AstGrepSearch {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
            skip_dirs: vec![DEFAULT_DIR_NAME.to_string()],
        }
    }

    pub fn skip_dir(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.skip_dirs.contains(&name) {
            self.skip_dirs.push(name);
        }
        self
    }

    pub fn is_available(&self) -> bool {
        command::is_available(&self.binary)
    }

    fn scan(&self, root: &Path, rule: String) -> Result<Vec<Match>> {
        let mut args = vec![
            "scan".to_string(),
            "--inline-rules".to_string(),
            rule,
            "--json=stream".to_string(),
        ];
        for dir in &self.skip_dirs {
            args.push("--globs".to_string());
            args.push(format!("!**/{}/**", dir));
        }
        args.push(root.to_string_lossy().to_string());
        let display = command::display(&self.binary, &args);

        let output = match command::run_with_timeout(&self.binary, &args, self.timeout) {
            Ok(Completion::Finished(output)) => output,
            Ok(Completion::TimedOut) => {
                return Err(Error::search_timeout(display, self.timeout.as_secs()))
            }
            Err(e) => return Err(Error::search_tool_unavailable(&self.binary, e.to_string())),
        };

        if !output.status.success() {
            return Err(Error::search_command_failed(SearchCommandFailedDetails {
                command: display,
                exit_code: output.status.code(),
                stderr: command::error_text(&output),
            }));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|line| {
                serde_json::from_str::<Match>(line).map_err(|e| {
                    Error::internal_json(e.to_string(), Some(format!("parse output of {}", display)))
                })
            })
            .collect()
    }
}

fn resolve(root: &Path, file: &str) -> PathBuf {
    let path = PathBuf::from(file);
    if path.is_absolute() || path.exists() {
        path
    } else {
        root.join(path)
    }
}

fn construct_rule(language: Language, kinds: &[ConstructKind]) -> String {
    let profile = language.profile();
    let mut node_kinds: Vec<&str> = Vec::new();
    if kinds
        .iter()
        .any(|k| matches!(k, ConstructKind::Function | ConstructKind::Method | ConstructKind::Unknown))
    {
        node_kinds.extend(profile.function_node_kinds);
    }
    if kinds.contains(&ConstructKind::Class) {
        node_kinds.extend(profile.class_node_kinds);
    }
    let mut rule = format!(
        "id: unclone-constructs\nlanguage: {}\nseverity: info\nrule:\n  any:\n",
        profile.ast_grep_lang
    );
    for kind in node_kinds {
        rule.push_str(&format!("    - kind: {}\n", kind));
    }
    rule
}

/// Node kinds that name things, per grammar.
fn identifier_kinds(language: Language) -> &'static [&'static str] {
    match language {
        Language::Python => &["identifier"],
        Language::JavaScript => &["identifier", "property_identifier"],
        Language::TypeScript => &["identifier", "property_identifier", "type_identifier"],
        Language::Rust | Language::Go => &["identifier", "field_identifier", "type_identifier"],
        Language::Java => &["identifier", "type_identifier"],
        Language::Php => &["name"],
        Language::Ruby => &["identifier", "constant"],
    }
}

fn reference_rule(name: &str, language: Language) -> String {
    let pattern = format!("^{}$", regex::escape(name.trim_start_matches('$'))).replace('\'', "''");
    let mut rule = format!(
        "id: unclone-references\nlanguage: {}\nseverity: info\nrule:\n  all:\n    - regex: '{}'\n    - any:\n",
        language.profile().ast_grep_lang,
        pattern
    );
    for kind in identifier_kinds(language) {
        rule.push_str(&format!("        - kind: {}\n", kind));
    }
    rule
}

impl SearchBackend for AstGrepSearch {
    fn name(&self) -> &'static str {
        "ast-grep"
    }

    fn find_constructs(
        &self,
        root: &Path,
        language: Language,
        kinds: &[ConstructKind],
    ) -> Result<Vec<Construct>> {
        if kinds.is_empty() {
            return Ok(Vec::new());
        }
        let matches = self.scan(root, construct_rule(language, kinds))?;
        let mut constructs: Vec<Construct> = matches
            .into_iter()
            .map(|m| {
                let indent = leading_whitespace(m.lines.lines().next().unwrap_or("")).to_string();
                Construct::new(
                    language,
                    resolve(root, &m.file),
                    (m.range.start.line + 1, m.range.start.column),
                    (m.range.end.line + 1, m.range.end.column),
                    m.text,
                )
                .with_indent(indent)
            })
            .filter(|c| kinds.iter().any(|k| k.accepts(c.kind)))
            .collect();
        // ast-grep scans files in parallel; order by position for determinism.
        constructs.sort_by(|a, b| {
            (&a.file, a.start_line, a.start_column).cmp(&(&b.file, b.start_line, b.start_column))
        });
        Ok(constructs)
    }

    fn find_references(
        &self,
        root: &Path,
        name: &str,
        language: Language,
        exclude: &[PathBuf],
    ) -> Result<Vec<Reference>> {
        let matches = self.scan(root, reference_rule(name, language))?;
        let mut seen = BTreeSet::new();
        let mut references = Vec::new();
        for m in matches {
            let file = resolve(root, &m.file);
            if exclude.contains(&file) {
                continue;
            }
            let line = m.range.start.line + 1;
            if !seen.insert((file.clone(), line)) {
                continue;
            }
            let source_line = m.lines.lines().next().unwrap_or(&m.text);
            references.push(Reference {
                kind: classify_line(source_line, name, language),
                file,
                line,
            });
        }
        references.sort();
        Ok(references)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construct_rule_lists_requested_node_kinds() {
        let rule = construct_rule(Language::Python, &[ConstructKind::Function, ConstructKind::Class]);
        assert!(rule.contains("language: python"));
        assert!(rule.contains("severity: info"));
        assert!(rule.contains("- kind: function_definition"));
        assert!(rule.contains("- kind: class_definition"));

        let rule = construct_rule(Language::Python, &[ConstructKind::Function]);
        assert!(!rule.contains("class_definition"));
    }

    #[test]
    fn reference_rule_escapes_the_name() {
        let rule = reference_rule("$load", Language::Php);
        assert!(rule.contains("regex: '^load$'"));
        assert!(rule.contains("- kind: name"));
    }

    #[test]
    fn stream_lines_deserialize() {
        let line = r#"{"text":"def a():\n    pass","file":"src/a.py","range":{"byteOffset":{"start":0,"end":10},"start":{"line":4,"column":4},"end":{"line":5,"column":8}},"lines":"    def a():\n        pass","ruleId":"unclone-constructs","language":"Python"}"#;
        let m: Match = serde_json::from_str(line).unwrap();
        assert_eq!(m.range.start.line, 4);
        assert_eq!(m.range.start.column, 4);
        assert_eq!(m.range.end.line, 5);
        assert_eq!(leading_whitespace(m.lines.lines().next().unwrap()), "    ");
    }

    #[test]
    fn missing_binary_is_tool_unavailable() {
        let search = AstGrepSearch::new("nonexistent-ast-grep-xyz", Duration::from_secs(1));
        let dir = tempfile::tempdir().unwrap();
        let err = search
            .find_constructs(dir.path(), Language::Python, &[ConstructKind::Function])
            .unwrap_err();
        assert_eq!(err.code.as_str(), "search.tool_unavailable");
        assert!(!search.is_available());
    }
}
