use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use super::{classify_line, leading_whitespace, Reference, SearchBackend};
use crate::construct::{Construct, ConstructKind};
use crate::error::{Error, Result};
use crate::language::{BlockStyle, Language, SyntaxProfile};
use crate::lexer::{self, Token, TokenKind};
use crate::refactor::DEFAULT_DIR_NAME;

/// Directories to always skip at any depth (dependency/VCS directories).
const ALWAYS_SKIP_DIRS: &[&str] = &[
    "node_modules",
    "vendor",
    ".git",
    ".svn",
    ".hg",
    "__pycache__",
    ".venv",
    "venv",
];

/// Directories to skip only at the root level (build output directories).
const ROOT_ONLY_SKIP_DIRS: &[&str] = &["build", "dist", "target", "cache", "tmp"];

const DECLARATION_MODIFIERS: &[&str] = &[
    "pub", "public", "private", "protected", "static", "final", "abstract", "async", "export",
    "default", "synchronized", "override", "readonly", "unsafe", "extern", "const",
];

const CONTROL_KEYWORDS: &[&str] = &[
    "if", "for", "foreach", "while", "switch", "catch", "return", "new", "else", "do", "try",
    "throw", "match", "loop", "elseif", "when", "case",
];

/// Built-in search: walks the tree and finds constructs with syntax-profile
/// heuristics. No external tools required.
#[derive(Debug, Clone)]
pub struct WalkSearch {
    timeout: Duration,
    /// Extra directory names skipped at any depth (backup snapshots).
    skip_dirs: Vec<String>,
}

impl WalkSearch {
    pub fn new(timeout: Duration) -> Self {
        Self {
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

    fn files(&self, root: &Path, language: Language, started: Instant) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        if root.is_file() {
            if language.profile().matches_extension(root) {
                files.push(root.to_path_buf());
            }
            return Ok(files);
        }
        walk_recursive(root, root, &self.skip_dirs, &mut files);
        files.retain(|f| language.profile().matches_extension(f));
        files.sort();
        self.check_deadline(root, started)?;
        Ok(files)
    }

    fn check_deadline(&self, root: &Path, started: Instant) -> Result<()> {
        if started.elapsed() > self.timeout {
            return Err(Error::search_timeout(
                format!("builtin walk of {}", root.display()),
                self.timeout.as_secs(),
            ));
        }
        Ok(())
    }
}

fn walk_recursive(dir: &Path, root: &Path, skip_dirs: &[String], files: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };

    let is_root = dir == root;

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            if ALWAYS_SKIP_DIRS.contains(&name.as_str()) || skip_dirs.contains(&name) {
                continue;
            }
            if is_root && ROOT_ONLY_SKIP_DIRS.contains(&name.as_str()) {
                continue;
            }
            walk_recursive(&path, root, skip_dirs, files);
        } else {
            files.push(path);
        }
    }
}

impl SearchBackend for WalkSearch {
    fn name(&self) -> &'static str {
        "builtin"
    }

    fn find_constructs(
        &self,
        root: &Path,
        language: Language,
        kinds: &[ConstructKind],
    ) -> Result<Vec<Construct>> {
        let started = Instant::now();
        let mut constructs = Vec::new();
        for file in self.files(root, language, started)? {
            self.check_deadline(root, started)?;
            let Ok(content) = fs::read_to_string(&file) else {
                continue;
            };
            constructs.extend(
                scan_constructs(&content, &file, language)
                    .into_iter()
                    .filter(|c| kinds.iter().any(|k| k.accepts(c.kind))),
            );
        }
        Ok(constructs)
    }

    fn find_references(
        &self,
        root: &Path,
        name: &str,
        language: Language,
        exclude: &[PathBuf],
    ) -> Result<Vec<Reference>> {
        let started = Instant::now();
        let mut references = Vec::new();
        for file in self.files(root, language, started)? {
            self.check_deadline(root, started)?;
            if exclude.contains(&file) {
                continue;
            }
            let Ok(content) = fs::read_to_string(&file) else {
                continue;
            };
            let lines: Vec<&str> = content.lines().collect();
            let mut last_line = 0;
            for tok in lexer::tokenize(&content, Some(language)) {
                let matches = tok.kind == TokenKind::Ident
                    && tok.text.trim_start_matches('$') == name.trim_start_matches('$');
                if !matches {
                    continue;
                }
                let line = content[..tok.start].matches('\n').count() + 1;
                if line == last_line {
                    continue;
                }
                last_line = line;
                references.push(Reference {
                    file: file.clone(),
                    line,
                    kind: classify_line(lines.get(line - 1).copied().unwrap_or(""), tok.text, language),
                });
            }
        }
        Ok(references)
    }
}

/// Find construct extents in one file.
pub(crate) fn scan_constructs(content: &str, file: &Path, language: Language) -> Vec<Construct> {
    let profile = language.profile();
    let tokens = lexer::tokenize(content, Some(language));
    let line_starts: Vec<usize> = std::iter::once(0)
        .chain(content.match_indices('\n').map(|(i, _)| i + 1))
        .collect();

    let mut constructs = Vec::new();
    let mut line_token = 0;
    for (line_idx, &line_start) in line_starts.iter().enumerate() {
        let line_end = line_starts
            .get(line_idx + 1)
            .map(|next| next - 1)
            .unwrap_or(content.len());
        while line_token < tokens.len() && tokens[line_token].start < line_start {
            line_token += 1;
        }
        let line_tokens: Vec<Token<'_>> = tokens[line_token..]
            .iter()
            .take_while(|t| t.start < line_end)
            .copied()
            .collect();
        if line_tokens.is_empty() || !starts_definition(&line_tokens, profile) {
            continue;
        }

        let start = line_tokens[0].start;
        let Some(end) = construct_end(content, &tokens, line_token, &line_starts, line_idx, profile)
        else {
            continue;
        };
        let text = content[start..end].trim_end();
        if text.is_empty() {
            continue;
        }
        let end_offset = start + text.len();
        let end_line = content[..end_offset].matches('\n').count() + 1;
        let end_line_start = line_starts[end_line - 1];
        let line_text = &content[line_start..line_end];
        let indent = leading_whitespace(line_text);

        constructs.push(
            Construct::new(
                language,
                file,
                (line_idx + 1, indent.chars().count()),
                (end_line, content[end_line_start..end_offset].chars().count()),
                text,
            )
            .with_indent(indent),
        );
    }
    constructs
}

fn starts_definition(line: &[Token<'_>], profile: &SyntaxProfile) -> bool {
    let mut idx = 0;
    while idx < line.len() {
        let tok = line[idx];
        if DECLARATION_MODIFIERS.contains(&tok.text) && !(tok.is("const") && is_binding(line, idx)) {
            idx += 1;
            // `pub(crate)`
            if tok.is("pub") && line.get(idx).map(|t| t.is("(")) == Some(true) {
                idx = lexer::matching_close(line, idx).map(|c| c + 1).unwrap_or(line.len());
            }
            continue;
        }
        break;
    }
    let Some(first) = line.get(idx) else {
        return false;
    };
    let next = line.get(idx + 1);

    if profile.function_keywords.contains(&first.text) {
        return next.map(|t| t.kind == TokenKind::Ident || t.is("(") || t.is("*") || t.is("&") || t.is("self")) == Some(true);
    }
    if profile.class_keywords.contains(&first.text) {
        // Go only treats `type X struct {` as a class.
        if profile.language == Language::Go {
            return line.iter().any(|t| t.is("struct") || t.is("interface")) && line.iter().any(|t| t.is("{"));
        }
        return next.map(|t| t.kind == TokenKind::Ident) == Some(true);
    }

    match profile.language {
        Language::JavaScript | Language::TypeScript => {
            if is_binding(line, idx) {
                return line.iter().any(|t| t.is("=>")) || line.iter().any(|t| t.is("function"));
            }
            is_method_header(line, idx)
        }
        Language::Java => is_method_header(line, idx),
        _ => false,
    }
}

/// `const name = ...`
fn is_binding(line: &[Token<'_>], idx: usize) -> bool {
    matches!(line.get(idx).map(|t| t.text), Some("const") | Some("let") | Some("var"))
        && line.get(idx + 1).map(|t| t.kind == TokenKind::Ident) == Some(true)
        && line.get(idx + 2).map(|t| t.is("=")) == Some(true)
}

/// `name(...) {` or `Type name(...) {` with no assignment or call chain.
fn is_method_header(line: &[Token<'_>], idx: usize) -> bool {
    let first = line[idx];
    if CONTROL_KEYWORDS.contains(&first.text) {
        return false;
    }
    let Some(open) = line.iter().position(|t| t.is("(")) else {
        return false;
    };
    if open == 0 || line[open - 1].kind != TokenKind::Ident {
        return false;
    }
    if line[..open].iter().any(|t| t.is("=") || t.is(".") || t.is("->") || t.is("return")) {
        return false;
    }
    let Some(close) = lexer::matching_close(line, open) else {
        // Parameter list continues on the next line.
        return true;
    };
    let rest = &line[close + 1..];
    rest.last().map(|t| t.is("{")) == Some(true) && !rest.iter().any(|t| t.is("=>") || t.is(";"))
}

/// Byte offset just past the construct starting at `first_token`.
fn construct_end(
    content: &str,
    tokens: &[Token<'_>],
    first_token: usize,
    line_starts: &[usize],
    line_idx: usize,
    profile: &SyntaxProfile,
) -> Option<usize> {
    match profile.block_style {
        BlockStyle::Braces => {
            let mut depth = 0i32;
            for (i, tok) in tokens.iter().enumerate().skip(first_token) {
                match tok.text {
                    "(" | "[" => depth += 1,
                    ")" | "]" => depth -= 1,
                    ";" if depth == 0 => return None,
                    "=>" if depth == 0 => {
                        let next = tokens.get(i + 1)?;
                        if next.is("{") {
                            continue;
                        }
                        // Expression-bodied arrow: ends at `;` or end of line.
                        let line_end = content[tok.end..]
                            .find('\n')
                            .map(|o| tok.end + o)
                            .unwrap_or(content.len());
                        return Some(line_end);
                    }
                    "{" if depth == 0 => {
                        let close = lexer::matching_close(tokens, i)?;
                        let mut end = tokens[close].end;
                        if tokens.get(close + 1).map(|t| t.is(";")) == Some(true) {
                            end = tokens[close + 1].end;
                        }
                        return Some(end);
                    }
                    _ => {}
                }
            }
            None
        }
        BlockStyle::Indent => {
            let start_line = &content[line_starts[line_idx]..];
            let base = indent_width(start_line);
            let mut end = line_starts[line_idx];
            let mut depth = 0i32;
            let mut header_done = false;
            for (idx, &ls) in line_starts.iter().enumerate().skip(line_idx) {
                let le = line_starts.get(idx + 1).map(|n| n - 1).unwrap_or(content.len());
                let line = &content[ls..le];
                if idx > line_idx && header_done && !line.trim().is_empty() && indent_width(line) <= base {
                    break;
                }
                for tok in lexer::tokenize(line, Some(profile.language)) {
                    match tok.text {
                        "(" | "[" | "{" => depth += 1,
                        ")" | "]" | "}" => depth -= 1,
                        ":" if depth == 0 => header_done = true,
                        _ => {}
                    }
                }
                if !line.trim().is_empty() {
                    end = le;
                }
            }
            Some(end)
        }
        BlockStyle::EndKeyword => {
            let mut depth = 0i32;
            for (idx, &ls) in line_starts.iter().enumerate().skip(line_idx) {
                let le = line_starts.get(idx + 1).map(|n| n - 1).unwrap_or(content.len());
                let line_tokens = lexer::tokenize(&content[ls..le], Some(profile.language));
                for (i, tok) in line_tokens.iter().enumerate() {
                    let opens = match tok.text {
                        "def" | "class" | "module" | "begin" | "case" => true,
                        "if" | "unless" | "while" | "until" | "for" => i == 0,
                        "do" => true,
                        _ => false,
                    };
                    if opens {
                        depth += 1;
                    } else if tok.is("end") {
                        depth -= 1;
                        if depth == 0 {
                            return Some(ls + tok.end);
                        }
                    }
                }
            }
            None
        }
    }
}

fn indent_width(line: &str) -> usize {
    leading_whitespace(line)
        .chars()
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}
