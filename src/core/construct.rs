//! Code constructs (functions, methods, classes) located by a search backend.

use std::collections::BTreeMap;
use std::ops::Range;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::language::{BlockStyle, Language};
use super::lexer::{self, Token, TokenKind};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConstructKind {
    Function,
    Method,
    Class,
    #[default]
    Unknown,
}

impl ConstructKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConstructKind::Function => "function",
            ConstructKind::Method => "method",
            ConstructKind::Class => "class",
            ConstructKind::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "function" | "functions" | "fn" => Some(ConstructKind::Function),
            "method" | "methods" => Some(ConstructKind::Method),
            "class" | "classes" => Some(ConstructKind::Class),
            _ => None,
        }
    }

    /// Whether a search for `self` should include a construct of kind `other`.
    pub fn accepts(&self, other: ConstructKind) -> bool {
        match self {
            ConstructKind::Function => {
                matches!(other, ConstructKind::Function | ConstructKind::Unknown)
            }
            _ => *self == other,
        }
    }
}

/// A located region of source. Lines are 1-based, columns 0-based.
///
/// `text` starts at `start_column` of `start_line`; `indent` is the leading
/// whitespace of that first line as it appears in the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Construct {
    pub language: Language,
    pub file: PathBuf,
    pub start_line: usize,
    pub start_column: usize,
    pub end_line: usize,
    pub end_column: usize,
    pub text: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub captures: BTreeMap<String, String>,
    #[serde(default)]
    pub indent: String,
    pub kind: ConstructKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Construct {
    pub fn new(
        language: Language,
        file: impl Into<PathBuf>,
        start: (usize, usize),
        end: (usize, usize),
        text: impl Into<String>,
    ) -> Self {
        let text = text.into();
        let signature = Signature::parse(&text, language);
        Self {
            language,
            file: file.into(),
            start_line: start.0,
            start_column: start.1,
            end_line: end.0,
            end_column: end.1,
            kind: signature.kind,
            name: signature.name.clone(),
            text,
            captures: BTreeMap::new(),
            indent: String::new(),
        }
    }

    pub fn with_indent(mut self, indent: impl Into<String>) -> Self {
        self.indent = indent.into();
        self
    }

    pub fn with_captures(mut self, captures: BTreeMap<String, String>) -> Self {
        self.captures = captures;
        self
    }

    /// Number of non-blank lines.
    pub fn line_count(&self) -> usize {
        self.text.lines().filter(|l| !l.trim().is_empty()).count()
    }

    /// Physical line span in the file.
    pub fn line_span(&self) -> usize {
        self.end_line.saturating_sub(self.start_line) + 1
    }

    pub fn signature(&self) -> Signature {
        Signature::parse(&self.text, self.language)
    }
}

/// Header and body layout of a construct's text, as byte ranges.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Signature {
    pub kind: ConstructKind,
    pub name: Option<String>,
    pub name_range: Option<Range<usize>>,
    /// Inside the parameter parentheses, exclusive of them.
    pub params_range: Option<Range<usize>>,
    /// Own parameters in declaration order (receiver excluded).
    pub params: Vec<Param>,
    /// Offset where defaulted, variadic or keyword parameters begin.
    pub tail_start: Option<usize>,
    /// Go method receiver name.
    pub receiver: Option<String>,
    pub body_range: Range<usize>,
    pub returns_value: bool,
}

impl Signature {
    pub fn parse(text: &str, language: Language) -> Self {
        let profile = language.profile();
        let tokens = lexer::tokenize(text, Some(language));
        let mut sig = Signature {
            body_range: 0..text.len(),
            ..Default::default()
        };
        if tokens.is_empty() {
            return sig;
        }

        let (name_idx, is_class) = find_definition_name(&tokens, language, &mut sig);
        if let Some(idx) = name_idx {
            sig.name = Some(tokens[idx].text.trim_start_matches('$').to_string());
            sig.name_range = Some(tokens[idx].start..tokens[idx].end);
        }

        let mut header_end = name_idx.map(|i| i + 1).unwrap_or(0);
        if !is_class {
            if let Some(open) = (header_end..tokens.len()).find(|&i| tokens[i].is("(")) {
                // Only the parenthesis on the definition line counts.
                let same_line = match name_idx {
                    Some(idx) => !text[tokens[idx].end..tokens[open].start].contains('\n'),
                    None => true,
                };
                if same_line {
                    if let Some(close) = lexer::matching_close(&tokens, open) {
                        sig.params_range = Some(tokens[open].end..tokens[close].start);
                        (sig.params, sig.tail_start) =
                            parameter_list(&tokens[open + 1..close], language);
                        header_end = close + 1;
                    }
                }
            }
            if sig.params_range.is_none() && language == Language::Ruby {
                (sig.params, sig.tail_start) = ruby_bare_params(text, &tokens, header_end);
            }
        }

        let (body, expression_body) =
            body_range(text, &tokens, header_end, profile.block_style, language);
        sig.body_range = body;
        sig.kind = classify(&tokens, text, language, &sig, is_class);
        sig.returns_value =
            expression_body || returns_value(&text[sig.body_range.clone()], language);
        sig
    }

    pub fn body<'a>(&self, text: &'a str) -> &'a str {
        &text[self.body_range.clone()]
    }

    pub fn param_names(&self) -> Vec<String> {
        self.params.iter().map(|p| p.name.clone()).collect()
    }

    /// Index of the first parameter a new required one may not follow.
    pub fn tail_index(&self) -> usize {
        self.params
            .iter()
            .position(Param::is_tail)
            .unwrap_or(self.params.len())
    }
}

/// A declared parameter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    /// Spread marker as declared (`*`, `**`, `&`, `...`); empty for plain parameters.
    pub spread: String,
    pub has_default: bool,
    /// Python keyword-only or Ruby keyword parameter.
    pub keyword: bool,
}

impl Param {
    pub fn is_variadic(&self) -> bool {
        !self.spread.is_empty()
    }

    pub fn is_tail(&self) -> bool {
        self.has_default || self.keyword || self.is_variadic()
    }

    /// Call argument passing this parameter through unchanged.
    pub fn forward(&self, language: Language) -> String {
        match language {
            Language::Go if self.is_variadic() => format!("{}...", self.name),
            Language::Go | Language::Java => self.name.clone(),
            Language::Python if self.keyword => format!("{}={}", self.name, self.name),
            Language::Ruby if self.keyword => format!("{}: {}", self.name, self.name),
            _ => format!("{}{}", self.spread, self.name),
        }
    }
}

fn spread_markers(language: Language) -> &'static [&'static str] {
    match language {
        Language::Python => &["*", "**"],
        Language::Ruby => &["*", "**", "&"],
        Language::Rust => &[],
        _ => &["..."],
    }
}

const MODIFIERS: &[&str] = &[
    "pub", "public", "private", "protected", "static", "final", "abstract", "async",
    "export", "default", "synchronized", "override", "readonly", "unsafe",
];

fn find_definition_name(
    tokens: &[Token<'_>],
    language: Language,
    sig: &mut Signature,
) -> (Option<usize>, bool) {
    let profile = language.profile();

    let mut depth = 0i32;
    for (i, tok) in tokens.iter().enumerate() {
        match tok.text {
            "(" | "[" => depth += 1,
            ")" | "]" => depth -= 1,
            "{" if depth == 0 => break,
            ":" if depth == 0 && language == Language::Python => break,
            _ => {}
        }
        let is_fn = profile.function_keywords.contains(&tok.text);
        let is_class = profile.class_keywords.contains(&tok.text);
        if !is_fn && !is_class {
            continue;
        }
        let mut next = i + 1;
        if language == Language::Go && is_fn && tokens.get(next).map(|t| t.is("(")) == Some(true) {
            if let Some(close) = lexer::matching_close(tokens, next) {
                sig.receiver = tokens[next + 1..close]
                    .iter()
                    .find(|t| t.kind == TokenKind::Ident)
                    .map(|t| t.text.to_string());
                next = close + 1;
            }
        }
        // Ruby singleton methods: `def self.name`
        if language == Language::Ruby
            && tokens.get(next).map(|t| t.is("self")) == Some(true)
            && tokens.get(next + 1).map(|t| t.is(".")) == Some(true)
        {
            next += 2;
        }
        while tokens.get(next).map(|t| t.is("*") || t.is("&")) == Some(true) {
            next += 1;
        }
        let found = tokens
            .get(next)
            .filter(|t| t.kind == TokenKind::Ident || t.kind == TokenKind::Keyword && is_class)
            .map(|_| next);
        return (found, is_class);
    }

    // `const name = (...) =>` style bindings.
    if matches!(language, Language::JavaScript | Language::TypeScript) {
        let mut idx = 0;
        while tokens.get(idx).map(|t| MODIFIERS.contains(&t.text)) == Some(true) {
            idx += 1;
        }
        if tokens.get(idx).map(|t| matches!(t.text, "const" | "let" | "var")) == Some(true)
            && tokens.get(idx + 1).map(|t| t.kind == TokenKind::Ident) == Some(true)
        {
            return (Some(idx + 1), false);
        }
    }

    // Methods without a definition keyword: first identifier followed by `(`.
    let found = tokens
        .windows(2)
        .position(|w| w[0].kind == TokenKind::Ident && w[1].is("("));
    (found, false)
}

fn parameter_list(tokens: &[Token<'_>], language: Language) -> (Vec<Param>, Option<usize>) {
    let mut segments: Vec<Vec<&Token<'_>>> = vec![Vec::new()];
    let mut depth = 0i32;
    for tok in tokens {
        match tok.text {
            "(" | "[" | "{" | "<" => depth += 1,
            ")" | "]" | "}" | ">" => depth -= 1,
            "," if depth == 0 => {
                segments.push(Vec::new());
                continue;
            }
            _ => {}
        }
        if let Some(segment) = segments.last_mut() {
            segment.push(tok);
        }
    }

    let mut params = Vec::new();
    let mut tail_start = None;
    let mut keyword_only = false;
    for segment in &segments {
        let Some(first) = segment.first() else {
            continue;
        };
        // Bare `*`: everything after it is keyword-only.
        if language == Language::Python && segment.len() == 1 && first.is("*") {
            keyword_only = true;
            tail_start.get_or_insert(first.start);
            continue;
        }
        let Some(mut param) = segment_param(segment, language) else {
            continue;
        };
        if language == Language::Python {
            param.keyword = keyword_only && !param.is_variadic();
            keyword_only |= param.spread == "*";
        }
        if param.is_tail() {
            tail_start.get_or_insert(first.start);
        }
        params.push(param);
    }
    (params, tail_start)
}

fn segment_param(segment: &[&Token<'_>], language: Language) -> Option<Param> {
    let default_at = segment.iter().position(|t| t.is("="));
    let declared = &segment[..default_at.unwrap_or(segment.len())];
    let name_at = match language {
        Language::Java => declared.iter().rposition(|t| t.kind == TokenKind::Ident),
        Language::Php => declared
            .iter()
            .position(|t| t.text.starts_with('$') && t.text != "$this"),
        _ => declared.iter().position(|t| t.kind == TokenKind::Ident),
    }?;

    let markers = spread_markers(language);
    let spread = declared
        .iter()
        .find(|t| markers.contains(&t.text))
        .map(|t| t.text.to_string())
        .unwrap_or_default();
    let next = declared.get(name_at + 1).map(|t| t.text);
    let keyword = language == Language::Ruby && next == Some(":");
    let optional = language == Language::TypeScript && next == Some("?");

    Some(Param {
        name: declared[name_at].text.to_string(),
        spread,
        has_default: default_at.is_some() || optional || (keyword && declared.len() > name_at + 2),
        keyword,
    })
}

fn ruby_bare_params(
    text: &str,
    tokens: &[Token<'_>],
    from: usize,
) -> (Vec<Param>, Option<usize>) {
    let Some(first) = tokens.get(from) else {
        return (Vec::new(), None);
    };
    let header_end = from
        .checked_sub(1)
        .map(|i| tokens[i].end)
        .unwrap_or(0);
    if text[header_end..first.start].contains('\n') {
        return (Vec::new(), None);
    }
    let line_end = text[first.start..]
        .find('\n')
        .map(|off| first.start + off)
        .unwrap_or(text.len());
    let line: Vec<Token<'_>> = tokens[from..]
        .iter()
        .take_while(|t| t.start < line_end)
        .copied()
        .collect();
    parameter_list(&line, Language::Ruby)
}

fn body_range(
    text: &str,
    tokens: &[Token<'_>],
    header_end: usize,
    style: BlockStyle,
    language: Language,
) -> (Range<usize>, bool) {
    match style {
        BlockStyle::Braces => {
            let open = (header_end..tokens.len()).find(|&i| tokens[i].is("{"));
            let arrow = (header_end..tokens.len()).find(|&i| tokens[i].is("=>"));
            let is_js = matches!(language, Language::JavaScript | Language::TypeScript);
            // Arrow functions with an expression body: `(x) => x * 2`
            if let Some(a) = arrow.filter(|_| is_js) {
                if open.map(|o| a < o && a + 1 != o).unwrap_or(true) {
                    return (tokens[a].end..text.len(), true);
                }
            }
            let range = match open {
                Some(o) => {
                    let close = lexer::matching_close(tokens, o).unwrap_or(tokens.len() - 1);
                    tokens[o].end..tokens[close].start.max(tokens[o].end)
                }
                None => text.len()..text.len(),
            };
            (range, false)
        }
        BlockStyle::Indent => {
            let mut depth = 0i32;
            for tok in &tokens[header_end.min(tokens.len())..] {
                match tok.text {
                    "(" | "[" | "{" => depth += 1,
                    ")" | "]" | "}" => depth -= 1,
                    ":" if depth == 0 => return (tok.end..text.len(), false),
                    _ => {}
                }
            }
            (text.len()..text.len(), false)
        }
        BlockStyle::EndKeyword => {
            let start = tokens
                .get(header_end.saturating_sub(1))
                .map(|t| {
                    text[t.end..]
                        .find('\n')
                        .map(|off| t.end + off)
                        .unwrap_or(text.len())
                })
                .unwrap_or(0);
            let end = tokens
                .iter()
                .rev()
                .find(|t| t.is("end"))
                .map(|t| t.start)
                .filter(|e| *e >= start)
                .unwrap_or(text.len());
            (start..end, false)
        }
    }
}

fn classify(
    tokens: &[Token<'_>],
    text: &str,
    language: Language,
    sig: &Signature,
    is_class: bool,
) -> ConstructKind {
    if is_class {
        return ConstructKind::Class;
    }
    if sig.name.is_none() {
        return ConstructKind::Unknown;
    }
    let body = &text[sig.body_range.clone()];
    let param_text = sig
        .params_range
        .clone()
        .map(|r| &text[r])
        .unwrap_or("");
    let first_param = param_text.split(',').next().unwrap_or("").trim();

    let is_method = match language {
        Language::Python => matches!(first_param.split(':').next().map(str::trim), Some("self") | Some("cls")),
        Language::Rust => {
            let trimmed = first_param.trim_start_matches('&').trim_start_matches("mut ").trim();
            trimmed == "self" || trimmed.starts_with("self:") || first_param.starts_with("&'")
        }
        Language::Go => sig.receiver.is_some(),
        Language::Java => !tokens
            .iter()
            .take_while(|t| !t.is("("))
            .any(|t| t.is("static")),
        Language::JavaScript | Language::TypeScript => {
            let has_keyword = tokens
                .iter()
                .take_while(|t| !t.is("("))
                .any(|t| t.is("function") || t.is("const") || t.is("let") || t.is("var"));
            !has_keyword || body.contains("this.")
        }
        Language::Php => body.contains("$this"),
        Language::Ruby => body.contains("self.") || body.contains('@'),
    };

    if is_method {
        ConstructKind::Method
    } else {
        ConstructKind::Function
    }
}

fn returns_value(body: &str, language: Language) -> bool {
    // Ruby returns its last expression.
    if language == Language::Ruby {
        return !body.trim().is_empty();
    }
    let tokens = lexer::tokenize(body, Some(language));
    tokens.iter().enumerate().any(|(i, tok)| {
        tok.is("return")
            && tokens
                .get(i + 1)
                .map(|next| {
                    !matches!(next.text, ";" | "}") && !body[tok.end..next.start].contains('\n')
                })
                .unwrap_or(false)
    })
}
