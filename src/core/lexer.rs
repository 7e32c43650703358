//! Lightweight tokenizer shared by similarity scoring, parameter inference and
//! code generation.
//!
//! Tokens carry byte offsets into the original text. Comments are blanked out
//! before tokenizing, so offsets stay valid for reverse-offset replacement.

use std::sync::LazyLock;

use regex::Regex;

use super::language::{Language, SyntaxProfile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Ident,
    Keyword,
    Str,
    Num,
    Bool,
    Punct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    pub start: usize,
    pub end: usize,
}

impl Token<'_> {
    pub fn is(&self, text: &str) -> bool {
        self.text == text
    }

    pub fn is_literal(&self) -> bool {
        matches!(self.kind, TokenKind::Str | TokenKind::Num | TokenKind::Bool)
    }
}

/// How identifiers are rendered by [`normalize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentMode {
    /// `ID0, ID1, ...` in first-occurrence order.
    Positional,
    /// Every identifier becomes `ID`.
    Uniform,
    /// Identifiers kept as written.
    Verbatim,
}

const STRING_PATTERN: &str = r#""""[\s\S]*?"""|'''[\s\S]*?'''|"(?:[^"\\\n]|\\.)*"|`(?:[^`\\]|\\[\s\S])*`"#;
const NUMBER_PATTERN: &str =
    r"0[xXbBoO][0-9a-fA-F_]+|\d[\d_]*(?:\.\d[\d_]*)?(?:[eE][+-]?\d+)?";
const IDENT_PATTERN: &str = r"\$?[A-Za-z_][A-Za-z0-9_]*";
const OPERATOR_PATTERN: &str = r"\.\.\.|\?\?=|===|!==|\*\*=|<<=|>>=|=>|->|::|==|!=|<=|>=|&&|\|\||\+=|-=|\*=|/=|%=|:=|\*\*|\?\.|\?\?|<<|>>|\+\+|--|\.\.";

static GENERIC_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?P<s>{}|'(?:[^'\\\n]|\\.)*')|(?P<n>{})|(?P<i>{})|(?P<o>{})|(?P<p>\S)",
        STRING_PATTERN, NUMBER_PATTERN, IDENT_PATTERN, OPERATOR_PATTERN
    ))
    .unwrap()
});

// Rust single quotes are char literals or lifetimes, never strings.
static RUST_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?P<s>{}|'(?:[^'\\\n]|\\.)')|(?P<l>'[A-Za-z_][A-Za-z0-9_]*)|(?P<n>{})|(?P<i>{})|(?P<o>{})|(?P<p>\S)",
        STRING_PATTERN, NUMBER_PATTERN, IDENT_PATTERN, OPERATOR_PATTERN
    ))
    .unwrap()
});

fn is_any_keyword(word: &str) -> bool {
    Language::ALL
        .iter()
        .any(|lang| lang.profile().is_keyword(word))
}

fn is_bool(word: &str) -> bool {
    matches!(word, "true" | "false" | "True" | "False")
}

/// Tokenize `source`. With `language = None` the keyword set is the union of
/// every supported language and comment stripping is heuristic.
pub fn tokenize(source: &str, language: Option<Language>) -> Vec<Token<'_>> {
    let profile = language.map(|l| l.profile());
    let masked = mask_comments(source, profile);
    let regex = match language {
        Some(Language::Rust) => &*RUST_TOKEN,
        _ => &*GENERIC_TOKEN,
    };

    let mut tokens = Vec::new();
    for caps in regex.captures_iter(&masked) {
        let Some(m) = caps.get(0) else { continue };
        let text = &source[m.start()..m.end()];
        let kind = if caps.name("s").is_some() {
            TokenKind::Str
        } else if caps.name("n").is_some() {
            TokenKind::Num
        } else if caps.name("l").is_some() {
            TokenKind::Keyword
        } else if caps.name("i").is_some() {
            if is_bool(text) {
                TokenKind::Bool
            } else if match profile {
                Some(p) => p.is_keyword(text),
                None => is_any_keyword(text),
            } {
                TokenKind::Keyword
            } else {
                TokenKind::Ident
            }
        } else {
            TokenKind::Punct
        };
        tokens.push(Token {
            kind,
            text,
            start: m.start(),
            end: m.end(),
        });
    }
    tokens
}

/// Render tokens in their normalized matching form.
pub fn normalize(tokens: &[Token<'_>], mode: IdentMode) -> Vec<String> {
    let mut seen: Vec<&str> = Vec::new();
    tokens
        .iter()
        .map(|tok| match tok.kind {
            TokenKind::Str => "STR".to_string(),
            TokenKind::Num => "NUM".to_string(),
            TokenKind::Bool => "BOOL".to_string(),
            TokenKind::Keyword | TokenKind::Punct => tok.text.to_string(),
            TokenKind::Ident => match mode {
                IdentMode::Verbatim => tok.text.to_string(),
                IdentMode::Uniform => "ID".to_string(),
                IdentMode::Positional => {
                    let index = match seen.iter().position(|s| *s == tok.text) {
                        Some(i) => i,
                        None => {
                            seen.push(tok.text);
                            seen.len() - 1
                        }
                    };
                    format!("ID{}", index)
                }
            },
        })
        .collect()
}

/// Replace comment bytes with spaces, keeping newlines and byte length intact.
pub fn mask_comments(source: &str, profile: Option<&SyntaxProfile>) -> String {
    let bytes = source.as_bytes();
    let mut out = bytes.to_vec();
    let line_markers: &[&str] = match profile {
        Some(p) => p.line_comments,
        None => &["//", "#"],
    };
    let block = match profile {
        Some(p) => p.block_comment,
        None => Some(("/*", "*/")),
    };
    let triple_quotes = matches!(profile.map(|p| p.language), None | Some(Language::Python));

    let mut i = 0;
    let mut line_start = true;
    while i < bytes.len() {
        let b = bytes[i];

        if triple_quotes && (starts_at(bytes, i, "\"\"\"") || starts_at(bytes, i, "'''")) {
            let quote = &source[i..i + 3];
            match source[i + 3..].find(quote) {
                Some(off) => i = i + 3 + off + 3,
                None => i = bytes.len(),
            }
            line_start = false;
            continue;
        }

        if b == b'"' || b == b'\'' || b == b'`' {
            i = skip_string(bytes, i, profile.map(|p| p.language));
            line_start = false;
            continue;
        }

        if let Some((open, close)) = block {
            if starts_at(bytes, i, open) {
                let end = source[i + open.len()..]
                    .find(close)
                    .map(|off| i + open.len() + off + close.len())
                    .unwrap_or(bytes.len());
                blank(&mut out, i, end);
                i = end;
                continue;
            }
        }

        if let Some(marker) = line_markers.iter().find(|m| starts_at(bytes, i, m)) {
            if is_line_comment(bytes, i, marker, profile, line_start) {
                let end = source[i..]
                    .find('\n')
                    .map(|off| i + off)
                    .unwrap_or(bytes.len());
                blank(&mut out, i, end);
                i = end;
                continue;
            }
        }

        if b == b'\n' {
            line_start = true;
        } else if !b.is_ascii_whitespace() {
            line_start = false;
        }
        i += 1;
    }

    String::from_utf8(out).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

fn starts_at(bytes: &[u8], i: usize, pattern: &str) -> bool {
    bytes[i..].starts_with(pattern.as_bytes())
}

fn is_line_comment(
    bytes: &[u8],
    i: usize,
    marker: &str,
    profile: Option<&SyntaxProfile>,
    line_start: bool,
) -> bool {
    if marker != "#" {
        return true;
    }
    let next = bytes.get(i + 1).copied();
    match profile.map(|p| p.language) {
        Some(Language::Php) => next != Some(b'['),
        Some(_) => true,
        None => match next {
            None | Some(b' ') | Some(b'\t') | Some(b'\n') | Some(b'\r') | Some(b'#') => true,
            Some(b'[') | Some(b'!') | Some(b'{') => false,
            Some(_) => line_start,
        },
    }
}

fn skip_string(bytes: &[u8], start: usize, language: Option<Language>) -> usize {
    let quote = bytes[start];
    // Rust lifetimes look like an unterminated char literal.
    if quote == b'\'' && language == Some(Language::Rust) {
        let closes = bytes.get(start + 2) == Some(&b'\'')
            || (bytes.get(start + 1) == Some(&b'\\') && bytes.get(start + 3) == Some(&b'\''));
        if !closes {
            return start + 1;
        }
    }
    let multiline = quote == b'`' || language == Some(Language::Rust) && quote == b'"';
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' if !multiline => return i,
            c if c == quote => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

fn blank(out: &mut [u8], start: usize, end: usize) {
    let len = out.len();
    for byte in &mut out[start..end.min(len)] {
        if *byte != b'\n' {
            *byte = b' ';
        }
    }
}

/// Index of the token closing the bracket opened at `open`, if balanced.
pub fn matching_close(tokens: &[Token<'_>], open: usize) -> Option<usize> {
    let (o, c) = match tokens.get(open)?.text {
        "(" => ("(", ")"),
        "[" => ("[", "]"),
        "{" => ("{", "}"),
        _ => return None,
    };
    let mut depth = 0usize;
    for (idx, tok) in tokens.iter().enumerate().skip(open) {
        if tok.kind != TokenKind::Punct {
            continue;
        }
        if tok.text == o {
            depth += 1;
        } else if tok.text == c {
            depth -= 1;
            if depth == 0 {
                return Some(idx);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(source: &str, language: Option<Language>) -> Vec<String> {
        tokenize(source, language)
            .iter()
            .map(|t| t.text.to_string())
            .collect()
    }

    #[test]
    fn tokenizes_literals_identifiers_and_operators() {
        let tokens = tokenize("x = $name + \"a b\" != 3.5", None);
        let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Ident,
                TokenKind::Punct,
                TokenKind::Ident,
                TokenKind::Punct,
                TokenKind::Str,
                TokenKind::Punct,
                TokenKind::Num,
            ]
        );
        assert_eq!(tokens[2].text, "$name");
        assert_eq!(tokens[5].text, "!=");
    }

    #[test]
    fn comments_are_stripped_but_offsets_kept() {
        let source = "a = 1 # note\nb = \"# not a comment\"";
        let tokens = tokenize(source, Some(Language::Python));
        assert_eq!(
            tokens.iter().map(|t| t.text).collect::<Vec<_>>(),
            vec!["a", "=", "1", "b", "=", "\"# not a comment\""]
        );
        let b = tokens[3];
        assert_eq!(&source[b.start..b.end], "b");
    }

    #[test]
    fn block_comments_are_stripped() {
        assert_eq!(
            texts("let a = /* gone */ 2; // also gone", Some(Language::JavaScript)),
            vec!["let", "a", "=", "2", ";"]
        );
    }

    #[test]
    fn generic_hash_heuristic_keeps_attributes() {
        let toks = texts("#[derive(Debug)]\nstruct A; # trailing", None);
        assert_eq!(toks[0], "#");
        assert!(!toks.contains(&"trailing".to_string()));
    }

    #[test]
    fn rust_lifetimes_are_not_strings() {
        let toks = tokenize("fn f<'a>(x: &'a str) -> char { 'c' }", Some(Language::Rust));
        assert!(toks.iter().any(|t| t.text == "'a" && t.kind == TokenKind::Keyword));
        assert!(toks.iter().any(|t| t.text == "'c'" && t.kind == TokenKind::Str));
    }

    #[test]
    fn python_docstrings_are_single_tokens() {
        let toks = tokenize("def f():\n    \"\"\"Doc\n    more\"\"\"\n    return 1", Some(Language::Python));
        assert_eq!(toks.iter().filter(|t| t.kind == TokenKind::Str).count(), 1);
    }

    #[test]
    fn positional_normalization_is_first_occurrence_order() {
        let tokens = tokenize("total = price * price + tax", None);
        assert_eq!(
            normalize(&tokens, IdentMode::Positional),
            vec!["ID0", "=", "ID1", "*", "ID1", "+", "ID2"]
        );
        assert_eq!(normalize(&tokens, IdentMode::Uniform)[0], "ID");
    }

    #[test]
    fn booleans_and_keywords() {
        let tokens = tokenize("return True", Some(Language::Python));
        assert_eq!(tokens[0].kind, TokenKind::Keyword);
        assert_eq!(tokens[1].kind, TokenKind::Bool);
    }

    #[test]
    fn matching_close_handles_nesting() {
        let tokens = tokenize("f(a, (b), c) + 1", None);
        assert_eq!(matching_close(&tokens, 1), Some(9));
    }
}
