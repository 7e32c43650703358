//! Parameter inference across the instances of a duplication group.
//!
//! Every instance is token-aligned against the representative. Positions
//! whose raw text differs become parameter slots; gaps present on only one
//! side are structural differences and are reported, not parameterized.

use std::collections::{BTreeSet, HashSet};
use std::ops::Range;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use similar::{capture_diff_slices, Algorithm, DiffOp};

use super::grouper::DuplicationGroup;
use super::naming::{self, generate_parameter_name};
use super::types::{infer_value_type, InferredType};
use crate::construct::{Construct, Signature};
use crate::language::Language;
use crate::lexer::{self, IdentMode, Token, TokenKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterOrigin {
    Literal,
    Identifier,
    NestedCall,
    Expression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterCandidate {
    pub name: String,
    pub inferred_type: InferredType,
    /// One value per group instance, representative first.
    pub values: Vec<String>,
    pub origin: ParameterOrigin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    /// Byte ranges of the representative's text replaced by this parameter.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub occurrences: Vec<Range<usize>>,
}

/// Source present in one instance with no counterpart in the other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnalignedRegion {
    pub instance: usize,
    pub file: PathBuf,
    pub line: usize,
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Inference {
    pub parameters: Vec<ParameterCandidate>,
    pub unaligned_regions: Vec<UnalignedRegion>,
    pub notes: Vec<String>,
}

pub fn infer(group: &DuplicationGroup) -> Vec<ParameterCandidate> {
    infer_detailed(group).parameters
}

struct Alignment<'a> {
    text: &'a str,
    tokens: Vec<Token<'a>>,
    /// Representative token index -> instance token index.
    matched: Vec<Option<usize>>,
}

impl Alignment<'_> {
    fn value(&self, slot: &Range<usize>) -> String {
        if slot.len() == 1 {
            if let Some(i) = self.matched[slot.start] {
                return self.tokens[i].text.to_string();
            }
        }
        let start = (0..slot.start)
            .rev()
            .find_map(|r| self.matched[r])
            .map(|i| i + 1)
            .unwrap_or(0);
        let end = (slot.end..self.matched.len())
            .find_map(|r| self.matched[r])
            .unwrap_or(self.tokens.len());
        if start >= end {
            return String::new();
        }
        self.text[self.tokens[start].start..self.tokens[end - 1].end].to_string()
    }
}

pub fn infer_detailed(group: &DuplicationGroup) -> Inference {
    let language = group.language;
    let rep = group.representative();
    let rep_tokens = lexer::tokenize(&rep.text, Some(language));
    let rep_norm = lexer::normalize(&rep_tokens, IdentMode::Uniform);
    let sig = Signature::parse(&rep.text, language);

    let mut inference = Inference::default();
    let mut slots: Vec<Range<usize>> = Vec::new();
    let mut alignments = Vec::new();
    // One-sided gaps keyed by the representative tokens they sit in.
    let mut gaps: Vec<(Range<usize>, UnalignedRegion)> = Vec::new();

    for (k, instance) in group.instances.iter().enumerate().skip(1) {
        let tokens = lexer::tokenize(&instance.text, Some(language));
        let norm = lexer::normalize(&tokens, IdentMode::Uniform);
        let mut matched = vec![None; rep_tokens.len()];

        for op in capture_diff_slices(Algorithm::Myers, &rep_norm, &norm) {
            match op {
                DiffOp::Equal {
                    old_index,
                    new_index,
                    len,
                } => {
                    for t in 0..len {
                        matched[old_index + t] = Some(new_index + t);
                        if rep_tokens[old_index + t].text != tokens[new_index + t].text {
                            slots.push(old_index + t..old_index + t + 1);
                        }
                    }
                }
                DiffOp::Replace {
                    old_index, old_len, ..
                } => slots.push(old_index..old_index + old_len),
                DiffOp::Delete {
                    old_index, old_len, ..
                } => gaps.push((
                    old_index..old_index + old_len,
                    region(0, rep, &rep_tokens, old_index..old_index + old_len),
                )),
                DiffOp::Insert {
                    old_index,
                    new_index,
                    new_len,
                } => gaps.push((
                    old_index..old_index,
                    region(k, instance, &tokens, new_index..new_index + new_len),
                )),
            }
        }

        alignments.push(Alignment {
            text: &instance.text,
            tokens,
            matched,
        });
    }

    let bound = bound_names(&rep_tokens, &sig);
    let mut existing: Vec<String> = rep_tokens
        .iter()
        .filter(|t| t.kind == TokenKind::Ident)
        .map(|t| t.text.to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let gap_ranges: Vec<Range<usize>> = gaps.iter().map(|(r, _)| r.clone()).collect();
    let slots = merge_slots(expand_calls(slots, &gap_ranges, &rep_tokens, sig.body_range.start));
    let mut regions: BTreeSet<UnalignedRegion> = gaps
        .into_iter()
        .filter(|(range, _)| !slots.iter().any(|s| covers(s, range)))
        .map(|(_, region)| region)
        .collect();

    for slot in slots {
        let first = rep_tokens[slot.start];
        let last = rep_tokens[slot.end - 1];
        let rep_value = rep.text[first.start..last.end].to_string();
        let mut values = vec![rep_value];
        values.extend(alignments.iter().map(|a| a.value(&slot)));
        if values.iter().all(|v| *v == values[0]) {
            continue;
        }

        if sig.name_range.as_ref().map(|r| r.start) == Some(first.start) {
            continue;
        }
        if first.start < sig.body_range.start {
            inference
                .notes
                .push(format!("Signatures differ ({}); kept the representative's", values.join(" / ")));
            continue;
        }

        let single = slot.len() == 1 && alignments.iter().all(|a| a.matched[slot.start].is_some());
        let origin = if single {
            match first.kind {
                TokenKind::Ident => {
                    let prev = slot.start.checked_sub(1).map(|i| rep_tokens[i].text);
                    if matches!(prev, Some(".") | Some("->") | Some("::") | Some("?.")) {
                        inference.notes.push(format!(
                            "Member name differs ({}); review before applying",
                            values.join(" / ")
                        ));
                        continue;
                    }
                    if bound.contains(first.text)
                        && consistently_renamed(first.text, &rep_tokens, &alignments)
                    {
                        continue;
                    }
                    ParameterOrigin::Identifier
                }
                TokenKind::Str | TokenKind::Num | TokenKind::Bool => ParameterOrigin::Literal,
                _ => continue,
            }
        } else {
            if values.iter().any(|v| !is_expression(v, language)) {
                for (k, (instance, value)) in group.instances.iter().zip(&values).enumerate() {
                    if value.trim().is_empty() {
                        continue;
                    }
                    let offset = if k == 0 {
                        first.start
                    } else {
                        instance.text.find(value.as_str()).unwrap_or(0)
                    };
                    regions.insert(UnalignedRegion {
                        instance: k,
                        file: instance.file.clone(),
                        line: instance.start_line + line_offset(&instance.text, offset),
                        text: value.clone(),
                    });
                }
                continue;
            }
            classify_span(&values, language)
        };

        // Identical value tuples share one parameter.
        if let Some(existing_param) = inference
            .parameters
            .iter_mut()
            .find(|p| p.values == values)
        {
            existing_param.occurrences.push(first.start..last.end);
            continue;
        }

        let inferred_type = values
            .iter()
            .map(|v| infer_value_type(v))
            .reduce(InferredType::union)
            .unwrap_or(InferredType::Any);

        let base = context_name(&rep_tokens, &slot, &rep.text)
            .or_else(|| match origin {
                ParameterOrigin::Identifier => {
                    let refs: Vec<&str> = values.iter().map(String::as_str).collect();
                    let affix = naming::common_affix(&refs);
                    (!affix.is_empty()).then(|| affix.join("_"))
                }
                ParameterOrigin::NestedCall => callee_stem(&values[0]),
                _ => None,
            })
            .unwrap_or_else(|| inferred_type.default_name().to_string());
        let name = generate_parameter_name(&base, &existing, language);
        existing.push(name.clone());

        let default_value = (origin == ParameterOrigin::Literal)
            .then(|| majority_value(&values))
            .flatten();

        inference.parameters.push(ParameterCandidate {
            name,
            inferred_type,
            values,
            origin,
            default_value,
            occurrences: vec![first.start..last.end],
        });
    }

    inference.unaligned_regions = regions.into_iter().collect();
    if !inference.unaligned_regions.is_empty() {
        inference.notes.push(format!(
            "{} structural difference(s) could not be aligned; the extracted code follows the representative",
            inference.unaligned_regions.len()
        ));
    }
    inference
}

fn region(
    instance: usize,
    construct: &Construct,
    tokens: &[Token<'_>],
    range: Range<usize>,
) -> UnalignedRegion {
    let start = tokens[range.start].start;
    let end = tokens[range.end - 1].end;
    UnalignedRegion {
        instance,
        file: construct.file.clone(),
        line: construct.start_line + line_offset(&construct.text, start),
        text: construct.text[start..end].to_string(),
    }
}

impl PartialOrd for UnalignedRegion {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for UnalignedRegion {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.instance, self.line, &self.text, &self.file).cmp(&(
            other.instance,
            other.line,
            &other.text,
            &other.file,
        ))
    }
}

fn line_offset(text: &str, byte: usize) -> usize {
    text[..byte.min(text.len())].matches('\n').count()
}

/// Sort and merge overlapping ranges.
fn merge_slots(mut slots: Vec<Range<usize>>) -> Vec<Range<usize>> {
    slots.sort_by_key(|r| (r.start, r.end));
    let mut merged: Vec<Range<usize>> = Vec::new();
    for slot in slots {
        if slot.is_empty() {
            continue;
        }
        match merged.last_mut() {
            Some(last) if slot.start < last.end => last.end = last.end.max(slot.end),
            _ => merged.push(slot),
        }
    }
    merged
}

fn covers(slot: &Range<usize>, gap: &Range<usize>) -> bool {
    if gap.is_empty() {
        slot.start < gap.start && gap.start < slot.end
    } else {
        slot.start <= gap.start && gap.end <= slot.end
    }
}

/// A differing callee whose arguments also differ stands for the whole call.
fn expand_calls(
    slots: Vec<Range<usize>>,
    gaps: &[Range<usize>],
    tokens: &[Token<'_>],
    body_start: usize,
) -> Vec<Range<usize>> {
    slots
        .iter()
        .map(|slot| {
            let callee = tokens[slot.start];
            if slot.len() != 1 || callee.kind != TokenKind::Ident || callee.start < body_start {
                return slot.clone();
            }
            let prev = slot.start.checked_sub(1).map(|i| tokens[i].text);
            if matches!(prev, Some(".") | Some("->") | Some("::") | Some("?.")) {
                return slot.clone();
            }
            if tokens.get(slot.start + 1).map(|t| t.is("(")) != Some(true) {
                return slot.clone();
            }
            let Some(close) = lexer::matching_close(tokens, slot.start + 1) else {
                return slot.clone();
            };
            let call = slot.start + 1..close + 1;
            let inner_differs = slots.iter().any(|s| s.start > slot.start && covers(&call, s))
                || gaps.iter().any(|g| covers(&call, g));
            if inner_differs {
                slot.start..close + 1
            } else {
                slot.clone()
            }
        })
        .collect()
}

/// Names bound inside the representative: definition name, own parameters,
/// assignment targets, loop and block variables.
fn bound_names(tokens: &[Token<'_>], sig: &Signature) -> HashSet<String> {
    let mut bound: HashSet<String> = sig.params.iter().map(|p| p.name.clone()).collect();
    if let Some(name) = &sig.name {
        bound.insert(name.clone());
    }

    let mut in_for_header = false;
    let mut in_pipes = false;
    for (i, tok) in tokens.iter().enumerate() {
        let prev = i.checked_sub(1).map(|p| tokens[p].text);
        let next = tokens.get(i + 1).map(|t| t.text);

        match tok.text {
            "for" | "foreach" => in_for_header = true,
            "in" | "of" | "range" | ":" | "{" if in_for_header => in_for_header = false,
            "|" => in_pipes = !in_pipes && matches!(prev, Some("{") | Some("do")),
            _ => {}
        }
        if tok.kind != TokenKind::Ident {
            continue;
        }

        let is_member = matches!(prev, Some(".") | Some("->") | Some("::") | Some("?."));
        let assigned = matches!(next, Some("=") | Some(":=") | Some("+=") | Some("-=") | Some("*=") | Some("/="));
        let declared = matches!(
            prev,
            Some("let") | Some("var") | Some("const") | Some("mut") | Some("as") | Some("rescue")
        );
        let caught = prev == Some("(")
            && i >= 2
            && matches!(tokens[i - 2].text, "catch" | "except");
        if !is_member && (assigned || declared || caught || in_for_header || in_pipes) {
            bound.insert(tok.text.to_string());
        }
    }
    bound
}

/// Every aligned occurrence of `name` maps to one name per instance, and that
/// name is not used for anything else.
fn consistently_renamed(name: &str, rep_tokens: &[Token<'_>], alignments: &[Alignment<'_>]) -> bool {
    alignments.iter().all(|alignment| {
        let mut mapped: Option<&str> = None;
        for (r, tok) in rep_tokens.iter().enumerate() {
            let Some(i) = alignment.matched[r] else { continue };
            let other = alignment.tokens[i].text;
            if tok.text == name {
                match mapped {
                    None => mapped = Some(other),
                    Some(m) if m != other => return false,
                    _ => {}
                }
            }
        }
        let Some(mapped) = mapped else { return true };
        rep_tokens.iter().enumerate().all(|(r, tok)| {
            tok.text == name
                || alignment.matched[r]
                    .map(|i| alignment.tokens[i].text != mapped)
                    .unwrap_or(true)
        })
    })
}

const STATEMENT_KEYWORDS: &[&str] = &[
    "return", "if", "else", "elif", "elsif", "for", "foreach", "while", "def", "class",
    "function", "fn", "func", "let", "var", "const", "try", "catch", "except", "end", "do",
    "switch", "case", "break", "continue", "import", "unless", "until", "begin", "rescue",
];

/// Whether a span can stand in as a single argument expression.
fn is_expression(value: &str, language: Language) -> bool {
    if value.trim().is_empty() {
        return false;
    }
    let tokens = lexer::tokenize(value, Some(language));
    let mut depth = 0i32;
    let mut last_end = 0;
    for tok in &tokens {
        if depth == 0 && value[last_end..tok.start].contains('\n') && last_end > 0 {
            return false;
        }
        match tok.text {
            "(" | "[" | "{" => depth += 1,
            ")" | "]" | "}" => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            ";" => return false,
            t if tok.kind == TokenKind::Keyword && STATEMENT_KEYWORDS.contains(&t) => return false,
            _ => {}
        }
        last_end = tok.end;
    }
    depth == 0
}

fn classify_span(values: &[String], language: Language) -> ParameterOrigin {
    let shapes: Vec<Vec<Token<'_>>> = values
        .iter()
        .map(|v| lexer::tokenize(v, Some(language)))
        .collect();
    if shapes.iter().all(|t| t.len() == 1 && t[0].is_literal())
        || shapes
            .iter()
            .all(|t| t.len() == 2 && t[0].is("-") && t[1].kind == TokenKind::Num)
    {
        return ParameterOrigin::Literal;
    }
    if shapes.iter().all(|t| is_call(t)) {
        return ParameterOrigin::NestedCall;
    }
    if shapes.iter().all(|t| {
        !t.is_empty()
            && t.iter().enumerate().all(|(i, tok)| {
                if i % 2 == 0 {
                    tok.kind == TokenKind::Ident
                } else {
                    matches!(tok.text, "." | "->" | "::")
                }
            })
    }) {
        return ParameterOrigin::Identifier;
    }
    ParameterOrigin::Expression
}

fn is_call(tokens: &[Token<'_>]) -> bool {
    let Some(open) = tokens.iter().position(|t| t.is("(")) else {
        return false;
    };
    open > 0
        && tokens[open - 1].kind == TokenKind::Ident
        && lexer::matching_close(tokens, open) == Some(tokens.len() - 1)
}

/// Name of the assignment target, keyword argument or object key that the
/// span is bound to, when the span is the whole bound value.
fn context_name(tokens: &[Token<'_>], slot: &Range<usize>, text: &str) -> Option<String> {
    if slot.start < 2 {
        return None;
    }
    let prev = tokens[slot.start - 1];
    let key = tokens[slot.start - 2];
    if !matches!(prev.text, "=" | ":=" | ":" | "=>") {
        return None;
    }
    let last = tokens[slot.end - 1];
    let whole = match tokens.get(slot.end) {
        None => true,
        Some(next) => {
            matches!(next.text, ")" | "," | ";" | "}" | "]") || text[last.end..next.start].contains('\n')
        }
    };
    if !whole {
        return None;
    }
    let name = match key.kind {
        TokenKind::Ident => key.text.trim_start_matches('$'),
        TokenKind::Str => key.text.trim_matches(|c| c == '"' || c == '\'' || c == '`'),
        _ => return None,
    };
    (!name.is_empty()).then(|| name.to_string())
}

fn callee_stem(call: &str) -> Option<String> {
    let tokens = lexer::tokenize(call, None);
    let open = tokens.iter().position(|t| t.is("("))?;
    let callee = tokens.get(open.checked_sub(1)?)?.text;
    let words = naming::words(callee);
    let verbs = ["get", "fetch", "load", "make", "create", "build", "compute", "calc", "read"];
    let rest: Vec<String> = match words.first() {
        Some(first) if verbs.contains(&first.as_str()) && words.len() > 1 => words[1..].to_vec(),
        _ => words,
    };
    (!rest.is_empty()).then(|| rest.join("_"))
}

/// The value shared by a strict majority of at least three instances.
fn majority_value(values: &[String]) -> Option<String> {
    if values.len() < 3 {
        return None;
    }
    let mut best: Option<(&String, usize)> = None;
    for v in values {
        let count = values.iter().filter(|o| *o == v).count();
        if best.map(|(_, c)| count > c).unwrap_or(true) {
            best = Some((v, count));
        }
    }
    best.filter(|(_, c)| c * 2 > values.len())
        .map(|(v, _)| v.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group_of(language: Language, texts: &[&str]) -> DuplicationGroup {
        let instances = texts
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let lines = text.lines().count();
                Construct::new(
                    language,
                    format!("/p/file{}.{}", i, language.profile().primary_extension()),
                    (1, 0),
                    (lines, 0),
                    *text,
                )
            })
            .collect();
        DuplicationGroup {
            id: 0,
            language,
            instances,
            similarity: 1.0,
        }
    }

    #[test]
    fn single_literal_with_renamed_local() {
        let group = group_of(
            Language::Python,
            &[
                "def greet_user():\n    message = \"Hello\" + suffix()\n    print(message)\n    return message",
                "def greet_admin():\n    text = \"Welcome\" + suffix()\n    print(text)\n    return text",
            ],
        );
        let params = infer(&group);
        assert_eq!(params.len(), 1, "{:?}", params);
        let p = &params[0];
        assert_eq!(p.inferred_type, InferredType::String);
        assert_eq!(p.origin, ParameterOrigin::Literal);
        assert_eq!(p.values, vec!["\"Hello\"", "\"Welcome\""]);
        assert_eq!(p.name, "text");
        assert_eq!(p.occurrences.len(), 1);
    }

    #[test]
    fn repeated_value_tuples_share_a_parameter() {
        let group = group_of(
            Language::JavaScript,
            &[
                "function a() {\n  log(\"users\");\n  return fetch(\"users\");\n}",
                "function b() {\n  log(\"orders\");\n  return fetch(\"orders\");\n}",
            ],
        );
        let params = infer(&group);
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].occurrences.len(), 2);
    }

    #[test]
    fn context_names_come_from_assignment_targets() {
        let group = group_of(
            Language::Python,
            &[
                "def a(db):\n    limit = 10\n    return db.take(limit)",
                "def b(db):\n    limit = 25\n    return db.take(limit)",
            ],
        );
        let params = infer(&group);
        assert_eq!(params.len(), 1);
        // `limit` is already used in the body, so the name is made unique.
        assert_eq!(params[0].name, "limit2");
        assert_eq!(params[0].inferred_type, InferredType::Int);
    }

    #[test]
    fn free_identifiers_become_parameters() {
        let group = group_of(
            Language::Python,
            &[
                "def notify(user):\n    send_email(user)\n    return True",
                "def alert(user):\n    send_sms(user)\n    return True",
            ],
        );
        let params = infer(&group);
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].origin, ParameterOrigin::Identifier);
        assert_eq!(params[0].name, "send");
    }

    #[test]
    fn nested_calls_are_detected() {
        let group = group_of(
            Language::Python,
            &[
                "def a():\n    data = compute(load_users(1, 2))\n    return data",
                "def b():\n    data = compute(load_orders())\n    return data",
            ],
        );
        let params = infer(&group);
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].origin, ParameterOrigin::NestedCall);
        assert_eq!(params[0].name, "users");
    }

    #[test]
    fn majority_literal_becomes_default() {
        let group = group_of(
            Language::Python,
            &[
                "def a():\n    return fetch(30)",
                "def b():\n    return fetch(30)\n",
                "def c():\n    return fetch(60)",
            ],
        );
        let params = infer(&group);
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].default_value.as_deref(), Some("30"));
    }

    #[test]
    fn one_sided_gaps_are_unaligned_regions() {
        let group = group_of(
            Language::Python,
            &[
                "def a(x):\n    y = x + 1\n    return y",
                "def b(x):\n    y = x + 1\n    audit(y)\n    return y",
            ],
        );
        let inference = infer_detailed(&group);
        assert!(inference.parameters.is_empty());
        assert_eq!(inference.unaligned_regions.len(), 1);
        assert_eq!(inference.unaligned_regions[0].instance, 1);
        assert_eq!(inference.unaligned_regions[0].line, 3);
        assert!(!inference.notes.is_empty());
    }

    #[test]
    fn member_names_are_not_parameters() {
        let group = group_of(
            Language::Python,
            &[
                "def a(user):\n    return user.email",
                "def b(user):\n    return user.phone",
            ],
        );
        let inference = infer_detailed(&group);
        assert!(inference.parameters.is_empty());
        assert!(inference.notes.iter().any(|n| n.contains("Member name")));
    }

    #[test]
    fn merge_slots_joins_overlaps_only() {
        assert_eq!(merge_slots(vec![3..4, 1..3, 2..5, 7..8]), vec![1..5, 7..8]);
    }
}
