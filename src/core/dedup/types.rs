//! Best-effort type inference for parameter values.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::naming;
use crate::lexer::{self, TokenKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InferredType {
    String,
    Int,
    Float,
    Bool,
    List,
    Dict,
    Set,
    Tuple,
    Callable,
    None,
    Any,
    Union(Vec<InferredType>),
}

impl InferredType {
    /// Combine two observations. `Any` absorbs everything.
    pub fn union(self, other: InferredType) -> InferredType {
        if self == other {
            return self;
        }
        if self == InferredType::Any || other == InferredType::Any {
            return InferredType::Any;
        }
        let mut members = Vec::new();
        for t in [self, other] {
            match t {
                InferredType::Union(inner) => members.extend(inner),
                single => members.push(single),
            }
        }
        let mut unique: Vec<InferredType> = Vec::new();
        for m in members {
            if !unique.contains(&m) {
                unique.push(m);
            }
        }
        if unique.len() == 1 {
            unique.remove(0)
        } else {
            InferredType::Union(unique)
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            InferredType::String | InferredType::Int | InferredType::Float | InferredType::Bool
        )
    }

    /// Weight used by complexity scoring: scalars are free.
    pub fn complexity(&self) -> f64 {
        match self {
            InferredType::String
            | InferredType::Int
            | InferredType::Float
            | InferredType::Bool
            | InferredType::None => 0.0,
            InferredType::Union(members) => members.len() as f64,
            _ => 1.0,
        }
    }

    /// Parameter name used when nothing better is known.
    pub fn default_name(&self) -> &'static str {
        match self {
            InferredType::String => "text",
            InferredType::Int => "count",
            InferredType::Float => "amount",
            InferredType::Bool => "flag",
            InferredType::List => "items",
            InferredType::Dict => "mapping",
            InferredType::Set => "members",
            InferredType::Tuple => "values",
            InferredType::Callable => "callback",
            _ => "value",
        }
    }
}

impl fmt::Display for InferredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InferredType::String => "string",
            InferredType::Int => "int",
            InferredType::Float => "float",
            InferredType::Bool => "bool",
            InferredType::List => "list",
            InferredType::Dict => "dict",
            InferredType::Set => "set",
            InferredType::Tuple => "tuple",
            InferredType::Callable => "callable",
            InferredType::None => "none",
            InferredType::Any => "any",
            InferredType::Union(members) => {
                let parts: Vec<String> = members.iter().map(|m| m.to_string()).collect();
                return write!(f, "{}", parts.join(" | "));
            }
        };
        f.write_str(name)
    }
}

/// Infer the type of a source-level value.
pub fn infer_value_type(value: &str) -> InferredType {
    let v = value.trim();
    if v.is_empty() {
        return InferredType::Any;
    }

    match v {
        "true" | "false" | "True" | "False" => return InferredType::Bool,
        "null" | "None" | "nil" | "undefined" => return InferredType::None,
        _ => {}
    }

    let tokens = lexer::tokenize(v, None);
    if tokens.len() == 1 {
        match tokens[0].kind {
            TokenKind::Str => return InferredType::String,
            TokenKind::Num => {
                return if is_float(v) {
                    InferredType::Float
                } else {
                    InferredType::Int
                }
            }
            TokenKind::Ident => return infer_name_type(v),
            _ => {}
        }
    }
    // `-5`, `-1.5`
    if tokens.len() == 2 && tokens[0].is("-") && tokens[1].kind == TokenKind::Num {
        return if is_float(tokens[1].text) {
            InferredType::Float
        } else {
            InferredType::Int
        };
    }
    // String prefixes such as f"..." or b'...'
    if tokens.len() == 2
        && tokens[1].kind == TokenKind::Str
        && matches!(tokens[0].text, "f" | "r" | "b" | "u" | "rb" | "br" | "fr")
    {
        return InferredType::String;
    }

    if is_callable_shape(v) {
        return InferredType::Callable;
    }

    let closes_at_end = |open: usize| {
        lexer::matching_close(&tokens, open).map(|c| c == tokens.len() - 1) == Some(true)
    };
    if tokens.first().map(|t| t.is("[")) == Some(true) && closes_at_end(0) {
        return InferredType::List;
    }
    if tokens.first().map(|t| t.is("{")) == Some(true) && closes_at_end(0) {
        let top_level_colon = has_top_level(&tokens, &[":", "=>"]);
        let empty = tokens.len() == 2;
        return if top_level_colon || empty {
            InferredType::Dict
        } else {
            InferredType::Set
        };
    }
    if tokens.first().map(|t| t.is("(")) == Some(true) && closes_at_end(0) {
        return if has_top_level(&tokens, &[","]) {
            InferredType::Tuple
        } else {
            InferredType::Any
        };
    }
    // Constructor-style collections.
    if let (Some(head), Some(next)) = (tokens.first(), tokens.get(1)) {
        let callee = head.text;
        if next.is("(") || next.is("!") {
            match callee {
                "list" | "array" | "vec" | "Array" | "List" => return InferredType::List,
                "dict" | "Map" | "HashMap" | "map" => return InferredType::Dict,
                "set" | "Set" | "HashSet" | "frozenset" => return InferredType::Set,
                "tuple" => return InferredType::Tuple,
                _ => {}
            }
        }
    }

    InferredType::Any
}

fn is_float(number: &str) -> bool {
    !number.starts_with("0x")
        && !number.starts_with("0X")
        && (number.contains('.') || number.contains('e') || number.contains('E'))
}

fn is_callable_shape(v: &str) -> bool {
    v.starts_with("lambda")
        || v.starts_with("function")
        || v.starts_with("fn ")
        || v.starts_with("fn(")
        || v.starts_with("func(")
        || v.starts_with("->")
        || v.starts_with("proc ")
        || v.starts_with('|')
        || v.starts_with("move |")
        || v.contains("=>") && !v.starts_with('[') && !v.starts_with('{')
}

fn has_top_level(tokens: &[lexer::Token<'_>], needles: &[&str]) -> bool {
    let mut depth = 0i32;
    for tok in tokens {
        match tok.text {
            "(" | "[" | "{" => depth += 1,
            ")" | "]" | "}" => depth -= 1,
            t if depth == 1 && needles.contains(&t) => return true,
            _ => {}
        }
    }
    false
}

/// Infer a type from an identifier's name alone.
pub fn infer_name_type(name: &str) -> InferredType {
    let words = naming::words(name);
    let snake = words.join("_");
    let first = words.first().map(String::as_str).unwrap_or("");
    let last = words.last().map(String::as_str).unwrap_or("");

    if matches!(first, "is" | "has" | "should" | "can") && words.len() > 1 {
        return InferredType::Bool;
    }
    if matches!(last, "callback" | "handler" | "fn" | "func") {
        return InferredType::Callable;
    }
    if words.len() > 1 && matches!(last, "dict" | "map") {
        return InferredType::Dict;
    }
    if words.len() > 1 && matches!(last, "list" | "items" | "array") {
        return InferredType::List;
    }
    if snake == "count"
        || last == "count"
        || first == "num"
        || snake == "index"
        || last == "id"
        || snake == "size"
    {
        return InferredType::Int;
    }
    if matches!(last, "name" | "text" | "message" | "label" | "path" | "url") {
        return InferredType::String;
    }
    if is_plural(last) {
        return InferredType::List;
    }
    InferredType::Any
}

fn is_plural(word: &str) -> bool {
    word.len() > 3
        && word.ends_with('s')
        && !word.ends_with("ss")
        && !word.ends_with("us")
        && !word.ends_with("is")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_values() {
        assert_eq!(infer_value_type("\"hello\""), InferredType::String);
        assert_eq!(infer_value_type("'x'"), InferredType::String);
        assert_eq!(infer_value_type("f\"{a}\""), InferredType::String);
        assert_eq!(infer_value_type("42"), InferredType::Int);
        assert_eq!(infer_value_type("-7"), InferredType::Int);
        assert_eq!(infer_value_type("3.14"), InferredType::Float);
        assert_eq!(infer_value_type("True"), InferredType::Bool);
        assert_eq!(infer_value_type("nil"), InferredType::None);
    }

    #[test]
    fn collection_and_callable_shapes() {
        assert_eq!(infer_value_type("[1, 2]"), InferredType::List);
        assert_eq!(infer_value_type("{\"a\": 1}"), InferredType::Dict);
        assert_eq!(infer_value_type("{}"), InferredType::Dict);
        assert_eq!(infer_value_type("{1, 2}"), InferredType::Set);
        assert_eq!(infer_value_type("(1, 2)"), InferredType::Tuple);
        assert_eq!(infer_value_type("lambda x: x + 1"), InferredType::Callable);
        assert_eq!(infer_value_type("(x) => x * 2"), InferredType::Callable);
        assert_eq!(infer_value_type("vec![1, 2]"), InferredType::List);
    }

    #[test]
    fn identifier_name_heuristics() {
        assert_eq!(infer_value_type("is_active"), InferredType::Bool);
        assert_eq!(infer_value_type("hasAccess"), InferredType::Bool);
        assert_eq!(infer_value_type("user_list"), InferredType::List);
        assert_eq!(infer_value_type("users"), InferredType::List);
        assert_eq!(infer_value_type("config_map"), InferredType::Dict);
        assert_eq!(infer_value_type("on_done_callback"), InferredType::Callable);
        assert_eq!(infer_value_type("retry_count"), InferredType::Int);
        assert_eq!(infer_value_type("user_id"), InferredType::Int);
        assert_eq!(infer_value_type("file_path"), InferredType::String);
        assert_eq!(infer_value_type("status"), InferredType::Any);
        assert_eq!(infer_value_type("compute(a)"), InferredType::Any);
    }

    #[test]
    fn unions_flatten_and_any_absorbs() {
        let u = InferredType::Int.union(InferredType::String);
        assert_eq!(u, InferredType::Union(vec![InferredType::Int, InferredType::String]));
        let u2 = u.clone().union(InferredType::Int);
        assert_eq!(u2, u);
        assert_eq!(u.union(InferredType::Any), InferredType::Any);
        assert_eq!(InferredType::Bool.union(InferredType::Bool), InferredType::Bool);
        assert_eq!(
            InferredType::Union(vec![InferredType::Int, InferredType::Float]).to_string(),
            "int | float"
        );
    }
}
