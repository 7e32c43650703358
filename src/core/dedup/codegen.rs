//! Extracted-construct and call-site synthesis.
//!
//! Duplicates keep their own signatures; their bodies become a delegating
//! call to the extracted construct, so existing callers are unaffected.

use std::collections::BTreeMap;
use std::ops::Range;
use std::path::{Component, Path, PathBuf};

use similar::{DiffTag, TextDiff};

use super::grouper::DuplicationGroup;
use super::naming::generate_construct_name;
use super::parameters::ParameterCandidate;
use super::plan::{FileReplacement, GeneratedCode, LineChange, RefactoringPlan, Strategy};
use super::types::InferredType;
use crate::construct::{Construct, ConstructKind, Param, Signature};
use crate::error::{Error, Result};
use crate::language::{AnnotationStyle, BlockStyle, Language, NamedArgs};
use crate::utils::io;

const RECEIVERS: &[&str] = &["self", "cls", "this", "$this"];

/// Build a refactoring plan for a duplication group.
///
/// Reads the group's files to produce full replacement content for each.
pub fn generate(
    group: &DuplicationGroup,
    parameters: &[ParameterCandidate],
    language: Language,
) -> Result<RefactoringPlan> {
    if group.instances.len() < 2 {
        return Err(Error::validation_invalid_argument(
            "group",
            "A duplication group needs at least two instances",
            Some(group.id.to_string()),
            None,
        ));
    }

    let profile = language.profile();
    let kind = group.kind();
    let strategy = Strategy::for_kind(kind);
    let names: Vec<&str> = group
        .instances
        .iter()
        .filter_map(|c| c.name.as_deref())
        .collect();
    let function_name = generate_construct_name(&names, kind, language);
    let mut notes = Vec::new();

    let mut params: Vec<&ParameterCandidate> = parameters.iter().collect();
    if supports_defaults(language) {
        params.sort_by_key(|p| p.default_value.is_some());
    }
    let rep = group.representative();
    let rep_sig = rep.signature();
    // Keyword arguments cannot be placed ahead of a forwarded variadic or defaulted tail.
    let named = strategy != Strategy::ExtractClass
        && profile.named_args != NamedArgs::Unsupported
        && params.len() >= 2
        && (profile.named_args == NamedArgs::ObjectLiteral || rep_sig.tail_start.is_none());

    let files = group.files();
    let multi_file = files.len() > 1;

    let mut extracted = if strategy == Strategy::ExtractClass {
        for p in &params {
            notes.push(format!(
                "Class bodies differ at `{}` ({}); the extracted class keeps the representative's value",
                p.name,
                p.values.join(" / ")
            ));
        }
        rename_only(rep, &rep_sig, &function_name)
    } else {
        build_extracted(rep, &rep_sig, &params, &function_name, language, named, &mut notes)
    };

    let target = multi_file.then(|| {
        common_dir(&files).join(format!(
            "{}.{}",
            profile.shared_module_stem,
            profile.primary_extension()
        ))
    });

    let mut preamble = String::new();
    let mut postamble = String::new();
    if let Some(target) = &target {
        extracted = dedent(&extracted, &rep.indent);
        extracted = prepare_for_module(extracted, kind, language, &mut notes);
        let rep_source = io::read_file(&rep.file, "read representative source")?;
        match language {
            Language::Go => {
                let package = package_name(&rep_source, "package ")
                    .or_else(|| dir_name(target))
                    .unwrap_or_else(|| "main".to_string());
                preamble = format!("package {}\n\n", package);
            }
            Language::Java => {
                if let Some(package) = package_name(&rep_source, "package ") {
                    preamble = format!("package {};\n\n", package.trim_end_matches(';'));
                }
                preamble.push_str(&format!("public final class {} {{\n\n", profile.shared_module_stem));
                postamble = "}\n".to_string();
                extracted = indent_all(&extracted, "    ");
            }
            Language::Php => preamble = "<?php\n\n".to_string(),
            Language::Rust => notes.push(format!(
                "Declare `mod {};` in the parent module of {}",
                profile.shared_module_stem,
                target.parent().unwrap_or(Path::new("")).display()
            )),
            _ => {}
        }
    }

    let helper_ref = match (&target, language, strategy) {
        (Some(_), Language::Java, Strategy::ExtractClass) => {
            format!("{}.{}", profile.shared_module_stem, function_name)
        }
        _ => function_name.clone(),
    };

    let mut replacements = BTreeMap::new();
    let mut imports = BTreeMap::new();
    let mut visibility_noted = false;

    for file in &files {
        let original = io::read_file(file, "read duplicate source")?;
        let mut edits: Vec<(Range<usize>, String)> = Vec::new();
        let mut first_start: Option<(usize, &Construct)> = None;

        for (k, instance) in group.instances.iter().enumerate() {
            if &instance.file != file {
                continue;
            }
            let Some(start) = locate(&original, instance) else {
                notes.push(format!(
                    "Could not locate `{}` in {}; left unchanged",
                    instance.name.as_deref().unwrap_or("construct"),
                    file.display()
                ));
                continue;
            };
            let sig = instance.signature();
            let new_text = if strategy == Strategy::ExtractClass {
                alias_class(instance, &sig, &helper_ref, language, &mut notes)
            } else {
                let call = call_expression(
                    k,
                    &sig,
                    &params,
                    &function_name,
                    kind,
                    language,
                    named,
                    multi_file,
                    &mut notes,
                );
                delegate(instance, &sig, &call, language)
            };
            edits.push((start..start + instance.text.len(), new_text));
            if first_start.map(|(s, _)| start < s).unwrap_or(true) {
                first_start = Some((start, instance));
            }
        }

        if !multi_file {
            if let Some((start, instance)) = first_start {
                let line_start = insertion_line(&original, start);
                let lead = &original[line_start..start];
                let indent = if lead.trim().is_empty() && !lead.contains('\n') {
                    lead.to_string()
                } else {
                    instance.indent.clone()
                };
                edits.push((line_start..line_start, format!("{}{}\n\n", indent, extracted)));
            }
        } else if let Some(target) = &target {
            if let Some(statement) = import_statement(file, target, &function_name, language) {
                imports.insert(file.clone(), vec![statement]);
            }
            if matches!(language, Language::Go | Language::Java)
                && file.parent() != target.parent()
                && !visibility_noted
            {
                notes.push(format!(
                    "{} relies on same-package visibility; {} is outside {}",
                    language,
                    file.display(),
                    target.parent().unwrap_or(Path::new("")).display()
                ));
                visibility_noted = true;
            }
        }

        let new_content = apply_edits(&original, edits);
        if new_content == original {
            continue;
        }
        replacements.insert(
            file.clone(),
            FileReplacement {
                changes: line_changes(&original, &new_content),
                new_content,
                base_sha256: Some(io::sha256_hex(original.as_bytes())),
            },
        );
    }

    Ok(RefactoringPlan {
        strategy,
        language,
        files_affected: files,
        generated_code: GeneratedCode {
            extracted_function: extracted,
            extract_to_file: target,
            function_name,
            replacements,
            imports,
            preamble,
            postamble,
        },
        group_id: Some(group.id),
        notes,
    })
}

fn supports_defaults(language: Language) -> bool {
    matches!(
        language,
        Language::Python | Language::JavaScript | Language::TypeScript | Language::Php | Language::Ruby
    )
}

/// Apply non-overlapping edits back to front. Zero-width edits at the same
/// offset as a replacement land before it.
pub(crate) fn apply_edits(text: &str, mut edits: Vec<(Range<usize>, String)>) -> String {
    edits.sort_by(|a, b| b.0.start.cmp(&a.0.start).then(b.0.end.cmp(&a.0.end)));
    let mut out = text.to_string();
    for (range, replacement) in edits {
        out.replace_range(range, &replacement);
    }
    out
}

fn rename_only(construct: &Construct, sig: &Signature, name: &str) -> String {
    match &sig.name_range {
        Some(range) => apply_edits(&construct.text, vec![(range.clone(), name.to_string())]),
        None => construct.text.clone(),
    }
}

fn build_extracted(
    rep: &Construct,
    sig: &Signature,
    params: &[&ParameterCandidate],
    name: &str,
    language: Language,
    named: bool,
    notes: &mut Vec<String>,
) -> String {
    let profile = language.profile();
    let mut edits: Vec<(Range<usize>, String)> = Vec::new();

    for p in params {
        for occurrence in &p.occurrences {
            edits.push((occurrence.clone(), format!("{}{}", profile.variable_sigil, p.name)));
        }
    }
    if let Some(range) = &sig.name_range {
        edits.push((range.clone(), name.to_string()));
    }

    if !params.is_empty() {
        let declarations = render_declarations(params, language, named, notes);
        match (&sig.params_range, sig.tail_start) {
            // Required parameters go ahead of defaulted, variadic and keyword ones.
            (_, Some(at)) => edits.push((at..at, format!("{}, ", declarations))),
            (Some(range), None) => {
                let existing = rep.text[range.clone()].trim_end();
                let at = range.start + existing.len();
                let insert = if existing.trim().is_empty() {
                    declarations
                } else if existing.ends_with(',') {
                    format!(" {}", declarations)
                } else {
                    format!(", {}", declarations)
                };
                edits.push((at..at, insert));
            }
            // Ruby definitions without parentheses.
            (None, None) => {
                let at = sig.name_range.as_ref().map(|r| r.end).unwrap_or(0);
                if sig.params.is_empty() {
                    edits.push((at..at, format!("({})", declarations)));
                } else {
                    let end = rep.text[at..]
                        .find('\n')
                        .map(|off| at + off)
                        .unwrap_or(rep.text.len());
                    edits.push((end..end, format!(", {}", declarations)));
                }
            }
        }
    }

    apply_edits(&rep.text, edits)
}

fn render_declarations(
    params: &[&ParameterCandidate],
    language: Language,
    named: bool,
    notes: &mut Vec<String>,
) -> String {
    let profile = language.profile();
    if named && profile.named_args == NamedArgs::ObjectLiteral {
        let fields: Vec<String> = params
            .iter()
            .map(|p| match &p.default_value {
                Some(default) => format!("{} = {}", p.name, default),
                None => p.name.clone(),
            })
            .collect();
        let pattern = format!("{{ {} }}", fields.join(", "));
        if language != Language::TypeScript {
            return pattern;
        }
        let types: Vec<String> = params
            .iter()
            .map(|p| {
                format!(
                    "{}{}: {}",
                    p.name,
                    if p.default_value.is_some() { "?" } else { "" },
                    type_name(&p.inferred_type, language).unwrap_or_else(|| "any".to_string())
                )
            })
            .collect();
        return format!("{}: {{ {} }}", pattern, types.join("; "));
    }
    if named && language == Language::Ruby {
        return params
            .iter()
            .map(|p| match &p.default_value {
                Some(default) => format!("{}: {}", p.name, default),
                None => format!("{}:", p.name),
            })
            .collect::<Vec<_>>()
            .join(", ");
    }
    params
        .iter()
        .map(|p| declaration(p, language, notes))
        .collect::<Vec<_>>()
        .join(", ")
}

fn declaration(p: &ParameterCandidate, language: Language, notes: &mut Vec<String>) -> String {
    let profile = language.profile();
    let ty = type_name(&p.inferred_type, language);
    let name = format!("{}{}", profile.variable_sigil, p.name);
    let decl = match (profile.annotation, &ty) {
        (AnnotationStyle::ColonSuffix, Some(t)) => format!("{}: {}", name, t),
        (AnnotationStyle::SpaceSuffix, Some(t)) => format!("{} {}", name, t),
        (AnnotationStyle::Prefix, Some(t)) => format!("{} {}", t, name),
        (AnnotationStyle::ColonSuffix, None) if language == Language::Rust => {
            notes.push(format!(
                "Parameter `{}` ({}) needs a concrete Rust type",
                p.name, p.inferred_type
            ));
            format!("{}: _", name)
        }
        _ => name,
    };
    match &p.default_value {
        Some(default) if supports_defaults(language) => {
            if language == Language::Python && ty.is_none() {
                format!("{}={}", decl, default)
            } else {
                format!("{} = {}", decl, default)
            }
        }
        _ => decl,
    }
}

/// Source-level type for an inferred type, when the language annotates.
pub fn type_name(ty: &InferredType, language: Language) -> Option<String> {
    use InferredType as T;
    if let T::Union(members) = ty {
        let mut parts: Vec<String> = Vec::new();
        for m in members {
            let name = type_name(m, language)?;
            if !parts.contains(&name) {
                parts.push(name);
            }
        }
        return match language {
            Language::Python | Language::TypeScript => Some(parts.join(" | ")),
            Language::Go => Some("interface{}".to_string()),
            Language::Java => Some("Object".to_string()),
            Language::Php => Some("mixed".to_string()),
            _ => None,
        };
    }
    let name = match language {
        Language::Python => match ty {
            T::String => "str",
            T::Int => "int",
            T::Float => "float",
            T::Bool => "bool",
            T::List => "list",
            T::Dict => "dict",
            T::Set => "set",
            T::Tuple => "tuple",
            _ => return None,
        },
        Language::TypeScript => match ty {
            T::String => "string",
            T::Int | T::Float => "number",
            T::Bool => "boolean",
            T::List | T::Tuple => "unknown[]",
            T::Dict => "Record<string, unknown>",
            T::Set => "Set<unknown>",
            T::Callable => "(...args: unknown[]) => unknown",
            T::None => "null",
            _ => "any",
        },
        Language::Rust => match ty {
            T::String => "&str",
            T::Int => "i64",
            T::Float => "f64",
            T::Bool => "bool",
            _ => return None,
        },
        Language::Go => match ty {
            T::String => "string",
            T::Int => "int",
            T::Float => "float64",
            T::Bool => "bool",
            T::List | T::Tuple => "[]interface{}",
            T::Dict => "map[string]interface{}",
            T::Set => "map[interface{}]bool",
            T::Callable => "func()",
            _ => "interface{}",
        },
        Language::Java => match ty {
            T::String => "String",
            T::Int => "int",
            T::Float => "double",
            T::Bool => "boolean",
            T::List | T::Tuple => "java.util.List<Object>",
            T::Dict => "java.util.Map<String, Object>",
            T::Set => "java.util.Set<Object>",
            T::Callable => "Runnable",
            _ => "Object",
        },
        Language::Php => match ty {
            T::String => "string",
            T::Int => "int",
            T::Float => "float",
            T::Bool => "bool",
            T::List | T::Dict | T::Set | T::Tuple => "array",
            T::Callable => "callable",
            _ => "mixed",
        },
        Language::JavaScript | Language::Ruby => return None,
    };
    Some(name.to_string())
}

#[allow(clippy::too_many_arguments)]
fn call_expression(
    instance_index: usize,
    sig: &Signature,
    params: &[&ParameterCandidate],
    function_name: &str,
    kind: ConstructKind,
    language: Language,
    named: bool,
    multi_file: bool,
    notes: &mut Vec<String>,
) -> String {
    let profile = language.profile();
    let mut callee = function_name.to_string();
    let mut args: Vec<String> = Vec::new();

    if kind == ConstructKind::Method {
        let receiver = sig
            .receiver
            .clone()
            .or_else(|| profile.receiver.map(str::to_string));
        match (language, multi_file) {
            (Language::Go, _) => {
                if let Some(recv) = &sig.receiver {
                    callee = format!("{}.{}", recv, function_name);
                }
            }
            (Language::Ruby, _) => {}
            (Language::Python, true) => args.push(receiver.unwrap_or_else(|| "self".into())),
            (Language::JavaScript | Language::TypeScript, true) => {
                callee = format!("{}.call", function_name);
                args.push("this".to_string());
            }
            (Language::Java, true) => {
                callee = format!("{}.{}", profile.shared_module_stem, function_name);
            }
            (Language::Php | Language::Rust, true) => {
                if instance_index == 0 {
                    notes.push(format!(
                        "`{}` uses its receiver; a free function in the shared module cannot, review before applying",
                        function_name
                    ));
                }
            }
            (_, false) => {
                if let Some(recv) = receiver {
                    callee = format!("{}{}{}", recv, profile.member_access, function_name);
                }
            }
        }
    } else if language == Language::Java && multi_file {
        callee = format!("{}.{}", profile.shared_module_stem, function_name);
    }

    let own: Vec<&Param> = sig
        .params
        .iter()
        .filter(|p| !RECEIVERS.contains(&p.name.as_str()))
        .collect();
    let split = own.iter().position(|p| p.is_tail()).unwrap_or(own.len());
    args.extend(own[..split].iter().map(|p| p.forward(language)));

    if named {
        let bound: Vec<(&str, &str)> = params
            .iter()
            .map(|p| (p.name.as_str(), p.values[instance_index].as_str()))
            .filter(|(name, value)| {
                params
                    .iter()
                    .find(|p| p.name == *name)
                    .and_then(|p| p.default_value.as_deref())
                    != Some(*value)
            })
            .collect();
        match profile.named_args {
            NamedArgs::Equals => args.extend(bound.iter().map(|(n, v)| format!("{}={}", n, v))),
            NamedArgs::Colon => args.extend(bound.iter().map(|(n, v)| format!("{}: {}", n, v))),
            NamedArgs::ObjectLiteral => {
                let fields: Vec<String> = bound.iter().map(|(n, v)| format!("{}: {}", n, v)).collect();
                args.push(if fields.is_empty() {
                    "{}".to_string()
                } else {
                    format!("{{ {} }}", fields.join(", "))
                });
            }
            NamedArgs::Unsupported => {}
        }
    } else {
        args.extend(params.iter().map(|p| p.values[instance_index].clone()));
    }
    args.extend(own[split..].iter().map(|p| p.forward(language)));

    if args.is_empty() && profile.omit_empty_parens {
        callee
    } else {
        format!("{}({})", callee, args.join(", "))
    }
}

/// Replace the instance's body with a single delegating statement.
fn delegate(instance: &Construct, sig: &Signature, call: &str, language: Language) -> String {
    let profile = language.profile();
    let text = &instance.text;
    let body = sig.body_range.clone();
    let header = &text[..body.start];

    let returns = sig.returns_value || (language == Language::Rust && header.contains("->"));
    let statement = match language {
        Language::Rust if returns => call.to_string(),
        Language::Rust => format!("{};", call),
        Language::Ruby => call.to_string(),
        _ if returns => format!("return {}{}", call, profile.statement_end),
        _ => format!("{}{}", call, profile.statement_end),
    };

    let unit = if language == Language::Go { "\t" } else { "    " };
    let inner = body_indent(&text[body.clone()])
        .unwrap_or_else(|| format!("{}{}", instance.indent, unit));
    let indent = &instance.indent;

    let expression_body = matches!(language, Language::JavaScript | Language::TypeScript)
        && header.trim_end().ends_with("=>");
    let new_body = if expression_body {
        let semicolon = if text[body.clone()].trim_end().ends_with(';') { ";" } else { "" };
        format!(" {}{}", call, semicolon)
    } else {
        match profile.block_style {
            BlockStyle::Indent => format!("\n{}{}", inner, statement),
            BlockStyle::Braces | BlockStyle::EndKeyword => {
                format!("\n{}{}\n{}", inner, statement, indent)
            }
        }
    };

    format!("{}{}{}", header, new_body, &text[body.end..])
}

/// Leading whitespace of the body's first non-blank line after the opener.
fn body_indent(body: &str) -> Option<String> {
    body.lines()
        .skip(1)
        .find(|l| !l.trim().is_empty())
        .map(|l| l[..l.len() - l.trim_start().len()].to_string())
}

fn alias_class(
    instance: &Construct,
    sig: &Signature,
    helper: &str,
    language: Language,
    notes: &mut Vec<String>,
) -> String {
    let Some(range) = &sig.name_range else {
        return instance.text.clone();
    };
    let head = &instance.text[..range.start];
    let name = &instance.text[range.clone()];
    let indent = &instance.indent;
    match language {
        Language::Python => format!("{}{}({}):\n{}    pass", head, name, helper, indent),
        Language::Ruby => format!("{}{} < {}\n{}end", head, name, helper, indent),
        Language::Go => format!("{}{} = {}", head, name, helper),
        Language::Rust if head.contains("struct ") || head.contains("enum ") => {
            let head = head.replacen("struct ", "type ", 1).replacen("enum ", "type ", 1);
            format!("{}{} = {};", head, name, helper)
        }
        Language::Rust => {
            notes.push(format!("`{}` is a trait or impl block and was left unchanged", name));
            instance.text.clone()
        }
        _ => format!("{}{} extends {} {{}}", head, name, helper),
    }
}

/// Byte offset of the instance in `content`, by position first, then by the
/// nearest exact match.
fn locate(content: &str, instance: &Construct) -> Option<usize> {
    let line_start: usize = content
        .split_inclusive('\n')
        .take(instance.start_line.saturating_sub(1))
        .map(str::len)
        .sum();
    let column = content[line_start..]
        .char_indices()
        .nth(instance.start_column)
        .map(|(b, _)| b)
        .unwrap_or(0);
    let candidate = line_start + column;
    if content[candidate..].starts_with(instance.text.as_str()) {
        return Some(candidate);
    }
    content
        .match_indices(instance.text.as_str())
        .map(|(i, _)| i)
        .min_by_key(|i| i.abs_diff(candidate))
}

/// Start of the line to insert above, moving up past decorators, attributes
/// and doc comments attached to the construct.
fn insertion_line(content: &str, start: usize) -> usize {
    let mut line_start = content[..start].rfind('\n').map(|i| i + 1).unwrap_or(0);
    while line_start > 0 {
        let prev_start = content[..line_start - 1]
            .rfind('\n')
            .map(|i| i + 1)
            .unwrap_or(0);
        let prev = content[prev_start..line_start].trim_start();
        if prev.starts_with('@') || prev.starts_with("#[") || prev.starts_with("///") {
            line_start = prev_start;
        } else {
            break;
        }
    }
    line_start
}

fn dedent(text: &str, indent: &str) -> String {
    if indent.is_empty() {
        return text.to_string();
    }
    text.split('\n')
        .map(|line| line.strip_prefix(indent).unwrap_or(line))
        .collect::<Vec<_>>()
        .join("\n")
}

fn indent_all(text: &str, indent: &str) -> String {
    text.split('\n')
        .map(|line| {
            if line.trim().is_empty() {
                line.to_string()
            } else {
                format!("{}{}", indent, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

const VISIBILITY: &[&str] = &["public ", "private ", "protected ", "static "];

fn strip_visibility(mut text: &str) -> &str {
    while let Some(rest) = VISIBILITY.iter().find_map(|v| text.strip_prefix(v)) {
        text = rest;
    }
    text
}

/// Make an extracted construct valid and visible at module level.
fn prepare_for_module(
    text: String,
    kind: ConstructKind,
    language: Language,
    notes: &mut Vec<String>,
) -> String {
    match language {
        Language::JavaScript | Language::TypeScript => {
            if text.starts_with("export ") {
                return text;
            }
            let body = strip_visibility(&text);
            let is_definition = body.starts_with("function")
                || body.starts_with("async function")
                || body.starts_with("class")
                || body.starts_with("const ")
                || body.starts_with("let ");
            if kind == ConstructKind::Method && !is_definition {
                match body.strip_prefix("async ") {
                    Some(rest) => format!("export async function {}", rest),
                    None => format!("export function {}", body),
                }
            } else {
                format!("export {}", body)
            }
        }
        Language::Rust if text.starts_with("pub") => text,
        Language::Rust => {
            if kind == ConstructKind::Method {
                notes.push("Rust methods moved to a shared module need their receiver turned into a parameter".to_string());
            }
            format!("pub(crate) {}", text)
        }
        Language::Java => format!("public static {}", strip_visibility(&text)),
        Language::Php if kind != ConstructKind::Class => strip_visibility(&text).to_string(),
        _ => text,
    }
}

fn common_dir(files: &[PathBuf]) -> PathBuf {
    let mut dirs = files.iter().filter_map(|f| f.parent());
    let Some(first) = dirs.next() else {
        return PathBuf::new();
    };
    let mut common: Vec<Component<'_>> = first.components().collect();
    for dir in dirs {
        let shared = common
            .iter()
            .zip(dir.components())
            .take_while(|(a, b)| *a == b)
            .count();
        common.truncate(shared);
    }
    common.iter().collect()
}

/// Relative path from directory `from` to `to`, using `/` separators.
fn relative_path(from: &Path, to: &Path) -> String {
    let from: Vec<Component<'_>> = from.components().collect();
    let to: Vec<Component<'_>> = to.components().collect();
    let shared = from.iter().zip(&to).take_while(|(a, b)| a == b).count();
    let mut parts: Vec<String> = vec!["..".to_string(); from.len() - shared];
    parts.extend(
        to[shared..]
            .iter()
            .map(|c| c.as_os_str().to_string_lossy().to_string()),
    );
    parts.join("/")
}

fn without_extension(path: &Path) -> PathBuf {
    path.with_extension("")
}

fn import_statement(file: &Path, target: &Path, name: &str, language: Language) -> Option<String> {
    let file_dir = file.parent()?;
    let target_dir = target.parent()?;
    let stem = target.file_stem()?.to_string_lossy().to_string();
    let rel = relative_path(file_dir, &without_extension(target));

    match language {
        Language::Python => {
            let depth = file_dir
                .strip_prefix(target_dir)
                .map(|p| p.components().count())
                .unwrap_or(0);
            if depth == 0 {
                Some(format!("from {} import {}", stem, name))
            } else {
                Some(format!("from {}{} import {}", ".".repeat(depth + 1), stem, name))
            }
        }
        Language::JavaScript | Language::TypeScript => {
            let spec = if rel.starts_with("..") { rel } else { format!("./{}", rel) };
            Some(format!("import {{ {} }} from '{}';", name, spec))
        }
        Language::Ruby => Some(format!("require_relative '{}'", rel)),
        Language::Php => Some(format!("require_once __DIR__ . '/{}.php';", rel)),
        Language::Rust => {
            let components: Vec<String> = target_dir
                .components()
                .map(|c| c.as_os_str().to_string_lossy().to_string())
                .collect();
            let modules: Vec<String> = match components.iter().rposition(|c| c == "src") {
                Some(src) => components[src + 1..].to_vec(),
                None => Vec::new(),
            };
            let mut path = vec!["crate".to_string()];
            path.extend(modules);
            path.push(stem);
            path.push(name.to_string());
            Some(format!("use {};", path.join("::")))
        }
        Language::Go | Language::Java => None,
    }
}

fn package_name(source: &str, keyword: &str) -> Option<String> {
    source
        .lines()
        .map(str::trim)
        .find_map(|l| l.strip_prefix(keyword))
        .map(|rest| rest.trim().trim_end_matches(';').to_string())
        .filter(|p| !p.is_empty())
}

fn dir_name(path: &Path) -> Option<String> {
    path.parent()?
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
}

/// Changed lines between two versions of a file. Line numbers refer to the
/// new content, or to the old content for pure deletions.
pub(crate) fn line_changes(old: &str, new: &str) -> Vec<LineChange> {
    let diff = TextDiff::from_lines(old, new);
    let old_lines = diff.old_slices();
    let new_lines = diff.new_slices();
    let mut changes = Vec::new();

    for op in diff.ops() {
        let (tag, old_range, new_range) = op.as_tag_tuple();
        if tag == DiffTag::Equal {
            continue;
        }
        for i in 0..old_range.len().max(new_range.len()) {
            let old_line = (i < old_range.len()).then(|| old_lines[old_range.start + i]);
            let new_line = (i < new_range.len()).then(|| new_lines[new_range.start + i]);
            let line = if new_line.is_some() {
                new_range.start + i + 1
            } else {
                old_range.start + i + 1
            };
            changes.push(LineChange {
                line,
                old: old_line.unwrap_or("").trim_end_matches('\n').to_string(),
                new: new_line.unwrap_or("").trim_end_matches('\n').to_string(),
            });
        }
    }
    changes
}
