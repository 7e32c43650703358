//! Identifier synthesis for extracted constructs and their parameters.

use heck::{ToLowerCamelCase, ToSnakeCase, ToUpperCamelCase};

use crate::construct::ConstructKind;
use crate::language::{IdentCase, Language};

const RESERVED: &[&str] = &["self", "this", "cls", "super", "arguments", "it"];

/// Turn `base` into a valid, unique parameter name for `language`.
///
/// Applies the language's case convention, drops invalid characters, guards
/// against leading digits and keywords, and appends `2, 3, ...` until the name
/// is absent from `existing` (sigils are ignored when comparing).
pub fn generate_parameter_name(base: &str, existing: &[String], language: Language) -> String {
    let profile = language.profile();
    let cleaned: String = base
        .trim_start_matches('$')
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();

    let mut name = apply_case(&cleaned, profile.ident_case);
    if name.is_empty() || name.chars().all(|c| c == '_') {
        name = "param".to_string();
    }
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        name = format!("_{}", name);
    }
    if profile.is_keyword(&name) || RESERVED.contains(&name.as_str()) {
        name = match profile.ident_case {
            IdentCase::Snake => format!("{}_value", name),
            IdentCase::LowerCamel => format!("{}Value", name),
        };
    }

    let taken = |candidate: &str| {
        existing
            .iter()
            .any(|e| e.trim_start_matches('$') == candidate)
    };
    if !taken(&name) {
        return name;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{}{}", name, n);
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

fn apply_case(value: &str, case: IdentCase) -> String {
    match case {
        IdentCase::Snake => value.to_snake_case(),
        IdentCase::LowerCamel => value.to_lower_camel_case(),
    }
}

/// Words of an identifier, lowercased (`sendEmail` and `send_email` agree).
pub fn words(identifier: &str) -> Vec<String> {
    identifier
        .trim_start_matches('$')
        .to_snake_case()
        .split('_')
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Shared leading words, else shared trailing words.
pub fn common_affix(names: &[&str]) -> Vec<String> {
    let split: Vec<Vec<String>> = names.iter().map(|n| words(n)).collect();
    let Some(first) = split.first() else {
        return Vec::new();
    };

    let prefix_len = (0..first.len())
        .take_while(|&i| split.iter().all(|w| w.get(i) == Some(&first[i])))
        .count();
    if prefix_len > 0 {
        return first[..prefix_len].to_vec();
    }

    let suffix_len = (1..=first.len())
        .take_while(|&k| {
            split
                .iter()
                .all(|w| w.len() >= k && w[w.len() - k] == first[first.len() - k])
        })
        .count();
    first[first.len() - suffix_len..].to_vec()
}

/// Name for the extracted construct, derived from the duplicates' own names.
///
/// Never equals one of the originals, since the duplicates keep their names
/// and delegate to the extracted construct.
pub fn generate_construct_name(
    names: &[&str],
    kind: ConstructKind,
    language: Language,
) -> String {
    let mut words = common_affix(names);
    if words.is_empty() {
        // Common words in the first name's order.
        let split: Vec<Vec<String>> = names.iter().map(|n| self::words(n)).collect();
        if let Some(first) = split.first() {
            words = first
                .iter()
                .filter(|w| split.iter().all(|other| other.contains(w)))
                .cloned()
                .collect();
        }
    }
    if words.is_empty() {
        words = vec!["extracted".to_string(), kind_word(kind).to_string()];
    }

    let joined = words.join("_");
    let mut name = render_construct_name(&joined, kind, language);
    let clashes = |candidate: &str| {
        names.iter().any(|n| n.trim_start_matches('$') == candidate)
            || language.profile().is_keyword(candidate)
    };
    if clashes(&name) {
        name = render_construct_name(&format!("{}_{}", joined, suffix_word(kind)), kind, language);
    }
    name
}

fn render_construct_name(joined: &str, kind: ConstructKind, language: Language) -> String {
    if kind == ConstructKind::Class {
        return joined.to_upper_camel_case();
    }
    match language.profile().ident_case {
        IdentCase::Snake => joined.to_snake_case(),
        IdentCase::LowerCamel => joined.to_lower_camel_case(),
    }
}

fn kind_word(kind: ConstructKind) -> &'static str {
    match kind {
        ConstructKind::Method => "method",
        ConstructKind::Class => "class",
        _ => "function",
    }
}

fn suffix_word(kind: ConstructKind) -> &'static str {
    match kind {
        ConstructKind::Class => "base",
        _ => "shared",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_identifier(name: &str) -> bool {
        let mut chars = name.chars();
        matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
            && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    }

    #[test]
    fn applies_language_case() {
        assert_eq!(generate_parameter_name("user name", &[], Language::Python), "user_name");
        assert_eq!(generate_parameter_name("user_name", &[], Language::TypeScript), "userName");
        assert_eq!(generate_parameter_name("$title", &[], Language::Php), "title");
    }

    #[test]
    fn guards_digits_empty_and_keywords() {
        assert_eq!(generate_parameter_name("3d", &[], Language::Python), "_3d");
        assert_eq!(generate_parameter_name("", &[], Language::Go), "param");
        assert_eq!(generate_parameter_name("!!", &[], Language::Python), "param");
        assert_eq!(generate_parameter_name("class", &[], Language::Python), "class_value");
        assert_eq!(generate_parameter_name("default", &[], Language::JavaScript), "defaultValue");
    }

    #[test]
    fn appends_counter_until_unique() {
        let existing = vec!["text".to_string(), "text2".to_string(), "$count".to_string()];
        assert_eq!(generate_parameter_name("text", &existing, Language::Python), "text3");
        assert_eq!(generate_parameter_name("count", &existing, Language::Php), "count2");
    }

    #[test]
    fn generated_names_are_always_valid() {
        let existing = vec!["value".to_string()];
        for lang in Language::ALL {
            for base in ["value", "9lives", "", "for", "a-b c", "ÜberName"] {
                let name = generate_parameter_name(base, &existing, lang);
                assert!(valid_identifier(&name), "{} -> {} ({})", base, name, lang);
                assert!(!existing.contains(&name));
                assert!(!lang.profile().is_keyword(&name));
            }
        }
    }

    #[test]
    fn common_affix_prefers_prefix() {
        assert_eq!(common_affix(&["send_email", "send_sms"]), vec!["send"]);
        assert_eq!(common_affix(&["userCount", "orderCount"]), vec!["count"]);
        assert!(common_affix(&["alpha", "beta"]).is_empty());
    }

    #[test]
    fn construct_names() {
        assert_eq!(
            generate_construct_name(&["greet_user", "greet_admin"], ConstructKind::Function, Language::Python),
            "greet"
        );
        assert_eq!(
            generate_construct_name(&["loadUsers", "loadOrders"], ConstructKind::Method, Language::JavaScript),
            "load"
        );
        assert_eq!(
            generate_construct_name(&["alpha", "beta"], ConstructKind::Function, Language::Go),
            "extractedFunction"
        );
        assert_eq!(
            generate_construct_name(&["UserRepo", "OrderRepo"], ConstructKind::Class, Language::Python),
            "Repo"
        );
        assert_eq!(
            generate_construct_name(&["process", "process"], ConstructKind::Function, Language::Python),
            "process_shared"
        );
    }
}
