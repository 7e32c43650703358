//! Supported languages and their syntax profiles.
//!
//! Analysis never parses a full grammar. Everything language-specific that the
//! tokenizer, inference, code generator and impact analyzer need lives in one
//! static `SyntaxProfile` per `Language` variant.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    JavaScript,
    TypeScript,
    Rust,
    Go,
    Java,
    Php,
    Ruby,
}

/// How a language delimits blocks. Drives construct extent detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStyle {
    Indent,
    Braces,
    EndKeyword,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentCase {
    Snake,
    LowerCamel,
}

/// Named-argument syntax available at call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamedArgs {
    /// No named arguments; calls fall back to positional.
    Unsupported,
    /// `f(name=value)`
    Equals,
    /// `f(name: value)`
    Colon,
    /// `f({ name: value })` with a destructured parameter object.
    ObjectLiteral,
}

/// Where parameter type annotations go, if anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationStyle {
    Unsupported,
    /// `name: Type`
    ColonSuffix,
    /// `name Type`
    SpaceSuffix,
    /// `Type name`
    Prefix,
}

#[derive(Debug)]
pub struct SyntaxProfile {
    pub language: Language,
    pub extensions: &'static [&'static str],
    pub line_comments: &'static [&'static str],
    pub block_comment: Option<(&'static str, &'static str)>,
    pub keywords: &'static [&'static str],
    /// Keywords that introduce a function/method definition name.
    pub function_keywords: &'static [&'static str],
    /// Keywords that introduce a class-like definition name.
    pub class_keywords: &'static [&'static str],
    pub block_style: BlockStyle,
    pub ast_grep_lang: &'static str,
    pub function_node_kinds: &'static [&'static str],
    pub class_node_kinds: &'static [&'static str],
    pub ident_case: IdentCase,
    pub named_args: NamedArgs,
    pub annotation: AnnotationStyle,
    /// Receiver keyword used inside methods (`self`, `this`, `$this`).
    pub receiver: Option<&'static str>,
    pub member_access: &'static str,
    pub omit_empty_parens: bool,
    pub statement_end: &'static str,
    pub variable_sigil: &'static str,
    pub shared_module_stem: &'static str,
    /// Files whose symbols are re-exported as a module's public surface.
    pub module_root_files: &'static [&'static str],
    /// Filename fragments that mark test files.
    pub test_file_markers: &'static [&'static str],
}

const PYTHON_KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global",
    "if", "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return",
    "try", "while", "with", "yield", "self", "cls",
];

const JS_KEYWORDS: &[&str] = &[
    "async", "await", "break", "case", "catch", "class", "const", "continue", "debugger",
    "default", "delete", "do", "else", "export", "extends", "false", "finally", "for",
    "function", "if", "import", "in", "instanceof", "let", "new", "null", "of", "return",
    "static", "super", "switch", "this", "throw", "true", "try", "typeof", "undefined", "var",
    "void", "while", "with", "yield",
];

const TS_KEYWORDS: &[&str] = &[
    "abstract", "any", "as", "async", "await", "boolean", "break", "case", "catch", "class",
    "const", "continue", "declare", "default", "delete", "do", "else", "enum", "export",
    "extends", "false", "finally", "for", "from", "function", "if", "implements", "import",
    "in", "instanceof", "interface", "let", "namespace", "new", "null", "number", "of",
    "private", "protected", "public", "readonly", "return", "static", "string", "super",
    "switch", "this", "throw", "true", "try", "type", "typeof", "undefined", "unknown", "var",
    "void", "while", "yield",
];

const RUST_KEYWORDS: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "crate", "dyn", "else", "enum",
    "extern", "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move",
    "mut", "pub", "ref", "return", "self", "Self", "static", "struct", "super", "trait",
    "true", "type", "unsafe", "use", "where", "while",
];

const GO_KEYWORDS: &[&str] = &[
    "break", "case", "chan", "const", "continue", "default", "defer", "else", "fallthrough",
    "false", "for", "func", "go", "goto", "if", "import", "interface", "map", "nil",
    "package", "range", "return", "select", "struct", "switch", "true", "type", "var",
];

const JAVA_KEYWORDS: &[&str] = &[
    "abstract", "assert", "boolean", "break", "byte", "case", "catch", "char", "class",
    "const", "continue", "default", "do", "double", "else", "enum", "extends", "false",
    "final", "finally", "float", "for", "if", "implements", "import", "instanceof", "int",
    "interface", "long", "new", "null", "package", "private", "protected", "public",
    "return", "short", "static", "super", "switch", "synchronized", "this", "throw",
    "throws", "true", "try", "var", "void", "volatile", "while",
];

const PHP_KEYWORDS: &[&str] = &[
    "abstract", "array", "as", "break", "case", "catch", "class", "clone", "const",
    "continue", "default", "do", "echo", "else", "elseif", "extends", "false", "final",
    "finally", "fn", "for", "foreach", "function", "if", "implements", "include", "instanceof",
    "interface", "namespace", "new", "null", "private", "protected", "public", "require",
    "require_once", "return", "static", "switch", "throw", "trait", "true", "try", "use",
    "while", "$this",
];

const RUBY_KEYWORDS: &[&str] = &[
    "BEGIN", "END", "alias", "and", "begin", "break", "case", "class", "def", "defined",
    "do", "else", "elsif", "end", "ensure", "false", "for", "if", "in", "module", "next",
    "nil", "not", "or", "redo", "require", "require_relative", "rescue", "retry", "return",
    "self", "super", "then", "true", "undef", "unless", "until", "when", "while", "yield",
];

static PYTHON: SyntaxProfile = SyntaxProfile {
    language: Language::Python,
    extensions: &["py", "pyi"],
    line_comments: &["#"],
    block_comment: None,
    keywords: PYTHON_KEYWORDS,
    function_keywords: &["def"],
    class_keywords: &["class"],
    block_style: BlockStyle::Indent,
    ast_grep_lang: "python",
    function_node_kinds: &["function_definition"],
    class_node_kinds: &["class_definition"],
    ident_case: IdentCase::Snake,
    named_args: NamedArgs::Equals,
    annotation: AnnotationStyle::ColonSuffix,
    receiver: Some("self"),
    member_access: ".",
    omit_empty_parens: false,
    statement_end: "",
    variable_sigil: "",
    shared_module_stem: "dedup_helpers",
    module_root_files: &["__init__.py"],
    test_file_markers: &["test_", "_test"],
};

static JAVASCRIPT: SyntaxProfile = SyntaxProfile {
    language: Language::JavaScript,
    extensions: &["js", "jsx", "mjs", "cjs"],
    line_comments: &["//"],
    block_comment: Some(("/*", "*/")),
    keywords: JS_KEYWORDS,
    function_keywords: &["function"],
    class_keywords: &["class"],
    block_style: BlockStyle::Braces,
    ast_grep_lang: "javascript",
    function_node_kinds: &["function_declaration", "method_definition"],
    class_node_kinds: &["class_declaration"],
    ident_case: IdentCase::LowerCamel,
    named_args: NamedArgs::ObjectLiteral,
    annotation: AnnotationStyle::Unsupported,
    receiver: Some("this"),
    member_access: ".",
    omit_empty_parens: false,
    statement_end: ";",
    variable_sigil: "",
    shared_module_stem: "dedupHelpers",
    module_root_files: &["index.js", "index.mjs"],
    test_file_markers: &[".test", ".spec"],
};

static TYPESCRIPT: SyntaxProfile = SyntaxProfile {
    language: Language::TypeScript,
    extensions: &["ts", "tsx", "mts", "cts"],
    line_comments: &["//"],
    block_comment: Some(("/*", "*/")),
    keywords: TS_KEYWORDS,
    function_keywords: &["function"],
    class_keywords: &["class", "interface"],
    block_style: BlockStyle::Braces,
    ast_grep_lang: "typescript",
    function_node_kinds: &["function_declaration", "method_definition"],
    class_node_kinds: &["class_declaration"],
    ident_case: IdentCase::LowerCamel,
    named_args: NamedArgs::ObjectLiteral,
    annotation: AnnotationStyle::ColonSuffix,
    receiver: Some("this"),
    member_access: ".",
    omit_empty_parens: false,
    statement_end: ";",
    variable_sigil: "",
    shared_module_stem: "dedupHelpers",
    module_root_files: &["index.ts", "index.tsx"],
    test_file_markers: &[".test", ".spec"],
};

static RUST: SyntaxProfile = SyntaxProfile {
    language: Language::Rust,
    extensions: &["rs"],
    line_comments: &["//"],
    block_comment: Some(("/*", "*/")),
    keywords: RUST_KEYWORDS,
    function_keywords: &["fn"],
    class_keywords: &["struct", "enum", "trait", "impl"],
    block_style: BlockStyle::Braces,
    ast_grep_lang: "rust",
    function_node_kinds: &["function_item"],
    class_node_kinds: &["impl_item", "struct_item"],
    ident_case: IdentCase::Snake,
    named_args: NamedArgs::Unsupported,
    annotation: AnnotationStyle::ColonSuffix,
    receiver: Some("self"),
    member_access: ".",
    omit_empty_parens: false,
    statement_end: "",
    variable_sigil: "",
    shared_module_stem: "dedup_helpers",
    module_root_files: &["mod.rs", "lib.rs"],
    test_file_markers: &["_test", "tests/"],
};

static GO: SyntaxProfile = SyntaxProfile {
    language: Language::Go,
    extensions: &["go"],
    line_comments: &["//"],
    block_comment: Some(("/*", "*/")),
    keywords: GO_KEYWORDS,
    function_keywords: &["func"],
    class_keywords: &["type"],
    block_style: BlockStyle::Braces,
    ast_grep_lang: "go",
    function_node_kinds: &["function_declaration", "method_declaration"],
    class_node_kinds: &["type_declaration"],
    ident_case: IdentCase::LowerCamel,
    named_args: NamedArgs::Unsupported,
    annotation: AnnotationStyle::SpaceSuffix,
    receiver: None,
    member_access: ".",
    omit_empty_parens: false,
    statement_end: "",
    variable_sigil: "",
    shared_module_stem: "dedup_helpers",
    module_root_files: &["doc.go"],
    test_file_markers: &["_test"],
};

static JAVA: SyntaxProfile = SyntaxProfile {
    language: Language::Java,
    extensions: &["java"],
    line_comments: &["//"],
    block_comment: Some(("/*", "*/")),
    keywords: JAVA_KEYWORDS,
    function_keywords: &[],
    class_keywords: &["class", "interface", "enum"],
    block_style: BlockStyle::Braces,
    ast_grep_lang: "java",
    function_node_kinds: &["method_declaration"],
    class_node_kinds: &["class_declaration"],
    ident_case: IdentCase::LowerCamel,
    named_args: NamedArgs::Unsupported,
    annotation: AnnotationStyle::Prefix,
    receiver: Some("this"),
    member_access: ".",
    omit_empty_parens: false,
    statement_end: ";",
    variable_sigil: "",
    shared_module_stem: "DedupHelpers",
    module_root_files: &["package-info.java"],
    test_file_markers: &["Test", "Tests"],
};

static PHP: SyntaxProfile = SyntaxProfile {
    language: Language::Php,
    extensions: &["php"],
    line_comments: &["//", "#"],
    block_comment: Some(("/*", "*/")),
    keywords: PHP_KEYWORDS,
    function_keywords: &["function"],
    class_keywords: &["class", "trait", "interface"],
    block_style: BlockStyle::Braces,
    ast_grep_lang: "php",
    function_node_kinds: &["function_definition", "method_declaration"],
    class_node_kinds: &["class_declaration"],
    ident_case: IdentCase::Snake,
    named_args: NamedArgs::Colon,
    annotation: AnnotationStyle::Prefix,
    receiver: Some("$this"),
    member_access: "->",
    omit_empty_parens: false,
    statement_end: ";",
    variable_sigil: "$",
    shared_module_stem: "dedup-helpers",
    module_root_files: &["index.php", "functions.php"],
    test_file_markers: &["Test", "-test"],
};

static RUBY: SyntaxProfile = SyntaxProfile {
    language: Language::Ruby,
    extensions: &["rb"],
    line_comments: &["#"],
    block_comment: None,
    keywords: RUBY_KEYWORDS,
    function_keywords: &["def"],
    class_keywords: &["class", "module"],
    block_style: BlockStyle::EndKeyword,
    ast_grep_lang: "ruby",
    function_node_kinds: &["method", "singleton_method"],
    class_node_kinds: &["class", "module"],
    ident_case: IdentCase::Snake,
    named_args: NamedArgs::Colon,
    annotation: AnnotationStyle::Unsupported,
    receiver: Some("self"),
    member_access: ".",
    omit_empty_parens: true,
    statement_end: "",
    variable_sigil: "",
    shared_module_stem: "dedup_helpers",
    module_root_files: &[],
    test_file_markers: &["_spec", "_test", "test_"],
};

impl Language {
    pub const ALL: [Language; 8] = [
        Language::Python,
        Language::JavaScript,
        Language::TypeScript,
        Language::Rust,
        Language::Go,
        Language::Java,
        Language::Php,
        Language::Ruby,
    ];

    pub fn profile(&self) -> &'static SyntaxProfile {
        match self {
            Language::Python => &PYTHON,
            Language::JavaScript => &JAVASCRIPT,
            Language::TypeScript => &TYPESCRIPT,
            Language::Rust => &RUST,
            Language::Go => &GO,
            Language::Java => &JAVA,
            Language::Php => &PHP,
            Language::Ruby => &RUBY,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Rust => "rust",
            Language::Go => "go",
            Language::Java => "java",
            Language::Php => "php",
            Language::Ruby => "ruby",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|lang| lang.profile().extensions.contains(&ext))
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Parse a user-supplied language name (accepts common aliases).
    pub fn parse(name: &str) -> Result<Self> {
        let lower = name.trim().to_ascii_lowercase();
        let lang = match lower.as_str() {
            "python" | "py" => Language::Python,
            "javascript" | "js" | "jsx" => Language::JavaScript,
            "typescript" | "ts" | "tsx" => Language::TypeScript,
            "rust" | "rs" => Language::Rust,
            "go" | "golang" => Language::Go,
            "java" => Language::Java,
            "php" => Language::Php,
            "ruby" | "rb" => Language::Ruby,
            _ => {
                return Err(Error::validation_invalid_argument(
                    "language",
                    format!("Unsupported language '{}'", name),
                    None,
                    Some(Self::ALL.iter().map(|l| l.as_str().to_string()).collect()),
                ))
            }
        };
        Ok(lang)
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SyntaxProfile {
    pub fn is_keyword(&self, word: &str) -> bool {
        self.keywords.contains(&word)
    }

    pub fn is_definition_keyword(&self, word: &str) -> bool {
        self.function_keywords.contains(&word) || self.class_keywords.contains(&word)
    }

    pub fn matches_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| self.extensions.contains(&ext))
            .unwrap_or(false)
    }

    /// Whether a path looks like a test file for this language.
    pub fn is_test_file(&self, path: &Path) -> bool {
        let normalized = path.to_string_lossy().replace('\\', "/");
        if normalized.contains("/tests/")
            || normalized.contains("/test/")
            || normalized.contains("/__tests__/")
            || normalized.contains("/spec/")
        {
            return true;
        }
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        self.test_file_markers.iter().any(|marker| {
            if marker.ends_with('/') {
                return false;
            }
            stem.starts_with(marker) || stem.ends_with(marker)
        })
    }

    pub fn is_module_root_file(&self, path: &Path) -> bool {
        path.file_name()
            .map(|n| self.module_root_files.contains(&n.to_string_lossy().as_ref()))
            .unwrap_or(false)
    }

    /// File extension used when creating a shared module for this language.
    pub fn primary_extension(&self) -> &'static str {
        self.extensions.first().copied().unwrap_or("txt")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_extension_covers_every_language() {
        for lang in Language::ALL {
            let ext = lang.profile().primary_extension();
            assert_eq!(Language::from_extension(ext), Some(lang));
        }
        assert_eq!(Language::from_extension("cobol"), None);
    }

    #[test]
    fn parse_accepts_aliases() {
        assert_eq!(Language::parse("py").unwrap(), Language::Python);
        assert_eq!(Language::parse("TS").unwrap(), Language::TypeScript);
        assert_eq!(Language::parse("golang").unwrap(), Language::Go);
        let err = Language::parse("fortran").unwrap_err();
        assert_eq!(err.code.as_str(), "validation.invalid_argument");
    }

    #[test]
    fn test_file_detection_per_language() {
        let py = Language::Python.profile();
        assert!(py.is_test_file(Path::new("/p/pkg/test_users.py")));
        assert!(py.is_test_file(Path::new("/p/tests/helpers.py")));
        assert!(!py.is_test_file(Path::new("/p/pkg/users.py")));

        let ts = Language::TypeScript.profile();
        assert!(ts.is_test_file(Path::new("/p/src/user.test.ts")));
        assert!(!ts.is_test_file(Path::new("/p/src/user.ts")));

        let go = Language::Go.profile();
        assert!(go.is_test_file(Path::new("/p/users_test.go")));
    }

    #[test]
    fn module_root_files() {
        assert!(Language::Python
            .profile()
            .is_module_root_file(Path::new("/p/pkg/__init__.py")));
        assert!(Language::Rust.profile().is_module_root_file(Path::new("/p/src/lib.rs")));
        assert!(!Language::Rust.profile().is_module_root_file(Path::new("/p/src/user.rs")));
    }
}
