use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::construct::ConstructKind;
use crate::language::Language;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    ExtractFunction,
    ExtractMethod,
    ExtractClass,
}

impl Strategy {
    pub fn for_kind(kind: ConstructKind) -> Self {
        match kind {
            ConstructKind::Method => Strategy::ExtractMethod,
            ConstructKind::Class => Strategy::ExtractClass,
            _ => Strategy::ExtractFunction,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::ExtractFunction => "extract_function",
            Strategy::ExtractMethod => "extract_method",
            Strategy::ExtractClass => "extract_class",
        }
    }
}

/// One changed line in a replacement, for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineChange {
    pub line: usize,
    pub old: String,
    pub new: String,
}

/// Full new content for one file, plus the hunks that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReplacement {
    pub new_content: String,
    #[serde(default)]
    pub changes: Vec<LineChange>,
    /// SHA-256 of the file the plan was generated against. Apply refuses to
    /// overwrite a file whose content has changed since.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_sha256: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GeneratedCode {
    pub extracted_function: String,
    /// Shared module to create or extend; `None` means the extracted code is
    /// already part of a replacement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extract_to_file: Option<PathBuf>,
    pub function_name: String,
    #[serde(default)]
    pub replacements: BTreeMap<PathBuf, FileReplacement>,
    #[serde(default)]
    pub imports: BTreeMap<PathBuf, Vec<String>>,
    /// Header for a newly created shared module (package clause, class open).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub preamble: String,
    /// Footer for a newly created shared module.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub postamble: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefactoringPlan {
    pub strategy: Strategy,
    pub language: Language,
    pub files_affected: Vec<PathBuf>,
    pub generated_code: GeneratedCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<usize>,
    #[serde(default)]
    pub notes: Vec<String>,
}

impl RefactoringPlan {
    /// Every path the plan writes, shared module included.
    pub fn written_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.generated_code.replacements.keys().cloned().collect();
        if let Some(target) = &self.generated_code.extract_to_file {
            if !paths.contains(target) {
                paths.push(target.clone());
            }
        }
        paths
    }
}
