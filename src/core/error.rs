use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigInvalidJson,
    ConfigInvalidValue,

    ValidationMissingArgument,
    ValidationInvalidArgument,
    ValidationInvalidJson,
    ValidationInvalidPlan,

    SearchToolUnavailable,
    SearchCommandFailed,
    SearchTimeout,

    BackupNotFound,
    BackupCorrupt,
    StorageIoError,

    InternalIoError,
    InternalJsonError,
    InternalUnexpected,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigInvalidJson => "config.invalid_json",
            ErrorCode::ConfigInvalidValue => "config.invalid_value",

            ErrorCode::ValidationMissingArgument => "validation.missing_argument",
            ErrorCode::ValidationInvalidArgument => "validation.invalid_argument",
            ErrorCode::ValidationInvalidJson => "validation.invalid_json",
            ErrorCode::ValidationInvalidPlan => "validation.invalid_plan",

            ErrorCode::SearchToolUnavailable => "search.tool_unavailable",
            ErrorCode::SearchCommandFailed => "search.command_failed",
            ErrorCode::SearchTimeout => "search.timeout",

            ErrorCode::BackupNotFound => "backup.not_found",
            ErrorCode::BackupCorrupt => "backup.corrupt",
            ErrorCode::StorageIoError => "storage.io_error",

            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalJsonError => "internal.json_error",
            ErrorCode::InternalUnexpected => "internal.unexpected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidJsonDetails {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidValueDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub problem: String,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    pub hints: Vec<Hint>,
    pub retryable: Option<bool>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingArgumentDetails {
    pub args: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidArgumentDetails {
    pub field: String,
    pub problem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tried: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidPlanDetails {
    pub problems: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalIoErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalJsonErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// Context for a failed invocation of the external search tool.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchCommandFailedDetails {
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub stderr: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

fn to_details<T: Serialize>(details: T) -> Value {
    serde_json::to_value(details).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            hints: Vec::new(),
            retryable: None,
        }
    }

    pub fn validation_missing_argument(args: Vec<String>) -> Self {
        Self::new(
            ErrorCode::ValidationMissingArgument,
            "Missing required argument",
            to_details(MissingArgumentDetails { args }),
        )
    }

    pub fn validation_invalid_argument(
        field: impl Into<String>,
        problem: impl Into<String>,
        id: Option<String>,
        tried: Option<Vec<String>>,
    ) -> Self {
        let details = to_details(InvalidArgumentDetails {
            field: field.into(),
            problem: problem.into(),
            id,
            tried,
        });

        Self::new(
            ErrorCode::ValidationInvalidArgument,
            "Invalid argument",
            details,
        )
    }

    pub fn validation_invalid_json(
        err: serde_json::Error,
        context: Option<String>,
        input_preview: Option<String>,
    ) -> Self {
        let details = serde_json::json!({
            "error": err.to_string(),
            "context": context,
            "inputPreview": input_preview,
        });

        Self::new(ErrorCode::ValidationInvalidJson, "Invalid JSON", details)
    }

    /// A refactoring plan that cannot be applied. Raised before any I/O.
    pub fn validation_invalid_plan(problems: Vec<String>) -> Self {
        let message = match problems.first() {
            Some(first) if problems.len() == 1 => format!("Invalid refactoring plan: {}", first),
            Some(first) => format!(
                "Invalid refactoring plan: {} (and {} more)",
                first,
                problems.len() - 1
            ),
            None => "Invalid refactoring plan".to_string(),
        };

        Self::new(
            ErrorCode::ValidationInvalidPlan,
            message,
            to_details(InvalidPlanDetails { problems }),
        )
    }

    pub fn config_invalid_json(path: impl Into<String>, err: serde_json::Error) -> Self {
        let details = to_details(ConfigInvalidJsonDetails {
            path: path.into(),
            error: err.to_string(),
        });

        Self::new(
            ErrorCode::ConfigInvalidJson,
            "Invalid JSON in configuration",
            details,
        )
    }

    pub fn config_invalid_value(
        key: impl Into<String>,
        value: Option<String>,
        problem: impl Into<String>,
    ) -> Self {
        let details = to_details(ConfigInvalidValueDetails {
            key: key.into(),
            value,
            problem: problem.into(),
        });

        Self::new(
            ErrorCode::ConfigInvalidValue,
            "Invalid configuration value",
            details,
        )
    }

    pub fn search_tool_unavailable(program: impl Into<String>, error: impl Into<String>) -> Self {
        let program = program.into();
        Self::new(
            ErrorCode::SearchToolUnavailable,
            format!("Search tool '{}' is not available", program),
            serde_json::json!({ "program": program, "error": error.into() }),
        )
        .with_hint("Install ast-grep (https://ast-grep.github.io) or pass --backend builtin")
    }

    pub fn search_command_failed(details: SearchCommandFailedDetails) -> Self {
        Self::new(
            ErrorCode::SearchCommandFailed,
            "Search command failed",
            to_details(details),
        )
    }

    pub fn search_timeout(command: impl Into<String>, timeout_secs: u64) -> Self {
        let mut err = Self::new(
            ErrorCode::SearchTimeout,
            format!("Search command timed out after {}s", timeout_secs),
            serde_json::json!({ "command": command.into(), "timeoutSecs": timeout_secs }),
        )
        .with_hint("Raise search.timeout_secs in unclone.json or pass --timeout");
        err.retryable = Some(true);
        err
    }

    pub fn backup_not_found(backup_id: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::BackupNotFound,
            "Backup not found",
            serde_json::json!({ "backupId": backup_id.into() }),
        )
        .with_hint("Run 'unclone backups list --root <path>' to see available backups")
    }

    pub fn backup_corrupt(
        backup_id: impl Into<String>,
        path: impl Into<String>,
        problem: impl Into<String>,
    ) -> Self {
        let details = to_details(StorageDetails {
            error: problem.into(),
            backup_id: Some(backup_id.into()),
            path: Some(path.into()),
        });

        Self::new(ErrorCode::BackupCorrupt, "Backup is corrupt", details)
    }

    pub fn storage_io(
        error: impl Into<String>,
        backup_id: Option<String>,
        path: Option<String>,
    ) -> Self {
        let details = to_details(StorageDetails {
            error: error.into(),
            backup_id,
            path,
        });

        Self::new(ErrorCode::StorageIoError, "Storage error", details)
    }

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        let details = to_details(InternalIoErrorDetails {
            error: error.into(),
            context,
        });

        Self::new(ErrorCode::InternalIoError, "IO error", details)
    }

    pub fn internal_json(error: impl Into<String>, context: Option<String>) -> Self {
        let details = to_details(InternalJsonErrorDetails {
            error: error.into(),
            context,
        });

        Self::new(ErrorCode::InternalJsonError, "JSON error", details)
    }

    pub fn internal_unexpected(error: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InternalUnexpected,
            "Unexpected error",
            serde_json::json!({ "error": error.into() }),
        )
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::internal_unexpected(message)
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_plan_message_counts_extra_problems() {
        let err = Error::validation_invalid_plan(vec![
            "files_affected is empty".to_string(),
            "function_name is empty".to_string(),
        ]);
        assert_eq!(err.code, ErrorCode::ValidationInvalidPlan);
        assert!(err.message.contains("files_affected is empty"));
        assert!(err.message.contains("1 more"));
        assert_eq!(err.details["problems"].as_array().map(|a| a.len()), Some(2));
    }

    #[test]
    fn search_timeout_is_retryable_with_hint() {
        let err = Error::search_timeout("ast-grep scan", 5);
        assert_eq!(err.code.as_str(), "search.timeout");
        assert_eq!(err.retryable, Some(true));
        assert!(!err.hints.is_empty());
    }

    #[test]
    fn storage_details_skip_missing_fields() {
        let err = Error::storage_io("disk full", None, None);
        assert_eq!(err.details["error"], "disk full");
        assert!(err.details.get("backupId").is_none());
    }
}
