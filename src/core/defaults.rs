use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::time::Duration;

use crate::construct::ConstructKind;
use crate::dedup::{AnalysisOptions, LruTtl, SimilarityConfig, SimilarityContext};
use crate::error::{Error, Result};
use crate::language::Language;
use crate::paths;
use crate::refactor::DEFAULT_DIR_NAME;
use crate::search::BackendChoice;

/// Root configuration structure for unclone.json
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UncloneConfig {
    #[serde(default)]
    pub analysis: AnalysisConfig,

    #[serde(default)]
    pub similarity: SimilarityConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub backups: BackupsConfig,
}

/// Grouping thresholds and the constructs to look at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f64,

    #[serde(default = "default_min_lines")]
    pub min_lines: usize,

    #[serde(default = "default_kinds")]
    pub kinds: Vec<String>,

    /// Empty means every supported language.
    #[serde(default)]
    pub languages: Vec<String>,

    /// Root-relative glob patterns to skip.
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Which search backend drives construct discovery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub backend: BackendChoice,

    #[serde(default = "default_binary")]
    pub binary: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Similarity result cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Zero disables caching.
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,

    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupsConfig {
    #[serde(default = "default_backup_dir_name")]
    pub dir_name: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            min_similarity: default_min_similarity(),
            min_lines: default_min_lines(),
            kinds: default_kinds(),
            languages: Vec::new(),
            exclude: Vec::new(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            backend: BackendChoice::Auto,
            binary: default_binary(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl Default for BackupsConfig {
    fn default() -> Self {
        Self {
            dir_name: default_backup_dir_name(),
        }
    }
}

// =============================================================================
// Default value functions
// =============================================================================

fn default_min_similarity() -> f64 {
    0.8
}

fn default_min_lines() -> usize {
    5
}

fn default_kinds() -> Vec<String> {
    vec!["function".to_string(), "method".to_string()]
}

fn default_binary() -> String {
    "ast-grep".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_cache_capacity() -> usize {
    4096
}

fn default_cache_ttl_secs() -> u64 {
    3600
}

fn default_backup_dir_name() -> String {
    DEFAULT_DIR_NAME.to_string()
}

// =============================================================================
// Conversions into runtime values
// =============================================================================

impl UncloneConfig {
    /// Check values serde cannot check.
    pub fn validate(&self) -> Result<()> {
        self.similarity.validate()?;
        if !(0.0..=1.0).contains(&self.analysis.min_similarity) {
            return Err(Error::config_invalid_value(
                "analysis.min_similarity",
                Some(self.analysis.min_similarity.to_string()),
                "Must be within [0, 1]",
            ));
        }
        if self.search.timeout_secs == 0 {
            return Err(Error::config_invalid_value(
                "search.timeout_secs",
                Some("0".to_string()),
                "Must be at least 1",
            ));
        }
        let dir = &self.backups.dir_name;
        if dir.is_empty() || dir.contains('/') || dir.contains('\\') || dir == ".." {
            return Err(Error::config_invalid_value(
                "backups.dir_name",
                Some(dir.clone()),
                "Must be a single directory name",
            ));
        }
        self.analysis_options()?;
        Ok(())
    }

    pub fn analysis_options(&self) -> Result<AnalysisOptions> {
        let kinds = self
            .analysis
            .kinds
            .iter()
            .map(|k| {
                ConstructKind::parse(k).ok_or_else(|| {
                    Error::config_invalid_value(
                        "analysis.kinds",
                        Some(k.clone()),
                        "Expected function, method or class",
                    )
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let languages = self
            .analysis
            .languages
            .iter()
            .map(|l| Language::parse(l))
            .collect::<Result<Vec<_>>>()?;
        Ok(AnalysisOptions {
            languages,
            kinds,
            min_similarity: self.analysis.min_similarity,
            min_lines: self.analysis.min_lines,
            skip_impact: false,
            exclude: self.analysis.exclude.clone(),
        })
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search.timeout_secs)
    }

    pub fn similarity_context(&self) -> SimilarityContext {
        SimilarityContext::with_cache(
            self.similarity.clone(),
            self.cache.capacity,
            LruTtl {
                ttl: Duration::from_secs(self.cache.ttl_secs),
            },
        )
    }
}

// =============================================================================
// Loading functions
// =============================================================================

/// Load the full unclone.json config, falling back to defaults on any error.
pub fn load_config() -> UncloneConfig {
    load_config_from_file()
        .and_then(|config| config.validate().map(|_| config))
        .unwrap_or_default()
}

/// Attempt to load config from unclone.json file.
fn load_config_from_file() -> Result<UncloneConfig> {
    let path = paths::unclone_json()?;

    if !path.exists() {
        return Err(Error::other("unclone.json not found"));
    }

    let content = fs::read_to_string(&path).map_err(|e| {
        Error::internal_io(e.to_string(), Some(format!("read {}", path.display())))
    })?;

    serde_json::from_str(&content)
        .map_err(|e| Error::config_invalid_json(path.display().to_string(), e))
}

/// Save config to unclone.json after validating it.
pub fn save_config(config: &UncloneConfig) -> Result<()> {
    config.validate()?;
    let path = paths::unclone_json()?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            Error::internal_io(e.to_string(), Some(format!("create {}", parent.display())))
        })?;
    }

    let content = serde_json::to_string_pretty(config).map_err(|e| {
        Error::internal_json(e.to_string(), Some("serialize unclone.json".to_string()))
    })?;

    fs::write(&path, content).map_err(|e| {
        Error::internal_io(e.to_string(), Some(format!("write {}", path.display())))
    })?;

    Ok(())
}

/// Replace the value at a JSON pointer. The key must already exist.
pub fn set_pointer(config: &UncloneConfig, pointer: &str, value: Value) -> Result<UncloneConfig> {
    let mut json = to_json(config)?;
    check_pointer(pointer)?;
    let slot = json.pointer_mut(pointer).ok_or_else(|| unknown_key(pointer))?;
    *slot = value;
    from_json(json)
}

/// Remove the value at a JSON pointer, which resets it to its default.
pub fn remove_pointer(config: &UncloneConfig, pointer: &str) -> Result<UncloneConfig> {
    let mut json = to_json(config)?;
    check_pointer(pointer)?;
    let (parent, key) = pointer.rsplit_once('/').ok_or_else(|| unknown_key(pointer))?;
    let removed = json
        .pointer_mut(parent)
        .and_then(Value::as_object_mut)
        .and_then(|map| map.remove(key));
    if removed.is_none() {
        return Err(unknown_key(pointer));
    }
    from_json(json)
}

fn check_pointer(pointer: &str) -> Result<()> {
    if !pointer.starts_with('/') || pointer == "/" {
        return Err(Error::validation_invalid_argument(
            "pointer",
            format!("JSON pointer must start with '/' and name a key: {}", pointer),
            None,
            None,
        ));
    }
    Ok(())
}

fn unknown_key(pointer: &str) -> Error {
    Error::config_invalid_value(pointer, None, "No such configuration key")
}

fn to_json(config: &UncloneConfig) -> Result<Value> {
    serde_json::to_value(config)
        .map_err(|e| Error::internal_json(e.to_string(), Some("serialize config".to_string())))
}

fn from_json(json: Value) -> Result<UncloneConfig> {
    let config: UncloneConfig = serde_json::from_value(json).map_err(|e| {
        Error::validation_invalid_json(e, Some("deserialize config".to_string()), None)
    })?;
    config.validate()?;
    Ok(config)
}

/// Check if unclone.json file exists
pub fn config_exists() -> bool {
    paths::unclone_json()
        .map(|p| p.exists())
        .unwrap_or(false)
}

/// Delete unclone.json file (reset to defaults)
pub fn reset_config() -> Result<bool> {
    let path = paths::unclone_json()?;

    if path.exists() {
        fs::remove_file(&path).map_err(|e| {
            Error::internal_io(e.to_string(), Some(format!("delete {}", path.display())))
        })?;
        Ok(true)
    } else {
        Ok(false)
    }
}

/// Get the path to unclone.json (for display purposes)
pub fn config_path() -> Result<String> {
    Ok(paths::unclone_json()?.display().to_string())
}

/// Get built-in defaults (ignoring any file config)
pub fn builtin_defaults() -> UncloneConfig {
    UncloneConfig::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_in_defaults() {
        let config: UncloneConfig =
            serde_json::from_str(r#"{"analysis": {"min_lines": 3}, "search": {"backend": "builtin"}}"#)
                .unwrap();
        assert_eq!(config.analysis.min_lines, 3);
        assert_eq!(config.analysis.min_similarity, 0.8);
        assert_eq!(config.search.backend, BackendChoice::Builtin);
        assert_eq!(config.search.timeout_secs, 60);
        assert_eq!(config.similarity, SimilarityConfig::default());
        assert_eq!(config.backups.dir_name, ".unclone-backups");
    }

    #[test]
    fn defaults_validate() {
        assert!(builtin_defaults().validate().is_ok());
        let options = builtin_defaults().analysis_options().unwrap();
        assert_eq!(options.kinds, vec![ConstructKind::Function, ConstructKind::Method]);
        assert!(options.languages.is_empty());
    }

    #[test]
    fn invalid_values_are_config_errors() {
        let mut config = builtin_defaults();
        config.similarity.stage1_weight = 0.9;
        assert_eq!(config.validate().unwrap_err().code.as_str(), "config.invalid_value");

        let mut config = builtin_defaults();
        config.analysis.kinds = vec!["module".to_string()];
        assert_eq!(config.validate().unwrap_err().code.as_str(), "config.invalid_value");

        let mut config = builtin_defaults();
        config.backups.dir_name = "../out".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn pointer_edits_round_through_validation() {
        let config = builtin_defaults();
        let updated =
            set_pointer(&config, "/analysis/min_lines", serde_json::json!(8)).unwrap();
        assert_eq!(updated.analysis.min_lines, 8);

        let reset = remove_pointer(&updated, "/analysis/min_lines").unwrap();
        assert_eq!(reset.analysis.min_lines, 5);

        let err = set_pointer(&config, "/analysis/nope", serde_json::json!(1)).unwrap_err();
        assert_eq!(err.code.as_str(), "config.invalid_value");

        let err = set_pointer(&config, "/search/timeout_secs", serde_json::json!(0)).unwrap_err();
        assert_eq!(err.code.as_str(), "config.invalid_value");

        assert!(set_pointer(&config, "analysis", serde_json::json!(1)).is_err());
    }
}
