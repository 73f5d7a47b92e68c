//! Run configuration.
//!
//! Configuration is read from a TOML file and then overridden by
//! command-line flags. Every section has defaults so a file only needs
//! to name the paths.

use crate::transform::WindowSelection;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default provenance log file name, under the output root.
pub const DEFAULT_LOG_FILE: &str = "conversion_log.txt";
/// Default count report file name, under the output root.
pub const DEFAULT_REPORT_FILE: &str = "png_file_counts.txt";

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required path: {0}")]
    MissingPath(&'static str),
    #[error("at least one filter token is required")]
    NoFilterTokens,
    #[error("filter tokens must not be empty")]
    EmptyFilterToken,
    #[error("at least one artifact extension is required")]
    NoExtensions,
    #[error("invalid worker count (must be 1-256)")]
    InvalidWorkers,
    #[error("manifest path column must not be empty")]
    EmptyPathColumn,
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Filesystem locations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Manifest listing source directories.
    pub manifest: PathBuf,
    /// Root that manifest directories are relative to.
    pub base_root: PathBuf,
    /// Root of the mirrored output tree.
    pub output_root: PathBuf,
    /// Provenance log (defaults under the output root).
    pub log_path: Option<PathBuf>,
    /// Count report (defaults under the output root).
    pub report_path: Option<PathBuf>,
}

impl PathsConfig {
    /// Resolved provenance log path.
    pub fn log_path(&self) -> PathBuf {
        self.log_path
            .clone()
            .unwrap_or_else(|| self.output_root.join(DEFAULT_LOG_FILE))
    }

    /// Resolved count report path.
    pub fn report_path(&self) -> PathBuf {
        self.report_path
            .clone()
            .unwrap_or_else(|| self.output_root.join(DEFAULT_REPORT_FILE))
    }
}

/// Manifest column layout and path rewriting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestConfig {
    /// Header of the source directory column.
    pub path_column: String,
    /// Header of an optional category column.
    pub category_column: Option<String>,
    /// Header of an optional exclusion column; truthy values skip the row.
    pub exclude_column: Option<String>,
    /// Prefix to replace at the start of every source path.
    pub rewrite_prefix: Option<String>,
    /// Replacement for `rewrite_prefix`.
    pub rewrite_to: Option<String>,
    /// Convert backslash separators to forward slashes.
    pub normalize_separators: bool,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            path_column: "FilePath".to_string(),
            category_column: None,
            exclude_column: None,
            rewrite_prefix: None,
            rewrite_to: None,
            normalize_separators: true,
        }
    }
}

/// Which files in a source directory qualify.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Case-sensitive substrings; a file qualifies if its name contains any.
    pub filter_tokens: Vec<String>,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            filter_tokens: vec!["LCC".to_string(), "RCC".to_string()],
        }
    }
}

/// Pixel transform settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    /// Element chosen from multi-valued window tags.
    pub window_selection: WindowSelection,
}

/// Execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Number of concurrent file conversions (1 = sequential).
    pub workers: usize,
    /// Where to write run metrics in Prometheus text format.
    pub metrics_file: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            metrics_file: None,
        }
    }
}

/// Aggregation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Extensions counted as artifacts, compared case-insensitively.
    pub extensions: Vec<String>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["png".to_string()],
        }
    }
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub manifest: ManifestConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub transform: TransformConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    ///
    /// The result is not validated; callers apply overrides first and
    /// then call [`FileConfig::validate`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Validates settings needed for a conversion run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.paths.manifest.as_os_str().is_empty() {
            return Err(ConfigError::MissingPath("manifest"));
        }
        if self.paths.base_root.as_os_str().is_empty() {
            return Err(ConfigError::MissingPath("base_root"));
        }
        self.validate_report()?;
        if self.selection.filter_tokens.is_empty() {
            return Err(ConfigError::NoFilterTokens);
        }
        if self.selection.filter_tokens.iter().any(|t| t.is_empty()) {
            return Err(ConfigError::EmptyFilterToken);
        }
        if self.run.workers == 0 || self.run.workers > 256 {
            return Err(ConfigError::InvalidWorkers);
        }
        if self.manifest.path_column.trim().is_empty() {
            return Err(ConfigError::EmptyPathColumn);
        }
        Ok(())
    }

    /// Validates settings needed for a count-only pass.
    pub fn validate_report(&self) -> Result<(), ConfigError> {
        if self.paths.output_root.as_os_str().is_empty() {
            return Err(ConfigError::MissingPath("output_root"));
        }
        if self.report.extensions.is_empty() {
            return Err(ConfigError::NoExtensions);
        }
        Ok(())
    }
}
