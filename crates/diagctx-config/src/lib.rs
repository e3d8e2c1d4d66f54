#![deny(unsafe_code)]

//! Configuration loading and validation for diagctx.
//!
//! Loads TOML configuration files and validates them. Provides the
//! [`AppConfig`] type as the central configuration structure and the
//! [`EngineConfig`] section consumed by the extraction engine.
//!
//! Every field has a default, so an empty file (or no file at all) is a
//! valid configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Compiler families the diagnostic parser understands.
pub const COMPILER_FAMILIES: [&str; 4] = ["auto", "clang", "gcc", "msvc"];

/// Top-level application configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Extraction engine tuning.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Where referenced source files are looked up.
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Regression harness configuration.
    #[serde(default)]
    pub regression: RegressionConfig,
}

/// Knobs consumed by the extraction engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum size of an assembled context, in characters.
    #[serde(default = "default_max_budget")]
    pub max_budget: usize,

    /// Lines of source shown above and below each diagnostic line.
    #[serde(default = "default_context_radius")]
    pub context_radius: u32,

    /// Largest gap (in lines) between two snippets that still merges them.
    #[serde(default = "default_merge_gap_threshold")]
    pub merge_gap_threshold: u32,

    /// Compiler family hint: "auto", "clang", "gcc", or "msvc".
    #[serde(default = "default_compiler")]
    pub compiler: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_budget: default_max_budget(),
            context_radius: default_context_radius(),
            merge_gap_threshold: default_merge_gap_threshold(),
            compiler: default_compiler(),
        }
    }
}

fn default_max_budget() -> usize {
    // Two 1920-token halves (error text + code) at ~4 chars per token.
    2 * 1920 * 4
}

fn default_context_radius() -> u32 {
    3
}

fn default_merge_gap_threshold() -> u32 {
    1
}

fn default_compiler() -> String {
    "auto".to_string()
}

/// Source lookup configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Search roots, tried in order for relative paths.
    #[serde(default = "default_search_roots")]
    pub search_roots: Vec<PathBuf>,

    /// Retry unresolved absolute paths by their trailing components under
    /// each search root (for output captured on another machine).
    #[serde(default)]
    pub match_path_suffix: bool,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            search_roots: default_search_roots(),
            match_path_suffix: false,
        }
    }
}

fn default_search_roots() -> Vec<PathBuf> {
    vec![PathBuf::from(".")]
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Regression harness configuration.
///
/// ## TOML Example
///
/// ```toml
/// [regression]
/// fixtures_dir = "tests/regression"
/// workers = 8
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionConfig {
    /// Root of the fixture tree (`<os>/<compiler>/<name>.log` plus `sources/`).
    #[serde(default = "default_fixtures_dir")]
    pub fixtures_dir: PathBuf,

    /// Maximum number of fixtures processed concurrently.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for RegressionConfig {
    fn default() -> Self {
        Self {
            fixtures_dir: default_fixtures_dir(),
            workers: default_workers(),
        }
    }
}

fn default_fixtures_dir() -> PathBuf {
    PathBuf::from("tests/regression")
}

fn default_workers() -> usize {
    4
}

impl AppConfig {
    /// Load configuration from a TOML file at the given path using async I/O.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        let config = Self::parse(&content)?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate()?;

        if self.logging.level.is_empty() {
            return Err(ConfigError::Validation(
                "logging.level must not be empty".to_string(),
            ));
        }
        if self.regression.workers == 0 {
            return Err(ConfigError::Validation(
                "regression.workers must be at least 1".to_string(),
            ));
        }
        for (i, root) in self.sources.search_roots.iter().enumerate() {
            if root.as_os_str().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "sources.search_roots[{i}] must not be empty"
                )));
            }
        }

        Ok(())
    }
}

impl EngineConfig {
    /// Validate the engine section on its own (used when the CLI overrides fields).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_budget == 0 {
            return Err(ConfigError::Validation(
                "engine.max_budget must be non-zero".to_string(),
            ));
        }
        if !COMPILER_FAMILIES.contains(&self.compiler.as_str()) {
            return Err(ConfigError::Validation(format!(
                "engine.compiler must be one of {:?}, got {:?}",
                COMPILER_FAMILIES, self.compiler
            )));
        }
        Ok(())
    }
}
