//! Run configuration loaded from a YAML file.
//!
//! ```yaml
//! package: express
//! version: latest
//! max_depth: 3
//! registry: npm
//! ascii_tree: true
//! export:
//!   format: markdown
//!   path: report.md
//! ```

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::export::ExportFormat;
use crate::graph::TraversalMode;
use crate::source::RegistryKind;

/// Default traversal depth bound.
pub const DEFAULT_MAX_DEPTH: usize = 5;

/// Default DOT output path.
pub const DEFAULT_OUTPUT_FILE: &str = "graph.dot";

/// Default per-request registry timeout, in seconds.
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Errors raised while loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Where and how to write an analysis report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExportConfig {
    pub format: ExportFormat,
    pub path: PathBuf,
}

/// Settings for one analysis run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Root package to analyze
    pub package: String,

    /// Version token for the root (`latest` or an exact version). Bare
    /// YAML numbers such as `1.0` or `2` are accepted; YAML reads `1.10`
    /// as the float `1.1`, so quote versions like that.
    #[serde(deserialize_with = "version_token")]
    pub version: String,

    /// Where the DOT graph is written
    #[serde(default = "default_output_file")]
    pub output_file: PathBuf,

    /// Print the dependency tree to stdout
    #[serde(default)]
    pub ascii_tree: bool,

    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Skip dependencies whose name contains this substring
    #[serde(default)]
    pub filter: String,

    /// Read dependencies from a fixture file instead of the registry
    #[serde(default)]
    pub test_mode: bool,

    #[serde(default)]
    pub test_repository: Option<PathBuf>,

    /// Which live registry to query when not in test mode
    #[serde(default)]
    pub registry: RegistryKind,

    /// Overrides the registry's public URL
    #[serde(default)]
    pub registry_url: Option<String>,

    #[serde(default)]
    pub traversal: TraversalMode,

    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Overall traversal deadline
    #[serde(default)]
    pub deadline_secs: Option<u64>,

    /// Diff the load order against `npm install`
    #[serde(default)]
    pub compare_npm: bool,

    #[serde(default)]
    pub export: Option<ExportConfig>,
}

fn default_output_file() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_FILE)
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

fn default_fetch_timeout_secs() -> u64 {
    DEFAULT_FETCH_TIMEOUT_SECS
}

/// Accepts a string or a bare number for `version`.
fn version_token<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match serde_yaml::Value::deserialize(deserializer)? {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        other => Err(D::Error::custom(format!(
            "'version' must be a string or number, got {other:?}"
        ))),
    }
}

impl AppConfig {
    /// Loads and validates a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_yaml(&content)?;
        debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parses and validates configuration text.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.package.trim().is_empty() {
            return Err(ConfigError::Invalid("'package' must not be empty".into()));
        }
        if self.version.trim().is_empty() {
            return Err(ConfigError::Invalid("'version' must not be empty".into()));
        }
        if self.test_mode && self.test_repository.is_none() {
            return Err(ConfigError::Invalid(
                "'test_mode' requires 'test_repository'".into(),
            ));
        }
        if self.compare_npm && !self.test_mode && self.registry != RegistryKind::Npm {
            return Err(ConfigError::Invalid(format!(
                "'compare_npm' needs the npm registry, not {}",
                self.registry
            )));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "'fetch_timeout_secs' must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// The registry base URL: the configured override or the public default.
    pub fn registry_url(&self) -> &str {
        self.registry_url
            .as_deref()
            .unwrap_or_else(|| self.registry.default_url())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }

    /// The fixture path, when the fixture source is selected.
    pub fn fixture_path(&self) -> Option<&Path> {
        if self.test_mode {
            self.test_repository.as_deref()
        } else {
            None
        }
    }
}
