//! Config struct and loading logic.
//!
//! Priority (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables
//! 3. `.batchlint.toml` in the working directory
//! 4. `~/.config/batchlint/config.toml` (global defaults)
//! 5. Built-in defaults

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::analyzer::{AnalyzeOptions, ProblemFormat};
use crate::command::default_parallelism;
use crate::constants;
use crate::env::Env;
use crate::output::ReporterKind;

/// Errors during config loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ParseFile {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub command: CommandConfig,
    pub diff: DiffConfig,
    pub report: ReportConfig,
}

/// The analyzer command and how it is batched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    pub program: Option<String>,
    /// Fixed arguments placed before every batch of files.
    pub args: Vec<String>,
    pub format: ProblemFormat,
    /// Exit statuses below this value are accepted.
    pub exit_status_threshold: i32,
    pub argument_size_margin: i64,
    /// Defaults to the number of available CPUs.
    pub parallelism: Option<usize>,
    pub max_batch_items: Option<usize>,
    pub timeout_secs: Option<u64>,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            program: None,
            args: Vec::new(),
            format: ProblemFormat::default(),
            exit_status_threshold: 1,
            argument_size_margin: 0,
            parallelism: None,
            max_batch_items: None,
            timeout_secs: None,
        }
    }
}

/// Refs to compare and where to fetch them from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffConfig {
    pub base_ref: Option<String>,
    pub head_ref: Option<String>,
    pub remote: Option<String>,
}

/// Reporter selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Comma-separated reporter names, e.g. `annotation,nop`.
    pub reporters: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            reporters: ReporterKind::Annotation.to_string(),
        }
    }
}

impl Config {
    /// Load configuration with proper layering.
    ///
    /// Reads from global config, working-directory config, then applies
    /// environment variable overrides.
    pub fn load(cwd: Option<&Path>, env: &Env) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                let global = Self::load_file(&global_path)?;
                config.merge(global);
            }
        }

        if let Some(dir) = cwd {
            let local_path = dir.join(constants::CONFIG_FILENAME);
            if local_path.exists() {
                let local = Self::load_file(&local_path)?;
                config.merge(local);
            }
        }

        config.apply_env_vars(env);

        Ok(config)
    }

    /// Load a config from a specific file.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseFile {
            path: path.to_path_buf(),
            source: e,
        })
    }

    fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(constants::CONFIG_DIR).join("config.toml"))
    }

    /// Merge another config into this one; values `other` sets away from
    /// their defaults win.
    pub fn merge(&mut self, other: Config) {
        let default_command = CommandConfig::default();
        if other.command.program.is_some() {
            self.command.program = other.command.program;
        }
        if other.command.args != default_command.args {
            self.command.args = other.command.args;
        }
        if other.command.format != default_command.format {
            self.command.format = other.command.format;
        }
        if other.command.exit_status_threshold != default_command.exit_status_threshold {
            self.command.exit_status_threshold = other.command.exit_status_threshold;
        }
        if other.command.argument_size_margin != default_command.argument_size_margin {
            self.command.argument_size_margin = other.command.argument_size_margin;
        }
        if other.command.parallelism.is_some() {
            self.command.parallelism = other.command.parallelism;
        }
        if other.command.max_batch_items.is_some() {
            self.command.max_batch_items = other.command.max_batch_items;
        }
        if other.command.timeout_secs.is_some() {
            self.command.timeout_secs = other.command.timeout_secs;
        }

        if other.diff.base_ref.is_some() {
            self.diff.base_ref = other.diff.base_ref;
        }
        if other.diff.head_ref.is_some() {
            self.diff.head_ref = other.diff.head_ref;
        }
        if other.diff.remote.is_some() {
            self.diff.remote = other.diff.remote;
        }

        if other.report.reporters != ReportConfig::default().reporters {
            self.report.reporters = other.report.reporters;
        }
    }

    /// Apply environment variable overrides. Empty values are ignored.
    pub fn apply_env_vars(&mut self, env: &Env) {
        if let Some(val) = env.non_empty(constants::ENV_PARALLELISM) {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => self.command.parallelism = Some(n),
                _ => tracing::warn!(
                    var = constants::ENV_PARALLELISM,
                    value = %val,
                    "ignoring invalid parallelism"
                ),
            }
        }
        if let Some(val) = env.non_empty(constants::ENV_REPORTERS) {
            self.report.reporters = val;
        }
        if let Some(val) = env.non_empty(constants::ENV_REMOTE) {
            self.diff.remote = Some(val);
        }
        if let Some(val) = env.non_empty(constants::ENV_BASE_REF) {
            self.diff.base_ref = Some(val);
        }
        if let Some(val) = env.non_empty(constants::ENV_HEAD_REF) {
            self.diff.head_ref = Some(val);
        }
    }

    /// Resolve into the options of one analysis run in `cwd`.
    pub fn analyze_options(&self, cwd: impl Into<PathBuf>) -> AnalyzeOptions {
        AnalyzeOptions {
            program: self.command.program.clone().unwrap_or_default(),
            args: self.command.args.clone(),
            format: self.command.format,
            reporters: ReporterKind::parse_notation(&self.report.reporters),
            base_ref: self.diff.base_ref.clone(),
            head_ref: self.diff.head_ref.clone(),
            remote: self.diff.remote.clone(),
            exit_status_threshold: self.command.exit_status_threshold,
            argument_size_margin: self.command.argument_size_margin,
            parallelism: self.command.parallelism.unwrap_or_else(default_parallelism),
            max_batch_items: self.command.max_batch_items.filter(|&n| n > 0),
            timeout: self.command.timeout_secs.map(Duration::from_secs),
            cwd: cwd.into(),
        }
    }
}
