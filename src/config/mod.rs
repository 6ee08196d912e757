//! Configuration loading and layering.
//!
//! Handles `.batchlint.toml` loading, environment variable resolution,
//! and the conversion into [`AnalyzeOptions`](crate::analyzer::AnalyzeOptions).

pub mod loader;

pub use loader::{CommandConfig, Config, ConfigError, DiffConfig, ReportConfig};
