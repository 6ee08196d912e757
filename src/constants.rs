//! App-wide constants.
//!
//! Centralises the tool name, config paths, environment variable names,
//! and platform argument limits so a rename only requires changing this file.

/// Display name of the tool (lowercase).
pub const APP_NAME: &str = "batchlint";

/// Crate version baked in at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Local config filename (e.g. `.batchlint.toml` in the working directory).
pub const CONFIG_FILENAME: &str = ".batchlint.toml";

/// Directory name under `~/.config/` for global config.
pub const CONFIG_DIR: &str = "batchlint";

// ── Argument size limits ────────────────────────────────────────────

/// Command-line length ceiling on Windows (`CreateProcess` limit minus NUL).
pub const WINDOWS_MAX_ARGUMENT_BYTES: usize = 8_191;

/// `ARG_MAX` assumed on POSIX systems.
pub const POSIX_ARG_MAX: usize = 131_072;

/// Headroom kept below `ARG_MAX` for per-process bookkeeping.
pub const POSIX_ARG_HEADROOM: usize = 2_048;

// ── Environment variable names ──────────────────────────────────────

pub const ENV_LOG: &str = "BATCHLINT_LOG";
pub const ENV_PARALLELISM: &str = "BATCHLINT_PARALLELISM";
pub const ENV_REPORTERS: &str = "BATCHLINT_REPORTERS";
pub const ENV_REMOTE: &str = "BATCHLINT_REMOTE";
pub const ENV_BASE_REF: &str = "GITHUB_BASE_REF";
pub const ENV_HEAD_REF: &str = "GITHUB_HEAD_REF";
