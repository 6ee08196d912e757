//! Clap argument types and how they layer over the loaded config.

use clap::Parser;
use std::path::PathBuf;

use batchlint::analyzer::ProblemFormat;
use batchlint::config::Config;

/// Run a static analyzer over many files in argument-size-limited batches
/// and report the problems that land on changed lines.
#[derive(Parser, Debug)]
#[command(name = "batchlint", version = batchlint::constants::VERSION)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Run an analyzer and report problems on lines changed between two refs.
    Analyze(Box<AnalyzeArgs>),

    /// Print the changed line ranges between two refs as JSON.
    Ranges(RangesArgs),

    /// Print version information.
    Version,
}

/// Refs to compare. Fall back to config, then `GITHUB_BASE_REF`/`GITHUB_HEAD_REF`.
#[derive(clap::Args, Debug, Default)]
pub struct RefArgs {
    /// Base ref the change is compared against.
    #[arg(long)]
    pub base: Option<String>,

    /// Head ref carrying the change.
    #[arg(long)]
    pub head: Option<String>,

    /// Remote to shallow-fetch refs from when they are not available locally.
    #[arg(long)]
    pub remote: Option<String>,
}

impl RefArgs {
    pub fn apply(&self, config: &mut Config) {
        if let Some(ref base) = self.base {
            config.diff.base_ref = Some(base.clone());
        }
        if let Some(ref head) = self.head {
            config.diff.head_ref = Some(head.clone());
        }
        if let Some(ref remote) = self.remote {
            config.diff.remote = Some(remote.clone());
        }
    }
}

/// Arguments for the `ranges` subcommand.
#[derive(Parser, Debug)]
pub struct RangesArgs {
    /// Working directory inside the repository.
    #[arg(long, default_value = ".")]
    pub path: PathBuf,

    #[command(flatten)]
    pub refs: RefArgs,
}

/// Arguments for the `analyze` subcommand.
#[derive(Parser, Debug)]
pub struct AnalyzeArgs {
    /// Working directory the analyzer runs in.
    #[arg(long, default_value = ".")]
    pub path: PathBuf,

    /// Analyzer executable.
    #[arg(long, short = 'c')]
    pub command: Option<String>,

    /// Fixed argument passed before the files (repeatable).
    #[arg(long = "arg", value_name = "ARG", allow_hyphen_values = true)]
    pub args: Vec<String>,

    /// Format the analyzer prints problems in.
    #[arg(long, value_enum)]
    pub format: Option<ProblemFormat>,

    /// Comma-separated reporters (annotation, nop).
    #[arg(long)]
    pub reporter: Option<String>,

    /// Exit statuses below this value are accepted.
    #[arg(long)]
    pub exit_threshold: Option<i32>,

    /// Maximum number of analyzer processes running at once.
    #[arg(long, short = 'j')]
    pub parallelism: Option<usize>,

    /// Maximum number of files per analyzer invocation.
    #[arg(long)]
    pub max_batch_items: Option<usize>,

    /// Extra bytes reserved per invocation when sizing batches.
    #[arg(long, allow_hyphen_values = true)]
    pub argument_size_margin: Option<i64>,

    /// Kill an analyzer invocation after this many seconds.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    #[command(flatten)]
    pub refs: RefArgs,

    /// Read newline-separated file names from a file, or `-` for stdin.
    #[arg(long, value_name = "PATH")]
    pub files_from: Option<PathBuf>,

    /// Files to analyze.
    pub files: Vec<String>,
}

impl AnalyzeArgs {
    /// Layer these flags over `config`.
    pub fn apply(&self, config: &mut Config) {
        if let Some(ref command) = self.command {
            config.command.program = Some(command.clone());
        }
        if !self.args.is_empty() {
            config.command.args = self.args.clone();
        }
        if let Some(format) = self.format {
            config.command.format = format;
        }
        if let Some(ref reporter) = self.reporter {
            config.report.reporters = reporter.clone();
        }
        if let Some(threshold) = self.exit_threshold {
            config.command.exit_status_threshold = threshold;
        }
        if let Some(parallelism) = self.parallelism {
            config.command.parallelism = Some(parallelism.max(1));
        }
        if let Some(max) = self.max_batch_items {
            config.command.max_batch_items = Some(max);
        }
        if let Some(margin) = self.argument_size_margin {
            config.command.argument_size_margin = margin;
        }
        if let Some(timeout) = self.timeout {
            config.command.timeout_secs = Some(timeout);
        }
        self.refs.apply(config);
    }

    /// Whether file names should be read from stdin.
    pub fn files_from_stdin(&self) -> bool {
        self.files_from.as_deref().is_some_and(|p| p.as_os_str() == "-")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    fn analyze_args(args: &[&str]) -> AnalyzeArgs {
        match parse(args).command {
            Command::Analyze(a) => *a,
            other => panic!("expected analyze, got {other:?}"),
        }
    }

    #[test]
    fn parses_analyze_with_files() {
        let args = analyze_args(&[
            "batchlint", "analyze", "-c", "rubocop", "--arg", "--parallel", "--arg", "emacs",
            "--base", "main", "--head", "feature", "-j", "4", "a.rb", "b.rb",
        ]);
        assert_eq!(args.command.as_deref(), Some("rubocop"));
        assert_eq!(args.args, vec!["--parallel", "emacs"]);
        assert_eq!(args.refs.base.as_deref(), Some("main"));
        assert_eq!(args.parallelism, Some(4));
        assert_eq!(args.files, vec!["a.rb", "b.rb"]);
    }

    #[test]
    fn parses_format_names() {
        let args = analyze_args(&["batchlint", "analyze", "--format", "json-lines"]);
        assert_eq!(args.format, Some(ProblemFormat::JsonLines));
        let args = analyze_args(&["batchlint", "analyze", "--format", "jsonl"]);
        assert_eq!(args.format, Some(ProblemFormat::JsonLines));
        assert!(Cli::try_parse_from(["batchlint", "analyze", "--format", "xml"]).is_err());
    }

    #[test]
    fn flags_override_config() {
        let mut config = Config::default();
        config.command.program = Some("eslint".into());
        config.diff.base_ref = Some("develop".into());
        config.command.parallelism = Some(8);

        analyze_args(&[
            "batchlint", "analyze", "--command", "flake8", "--base", "main",
            "--exit-threshold", "2", "--reporter", "nop", "--timeout", "9",
        ])
        .apply(&mut config);

        assert_eq!(config.command.program.as_deref(), Some("flake8"));
        assert_eq!(config.diff.base_ref.as_deref(), Some("main"));
        assert_eq!(config.command.exit_status_threshold, 2);
        assert_eq!(config.command.parallelism, Some(8));
        assert_eq!(config.command.timeout_secs, Some(9));
        assert_eq!(config.report.reporters, "nop");
    }

    #[test]
    fn absent_flags_leave_config_alone() {
        let mut config = Config::default();
        config.command.args = vec!["--strict".into()];
        analyze_args(&["batchlint", "analyze"]).apply(&mut config);
        assert_eq!(config.command.args, vec!["--strict"]);
        assert_eq!(config.command.program, None);
    }

    #[test]
    fn files_from_dash_means_stdin() {
        assert!(analyze_args(&["batchlint", "analyze", "--files-from", "-"]).files_from_stdin());
        assert!(!analyze_args(&["batchlint", "analyze", "--files-from", "list.txt"]).files_from_stdin());
        assert!(!analyze_args(&["batchlint", "analyze"]).files_from_stdin());
    }

    #[test]
    fn parses_ranges_and_version() {
        match parse(&["batchlint", "ranges", "--base", "main", "--head", "topic"]).command {
            Command::Ranges(args) => {
                assert_eq!(args.refs.head.as_deref(), Some("topic"));
                assert_eq!(args.path, PathBuf::from("."));
            }
            other => panic!("expected ranges, got {other:?}"),
        }
        assert!(matches!(parse(&["batchlint", "version"]).command, Command::Version));
    }
}
