//! batchlint: run a static analyzer in argument batches and report the
//! problems that land on changed lines.
//!
//! Entry point and error handling boundary. Uses `anyhow` for
//! ergonomic error propagation and user-facing messages.

mod cli;

use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result, bail};
use clap::Parser;
use futures_util::stream::{self, BoxStream, StreamExt};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use batchlint::analyzer::{self, files};
use batchlint::config::Config;
use batchlint::constants;
use batchlint::diff::git::Git;
use batchlint::diff::ranges::measure_change_ranges;
use batchlint::env::Env;
use cli::args::{AnalyzeArgs, Cli, Command, RangesArgs};

#[tokio::main]
async fn main() {
    init_tracing();
    match run().await {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("Error: {err:#}");
            process::exit(1);
        }
    }
}

/// Diagnostics go to stderr; stdout carries the report.
fn init_tracing() {
    let filter = EnvFilter::try_from_env(constants::ENV_LOG).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();

    match cli.command {
        Command::Analyze(args) => run_analyze(*args).await,
        Command::Ranges(args) => run_ranges(args).await,
        Command::Version => run_version(),
    }
}

fn run_version() -> Result<i32> {
    use colored::Colorize;

    println!("{} {}", constants::APP_NAME.bold(), constants::VERSION.green().bold());
    Ok(0)
}

fn working_directory(path: &Path) -> Result<PathBuf> {
    path.canonicalize()
        .with_context(|| format!("failed to resolve working directory {}", path.display()))
}

async fn run_analyze(args: AnalyzeArgs) -> Result<i32> {
    let cwd = working_directory(&args.path)?;
    let mut config = Config::load(Some(&cwd), &Env::real()).context("failed to load config")?;
    args.apply(&mut config);
    let options = config.analyze_options(&cwd);
    tracing::debug!(?options, "analyze options");

    let files = file_stream(&args).await?;
    let mut out = std::io::stdout().lock();
    let analysis = analyzer::run(&options, files, &mut out)
        .await
        .with_context(|| format!("analysis with `{}` failed", options.program))?;

    eprintln!("{}", cli::summary_line(&analysis.statistic));
    Ok(analysis.exit_code)
}

/// Positional files first, then any `--files-from` list.
async fn file_stream(args: &AnalyzeArgs) -> Result<BoxStream<'static, String>> {
    let positional = stream::iter(args.files.clone()).boxed();
    let Some(ref path) = args.files_from else {
        return Ok(positional);
    };

    let listed = if args.files_from_stdin() {
        files::file_list_stream(tokio::io::BufReader::new(tokio::io::stdin()))
    } else {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read file list {}", path.display()))?;
        stream::iter(files::split_file_list(&text)).boxed()
    };
    Ok(positional.chain(listed).boxed())
}

async fn run_ranges(args: RangesArgs) -> Result<i32> {
    let cwd = working_directory(&args.path)?;
    let mut config = Config::load(Some(&cwd), &Env::real()).context("failed to load config")?;
    args.refs.apply(&mut config);

    let (Some(base), Some(head)) = (config.diff.base_ref.as_deref(), config.diff.head_ref.as_deref()) else {
        bail!(
            "both refs are required: pass --base and --head or set {} and {}",
            constants::ENV_BASE_REF,
            constants::ENV_HEAD_REF
        );
    };

    let git = Git::new(&cwd);
    let remote = match config.diff.remote.clone() {
        Some(remote) => Some(remote),
        None => git.default_remote().await,
    };
    let ranges = measure_change_ranges(&git, base, head, remote.as_deref())
        .await
        .context("failed to measure change ranges")?;

    println!("{}", serde_json::to_string_pretty(&ranges)?);
    Ok(0)
}
