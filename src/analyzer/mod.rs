//! Static-analysis driver.
//!
//! Runs an analyzer over a stream of files in argument batches, parses its
//! output into problems, and reports the ones that land on lines changed
//! between two refs.

pub mod files;
pub mod format;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{Stream, StreamExt};
use thiserror::Error;

use crate::command::{Command, CommandError, SpawnOptions, StdinMode};
use crate::diff::DiffError;
use crate::diff::git::Git;
use crate::diff::paths::PathResolver;
use crate::diff::ranges::measure_change_ranges;
use crate::models::Statistic;
use crate::output::{Reporter, ReporterKind, build_reporter};
pub use format::{ProblemExtractor, ProblemFormat};

/// Errors from an analysis run.
#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error("no {0} ref given (set it in config, via the environment, or on the command line)")]
    MissingRef(&'static str),

    #[error("no analyzer command given")]
    MissingProgram,

    #[error(transparent)]
    Diff(#[from] DiffError),

    #[error("analyzer failed: {0}")]
    Command(#[from] CommandError),

    #[error("failed to write report: {0}")]
    Output(#[from] std::io::Error),
}

/// Everything needed to run one analysis.
#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    pub program: String,
    pub args: Vec<String>,
    pub format: ProblemFormat,
    pub reporters: Vec<ReporterKind>,
    pub base_ref: Option<String>,
    pub head_ref: Option<String>,
    /// Remote to fetch missing refs from. Detected from `git remote -v`
    /// when unset.
    pub remote: Option<String>,
    pub exit_status_threshold: i32,
    pub argument_size_margin: i64,
    pub parallelism: usize,
    pub max_batch_items: Option<usize>,
    pub timeout: Option<Duration>,
    pub cwd: PathBuf,
}

impl AnalyzeOptions {
    /// The batched analyzer command these options describe.
    pub fn command(&self) -> Command<ProblemExtractor> {
        Command::new(self.program.as_str(), self.args.iter().map(String::as_str))
            .extractor(ProblemExtractor::new(self.format))
            .options(SpawnOptions::default().cwd(&self.cwd).stdin(StdinMode::Null))
            .exit_status_threshold(self.exit_status_threshold)
            .argument_size_margin(self.argument_size_margin)
            .parallelism(self.parallelism)
            .max_batch_items(self.max_batch_items)
            .timeout(self.timeout)
    }
}

/// Result of an analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Analysis {
    pub statistic: Statistic,
    /// 1 when any problem was detected on a changed line, else 0.
    pub exit_code: i32,
}

/// Run `command` over `files` and feed every batch to `reporter`.
///
/// Batches are reported in submission order. Problems from a batch whose
/// exit status was rejected are still reported before the error returns.
pub async fn analyze<S, W>(
    command: &Command<ProblemExtractor>,
    files: S,
    reporter: &dyn Reporter,
    out: &mut W,
) -> Result<Analysis, AnalyzeError>
where
    S: Stream<Item = String> + Send + 'static,
    W: Write,
{
    let mut results = command.execute(files);
    let mut total = Statistic::default();

    while let Some(result) = results.next().await {
        let result = match result {
            Ok(result) => result,
            Err(e) => {
                out.flush()?;
                return Err(e.into());
            }
        };
        total = total + reporter.report(&result.values, result.batch.len(), out)?;
    }

    if total.detections > 0 {
        writeln!(out, "Detected {} issue(s).", total.detections)?;
    }
    out.flush()?;
    tracing::info!(
        problems = total.problems,
        detections = total.detections,
        files = total.files,
        "analysis finished"
    );

    Ok(Analysis {
        statistic: total,
        exit_code: if total.detections > 0 { 1 } else { 0 },
    })
}

/// Measure change ranges, build reporters, and analyze `files`.
pub async fn run<S, W>(options: &AnalyzeOptions, files: S, out: &mut W) -> Result<Analysis, AnalyzeError>
where
    S: Stream<Item = String> + Send + 'static,
    W: Write,
{
    if options.program.is_empty() {
        return Err(AnalyzeError::MissingProgram);
    }
    let base_ref = options.base_ref.as_deref().ok_or(AnalyzeError::MissingRef("base"))?;
    let head_ref = options.head_ref.as_deref().ok_or(AnalyzeError::MissingRef("head"))?;

    let git = Git::new(&options.cwd);
    let remote = match &options.remote {
        Some(remote) => Some(remote.clone()),
        None => git.default_remote().await,
    };
    let ranges = measure_change_ranges(&git, base_ref, head_ref, remote.as_deref()).await?;
    let resolver = PathResolver::discover(&git).await;
    let reporter = build_reporter(&options.reporters, Arc::new(ranges), resolver);

    analyze(&options.command(), files, reporter.as_ref(), out).await
}

#[cfg(all(test, unix))]
mod tests {
    use futures_util::stream;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::diff::git::test_repo::{git, init};
    use crate::diff::{ChangeRanges, LineRange};
    use crate::output::AnnotationReporter;

    fn files(names: &[&str]) -> impl Stream<Item = String> + Send + 'static {
        stream::iter(names.iter().map(|n| n.to_string()).collect::<Vec<_>>())
    }

    /// Prints a problem at lines 2 and 10 of every file it is given.
    fn fake_analyzer() -> Command<ProblemExtractor> {
        let script = r#"for f; do echo "$f:2:1: error: near change [E1]"; echo "$f:10: warning: far away"; done"#;
        Command::new("sh", ["-c", script, "sh"]).extractor(ProblemExtractor::new(ProblemFormat::Unix))
    }

    fn reporter() -> AnnotationReporter {
        let mut ranges = ChangeRanges::new();
        ranges.push("foo.txt", LineRange::new(1, 3));
        AnnotationReporter::new(Arc::new(ranges), PathResolver::new("/repo", ""))
    }

    #[tokio::test]
    async fn reports_problems_on_changed_lines_only() {
        let mut out = Vec::new();
        let analysis = analyze(&fake_analyzer(), files(&["foo.txt", "bar.txt"]), &reporter(), &mut out)
            .await
            .unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "[error] Detected `E1` problem at line 2, column 1 of foo.txt\tnear change\nDetected 1 issue(s).\n"
        );
        assert_eq!(analysis.exit_code, 1);
        assert_eq!(analysis.statistic, Statistic::new(4, 1, 2));
    }

    #[tokio::test]
    async fn clean_run_exits_zero_without_summary() {
        let mut out = Vec::new();
        let analysis = analyze(&fake_analyzer(), files(&["other.txt"]), &reporter(), &mut out)
            .await
            .unwrap();
        assert!(out.is_empty());
        assert_eq!(analysis.exit_code, 0);
        assert_eq!(analysis.statistic.problems, 2);
    }

    #[tokio::test]
    async fn statistics_sum_over_batches() {
        let command = fake_analyzer().max_batch_items(Some(1)).parallelism(2);
        let mut out = Vec::new();
        let analysis = analyze(&command, files(&["foo.txt", "a", "b"]), &reporter(), &mut out)
            .await
            .unwrap();
        assert_eq!(analysis.statistic, Statistic::new(6, 1, 3));
    }

    #[tokio::test]
    async fn problems_before_a_rejected_exit_are_still_reported() {
        let command = Command::new("sh", ["-c", "echo 'foo.txt:1: boom'; exit 3"])
            .extractor(ProblemExtractor::new(ProblemFormat::Unix))
            .exit_status_threshold(2);
        let mut out = Vec::new();
        let err = analyze(&command, stream::empty(), &reporter(), &mut out)
            .await
            .unwrap_err();

        assert!(
            matches!(err, AnalyzeError::Command(CommandError::NonZeroExit { status: 3 })),
            "got: {err}"
        );
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "[] Detected the problem at line 1 of foo.txt\tboom\n"
        );
    }

    #[tokio::test]
    async fn accepted_nonzero_exit_is_not_an_error() {
        let command = Command::new("sh", ["-c", "echo 'foo.txt:1: lint'; exit 1"])
            .extractor(ProblemExtractor::new(ProblemFormat::Unix))
            .exit_status_threshold(2);
        let mut out = Vec::new();
        let analysis = analyze(&command, stream::empty(), &reporter(), &mut out)
            .await
            .unwrap();
        assert_eq!(analysis.exit_code, 1);
    }

    fn options(cwd: &std::path::Path) -> AnalyzeOptions {
        AnalyzeOptions {
            program: "sh".into(),
            args: vec![
                "-c".into(),
                r#"for f; do echo "$f:2:3: error: two [X]"; echo "$f:1: note: one"; done"#.into(),
                "sh".into(),
            ],
            format: ProblemFormat::Unix,
            reporters: vec![ReporterKind::Annotation],
            base_ref: Some("main".into()),
            head_ref: Some("feature".into()),
            remote: None,
            exit_status_threshold: 1,
            argument_size_margin: 0,
            parallelism: 2,
            max_batch_items: None,
            timeout: None,
            cwd: cwd.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn runs_against_a_real_repository() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path();
        init(p).await;
        git(p, &["checkout", "-q", "-b", "feature"]).await;
        tokio::fs::write(p.join("file.txt"), "one\nTWO\nthree\n").await.unwrap();
        git(p, &["commit", "-q", "-am", "change"]).await;

        let mut out = Vec::new();
        let analysis = run(&options(p), files(&["file.txt"]), &mut out).await.unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "[error] Detected `X` problem at line 2, column 3 of file.txt\ttwo\nDetected 1 issue(s).\n"
        );
        assert_eq!(analysis.statistic, Statistic::new(2, 1, 1));
    }

    #[tokio::test]
    async fn missing_refs_are_reported_before_anything_runs() {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = options(dir.path());
        opts.head_ref = None;
        let err = run(&opts, stream::empty(), &mut Vec::new()).await.unwrap_err();
        assert!(matches!(err, AnalyzeError::MissingRef("head")), "got: {err}");

        opts.program.clear();
        let err = run(&opts, stream::empty(), &mut Vec::new()).await.unwrap_err();
        assert!(matches!(err, AnalyzeError::MissingProgram), "got: {err}");
    }
}
