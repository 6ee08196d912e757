//! Integration tests for problem filtering and the analysis driver.

use std::sync::Arc;

use batchlint::analyzer::{self, ProblemExtractor, ProblemFormat};
use batchlint::command::Command;
use batchlint::diff::paths::PathResolver;
use batchlint::diff::{ChangeRanges, LineRange};
use batchlint::models::{Problem, Statistic};
use batchlint::output::{AnnotationReporter, Reporter, ReporterKind, build_reporter};
use futures_util::stream;
use pretty_assertions::assert_eq;

fn ranges() -> Arc<ChangeRanges> {
    let mut ranges = ChangeRanges::new();
    ranges.push("foo.txt", LineRange::new(1, 3));
    Arc::new(ranges)
}

fn report(reporter: &dyn Reporter, problems: &[Problem]) -> (String, Statistic) {
    let mut out = Vec::new();
    let stat = reporter.report(problems, 1, &mut out).unwrap();
    (String::from_utf8(out).unwrap(), stat)
}

#[test]
fn problems_outside_change_ranges_are_suppressed() {
    let reporter = AnnotationReporter::new(ranges(), PathResolver::new("/repo", ""));
    let problems = [
        Problem::new("foo.txt", 2).severity("warning").code("W1").column(4).message("inside"),
        Problem::new("foo.txt", 10).severity("warning").code("W1").column(4).message("outside"),
    ];

    let (text, stat) = report(&reporter, &problems);
    assert_eq!(text, "[warning] Detected `W1` problem at line 2, column 4 of foo.txt\tinside\n");
    assert_eq!(stat, Statistic::new(2, 1, 1));
}

#[test]
fn nop_notation_prints_nothing() {
    let reporter = build_reporter(
        &ReporterKind::parse_notation("nop"),
        ranges(),
        PathResolver::new("/repo", ""),
    );
    let (text, stat) = report(reporter.as_ref(), &[Problem::new("foo.txt", 2)]);
    assert!(text.is_empty());
    assert_eq!(stat, Statistic::default());
}

#[test]
fn unknown_reporter_names_fall_back_to_annotation() {
    let reporter = build_reporter(
        &ReporterKind::parse_notation("checkstyle"),
        ranges(),
        PathResolver::new("/repo", ""),
    );
    assert_eq!(reporter.name(), "annotation");
}

#[cfg(unix)]
#[tokio::test]
async fn json_lines_analyzer_end_to_end() {
    let script = r#"for f; do printf '{"file":"%s","line":%d,"code":"J1","message":"m"}\n' "$f" 2; done"#;
    let command = Command::new("sh", ["-c", script, "sh"])
        .extractor(ProblemExtractor::new(ProblemFormat::JsonLines))
        .max_batch_items(Some(1));
    let reporter = AnnotationReporter::new(ranges(), PathResolver::new("/repo", ""));

    let mut out = Vec::new();
    let files = stream::iter(vec!["foo.txt".to_string(), "bar.txt".to_string()]);
    let analysis = analyzer::analyze(&command, files, &reporter, &mut out).await.unwrap();

    assert_eq!(
        String::from_utf8(out).unwrap(),
        "[] Detected `J1` problem at line 2 of foo.txt\tm\nDetected 1 issue(s).\n"
    );
    assert_eq!(analysis.exit_code, 1);
    assert_eq!(analysis.statistic, Statistic::new(2, 1, 2));
}
