//! Annotation reporter: one line per problem inside a change range.
//!
//! Line format:
//!
//! ```text
//! [<severity>] Detected `<code>` problem at line <line>, column <column> of <file>\t<message>
//! ```
//!
//! Without a code the backquoted code reads `the`; without a column the
//! column clause is left out.

use std::io::{self, Write};
use std::sync::{Arc, LazyLock};

use regex::Regex;

use super::Reporter;
use crate::diff::ChangeRanges;
use crate::diff::paths::PathResolver;
use crate::models::{Problem, Statistic};

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Prints problems that touch changed lines; counts all of them.
#[derive(Debug, Clone)]
pub struct AnnotationReporter {
    ranges: Arc<ChangeRanges>,
    resolver: PathResolver,
}

impl AnnotationReporter {
    pub fn new(ranges: Arc<ChangeRanges>, resolver: PathResolver) -> Self {
        Self { ranges, resolver }
    }

    /// Render `problem` for the diff-relative path `file`.
    pub fn render(problem: &Problem, file: &str) -> String {
        let severity = collapse(problem.severity.as_deref().unwrap_or_default());
        let code = match problem.code.as_deref() {
            Some(code) => format!("`{}`", collapse(code)),
            None => "the".to_string(),
        };
        let column = problem
            .column
            .map(|c| format!(", column {c}"))
            .unwrap_or_default();
        let message = collapse(problem.message.as_deref().unwrap_or_default());
        format!(
            "[{severity}] Detected {code} problem at line {}{column} of {}\t{message}",
            problem.line,
            collapse(file),
        )
    }
}

impl Reporter for AnnotationReporter {
    fn name(&self) -> &'static str {
        "annotation"
    }

    fn report(&self, problems: &[Problem], files: usize, out: &mut dyn Write) -> io::Result<Statistic> {
        let mut detections = 0;
        for problem in problems {
            let file = self.resolver.resolve(&problem.file);
            if self.ranges.contains(&file, problem.line) {
                writeln!(out, "{}", Self::render(problem, &file))?;
                detections += 1;
            } else {
                tracing::trace!(file, line = problem.line, "outside change ranges");
            }
        }
        tracing::debug!(
            problems = problems.len(),
            detections,
            files,
            "batch reported"
        );
        Ok(Statistic::new(problems.len(), detections, files))
    }
}

fn collapse(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").into_owned()
}
