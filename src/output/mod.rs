//! Reporters: turn analyzer problems into output and statistics.
//!
//! Every batch's problems are handed to one [`Reporter`]. Several
//! reporters are combined with [`Multicaster`], which fans problems out
//! and sums the returned [`Statistic`]s.

pub mod annotation;
pub mod nop;

use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

use crate::diff::ChangeRanges;
use crate::diff::paths::PathResolver;
use crate::models::{Problem, Statistic};

pub use annotation::AnnotationReporter;
pub use nop::NopReporter;

/// Consumes the problems of one batch.
pub trait Reporter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Report `problems` found while analyzing `files` files.
    fn report(&self, problems: &[Problem], files: usize, out: &mut dyn Write) -> io::Result<Statistic>;
}

/// Fans every batch out to several reporters.
pub struct Multicaster {
    reporters: Vec<Box<dyn Reporter>>,
}

impl Multicaster {
    pub fn new(reporters: Vec<Box<dyn Reporter>>) -> Self {
        Self { reporters }
    }
}

impl Reporter for Multicaster {
    fn name(&self) -> &'static str {
        "multicaster"
    }

    fn report(&self, problems: &[Problem], files: usize, out: &mut dyn Write) -> io::Result<Statistic> {
        let mut total = Statistic::default();
        for reporter in &self.reporters {
            total = total + reporter.report(problems, files, out)?;
        }
        Ok(total)
    }
}

/// Reporter names accepted in a reporter notation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReporterKind {
    #[default]
    Annotation,
    Nop,
}

impl fmt::Display for ReporterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReporterKind::Annotation => write!(f, "annotation"),
            ReporterKind::Nop => write!(f, "nop"),
        }
    }
}

impl std::str::FromStr for ReporterKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "annotation" | "annotationreporter" => Ok(ReporterKind::Annotation),
            "nop" | "nopreporter" => Ok(ReporterKind::Nop),
            other => Err(format!("unknown reporter: '{other}'. Supported: annotation, nop")),
        }
    }
}

impl ReporterKind {
    /// Parse a comma-separated reporter list such as `annotation,nop`.
    ///
    /// Empty or unknown names fall back to the annotation reporter, so the
    /// result always has at least one entry.
    pub fn parse_notation(notation: &str) -> Vec<ReporterKind> {
        notation
            .split(',')
            .map(|name| {
                if name.trim().is_empty() {
                    return ReporterKind::default();
                }
                name.parse().unwrap_or_else(|e: String| {
                    tracing::warn!(reporter = name, error = %e, "falling back to annotation reporter");
                    ReporterKind::default()
                })
            })
            .collect()
    }

    fn build(self, ranges: &Arc<ChangeRanges>, resolver: &PathResolver) -> Box<dyn Reporter> {
        match self {
            ReporterKind::Annotation => Box::new(AnnotationReporter::new(Arc::clone(ranges), resolver.clone())),
            ReporterKind::Nop => Box::new(NopReporter),
        }
    }
}

/// Build the reporter for `kinds`, wrapping several in a [`Multicaster`].
pub fn build_reporter(
    kinds: &[ReporterKind],
    ranges: Arc<ChangeRanges>,
    resolver: PathResolver,
) -> Box<dyn Reporter> {
    match kinds {
        [] => ReporterKind::default().build(&ranges, &resolver),
        [one] => one.build(&ranges, &resolver),
        many => Box::new(Multicaster::new(
            many.iter().map(|kind| kind.build(&ranges, &resolver)).collect(),
        )),
    }
}
