//! CLI command definitions and argument parsing.
//!
//! Uses clap derive macros for ergonomic argument definitions.

pub mod args;

use colored::Colorize;

use batchlint::models::Statistic;

/// Human-readable summary of an analysis, for stderr.
pub fn summary_line(statistic: &Statistic) -> String {
    let scanned = format!(
        "{} problem(s) in {} file(s)",
        statistic.problems, statistic.files
    );
    if statistic.detections == 0 {
        format!("{} no issues on changed lines ({scanned})", "✔".green().bold())
    } else {
        format!(
            "{} {} on changed lines ({scanned})",
            "✖".red().bold(),
            format!("{} issue(s)", statistic.detections).red().bold()
        )
    }
}
