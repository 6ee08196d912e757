//! Parsers for analyzer output.

use std::fmt;
use std::sync::LazyLock;

use async_trait::async_trait;
use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::io::BufReader;

use crate::command::{Emitter, Extract, ProcessIo, read_line_lossy};
use crate::models::Problem;

static UNIX_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        ^(?P<file>(?:[A-Za-z]:)?[^:]+)
        :(?P<line>\d+)
        (?::(?P<column>\d+))?
        :\s*
        (?:(?P<severity>(?i:fatal|error|warning|warn|info|note|hint|convention|refactor)):\s+)?
        (?P<message>.*?)
        (?:\s+\[(?P<code>[^\]\s]+)\])?
        \s*$",
    )
    .unwrap()
});

/// Output format an analyzer prints its problems in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ProblemFormat {
    /// `file:line[:column]: [severity: ]message [code]`, as printed by
    /// compilers and most linters.
    #[default]
    Unix,
    /// One JSON object per line with `file`, `line` and optional
    /// `column`, `severity`, `message` and `code` fields.
    #[serde(alias = "jsonl")]
    #[value(alias = "jsonl")]
    JsonLines,
}

impl fmt::Display for ProblemFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProblemFormat::Unix => write!(f, "unix"),
            ProblemFormat::JsonLines => write!(f, "json-lines"),
        }
    }
}

impl ProblemFormat {
    /// Parse one line of analyzer output. Lines that are not problems
    /// yield `None`.
    pub fn parse_line(&self, line: &str) -> Option<Problem> {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            return None;
        }
        match self {
            ProblemFormat::Unix => parse_unix(line),
            ProblemFormat::JsonLines => match serde_json::from_str(line) {
                Ok(problem) => Some(problem),
                Err(e) => {
                    tracing::debug!(line, error = %e, "not a problem record");
                    None
                }
            },
        }
    }
}

fn parse_unix(line: &str) -> Option<Problem> {
    let caps = UNIX_LINE.captures(line)?;
    let mut problem = Problem::new(caps["file"].trim(), caps["line"].parse().ok()?);
    if let Some(column) = caps.name("column") {
        problem.column = column.as_str().parse().ok();
    }
    if let Some(severity) = caps.name("severity") {
        problem.severity = Some(severity.as_str().to_lowercase());
    }
    let message = caps["message"].trim();
    if !message.is_empty() {
        problem.message = Some(message.to_string());
    }
    problem.code = caps.name("code").map(|c| c.as_str().to_string());
    Some(problem)
}

/// Reads an analyzer's stdout line by line and emits parsed problems.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProblemExtractor {
    format: ProblemFormat,
}

impl ProblemExtractor {
    pub fn new(format: ProblemFormat) -> Self {
        Self { format }
    }
}

#[async_trait]
impl Extract for ProblemExtractor {
    type Output = Problem;

    fn captures_stdout(&self) -> bool {
        true
    }

    async fn extract(&self, io: ProcessIo, emitter: Emitter<Problem>) -> std::io::Result<()> {
        let Some(stdout) = io.stdout else {
            return Ok(());
        };
        let mut reader = BufReader::new(stdout);
        let mut buf = Vec::new();
        let mut skipped = 0usize;
        while let Some(line) = read_line_lossy(&mut reader, &mut buf).await? {
            match self.format.parse_line(&line) {
                Some(problem) => emitter.emit(problem),
                None => skipped += 1,
            }
        }
        tracing::debug!(program = %io.program, pid = io.pid, skipped, "analyzer output read");
        Ok(())
    }
}
