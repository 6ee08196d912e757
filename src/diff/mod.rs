//! Diff engine: git CLI wrapper, `-U0` hunk parsing, and change-range resolution.

pub mod git;
pub mod paths;
pub mod parser;
pub mod ranges;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::command::CommandError;

/// Errors from the diff engine.
#[derive(Error, Debug)]
pub enum DiffError {
    #[error("failed to resolve git ref `{0}`")]
    RefResolution(String),

    #[error("git command failed: {0}")]
    Git(#[from] CommandError),
}

/// Inclusive range of new-file line numbers touched by a hunk.
///
/// A pure-deletion hunk yields `end < start`, which contains no line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "[u32; 2]", from = "[u32; 2]")]
pub struct LineRange {
    pub start: u32,
    pub end: u32,
}

impl LineRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, line: u32) -> bool {
        self.start <= line && line <= self.end
    }
}

impl From<LineRange> for [u32; 2] {
    fn from(range: LineRange) -> Self {
        [range.start, range.end]
    }
}

impl From<[u32; 2]> for LineRange {
    fn from([start, end]: [u32; 2]) -> Self {
        Self { start, end }
    }
}

/// Changed line ranges per diff-relative file path, in diff order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeRanges(IndexMap<String, Vec<LineRange>>);

impl ChangeRanges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a range to `file`, keeping duplicates and encounter order.
    pub fn push(&mut self, file: impl Into<String>, range: LineRange) {
        self.0.entry(file.into()).or_default().push(range);
    }

    /// Ranges recorded for `file`, empty when the file was not changed.
    pub fn get(&self, file: &str) -> &[LineRange] {
        self.0.get(file).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether `line` of `file` lies inside any changed range.
    pub fn contains(&self, file: &str, line: u32) -> bool {
        self.get(file).iter().any(|range| range.contains(line))
    }

    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[LineRange])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ChangeRanges {
        let mut ranges = ChangeRanges::new();
        ranges.push("foo.txt", LineRange::new(1, 3));
        ranges.push("bar.txt", LineRange::new(7, 8));
        ranges.push("foo.txt", LineRange::new(20, 20));
        ranges
    }

    #[test]
    fn contains_checks_every_range_of_the_file() {
        let ranges = sample();
        assert!(ranges.contains("foo.txt", 2));
        assert!(ranges.contains("foo.txt", 20));
        assert!(!ranges.contains("foo.txt", 10));
        assert!(!ranges.contains("missing.txt", 1));
    }

    #[test]
    fn deletion_range_contains_nothing() {
        let range = LineRange::new(5, 4);
        assert!(!range.contains(4));
        assert!(!range.contains(5));
    }

    #[test]
    fn files_keep_insertion_order() {
        let ranges = sample();
        assert_eq!(ranges.files().collect::<Vec<_>>(), vec!["foo.txt", "bar.txt"]);
        assert_eq!(ranges.len(), 2);
    }

    #[test]
    fn serializes_as_nested_pairs() {
        let json = serde_json::to_string(&sample()).unwrap();
        assert_eq!(json, r#"{"foo.txt":[[1,3],[20,20]],"bar.txt":[[7,8]]}"#);
        let back: ChangeRanges = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sample());
    }
}
