//! Problem records parsed from analyzer output.

use std::ops::Add;

use serde::{Deserialize, Deserializer, Serialize};

/// A single problem reported by a static analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    /// File path as printed by the analyzer (relative or absolute).
    pub file: String,
    /// 1-based line number.
    #[serde(deserialize_with = "number_or_string")]
    pub line: u32,
    #[serde(default, deserialize_with = "optional_number_or_string", skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Rule or check identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl Problem {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column: None,
            severity: None,
            message: None,
            code: None,
        }
    }

    pub fn column(mut self, column: u32) -> Self {
        self.column = Some(column);
        self
    }

    pub fn severity(mut self, severity: impl Into<String>) -> Self {
        self.severity = Some(severity.into());
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// Analyzers disagree on whether positions are numbers or strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum Position {
    Number(u32),
    Text(String),
}

impl Position {
    fn into_u32<E: serde::de::Error>(self) -> Result<u32, E> {
        match self {
            Position::Number(n) => Ok(n),
            Position::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("invalid position: {s:?}"))),
        }
    }
}

fn number_or_string<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    Position::deserialize(deserializer)?.into_u32()
}

fn optional_number_or_string<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Position>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Position::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(position) => position.into_u32().map(Some),
    }
}

/// Counts collected by a reporter for one or more batches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Statistic {
    /// Problems the analyzer reported.
    pub problems: usize,
    /// Problems that fell inside a change range and were reported.
    pub detections: usize,
    /// Files passed to the analyzer.
    pub files: usize,
}

impl Statistic {
    pub fn new(problems: usize, detections: usize, files: usize) -> Self {
        Self {
            problems,
            detections,
            files,
        }
    }
}

impl Add for Statistic {
    type Output = Statistic;

    fn add(self, other: Statistic) -> Statistic {
        Statistic {
            problems: self.problems + other.problems,
            detections: self.detections + other.detections,
            files: self.files + other.files,
        }
    }
}

impl std::iter::Sum for Statistic {
    fn sum<I: Iterator<Item = Statistic>>(iter: I) -> Statistic {
        iter.fold(Statistic::default(), Add::add)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_numeric_and_string_positions() {
        let a: Problem = serde_json::from_str(r#"{"file":"a.rb","line":3,"column":"7"}"#).unwrap();
        assert_eq!(a.line, 3);
        assert_eq!(a.column, Some(7));

        let b: Problem = serde_json::from_str(r#"{"file":"b.rb","line":"12"}"#).unwrap();
        assert_eq!(b.line, 12);
        assert_eq!(b.column, None);
    }

    #[test]
    fn empty_column_string_is_none() {
        let p: Problem = serde_json::from_str(r#"{"file":"a","line":1,"column":""}"#).unwrap();
        assert_eq!(p.column, None);
    }

    #[test]
    fn rejects_non_numeric_line() {
        let result: Result<Problem, _> = serde_json::from_str(r#"{"file":"a","line":"NaN"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn serializes_without_empty_fields() {
        let json = serde_json::to_string(&Problem::new("a.rs", 4).code("E1")).unwrap();
        assert_eq!(json, r#"{"file":"a.rs","line":4,"code":"E1"}"#);
    }

    #[test]
    fn statistics_add_up() {
        let total: Statistic = [Statistic::new(3, 1, 2), Statistic::new(4, 2, 5)]
            .into_iter()
            .sum();
        assert_eq!(total, Statistic::new(7, 3, 7));
    }
}
