//! Parser for `git diff -U0` output into per-file changed line ranges.
//!
//! Only `+++ ` file headers and `@@ … @@` hunk headers matter: with zero
//! context lines every hunk covers exactly the lines it changed.

use super::{ChangeRanges, LineRange};

/// Parse diff lines into the ranges of added or modified new-file lines.
///
/// Ranges are appended in encounter order and never merged or sorted.
pub fn parse_change_ranges<I, S>(lines: I) -> ChangeRanges
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut ranges = ChangeRanges::new();
    let mut current = String::new();

    for line in lines {
        let line = line.as_ref();
        if let Some(path) = file_header(line) {
            current = path.to_string();
        } else if is_hunk_header(line) {
            match parse_hunk_header(line) {
                Some(range) => {
                    tracing::trace!(file = %current, start = range.start, end = range.end, "hunk");
                    ranges.push(current.clone(), range);
                }
                None => tracing::debug!(line, "skipping malformed hunk header"),
            }
        }
    }

    ranges
}

/// Path of a `+++ <path>` line. The separator may be any whitespace.
fn file_header(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("+++")?;
    let mut chars = rest.chars();
    chars.next().filter(|c| c.is_whitespace())?;
    Some(chars.as_str())
}

fn is_hunk_header(line: &str) -> bool {
    line.strip_prefix("@@")
        .and_then(|rest| rest.chars().next())
        .is_some_and(char::is_whitespace)
}

/// New-side range of a `@@ -a,b +c,d @@ [section]` header.
///
/// The last space-separated token of the metadata is read as
/// `start[,count]`; `count` defaults to 1 and signs are ignored.
fn parse_hunk_header(line: &str) -> Option<LineRange> {
    let metadata = line.strip_prefix("@@ ")?;
    let end = metadata.find(" @@")?;
    let new_side = metadata[..end].rsplit(' ').next()?;

    let mut parts = new_side.split(',');
    let start = parse_number(parts.next()?)?;
    let count = match parts.next() {
        Some(count) => parse_number(count)?,
        None => 1,
    };

    Some(LineRange::new(start, start.checked_add(count)?.saturating_sub(1)))
}

fn parse_number(token: &str) -> Option<u32> {
    token.trim_start_matches(['+', '-']).parse().ok()
}
