//! Splits a stream of arguments into batches that fit the byte budget.

use super::budget::size_of;

/// Stateful accumulator that cuts argument batches.
///
/// Each batch is sized so that `command + fixed args + batch args + margin`
/// stays within `budget`. An argument that alone exceeds the budget is
/// still emitted, in a batch of its own.
#[derive(Debug, Clone)]
pub struct ArgumentBatcher {
    budget: usize,
    initial_size: usize,
    max_items: Option<usize>,
    size: usize,
    batch: Vec<String>,
}

impl ArgumentBatcher {
    /// Create a batcher for `program` invoked with the fixed `args`.
    ///
    /// A negative `margin` is treated as zero.
    pub fn new(program: &str, args: &[String], margin: i64, budget: usize) -> Self {
        let initial_size = initial_size(program, args, margin);
        Self {
            budget,
            initial_size,
            max_items: None,
            size: initial_size,
            batch: Vec::new(),
        }
    }

    /// Cap the number of arguments per batch. `0` is treated as no cap.
    pub fn with_max_items(mut self, max_items: Option<usize>) -> Self {
        self.max_items = max_items.filter(|&n| n > 0);
        self
    }

    /// The byte budget this batcher enforces.
    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Size of an empty batch: program, fixed arguments and margin.
    pub fn initial_size(&self) -> usize {
        self.initial_size
    }

    /// Offer the next argument.
    ///
    /// Returns the previous batch when `arg` does not fit into it; `arg`
    /// then opens the next batch.
    pub fn offer(&mut self, arg: String) -> Option<Vec<String>> {
        let length = size_of(&arg);
        let overflows = length + self.size > self.budget;
        let full = self.max_items.is_some_and(|max| self.batch.len() >= max);

        let flushed = if !self.batch.is_empty() && (overflows || full) {
            self.size = self.initial_size;
            Some(std::mem::take(&mut self.batch))
        } else {
            None
        };

        self.batch.push(arg);
        self.size += length;
        flushed
    }

    /// Flush whatever is left once the input has ended.
    pub fn finish(&mut self) -> Option<Vec<String>> {
        self.size = self.initial_size;
        if self.batch.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.batch))
        }
    }
}

/// Byte size of the invariant part of every invocation.
fn initial_size(program: &str, args: &[String], margin: i64) -> usize {
    let margin = usize::try_from(margin.max(0)).unwrap_or(usize::MAX);
    args.iter()
        .map(|a| size_of(a))
        .fold(size_of(program), |acc, n| acc + n)
        .saturating_add(margin)
}
