//! Shared types used across modules.
//!
//! Analyzer output is normalised into [`Problem`] records; reporters
//! summarise what they saw as a [`Statistic`].

pub mod problem;

pub use problem::{Problem, Statistic};
