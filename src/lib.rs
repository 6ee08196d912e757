//! batchlint library crate.
//!
//! Runs an external program over arbitrarily many arguments in batches
//! sized to the OS argument limit, and reports analyzer problems that
//! fall on lines changed between two git refs.

pub mod analyzer;
pub mod command;
pub mod config;
pub mod constants;
pub mod diff;
pub mod env;
pub mod models;
pub mod output;
