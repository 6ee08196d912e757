//! Argument-batching command executor.
//!
//! A [`Command`] runs one external program over an arbitrarily long,
//! possibly asynchronous, stream of trailing arguments. Arguments are cut
//! into batches that fit the OS argument limit ([`budget`], [`batcher`]),
//! each batch is spawned as its own process ([`process`]), and at most
//! `parallelism` processes run at a time. Per-batch results are yielded in
//! submission order.

pub mod batcher;
pub mod budget;
pub mod process;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::env::Env;
use batcher::ArgumentBatcher;
use budget::Platform;
pub use process::{
    CaptureText, Discard, Emitter, Execution, ExitPolicy, Extract, Lines, Outcome,
    ProcessExecutor, ProcessIo, ProcessResult, SpawnOptions, StdinMode, read_line_lossy,
};

/// Errors from spawning or running a batch.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("command exited with status {status}")]
    NonZeroExit { status: i32 },

    #[error("`{program}` was terminated by a signal")]
    Terminated { program: String },

    #[error("`{program}` timed out after {:.1}s", .after.as_secs_f64())]
    Timeout { program: String, after: Duration },

    #[error("failed to wait for `{program}`: {source}")]
    Wait {
        program: String,
        source: std::io::Error,
    },

    #[error("failed to read output of `{program}`: {source}")]
    Extract {
        program: String,
        source: std::io::Error,
    },

    #[error("batch task failed: {0}")]
    Join(String),
}

/// Stream of per-batch results returned by [`Command::execute`].
pub type ResultStream<T> = BoxStream<'static, Result<ProcessResult<T>, CommandError>>;

/// Default number of concurrently running processes.
pub fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// An external program plus everything needed to run it in batches.
#[derive(Debug, Clone)]
pub struct Command<E = Discard> {
    program: String,
    args: Vec<String>,
    options: SpawnOptions,
    exit_policy: ExitPolicy,
    extractor: Arc<E>,
    margin: i64,
    max_batch_items: Option<usize>,
    timeout: Option<Duration>,
    byte_budget: Option<usize>,
    env: Env,
    /// Maximum number of processes running at once. Values below 1 act as 1.
    pub parallelism: usize,
}

impl Command<Discard> {
    /// Create a command whose output is inherited and produces no values.
    pub fn new(
        program: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            options: SpawnOptions::default(),
            exit_policy: ExitPolicy::default(),
            extractor: Arc::new(Discard),
            margin: 0,
            max_batch_items: None,
            timeout: None,
            byte_budget: None,
            env: Env::real(),
            parallelism: default_parallelism(),
        }
    }
}

impl<E: Extract> Command<E> {
    /// Replace the extractor, changing the result value type.
    pub fn extractor<F: Extract>(self, extractor: F) -> Command<F> {
        Command {
            program: self.program,
            args: self.args,
            options: self.options,
            exit_policy: self.exit_policy,
            extractor: Arc::new(extractor),
            margin: self.margin,
            max_batch_items: self.max_batch_items,
            timeout: self.timeout,
            byte_budget: self.byte_budget,
            env: self.env,
            parallelism: self.parallelism,
        }
    }

    pub fn options(mut self, options: SpawnOptions) -> Self {
        self.options = options;
        self
    }

    pub fn exit_policy(mut self, policy: ExitPolicy) -> Self {
        self.exit_policy = policy;
        self
    }

    /// Accept exit statuses strictly below `threshold`.
    pub fn exit_status_threshold(self, threshold: i32) -> Self {
        self.exit_policy(ExitPolicy::Below(threshold))
    }

    /// Extra bytes reserved per invocation. Negative values count as zero.
    pub fn argument_size_margin(mut self, margin: i64) -> Self {
        self.margin = margin;
        self
    }

    pub fn parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Cap the number of trailing arguments per invocation.
    pub fn max_batch_items(mut self, max: Option<usize>) -> Self {
        self.max_batch_items = max;
        self
    }

    /// Kill and fail any invocation running longer than `timeout`.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the argument byte budget computed from the platform.
    pub fn byte_budget(mut self, budget: Option<usize>) -> Self {
        self.byte_budget = budget;
        self
    }

    /// Environment used to size the argument budget.
    pub fn env(mut self, env: Env) -> Self {
        self.env = env;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Effective argument byte budget for this command.
    pub fn max_argument_bytes(&self) -> usize {
        self.byte_budget
            .unwrap_or_else(|| budget::max_argument_bytes(Platform::current(), &self.env))
    }

    fn batcher(&self) -> ArgumentBatcher {
        ArgumentBatcher::new(&self.program, &self.args, self.margin, self.max_argument_bytes())
            .with_max_items(self.max_batch_items)
    }

    fn executor(&self) -> ProcessExecutor<E> {
        ProcessExecutor::new(
            self.program.clone(),
            self.args.clone(),
            self.options.clone(),
            self.exit_policy.clone(),
            self.timeout,
            Arc::clone(&self.extractor),
        )
    }

    /// Run the command over `args`, yielding one result per batch.
    ///
    /// Results arrive in submission order. The stream ends after the first
    /// error; batches already running are left to finish on their own and
    /// are not awaited. When a batch exits with a rejected status, values
    /// it already produced are yielded before the error.
    pub fn execute<S>(&self, args: S) -> ResultStream<E::Output>
    where
        S: Stream<Item = String> + Send + 'static,
    {
        let drive = Drive {
            input: Some(args.boxed()),
            batcher: self.batcher(),
            executor: Arc::new(self.executor()),
            parallelism: self.parallelism.max(1),
            queued: Vec::new(),
            draining: VecDeque::new(),
            pending_error: None,
            launched: 0,
            failed: false,
        };
        tracing::debug!(
            program = %self.program,
            budget = drive.batcher.budget(),
            parallelism = drive.parallelism,
            "executing"
        );
        stream::unfold(drive, Drive::step).boxed()
    }

    /// Run the command once with only its fixed arguments.
    pub fn run_once(&self) -> ResultStream<E::Output> {
        self.execute(stream::empty())
    }

    /// Run over `args` and collect every batch result, failing on the first error.
    pub async fn collect<S>(&self, args: S) -> Result<Vec<ProcessResult<E::Output>>, CommandError>
    where
        S: Stream<Item = String> + Send + 'static,
    {
        let mut results = self.execute(args);
        let mut collected = Vec::new();
        while let Some(result) = results.next().await {
            collected.push(result?);
        }
        Ok(collected)
    }
}

/// Run `program` once and return its stdout with trailing newlines trimmed.
///
/// Any failure (spawn error, rejected status) yields an empty string.
/// stderr is discarded.
pub async fn substitute(
    program: &str,
    args: impl IntoIterator<Item = impl Into<String>>,
    options: SpawnOptions,
) -> String {
    let command = Command::new(program, args)
        .options(options.discard_stderr())
        .extractor(CaptureText);
    match command.collect(stream::empty()).await {
        Ok(results) => {
            let text: String = results.into_iter().flat_map(|r| r.values).collect();
            trim_trailing_newlines(&text).to_string()
        }
        Err(e) => {
            tracing::debug!(program, error = %e, "substitution failed");
            String::new()
        }
    }
}

/// Strip a trailing run of `\r\n` pairs, or else a trailing run of `\n`.
fn trim_trailing_newlines(text: &str) -> &str {
    if text.ends_with("\r\n") {
        let mut rest = text;
        while let Some(stripped) = rest.strip_suffix("\r\n") {
            rest = stripped;
        }
        rest
    } else {
        text.trim_end_matches('\n')
    }
}

type Task<T> = JoinHandle<Result<Execution<T>, CommandError>>;

/// Driver state behind the stream returned by [`Command::execute`].
struct Drive<E: Extract> {
    input: Option<BoxStream<'static, String>>,
    batcher: ArgumentBatcher,
    executor: Arc<ProcessExecutor<E>>,
    parallelism: usize,
    queued: Vec<Task<E::Output>>,
    draining: VecDeque<Task<E::Output>>,
    pending_error: Option<CommandError>,
    launched: usize,
    failed: bool,
}

impl<E: Extract> Drive<E> {
    async fn step(mut self) -> Option<(Result<ProcessResult<E::Output>, CommandError>, Self)> {
        loop {
            if self.failed {
                return None;
            }
            if let Some(err) = self.pending_error.take() {
                self.failed = true;
                return Some((Err(err), self));
            }
            if let Some(task) = self.draining.pop_front() {
                let item = self.settle(task).await;
                return Some((item, self));
            }

            let input = self.input.as_mut()?;
            match input.next().await {
                Some(arg) => {
                    if let Some(batch) = self.batcher.offer(arg) {
                        self.launch(batch);
                    }
                }
                None => {
                    self.input = None;
                    match self.batcher.finish() {
                        Some(batch) => self.launch(batch),
                        None if self.launched == 0 => self.launch(Vec::new()),
                        None => {}
                    }
                    self.drain();
                }
            }
        }
    }

    /// Spawn a batch; drain the queue once it holds `parallelism` tasks.
    fn launch(&mut self, batch: Vec<String>) {
        let executor = Arc::clone(&self.executor);
        self.launched += 1;
        tracing::debug!(
            task = self.launched,
            program = executor.program(),
            arguments = batch.len(),
            "launching batch"
        );
        self.queued
            .push(tokio::spawn(async move { executor.run(batch).await }));
        if self.queued.len() >= self.parallelism {
            self.drain();
        }
    }

    fn drain(&mut self) {
        tracing::debug!(tasks = self.queued.len(), "draining");
        self.draining.extend(self.queued.drain(..));
    }

    async fn settle(&mut self, task: Task<E::Output>) -> Result<ProcessResult<E::Output>, CommandError> {
        let execution = match task.await {
            Ok(Ok(execution)) => execution,
            Ok(Err(e)) => {
                self.failed = true;
                return Err(e);
            }
            Err(e) => {
                self.failed = true;
                return Err(CommandError::Join(e.to_string()));
            }
        };

        match execution.into_outcome() {
            Outcome::Accepted(result) => Ok(result),
            Outcome::Partial(partial, err) => {
                self.pending_error = Some(err);
                Ok(partial)
            }
            Outcome::Rejected(err) => {
                self.failed = true;
                Err(err)
            }
        }
    }
}
