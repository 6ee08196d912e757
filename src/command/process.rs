//! Spawns one OS process per batch and collects what its extractor emits.
//!
//! Output is inherited from the parent unless the [`Extract`] implementation
//! asks to capture it, in which case the extractor receives the pipes and
//! runs concurrently with the child.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{ChildStderr, ChildStdout};
use tokio::sync::mpsc;

use super::CommandError;

/// How the child's stdin is wired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StdinMode {
    #[default]
    Inherit,
    Null,
}

/// Spawn options applied to every invocation of a command.
#[derive(Debug, Clone, Default)]
pub struct SpawnOptions {
    /// Working directory of the child.
    pub cwd: Option<PathBuf>,
    /// Variables added to (or overriding) the inherited environment.
    pub env: HashMap<String, String>,
    pub stdin: StdinMode,
    /// Discard stderr instead of inheriting it (ignored when captured).
    pub discard_stderr: bool,
}

impl SpawnOptions {
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn stdin(mut self, stdin: StdinMode) -> Self {
        self.stdin = stdin;
        self
    }

    pub fn discard_stderr(mut self) -> Self {
        self.discard_stderr = true;
        self
    }
}

/// Decides whether an exit status counts as success.
#[derive(Clone)]
pub enum ExitPolicy {
    /// Statuses strictly below the threshold succeed.
    Below(i32),
    Custom(Arc<dyn Fn(i32) -> bool + Send + Sync>),
}

impl ExitPolicy {
    /// Build a policy from an arbitrary predicate.
    pub fn custom(predicate: impl Fn(i32) -> bool + Send + Sync + 'static) -> Self {
        ExitPolicy::Custom(Arc::new(predicate))
    }

    pub fn accepts(&self, status: i32) -> bool {
        match self {
            ExitPolicy::Below(threshold) => status < *threshold,
            ExitPolicy::Custom(predicate) => predicate(status),
        }
    }
}

impl Default for ExitPolicy {
    fn default() -> Self {
        ExitPolicy::Below(1)
    }
}

impl fmt::Debug for ExitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitPolicy::Below(threshold) => f.debug_tuple("Below").field(threshold).finish(),
            ExitPolicy::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// I/O handles of a running child, as seen by an extractor.
///
/// `stdout`/`stderr` are only present when the extractor asked to capture
/// them.
#[derive(Debug)]
pub struct ProcessIo {
    pub program: String,
    pub args: Vec<String>,
    pub pid: Option<u32>,
    pub stdout: Option<ChildStdout>,
    pub stderr: Option<ChildStderr>,
}

/// Channel end an extractor pushes values into.
#[derive(Debug)]
pub struct Emitter<T> {
    tx: mpsc::UnboundedSender<T>,
}

impl<T> Emitter<T> {
    /// Emit one value. Values are delivered in emission order.
    pub fn emit(&self, value: T) {
        // The receiver lives until the process has been awaited.
        let _ = self.tx.send(value);
    }
}

/// Turns a running process into zero or more values.
#[async_trait]
pub trait Extract: Send + Sync + 'static {
    type Output: Send + 'static;

    /// Pipe stdout to the extractor instead of the parent's stdout.
    fn captures_stdout(&self) -> bool {
        false
    }

    /// Pipe stderr to the extractor instead of the parent's stderr.
    fn captures_stderr(&self) -> bool {
        false
    }

    /// Consume the child's output, emitting values as they are produced.
    ///
    /// Runs concurrently with the child; the process may still be running
    /// when the first value is emitted.
    async fn extract(&self, io: ProcessIo, emitter: Emitter<Self::Output>) -> std::io::Result<()>;
}

/// Extractor that produces nothing and leaves all output inherited.
#[derive(Debug, Clone, Copy, Default)]
pub struct Discard;

#[async_trait]
impl Extract for Discard {
    type Output = ();

    async fn extract(&self, _io: ProcessIo, _emitter: Emitter<()>) -> std::io::Result<()> {
        Ok(())
    }
}

/// Captures the whole of stdout as one lossy UTF-8 string.
#[derive(Debug, Clone, Copy, Default)]
pub struct CaptureText;

#[async_trait]
impl Extract for CaptureText {
    type Output = String;

    fn captures_stdout(&self) -> bool {
        true
    }

    async fn extract(&self, io: ProcessIo, emitter: Emitter<String>) -> std::io::Result<()> {
        let mut buf = Vec::new();
        if let Some(mut stdout) = io.stdout {
            stdout.read_to_end(&mut buf).await?;
        }
        emitter.emit(String::from_utf8_lossy(&buf).into_owned());
        Ok(())
    }
}

/// Emits every stdout line (without its terminator) as it arrives.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lines;

#[async_trait]
impl Extract for Lines {
    type Output = String;

    fn captures_stdout(&self) -> bool {
        true
    }

    async fn extract(&self, io: ProcessIo, emitter: Emitter<String>) -> std::io::Result<()> {
        let Some(stdout) = io.stdout else {
            return Ok(());
        };
        let mut reader = BufReader::new(stdout);
        let mut buf = Vec::new();
        while let Some(line) = read_line_lossy(&mut reader, &mut buf).await? {
            emitter.emit(line);
        }
        Ok(())
    }
}

/// Read one line, decoding invalid UTF-8 lossily.
///
/// The `\n` or `\r\n` terminator is stripped. Returns `None` at end of input.
pub async fn read_line_lossy<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    Ok(Some(String::from_utf8_lossy(buf).into_owned()))
}

/// A finished process, before the exit policy is applied.
#[derive(Debug)]
pub struct Execution<T> {
    /// Trailing arguments this run received.
    pub batch: Vec<String>,
    pub values: Vec<T>,
    pub exit_status: i32,
    pub accepted: bool,
}

/// Values and exit status of a process whose status was accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessResult<T> {
    /// Trailing arguments this run received.
    pub batch: Vec<String>,
    pub values: Vec<T>,
    pub exit_status: i32,
}

/// What a settled run means to the caller once the exit policy is applied.
#[derive(Debug)]
pub enum Outcome<T> {
    Accepted(ProcessResult<T>),
    /// Rejected after emitting values: surface them, then fail.
    Partial(ProcessResult<T>, CommandError),
    Rejected(CommandError),
}

impl<T> Execution<T> {
    /// Apply the exit policy.
    pub fn into_outcome(self) -> Outcome<T> {
        let result = ProcessResult {
            batch: self.batch,
            values: self.values,
            exit_status: self.exit_status,
        };
        if self.accepted {
            return Outcome::Accepted(result);
        }
        let err = CommandError::NonZeroExit {
            status: self.exit_status,
        };
        if result.values.is_empty() {
            Outcome::Rejected(err)
        } else {
            Outcome::Partial(result, err)
        }
    }
}

/// Spawns the configured program once per batch.
#[derive(Debug)]
pub struct ProcessExecutor<E> {
    program: String,
    args: Vec<String>,
    options: SpawnOptions,
    exit_policy: ExitPolicy,
    timeout: Option<Duration>,
    extractor: Arc<E>,
}

impl<E> Clone for ProcessExecutor<E> {
    fn clone(&self) -> Self {
        Self {
            program: self.program.clone(),
            args: self.args.clone(),
            options: self.options.clone(),
            exit_policy: self.exit_policy.clone(),
            timeout: self.timeout,
            extractor: Arc::clone(&self.extractor),
        }
    }
}

impl<E: Extract> ProcessExecutor<E> {
    pub fn new(
        program: String,
        args: Vec<String>,
        options: SpawnOptions,
        exit_policy: ExitPolicy,
        timeout: Option<Duration>,
        extractor: Arc<E>,
    ) -> Self {
        Self {
            program,
            args,
            options,
            exit_policy,
            timeout,
            extractor,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Run the program with the fixed arguments followed by `batch`.
    pub async fn run(&self, batch: Vec<String>) -> Result<Execution<E::Output>, CommandError> {
        let mut args = self.args.clone();
        args.extend(batch.iter().cloned());

        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&args);
        if let Some(ref cwd) = self.options.cwd {
            cmd.current_dir(cwd);
        }
        cmd.envs(&self.options.env);
        cmd.stdin(match self.options.stdin {
            StdinMode::Inherit => Stdio::inherit(),
            StdinMode::Null => Stdio::null(),
        });
        cmd.stdout(if self.extractor.captures_stdout() {
            Stdio::piped()
        } else {
            Stdio::inherit()
        });
        cmd.stderr(if self.extractor.captures_stderr() {
            Stdio::piped()
        } else if self.options.discard_stderr {
            Stdio::null()
        } else {
            Stdio::inherit()
        });

        let mut child = cmd.spawn().map_err(|source| CommandError::Spawn {
            program: self.program.clone(),
            source,
        })?;
        let pid = child.id();
        tracing::debug!(program = %self.program, pid, args = args.len(), "spawned");

        let io = ProcessIo {
            program: self.program.clone(),
            args,
            pid,
            stdout: child.stdout.take(),
            stderr: child.stderr.take(),
        };
        let (tx, mut rx) = mpsc::unbounded_channel();
        let extraction = self.extractor.extract(io, Emitter { tx });

        let finished = async { tokio::join!(extraction, child.wait()) };
        let (extracted, status) = match self.timeout {
            None => finished.await,
            Some(limit) => {
                let outcome = tokio::time::timeout(limit, finished).await;
                match outcome {
                    Ok(done) => done,
                    Err(_) => {
                        if let Err(e) = child.kill().await {
                            tracing::warn!(program = %self.program, error = %e, "failed to kill timed out process");
                        }
                        return Err(CommandError::Timeout {
                            program: self.program.clone(),
                            after: limit,
                        });
                    }
                }
            }
        };

        let status = status.map_err(|source| CommandError::Wait {
            program: self.program.clone(),
            source,
        })?;
        let Some(exit_status) = status.code() else {
            return Err(CommandError::Terminated {
                program: self.program.clone(),
            });
        };
        tracing::debug!(program = %self.program, pid, exit_status, "exited");

        let mut values = Vec::new();
        while let Ok(value) = rx.try_recv() {
            values.push(value);
        }

        let accepted = self.exit_policy.accepts(exit_status);
        if accepted {
            extracted.map_err(|source| CommandError::Extract {
                program: self.program.clone(),
                source,
            })?;
        } else if let Err(e) = extracted {
            tracing::debug!(program = %self.program, error = %e, "extraction failed on rejected run");
        }

        Ok(Execution {
            batch,
            values,
            exit_status,
            accepted,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn executor<E: Extract>(program: &str, args: &[&str], extractor: E) -> ProcessExecutor<E> {
        ProcessExecutor::new(
            program.to_string(),
            args.iter().map(|a| a.to_string()).collect(),
            SpawnOptions::default(),
            ExitPolicy::default(),
            None,
            Arc::new(extractor),
        )
    }

    #[test]
    fn default_policy_accepts_only_zero() {
        let policy = ExitPolicy::default();
        assert!(policy.accepts(0));
        assert!(!policy.accepts(1));
        assert!(!policy.accepts(2));
    }

    #[test]
    fn threshold_policy() {
        let policy = ExitPolicy::Below(2);
        assert!(policy.accepts(1));
        assert!(!policy.accepts(2));
    }

    #[test]
    fn custom_policy() {
        let policy = ExitPolicy::custom(|s| s == 0 || s == 3);
        assert!(policy.accepts(3));
        assert!(!policy.accepts(1));
        assert_eq!(format!("{policy:?}"), "Custom(..)");
    }

    #[tokio::test]
    async fn captures_stdout_text() {
        let exec = executor("echo", &["hello"], CaptureText);
        let result = exec.run(vec!["world".into()]).await.unwrap();
        assert!(result.accepted);
        assert_eq!(result.exit_status, 0);
        assert_eq!(result.values, vec!["hello world\n".to_string()]);
    }

    #[tokio::test]
    async fn lines_are_emitted_individually() {
        let exec = executor("printf", &["a\\nb\\nc\\n"], Lines);
        let result = exec.run(Vec::new()).await.unwrap();
        assert_eq!(result.values, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn spawn_failure_is_reported() {
        let exec = executor("batchlint-no-such-binary", &[], Discard);
        let err = exec.run(Vec::new()).await.unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }), "got: {err}");
    }

    #[tokio::test]
    async fn rejected_status_keeps_partial_values() {
        let exec = executor("sh", &["-c", "echo partial; exit 2"], CaptureText);
        let result = exec.run(Vec::new()).await.unwrap();
        assert!(!result.accepted);
        assert_eq!(result.exit_status, 2);
        assert_eq!(result.values, vec!["partial\n".to_string()]);
        match result.into_outcome() {
            Outcome::Partial(partial, CommandError::NonZeroExit { status: 2 }) => {
                assert_eq!(partial.values, vec!["partial\n".to_string()]);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn rejected_status_without_values_is_only_an_error() {
        let exec = executor("sh", &["-c", "exit 2"], Discard);
        let outcome = exec.run(Vec::new()).await.unwrap().into_outcome();
        assert!(matches!(
            outcome,
            Outcome::Rejected(CommandError::NonZeroExit { status: 2 })
        ));
    }

    #[tokio::test]
    async fn lines_decode_invalid_utf8_lossily() {
        let exec = executor("printf", &["caf\\351\\r\\nok\\nlast"], Lines);
        let result = exec.run(Vec::new()).await.unwrap();
        assert!(result.accepted);
        assert_eq!(result.values, vec!["caf\u{FFFD}", "ok", "last"]);
    }

    #[tokio::test]
    async fn custom_threshold_accepts_findings_status() {
        let exec = ProcessExecutor::new(
            "sh".into(),
            vec!["-c".into(), "exit 1".into()],
            SpawnOptions::default(),
            ExitPolicy::Below(2),
            None,
            Arc::new(Discard),
        );
        match exec.run(Vec::new()).await.unwrap().into_outcome() {
            Outcome::Accepted(result) => assert_eq!(result.exit_status, 1),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn options_apply_env_and_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let exec = ProcessExecutor::new(
            "sh".into(),
            vec!["-c".into(), "printf '%s:%s' \"$GREETING\" \"$(basename \"$PWD\")\"".into()],
            SpawnOptions::default()
                .cwd(dir.path())
                .env("GREETING", "hi")
                .stdin(StdinMode::Null),
            ExitPolicy::default(),
            None,
            Arc::new(CaptureText),
        );
        let result = exec.run(Vec::new()).await.unwrap();
        let name = dir.path().file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(result.values, vec![format!("hi:{name}")]);
    }

    #[tokio::test]
    async fn timeout_kills_the_child() {
        let exec = ProcessExecutor::new(
            "sleep".into(),
            vec!["5".into()],
            SpawnOptions::default(),
            ExitPolicy::default(),
            Some(Duration::from_millis(100)),
            Arc::new(Discard),
        );
        let err = exec.run(Vec::new()).await.unwrap_err();
        assert!(matches!(err, CommandError::Timeout { .. }), "got: {err}");
    }

    #[tokio::test]
    async fn signal_termination_is_an_error() {
        let exec = executor("sh", &["-c", "kill -9 $$"], Discard);
        let err = exec.run(Vec::new()).await.unwrap_err();
        assert!(matches!(err, CommandError::Terminated { .. }), "got: {err}");
    }
}
