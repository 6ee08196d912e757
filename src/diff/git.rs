//! Git CLI wrapper used for change-range resolution.
//!
//! Shells out to `git` through [`Command`], so every call gets the same
//! spawn, exit-status, and logging treatment as analyzer runs.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures_util::stream;

use super::DiffError;
use crate::command::{self, Command, Lines, SpawnOptions, StdinMode};

/// One line of `git remote -v`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remote {
    pub name: String,
    pub url: String,
    pub direction: Direction,
}

/// Whether a remote entry is used for fetching or pushing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Fetch,
    Push,
}

/// Version-control operations needed to compute change ranges.
#[async_trait]
pub trait Vcs: Send + Sync {
    async fn list_remotes(&self) -> Result<Vec<Remote>, DiffError>;

    /// Resolve `refspec` (or `remote/refspec`) to a commit id.
    ///
    /// Returns `None` when the ref is unknown.
    async fn parse_revision(&self, refspec: &str, remote: Option<&str>) -> Option<String>;

    async fn fetch_shallow(&self, remote: &str, refspec: &str, depth: u32) -> Result<(), DiffError>;

    /// Lines of a `-U0`, prefix-less, colorless diff of `other` against its
    /// merge base with `commit` (`commit...other`).
    async fn diff(&self, commit: &str, other: &str) -> Result<Vec<String>, DiffError>;
}

/// [`Vcs`] backed by the `git` executable.
#[derive(Debug, Clone)]
pub struct Git {
    repo_root: PathBuf,
}

impl Git {
    /// Operate on the repository containing `repo_root`.
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
        }
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    fn options(&self) -> SpawnOptions {
        SpawnOptions::default()
            .cwd(&self.repo_root)
            .stdin(StdinMode::Null)
    }

    fn command(&self, args: Vec<String>) -> Command {
        Command::new("git", args)
            .options(self.options())
            .parallelism(1)
    }

    /// Path from the working directory up to the repository root (`../../`).
    pub async fn show_cdup(&self) -> String {
        command::substitute("git", ["rev-parse", "--show-cdup"], self.options()).await
    }

    /// Path of the working directory relative to the repository root (`src/`).
    pub async fn show_prefix(&self) -> String {
        command::substitute("git", ["rev-parse", "--show-prefix"], self.options()).await
    }

    /// Pick the remote to fetch missing refs from.
    ///
    /// Prefers a fetch remote hosted on github.com, then any fetch remote.
    pub async fn default_remote(&self) -> Option<String> {
        let remotes = match self.list_remotes().await {
            Ok(remotes) => remotes,
            Err(e) => {
                tracing::debug!(error = %e, "could not list remotes");
                return None;
            }
        };
        let fetch: Vec<&Remote> = remotes
            .iter()
            .filter(|r| r.direction == Direction::Fetch)
            .collect();
        fetch
            .iter()
            .find(|r| r.url.contains("github.com"))
            .or_else(|| fetch.first())
            .map(|r| r.name.clone())
    }
}

#[async_trait]
impl Vcs for Git {
    async fn list_remotes(&self) -> Result<Vec<Remote>, DiffError> {
        let results = self
            .command(vec!["remote".into(), "-v".into()])
            .extractor(Lines)
            .collect(stream::empty())
            .await?;
        Ok(results
            .into_iter()
            .flat_map(|r| r.values)
            .filter_map(|line| parse_remote_line(&line))
            .collect())
    }

    async fn parse_revision(&self, refspec: &str, remote: Option<&str>) -> Option<String> {
        let revision = match remote {
            Some(remote) => format!("{remote}/{refspec}"),
            None => refspec.to_string(),
        };
        let sha = command::substitute(
            "git",
            ["rev-parse", "--verify", "-q", revision.as_str()],
            self.options(),
        )
        .await;
        let sha = sha.trim();
        (!sha.is_empty()).then(|| sha.to_string())
    }

    async fn fetch_shallow(&self, remote: &str, refspec: &str, depth: u32) -> Result<(), DiffError> {
        tracing::debug!(remote, refspec, depth, "shallow fetch");
        self.command(vec![
            "fetch".into(),
            "-q".into(),
            format!("--depth={depth}"),
            remote.into(),
            refspec.into(),
        ])
        .collect(stream::empty())
        .await?;
        Ok(())
    }

    async fn diff(&self, commit: &str, other: &str) -> Result<Vec<String>, DiffError> {
        let range = format!("{commit}...{other}");
        tracing::debug!(range = %range, "git diff");

        let results = self
            .command(
                [
                    "--no-pager",
                    "diff",
                    "--no-prefix",
                    "--no-color",
                    "-U0",
                    "--diff-filter=b",
                ]
                .map(String::from)
                .to_vec(),
            )
            .extractor(Lines)
            .collect(stream::iter([range]))
            .await?;
        Ok(results.into_iter().flat_map(|r| r.values).collect())
    }
}

/// Parse `origin\thttps://github.com/o/r.git (fetch)`.
fn parse_remote_line(line: &str) -> Option<Remote> {
    let (name, rest) = line.split_once('\t')?;
    let (url, direction) = rest.rsplit_once(' ')?;
    let direction = match direction {
        "(fetch)" => Direction::Fetch,
        "(push)" => Direction::Push,
        _ => return None,
    };
    Some(Remote {
        name: name.to_string(),
        url: url.to_string(),
        direction,
    })
}
