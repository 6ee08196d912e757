//! Mapping analyzer-reported paths onto diff-relative paths.
//!
//! Diff paths are relative to the repository root, while analyzers print
//! paths relative to their working directory (or absolute ones).

use std::path::{Component, Path, PathBuf};

use super::git::Git;

/// Resolves file paths to the form used as keys in [`super::ChangeRanges`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResolver {
    cwd: PathBuf,
    root: PathBuf,
}

impl PathResolver {
    /// `prefix` is the working directory relative to the repository root,
    /// as printed by `git rev-parse --show-prefix`.
    pub fn new(cwd: impl Into<PathBuf>, prefix: &str) -> Self {
        let cwd = normalize(&cwd.into());
        let depth = Path::new(prefix)
            .components()
            .filter(|c| matches!(c, Component::Normal(_)))
            .count();
        let mut root = cwd.clone();
        for _ in 0..depth {
            root.pop();
        }
        Self { cwd, root }
    }

    /// Resolver for the working directory of `git`.
    pub async fn discover(git: &Git) -> Self {
        let prefix = git.show_prefix().await;
        tracing::debug!(cwd = %git.repo_root().display(), prefix, "path resolver");
        Self::new(git.repo_root(), &prefix)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Diff-relative form of `file`, or `file` unchanged when it lies
    /// outside the repository.
    pub fn resolve(&self, file: &str) -> String {
        let path = Path::new(file);
        let full = if path.is_absolute() {
            normalize(path)
        } else {
            normalize(&self.cwd.join(path))
        };
        match full.strip_prefix(&self.root) {
            Ok(relative) => relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/"),
            Err(_) => file.to_string(),
        }
    }
}

/// Lexically remove `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}
