//! Thin async seam over the `git` binary.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{Error, Result};

/// Runs git subcommands.
///
/// Implementations return stdout on success and a workspace error carrying
/// stderr otherwise.
#[async_trait]
pub trait Git: Send + Sync {
    /// Runs `git <args>` with `dir` as the working directory.
    async fn run(&self, dir: &Path, args: &[&str]) -> Result<String>;
}

#[async_trait]
impl<T: Git + ?Sized> Git for Arc<T> {
    async fn run(&self, dir: &Path, args: &[&str]) -> Result<String> {
        (**self).run(dir, args).await
    }
}

/// [`Git`] implementation that shells out to the installed `git` binary.
#[derive(Debug, Clone)]
pub struct SystemGit {
    binary: PathBuf,
}

impl Default for SystemGit {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemGit {
    /// Uses `git` from `PATH`.
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from("git"),
        }
    }

    /// Uses a specific git binary.
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl Git for SystemGit {
    async fn run(&self, dir: &Path, args: &[&str]) -> Result<String> {
        tracing::debug!(dir = ?dir, args = ?args, "running git");

        let output = Command::new(&self.binary)
            .current_dir(dir)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                Error::workspace_with(format!("failed to run git {}", args.join(" ")), e)
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::workspace(format!(
                "git {} failed: {}",
                args.join(" "),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    #[tokio::test]
    async fn failing_command_becomes_workspace_error() {
        let dir = TempDir::new().unwrap();
        let git = SystemGit::new();

        let err = git
            .run(dir.path(), &["rev-parse", "--verify", "does-not-exist"])
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Workspace);
        assert!(err.to_string().contains("git rev-parse"));
    }

    #[tokio::test]
    async fn missing_binary_becomes_workspace_error() {
        let dir = TempDir::new().unwrap();
        let git = SystemGit::with_binary("/nonexistent/git-binary");

        let err = git.run(dir.path(), &["status"]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Workspace);
    }
}
