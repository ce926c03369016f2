//! Source-control capabilities.
//!
//! The orchestrator needs a handful of git primitives — create and push a
//! branch, probe a remote branch, reset the working tree, delete a branch,
//! list unstaged modifications. They are specified as a small capability
//! trait so tests can substitute an in-memory fake, with a production
//! implementation that shells out to the `git` binary.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

/// Errors raised by source-control operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ScmError {
    /// The git binary could not be spawned.
    #[error("failed to spawn git: {0}")]
    Spawn(String),

    /// A git command exited unsuccessfully.
    #[error("git {command} failed: {stderr}")]
    CommandFailed {
        /// The subcommand that failed.
        command: String,
        /// Trimmed stderr from git.
        stderr: String,
    },

    /// Command output was not valid UTF-8.
    #[error("git {command} produced non-UTF-8 output")]
    InvalidOutput {
        /// The subcommand involved.
        command: String,
    },
}

/// Source-control primitives the remediation run consumes.
#[async_trait]
pub trait SourceControl: Send + Sync {
    /// Creates a branch at the current HEAD, commits `paths` with
    /// `message`, and pushes it. Returns false when there was nothing to
    /// commit.
    ///
    /// # Errors
    ///
    /// Returns [`ScmError`] when any underlying git operation fails.
    async fn create_and_push_branch(
        &self,
        name: &str,
        message: &str,
        paths: &[PathBuf],
    ) -> Result<bool, ScmError>;

    /// Whether `name` exists on the default remote.
    ///
    /// # Errors
    ///
    /// Returns [`ScmError`] when the remote cannot be queried.
    async fn remote_branch_exists(&self, name: &str) -> Result<bool, ScmError>;

    /// Hard-resets the working tree to `base_branch` and removes untracked
    /// files.
    ///
    /// # Errors
    ///
    /// Returns [`ScmError`] when reset or clean fails.
    async fn reset_and_clean(&self, base_branch: &str) -> Result<(), ScmError>;

    /// Deletes a local branch, and its remote counterpart when
    /// `include_remote` is set. Missing branches are not an error.
    ///
    /// # Errors
    ///
    /// Returns [`ScmError`] when deletion fails for a reason other than
    /// the branch being absent.
    async fn delete_branch(&self, name: &str, include_remote: bool) -> Result<(), ScmError>;

    /// Paths with unstaged modifications in the working tree.
    ///
    /// # Errors
    ///
    /// Returns [`ScmError`] when the status listing fails.
    async fn unstaged_modified_files(&self) -> Result<Vec<PathBuf>, ScmError>;

    /// Rewrites the default remote's URL (used to refresh embedded
    /// credentials before a push).
    ///
    /// # Errors
    ///
    /// Returns [`ScmError`] when the remote cannot be updated.
    async fn set_remote_url(&self, url: &str) -> Result<(), ScmError>;
}

/// Production [`SourceControl`] backed by the `git` binary.
#[derive(Debug, Clone)]
pub struct GitCli {
    root: PathBuf,
    remote: String,
}

impl GitCli {
    /// Creates a git client rooted at `root`, using remote `origin`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            remote: "origin".to_string(),
        }
    }

    /// Overrides the remote name.
    #[must_use]
    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    async fn run(&self, args: &[&str]) -> Result<String, ScmError> {
        let command_name = args.first().copied().unwrap_or("git").to_string();
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.root)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| ScmError::Spawn(e.to_string()))?;

        if !output.status.success() {
            return Err(ScmError::CommandFailed {
                command: command_name,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        String::from_utf8(output.stdout).map_err(|_| ScmError::InvalidOutput {
            command: command_name,
        })
    }

    async fn run_allowing_failure(&self, args: &[&str]) -> Result<bool, ScmError> {
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.root)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| ScmError::Spawn(e.to_string()))?;
        Ok(output.status.success())
    }
}

#[async_trait]
impl SourceControl for GitCli {
    async fn create_and_push_branch(
        &self,
        name: &str,
        message: &str,
        paths: &[PathBuf],
    ) -> Result<bool, ScmError> {
        self.run(&["checkout", "-B", name]).await?;

        let mut add_args = vec!["add", "--"];
        let rendered: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
        add_args.extend(rendered.iter().map(String::as_str));
        self.run(&add_args).await?;

        // An empty diff produces a failing commit; report "nothing pushed"
        // rather than an error so the caller can treat it as a no-op.
        let staged_something = !self
            .run(&["diff", "--cached", "--name-only"])
            .await?
            .trim()
            .is_empty();
        if !staged_something {
            return Ok(false);
        }

        self.run(&["commit", "--no-verify", "-m", message]).await?;
        self.run(&["push", "--force", "--set-upstream", &self.remote, name])
            .await?;
        Ok(true)
    }

    async fn remote_branch_exists(&self, name: &str) -> Result<bool, ScmError> {
        let listing = self
            .run(&["ls-remote", "--heads", &self.remote, name])
            .await?;
        Ok(!listing.trim().is_empty())
    }

    async fn reset_and_clean(&self, base_branch: &str) -> Result<(), ScmError> {
        self.run(&["checkout", "--force", base_branch]).await?;
        self.run(&["reset", "--hard", &format!("{}/{base_branch}", self.remote)])
            .await?;
        self.run(&["clean", "-fd"]).await?;
        Ok(())
    }

    async fn delete_branch(&self, name: &str, include_remote: bool) -> Result<(), ScmError> {
        self.run_allowing_failure(&["branch", "-D", name]).await?;
        if include_remote {
            self.run_allowing_failure(&["push", &self.remote, "--delete", name])
                .await?;
        }
        Ok(())
    }

    async fn unstaged_modified_files(&self) -> Result<Vec<PathBuf>, ScmError> {
        let listing = self.run(&["diff", "--name-only"]).await?;
        Ok(listing
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(PathBuf::from)
            .collect())
    }

    async fn set_remote_url(&self, url: &str) -> Result<(), ScmError> {
        self.run(&["remote", "set-url", &self.remote, url]).await?;
        Ok(())
    }
}
