//! Package-manager collaborators.
//!
//! The engine never talks to a package manager directly; it goes through
//! [`DependencyTreeProvider`] (load/reify the installed tree) and
//! [`ScriptRunner`] (run the verification script). One implementation
//! exists per supported package manager, chosen at startup — no runtime
//! patching of anything. The dry-run-first behavior is an explicit
//! decorator, [`SafeReify`], wrapped around whichever provider is in use.

pub mod lockfile;
pub mod npm;
pub mod registry;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::tree::DependencyTree;

pub use npm::{NpmProvider, NpmScriptRunner};
pub use registry::{NpmRegistry, PackageRegistry, RegistryError};

/// Errors raised by install/test collaborators.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InstallError {
    /// The package-manager binary could not be spawned.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Binary that failed to start.
        program: String,
        /// OS-level failure description.
        message: String,
    },

    /// The package-manager command exited unsuccessfully.
    #[error("{program} {subcommand} failed: {stderr}")]
    CommandFailed {
        /// Binary that ran.
        program: String,
        /// Subcommand that failed.
        subcommand: String,
        /// Trimmed stderr.
        stderr: String,
    },

    /// No lockfile was present after install.
    #[error("lockfile not found at {path}")]
    LockfileMissing {
        /// Expected lockfile path.
        path: PathBuf,
    },

    /// The lockfile did not parse.
    #[error("lockfile parse failure at {path}: {message}")]
    LockfileParse {
        /// Lockfile path.
        path: PathBuf,
        /// Parse failure description.
        message: String,
    },
}

/// Loads and reifies installed dependency trees for one package manager.
#[async_trait]
pub trait DependencyTreeProvider: Send + Sync {
    /// Reads the tree currently on disk without touching it.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError`] when no tree can be read.
    async fn load(&self, project: &Path) -> Result<DependencyTree, InstallError>;

    /// Manifest-derived files (lockfiles) that must be captured alongside
    /// a manifest snapshot for an edit to be fully reversible.
    fn rollback_paths(&self, project: &Path) -> Vec<PathBuf>;

    /// Validates that an install would succeed without mutating anything.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError`] when the dry run fails.
    async fn dry_run(&self, project: &Path, extra_args: &[String]) -> Result<(), InstallError>;

    /// Runs a real install and returns the resulting tree. Idempotent —
    /// callers invoke it for the initial load and after every manifest
    /// edit.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError`] when install or the post-install load
    /// fails.
    async fn reify(
        &self,
        project: &Path,
        extra_args: &[String],
    ) -> Result<DependencyTree, InstallError>;
}

/// Runs package scripts (the test hook).
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    /// Runs the named script; pass/fail only, no output contract.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError`] when the script cannot run or exits
    /// unsuccessfully.
    async fn run_script(&self, project: &Path, script: &str) -> Result<(), InstallError>;
}

/// Dry-run-first decorator over any [`DependencyTreeProvider`].
///
/// Every reify is preceded by a dry run of the same arguments, so a
/// manifest edit that cannot resolve is rejected before the working tree
/// is touched.
pub struct SafeReify {
    inner: Arc<dyn DependencyTreeProvider>,
}

impl SafeReify {
    /// Wraps a provider.
    #[must_use]
    pub fn new(inner: Arc<dyn DependencyTreeProvider>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl DependencyTreeProvider for SafeReify {
    async fn load(&self, project: &Path) -> Result<DependencyTree, InstallError> {
        self.inner.load(project).await
    }

    fn rollback_paths(&self, project: &Path) -> Vec<PathBuf> {
        self.inner.rollback_paths(project)
    }

    async fn dry_run(&self, project: &Path, extra_args: &[String]) -> Result<(), InstallError> {
        self.inner.dry_run(project, extra_args).await
    }

    async fn reify(
        &self,
        project: &Path,
        extra_args: &[String],
    ) -> Result<DependencyTree, InstallError> {
        self.inner.dry_run(project, extra_args).await?;
        self.inner.reify(project, extra_args).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Provider that records call order.
    #[derive(Default)]
    struct RecordingProvider {
        calls: Mutex<Vec<&'static str>>,
        fail_dry_run: bool,
    }

    #[async_trait]
    impl DependencyTreeProvider for RecordingProvider {
        async fn load(&self, _project: &Path) -> Result<DependencyTree, InstallError> {
            self.calls.lock().unwrap().push("load");
            Ok(DependencyTree::new())
        }

        fn rollback_paths(&self, _project: &Path) -> Vec<PathBuf> {
            Vec::new()
        }

        async fn dry_run(
            &self,
            _project: &Path,
            _extra_args: &[String],
        ) -> Result<(), InstallError> {
            self.calls.lock().unwrap().push("dry_run");
            if self.fail_dry_run {
                return Err(InstallError::CommandFailed {
                    program: "npm".to_string(),
                    subcommand: "install --dry-run".to_string(),
                    stderr: "conflict".to_string(),
                });
            }
            Ok(())
        }

        async fn reify(
            &self,
            _project: &Path,
            _extra_args: &[String],
        ) -> Result<DependencyTree, InstallError> {
            self.calls.lock().unwrap().push("reify");
            Ok(DependencyTree::new())
        }
    }

    #[tokio::test]
    async fn safe_reify_dry_runs_before_installing() {
        let inner = Arc::new(RecordingProvider::default());
        let safe = SafeReify::new(Arc::clone(&inner) as Arc<dyn DependencyTreeProvider>);

        safe.reify(Path::new("."), &[]).await.unwrap();
        assert_eq!(*inner.calls.lock().unwrap(), vec!["dry_run", "reify"]);
    }

    #[tokio::test]
    async fn failed_dry_run_gates_the_real_install() {
        let inner = Arc::new(RecordingProvider {
            fail_dry_run: true,
            ..RecordingProvider::default()
        });
        let safe = SafeReify::new(Arc::clone(&inner) as Arc<dyn DependencyTreeProvider>);

        assert!(safe.reify(Path::new("."), &[]).await.is_err());
        assert_eq!(*inner.calls.lock().unwrap(), vec!["dry_run"]);
    }
}
