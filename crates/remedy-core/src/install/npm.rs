//! npm collaborators.
//!
//! Spawns the npm binary for install, dry-run, and script execution, then
//! reads the resulting lockfile back into a tree.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::lockfile::parse_lockfile;
use super::{DependencyTreeProvider, InstallError, ScriptRunner};
use crate::tree::DependencyTree;

/// Arguments every npm invocation carries to stay quiet and fast.
const BASE_ARGS: &[&str] = &["--no-audit", "--no-fund", "--no-progress"];

async fn run_npm(bin: &str, project: &Path, args: &[&str]) -> Result<(), InstallError> {
    debug!(?args, project = %project.display(), "spawning npm");
    let output = Command::new(bin)
        .current_dir(project)
        .args(args)
        .args(BASE_ARGS)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(false)
        .output()
        .await
        .map_err(|e| InstallError::Spawn {
            program: bin.to_string(),
            message: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(InstallError::CommandFailed {
            program: bin.to_string(),
            subcommand: args.join(" "),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}

/// [`DependencyTreeProvider`] for npm projects.
#[derive(Debug, Clone)]
pub struct NpmProvider {
    bin: String,
}

impl NpmProvider {
    /// Uses the `npm` binary from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bin: "npm".to_string(),
        }
    }

    /// Overrides the npm binary path.
    #[must_use]
    pub fn with_binary(mut self, bin: impl Into<String>) -> Self {
        self.bin = bin.into();
        self
    }
}

impl Default for NpmProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DependencyTreeProvider for NpmProvider {
    async fn load(&self, project: &Path) -> Result<DependencyTree, InstallError> {
        parse_lockfile(project)
    }

    fn rollback_paths(&self, project: &Path) -> Vec<std::path::PathBuf> {
        vec![project.join("package-lock.json")]
    }

    async fn dry_run(&self, project: &Path, extra_args: &[String]) -> Result<(), InstallError> {
        let mut args = vec!["install", "--dry-run"];
        args.extend(extra_args.iter().map(String::as_str));
        run_npm(&self.bin, project, &args).await
    }

    async fn reify(
        &self,
        project: &Path,
        extra_args: &[String],
    ) -> Result<DependencyTree, InstallError> {
        let mut args = vec!["install"];
        args.extend(extra_args.iter().map(String::as_str));
        run_npm(&self.bin, project, &args).await?;
        parse_lockfile(project)
    }
}

/// [`ScriptRunner`] over `npm run`.
#[derive(Debug, Clone)]
pub struct NpmScriptRunner {
    bin: String,
}

impl NpmScriptRunner {
    /// Uses the `npm` binary from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bin: "npm".to_string(),
        }
    }
}

impl Default for NpmScriptRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScriptRunner for NpmScriptRunner {
    async fn run_script(&self, project: &Path, script: &str) -> Result<(), InstallError> {
        run_npm(&self.bin, project, &["run", script]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg_attr(miri, ignore)] // Miri can't spawn processes
    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let provider = NpmProvider::new().with_binary("definitely-not-npm-12345");
        let result = provider.dry_run(Path::new("."), &[]).await;
        assert!(matches!(result, Err(InstallError::Spawn { .. })));
    }

    #[tokio::test]
    async fn load_without_lockfile_is_missing() {
        let dir = tempfile::TempDir::new().unwrap();
        let provider = NpmProvider::new();
        let result = provider.load(dir.path()).await;
        assert!(matches!(result, Err(InstallError::LockfileMissing { .. })));
    }
}
