//! The remediation orchestrator.
//!
//! One run: load the installed tree, look up alerts, then walk the planned
//! attempts in order. Per attempt — resolve a target version, skip
//! duplicates, edit the manifest, reinstall (and optionally test), and in
//! unattended runs publish a branch and pull request. Every failure after
//! an edit rolls the edit back from its snapshot and reinstalls before the
//! run continues; only an unrestorable tree aborts the run.

pub mod plan;
pub mod publish;
pub mod warnings;

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::advisory::{AdvisoryClient, AdvisoryError, group_alerts};
use crate::branch::{BranchIdentity, PartialIdentity};
use crate::config::RemedyConfig;
use crate::forge::{CreatePrArgs, ForgeClient};
use crate::install::{DependencyTreeProvider, InstallError, PackageRegistry, ScriptRunner};
use crate::lifecycle::LifecycleManager;
use crate::manifest::{ManifestEdit, ManifestError, ManifestSnapshot};
use crate::package::PackageIdentity;
use crate::resolver::{ResolveMode, resolve};
use crate::scm::SourceControl;
use crate::tree::DependencyTree;

pub use plan::{AttemptPlanner, PlannedAttempt, WorkspaceRef};
pub use warnings::RunWarnings;

/// Fatal, run-aborting failures.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RemediateError {
    /// The initial tree load/install failed; nothing was attempted.
    #[error("initial dependency tree install failed: {source}")]
    InitialInstall {
        /// Underlying install failure.
        #[source]
        source: InstallError,
    },

    /// The advisory lookup failed.
    #[error("vulnerability lookup failed: {source}")]
    Advisory {
        /// Underlying lookup failure.
        #[source]
        source: AdvisoryError,
    },

    /// A rolled-back edit could not be restored from its snapshot.
    #[error("manifest rollback failed, working tree may be dirty: {source}")]
    Rollback {
        /// Underlying manifest failure.
        #[source]
        source: ManifestError,
    },

    /// Reinstall with no edit pending failed; tree state is indeterminate.
    #[error("working tree could not be restored to a clean state: {source}")]
    TreeRestore {
        /// Underlying install failure.
        #[source]
        source: InstallError,
    },
}

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Whether any vulnerability was actually fixed.
    pub fixed: bool,
    /// Attempts counted against the budget.
    pub attempts: u32,
    /// Warnings surfaced during the run.
    pub warnings: Vec<String>,
    /// Whether the run stopped because the attempt budget was exhausted.
    pub stopped_at_limit: bool,
}

/// Collaborators needed only when the run publishes its results.
pub struct PublishContext {
    /// Forge client bound to the target repository.
    pub forge: Arc<dyn ForgeClient>,
    /// Lifecycle manager over the same repository.
    pub lifecycle: LifecycleManager,
    /// Base branch override; the forge default branch when unset.
    pub base_branch: Option<String>,
    /// Credentialed remote URL refreshed before each push, when set.
    pub remote_url: Option<String>,
    /// Enable auto-merge on opened pull requests.
    pub auto_merge: bool,
}

/// Outcome of one attempt iteration.
enum AttemptOutcome {
    /// Nothing was done; does not count against the budget.
    Skipped,
    /// Work happened (or a duplicate was found); counts against the budget.
    Counted {
        /// Whether this attempt fixed something.
        fixed: bool,
    },
}

/// Drives one whole remediation run.
pub struct Orchestrator {
    project: PathBuf,
    config: RemedyConfig,
    advisories: Arc<dyn AdvisoryClient>,
    provider: Arc<dyn DependencyTreeProvider>,
    scripts: Arc<dyn ScriptRunner>,
    registry: Arc<dyn PackageRegistry>,
    scm: Arc<dyn SourceControl>,
    publisher: Option<PublishContext>,
}

impl Orchestrator {
    /// Assembles an orchestrator over its collaborators.
    ///
    /// `publisher` is `None` for local/interactive runs, where a clean
    /// install (and test) result is the verification and no pull request
    /// is opened.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        project: PathBuf,
        config: RemedyConfig,
        advisories: Arc<dyn AdvisoryClient>,
        provider: Arc<dyn DependencyTreeProvider>,
        scripts: Arc<dyn ScriptRunner>,
        registry: Arc<dyn PackageRegistry>,
        scm: Arc<dyn SourceControl>,
        publisher: Option<PublishContext>,
    ) -> Self {
        Self {
            project,
            config,
            advisories,
            provider,
            scripts,
            registry,
            scm,
            publisher,
        }
    }

    /// Enumerates the attempts a run would process, with no side effects.
    ///
    /// Reads the tree from disk instead of installing.
    ///
    /// # Errors
    ///
    /// Returns [`RemediateError`] when the tree cannot be read or the
    /// advisory lookup fails.
    pub async fn plan_only(&self) -> Result<Vec<PlannedAttempt>, RemediateError> {
        let tree = self
            .provider
            .load(&self.project)
            .await
            .map_err(|source| RemediateError::InitialInstall { source })?;
        let groups = self.fetch_groups(&tree).await?;

        let mut planner = AttemptPlanner::new(groups, &tree);
        let mut attempts = Vec::new();
        while let Some(attempt) = planner.next_attempt(&tree) {
            attempts.push(attempt);
        }
        Ok(attempts)
    }

    /// Runs the whole remediation state machine.
    ///
    /// # Errors
    ///
    /// Returns [`RemediateError`] on the fatal failures listed there;
    /// everything else degrades to warnings in the report.
    pub async fn run(&self) -> Result<RunReport, RemediateError> {
        info!(project = %self.project.display(), "loading installed dependency tree");
        let mut tree = self
            .provider
            .reify(&self.project, &[])
            .await
            .map_err(|source| RemediateError::InitialInstall { source })?;

        // The run assumes exclusive ownership of the working tree; flag
        // pre-existing local modifications rather than silently mixing
        // them into attempt branches.
        if let Ok(dirty) = self.scm.unstaged_modified_files().await {
            if !dirty.is_empty() {
                warn!(
                    count = dirty.len(),
                    "working tree has unstaged modifications before remediation"
                );
            }
        }

        let groups = self.fetch_groups(&tree).await?;
        info!(groups = groups.len(), "vulnerability groups to process");

        let mut planner = AttemptPlanner::new(groups, &tree);
        let mut warnings = RunWarnings::new();
        let mut attempts = 0u32;
        let mut fixed = false;
        let mut stopped_at_limit = false;

        while let Some(attempt) = planner.next_attempt(&tree) {
            warnings.begin_package(&attempt.package.to_string());

            match self.process(&attempt, &mut tree, &mut warnings).await? {
                AttemptOutcome::Skipped => {},
                AttemptOutcome::Counted { fixed: fixed_now } => {
                    fixed |= fixed_now;
                    attempts += 1;
                    if attempts >= self.config.attempt_limit {
                        info!(limit = self.config.attempt_limit, "attempt budget exhausted");
                        stopped_at_limit = true;
                        break;
                    }
                },
            }
        }

        Ok(RunReport {
            fixed,
            attempts,
            warnings: warnings.finish(),
            stopped_at_limit,
        })
    }

    async fn fetch_groups(
        &self,
        tree: &DependencyTree,
    ) -> Result<Vec<crate::advisory::AlertGroup>, RemediateError> {
        let packages = installed_packages(tree);
        if packages.is_empty() {
            return Ok(Vec::new());
        }
        let lookup = self
            .advisories
            .lookup(&packages)
            .await
            .map_err(|source| RemediateError::Advisory { source })?;
        Ok(group_alerts(lookup))
    }

    async fn process(
        &self,
        attempt: &PlannedAttempt,
        tree: &mut DependencyTree,
        warnings: &mut RunWarnings,
    ) -> Result<AttemptOutcome, RemediateError> {
        let full_name = attempt.package.full_name();

        if !attempt.alert.fixable {
            warnings.push(format!(
                "{full_name}@{}: no patched version published for {}",
                attempt.installed, attempt.alert.id
            ));
            return Ok(AttemptOutcome::Skipped);
        }

        // Target resolution.
        let available = match self.registry.available_versions(&attempt.package).await {
            Ok(available) => available,
            Err(error) => {
                warnings.push(format!("{full_name}: version listing failed: {error}"));
                return Ok(AttemptOutcome::Skipped);
            },
        };
        let mode = if self.config.min_satisfying {
            ResolveMode::Min
        } else {
            ResolveMode::Max
        };
        let Some(target) = resolve(
            &full_name,
            &attempt.installed,
            &available,
            attempt.alert.vulnerable_range.as_ref(),
            mode,
        ) else {
            let required = attempt
                .alert
                .first_patched
                .as_ref()
                .map_or_else(|| "a newer version".to_string(), |v| format!(">={v}"));
            warnings.push(format!(
                "{full_name}@{} not updated: requires {required}",
                attempt.installed
            ));
            return Ok(AttemptOutcome::Skipped);
        };
        if target <= attempt.installed {
            warnings.push(format!(
                "{full_name}@{} already satisfies the patched version {target}",
                attempt.installed
            ));
            return Ok(AttemptOutcome::Skipped);
        }

        let identity = BranchIdentity {
            ecosystem: attempt.package.ecosystem,
            workspace: attempt.workspace.name.clone(),
            full_name: full_name.clone(),
            old_version: attempt.installed.clone(),
            new_version: target.clone(),
        };

        // Deduplication against prior runs.
        if let Some(publisher) = &self.publisher {
            match publisher.lifecycle.exists_active(&identity).await {
                Ok(true) => {
                    debug!(branch = %identity, "active attempt already exists");
                    return Ok(AttemptOutcome::Counted { fixed: false });
                },
                Ok(false) => {},
                Err(error) => {
                    warnings.push(format!(
                        "{full_name}: could not check for an existing attempt: {error}"
                    ));
                },
            }
        }

        // Manifest edit.
        let manifest_path = self.project.join(&attempt.workspace.dir).join("package.json");
        let top_level = tree.is_top_level(attempt.workspace_node, attempt.node);
        let root_manifest = self.project.join("package.json");
        let override_root = (!top_level).then_some(root_manifest.as_path());

        let edit = match ManifestEdit::plan(&manifest_path, &full_name, &target, override_root) {
            Ok(edit) => edit,
            Err(error) => {
                warnings.push(format!("{full_name}: manifest planning failed: {error}"));
                return Ok(AttemptOutcome::Skipped);
            },
        };
        if edit.changes.is_empty() && edit.override_entry.is_none() {
            warnings.push(format!(
                "{full_name}: no manifest entry to edit in {}",
                attempt.workspace.name
            ));
            return Ok(AttemptOutcome::Skipped);
        }

        // The snapshot also captures manifest-derived files (lockfiles),
        // so a rollback plus reinstall really does restore the old tree.
        let mut snapshot_paths = edit.touched_paths();
        snapshot_paths.extend(self.provider.rollback_paths(&self.project));
        let snapshot = match ManifestSnapshot::capture(&snapshot_paths) {
            Ok(snapshot) => snapshot,
            Err(error) => {
                warnings.push(format!("{full_name}: snapshot failed: {error}"));
                return Ok(AttemptOutcome::Skipped);
            },
        };

        match edit.apply() {
            Ok(true) => {},
            Ok(false) => {
                debug!(%identity, "edit produced no diff; skipping");
                return Ok(AttemptOutcome::Skipped);
            },
            Err(error) => {
                snapshot
                    .restore()
                    .map_err(|source| RemediateError::Rollback { source })?;
                warnings.push(format!("{full_name}: manifest edit failed: {error}"));
                return Ok(AttemptOutcome::Skipped);
            },
        }

        // Verification: reinstall, then optionally test.
        let new_tree = match self.provider.reify(&self.project, &[]).await {
            Ok(new_tree) => new_tree,
            Err(error) => {
                warnings.push(format!("{full_name}: install failed for {target}: {error}"));
                self.rollback(&snapshot, None, None, tree).await?;
                return Ok(AttemptOutcome::Counted { fixed: false });
            },
        };

        if self.config.run_tests {
            if let Err(error) = self
                .scripts
                .run_script(&self.project, &self.config.test_script)
                .await
            {
                warnings.push(format!("{full_name}: tests failed for {target}: {error}"));
                self.rollback(&snapshot, None, None, tree).await?;
                return Ok(AttemptOutcome::Counted { fixed: false });
            }
        }

        // Publication (unattended) or acceptance (interactive).
        if let Some(publisher) = &self.publisher {
            match self
                .publish(publisher, &identity, attempt, &edit, warnings)
                .await
            {
                Ok(base) => {
                    // Return the working tree to the base branch so the
                    // next attempt starts clean.
                    if let Err(error) = self.scm.reset_and_clean(&base).await {
                        warnings.push(format!("failed to reset to {base}: {error}"));
                        snapshot
                            .restore()
                            .map_err(|source| RemediateError::Rollback { source })?;
                    }
                    *tree = self
                        .provider
                        .reify(&self.project, &[])
                        .await
                        .map_err(|source| RemediateError::TreeRestore { source })?;
                    info!(%identity, "remediation published");
                    Ok(AttemptOutcome::Counted { fixed: true })
                },
                Err((message, base)) => {
                    warnings.push(message);
                    self.rollback(&snapshot, Some(&identity.encode()), base.as_deref(), tree)
                        .await?;
                    Ok(AttemptOutcome::Counted { fixed: false })
                },
            }
        } else {
            *tree = new_tree;
            info!(%identity, "remediation verified locally");
            Ok(AttemptOutcome::Counted { fixed: true })
        }
    }

    /// Publishes one verified attempt. Returns the base branch on success;
    /// on failure, an attempt-scoped message plus the base branch when it
    /// was already known (so rollback can reset to it).
    async fn publish(
        &self,
        publisher: &PublishContext,
        identity: &BranchIdentity,
        attempt: &PlannedAttempt,
        edit: &ManifestEdit,
        warnings: &mut RunWarnings,
    ) -> Result<String, (String, Option<String>)> {
        let partial =
            PartialIdentity::for_package(identity.ecosystem, &identity.full_name);

        // Credential refresh and reconciliation are independent and
        // order-insensitive; run them together and tolerate each failing.
        let refresh = async {
            match &publisher.remote_url {
                Some(url) => self.scm.set_remote_url(url).await.map_err(|e| e.to_string()),
                None => Ok(()),
            }
        };
        let reconcile = publisher
            .lifecycle
            .reconcile(&identity.new_version, &partial);
        let (refresh_result, reconcile_result) = futures::join!(refresh, reconcile);

        if let Err(error) = refresh_result {
            warnings.push(format!("failed to refresh remote credential: {error}"));
        }
        match reconcile_result {
            Ok(report) => {
                for failure in report.failures {
                    warnings.push(failure);
                }
            },
            Err(error) => {
                warnings.push(format!("pull-request reconciliation failed: {error}"));
            },
        }

        let base = match &publisher.base_branch {
            Some(base) => base.clone(),
            None => publisher
                .forge
                .default_branch()
                .await
                .map_err(|e| (format!("could not determine base branch: {e}"), None))?,
        };

        let branch = identity.encode();
        let pushed = self
            .scm
            .create_and_push_branch(&branch, &publish::commit_message(identity), &edit.touched_paths())
            .await
            .map_err(|e| (format!("push failed for {branch}: {e}"), Some(base.clone())))?;
        if !pushed {
            return Err((
                format!("nothing to commit for {branch}"),
                Some(base),
            ));
        }

        let record = publisher
            .forge
            .create_pull_request(&CreatePrArgs {
                title: publish::pr_title(identity),
                body: publish::pr_body(identity, &attempt.alert),
                head: branch.clone(),
                base: base.clone(),
            })
            .await
            .map_err(|e| (format!("pull request creation failed for {branch}: {e}"), Some(base.clone())))?;
        publisher.lifecycle.invalidate_directory();
        info!(number = record.number, %branch, "pull request opened");

        if publisher.auto_merge {
            match publisher.forge.enable_auto_merge(record.number).await {
                Ok(outcome) if !outcome.enabled => {
                    warnings.push(format!(
                        "auto-merge not enabled for #{}: {}",
                        record.number,
                        outcome.details.unwrap_or_else(|| "no detail".to_string())
                    ));
                },
                Ok(_) => {},
                Err(error) => {
                    warnings.push(format!(
                        "auto-merge not enabled for #{}: {error}",
                        record.number
                    ));
                },
            }
        }

        Ok(base)
    }

    /// Rolls one attempt back: best-effort branch cleanup, then manifest
    /// restore (via git when the base branch is known, from the snapshot
    /// otherwise), then a reinstall to a clean tree. The reinstall failing
    /// is fatal — at that point no edit is pending and the tree state is
    /// indeterminate.
    async fn rollback(
        &self,
        snapshot: &ManifestSnapshot,
        branch: Option<&str>,
        base: Option<&str>,
        tree: &mut DependencyTree,
    ) -> Result<(), RemediateError> {
        if let Some(branch) = branch {
            if let Err(error) = self.scm.delete_branch(branch, true).await {
                debug!(%branch, %error, "branch cleanup failed");
            }
        }

        let reset_ok = match base {
            Some(base) => self.scm.reset_and_clean(base).await.is_ok(),
            None => false,
        };
        if !reset_ok {
            snapshot
                .restore()
                .map_err(|source| RemediateError::Rollback { source })?;
        }

        *tree = self
            .provider
            .reify(&self.project, &[])
            .await
            .map_err(|source| RemediateError::TreeRestore { source })?;
        Ok(())
    }
}

/// Unique dependency identities installed in the tree, sorted. Workspace
/// manifests and link entries are not remediation subjects themselves.
#[must_use]
pub fn installed_packages(tree: &DependencyTree) -> Vec<PackageIdentity> {
    let mut names: Vec<&str> = tree
        .iter()
        .filter(|(_, node)| !node.is_workspace && !node.is_link)
        .map(|(_, node)| node.name.as_str())
        .collect();
    names.sort_unstable();
    names.dedup();
    names.iter().map(|name| PackageIdentity::npm(name)).collect()
}
