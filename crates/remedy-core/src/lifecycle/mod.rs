//! Pull-request lifecycle reconciliation.
//!
//! Before opening a new attempt, prior attempts for the same package are
//! brought in line: anything targeting an older version is closed as
//! superseded, anything fallen behind its base is refreshed. Failures are
//! isolated per record — one stuck pull request never blocks the rest.

use std::sync::Arc;

use semver::Version;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::branch::{BranchIdentity, BranchPattern, PartialIdentity};
use crate::forge::{
    DirectoryFilter, ForgeClient, ForgeError, MergeReadiness, PrDirectory, PrState,
    PullRequestRecord,
};
use crate::scm::{ScmError, SourceControl};

/// Errors raised by lifecycle operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LifecycleError {
    /// Forge operation failed.
    #[error(transparent)]
    Forge(#[from] ForgeError),

    /// Source-control probe failed.
    #[error(transparent)]
    Scm(#[from] ScmError),
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    /// Records still alive after reconciliation, refreshed where possible.
    pub survivors: Vec<PullRequestRecord>,
    /// Per-record failures, for the warning ledger.
    pub failures: Vec<String>,
}

/// Reconciles and queries remediation pull requests for one repository.
pub struct LifecycleManager {
    directory: PrDirectory,
    forge: Arc<dyn ForgeClient>,
    scm: Arc<dyn SourceControl>,
    author: Option<String>,
}

impl LifecycleManager {
    /// Creates a manager over the given collaborators.
    #[must_use]
    pub fn new(
        directory: PrDirectory,
        forge: Arc<dyn ForgeClient>,
        scm: Arc<dyn SourceControl>,
    ) -> Self {
        Self {
            directory,
            forge,
            scm,
            author: None,
        }
    }

    /// Restricts discovery to pull requests by this author.
    #[must_use]
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Reconciles open attempts matching `partial` against a new target
    /// version.
    ///
    /// Per record: a decoded target strictly below `new_target` is closed
    /// as superseded; a record behind its base gets a merge-base refresh
    /// (left stale on failure, which is not fatal); everything else is
    /// untouched. Mutations are applied optimistically to the returned
    /// copies; individual failures are collected, never propagated.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError`] only when the directory listing itself
    /// fails.
    pub async fn reconcile(
        &self,
        new_target: &Version,
        partial: &PartialIdentity,
    ) -> Result<ReconcileReport, LifecycleError> {
        let filter = DirectoryFilter {
            author: self.author.clone(),
            pattern: BranchPattern::for_partial(partial),
            states: vec![PrState::Open],
        };
        let records = self.directory.list(&filter).await?;

        let mut report = ReconcileReport::default();
        let mut closed_any = false;

        for mut record in records {
            let Some(identity) = record.identity.clone() else {
                report.survivors.push(record);
                continue;
            };

            if identity.new_version < *new_target {
                match self.forge.close_pull_request(record.number).await {
                    Ok(()) => {
                        info!(
                            number = record.number,
                            old_target = %identity.new_version,
                            new_target = %new_target,
                            "closed superseded remediation pull request"
                        );
                        closed_any = true;
                    },
                    Err(error) => {
                        report.failures.push(format!(
                            "failed to close superseded PR #{}: {error}",
                            record.number
                        ));
                        report.survivors.push(record);
                    },
                }
                continue;
            }

            if record.merge_readiness == MergeReadiness::Behind {
                match self
                    .forge
                    .merge_branches(&record.base_ref, &record.head_ref)
                    .await
                {
                    Ok(()) => {
                        debug!(number = record.number, "refreshed stale merge base");
                        record.merge_readiness = MergeReadiness::Clean;
                    },
                    Err(error) => {
                        report.failures.push(format!(
                            "failed to refresh PR #{}: {error}",
                            record.number
                        ));
                    },
                }
            }
            report.survivors.push(record);
        }

        if closed_any {
            self.directory.invalidate();
        }
        for failure in &report.failures {
            warn!("{failure}");
        }
        Ok(report)
    }

    /// Drops cached pull-request listings after remote state changed.
    pub fn invalidate_directory(&self) {
        self.directory.invalidate();
    }

    /// Whether a live attempt for exactly this identity already exists —
    /// an open pull request on the encoded branch, or the remote branch
    /// itself. Read-only.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError`] when neither source could be consulted.
    pub async fn exists_active(&self, identity: &BranchIdentity) -> Result<bool, LifecycleError> {
        let branch = identity.encode();
        let partial = PartialIdentity::for_package(identity.ecosystem, &identity.full_name)
            .in_workspace(&identity.workspace);
        let filter = DirectoryFilter {
            author: self.author.clone(),
            pattern: BranchPattern::for_partial(&partial),
            states: vec![PrState::Open],
        };

        let records = self.directory.list(&filter).await?;
        if records.iter().any(|record| record.head_ref == branch) {
            return Ok(true);
        }
        Ok(self.scm.remote_branch_exists(&branch).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::forge::types::{AutoMergeOutcome, CreatePrArgs};
    use crate::forge::MemoryCache;
    use crate::package::Ecosystem;

    fn open_record(number: u64, head_ref: &str, readiness: MergeReadiness) -> PullRequestRecord {
        PullRequestRecord {
            number,
            title: format!("PR #{number}"),
            author: "remedy-bot".to_string(),
            head_ref: head_ref.to_string(),
            base_ref: "main".to_string(),
            state: PrState::Open,
            merge_readiness: readiness,
            merged_at: None,
            url: String::new(),
            identity: None,
        }
    }

    #[derive(Default)]
    struct ScriptedForge {
        open: Vec<PullRequestRecord>,
        closed: Mutex<Vec<u64>>,
        merged: Mutex<Vec<(String, String)>>,
        fail_close: bool,
        fail_merge: bool,
    }

    #[async_trait::async_trait]
    impl ForgeClient for ScriptedForge {
        fn repo_id(&self) -> &str {
            "acme/widgets"
        }

        async fn list_pull_requests_bulk(
            &self,
            _max: u32,
        ) -> Result<Vec<PullRequestRecord>, ForgeError> {
            Ok(self.open.clone())
        }

        async fn list_pull_requests_full(&self) -> Result<Vec<PullRequestRecord>, ForgeError> {
            Ok(self.open.clone())
        }

        async fn create_pull_request(
            &self,
            _args: &CreatePrArgs,
        ) -> Result<PullRequestRecord, ForgeError> {
            unimplemented!("not exercised")
        }

        async fn close_pull_request(&self, number: u64) -> Result<(), ForgeError> {
            if self.fail_close {
                return Err(ForgeError::Api {
                    status: 500,
                    message: "boom".to_string(),
                });
            }
            self.closed.lock().unwrap().push(number);
            Ok(())
        }

        async fn merge_branches(&self, base: &str, head: &str) -> Result<(), ForgeError> {
            if self.fail_merge {
                return Err(ForgeError::Api {
                    status: 409,
                    message: "merge conflict".to_string(),
                });
            }
            self.merged.lock().unwrap().push((base.to_string(), head.to_string()));
            Ok(())
        }

        async fn enable_auto_merge(&self, _number: u64) -> Result<AutoMergeOutcome, ForgeError> {
            unimplemented!("not exercised")
        }

        async fn default_branch(&self) -> Result<String, ForgeError> {
            Ok("main".to_string())
        }
    }

    #[derive(Default)]
    struct FakeScm {
        remote_branches: HashSet<String>,
    }

    #[async_trait::async_trait]
    impl SourceControl for FakeScm {
        async fn create_and_push_branch(
            &self,
            _name: &str,
            _message: &str,
            _paths: &[PathBuf],
        ) -> Result<bool, ScmError> {
            Ok(true)
        }

        async fn remote_branch_exists(&self, name: &str) -> Result<bool, ScmError> {
            Ok(self.remote_branches.contains(name))
        }

        async fn reset_and_clean(&self, _base_branch: &str) -> Result<(), ScmError> {
            Ok(())
        }

        async fn delete_branch(&self, _name: &str, _include_remote: bool) -> Result<(), ScmError> {
            Ok(())
        }

        async fn unstaged_modified_files(&self) -> Result<Vec<PathBuf>, ScmError> {
            Ok(Vec::new())
        }

        async fn set_remote_url(&self, _url: &str) -> Result<(), ScmError> {
            Ok(())
        }
    }

    fn manager(forge: Arc<ScriptedForge>, scm: Arc<FakeScm>) -> LifecycleManager {
        let directory = PrDirectory::new(
            Arc::clone(&forge) as Arc<dyn ForgeClient>,
            Arc::new(MemoryCache::new()),
            Duration::from_secs(60),
        );
        LifecycleManager::new(directory, forge, scm)
    }

    fn target(text: &str) -> Version {
        Version::parse(text).unwrap()
    }

    #[tokio::test]
    async fn superseded_attempt_is_closed_and_newer_survives() {
        let forge = Arc::new(ScriptedForge {
            open: vec![
                open_record(1, "remedy/npm/root/left-pad_1.0.0_1.0.3", MergeReadiness::Clean),
                open_record(2, "remedy/npm/root/left-pad_1.0.0_1.0.5", MergeReadiness::Clean),
            ],
            ..ScriptedForge::default()
        });
        let mgr = manager(Arc::clone(&forge), Arc::new(FakeScm::default()));

        let partial = PartialIdentity::for_package(Ecosystem::Npm, "left-pad");
        let report = mgr.reconcile(&target("1.0.5"), &partial).await.unwrap();

        assert_eq!(*forge.closed.lock().unwrap(), vec![1]);
        assert_eq!(report.survivors.len(), 1);
        assert_eq!(report.survivors[0].number, 2);
        assert!(report.failures.is_empty());
    }

    #[tokio::test]
    async fn behind_record_is_refreshed_and_marked_clean() {
        let forge = Arc::new(ScriptedForge {
            open: vec![open_record(
                3,
                "remedy/npm/root/left-pad_1.0.0_1.0.5",
                MergeReadiness::Behind,
            )],
            ..ScriptedForge::default()
        });
        let mgr = manager(Arc::clone(&forge), Arc::new(FakeScm::default()));

        let partial = PartialIdentity::for_package(Ecosystem::Npm, "left-pad");
        let report = mgr.reconcile(&target("1.0.5"), &partial).await.unwrap();

        assert_eq!(report.survivors[0].merge_readiness, MergeReadiness::Clean);
        assert_eq!(
            *forge.merged.lock().unwrap(),
            vec![("main".to_string(), "remedy/npm/root/left-pad_1.0.0_1.0.5".to_string())]
        );
    }

    #[tokio::test]
    async fn refresh_failure_is_isolated_and_record_survives() {
        let forge = Arc::new(ScriptedForge {
            open: vec![
                open_record(4, "remedy/npm/root/left-pad_1.0.0_1.0.5", MergeReadiness::Behind),
                open_record(5, "remedy/npm/root/left-pad_1.0.1_1.0.5", MergeReadiness::Clean),
            ],
            fail_merge: true,
            ..ScriptedForge::default()
        });
        let mgr = manager(Arc::clone(&forge), Arc::new(FakeScm::default()));

        let partial = PartialIdentity::for_package(Ecosystem::Npm, "left-pad");
        let report = mgr.reconcile(&target("1.0.5"), &partial).await.unwrap();

        assert_eq!(report.survivors.len(), 2);
        assert_eq!(report.failures.len(), 1);
        // The stale record keeps its Behind state.
        assert_eq!(report.survivors[0].merge_readiness, MergeReadiness::Behind);
    }

    #[tokio::test]
    async fn close_failure_keeps_record_and_continues() {
        let forge = Arc::new(ScriptedForge {
            open: vec![
                open_record(6, "remedy/npm/root/left-pad_1.0.0_1.0.3", MergeReadiness::Clean),
                open_record(7, "remedy/npm/root/left-pad_1.0.0_1.0.5", MergeReadiness::Clean),
            ],
            fail_close: true,
            ..ScriptedForge::default()
        });
        let mgr = manager(Arc::clone(&forge), Arc::new(FakeScm::default()));

        let partial = PartialIdentity::for_package(Ecosystem::Npm, "left-pad");
        let report = mgr.reconcile(&target("1.0.5"), &partial).await.unwrap();

        assert_eq!(report.survivors.len(), 2);
        assert_eq!(report.failures.len(), 1);
    }

    #[tokio::test]
    async fn no_two_survivors_share_a_target_major_triple() {
        let forge = Arc::new(ScriptedForge {
            open: vec![
                open_record(8, "remedy/npm/root/left-pad_1.0.0_1.0.3", MergeReadiness::Clean),
                open_record(9, "remedy/npm/root/left-pad_1.0.1_1.0.4", MergeReadiness::Clean),
                open_record(10, "remedy/npm/root/left-pad_1.0.0_1.0.5", MergeReadiness::Clean),
            ],
            ..ScriptedForge::default()
        });
        let mgr = manager(Arc::clone(&forge), Arc::new(FakeScm::default()));

        let partial = PartialIdentity::for_package(Ecosystem::Npm, "left-pad");
        let report = mgr.reconcile(&target("1.0.5"), &partial).await.unwrap();

        let mut triples = HashSet::new();
        for survivor in &report.survivors {
            let identity = survivor.identity.as_ref().unwrap();
            assert!(triples.insert((
                identity.workspace.clone(),
                identity.full_name.clone(),
                identity.new_version.major,
            )));
        }
    }

    #[tokio::test]
    async fn exists_active_sees_open_pr() {
        let branch = "remedy/npm/root/left-pad_1.0.0_1.0.3";
        let forge = Arc::new(ScriptedForge {
            open: vec![open_record(11, branch, MergeReadiness::Clean)],
            ..ScriptedForge::default()
        });
        let mgr = manager(forge, Arc::new(FakeScm::default()));

        let identity = BranchIdentity {
            ecosystem: Ecosystem::Npm,
            workspace: "root".to_string(),
            full_name: "left-pad".to_string(),
            old_version: target("1.0.0"),
            new_version: target("1.0.3"),
        };
        assert!(mgr.exists_active(&identity).await.unwrap());
    }

    #[tokio::test]
    async fn exists_active_sees_remote_branch_without_pr() {
        let forge = Arc::new(ScriptedForge::default());
        let scm = Arc::new(FakeScm {
            remote_branches: HashSet::from([
                "remedy/npm/root/left-pad_1.0.0_1.0.3".to_string()
            ]),
        });
        let mgr = manager(forge, scm);

        let identity = BranchIdentity {
            ecosystem: Ecosystem::Npm,
            workspace: "root".to_string(),
            full_name: "left-pad".to_string(),
            old_version: target("1.0.0"),
            new_version: target("1.0.3"),
        };
        assert!(mgr.exists_active(&identity).await.unwrap());
    }

    #[tokio::test]
    async fn exists_active_false_when_nothing_matches() {
        let forge = Arc::new(ScriptedForge::default());
        let mgr = manager(forge, Arc::new(FakeScm::default()));

        let identity = BranchIdentity {
            ecosystem: Ecosystem::Npm,
            workspace: "root".to_string(),
            full_name: "left-pad".to_string(),
            old_version: target("1.0.0"),
            new_version: target("1.0.3"),
        };
        assert!(!mgr.exists_active(&identity).await.unwrap());
    }
}
