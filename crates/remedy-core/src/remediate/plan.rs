//! Attempt planning.
//!
//! [`AttemptPlanner`] yields one [`PlannedAttempt`] per call, walking the
//! (package group × workspace × installed version × alert) space in a
//! fixed order: groups sorted by package identity, workspaces in lockfile
//! order with the project root last, versions ascending, alerts in source
//! order. The caller passes the current tree on every call, so a reinstall
//! between attempts is picked up without restarting the walk — versions
//! that disappeared from the tree are skipped, and no labeled control flow
//! is needed anywhere.

use std::path::PathBuf;

use semver::Version;

use crate::advisory::{AlertGroup, VulnerabilityAlert};
use crate::branch::ROOT_WORKSPACE;
use crate::package::PackageIdentity;
use crate::tree::{DependencyTree, NodeId};

/// A workspace manifest as iteration coordinate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceRef {
    /// Branch-identity workspace token (`root` for the root manifest).
    pub name: String,
    /// Manifest directory relative to the project root (empty for root).
    pub dir: PathBuf,
}

impl WorkspaceRef {
    fn from_location(location: &str) -> Self {
        Self {
            name: if location.is_empty() {
                ROOT_WORKSPACE.to_string()
            } else {
                location.to_string()
            },
            dir: PathBuf::from(location),
        }
    }
}

/// One unit of remediation work.
#[derive(Debug, Clone)]
pub struct PlannedAttempt {
    /// The affected package.
    pub package: PackageIdentity,
    /// The alert driving this attempt.
    pub alert: VulnerabilityAlert,
    /// Workspace whose manifest the edit lands in.
    pub workspace: WorkspaceRef,
    /// Workspace node in the tree this attempt was planned against.
    pub workspace_node: NodeId,
    /// Installed version being remediated.
    pub installed: Version,
    /// The installed node, valid for the tree passed to `next_attempt`.
    pub node: NodeId,
}

/// Yields planned attempts in deterministic nested order.
pub struct AttemptPlanner {
    groups: Vec<AlertGroup>,
    workspaces: Vec<String>,
    group_idx: usize,
    workspace_idx: usize,
    versions: Option<Vec<Version>>,
    version_idx: usize,
    alert_idx: usize,
}

impl AttemptPlanner {
    /// Plans over alert groups and the workspace set of `tree`.
    ///
    /// The workspace list is fixed at construction (reinstalls do not
    /// change workspace membership); the root manifest is deliberately
    /// last, so override-table entries written while processing the root
    /// cannot retroactively affect workspaces already processed.
    #[must_use]
    pub fn new(groups: Vec<AlertGroup>, tree: &DependencyTree) -> Self {
        let mut workspaces: Vec<String> = tree
            .workspace_nodes()
            .into_iter()
            .map(|id| tree.node(id).location.to_string_lossy().into_owned())
            .collect();
        workspaces.push(String::new());

        Self {
            groups,
            workspaces,
            group_idx: 0,
            workspace_idx: 0,
            versions: None,
            version_idx: 0,
            alert_idx: 0,
        }
    }

    /// Produces the next attempt against the current tree, or `None` when
    /// the space is exhausted.
    pub fn next_attempt(&mut self, tree: &DependencyTree) -> Option<PlannedAttempt> {
        loop {
            let group = self.groups.get(self.group_idx)?;

            if self.workspace_idx >= self.workspaces.len() {
                self.group_idx += 1;
                self.workspace_idx = 0;
                self.versions = None;
                continue;
            }
            let location = &self.workspaces[self.workspace_idx];
            let Some(workspace_node) = resolve_workspace(tree, location) else {
                self.advance_workspace();
                continue;
            };

            if self.versions.is_none() {
                let name = group.package.full_name();
                self.versions = Some(
                    tree.reachable_versions(workspace_node, &name)
                        .unwrap_or_default(),
                );
                self.version_idx = 0;
                self.alert_idx = 0;
            }
            let versions = self.versions.as_ref()?;

            let Some(installed) = versions.get(self.version_idx) else {
                self.advance_workspace();
                continue;
            };
            if self.alert_idx >= group.alerts.len() {
                self.version_idx += 1;
                self.alert_idx = 0;
                continue;
            }

            // The version list was computed against an earlier tree; a
            // reinstall may have removed this version since.
            let name = group.package.full_name();
            let Ok(Some(node)) = tree.find_one(&name, installed) else {
                self.version_idx += 1;
                self.alert_idx = 0;
                continue;
            };

            let alert = group.alerts[self.alert_idx].clone();
            self.alert_idx += 1;

            return Some(PlannedAttempt {
                package: group.package.clone(),
                alert,
                workspace: WorkspaceRef::from_location(location),
                workspace_node,
                installed: installed.clone(),
                node,
            });
        }
    }

    fn advance_workspace(&mut self) {
        self.workspace_idx += 1;
        self.versions = None;
    }
}

fn resolve_workspace(tree: &DependencyTree, location: &str) -> Option<NodeId> {
    if location.is_empty() {
        Some(tree.root())
    } else {
        tree.find_by_location(location)
    }
}
