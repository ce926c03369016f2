//! remedy-core — automated dependency-vulnerability remediation.
//!
//! Given a project's installed dependency graph and the known
//! vulnerabilities affecting it, this crate computes the minimal safe
//! upgrade per affected package, applies the manifest edit, verifies it by
//! reinstalling (and optionally testing), and publishes the change as a
//! branch and pull request — deduplicating against prior attempts through
//! the branch-name codec and rolling back on failure.
//!
//! # Architecture
//!
//! ```text
//! Orchestrator (remediate)
//!     |
//!     +-- AdvisoryClient (advisory) ......... which packages are affected
//!     +-- AttemptPlanner (remediate::plan) .. deterministic iteration order
//!     +-- resolve (resolver) ................ best non-vulnerable version
//!     +-- DependencyTree (tree) ............. installed graph queries
//!     +-- ManifestEdit (manifest) ........... edit + snapshot + rollback
//!     +-- DependencyTreeProvider (install) .. install/reify collaborators
//!     +-- SourceControl (scm) ............... branch/push/reset primitives
//!     +-- LifecycleManager (lifecycle) ...... supersede / refresh / dedup
//!     +-- ForgeClient (forge) ............... pull-request API surface
//! ```
//!
//! External effects (process spawns, HTTP, git) all sit behind the
//! collaborator traits, so the orchestrator is driven end-to-end in tests
//! with in-memory fakes.

pub mod advisory;
pub mod branch;
pub mod config;
pub mod forge;
pub mod install;
pub mod lifecycle;
pub mod manifest;
pub mod package;
pub mod remediate;
pub mod resolver;
pub mod scm;
pub mod tree;

pub use advisory::{AdvisoryClient, AlertGroup, VulnerabilityAlert};
pub use branch::{BranchIdentity, BranchPattern, PartialIdentity};
pub use config::RemedyConfig;
pub use forge::{ForgeClient, PullRequestRecord};
pub use lifecycle::LifecycleManager;
pub use manifest::{ManifestEdit, ManifestSnapshot};
pub use package::{Ecosystem, PackageIdentity};
pub use remediate::{Orchestrator, PublishContext, RunReport};
pub use resolver::{ResolveMode, VersionRange, resolve};
pub use scm::{GitCli, SourceControl};
pub use tree::{DependencyNode, DependencyTree, NodeId};
