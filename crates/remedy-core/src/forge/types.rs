//! Provider-agnostic forge data shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::branch::BranchIdentity;

/// Pull request lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrState {
    /// Pull request is open.
    Open,
    /// Pull request is closed without merge.
    Closed,
    /// Pull request is merged.
    Merged,
}

impl PrState {
    /// Returns the lowercase wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Merged => "merged",
        }
    }
}

/// Normalized merge readiness, shared across API tiers.
///
/// GraphQL reports a fine-grained `mergeStateStatus`; REST only a coarse
/// `mergeable_state` string. Both normalize here so the lifecycle manager
/// reasons about one enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeReadiness {
    /// Mergeable as-is.
    Clean,
    /// Head is behind the base branch.
    Behind,
    /// Blocked by requirements (reviews, checks).
    Blocked,
    /// Conflicts with the base branch.
    Dirty,
    /// Checks pending or failing non-blockingly.
    Unstable,
    /// The provider did not say.
    Unknown,
}

impl MergeReadiness {
    /// Normalizes a GraphQL `mergeStateStatus` value.
    #[must_use]
    pub fn from_graphql(value: &str) -> Self {
        match value {
            "CLEAN" | "HAS_HOOKS" => Self::Clean,
            "BEHIND" => Self::Behind,
            "BLOCKED" | "DRAFT" => Self::Blocked,
            "DIRTY" => Self::Dirty,
            "UNSTABLE" => Self::Unstable,
            _ => Self::Unknown,
        }
    }

    /// Normalizes a REST `mergeable_state` value.
    #[must_use]
    pub fn from_rest(value: &str) -> Self {
        match value {
            "clean" | "has_hooks" => Self::Clean,
            "behind" => Self::Behind,
            "blocked" | "draft" => Self::Blocked,
            "dirty" => Self::Dirty,
            "unstable" => Self::Unstable,
            _ => Self::Unknown,
        }
    }
}

/// A pull request believed to be a remediation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestRecord {
    /// Pull request number.
    pub number: u64,
    /// Pull request title.
    pub title: String,
    /// Author login.
    pub author: String,
    /// Source branch.
    pub head_ref: String,
    /// Target branch.
    pub base_ref: String,
    /// Open/closed/merged state.
    pub state: PrState,
    /// Normalized merge readiness.
    pub merge_readiness: MergeReadiness,
    /// Merge timestamp, when merged.
    pub merged_at: Option<DateTime<Utc>>,
    /// Pull request URL.
    pub url: String,
    /// Identity decoded from the head ref, attached by the directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<BranchIdentity>,
}

/// Arguments for creating a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePrArgs {
    /// Pull request title.
    pub title: String,
    /// Pull request body markdown.
    pub body: String,
    /// Source branch.
    pub head: String,
    /// Target branch.
    pub base: String,
}

/// Result of an auto-merge enablement attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoMergeOutcome {
    /// Whether auto-merge is now enabled.
    pub enabled: bool,
    /// Provider detail when it is not.
    pub details: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graphql_readiness_normalizes() {
        assert_eq!(MergeReadiness::from_graphql("CLEAN"), MergeReadiness::Clean);
        assert_eq!(MergeReadiness::from_graphql("BEHIND"), MergeReadiness::Behind);
        assert_eq!(MergeReadiness::from_graphql("DRAFT"), MergeReadiness::Blocked);
        assert_eq!(MergeReadiness::from_graphql("???"), MergeReadiness::Unknown);
    }

    #[test]
    fn rest_readiness_normalizes() {
        assert_eq!(MergeReadiness::from_rest("clean"), MergeReadiness::Clean);
        assert_eq!(MergeReadiness::from_rest("behind"), MergeReadiness::Behind);
        assert_eq!(MergeReadiness::from_rest("unknown"), MergeReadiness::Unknown);
    }
}
