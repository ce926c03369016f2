//! Branch-name codec for remediation attempts.
//!
//! Branch names are the only identity that survives across runs — there is
//! no database. One attempt's identity (ecosystem, workspace, package, old
//! version, new version) is encoded into a restricted-character branch name,
//! and a matcher built from the known half of an identity recovers the rest
//! from remote branches and PR head refs on the next run.
//!
//! Shape: `remedy/<ecosystem>/<workspace>/<name>_<old>_<new>`. Components
//! are sanitized to `[A-Za-z0-9.-]` so `/` and `_` stay unambiguous as
//! delimiters; sanitization is idempotent, which is what makes
//! encode-after-decode reproduce the original branch name byte for byte.

use std::fmt;

use regex::Regex;
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::package::Ecosystem;
use crate::resolver::coerce;

/// Fixed first segment of every remediation branch.
pub const BRANCH_PREFIX: &str = "remedy";

/// Workspace token used for the project root manifest.
pub const ROOT_WORKSPACE: &str = "root";

/// Character class a sanitized component is drawn from, as a regex snippet.
const COMPONENT_CLASS: &str = "[A-Za-z0-9.-]+";

/// Canonical identity of one remediation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchIdentity {
    /// Ecosystem of the remediated package.
    pub ecosystem: Ecosystem,
    /// Workspace the manifest edit lands in (`root` for the root manifest).
    pub workspace: String,
    /// Full package name, namespace included (`@scope/name`).
    pub full_name: String,
    /// Version installed before the attempt.
    pub old_version: Version,
    /// Version the attempt upgrades to.
    pub new_version: Version,
}

impl BranchIdentity {
    /// Encodes this identity into its branch name.
    #[must_use]
    pub fn encode(&self) -> String {
        format!(
            "{BRANCH_PREFIX}/{}/{}/{}_{}_{}",
            self.ecosystem,
            sanitize(&self.workspace),
            sanitize(&self.full_name),
            sanitize(&self.old_version.to_string()),
            sanitize(&self.new_version.to_string()),
        )
    }
}

impl fmt::Display for BranchIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// The known half of an identity, used to build a matcher for prior
/// attempts. Unset fields match any value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialIdentity {
    /// Ecosystem (always known).
    pub ecosystem: Ecosystem,
    /// Workspace, when the search is workspace-scoped.
    pub workspace: Option<String>,
    /// Full package name, when the search is package-scoped.
    pub full_name: Option<String>,
}

impl PartialIdentity {
    /// Package-scoped partial identity across all workspaces.
    #[must_use]
    pub fn for_package(ecosystem: Ecosystem, full_name: &str) -> Self {
        Self {
            ecosystem,
            workspace: None,
            full_name: Some(full_name.to_string()),
        }
    }

    /// Narrows this partial identity to one workspace.
    #[must_use]
    pub fn in_workspace(mut self, workspace: &str) -> Self {
        self.workspace = Some(workspace.to_string());
        self
    }
}

/// Compiled matcher for branch names sharing a partial identity.
#[derive(Debug, Clone)]
pub struct BranchPattern {
    regex: Regex,
    partial: PartialIdentity,
}

impl BranchPattern {
    /// Builds the matcher for a partial identity.
    ///
    /// Known fields are sanitized with the same function used by
    /// [`BranchIdentity::encode`] and embedded literally; unknown fields
    /// become wildcards over the sanitized character class.
    #[must_use]
    pub fn for_partial(partial: &PartialIdentity) -> Self {
        let workspace = partial
            .workspace
            .as_deref()
            .map_or_else(|| COMPONENT_CLASS.to_string(), |ws| regex::escape(&sanitize(ws)));
        let name = partial
            .full_name
            .as_deref()
            .map_or_else(|| COMPONENT_CLASS.to_string(), |n| regex::escape(&sanitize(n)));

        let pattern = format!(
            "^{BRANCH_PREFIX}/{}/(?P<workspace>{workspace})/(?P<name>{name})_(?P<old>{COMPONENT_CLASS})_(?P<new>{COMPONENT_CLASS})$",
            regex::escape(partial.ecosystem.as_str()),
        );
        Self {
            // The pattern is assembled from escaped literals and fixed
            // classes, so compilation cannot fail on user data.
            regex: Regex::new(&pattern).unwrap_or_else(|_| Regex::new("$^").unwrap()),
            partial: partial.clone(),
        }
    }

    /// Returns true when `branch` structurally matches this pattern.
    #[must_use]
    pub fn matches(&self, branch: &str) -> bool {
        self.regex.is_match(branch)
    }

    /// Decodes a branch name back into an identity.
    ///
    /// Fields fixed by the partial identity are recovered exactly as
    /// supplied (pre-sanitization); wildcard fields come back in sanitized
    /// form. Version tokens are coerced, since sanitization may have
    /// rewritten characters like `+`. Returns `None` on any structural
    /// mismatch — decode never fails loudly.
    #[must_use]
    pub fn decode(&self, branch: &str) -> Option<BranchIdentity> {
        let captures = self.regex.captures(branch)?;
        let old_version = coerce(captures.name("old")?.as_str())?;
        let new_version = coerce(captures.name("new")?.as_str())?;

        let workspace = self
            .partial
            .workspace
            .clone()
            .unwrap_or_else(|| captures["workspace"].to_string());
        let full_name = self
            .partial
            .full_name
            .clone()
            .unwrap_or_else(|| captures["name"].to_string());

        Some(BranchIdentity {
            ecosystem: self.partial.ecosystem,
            workspace,
            full_name,
            old_version,
            new_version,
        })
    }
}

/// Sanitizes one identity component to the branch character set.
///
/// Anything outside `[A-Za-z0-9.-]` becomes `-`; runs of `-` collapse and
/// edge `-` are trimmed, so the function is idempotent. An all-illegal
/// component degrades to `"x"` rather than an empty segment.
#[must_use]
pub fn sanitize(component: &str) -> String {
    let mut out = String::with_capacity(component.len());
    for ch in component.chars() {
        if ch.is_ascii_alphanumeric() || ch == '.' {
            out.push(ch);
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        "x".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn v(text: &str) -> Version {
        Version::parse(text).unwrap()
    }

    fn identity() -> BranchIdentity {
        BranchIdentity {
            ecosystem: Ecosystem::Npm,
            workspace: "packages/api".to_string(),
            full_name: "@scope/name".to_string(),
            old_version: v("1.0.0"),
            new_version: v("1.0.3"),
        }
    }

    #[test]
    fn encode_produces_restricted_characters() {
        let name = identity().encode();
        assert_eq!(name, "remedy/npm/packages-api/scope-name_1.0.0_1.0.3");
    }

    #[test]
    fn decode_recovers_workspace_and_versions() {
        let id = identity();
        let partial =
            PartialIdentity::for_package(Ecosystem::Npm, "@scope/name").in_workspace("packages/api");
        let pattern = BranchPattern::for_partial(&partial);

        let decoded = pattern.decode(&id.encode()).expect("branch should decode");
        assert_eq!(decoded.workspace, "packages/api");
        assert_eq!(decoded.full_name, "@scope/name");
        assert_eq!(decoded.new_version, v("1.0.3"));
        assert_eq!(decoded.old_version, v("1.0.0"));
    }

    #[test]
    fn wildcard_workspace_matches_any_workspace() {
        let id = identity();
        let partial = PartialIdentity::for_package(Ecosystem::Npm, "@scope/name");
        let pattern = BranchPattern::for_partial(&partial);

        let decoded = pattern.decode(&id.encode()).expect("branch should decode");
        assert_eq!(decoded.workspace, "packages-api");
    }

    #[test]
    fn structural_mismatch_decodes_to_none() {
        let partial = PartialIdentity::for_package(Ecosystem::Npm, "@scope/name");
        let pattern = BranchPattern::for_partial(&partial);

        assert_eq!(pattern.decode("main"), None);
        assert_eq!(pattern.decode("remedy/npm/ws/other_1.0.0_1.0.3"), None);
        assert_eq!(pattern.decode("remedy/npm/scope-name_1.0.0"), None);
    }

    #[test]
    fn unrelated_package_does_not_match() {
        let partial = PartialIdentity::for_package(Ecosystem::Npm, "left-pad");
        let pattern = BranchPattern::for_partial(&partial);
        assert!(!pattern.matches("remedy/npm/root/lodash_4.17.20_4.17.21"));
        assert!(pattern.matches("remedy/npm/root/left-pad_1.0.0_1.0.3"));
    }

    #[test]
    fn sanitize_is_idempotent_on_examples() {
        for raw in ["@scope/name", "packages/api", "a__b", "--x--", "1.0.0+build.5"] {
            let once = sanitize(raw);
            assert_eq!(sanitize(&once), once, "sanitize not idempotent for {raw}");
        }
    }

    #[test]
    fn sanitize_degrades_empty_to_filler() {
        assert_eq!(sanitize("///"), "x");
        assert_eq!(sanitize(""), "x");
    }

    proptest! {
        /// Any component sanitizes to a fixed point.
        #[test]
        fn sanitize_idempotent(raw in ".{0,40}") {
            let once = sanitize(&raw);
            prop_assert_eq!(sanitize(&once), once);
        }

        /// Branch names round-trip: decode then re-encode reproduces the
        /// same branch string, and the version fields survive exactly.
        #[test]
        fn encode_decode_round_trip(
            workspace in "[a-z][a-z0-9]{0,8}(/[a-z0-9]{1,8})?",
            name in "[a-z][a-z0-9-]{0,12}",
            old_patch in 0u64..50,
            new_patch in 0u64..50,
        ) {
            let id = BranchIdentity {
                ecosystem: Ecosystem::Npm,
                workspace: workspace.clone(),
                full_name: name.clone(),
                old_version: Version::new(1, 0, old_patch),
                new_version: Version::new(1, 0, new_patch),
            };
            let branch = id.encode();

            let partial = PartialIdentity::for_package(Ecosystem::Npm, &name)
                .in_workspace(&workspace);
            let pattern = BranchPattern::for_partial(&partial);
            let decoded = pattern.decode(&branch).expect("codec round trip");

            prop_assert_eq!(decoded.encode(), branch);
            prop_assert_eq!(decoded.old_version, id.old_version);
            prop_assert_eq!(decoded.new_version, id.new_version);
            prop_assert_eq!(decoded.workspace, workspace);
        }
    }
}
