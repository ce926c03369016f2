//! Pull-request and commit rendering.
//!
//! Titles, bodies, and commit messages are deterministic functions of the
//! attempt identity and its alert, so re-runs produce byte-identical
//! output.

use crate::advisory::VulnerabilityAlert;
use crate::branch::{BranchIdentity, ROOT_WORKSPACE};

/// Commit message for an attempt branch.
#[must_use]
pub fn commit_message(identity: &BranchIdentity) -> String {
    format!(
        "fix(deps): upgrade {} from {} to {}",
        identity.full_name, identity.old_version, identity.new_version
    )
}

/// Pull request title for an attempt.
#[must_use]
pub fn pr_title(identity: &BranchIdentity) -> String {
    if identity.workspace == ROOT_WORKSPACE {
        format!(
            "Upgrade {} from {} to {}",
            identity.full_name, identity.old_version, identity.new_version
        )
    } else {
        format!(
            "Upgrade {} from {} to {} in {}",
            identity.full_name, identity.old_version, identity.new_version, identity.workspace
        )
    }
}

/// Pull request body for an attempt.
#[must_use]
pub fn pr_body(identity: &BranchIdentity, alert: &VulnerabilityAlert) -> String {
    let mut body = String::new();
    body.push_str(&format!(
        "Upgrades `{}` from `{}` to `{}`, the best non-vulnerable version \
         within the installed major.\n\n",
        identity.full_name, identity.old_version, identity.new_version
    ));
    body.push_str(&format!("- Advisory: {}\n", alert.id));
    if let Some(severity) = alert.severity {
        body.push_str(&format!("- Severity: {severity}\n"));
    }
    if let Some(range) = &alert.vulnerable_range {
        body.push_str(&format!("- Vulnerable range: `{range}`\n"));
    }
    if let Some(first_patched) = &alert.first_patched {
        body.push_str(&format!("- First patched version: `{first_patched}`\n"));
    }
    if identity.workspace != ROOT_WORKSPACE {
        body.push_str(&format!("- Workspace: `{}`\n", identity.workspace));
    }
    body.push_str(
        "\nThe change was verified by reinstalling the dependency tree before \
         this pull request was opened.\n",
    );
    body
}
