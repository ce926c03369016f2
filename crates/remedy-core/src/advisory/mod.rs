//! Vulnerability alerts and the intelligence collaborator interface.
//!
//! Alerts arrive from an external intelligence source at run start, get
//! deduplicated per package by advisory key, and are grouped into the
//! deterministic processing order the orchestrator iterates.

pub mod github;

use std::collections::HashMap;

use async_trait::async_trait;
use semver::Version;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::package::PackageIdentity;
use crate::resolver::VersionRange;

/// Advisory severity levels, ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Low severity.
    Low,
    /// Moderate severity.
    Moderate,
    /// High severity.
    High,
    /// Critical severity.
    Critical,
}

impl Severity {
    /// Parses a severity token leniently (any case), `None` on unknowns.
    #[must_use]
    pub fn parse_lenient(text: &str) -> Option<Self> {
        match text.to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "moderate" | "medium" => Some(Self::Moderate),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }

    /// Returns the lowercase severity token.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Moderate => "moderate",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One known issue affecting a package.
#[derive(Debug, Clone)]
pub struct VulnerabilityAlert {
    /// Public advisory identifier (GHSA or CVE).
    pub id: String,
    /// The affected package.
    pub package: PackageIdentity,
    /// Versions the advisory applies to; `None` when the feed's range text
    /// did not parse (the alert is still reported, nothing is excluded).
    pub vulnerable_range: Option<VersionRange>,
    /// First version the advisory reports as patched.
    pub first_patched: Option<Version>,
    /// Severity, when the feed supplied a recognizable value.
    pub severity: Option<Severity>,
    /// Whether the feed believes a fix is available.
    pub fixable: bool,
}

impl VulnerabilityAlert {
    /// Deduplication key: advisory id plus range text.
    #[must_use]
    pub fn key(&self) -> (String, String) {
        (
            self.id.clone(),
            self.vulnerable_range
                .as_ref()
                .map(|r| r.as_str().to_string())
                .unwrap_or_default(),
        )
    }
}

/// Alerts for one package, in collaborator order.
///
/// Alert ordering inside a group is the intelligence source's business —
/// consolidation and prioritization happen there, not here.
#[derive(Debug, Clone)]
pub struct AlertGroup {
    /// The affected package.
    pub package: PackageIdentity,
    /// Deduplicated alerts, source order preserved.
    pub alerts: Vec<VulnerabilityAlert>,
}

/// Groups raw lookup results into deterministic processing order:
/// groups sorted by package identity, alerts deduplicated by advisory key.
#[must_use]
pub fn group_alerts(
    lookup: HashMap<PackageIdentity, Vec<VulnerabilityAlert>>,
) -> Vec<AlertGroup> {
    let mut groups: Vec<AlertGroup> = lookup
        .into_iter()
        .map(|(package, alerts)| {
            let mut seen = std::collections::HashSet::new();
            let alerts = alerts
                .into_iter()
                .filter(|alert| seen.insert(alert.key()))
                .collect();
            AlertGroup { package, alerts }
        })
        .filter(|group| !group.alerts.is_empty())
        .collect();
    groups.sort_by(|a, b| a.package.cmp(&b.package));
    groups
}

/// Errors from the intelligence collaborator.
///
/// The transient/permanent split is the caller's retry contract: permanent
/// failures abort the run, transient ones are retryable by whoever invoked
/// it (never retried internally).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AdvisoryError {
    /// Temporary failure; the same call may succeed shortly.
    #[error("transient advisory lookup failure: {message}")]
    Transient {
        /// Failure description.
        message: String,
    },

    /// Permanent failure; retrying will not help.
    #[error("advisory lookup failed: {message}")]
    Permanent {
        /// Failure description.
        message: String,
    },
}

impl AdvisoryError {
    /// Whether this failure is worth retrying.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Vulnerability-intelligence lookup interface.
#[async_trait]
pub trait AdvisoryClient: Send + Sync {
    /// Returns known alerts for the given packages, keyed by package.
    ///
    /// Packages without alerts may be absent from the map.
    ///
    /// # Errors
    ///
    /// Returns [`AdvisoryError`] with the transient/permanent distinction
    /// described on the type.
    async fn lookup(
        &self,
        packages: &[PackageIdentity],
    ) -> Result<HashMap<PackageIdentity, Vec<VulnerabilityAlert>>, AdvisoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(id: &str, range: &str) -> VulnerabilityAlert {
        VulnerabilityAlert {
            id: id.to_string(),
            package: PackageIdentity::npm("left-pad"),
            vulnerable_range: Some(VersionRange::parse(range).unwrap()),
            first_patched: None,
            severity: Some(Severity::High),
            fixable: true,
        }
    }

    #[test]
    fn groups_sort_by_package_identity() {
        let mut lookup = HashMap::new();
        lookup.insert(PackageIdentity::npm("zzz"), vec![alert("GHSA-1", "<1.0.0")]);
        lookup.insert(PackageIdentity::npm("aaa"), vec![alert("GHSA-2", "<2.0.0")]);

        let groups = group_alerts(lookup);
        assert_eq!(groups[0].package.name, "aaa");
        assert_eq!(groups[1].package.name, "zzz");
    }

    #[test]
    fn duplicate_alert_keys_are_dropped() {
        let mut lookup = HashMap::new();
        lookup.insert(
            PackageIdentity::npm("left-pad"),
            vec![
                alert("GHSA-1", "<1.0.3"),
                alert("GHSA-1", "<1.0.3"),
                alert("GHSA-1", "<1.0.5"),
            ],
        );

        let groups = group_alerts(lookup);
        assert_eq!(groups[0].alerts.len(), 2);
    }

    #[test]
    fn alert_order_within_group_is_preserved() {
        let mut lookup = HashMap::new();
        lookup.insert(
            PackageIdentity::npm("left-pad"),
            vec![alert("GHSA-9", "<1.0.3"), alert("GHSA-1", "<1.0.5")],
        );

        let groups = group_alerts(lookup);
        let ids: Vec<&str> = groups[0].alerts.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["GHSA-9", "GHSA-1"]);
    }

    #[test]
    fn empty_groups_are_dropped() {
        let mut lookup = HashMap::new();
        lookup.insert(PackageIdentity::npm("clean"), Vec::new());
        assert!(group_alerts(lookup).is_empty());
    }

    #[test]
    fn severity_parses_leniently() {
        assert_eq!(Severity::parse_lenient("MODERATE"), Some(Severity::Moderate));
        assert_eq!(Severity::parse_lenient("medium"), Some(Severity::Moderate));
        assert_eq!(Severity::parse_lenient("weird"), None);
    }
}
