//! Package identity types shared across the engine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Package ecosystems the engine can remediate.
///
/// Production collaborators currently exist for npm; the variant set grows
/// with each new [`crate::install::DependencyTreeProvider`] implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    /// The npm registry ecosystem (package.json manifests).
    Npm,
}

impl Ecosystem {
    /// Returns the lowercase ecosystem token used in PURLs and branch names.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Npm => "npm",
        }
    }
}

impl fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown ecosystem token.
#[derive(Debug, Error)]
#[error("unknown ecosystem `{0}`")]
pub struct InvalidEcosystem(String);

impl FromStr for Ecosystem {
    type Err = InvalidEcosystem;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "npm" => Ok(Self::Npm),
            other => Err(InvalidEcosystem(other.to_string())),
        }
    }
}

/// Identity of a package independent of any installed version: ecosystem
/// plus optional namespace plus name.
///
/// Ordering is (ecosystem, namespace, name), which gives remediation runs
/// their deterministic package processing order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PackageIdentity {
    /// Owning ecosystem.
    pub ecosystem: Ecosystem,
    /// Namespace/scope, without decoration (`scope`, not `@scope`).
    pub namespace: Option<String>,
    /// Bare package name.
    pub name: String,
}

impl PackageIdentity {
    /// Creates an npm package identity from a possibly-scoped name
    /// (`left-pad`, `@scope/name`).
    #[must_use]
    pub fn npm(full_name: &str) -> Self {
        match full_name.strip_prefix('@').and_then(|rest| rest.split_once('/')) {
            Some((scope, name)) => Self {
                ecosystem: Ecosystem::Npm,
                namespace: Some(scope.to_string()),
                name: name.to_string(),
            },
            None => Self {
                ecosystem: Ecosystem::Npm,
                namespace: None,
                name: full_name.to_string(),
            },
        }
    }

    /// The manifest-facing name, with namespace decoration (`@scope/name`).
    #[must_use]
    pub fn full_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("@{ns}/{}", self.name),
            None => self.name.clone(),
        }
    }

    /// The package URL form without a version (`pkg:npm/%40scope/name`).
    #[must_use]
    pub fn purl(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("pkg:{}/%40{ns}/{}", self.ecosystem, self.name),
            None => format!("pkg:{}/{}", self.ecosystem, self.name),
        }
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.ecosystem, self.full_name())
    }
}
