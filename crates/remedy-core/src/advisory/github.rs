//! GitHub security-advisory intelligence source.
//!
//! Queries the GraphQL `securityVulnerabilities` connection per package and
//! maps results into [`VulnerabilityAlert`]s. Transport and 5xx failures
//! are transient; everything else is permanent.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use super::{AdvisoryClient, AdvisoryError, Severity, VulnerabilityAlert};
use crate::forge::ForgeError;
use crate::forge::github::GitHubApi;
use crate::package::{Ecosystem, PackageIdentity};
use crate::resolver::{VersionRange, coerce};

const VULNERABILITIES_QUERY: &str = r"
query($ecosystem: SecurityAdvisoryEcosystem!, $package: String!, $cursor: String) {
  securityVulnerabilities(ecosystem: $ecosystem, package: $package,
                          first: 100, after: $cursor) {
    pageInfo { hasNextPage endCursor }
    nodes {
      vulnerableVersionRange
      severity
      firstPatchedVersion { identifier }
      advisory { ghsaId }
    }
  }
}";

/// [`AdvisoryClient`] over the GitHub advisory database.
pub struct GitHubAdvisoryClient {
    api: Arc<GitHubApi>,
}

impl GitHubAdvisoryClient {
    /// Creates a client over an authenticated transport.
    #[must_use]
    pub fn new(api: Arc<GitHubApi>) -> Self {
        Self { api }
    }

    async fn alerts_for(
        &self,
        package: &PackageIdentity,
    ) -> Result<Vec<VulnerabilityAlert>, AdvisoryError> {
        let ecosystem_token = match package.ecosystem {
            Ecosystem::Npm => "NPM",
        };
        let mut alerts = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let payload = self
                .api
                .graphql(
                    VULNERABILITIES_QUERY,
                    json!({
                        "ecosystem": ecosystem_token,
                        "package": package.full_name(),
                        "cursor": cursor,
                    }),
                )
                .await
                .map_err(classify)?;

            let connection = payload
                .pointer("/data/securityVulnerabilities")
                .ok_or_else(|| AdvisoryError::Permanent {
                    message: "missing securityVulnerabilities connection".to_string(),
                })?;
            let nodes = connection
                .get("nodes")
                .and_then(Value::as_array)
                .ok_or_else(|| AdvisoryError::Permanent {
                    message: "missing securityVulnerabilities nodes".to_string(),
                })?;
            alerts.extend(nodes.iter().map(|node| alert_from_node(package, node)));

            let has_next = connection
                .pointer("/pageInfo/hasNextPage")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            if !has_next {
                break;
            }
            cursor = connection
                .pointer("/pageInfo/endCursor")
                .and_then(Value::as_str)
                .map(str::to_string);
        }

        debug!(package = %package, count = alerts.len(), "advisory lookup complete");
        Ok(alerts)
    }
}

fn classify(error: ForgeError) -> AdvisoryError {
    match error {
        ForgeError::Transport(message) => AdvisoryError::Transient { message },
        ForgeError::Api { status, message } if status >= 500 => AdvisoryError::Transient {
            message: format!("API responded {status}: {message}"),
        },
        other => AdvisoryError::Permanent {
            message: other.to_string(),
        },
    }
}

fn alert_from_node(package: &PackageIdentity, node: &Value) -> VulnerabilityAlert {
    let raw_range = node
        .get("vulnerableVersionRange")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let first_patched = node
        .pointer("/firstPatchedVersion/identifier")
        .and_then(Value::as_str)
        .and_then(coerce);

    VulnerabilityAlert {
        id: node
            .pointer("/advisory/ghsaId")
            .and_then(Value::as_str)
            .unwrap_or("unknown-advisory")
            .to_string(),
        package: package.clone(),
        vulnerable_range: VersionRange::parse(raw_range).ok(),
        fixable: first_patched.is_some(),
        first_patched,
        severity: node
            .get("severity")
            .and_then(Value::as_str)
            .and_then(Severity::parse_lenient),
    }
}

#[async_trait]
impl AdvisoryClient for GitHubAdvisoryClient {
    async fn lookup(
        &self,
        packages: &[PackageIdentity],
    ) -> Result<HashMap<PackageIdentity, Vec<VulnerabilityAlert>>, AdvisoryError> {
        let mut results = HashMap::new();
        for package in packages {
            let alerts = self.alerts_for(package).await?;
            if !alerts.is_empty() {
                results.insert(package.clone(), alerts);
            }
        }
        Ok(results)
    }
}
