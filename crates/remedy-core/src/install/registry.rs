//! Published-version lookup.
//!
//! The resolver needs the full list of published versions for a package;
//! this is the collaborator that supplies it, with a production
//! implementation over the npm registry's packument endpoint.

use async_trait::async_trait;
use semver::Version;
use serde_json::Value;
use thiserror::Error;

use crate::package::PackageIdentity;

/// Errors raised by registry lookups.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RegistryError {
    /// Request transport failed.
    #[error("registry transport error: {0}")]
    Transport(String),

    /// Registry answered with a failure status.
    #[error("registry responded {status} for {package}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Package that was requested.
        package: String,
    },

    /// Response payload did not parse.
    #[error("registry parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for RegistryError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(value.to_string())
    }
}

/// Lists published versions for a package.
#[async_trait]
pub trait PackageRegistry: Send + Sync {
    /// Published versions, unordered; callers impose their own selection.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] when the registry cannot answer.
    async fn available_versions(
        &self,
        package: &PackageIdentity,
    ) -> Result<Vec<Version>, RegistryError>;
}

/// npm registry packument client.
#[derive(Debug, Clone)]
pub struct NpmRegistry {
    http: reqwest::Client,
    base: String,
}

impl NpmRegistry {
    /// Points at the public npm registry.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Transport`] when the HTTP client cannot be
    /// constructed.
    pub fn new() -> Result<Self, RegistryError> {
        Self::with_base("https://registry.npmjs.org")
    }

    /// Points at a custom registry base URL.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Transport`] when the HTTP client cannot be
    /// constructed.
    pub fn with_base(base: &str) -> Result<Self, RegistryError> {
        let http = reqwest::Client::builder()
            .user_agent("remedy")
            .build()
            .map_err(|e| RegistryError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_string(),
        })
    }
}

/// Extracts version keys from a packument payload.
fn versions_from_packument(payload: &Value) -> Vec<Version> {
    payload
        .get("versions")
        .and_then(Value::as_object)
        .map(|versions| {
            versions
                .keys()
                .filter_map(|key| Version::parse(key).ok())
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl PackageRegistry for NpmRegistry {
    async fn available_versions(
        &self,
        package: &PackageIdentity,
    ) -> Result<Vec<Version>, RegistryError> {
        // Scoped names keep their `/` percent-encoded in the packument path.
        let path = package.full_name().replace('/', "%2F");
        let response = self
            .http
            .get(format!("{}/{path}", self.base))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RegistryError::Status {
                status: status.as_u16(),
                package: package.full_name(),
            });
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| RegistryError::Parse(e.to_string()))?;
        Ok(versions_from_packument(&payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packument_versions_parse() {
        let payload = serde_json::json!({
            "name": "left-pad",
            "versions": {
                "1.0.0": {},
                "1.0.3": {},
                "not-a-version": {},
            }
        });
        let versions = versions_from_packument(&payload);
        assert_eq!(versions.len(), 2);
    }

    #[test]
    fn packument_without_versions_is_empty() {
        assert!(versions_from_packument(&serde_json::json!({})).is_empty());
    }
}
