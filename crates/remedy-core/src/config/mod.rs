//! Run configuration.
//!
//! Parsed from a TOML file (`remedy.toml` by convention), every field
//! defaulted so an empty file is a valid local configuration. Credentials
//! come from the environment, never from the file.

use std::path::Path;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variables consulted for the forge token, in order.
pub const TOKEN_ENV_VARS: &[&str] = &["REMEDY_GITHUB_TOKEN", "GITHUB_TOKEN"];

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The TOML did not parse.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// `repository` is not `owner/repo`.
    #[error("invalid repository `{0}` (expected owner/repo)")]
    InvalidRepository(String),

    /// A publishing run needs a repository but none is configured.
    #[error("no repository configured")]
    MissingRepository,
}

/// Top-level remediation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemedyConfig {
    /// Repository to publish to, as `owner/repo`.
    pub repository: Option<String>,

    /// Base branch for attempt branches; the forge default branch when
    /// unset.
    pub base_branch: Option<String>,

    /// Global attempt budget; the run stops once it is reached.
    pub attempt_limit: u32,

    /// Pick the lowest eligible patch instead of the highest.
    pub min_satisfying: bool,

    /// Run the test script after each post-edit install.
    pub run_tests: bool,

    /// Script name the test hook runs.
    pub test_script: String,

    /// Enable auto-merge on freshly opened pull requests.
    pub auto_merge: bool,

    /// TTL for cached pull-request listings.
    #[serde(with = "humantime_serde")]
    pub cache_ttl: Duration,

    /// Record cap for the bulk pull-request listing tier.
    pub bulk_page_limit: u32,

    /// Force publish/no-publish mode; autodetected from `CI` when unset.
    pub unattended: Option<bool>,

    /// Author login used to recognize this engine's own pull requests.
    pub author: Option<String>,
}

impl Default for RemedyConfig {
    fn default() -> Self {
        Self {
            repository: None,
            base_branch: None,
            attempt_limit: default_attempt_limit(),
            min_satisfying: false,
            run_tests: false,
            test_script: default_test_script(),
            auto_merge: false,
            cache_ttl: default_cache_ttl(),
            bulk_page_limit: default_bulk_page_limit(),
            unattended: None,
            author: None,
        }
    }
}

const fn default_attempt_limit() -> u32 {
    10
}

fn default_test_script() -> String {
    "test".to_string()
}

const fn default_cache_ttl() -> Duration {
    Duration::from_secs(120)
}

const fn default_bulk_page_limit() -> u32 {
    200
}

impl RemedyConfig {
    /// Loads configuration from a TOML file. A missing file yields the
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file exists but cannot be read or
    /// parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on invalid TOML.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Splits `repository` into `(owner, repo)`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingRepository`] when unset and
    /// [`ConfigError::InvalidRepository`] when malformed.
    pub fn split_repository(&self) -> Result<(String, String), ConfigError> {
        let repository = self
            .repository
            .as_deref()
            .ok_or(ConfigError::MissingRepository)?;
        match repository.split_once('/') {
            Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
                Ok((owner.to_string(), repo.to_string()))
            },
            _ => Err(ConfigError::InvalidRepository(repository.to_string())),
        }
    }

    /// Whether this run publishes branches and pull requests.
    ///
    /// Explicit configuration wins; otherwise a non-empty `CI` environment
    /// variable means unattended.
    #[must_use]
    pub fn is_unattended(&self) -> bool {
        self.unattended.unwrap_or_else(|| {
            std::env::var("CI").map(|v| !v.is_empty()).unwrap_or(false)
        })
    }
}

/// Resolves the forge token from the environment, first match wins.
#[must_use]
pub fn resolve_forge_token() -> Option<SecretString> {
    TOKEN_ENV_VARS
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
        .map(SecretString::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_is_all_defaults() {
        let config = RemedyConfig::from_toml("").unwrap();
        assert_eq!(config.attempt_limit, 10);
        assert_eq!(config.test_script, "test");
        assert_eq!(config.cache_ttl, Duration::from_secs(120));
        assert!(!config.run_tests);
    }

    #[test]
    fn fields_parse_from_toml() {
        let config = RemedyConfig::from_toml(
            r#"
repository = "acme/widgets"
attempt_limit = 3
run_tests = true
test_script = "ci"
cache_ttl = "30s"
unattended = true
"#,
        )
        .unwrap();
        assert_eq!(config.attempt_limit, 3);
        assert!(config.run_tests);
        assert_eq!(config.test_script, "ci");
        assert_eq!(config.cache_ttl, Duration::from_secs(30));
        assert!(config.is_unattended());
        assert_eq!(
            config.split_repository().unwrap(),
            ("acme".to_string(), "widgets".to_string())
        );
    }

    #[test]
    fn malformed_repository_is_rejected() {
        let config = RemedyConfig {
            repository: Some("not-a-repo".to_string()),
            ..RemedyConfig::default()
        };
        assert!(matches!(
            config.split_repository(),
            Err(ConfigError::InvalidRepository(_))
        ));
    }

    #[test]
    fn missing_repository_is_its_own_error() {
        let config = RemedyConfig::default();
        assert!(matches!(
            config.split_repository(),
            Err(ConfigError::MissingRepository)
        ));
    }

    #[test]
    fn explicit_unattended_overrides_environment() {
        let config = RemedyConfig {
            unattended: Some(false),
            ..RemedyConfig::default()
        };
        assert!(!config.is_unattended());
    }
}
