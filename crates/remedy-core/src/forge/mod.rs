//! Provider-agnostic code-hosting (forge) interfaces.

pub mod cache;
pub mod directory;
pub mod github;
pub mod types;

use async_trait::async_trait;
use thiserror::Error;

pub use cache::{MemoryCache, ResponseCache};
pub use directory::{DirectoryFilter, PrDirectory};
pub use types::{AutoMergeOutcome, CreatePrArgs, MergeReadiness, PrState, PullRequestRecord};

/// Errors emitted by forge providers.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ForgeError {
    /// Invalid provider configuration.
    #[error("forge configuration error: {0}")]
    Configuration(String),

    /// Provider authentication failed.
    #[error("forge authentication error: {0}")]
    Authentication(String),

    /// Request transport failed.
    #[error("forge transport error: {0}")]
    Transport(String),

    /// API request failed with a structured status code.
    #[error("forge API error ({status}): {message}")]
    Api {
        /// HTTP status code returned by the forge API.
        status: u16,
        /// Error body/message.
        message: String,
    },

    /// API payload parse failed.
    #[error("forge parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for ForgeError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transport(value.to_string())
    }
}

impl From<serde_json::Error> for ForgeError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value.to_string())
    }
}

/// Provider-agnostic forge interface for the remediation run.
///
/// A client is bound to one `owner/repo` at construction.
#[async_trait]
pub trait ForgeClient: Send + Sync {
    /// Returns the repository identifier (`owner/repo`).
    fn repo_id(&self) -> &str;

    /// Bulk-lists the most recent pull requests, newest first, bounded by
    /// `max` records. Cheap, but may miss older pull requests.
    ///
    /// # Errors
    ///
    /// Returns an error when listing fails or authorization is denied.
    async fn list_pull_requests_bulk(&self, max: u32)
        -> Result<Vec<PullRequestRecord>, ForgeError>;

    /// Exhaustively lists pull requests via full pagination. Expensive,
    /// but complete.
    ///
    /// # Errors
    ///
    /// Returns an error when listing fails or authorization is denied.
    async fn list_pull_requests_full(&self) -> Result<Vec<PullRequestRecord>, ForgeError>;

    /// Creates a pull request.
    ///
    /// # Errors
    ///
    /// Returns an error when creation fails or is unauthorized.
    async fn create_pull_request(
        &self,
        args: &CreatePrArgs,
    ) -> Result<PullRequestRecord, ForgeError>;

    /// Closes a pull request without merging.
    ///
    /// # Errors
    ///
    /// Returns an error when the update fails.
    async fn close_pull_request(&self, number: u64) -> Result<(), ForgeError>;

    /// Merges `base` into `head` (brings a stale attempt branch up to
    /// date with its base branch).
    ///
    /// # Errors
    ///
    /// Returns an error when the merge cannot be performed (conflicts,
    /// permissions, missing refs).
    async fn merge_branches(&self, base: &str, head: &str) -> Result<(), ForgeError>;

    /// Enables auto-merge for a pull request. Failure is reported in the
    /// outcome, not as an error — a pull request that exists but will not
    /// auto-merge is still a success.
    ///
    /// # Errors
    ///
    /// Returns an error only when the provider cannot be reached at all.
    async fn enable_auto_merge(&self, number: u64) -> Result<AutoMergeOutcome, ForgeError>;

    /// Returns the repository default branch.
    ///
    /// # Errors
    ///
    /// Returns an error when repository metadata cannot be read.
    async fn default_branch(&self) -> Result<String, ForgeError>;
}
