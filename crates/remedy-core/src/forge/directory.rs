//! Remediation pull-request discovery.
//!
//! Two-tier fetch: a cheap bulk listing first (newest-first, bounded), and
//! only when that yields zero matches, the exhaustive paginated listing.
//! The bulk tier's page cap can in principle hide an older matching pull
//! request behind newer unrelated ones; that trade-off is deliberate and
//! kept as-is.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::types::{PrState, PullRequestRecord};
use super::{ForgeClient, ForgeError, ResponseCache};
use crate::branch::BranchPattern;

/// Default number of records the bulk tier may fetch.
pub const DEFAULT_BULK_LIMIT: u32 = 200;

/// Filter applied client-side to listed pull requests.
#[derive(Debug, Clone)]
pub struct DirectoryFilter {
    /// Restrict to this author login, when set.
    pub author: Option<String>,
    /// Branch-identity pattern head refs must match.
    pub pattern: BranchPattern,
    /// Acceptable pull request states; empty means any.
    pub states: Vec<PrState>,
}

impl DirectoryFilter {
    fn admits(&self, record: &PullRequestRecord) -> bool {
        if let Some(author) = &self.author {
            if record.author != *author {
                return false;
            }
        }
        if !self.states.is_empty() && !self.states.contains(&record.state) {
            return false;
        }
        self.pattern.matches(&record.head_ref)
    }
}

/// Fetches and matches remediation pull requests for one repository.
pub struct PrDirectory {
    forge: Arc<dyn ForgeClient>,
    cache: Arc<dyn ResponseCache>,
    ttl: Duration,
    bulk_limit: u32,
}

impl PrDirectory {
    /// Creates a directory over `forge`, caching listings in `cache`.
    #[must_use]
    pub fn new(forge: Arc<dyn ForgeClient>, cache: Arc<dyn ResponseCache>, ttl: Duration) -> Self {
        Self {
            forge,
            cache,
            ttl,
            bulk_limit: DEFAULT_BULK_LIMIT,
        }
    }

    /// Overrides the bulk-tier record cap.
    #[must_use]
    pub const fn with_bulk_limit(mut self, limit: u32) -> Self {
        self.bulk_limit = limit;
        self
    }

    /// Lists pull requests matching `filter`, decoding each matching
    /// record's branch identity.
    ///
    /// # Errors
    ///
    /// Returns [`ForgeError`] when both listing tiers fail. A bulk-tier
    /// failure alone degrades to the full listing.
    pub async fn list(
        &self,
        filter: &DirectoryFilter,
    ) -> Result<Vec<PullRequestRecord>, ForgeError> {
        let bulk = match self.listing("bulk").await {
            Ok(records) => records,
            Err(error) => {
                warn!(%error, "bulk pull-request listing failed; trying full listing");
                Vec::new()
            },
        };

        let mut matches = Self::matching(bulk, filter);
        if matches.is_empty() {
            debug!(repo = self.forge.repo_id(), "no bulk matches; falling back to full listing");
            matches = Self::matching(self.listing("full").await?, filter);
        }
        Ok(matches)
    }

    /// Drops cached listings (after a create/close mutated remote state).
    pub fn invalidate(&self) {
        self.cache.clear();
    }

    fn matching(
        records: Vec<PullRequestRecord>,
        filter: &DirectoryFilter,
    ) -> Vec<PullRequestRecord> {
        records
            .into_iter()
            .filter(|record| filter.admits(record))
            .map(|mut record| {
                record.identity = filter.pattern.decode(&record.head_ref);
                record
            })
            .collect()
    }

    async fn listing(&self, tier: &str) -> Result<Vec<PullRequestRecord>, ForgeError> {
        let key = format!("{}/pulls/{tier}", self.forge.repo_id());
        if let Some(cached) = self.cache.get(&key) {
            if let Ok(records) = serde_json::from_str::<Vec<PullRequestRecord>>(&cached) {
                debug!(key, "pull-request listing served from cache");
                return Ok(records);
            }
        }

        let records = match tier {
            "bulk" => self.forge.list_pull_requests_bulk(self.bulk_limit).await?,
            _ => self.forge.list_pull_requests_full().await?,
        };

        if let Ok(serialized) = serde_json::to_string(&records) {
            self.cache.set(&key, serialized, self.ttl);
        }
        Ok(records)
    }
}
