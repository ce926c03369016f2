//! GitHub forge provider.
//!
//! Speaks both API tiers: the GraphQL endpoint for bulk pull-request
//! listing and auto-merge, REST for everything else. The token never
//! appears in `Debug` output or error messages.

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};

use super::types::{
    AutoMergeOutcome, CreatePrArgs, MergeReadiness, PrState, PullRequestRecord,
};
use super::{ForgeClient, ForgeError};

const DEFAULT_API_BASE: &str = "https://api.github.com";
const REST_PAGE_SIZE: u32 = 100;

/// Shared authenticated transport for one GitHub host.
pub struct GitHubApi {
    http: reqwest::Client,
    token: SecretString,
    rest_base: String,
}

impl std::fmt::Debug for GitHubApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubApi")
            .field("rest_base", &self.rest_base)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl GitHubApi {
    /// Creates a transport against the public GitHub API.
    ///
    /// # Errors
    ///
    /// Returns [`ForgeError::Configuration`] when the HTTP client cannot
    /// be constructed.
    pub fn new(token: SecretString) -> Result<Self, ForgeError> {
        Self::with_base(token, DEFAULT_API_BASE)
    }

    /// Creates a transport against a custom API base (enterprise hosts,
    /// test servers).
    ///
    /// # Errors
    ///
    /// Returns [`ForgeError::Configuration`] when the HTTP client cannot
    /// be constructed.
    pub fn with_base(token: SecretString, rest_base: &str) -> Result<Self, ForgeError> {
        let http = reqwest::Client::builder()
            .user_agent("remedy")
            .build()
            .map_err(|e| ForgeError::Configuration(e.to_string()))?;
        Ok(Self {
            http,
            token,
            rest_base: rest_base.trim_end_matches('/').to_string(),
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .bearer_auth(self.token.expose_secret())
            .header("Accept", "application/vnd.github+json")
    }

    async fn read_response(response: reqwest::Response) -> Result<Value, ForgeError> {
        let status = response.status();
        let body = response.text().await?;
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ForgeError::Authentication(format!(
                "API responded {status}"
            )));
        }
        if !status.is_success() {
            return Err(ForgeError::Api {
                status: status.as_u16(),
                message: truncate(&body, 300),
            });
        }
        if body.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }

    /// Issues a GraphQL query, surfacing GraphQL-level errors as
    /// [`ForgeError::Api`].
    pub async fn graphql(&self, query: &str, variables: Value) -> Result<Value, ForgeError> {
        let response = self
            .authorize(self.http.post(format!("{}/graphql", self.rest_base)))
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;
        let payload = Self::read_response(response).await?;

        if let Some(errors) = payload.get("errors").and_then(Value::as_array) {
            if !errors.is_empty() {
                let message = errors
                    .iter()
                    .filter_map(|e| e.get("message").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("; ");
                return Err(ForgeError::Api {
                    status: 200,
                    message,
                });
            }
        }
        Ok(payload)
    }

    /// Issues a REST GET against `path` (leading slash included).
    pub async fn rest_get(&self, path: &str) -> Result<Value, ForgeError> {
        let response = self
            .authorize(self.http.get(format!("{}{path}", self.rest_base)))
            .send()
            .await?;
        Self::read_response(response).await
    }

    /// Issues a REST POST against `path`.
    pub async fn rest_post(&self, path: &str, body: Value) -> Result<Value, ForgeError> {
        let response = self
            .authorize(self.http.post(format!("{}{path}", self.rest_base)))
            .json(&body)
            .send()
            .await?;
        Self::read_response(response).await
    }

    /// Issues a REST PATCH against `path`.
    pub async fn rest_patch(&self, path: &str, body: Value) -> Result<Value, ForgeError> {
        let response = self
            .authorize(self.http.patch(format!("{}{path}", self.rest_base)))
            .json(&body)
            .send()
            .await?;
        Self::read_response(response).await
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        text.to_string()
    } else {
        let mut end = max;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &text[..end])
    }
}

/// GitHub [`ForgeClient`] bound to one repository.
#[derive(Debug)]
pub struct GitHubForge {
    api: std::sync::Arc<GitHubApi>,
    owner: String,
    repo: String,
    repo_id: String,
}

impl GitHubForge {
    /// Binds a transport to `owner/repo`.
    #[must_use]
    pub fn new(api: std::sync::Arc<GitHubApi>, owner: &str, repo: &str) -> Self {
        Self {
            api,
            owner: owner.to_string(),
            repo: repo.to_string(),
            repo_id: format!("{owner}/{repo}"),
        }
    }

    fn pulls_path(&self, suffix: &str) -> String {
        format!("/repos/{}/{}/pulls{suffix}", self.owner, self.repo)
    }
}

const BULK_QUERY: &str = r"
query($owner: String!, $repo: String!, $pageSize: Int!, $cursor: String) {
  repository(owner: $owner, name: $repo) {
    pullRequests(first: $pageSize, after: $cursor,
                 orderBy: { field: CREATED_AT, direction: DESC }) {
      pageInfo { hasNextPage endCursor }
      nodes {
        number
        title
        state
        headRefName
        baseRefName
        url
        mergedAt
        mergeStateStatus
        author { login }
      }
    }
  }
}";

fn record_from_graphql(node: &Value) -> Option<PullRequestRecord> {
    let state = match node.get("state").and_then(Value::as_str)? {
        "OPEN" => PrState::Open,
        "MERGED" => PrState::Merged,
        _ => PrState::Closed,
    };
    Some(PullRequestRecord {
        number: node.get("number").and_then(Value::as_u64)?,
        title: node.get("title").and_then(Value::as_str)?.to_string(),
        author: node
            .pointer("/author/login")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        head_ref: node.get("headRefName").and_then(Value::as_str)?.to_string(),
        base_ref: node.get("baseRefName").and_then(Value::as_str)?.to_string(),
        state,
        merge_readiness: node
            .get("mergeStateStatus")
            .and_then(Value::as_str)
            .map_or(MergeReadiness::Unknown, MergeReadiness::from_graphql),
        merged_at: parse_timestamp(node.get("mergedAt")),
        url: node.get("url").and_then(Value::as_str).unwrap_or_default().to_string(),
        identity: None,
    })
}

fn parse_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    value
        .and_then(Value::as_str)
        .and_then(|text| DateTime::parse_from_rfc3339(text).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn record_from_rest(node: &Value) -> Option<PullRequestRecord> {
    let merged_at = parse_timestamp(node.get("merged_at"));
    // REST has no first-class merged state: closed plus a merge timestamp
    // means merged.
    let state = match node.get("state").and_then(Value::as_str)? {
        "open" => PrState::Open,
        _ if merged_at.is_some() => PrState::Merged,
        _ => PrState::Closed,
    };
    Some(PullRequestRecord {
        number: node.get("number").and_then(Value::as_u64)?,
        title: node.get("title").and_then(Value::as_str)?.to_string(),
        author: node
            .pointer("/user/login")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        head_ref: node.pointer("/head/ref").and_then(Value::as_str)?.to_string(),
        base_ref: node.pointer("/base/ref").and_then(Value::as_str)?.to_string(),
        state,
        merge_readiness: node
            .get("mergeable_state")
            .and_then(Value::as_str)
            .map_or(MergeReadiness::Unknown, MergeReadiness::from_rest),
        merged_at,
        url: node
            .get("html_url")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        identity: None,
    })
}

#[async_trait::async_trait]
impl ForgeClient for GitHubForge {
    fn repo_id(&self) -> &str {
        &self.repo_id
    }

    async fn list_pull_requests_bulk(
        &self,
        max: u32,
    ) -> Result<Vec<PullRequestRecord>, ForgeError> {
        let mut records = Vec::new();
        let mut cursor: Option<String> = None;
        let page_size = max.min(100).max(1);

        while (records.len() as u32) < max {
            let payload = self
                .api
                .graphql(
                    BULK_QUERY,
                    json!({
                        "owner": self.owner,
                        "repo": self.repo,
                        "pageSize": page_size,
                        "cursor": cursor,
                    }),
                )
                .await?;

            let connection = payload
                .pointer("/data/repository/pullRequests")
                .ok_or_else(|| ForgeError::Parse("missing pullRequests connection".into()))?;
            let nodes = connection
                .get("nodes")
                .and_then(Value::as_array)
                .ok_or_else(|| ForgeError::Parse("missing pullRequests nodes".into()))?;
            records.extend(nodes.iter().filter_map(record_from_graphql));

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

        records.truncate(max as usize);
        Ok(records)
    }

    async fn list_pull_requests_full(&self) -> Result<Vec<PullRequestRecord>, ForgeError> {
        let mut records = Vec::new();
        let mut page = 1u32;

        loop {
            let payload = self
                .api
                .rest_get(&self.pulls_path(&format!(
                    "?state=all&per_page={REST_PAGE_SIZE}&page={page}"
                )))
                .await?;
            let nodes = payload
                .as_array()
                .ok_or_else(|| ForgeError::Parse("pull listing is not an array".into()))?;
            if nodes.is_empty() {
                break;
            }
            records.extend(nodes.iter().filter_map(record_from_rest));
            if nodes.len() < REST_PAGE_SIZE as usize {
                break;
            }
            page += 1;
        }
        Ok(records)
    }

    async fn create_pull_request(
        &self,
        args: &CreatePrArgs,
    ) -> Result<PullRequestRecord, ForgeError> {
        let payload = self
            .api
            .rest_post(
                &self.pulls_path(""),
                json!({
                    "title": args.title,
                    "body": args.body,
                    "head": args.head,
                    "base": args.base,
                }),
            )
            .await?;
        record_from_rest(&payload)
            .ok_or_else(|| ForgeError::Parse("unrecognized create-PR response".into()))
    }

    async fn close_pull_request(&self, number: u64) -> Result<(), ForgeError> {
        self.api
            .rest_patch(
                &self.pulls_path(&format!("/{number}")),
                json!({ "state": "closed" }),
            )
            .await?;
        Ok(())
    }

    async fn merge_branches(&self, base: &str, head: &str) -> Result<(), ForgeError> {
        // The merges endpoint merges `head` into `base`; bringing an
        // attempt branch up to date means merging the base branch into it.
        self.api
            .rest_post(
                &format!("/repos/{}/{}/merges", self.owner, self.repo),
                json!({ "base": head, "head": base }),
            )
            .await?;
        Ok(())
    }

    async fn enable_auto_merge(&self, number: u64) -> Result<AutoMergeOutcome, ForgeError> {
        let detail = self
            .api
            .rest_get(&self.pulls_path(&format!("/{number}")))
            .await?;
        let Some(node_id) = detail.get("node_id").and_then(Value::as_str) else {
            return Ok(AutoMergeOutcome {
                enabled: false,
                details: Some("pull request has no node id".to_string()),
            });
        };

        let mutation = r"
mutation($id: ID!) {
  enablePullRequestAutoMerge(input: { pullRequestId: $id, mergeMethod: SQUASH }) {
    pullRequest { number }
  }
}";
        match self.api.graphql(mutation, json!({ "id": node_id })).await {
            Ok(_) => Ok(AutoMergeOutcome {
                enabled: true,
                details: None,
            }),
            Err(ForgeError::Transport(message)) => Err(ForgeError::Transport(message)),
            Err(other) => Ok(AutoMergeOutcome {
                enabled: false,
                details: Some(other.to_string()),
            }),
        }
    }

    async fn default_branch(&self) -> Result<String, ForgeError> {
        let payload = self
            .api
            .rest_get(&format!("/repos/{}/{}", self.owner, self.repo))
            .await?;
        payload
            .get("default_branch")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ForgeError::Parse("repository has no default branch".into()))
    }
}
