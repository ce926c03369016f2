//! CLI subcommands.

pub mod fix;
pub mod plan;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use remedy_core::advisory::AdvisoryClient;
use remedy_core::advisory::github::GitHubAdvisoryClient;
use remedy_core::config::{RemedyConfig, resolve_forge_token};
use remedy_core::forge::github::{GitHubApi, GitHubForge};
use remedy_core::forge::{ForgeClient, MemoryCache, PrDirectory};
use remedy_core::install::{
    DependencyTreeProvider, NpmProvider, NpmRegistry, NpmScriptRunner, PackageRegistry,
    SafeReify, ScriptRunner,
};
use remedy_core::lifecycle::LifecycleManager;
use remedy_core::scm::{GitCli, SourceControl};
use remedy_core::{Orchestrator, PublishContext};
use secrecy::ExposeSecret;

/// Wires the production collaborators into an orchestrator.
pub(crate) fn build_orchestrator(project: &Path, config: RemedyConfig) -> Result<Orchestrator> {
    let token = resolve_forge_token()
        .context("no forge token found; set GITHUB_TOKEN or REMEDY_GITHUB_TOKEN")?;

    // Unattended runs publish; resolve the repository and push URL before
    // the token moves into the API transport.
    let publish_target = if config.is_unattended() {
        let (owner, repo) = config.split_repository()?;
        let remote_url = format!(
            "https://x-access-token:{}@github.com/{owner}/{repo}.git",
            token.expose_secret()
        );
        Some((owner, repo, remote_url))
    } else {
        None
    };

    let api = Arc::new(GitHubApi::new(token)?);
    let advisories: Arc<dyn AdvisoryClient> =
        Arc::new(GitHubAdvisoryClient::new(Arc::clone(&api)));
    let provider: Arc<dyn DependencyTreeProvider> =
        Arc::new(SafeReify::new(Arc::new(NpmProvider::new())));
    let scripts: Arc<dyn ScriptRunner> = Arc::new(NpmScriptRunner::new());
    let registry: Arc<dyn PackageRegistry> = Arc::new(NpmRegistry::new()?);
    let scm: Arc<dyn SourceControl> = Arc::new(GitCli::new(project.to_path_buf()));

    let publisher = publish_target.map(|(owner, repo, remote_url)| {
        let forge: Arc<dyn ForgeClient> =
            Arc::new(GitHubForge::new(Arc::clone(&api), &owner, &repo));
        let directory = PrDirectory::new(
            Arc::clone(&forge),
            Arc::new(MemoryCache::new()),
            config.cache_ttl,
        )
        .with_bulk_limit(config.bulk_page_limit);
        let mut lifecycle = LifecycleManager::new(directory, Arc::clone(&forge), Arc::clone(&scm));
        if let Some(author) = &config.author {
            lifecycle = lifecycle.with_author(author.clone());
        }

        PublishContext {
            forge,
            lifecycle,
            base_branch: config.base_branch.clone(),
            remote_url: Some(remote_url),
            auto_merge: config.auto_merge,
        }
    });

    Ok(Orchestrator::new(
        project.to_path_buf(),
        config,
        advisories,
        provider,
        scripts,
        registry,
        scm,
        publisher,
    ))
}
