//! Pull request hosting service (GitHub REST API).

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::core::locator::{PullRequestRef, RepoSlug};
use crate::io::config::HostingConfig;

const USER_AGENT: &str = concat!("pipeline/", env!("CARGO_PKG_VERSION"));

/// Request body for opening a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewPullRequest {
    pub title: String,
    pub body: String,
    pub head: String,
    pub base: String,
    pub draft: bool,
}

/// Create/edit primitives of the hosting service.
pub trait PullRequestHost: Send + Sync {
    /// Open a pull request and return its browser URL.
    fn create_pull_request(&self, repo: &RepoSlug, request: &NewPullRequest) -> Result<String>;

    /// Replace title and body of an existing pull request.
    fn update_pull_request(&self, pr: &PullRequestRef, title: &str, body: &str) -> Result<()>;
}

pub struct GitHubClient {
    http: reqwest::blocking::Client,
    api_base: String,
    token: String,
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct PullResponse {
    html_url: String,
}

#[derive(Debug, Serialize)]
struct PullUpdate<'a> {
    title: &'a str,
    body: &'a str,
}

impl GitHubClient {
    /// Build a client, or `None` when no token is configured.
    pub fn from_config(cfg: &HostingConfig) -> Result<Option<Self>> {
        let Some(token) = cfg.token.as_deref().filter(|t| !t.trim().is_empty()) else {
            debug!("hosting token not configured");
            return Ok(None);
        };
        let http = reqwest::blocking::Client::builder()
            .timeout(cfg.timeout())
            .user_agent(USER_AGENT)
            .build()
            .context("build hosting http client")?;
        Ok(Some(Self {
            http,
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }))
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::blocking::RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }
}

fn ensure_success(
    resp: reqwest::blocking::Response,
    action: &str,
) -> Result<reqwest::blocking::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.text().unwrap_or_default();
    warn!(%status, action, "hosting service returned an error");
    bail!("{action} failed with {status}: {}", body.trim())
}

impl PullRequestHost for GitHubClient {
    #[instrument(skip_all, fields(owner = %repo.owner, repo = %repo.name, head = %request.head))]
    fn create_pull_request(&self, repo: &RepoSlug, request: &NewPullRequest) -> Result<String> {
        let url = format!("{}/repos/{}/{}/pulls", self.api_base, repo.owner, repo.name);
        let resp = self
            .request(reqwest::Method::POST, &url)
            .json(request)
            .send()
            .context("send create pull request")?;
        let resp = ensure_success(resp, "create pull request")?;
        let created: PullResponse = resp.json().context("decode pull request response")?;
        if created.html_url.is_empty() {
            return Err(anyhow!("hosting service returned no pull request url"));
        }
        info!(url = %created.html_url, "pull request opened");
        Ok(created.html_url)
    }

    #[instrument(skip_all, fields(owner = %pr.owner, repo = %pr.repo, number = pr.number))]
    fn update_pull_request(&self, pr: &PullRequestRef, title: &str, body: &str) -> Result<()> {
        let url = format!(
            "{}/repos/{}/{}/pulls/{}",
            self.api_base, pr.owner, pr.repo, pr.number
        );
        let resp = self
            .request(reqwest::Method::PATCH, &url)
            .json(&PullUpdate { title, body })
            .send()
            .context("send update pull request")?;
        ensure_success(resp, "update pull request")?;
        info!("pull request updated");
        Ok(())
    }
}
