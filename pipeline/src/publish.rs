//! PRPublisher: opens draft pull requests and edits existing ones.
//!
//! Missing hosting credentials or a missing remote degrade publishing to a
//! local-only outcome. Failures reported by the hosting service itself are
//! errors.

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::core::locator::{RepoSlug, parse_pull_request_url, parse_remote_url};
use crate::core::types::PullRequestDraft;
use crate::error::{PipelineError, Result};
use crate::io::git::Git;
use crate::io::hosting::{NewPullRequest, PullRequestHost};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PublishOutcome {
    Opened { url: String },
    LocalOnly { reason: String },
}

pub struct PrPublisher<'a> {
    host: Option<&'a dyn PullRequestHost>,
    organization: Option<&'a str>,
}

impl<'a> PrPublisher<'a> {
    /// `organization` overrides the owner parsed from the remote URL.
    pub fn new(host: Option<&'a dyn PullRequestHost>, organization: Option<&'a str>) -> Self {
        Self {
            host,
            organization: organization.map(str::trim).filter(|org| !org.is_empty()),
        }
    }

    /// Hosted repository for the working copy behind `git`, if any.
    pub fn repo_slug(&self, git: &Git, remote: &str) -> Result<Option<RepoSlug>> {
        let Some(url) = git
            .remote_url(remote)
            .map_err(PipelineError::branch_operation)?
        else {
            return Ok(None);
        };
        let Some(mut slug) = parse_remote_url(&url) else {
            warn!(%url, "cannot derive owner and name from remote url");
            return Ok(None);
        };
        if let Some(org) = self.organization {
            slug.owner = org.to_string();
        }
        Ok(Some(slug))
    }

    /// Open `draft` as a pull request against its base branch.
    #[instrument(skip_all, fields(head = %draft.head, base = %draft.base))]
    pub fn publish(
        &self,
        git: &Git,
        remote: &str,
        draft: &PullRequestDraft,
    ) -> Result<PublishOutcome> {
        let Some(host) = self.host else {
            return Ok(local_only("hosting token not configured"));
        };
        let Some(repo) = self.repo_slug(git, remote)? else {
            return Ok(local_only(format!("no hosted remote '{remote}'")));
        };
        let request = NewPullRequest {
            title: draft.title.clone(),
            body: draft.body.clone(),
            head: draft.head.clone(),
            base: draft.base.clone(),
            draft: draft.draft,
        };
        let url = host
            .create_pull_request(&repo, &request)
            .map_err(PipelineError::pr_hosting)?;
        info!(%url, "pull request published");
        Ok(PublishOutcome::Opened { url })
    }

    /// Replace title and body of the pull request at `pr_url` wholesale.
    #[instrument(skip_all, fields(%pr_url))]
    pub fn update(&self, pr_url: &str, title: &str, body: &str) -> Result<()> {
        let pr = parse_pull_request_url(pr_url)
            .ok_or_else(|| PipelineError::PrHosting("Invalid PR URL".to_string()))?;
        let host = self
            .host
            .ok_or_else(|| PipelineError::PrHosting("hosting token not configured".to_string()))?;
        host.update_pull_request(&pr, title, body)
            .map_err(PipelineError::pr_hosting)
    }
}

fn local_only(reason: impl Into<String>) -> PublishOutcome {
    let reason = reason.into();
    warn!(%reason, "publishing skipped, change stays local");
    PublishOutcome::LocalOnly { reason }
}
