//! Parsing of repository and pull request locators.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static PULL_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://github\.com/([^/]+)/([^/]+)/pull/(\d+)")
        .expect("pull request url pattern is valid")
});

/// Hosted repository coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoSlug {
    pub owner: String,
    pub name: String,
}

/// Reference to an existing pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestRef {
    pub owner: String,
    pub repo: String,
    pub number: u64,
}

/// Parse `https://github.com/<owner>/<repo>/pull/<n>`, ignoring any query
/// string or fragment.
pub fn parse_pull_request_url(url: &str) -> Option<PullRequestRef> {
    let url = url.trim();
    let url = url.split('?').next().unwrap_or(url);
    let url = url.split('#').next().unwrap_or(url);
    let caps = PULL_URL.captures(url)?;
    Some(PullRequestRef {
        owner: caps.get(1)?.as_str().to_string(),
        repo: caps.get(2)?.as_str().to_string(),
        number: caps.get(3)?.as_str().parse().ok()?,
    })
}

/// Repository name from a clone URL or path: last segment, `.git` stripped.
pub fn repo_name_from_reference(reference: &str) -> Option<String> {
    let trimmed = reference.trim().trim_end_matches('/');
    let last = trimmed.rsplit(['/', ':']).next()?;
    let name = last.strip_suffix(".git").unwrap_or(last);
    (!name.is_empty()).then(|| name.to_string())
}

/// Owner and name from a remote URL (`https://host/owner/repo.git`,
/// `git@host:owner/repo.git`, or a filesystem path).
pub fn parse_remote_url(url: &str) -> Option<RepoSlug> {
    let name = repo_name_from_reference(url)?;
    let trimmed = url.trim().trim_end_matches('/');
    let mut segments = trimmed.rsplit(['/', ':']).skip(1);
    let owner = segments.find(|segment| !segment.is_empty())?;
    Some(RepoSlug {
        owner: owner.to_string(),
        name,
    })
}
