//! Entry points around existing branches and pull requests: description
//! preview, pull request creation and update, and branch listing.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::commit::{CommitAndPushController, PushOutcome};
use crate::core::types::{BranchInfo, DiffRecord, PullRequestDraft};
use crate::describe::{DescriptionSource, PrDescription, PrDescriptionSynthesizer};
use crate::diff::DiffCollector;
use crate::error::{PipelineError, Result};
use crate::flow::{Collaborators, DiffFile};
use crate::io::git::Git;
use crate::publish::PublishOutcome;

/// Pull request between two existing branches, for preview or creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrRequest {
    pub repo_path: String,
    /// Branch carrying the changes.
    pub source_branch: String,
    /// Branch the changes would merge into.
    pub target_branch: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrPreview {
    /// Always `None`; a preview never opens a pull request.
    pub pr_url: Option<String>,
    pub diff_files: Vec<DiffFile>,
    pub pr_content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrCreated {
    pub pr_url: String,
    pub title: String,
    pub pr_content: String,
    pub diff_files: Vec<DiffFile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrUpdateRequest {
    pub pr_url: String,
    pub title: String,
    pub body: String,
}

/// Diff two existing branches and synthesize pull request content for them.
#[instrument(
    skip_all,
    fields(source = %request.source_branch, target = %request.target_branch)
)]
pub fn preview_pull_request(ctx: &Collaborators<'_>, request: &PrRequest) -> Result<PrPreview> {
    let repo_path = Path::new(request.repo_path.trim());
    let _lease = ctx.leases.acquire(repo_path);
    let git = open_existing(ctx, repo_path)?;
    let (records, description) = describe_branches(ctx, &git, request)?;
    Ok(PrPreview {
        pr_url: None,
        diff_files: records.iter().map(DiffFile::from).collect(),
        pr_content: description.body,
    })
}

/// Open a draft pull request for an existing source branch without touching
/// its content. The branch is pushed first; a branch that cannot reach the
/// hosting service is an error rather than a local-only outcome.
#[instrument(
    skip_all,
    fields(source = %request.source_branch, target = %request.target_branch)
)]
pub fn create_pull_request(ctx: &Collaborators<'_>, request: &PrRequest) -> Result<PrCreated> {
    let repo_path = Path::new(request.repo_path.trim());
    let _lease = ctx.leases.acquire(repo_path);
    let git = open_existing(ctx, repo_path)?;
    let (records, description) = describe_branches(ctx, &git, request)?;

    let ahead = git
        .commits_between(&request.target_branch, &request.source_branch)
        .map_err(PipelineError::branch_operation)?;
    if ahead == 0 {
        return Err(PipelineError::BranchOperation(format!(
            "{} has no commits over {}",
            request.source_branch, request.target_branch
        )));
    }

    let remote = &ctx.config.git.remote;
    let controller = CommitAndPushController::new(&git, remote);
    if let PushOutcome::Skipped { reason } = controller.push(&request.source_branch) {
        return Err(PipelineError::PrHosting(format!(
            "cannot push {}: {reason}",
            request.source_branch
        )));
    }

    let title = match request.title.trim() {
        "" if description.title.is_empty() => request.source_branch.clone(),
        "" => description.title.clone(),
        title => title.to_string(),
    };
    let draft = PullRequestDraft {
        title: title.clone(),
        body: description.body.clone(),
        head: request.source_branch.clone(),
        base: request.target_branch.clone(),
        draft: true,
        url: None,
    };
    match ctx.publisher().publish(&git, remote, &draft)? {
        PublishOutcome::Opened { url } => Ok(PrCreated {
            pr_url: url,
            title,
            pr_content: description.body,
            diff_files: records.iter().map(DiffFile::from).collect(),
        }),
        PublishOutcome::LocalOnly { reason } => Err(PipelineError::PrHosting(reason)),
    }
}

/// Check both branches, diff target..source, and describe the difference.
fn describe_branches(
    ctx: &Collaborators<'_>,
    git: &Git,
    request: &PrRequest,
) -> Result<(Vec<DiffRecord>, PrDescription)> {
    let completion = ctx.completion()?;
    for branch in [&request.source_branch, &request.target_branch] {
        if !git.branch_exists(branch).map_err(PipelineError::branch_operation)? {
            return Err(PipelineError::BranchOperation(format!(
                "branch '{branch}' not found"
            )));
        }
    }

    let records =
        DiffCollector::new(git).collect(&request.target_branch, &request.source_branch)?;
    let summary = format!(
        "Title: {}\n\nDescription: {}",
        request.title.trim(),
        request.description.trim()
    );
    let description = PrDescriptionSynthesizer::new(completion, ctx.prompts).synthesize(
        &summary,
        None,
        DescriptionSource::Files(&records),
    )?;
    Ok((records, description))
}

/// Replace the title and body of an existing pull request.
pub fn update_pull_request(ctx: &Collaborators<'_>, request: &PrUpdateRequest) -> Result<()> {
    ctx.publisher()
        .update(&request.pr_url, &request.title, &request.body)
}

/// Local branches of the working copy at `repo_path`.
#[instrument(skip_all, fields(repo = %repo_path.display()))]
pub fn list_branches(ctx: &Collaborators<'_>, repo_path: &Path) -> Result<Vec<BranchInfo>> {
    let _lease = ctx.leases.acquire(repo_path);
    let git = open_existing(ctx, repo_path)?;
    git.local_branches().map_err(PipelineError::branch_operation)
}

fn open_existing(ctx: &Collaborators<'_>, repo_path: &Path) -> Result<Git> {
    let git = ctx.git(repo_path);
    if !repo_path.is_dir() || !git.is_initialized() {
        return Err(PipelineError::RepoAccess(format!(
            "{} is not a git working copy",
            repo_path.display()
        )));
    }
    Ok(git)
}
