//! BranchManager: `NO_REPO -> INITIALIZED -> ON_BRANCH`.
//!
//! Opening a working copy initializes it when needed. Checkout reuses an
//! existing branch as-is (no rebase or merge) or creates it from the current
//! head, and is idempotent for identical names.

use tracing::{debug, info, instrument};

use crate::core::naming::has_empty_segment;
use crate::core::types::Branch;
use crate::error::{PipelineError, Result};
use crate::io::git::Git;

/// Message of the commit that gives a fresh repository a HEAD.
pub const INITIAL_COMMIT_MESSAGE: &str = "Initial commit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoState {
    NoRepo,
    Initialized,
    OnBranch(Branch),
}

#[derive(Debug)]
pub struct BranchManager {
    git: Git,
    base_ref: String,
    state: RepoState,
}

impl BranchManager {
    /// Open the working copy, initializing it (with an empty initial commit)
    /// when it is not a repository or has no commits yet.
    ///
    /// The base ref is `base_branch` when it exists locally, otherwise the
    /// branch checked out at open time.
    #[instrument(skip_all, fields(workdir = %git.workdir().display()))]
    pub fn open(git: Git, base_branch: &str) -> Result<Self> {
        if !git.workdir().is_dir() {
            return Err(PipelineError::RepoAccess(format!(
                "{} is not a directory",
                git.workdir().display()
            )));
        }
        if !git.is_initialized() {
            info!("initializing repository");
            git.init(base_branch).map_err(PipelineError::repo_access)?;
        }
        if !git.has_commits().map_err(PipelineError::repo_access)? {
            debug!("repository has no commits, recording initial commit");
            git.commit_empty(INITIAL_COMMIT_MESSAGE)
                .map_err(PipelineError::repo_access)?;
        }

        let base_ref = if git
            .branch_exists(base_branch)
            .map_err(PipelineError::repo_access)?
        {
            base_branch.to_string()
        } else {
            let current = git
                .current_branch()
                .map_err(PipelineError::branch_operation)?;
            debug!(
                configured = base_branch,
                fallback = %current,
                "base branch missing, using current"
            );
            current
        };

        Ok(Self {
            git,
            base_ref,
            state: RepoState::Initialized,
        })
    }

    pub fn git(&self) -> &Git {
        &self.git
    }

    pub fn state(&self) -> &RepoState {
        &self.state
    }

    pub fn base_ref(&self) -> &str {
        &self.base_ref
    }

    /// Check out `name`, creating it from the current head when missing.
    #[instrument(skip_all, fields(branch = name))]
    pub fn checkout(&mut self, name: &str) -> Result<Branch> {
        if has_empty_segment(name) {
            return Err(PipelineError::BranchOperation(format!(
                "invalid branch name '{name}'"
            )));
        }
        if let RepoState::OnBranch(branch) = &self.state
            && branch.name == name
        {
            debug!("already on branch");
            return Ok(branch.clone());
        }

        let git = &self.git;
        let current = git.current_branch().ok();
        if current.as_deref() == Some(name) {
            debug!("branch already checked out");
        } else if git
            .branch_exists(name)
            .map_err(PipelineError::branch_operation)?
        {
            info!("checking out existing branch");
            git.checkout_branch(name)
                .map_err(PipelineError::branch_operation)?;
        } else {
            info!("creating branch");
            git.checkout_new_branch(name)
                .map_err(PipelineError::branch_operation)?;
        }

        let branch = Branch {
            name: name.to_string(),
            base_ref: self.base_ref.clone(),
            head: git.head_sha().map_err(PipelineError::branch_operation)?,
        };
        self.state = RepoState::OnBranch(branch.clone());
        Ok(branch)
    }

    /// Check out the base branch, fast-forward it from `remote` when that
    /// remote is configured, then check out `name` from there.
    #[instrument(skip_all, fields(branch = name))]
    pub fn start_from_base(&mut self, name: &str, remote: &str) -> Result<Branch> {
        let base = self.base_ref.clone();
        self.git
            .checkout_branch(&base)
            .map_err(PipelineError::branch_operation)?;
        self.state = RepoState::Initialized;
        let has_remote = self
            .git
            .remote_url(remote)
            .map_err(PipelineError::branch_operation)?
            .is_some();
        if has_remote {
            self.git
                .pull_ff_only(remote, &base)
                .map_err(PipelineError::branch_operation)?;
        } else {
            debug!(remote, "no remote configured, skipping pull");
        }
        self.checkout(name)
    }
}
