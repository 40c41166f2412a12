//! Error taxonomy at stage boundaries.
//!
//! Adapters return `anyhow::Result`; stages convert those into a
//! [`PipelineError`] naming the failure kind. Rejections, parse ambiguity and
//! degradations are values on the run report, not errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Repository missing, uncloneable, or uninitializable.
    #[error("Repository access failed: {0}")]
    RepoAccess(String),

    /// Checkout/create failure, dirty tree, missing base branch.
    #[error("Branch operation failed: {0}")]
    BranchOperation(String),

    /// Hosting-service call failed (auth, not found, rate limit, bad URL).
    #[error("Pull request hosting failed: {0}")]
    PrHosting(String),

    /// Completion-service call failed.
    #[error("Completion service failed: {0}")]
    Completion(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    /// Stable snake_case name used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RepoAccess(_) => "repo_access",
            Self::BranchOperation(_) => "branch_operation",
            Self::PrHosting(_) => "pr_hosting",
            Self::Completion(_) => "completion",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
        }
    }

    pub fn repo_access(err: anyhow::Error) -> Self {
        Self::RepoAccess(format!("{err:#}"))
    }

    pub fn branch_operation(err: anyhow::Error) -> Self {
        Self::BranchOperation(format!("{err:#}"))
    }

    pub fn pr_hosting(err: anyhow::Error) -> Self {
        Self::PrHosting(format!("{err:#}"))
    }

    pub fn completion(err: anyhow::Error) -> Self {
        Self::Completion(format!("{err:#}"))
    }

    pub fn config(err: anyhow::Error) -> Self {
        Self::Config(format!("{err:#}"))
    }
}
