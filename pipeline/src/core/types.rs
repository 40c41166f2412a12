//! Shared deterministic types for a change-request run.
//!
//! These types define the contracts between pipeline stages. They hold data
//! only; no stage reaches into the filesystem or network through them.

use serde::{Deserialize, Serialize};

/// Immutable input to an interactive run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRequest {
    /// Free-text description of the desired change.
    pub message: String,
    /// Repository reference: a clone URL or a local working-copy path.
    pub repository: String,
    /// Identity used in the branch name.
    pub requester: String,
    /// Human-readable name that becomes the branch slug.
    pub descriptive_name: String,
}

/// Where an artifact's content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Parsed out of a generation-service response.
    Generated,
    /// Supplied verbatim by the caller (studio flow).
    Supplied,
    /// Primary dependency manifest rebuilt from a union of entries.
    ManifestMerge,
}

/// One file produced for the working tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileArtifact {
    /// Repository-relative path.
    pub path: String,
    /// Full file content.
    pub content: String,
    pub provenance: Provenance,
}

impl FileArtifact {
    pub fn generated(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            provenance: Provenance::Generated,
        }
    }

    pub fn supplied(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            provenance: Provenance::Supplied,
        }
    }

    /// True if the path ends in `.<ext>` for one of `extensions`.
    pub fn has_extension_in(&self, extensions: &[String]) -> bool {
        extensions
            .iter()
            .any(|ext| self.path.ends_with(&format!(".{}", ext.trim_start_matches('.'))))
    }
}

/// One accepted ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeDescriptor {
    pub path: String,
    pub description: String,
}

/// Working branch checked out for a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub name: String,
    /// Ref the branch is compared against when collecting the diff.
    pub base_ref: String,
    /// Commit id at checkout time.
    pub head: String,
}

/// Change classification as reported by `git diff --name-status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
    Renamed,
    Copied,
    TypeChanged,
    Unmerged,
    Unknown,
}

impl ChangeType {
    /// Map the leading status letter of a name-status line.
    pub fn from_status_letter(letter: char) -> Self {
        match letter {
            'A' => Self::Added,
            'M' => Self::Modified,
            'D' => Self::Deleted,
            'R' => Self::Renamed,
            'C' => Self::Copied,
            'T' => Self::TypeChanged,
            'U' => Self::Unmerged,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
            Self::Renamed => "renamed",
            Self::Copied => "copied",
            Self::TypeChanged => "type_changed",
            Self::Unmerged => "unmerged",
            Self::Unknown => "unknown",
        }
    }
}

/// One file's entry in the patch set between two refs. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffRecord {
    pub path: String,
    /// Source path for renames and copies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_path: Option<String>,
    pub change_type: ChangeType,
    /// Patch text; undecodable bytes are replaced.
    pub patch: String,
}

/// Pull request as assembled after the branch has a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestDraft {
    pub title: String,
    pub body: String,
    pub head: String,
    pub base: String,
    pub draft: bool,
    /// Set once the hosting service accepted the pull request.
    pub url: Option<String>,
}

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    /// The change was committed but a downstream step could not complete.
    Degraded,
    Error,
}

impl RunStatus {
    /// Success and degraded runs both leave a usable commit behind.
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success | Self::Degraded)
    }
}

/// Downstream step that did not complete but did not fail the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Degradation {
    /// Push skipped or rejected; the commit stays local.
    PushSkipped { reason: String },
    /// Pull request not opened; the description is still returned.
    PublishSkipped { reason: String },
    /// The description service returned no text.
    EmptyDescription,
}

/// Whether the validation gate admits artifacts for paths that do not exist yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NewFilePolicy {
    #[default]
    Reject,
    Allow,
}

/// Why the validation gate refused an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum RejectReason {
    /// Path is absolute or escapes the repository.
    UnsafePath,
    /// Target does not exist and the policy only admits modifications.
    FileNotFound,
    /// Static analysis reported issues (captured analyzer output).
    LintIssues(String),
    /// Static analysis could not be run at all.
    LinterUnavailable(String),
    /// Writing the accepted content failed.
    WriteFailed(String),
}

/// Artifact rejected by the validation gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFailure {
    pub path: String,
    pub reason: RejectReason,
}

/// Local branch as reported by the branch listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchInfo {
    pub name: String,
    pub is_current: bool,
    /// Abbreviated (7-char) commit id.
    pub last_commit: String,
    /// ISO-8601 committer timestamp.
    pub last_commit_date: String,
}
