//! Git adapter for pipeline stages.
//!
//! Every VCS interaction goes through a small, explicit wrapper around `git`
//! subprocess calls so stages stay testable against scratch repositories.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

use crate::core::types::{BranchInfo, ChangeType};

/// Parsed `git status --porcelain` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// 2-letter XY code, or "??" for untracked.
    pub code: String,
    /// Path for the changed file.
    pub path: String,
}

/// Parsed `git diff --name-status` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameStatus {
    pub change_type: ChangeType,
    /// Source path for renames and copies.
    pub old_path: Option<String>,
    pub path: String,
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
    /// `-c key=value` pairs prepended to every invocation.
    overrides: Vec<String>,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            overrides: vec!["core.quotePath=false".to_string()],
        }
    }

    /// Commit as the given identity instead of the repository's own.
    pub fn with_identity(mut self, name: Option<&str>, email: Option<&str>) -> Self {
        if let Some(name) = name.filter(|n| !n.trim().is_empty()) {
            self.overrides.push(format!("user.name={name}"));
        }
        if let Some(email) = email.filter(|e| !e.trim().is_empty()) {
            self.overrides.push(format!("user.email={email}"));
        }
        self
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Clone `url` into `dest` (which must not exist yet).
    #[instrument(skip_all, fields(dest = %dest.display()))]
    pub fn clone_into(url: &str, dest: &Path) -> Result<Git> {
        let parent = dest
            .parent()
            .with_context(|| format!("clone destination missing parent {}", dest.display()))?;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
        debug!("cloning repository");
        let output = Command::new("git")
            .arg("clone")
            .arg(url)
            .arg(dest)
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .context("spawn git clone")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git clone failed: {}", stderr.trim()));
        }
        Ok(Git::new(dest))
    }

    /// True when the working directory carries its own `.git`.
    pub fn is_initialized(&self) -> bool {
        self.workdir.join(".git").exists()
    }

    /// Initialize a repository whose unborn HEAD points at `initial_branch`.
    #[instrument(skip_all, fields(initial_branch))]
    pub fn init(&self, initial_branch: &str) -> Result<()> {
        debug!("initializing repository");
        self.run_checked(&["init", "--quiet"])?;
        let head_ref = format!("refs/heads/{initial_branch}");
        self.run_checked(&["symbolic-ref", "HEAD", &head_ref])?;
        Ok(())
    }

    /// True once HEAD resolves to a commit.
    pub fn has_commits(&self) -> Result<bool> {
        let status = self
            .run(&["rev-parse", "--verify", "--quiet", "HEAD"])?
            .status;
        Ok(status.success())
    }

    /// Return the current branch name (errors on detached HEAD).
    #[instrument(skip_all)]
    pub fn current_branch(&self) -> Result<String> {
        let out = self.run_capture(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        let name = out.trim().to_string();
        if name == "HEAD" {
            warn!("detached HEAD detected");
            return Err(anyhow!("detached HEAD"));
        }
        debug!(branch = %name, "current branch");
        Ok(name)
    }

    /// Full commit id of HEAD.
    pub fn head_sha(&self) -> Result<String> {
        let out = self.run_capture(&["rev-parse", "HEAD"])?;
        Ok(out.trim().to_string())
    }

    /// Number of commits reachable from `head` but not from `base`.
    pub fn commits_between(&self, base: &str, head: &str) -> Result<usize> {
        let range = format!("{base}..{head}");
        let out = self.run_capture(&["rev-list", "--count", &range])?;
        out.trim()
            .parse()
            .with_context(|| format!("parse rev-list count '{}'", out.trim()))
    }

    /// Get status entries (including untracked) in porcelain format.
    pub fn status_porcelain(&self) -> Result<Vec<StatusEntry>> {
        let out = self.run_capture(&["status", "--porcelain=v1", "-uall"])?;
        let mut entries = Vec::new();
        for line in out.lines() {
            if line.trim().is_empty() {
                continue;
            }
            entries.push(parse_status_line(line)?);
        }
        Ok(entries)
    }

    /// Check whether a local branch exists.
    pub fn branch_exists(&self, branch: &str) -> Result<bool> {
        let status = self
            .run(&[
                "show-ref",
                "--verify",
                "--quiet",
                &format!("refs/heads/{branch}"),
            ])?
            .status;
        Ok(status.success())
    }

    /// Create and checkout a new branch at current HEAD.
    #[instrument(skip_all, fields(branch))]
    pub fn checkout_new_branch(&self, branch: &str) -> Result<()> {
        debug!(branch, "creating and checking out new branch");
        self.run_checked(&["checkout", "-b", branch])?;
        Ok(())
    }

    /// Checkout an existing branch.
    #[instrument(skip_all, fields(branch))]
    pub fn checkout_branch(&self, branch: &str) -> Result<()> {
        debug!(branch, "checking out branch");
        self.run_checked(&["checkout", branch])?;
        Ok(())
    }

    /// Local branches with their tip commit and committer date.
    pub fn local_branches(&self) -> Result<Vec<BranchInfo>> {
        let out = self.run_capture(&[
            "for-each-ref",
            concat!(
                "--format=%(HEAD)%09%(refname:short)",
                "%09%(objectname:short=7)%09%(committerdate:iso-strict)"
            ),
            "refs/heads",
        ])?;
        out.lines()
            .filter(|line| !line.trim().is_empty())
            .map(parse_branch_line)
            .collect()
    }

    /// Stage all changes (respects .gitignore).
    pub fn add_all(&self) -> Result<()> {
        self.run_checked(&["add", "-A"])?;
        Ok(())
    }

    /// Stage exactly the given paths.
    pub fn add_paths(&self, paths: &[&str]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut args = vec!["add", "--"];
        args.extend_from_slice(paths);
        self.run_checked(&args)?;
        Ok(())
    }

    /// True if there is anything staged for commit.
    pub fn has_staged_changes(&self) -> Result<bool> {
        let out = self.run(&["diff", "--cached", "--name-only"])?;
        Ok(!String::from_utf8_lossy(&out.stdout).trim().is_empty())
    }

    /// Commit staged changes with a message.
    ///
    /// If there are no staged changes, this returns Ok(false) and does nothing.
    #[instrument(skip_all)]
    pub fn commit_staged(&self, message: &str) -> Result<bool> {
        if !self.has_staged_changes()? {
            debug!("no staged changes, skipping commit");
            return Ok(false);
        }
        debug!("committing staged changes");
        self.run_checked(&["commit", "--quiet", "-m", message])?;
        Ok(true)
    }

    /// Record a commit with no changes (used to give a fresh repository a HEAD).
    pub fn commit_empty(&self, message: &str) -> Result<()> {
        self.run_checked(&["commit", "--quiet", "--allow-empty", "-m", message])?;
        Ok(())
    }

    /// URL of `remote`, or `None` when it is not configured.
    pub fn remote_url(&self, remote: &str) -> Result<Option<String>> {
        let output = self.run(&["remote", "get-url", remote])?;
        if !output.status.success() {
            return Ok(None);
        }
        let url = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok((!url.is_empty()).then_some(url))
    }

    /// Push `branch` and record `remote/branch` as its upstream.
    #[instrument(skip_all, fields(remote, branch))]
    pub fn push_set_upstream(&self, remote: &str, branch: &str) -> Result<()> {
        debug!("pushing branch");
        self.run_checked(&["push", "--quiet", "--set-upstream", remote, branch])?;
        Ok(())
    }

    /// Fast-forward the current branch from `remote/branch`.
    #[instrument(skip_all, fields(remote, branch))]
    pub fn pull_ff_only(&self, remote: &str, branch: &str) -> Result<()> {
        debug!("fast-forward pull");
        self.run_checked(&["pull", "--quiet", "--ff-only", remote, branch])?;
        Ok(())
    }

    /// Changed paths between two refs, classified by git itself.
    pub fn diff_name_status(&self, base: &str, head: &str) -> Result<Vec<NameStatus>> {
        let range = format!("{base}..{head}");
        let out = self.run_capture(&["diff", "--name-status", "-M", &range])?;
        out.lines()
            .filter(|line| !line.trim().is_empty())
            .map(parse_name_status_line)
            .collect()
    }

    /// Raw patch bytes for the given paths between two refs.
    pub fn diff_patch(&self, base: &str, head: &str, paths: &[&str]) -> Result<Vec<u8>> {
        let range = format!("{base}..{head}");
        let mut args = vec!["diff", "-M", range.as_str(), "--"];
        args.extend_from_slice(paths);
        Ok(self.run_checked(&args)?.stdout)
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        let mut cmd = Command::new("git");
        for pair in &self.overrides {
            cmd.arg("-c").arg(pair);
        }
        cmd.args(args)
            .current_dir(&self.workdir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

fn parse_status_line(line: &str) -> Result<StatusEntry> {
    if let Some(path) = line.strip_prefix("?? ") {
        return Ok(StatusEntry {
            code: "??".to_string(),
            path: path.trim().to_string(),
        });
    }
    if line.len() < 4 {
        return Err(anyhow!("unexpected porcelain line: '{line}'"));
    }
    let code = line[..2].to_string();
    let mut path = line[3..].trim().to_string();
    if let Some((_, new)) = path.split_once("->") {
        path = new.trim().to_string();
    }
    Ok(StatusEntry { code, path })
}

fn parse_name_status_line(line: &str) -> Result<NameStatus> {
    let mut fields = line.split('\t');
    let status = fields
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow!("unexpected name-status line: '{line}'"))?;
    let letter = status
        .chars()
        .next()
        .ok_or_else(|| anyhow!("unexpected name-status line: '{line}'"))?;
    let change_type = ChangeType::from_status_letter(letter);
    let first = fields
        .next()
        .ok_or_else(|| anyhow!("name-status line missing path: '{line}'"))?;
    match fields.next() {
        Some(second) => Ok(NameStatus {
            change_type,
            old_path: Some(first.to_string()),
            path: second.to_string(),
        }),
        None => Ok(NameStatus {
            change_type,
            old_path: None,
            path: first.to_string(),
        }),
    }
}

fn parse_branch_line(line: &str) -> Result<BranchInfo> {
    let fields: Vec<&str> = line.split('\t').collect();
    let [head, name, commit, date] = fields.as_slice() else {
        return Err(anyhow!("unexpected for-each-ref line: '{line}'"));
    };
    Ok(BranchInfo {
        name: name.to_string(),
        is_current: head.trim() == "*",
        last_commit: commit.to_string(),
        last_commit_date: date.to_string(),
    })
}
