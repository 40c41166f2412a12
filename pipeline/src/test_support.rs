//! Test-only helpers: scratch repositories and scripted collaborators.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, anyhow};
use tempfile::TempDir;

use crate::core::locator::{PullRequestRef, RepoSlug};
use crate::flow::Collaborators;
use crate::io::completion::{CompletionRequest, CompletionService};
use crate::io::config::AppConfig;
use crate::io::git::Git;
use crate::io::hosting::{NewPullRequest, PullRequestHost};
use crate::io::lease::RepoLeases;
use crate::io::lint::{LintVerdict, Linter};
use crate::io::prompt::PromptEngine;

pub const TEST_AUTHOR_NAME: &str = "Pipeline Test";
pub const TEST_AUTHOR_EMAIL: &str = "pipeline-test@example.com";

/// Scratch git repository on `main` with one empty initial commit.
pub struct TestRepo {
    dir: TempDir,
}

impl Default for TestRepo {
    fn default() -> Self {
        Self::new()
    }
}

impl TestRepo {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp repo dir");
        let git = Self::identity(Git::new(dir.path()));
        git.init("main").expect("git init");
        git_cmd(dir.path(), &["config", "user.name", TEST_AUTHOR_NAME]);
        git_cmd(dir.path(), &["config", "user.email", TEST_AUTHOR_EMAIL]);
        git.commit_empty("Initial commit").expect("initial commit");
        Self { dir }
    }

    /// Attach the test identity to a git handle.
    pub fn identity(git: Git) -> Git {
        git.with_identity(Some(TEST_AUTHOR_NAME), Some(TEST_AUTHOR_EMAIL))
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn git(&self) -> Git {
        Self::identity(Git::new(self.dir.path()))
    }

    /// Write `rel` and commit it on the current branch.
    pub fn commit_file(&self, rel: &str, content: &str, message: &str) {
        let path = self.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        fs::write(&path, content).expect("write file");
        let git = self.git();
        git.add_paths(&[rel]).expect("git add");
        assert!(git.commit_staged(message).expect("git commit"));
    }

    pub fn last_commit_message(&self) -> String {
        git_cmd(self.path(), &["log", "-1", "--format=%B"])
            .trim()
            .to_string()
    }

    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.path().join(rel)).expect("read file")
    }

    /// Create a bare repository, register it as `name`, and push `main` to it.
    pub fn add_bare_remote(&self, name: &str) -> BareRemote {
        let dir = tempfile::tempdir().expect("create remote dir");
        let path = dir.path().join("remote.git");
        let status = Command::new("git")
            .args(["init", "--bare", "--quiet"])
            .arg(&path)
            .status()
            .expect("spawn git init --bare");
        assert!(status.success(), "git init --bare failed");
        let url = path.to_string_lossy().into_owned();
        git_cmd(self.path(), &["remote", "add", name, &url]);
        git_cmd(self.path(), &["push", "--quiet", name, "main"]);
        BareRemote { _dir: dir, path }
    }
}

/// Bare repository standing in for a hosted remote.
pub struct BareRemote {
    _dir: TempDir,
    path: PathBuf,
}

impl BareRemote {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has_branch(&self, branch: &str) -> bool {
        let reference = format!("refs/heads/{branch}");
        Command::new("git")
            .arg("--git-dir")
            .arg(&self.path)
            .args(["rev-parse", "--verify", "--quiet", &reference])
            .output()
            .map(|out| out.status.success())
            .unwrap_or(false)
    }
}

fn git_cmd(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("spawn git");
    assert!(
        output.status.success(),
        "git {} failed: {}",
        args.join(" "),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Completion service replaying a fixed list of replies in order.
///
/// Each call records its request. Running out of replies is an error, so a
/// test fails loudly if a flow makes more calls than expected.
pub struct ScriptedCompletion {
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedCompletion {
    pub fn new<I>(replies: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().expect("replies lock").len()
    }
}

impl CompletionService for ScriptedCompletion {
    fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        self.replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .ok_or_else(|| anyhow!("scripted completion exhausted"))
    }
}

enum LintScript {
    Clean,
    Rejecting(Vec<String>),
    Unavailable,
}

/// Linter with a fixed verdict per path.
pub struct ScriptedLinter {
    script: LintScript,
    calls: AtomicUsize,
}

impl ScriptedLinter {
    pub fn clean() -> Self {
        Self::with(LintScript::Clean)
    }

    /// Report issues for exactly these paths; everything else is clean.
    pub fn rejecting<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with(LintScript::Rejecting(
            paths.into_iter().map(Into::into).collect(),
        ))
    }

    /// Fail every call as if the analyzer binary were missing.
    pub fn unavailable() -> Self {
        Self::with(LintScript::Unavailable)
    }

    fn with(script: LintScript) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Linter for ScriptedLinter {
    fn lint(&self, path: &str, _content: &str) -> Result<LintVerdict> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            LintScript::Clean => Ok(LintVerdict::Clean),
            LintScript::Rejecting(paths) if paths.iter().any(|p| p == path) => Ok(
                LintVerdict::Issues(format!("{path}:1:0: E0001: scripted issue")),
            ),
            LintScript::Rejecting(_) => Ok(LintVerdict::Clean),
            LintScript::Unavailable => Err(anyhow!("analyzer not installed")),
        }
    }
}

/// Hosting fake that records calls and hands out sequential PR URLs.
#[derive(Default)]
pub struct RecordingHost {
    created: Mutex<Vec<(RepoSlug, NewPullRequest)>>,
    updated: Mutex<Vec<(PullRequestRef, String, String)>>,
    failure: Option<String>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call fails with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn created(&self) -> Vec<(RepoSlug, NewPullRequest)> {
        self.created.lock().expect("created lock").clone()
    }

    pub fn updated(&self) -> Vec<(PullRequestRef, String, String)> {
        self.updated.lock().expect("updated lock").clone()
    }
}

impl PullRequestHost for RecordingHost {
    fn create_pull_request(&self, repo: &RepoSlug, request: &NewPullRequest) -> Result<String> {
        if let Some(message) = &self.failure {
            return Err(anyhow!("create pull request failed: {message}"));
        }
        let mut created = self.created.lock().expect("created lock");
        created.push((repo.clone(), request.clone()));
        Ok(format!(
            "https://github.com/{}/{}/pull/{}",
            repo.owner,
            repo.name,
            created.len()
        ))
    }

    fn update_pull_request(&self, pr: &PullRequestRef, title: &str, body: &str) -> Result<()> {
        if let Some(message) = &self.failure {
            return Err(anyhow!("update pull request failed: {message}"));
        }
        self.updated
            .lock()
            .expect("updated lock")
            .push((pr.clone(), title.to_string(), body.to_string()));
        Ok(())
    }
}

/// Owned set of scripted collaborators for driving whole flows.
pub struct Harness {
    pub config: AppConfig,
    pub completion: ScriptedCompletion,
    pub linter: ScriptedLinter,
    pub host: Option<RecordingHost>,
    pub prompts: PromptEngine,
    pub leases: RepoLeases,
}

impl Harness {
    /// Default configuration, clean linter, no hosting service.
    pub fn new(completion: ScriptedCompletion) -> Self {
        Self {
            config: AppConfig::default(),
            completion,
            linter: ScriptedLinter::clean(),
            host: None,
            prompts: PromptEngine::new(),
            leases: RepoLeases::new(),
        }
    }

    pub fn with_linter(mut self, linter: ScriptedLinter) -> Self {
        self.linter = linter;
        self
    }

    pub fn with_host(mut self, host: RecordingHost) -> Self {
        self.host = Some(host);
        self
    }

    pub fn ctx(&self) -> Collaborators<'_> {
        Collaborators {
            config: &self.config,
            completion: Some(&self.completion),
            linter: &self.linter,
            host: self.host.as_ref().map(|host| host as &dyn PullRequestHost),
            prompts: &self.prompts,
            leases: &self.leases,
        }
    }

    pub fn host(&self) -> &RecordingHost {
        self.host.as_ref().expect("harness has a recording host")
    }
}
