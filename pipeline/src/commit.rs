//! CommitAndPushController: stage, commit and push a working branch.
//!
//! Staging is selected per entry point through [`StagingStrategy`]. Push
//! never fails the run; a missing remote or a rejected push is reported as
//! [`PushOutcome::Skipped`] and the commit stays local.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::core::ledger::ChangeLedger;
use crate::error::{PipelineError, Result};
use crate::io::git::Git;

/// Which paths go into the commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StagingStrategy {
    /// Only paths recorded in the ledger (interactive flow).
    LedgerPaths,
    /// Everything in the working tree (studio flow).
    WorkingTree,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitOutcome {
    pub commit_id: String,
    pub message: String,
    pub staged_paths: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PushOutcome {
    Pushed { remote: String, branch: String },
    Skipped { reason: String },
}

pub struct CommitAndPushController<'a> {
    git: &'a Git,
    remote: &'a str,
}

impl<'a> CommitAndPushController<'a> {
    pub fn new(git: &'a Git, remote: &'a str) -> Self {
        Self { git, remote }
    }

    /// True when staging per `strategy` would record anything: a ledger path
    /// (or, for the whole tree, any path) differs from the last commit.
    pub fn has_pending_changes(
        &self,
        strategy: StagingStrategy,
        ledger: &ChangeLedger,
    ) -> Result<bool> {
        let changed = self
            .git
            .status_porcelain()
            .map_err(PipelineError::branch_operation)?;
        Ok(match strategy {
            StagingStrategy::LedgerPaths => {
                changed.iter().any(|entry| ledger.contains(&entry.path))
            }
            StagingStrategy::WorkingTree => !changed.is_empty(),
        })
    }

    /// Stage per `strategy` and commit with `message`.
    ///
    /// Returns `None` when nothing ended up staged.
    #[instrument(skip_all, fields(?strategy))]
    pub fn commit(
        &self,
        strategy: StagingStrategy,
        ledger: &ChangeLedger,
        message: &str,
    ) -> Result<Option<CommitOutcome>> {
        let staged_paths: Vec<String> = match strategy {
            StagingStrategy::LedgerPaths => {
                let paths: Vec<&str> = ledger.paths().collect();
                self.git
                    .add_paths(&paths)
                    .map_err(PipelineError::branch_operation)?;
                paths.into_iter().map(str::to_string).collect()
            }
            StagingStrategy::WorkingTree => {
                let changed = self
                    .git
                    .status_porcelain()
                    .map_err(PipelineError::branch_operation)?;
                self.git.add_all().map_err(PipelineError::branch_operation)?;
                changed.into_iter().map(|entry| entry.path).collect()
            }
        };

        let committed = self
            .git
            .commit_staged(message)
            .map_err(PipelineError::branch_operation)?;
        if !committed {
            info!("nothing to commit");
            return Ok(None);
        }
        let commit_id = self
            .git
            .head_sha()
            .map_err(PipelineError::branch_operation)?;
        info!(commit = %commit_id, files = staged_paths.len(), "changes committed");
        Ok(Some(CommitOutcome {
            commit_id,
            message: message.to_string(),
            staged_paths,
        }))
    }

    /// Push `branch` with upstream tracking. Failures degrade to `Skipped`.
    #[instrument(skip_all, fields(%branch))]
    pub fn push(&self, branch: &str) -> PushOutcome {
        match self.git.remote_url(self.remote) {
            Ok(Some(_)) => {}
            Ok(None) => {
                let reason = format!("no remote '{}' configured", self.remote);
                warn!(%reason, "push skipped, commit stays local");
                return PushOutcome::Skipped { reason };
            }
            Err(err) => {
                let reason = format!("{err:#}");
                warn!(%reason, "push skipped, commit stays local");
                return PushOutcome::Skipped { reason };
            }
        }
        match self.git.push_set_upstream(self.remote, branch) {
            Ok(()) => {
                debug!(remote = self.remote, "branch pushed");
                PushOutcome::Pushed {
                    remote: self.remote.to_string(),
                    branch: branch.to_string(),
                }
            }
            Err(err) => {
                let reason = format!("{err:#}");
                warn!(%reason, "push failed, commit stays local");
                PushOutcome::Skipped { reason }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::test_support::TestRepo;

    #[test]
    fn ledger_strategy_stages_only_ledger_paths() {
        let repo = TestRepo::new();
        fs::write(repo.path().join("utils.py"), "def greet():\n    pass\n").expect("write");
        fs::write(repo.path().join("scratch.txt"), "unrelated\n").expect("write");
        let mut ledger = ChangeLedger::new();
        ledger.record("utils.py", "Generated code for utils.py");

        let git = repo.git();
        let controller = CommitAndPushController::new(&git, "origin");
        let outcome = controller
            .commit(StagingStrategy::LedgerPaths, &ledger, "Add greet")
            .expect("commit")
            .expect("committed");

        assert_eq!(outcome.staged_paths, vec!["utils.py".to_string()]);
        assert_eq!(repo.last_commit_message(), "Add greet");
        let status = git.status_porcelain().expect("status");
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].path, "scratch.txt");
    }

    #[test]
    fn working_tree_strategy_stages_everything() {
        let repo = TestRepo::new();
        fs::write(repo.path().join("a.py"), "a = 1\n").expect("write");
        fs::write(repo.path().join("b.txt"), "b\n").expect("write");
        let git = repo.git();
        let controller = CommitAndPushController::new(&git, "origin");
        let outcome = controller
            .commit(StagingStrategy::WorkingTree, &ChangeLedger::new(), "[Studio] x")
            .expect("commit")
            .expect("committed");
        assert_eq!(outcome.staged_paths.len(), 2);
        assert!(git.status_porcelain().expect("status").is_empty());
    }

    #[test]
    fn nothing_staged_means_no_commit() {
        let repo = TestRepo::new();
        let git = repo.git();
        let before = git.head_sha().expect("sha");
        let controller = CommitAndPushController::new(&git, "origin");
        let outcome = controller
            .commit(StagingStrategy::WorkingTree, &ChangeLedger::new(), "noop")
            .expect("commit");
        assert_eq!(outcome, None);
        assert_eq!(git.head_sha().expect("sha"), before);
    }

    #[test]
    fn pending_changes_follow_the_staging_strategy() {
        let repo = TestRepo::new();
        repo.commit_file("utils.py", "x = 1", "utils");
        fs::write(repo.path().join("scratch.txt"), "unrelated\n").expect("write");
        let mut ledger = ChangeLedger::new();
        ledger.record("utils.py", "Generated code for utils.py");
        let git = repo.git();
        let controller = CommitAndPushController::new(&git, "origin");

        assert!(!controller
            .has_pending_changes(StagingStrategy::LedgerPaths, &ledger)
            .expect("status"));
        assert!(controller
            .has_pending_changes(StagingStrategy::WorkingTree, &ledger)
            .expect("status"));

        fs::write(repo.path().join("utils.py"), "x = 2").expect("write");
        assert!(controller
            .has_pending_changes(StagingStrategy::LedgerPaths, &ledger)
            .expect("status"));
    }

    #[test]
    fn push_without_remote_is_skipped() {
        let repo = TestRepo::new();
        let git = repo.git();
        let controller = CommitAndPushController::new(&git, "origin");
        match controller.push("main") {
            PushOutcome::Skipped { reason } => assert!(reason.contains("origin")),
            other => panic!("expected skip, got {other:?}"),
        }
    }

    #[test]
    fn push_sets_upstream_on_bare_remote() {
        let repo = TestRepo::new();
        let remote = repo.add_bare_remote("origin");
        let git = repo.git();
        git.checkout_new_branch("feature/alice/x").expect("branch");
        let controller = CommitAndPushController::new(&git, "origin");
        assert_eq!(
            controller.push("feature/alice/x"),
            PushOutcome::Pushed {
                remote: "origin".to_string(),
                branch: "feature/alice/x".to_string(),
            }
        );
        assert!(remote.has_branch("feature/alice/x"));
    }
}
