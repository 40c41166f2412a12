//! Shared wiring for the entry flows: collaborators, the run report, and the
//! push / diff / publish tail every flow ends with.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::commit::{CommitAndPushController, PushOutcome};
use crate::core::ledger::ChangeLedger;
use crate::core::parser::ParseAmbiguity;
use crate::core::types::{
    Branch, Degradation, DiffRecord, PullRequestDraft, RunStatus, ValidationFailure,
};
use crate::diff::DiffCollector;
use crate::error::{PipelineError, Result};
use crate::io::completion::{AzureOpenAiClient, CompletionService};
use crate::io::config::AppConfig;
use crate::io::git::Git;
use crate::io::hosting::{GitHubClient, PullRequestHost};
use crate::io::lease::RepoLeases;
use crate::io::lint::{CommandLinter, Linter};
use crate::io::prompt::PromptEngine;
use crate::publish::{PrPublisher, PublishOutcome};

/// Everything a flow talks to, borrowed for the duration of one run.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub config: &'a AppConfig,
    /// `None` when no completion credentials are configured.
    pub completion: Option<&'a dyn CompletionService>,
    pub linter: &'a dyn Linter,
    /// `None` when no hosting token is configured.
    pub host: Option<&'a dyn PullRequestHost>,
    pub prompts: &'a PromptEngine,
    pub leases: &'a RepoLeases,
}

impl<'a> Collaborators<'a> {
    pub fn completion(&self) -> Result<&'a dyn CompletionService> {
        self.completion.ok_or_else(|| {
            PipelineError::Config(
                concat!(
                    "completion service is not configured ",
                    "(set AZURE_OPENAI_ENDPOINT and AZURE_OPENAI_API_KEY)"
                )
                .to_string(),
            )
        })
    }

    /// Git handle for a working copy, carrying the configured identity.
    pub fn git(&self, workdir: &Path) -> Git {
        Git::new(workdir).with_identity(
            self.config.git.author_name.as_deref(),
            self.config.git.author_email.as_deref(),
        )
    }

    pub fn publisher(&self) -> PrPublisher<'a> {
        PrPublisher::new(self.host, self.config.hosting.organization.as_deref())
    }
}

/// Production collaborators built from configuration.
pub struct Services {
    completion: Option<AzureOpenAiClient>,
    linter: CommandLinter,
    host: Option<GitHubClient>,
    prompts: PromptEngine,
}

impl Services {
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let configured =
            config.completion.endpoint.is_some() && config.completion.api_key.is_some();
        let completion = if configured {
            Some(AzureOpenAiClient::from_config(&config.completion).context("completion client")?)
        } else {
            None
        };
        Ok(Self {
            completion,
            linter: CommandLinter::from_config(&config.gate),
            host: GitHubClient::from_config(&config.hosting).context("hosting client")?,
            prompts: PromptEngine::new(),
        })
    }

    pub fn collaborators<'a>(
        &'a self,
        config: &'a AppConfig,
        leases: &'a RepoLeases,
    ) -> Collaborators<'a> {
        Collaborators {
            config,
            completion: self
                .completion
                .as_ref()
                .map(|client| client as &dyn CompletionService),
            linter: &self.linter,
            host: self.host.as_ref().map(|client| client as &dyn PullRequestHost),
            prompts: &self.prompts,
            leases,
        }
    }
}

/// Changed file as returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffFile {
    pub path: String,
    pub status: String,
    pub diff: String,
}

impl From<&DiffRecord> for DiffFile {
    fn from(record: &DiffRecord) -> Self {
        Self {
            path: record.path.clone(),
            status: record.change_type.as_str().to_string(),
            diff: record.patch.clone(),
        }
    }
}

/// Terminal result of an interactive or studio run, with whatever partial
/// artifacts were produced before the run stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub status: RunStatus,
    pub message: String,
    pub repo_path: Option<String>,
    pub branch_name: Option<String>,
    pub plan: Option<String>,
    /// Resolver answer, passed through unvalidated.
    pub target_files: Option<String>,
    pub parse_ambiguity: Option<ParseAmbiguity>,
    pub ledger: ChangeLedger,
    pub rejections: Vec<ValidationFailure>,
    /// Generated paths dropped by the extension allow-list.
    pub discarded_paths: Vec<String>,
    /// Accepted paths the resolver answer did not mention.
    pub unresolved_paths: Vec<String>,
    pub commit_id: Option<String>,
    pub pr_title: Option<String>,
    pub pr_description: Option<String>,
    pub pr_url: Option<String>,
    pub diff_files: Vec<DiffFile>,
    pub degradations: Vec<Degradation>,
    pub error: Option<String>,
    pub error_kind: Option<String>,
}

impl Default for RunReport {
    fn default() -> Self {
        Self {
            status: RunStatus::Success,
            message: String::new(),
            repo_path: None,
            branch_name: None,
            plan: None,
            target_files: None,
            parse_ambiguity: None,
            ledger: ChangeLedger::new(),
            rejections: Vec::new(),
            discarded_paths: Vec::new(),
            unresolved_paths: Vec::new(),
            commit_id: None,
            pr_title: None,
            pr_description: None,
            pr_url: None,
            diff_files: Vec::new(),
            degradations: Vec::new(),
            error: None,
            error_kind: None,
        }
    }
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn degrade(&mut self, degradation: Degradation) {
        if self.status == RunStatus::Success {
            self.status = RunStatus::Degraded;
        }
        self.degradations.push(degradation);
    }

    pub fn fail(&mut self, err: PipelineError) {
        warn!(kind = err.kind(), error = %err, "run failed");
        self.status = RunStatus::Error;
        self.message = err.to_string();
        self.error_kind = Some(err.kind().to_string());
        self.error = Some(err.to_string());
    }

    /// Close out the report from the result of the flow body.
    pub fn finish(mut self, outcome: Result<()>) -> Self {
        if let Err(err) = outcome {
            self.fail(err);
        }
        self
    }
}

/// Push the branch, recording a degradation when it stays local.
pub fn push_branch(
    controller: &CommitAndPushController<'_>,
    branch: &str,
    report: &mut RunReport,
) -> bool {
    match controller.push(branch) {
        PushOutcome::Pushed { .. } => true,
        PushOutcome::Skipped { reason } => {
            report.degrade(Degradation::PushSkipped { reason });
            false
        }
    }
}

/// Collect base..branch records and copy them into the report.
pub fn collect_diff(
    git: &Git,
    branch: &Branch,
    report: &mut RunReport,
) -> Result<Vec<DiffRecord>> {
    let records = DiffCollector::new(git).collect(&branch.base_ref, &branch.name)?;
    report.diff_files = records.iter().map(DiffFile::from).collect();
    Ok(records)
}

/// Open a draft pull request for `branch` once it carries at least one
/// commit over its base and has been pushed.
pub fn open_pull_request(
    ctx: &Collaborators<'_>,
    git: &Git,
    branch: &Branch,
    title: &str,
    body: &str,
    pushed: bool,
    report: &mut RunReport,
) -> Result<()> {
    let ahead = git
        .commits_between(&branch.base_ref, &branch.name)
        .map_err(PipelineError::branch_operation)?;
    if ahead == 0 {
        report.degrade(Degradation::PublishSkipped {
            reason: format!("{} has no commits over {}", branch.name, branch.base_ref),
        });
        return Ok(());
    }
    if !pushed {
        report.degrade(Degradation::PublishSkipped {
            reason: "branch was not pushed".to_string(),
        });
        return Ok(());
    }

    let draft = PullRequestDraft {
        title: title.to_string(),
        body: body.to_string(),
        head: branch.name.clone(),
        base: branch.base_ref.clone(),
        draft: true,
        url: None,
    };
    match ctx
        .publisher()
        .publish(git, &ctx.config.git.remote, &draft)?
    {
        PublishOutcome::Opened { url } => {
            info!(%url, "draft pull request opened");
            report.pr_url = Some(url);
        }
        PublishOutcome::LocalOnly { reason } => {
            report.degrade(Degradation::PublishSkipped { reason });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degradation_does_not_mask_failure() {
        let mut report = RunReport::new();
        report.degrade(Degradation::EmptyDescription);
        assert_eq!(report.status, RunStatus::Degraded);

        let report = report.finish(Err(PipelineError::PrHosting("404".to_string())));
        assert_eq!(report.status, RunStatus::Error);
        assert_eq!(report.error_kind.as_deref(), Some("pr_hosting"));

        let mut report = report;
        report.degrade(Degradation::EmptyDescription);
        assert_eq!(report.status, RunStatus::Error);
    }

    #[test]
    fn report_serializes_status_and_ledger() {
        let mut report = RunReport::new();
        report.ledger.record("utils.py", "Generated code for utils.py");
        let value = serde_json::to_value(&report).expect("serialize");
        assert_eq!(value["status"], "success");
        assert_eq!(value["ledger"][0]["path"], "utils.py");
        assert!(value["pr_url"].is_null());
    }

    #[test]
    fn missing_completion_is_a_config_error() {
        let config = AppConfig::default();
        let services = Services::from_config(&config).expect("services");
        let leases = RepoLeases::new();
        let ctx = services.collaborators(&config, &leases);
        let err = ctx.completion().err().expect("missing completion");
        assert_eq!(err.kind(), "config");
        assert!(ctx.host.is_none());
    }
}
