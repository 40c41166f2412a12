//! Studio flow: caller-supplied file contents onto a fresh timestamped
//! branch, committed as a whole working tree and described from the diff.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::branch::BranchManager;
use crate::commit::{CommitAndPushController, StagingStrategy};
use crate::core::ledger::ChangeLedger;
use crate::core::locator::repo_name_from_reference;
use crate::core::message::fallback_message;
use crate::core::naming::timestamp_branch_name;
use crate::core::types::{Degradation, FileArtifact, NewFilePolicy};
use crate::describe::{DescriptionSource, PrDescriptionSynthesizer};
use crate::error::{PipelineError, Result};
use crate::flow::{Collaborators, RunReport, collect_diff, open_pull_request, push_branch};
use crate::gate::ValidationGate;
use crate::io::workspace::ensure_working_copy;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudioRequest {
    pub repo_path: String,
    /// Repository-relative path to full content, kept in the order given.
    #[serde(with = "files_in_order")]
    pub files: Vec<(String, String)>,
    pub original_query: String,
    pub username: String,
    pub pr_title: String,
    #[serde(default)]
    pub pr_description: Option<String>,
}

/// `files` travels as a JSON object; entries keep their document order.
mod files_in_order {
    use std::fmt;

    use serde::de::{MapAccess, Visitor};
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        files: &[(String, String)],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_map(files.iter().map(|(path, content)| (path, content)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<(String, String)>, D::Error> {
        deserializer.deserialize_map(FilesVisitor)
    }

    struct FilesVisitor;

    impl<'de> Visitor<'de> for FilesVisitor {
        type Value = Vec<(String, String)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of repository path to file content")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut files: Vec<(String, String)> = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((path, content)) = map.next_entry::<String, String>()? {
                match files.iter_mut().find(|(existing, _)| *existing == path) {
                    Some(entry) => entry.1 = content,
                    None => files.push((path, content)),
                }
            }
            Ok(files)
        }
    }
}

/// Clone URL used when the working copy is missing.
pub fn studio_clone_url(
    organization: Option<&str>,
    username: &str,
    repo_path: &Path,
) -> Option<String> {
    let name = repo_name_from_reference(&repo_path.to_string_lossy())?;
    let owner = organization
        .map(str::trim)
        .filter(|org| !org.is_empty())
        .unwrap_or(username);
    Some(format!("https://github.com/{owner}/{name}.git"))
}

#[instrument(skip_all, fields(user = %request.username, files = request.files.len()))]
pub fn run_studio(
    ctx: &Collaborators<'_>,
    request: &StudioRequest,
    at: NaiveDateTime,
) -> RunReport {
    let mut report = RunReport::new();
    let outcome = drive(ctx, request, at, &mut report);
    report.finish(outcome)
}

fn drive(
    ctx: &Collaborators<'_>,
    request: &StudioRequest,
    at: NaiveDateTime,
    report: &mut RunReport,
) -> Result<()> {
    let cfg = ctx.config;
    let completion = ctx.completion()?;
    let repo_path = PathBuf::from(request.repo_path.trim());
    let _lease = ctx.leases.acquire(&repo_path);
    report.repo_path = Some(repo_path.display().to_string());

    if !repo_path.exists() {
        let url = studio_clone_url(
            cfg.hosting.organization.as_deref(),
            &request.username,
            &repo_path,
        )
        .ok_or_else(|| {
            PipelineError::RepoAccess(format!(
                "cannot derive repository name from {}",
                repo_path.display()
            ))
        })?;
        ensure_working_copy(&repo_path, &url).map_err(PipelineError::repo_access)?;
    }

    let mut branches = BranchManager::open(ctx.git(&repo_path), &cfg.git.base_branch)?;
    let branch_name = timestamp_branch_name(&request.username, at);
    report.branch_name = Some(branch_name.clone());
    let branch = branches.start_from_base(&branch_name, &cfg.git.remote)?;

    let gate = ValidationGate::new(
        &repo_path,
        ctx.linter,
        NewFilePolicy::Allow,
        &cfg.gate.lint_extensions,
    );
    let mut ledger = ChangeLedger::new();
    for (path, content) in &request.files {
        let artifact = FileArtifact::supplied(path.clone(), content.clone());
        let description = format!("Studio edit of {path}");
        if let Err(failure) = gate.admit(&artifact, &description, &mut ledger) {
            report.rejections.push(failure);
        }
    }
    report.ledger = ledger.clone();

    let git = branches.git();
    let controller = CommitAndPushController::new(git, &cfg.git.remote);
    let message = fallback_message(&request.pr_title, &cfg.commit.studio_prefix);
    let Some(commit) = controller.commit(StagingStrategy::WorkingTree, &ledger, &message)? else {
        info!("studio files produced no change");
        report.message = "Nothing to commit".to_string();
        return Ok(());
    };
    report.commit_id = Some(commit.commit_id);

    let pushed = push_branch(&controller, &branch.name, report);
    let records = collect_diff(git, &branch, report)?;

    let description = PrDescriptionSynthesizer::new(completion, ctx.prompts).synthesize(
        &request.original_query,
        request.pr_description.as_deref().filter(|notes| !notes.trim().is_empty()),
        DescriptionSource::Diff {
            base: &branch.base_ref,
            head: &branch.name,
            records: &records,
        },
    )?;
    if description.is_empty() {
        report.degrade(Degradation::EmptyDescription);
    }
    report.pr_title = Some(request.pr_title.clone());
    report.pr_description = Some(description.body.clone());

    open_pull_request(
        ctx,
        git,
        &branch,
        &request.pr_title,
        &description.body,
        pushed,
        report,
    )?;
    report.message = match &report.pr_url {
        Some(url) => format!("Draft pull request opened: {url}"),
        None => format!("Changes committed to {}", branch.name),
    };
    Ok(())
}
