//! Interactive flow: change request in, committed branch and draft pull
//! request out.
//!
//! ```text
//! resolve -> generate -> parse -> gate (per artifact) -> ledger
//!   -> branch -> describe -> commit (ledger paths) -> push -> diff -> publish
//! ```

use tracing::{info, instrument, warn};

use crate::branch::BranchManager;
use crate::commit::{CommitAndPushController, StagingStrategy};
use crate::core::ledger::ChangeLedger;
use crate::core::message::commit_message;
use crate::core::naming::slug_branch_name;
use crate::core::types::{ChangeRequest, Degradation, FileArtifact, Provenance};
use crate::describe::{DescriptionSource, PrDescriptionSynthesizer};
use crate::error::{PipelineError, Result};
use crate::flow::{Collaborators, RunReport, collect_diff, open_pull_request, push_branch};
use crate::gate::ValidationGate;
use crate::generator::ChangeGenerator;
use crate::io::workspace::{acquire_repository, list_files, working_copy_path};
use crate::resolver::{TargetFileResolver, answer_mentions};

const NOTHING_TO_COMMIT: &str = "Accepted changes match the committed content";

/// Ledger description for an artifact accepted from the generator.
pub fn generated_description(path: &str) -> String {
    format!("Generated code for {path}")
}

/// Run one change request end to end. Never panics on pipeline failures;
/// the report carries the terminal status and any partial artifacts.
#[instrument(
    skip_all,
    fields(requester = %request.requester, name = %request.descriptive_name)
)]
pub fn run_interactive(ctx: &Collaborators<'_>, request: &ChangeRequest) -> RunReport {
    let mut report = RunReport::new();
    let outcome = drive(ctx, request, &mut report);
    report.finish(outcome)
}

fn drive(ctx: &Collaborators<'_>, request: &ChangeRequest, report: &mut RunReport) -> Result<()> {
    let cfg = ctx.config;
    let completion = ctx.completion()?;

    let location = working_copy_path(&request.repository, &cfg.git.data_dir)
        .map_err(PipelineError::repo_access)?;
    let _lease = ctx.leases.acquire(&location);
    let repo_path = acquire_repository(&request.repository, &cfg.git.data_dir)
        .map_err(PipelineError::repo_access)?;
    report.repo_path = Some(repo_path.display().to_string());

    let mut branches = BranchManager::open(ctx.git(&repo_path), &cfg.git.base_branch)?;
    let branch_name = slug_branch_name(&request.requester, &request.descriptive_name);
    report.branch_name = Some(branch_name.clone());
    let branch = branches.checkout(&branch_name)?;

    let files = list_files(&repo_path).map_err(PipelineError::repo_access)?;
    let targets =
        TargetFileResolver::new(completion, ctx.prompts).resolve(&request.message, &files)?;
    report.target_files = Some(targets.clone());

    let generator = ChangeGenerator::new(completion, ctx.prompts, &cfg.parser);
    let parsed = generator.generate(&request.message, &targets)?;
    report.plan = parsed.plan.clone();
    report.parse_ambiguity = parsed.ambiguity;
    let eligible = generator.eligible_artifacts(&parsed, &repo_path)?;
    report.discarded_paths = eligible.discarded;

    let gate = ValidationGate::new(
        &repo_path,
        ctx.linter,
        cfg.gate.new_files,
        &cfg.gate.lint_extensions,
    );
    let mut ledger = ChangeLedger::new();
    for artifact in &eligible.artifacts {
        let description = generated_description(&artifact.path);
        if let Err(failure) = gate.admit(artifact, &description, &mut ledger) {
            report.rejections.push(failure);
        }
    }
    report.unresolved_paths = unresolved_paths(&targets, &eligible.artifacts, &ledger);
    report.ledger = ledger.clone();
    if ledger.is_empty() {
        info!(rejected = report.rejections.len(), "no artifact accepted");
        report.message = "No changes were accepted".to_string();
        return Ok(());
    }

    let git = branches.git();
    let controller = CommitAndPushController::new(git, &cfg.git.remote);
    if !controller.has_pending_changes(StagingStrategy::LedgerPaths, &ledger)? {
        info!("accepted changes match the committed content");
        report.message = NOTHING_TO_COMMIT.to_string();
        return Ok(());
    }

    let description = PrDescriptionSynthesizer::new(completion, ctx.prompts).synthesize(
        &request.message,
        None,
        DescriptionSource::Ledger(&ledger),
    )?;
    let title = if description.title.is_empty() {
        request.descriptive_name.clone()
    } else {
        description.title.clone()
    };
    let message = commit_message(
        Some(description.body.as_str()),
        &request.descriptive_name,
        &cfg.commit.studio_prefix,
    );
    let Some(commit) = controller.commit(StagingStrategy::LedgerPaths, &ledger, &message)? else {
        report.message = NOTHING_TO_COMMIT.to_string();
        return Ok(());
    };
    report.commit_id = Some(commit.commit_id);
    if description.is_empty() {
        report.degrade(Degradation::EmptyDescription);
    }
    report.pr_title = Some(title.clone());
    report.pr_description = Some(description.body.clone());

    let pushed = push_branch(&controller, &branch.name, report);
    collect_diff(git, &branch, report)?;
    open_pull_request(ctx, git, &branch, &title, &description.body, pushed, report)?;

    report.message = match &report.pr_url {
        Some(url) => format!("Pull request opened: {url}"),
        None => format!("Changes committed to {}", branch.name),
    };
    Ok(())
}

/// Accepted generated paths the resolver answer never mentioned. The merged
/// manifest is exempt.
fn unresolved_paths(
    answer: &str,
    artifacts: &[FileArtifact],
    ledger: &ChangeLedger,
) -> Vec<String> {
    let unresolved: Vec<String> = artifacts
        .iter()
        .filter(|artifact| artifact.provenance != Provenance::ManifestMerge)
        .filter(|artifact| ledger.contains(&artifact.path))
        .filter(|artifact| !answer_mentions(answer, &artifact.path))
        .map(|artifact| artifact.path.clone())
        .collect();
    if !unresolved.is_empty() {
        warn!(paths = ?unresolved, "generated paths were not named by the resolver");
    }
    unresolved
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merged_manifest_is_never_unresolved() {
        let artifacts = vec![
            FileArtifact::generated("utils.py", "x"),
            FileArtifact::generated("other.py", "y"),
            FileArtifact {
                path: "requirements.txt".to_string(),
                content: "requests\n".to_string(),
                provenance: Provenance::ManifestMerge,
            },
        ];
        let mut ledger = ChangeLedger::new();
        for artifact in &artifacts {
            ledger.record(artifact.path.as_str(), generated_description(&artifact.path));
        }
        assert_eq!(unresolved_paths("utils.py", &artifacts, &ledger), vec!["other.py"]);
    }

    #[test]
    fn rejected_artifacts_are_never_unresolved() {
        let artifacts = vec![
            FileArtifact::generated("utils.py", "x"),
            FileArtifact::generated("rejected.py", "y"),
        ];
        let mut ledger = ChangeLedger::new();
        ledger.record("utils.py", generated_description("utils.py"));
        assert_eq!(unresolved_paths("", &artifacts, &ledger), vec!["utils.py"]);
        assert!(unresolved_paths("utils.py", &artifacts, &ledger).is_empty());
    }

    #[test]
    fn description_names_the_path() {
        assert_eq!(generated_description("a/b.py"), "Generated code for a/b.py");
    }
}
