//! Change-request pipeline CLI.
//!
//! Every subcommand prints a JSON document on stdout. Exit codes follow
//! [`pipeline::exit_codes`].

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use pipeline::core::types::{ChangeRequest, RunStatus};
use pipeline::error::PipelineError;
use pipeline::exit_codes;
use pipeline::flow::Services;
use pipeline::interactive::run_interactive;
use pipeline::io::config::load_startup_config;
use pipeline::io::lease::RepoLeases;
use pipeline::logging;
use pipeline::review::{
    PrRequest, PrUpdateRequest, create_pull_request, list_branches, preview_pull_request,
    update_pull_request,
};
use pipeline::studio::{StudioRequest, run_studio};

#[derive(Parser)]
#[command(
    name = "pipeline",
    version,
    about = "Turn change requests into reviewable pull requests"
)]
struct Cli {
    /// Configuration file (defaults to `pipeline.toml` when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve, generate, gate, commit and publish one change request.
    Chat {
        /// Clone URL or local working-copy path.
        #[arg(long)]
        repo: String,
        #[arg(long)]
        requester: String,
        /// Human-readable name; becomes the branch slug.
        #[arg(long)]
        name: String,
        /// Free-text change request.
        #[arg(long)]
        message: String,
    },
    /// Commit supplied files on a timestamped branch and open a draft PR.
    Studio {
        #[arg(long)]
        repo_path: String,
        #[arg(long)]
        username: String,
        #[arg(long)]
        title: String,
        /// Original request the files answer; fed to the description.
        #[arg(long)]
        query: String,
        #[arg(long)]
        description: Option<String>,
        /// `<repo-relative path>=<local file>`; repeatable.
        #[arg(long = "file", value_parser = parse_file_arg)]
        files: Vec<(String, PathBuf)>,
    },
    /// Replace title and body of an existing pull request.
    UpdatePr {
        #[arg(long)]
        url: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        body: String,
    },
    /// List local branches of a working copy.
    Branches {
        #[arg(long)]
        repo: PathBuf,
    },
    /// Diff two branches and synthesize pull request content.
    Preview(BranchPair),
    /// Push an existing branch and open a draft PR against the target.
    CreatePr(BranchPair),
}

#[derive(Args)]
struct BranchPair {
    #[arg(long)]
    repo: String,
    /// Branch carrying the changes.
    #[arg(long)]
    source: String,
    #[arg(long, default_value = "main")]
    target: String,
    #[arg(long)]
    title: String,
    #[arg(long, default_value = "")]
    description: String,
}

impl From<BranchPair> for PrRequest {
    fn from(pair: BranchPair) -> Self {
        Self {
            repo_path: pair.repo,
            source_branch: pair.source,
            target_branch: pair.target,
            title: pair.title,
            description: pair.description,
        }
    }
}

#[derive(Serialize)]
struct ErrorReply {
    status: RunStatus,
    error: String,
    error_kind: &'static str,
}

#[derive(Serialize)]
struct StatusReply {
    status: RunStatus,
}

fn main() {
    logging::init("warn");
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::ERROR);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let config = load_startup_config(cli.config.as_deref())?;
    let services = Services::from_config(&config)?;
    let leases = RepoLeases::new();
    let ctx = services.collaborators(&config, &leases);

    match cli.command {
        Command::Chat {
            repo,
            requester,
            name,
            message,
        } => {
            let request = ChangeRequest {
                message,
                repository: repo,
                requester,
                descriptive_name: name,
            };
            let report = run_interactive(&ctx, &request);
            print_json(&report)?;
            Ok(exit_codes::for_status(report.status))
        }
        Command::Studio {
            repo_path,
            username,
            title,
            query,
            description,
            files,
        } => {
            let mut contents = Vec::with_capacity(files.len());
            for (target, local) in files {
                let content = fs::read_to_string(&local)
                    .with_context(|| format!("read {}", local.display()))?;
                contents.push((target, content));
            }
            let request = StudioRequest {
                repo_path,
                files: contents,
                original_query: query,
                username,
                pr_title: title,
                pr_description: description,
            };
            let report = run_studio(&ctx, &request, chrono::Local::now().naive_local());
            print_json(&report)?;
            Ok(exit_codes::for_status(report.status))
        }
        Command::UpdatePr { url, title, body } => {
            let request = PrUpdateRequest {
                pr_url: url,
                title,
                body,
            };
            respond(update_pull_request(&ctx, &request).map(|()| StatusReply {
                status: RunStatus::Success,
            }))
        }
        Command::Branches { repo } => respond(
            list_branches(&ctx, &repo).map(|branches| serde_json::json!({ "branches": branches })),
        ),
        Command::Preview(pair) => respond(preview_pull_request(&ctx, &pair.into())),
        Command::CreatePr(pair) => respond(create_pull_request(&ctx, &pair.into())),
    }
}

fn respond<T: Serialize>(result: std::result::Result<T, PipelineError>) -> Result<i32> {
    match result {
        Ok(value) => {
            print_json(&value)?;
            Ok(exit_codes::OK)
        }
        Err(err) => {
            print_json(&ErrorReply {
                status: RunStatus::Error,
                error: err.to_string(),
                error_kind: err.kind(),
            })?;
            Ok(exit_codes::ERROR)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize json")?;
    println!("{payload}");
    Ok(())
}

fn parse_file_arg(raw: &str) -> std::result::Result<(String, PathBuf), String> {
    match raw.split_once('=') {
        Some((target, local)) if !target.trim().is_empty() && !local.trim().is_empty() => {
            Ok((target.trim().to_string(), PathBuf::from(local.trim())))
        }
        _ => Err(format!("expected <repo path>=<local file>, got '{raw}'")),
    }
}
