//! Bounded command execution inside a working copy.
//!
//! Failures (spawn errors, timeouts, bad input) are reported through
//! `stderr` of the returned output rather than as errors.

use std::fs;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::core::manifest::union_entries;
use crate::io::config::{ParserConfig, SandboxConfig};
use crate::io::process::run_command_with_timeout;
use crate::io::workspace::{safe_relative_path, write_file};

/// Request to run code in a working copy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecRequest {
    /// File to write (with `code`) and, without `command`, to run.
    pub filename: Option<String>,
    pub code: Option<String>,
    /// Whitespace-split command line; defaults to `<interpreter> <filename>`.
    pub command: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxOutput {
    pub stdout: String,
    pub stderr: String,
}

impl SandboxOutput {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: message.into(),
        }
    }
}

/// Optionally write `filename`, then run the command with the exec timeout.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn execute(root: &Path, request: &ExecRequest, cfg: &SandboxConfig) -> SandboxOutput {
    let filename = request
        .filename
        .as_deref()
        .map(str::trim)
        .filter(|f| !f.is_empty());

    if let (Some(filename), Some(code)) = (filename, request.code.as_deref()) {
        let Some(rel) = safe_relative_path(filename) else {
            return SandboxOutput::failure(format!("unsafe filename: {filename}"));
        };
        if let Err(err) = write_file(root, &rel, code) {
            return SandboxOutput::failure(format!("{err:#}"));
        }
    }

    let argv: Vec<String> = match (request.command.as_deref(), filename) {
        (Some(command), _) if !command.trim().is_empty() => {
            command.split_whitespace().map(str::to_string).collect()
        }
        (_, Some(filename)) => vec![cfg.interpreter.clone(), filename.to_string()],
        _ => return SandboxOutput::failure("no command or filename given"),
    };
    run_bounded(root, &argv, cfg.exec_timeout(), cfg.output_limit_bytes)
}

/// Union the manifest addendum into the primary manifest, then install it.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn install_requirements(
    root: &Path,
    parser: &ParserConfig,
    cfg: &SandboxConfig,
) -> SandboxOutput {
    let manifest = root.join(&parser.manifest);
    let addendum = root.join(&parser.manifest_addendum);

    if addendum.is_file() {
        let merged = fs::read_to_string(&addendum).and_then(|additions| {
            let existing = if manifest.is_file() {
                fs::read_to_string(&manifest)?
            } else {
                String::new()
            };
            fs::write(&manifest, union_entries(&existing, &additions))
        });
        if let Err(err) = merged {
            warn!(err = %err, "manifest merge failed");
            return SandboxOutput::failure(format!("merge {}: {err}", parser.manifest));
        }
    }
    if !manifest.is_file() {
        return SandboxOutput::failure(format!("{} not found", parser.manifest));
    }

    let argv = vec![
        cfg.installer.clone(),
        "install".to_string(),
        "-r".to_string(),
        parser.manifest.clone(),
    ];
    run_bounded(root, &argv, cfg.install_timeout(), cfg.output_limit_bytes)
}

fn run_bounded(root: &Path, argv: &[String], timeout: Duration, limit: usize) -> SandboxOutput {
    let Some((program, args)) = argv.split_first() else {
        return SandboxOutput::failure("empty command");
    };
    if !root.is_dir() {
        return SandboxOutput::failure(format!("{} is not a directory", root.display()));
    }
    info!(program = %program, "running sandbox command");
    let mut cmd = Command::new(program);
    cmd.args(args).current_dir(root);
    match run_command_with_timeout(cmd, None, timeout, limit) {
        Ok(output) if output.timed_out => SandboxOutput {
            stdout: output.stdout_text(),
            stderr: format!(
                "{}command timed out after {}s",
                output.stderr_text(),
                timeout.as_secs()
            ),
        },
        Ok(output) => SandboxOutput {
            stdout: output.stdout_text(),
            stderr: output.stderr_text(),
        },
        Err(err) => SandboxOutput::failure(format!("{err:#}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> SandboxConfig {
        SandboxConfig {
            interpreter: "cat".to_string(),
            installer: "echo".to_string(),
            ..SandboxConfig::default()
        }
    }

    #[test]
    fn writes_file_then_runs_default_interpreter() {
        let temp = tempfile::tempdir().expect("tempdir");
        let out = execute(
            temp.path(),
            &ExecRequest {
                filename: Some("hello.py".to_string()),
                code: Some("print('hi')\n".to_string()),
                command: None,
            },
            &cfg(),
        );
        assert_eq!(out.stdout, "print('hi')\n");
        assert_eq!(out.stderr, "");
    }

    #[test]
    fn explicit_command_is_whitespace_split() {
        let temp = tempfile::tempdir().expect("tempdir");
        let out = execute(
            temp.path(),
            &ExecRequest {
                command: Some("echo  one   two".to_string()),
                ..ExecRequest::default()
            },
            &cfg(),
        );
        assert_eq!(out.stdout, "one two\n");
    }

    #[test]
    fn spawn_failure_is_reported_in_stderr() {
        let temp = tempfile::tempdir().expect("tempdir");
        let out = execute(
            temp.path(),
            &ExecRequest {
                command: Some("definitely-not-a-program".to_string()),
                ..ExecRequest::default()
            },
            &cfg(),
        );
        assert!(out.stdout.is_empty());
        assert!(out.stderr.contains("spawn command"));
    }

    #[test]
    fn unsafe_filename_is_refused() {
        let temp = tempfile::tempdir().expect("tempdir");
        let out = execute(
            temp.path(),
            &ExecRequest {
                filename: Some("../escape.py".to_string()),
                code: Some("x".to_string()),
                command: None,
            },
            &cfg(),
        );
        assert!(out.stderr.contains("unsafe filename"));
        assert!(!temp.path().join("../escape.py").exists());
    }

    #[test]
    fn install_reports_missing_manifest() {
        let temp = tempfile::tempdir().expect("tempdir");
        let out = install_requirements(temp.path(), &ParserConfig::default(), &cfg());
        assert_eq!(out.stderr, "requirements.txt not found");
    }

    #[test]
    fn install_unions_addendum_before_running() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("requirements.txt"), "flask\n").expect("write");
        fs::write(temp.path().join("requirements-new.txt"), "flask\nrequests\n").expect("write");
        let out = install_requirements(temp.path(), &ParserConfig::default(), &cfg());
        assert_eq!(out.stdout, "install -r requirements.txt\n");
        assert_eq!(
            fs::read_to_string(temp.path().join("requirements.txt")).expect("read"),
            "flask\nrequests\n"
        );
    }
}
