//! Static-analysis runner used by the validation gate.
//!
//! The [`Linter`] trait isolates the analyzer subprocess; tests use scripted
//! linters with fixed verdicts.

use std::io::Write;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

use crate::io::config::GateConfig;
use crate::io::process::run_command_with_timeout;

/// Outcome of analysing one artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LintVerdict {
    Clean,
    /// Analyzer output describing the issues found.
    Issues(String),
}

pub trait Linter: Send + Sync {
    /// Analyse `content` in isolation. `path` only supplies the file suffix.
    ///
    /// An `Err` means the analyzer could not run at all.
    fn lint(&self, path: &str, content: &str) -> Result<LintVerdict>;
}

/// Runs an external analyzer (default `pylint`) on a temp copy of the content.
#[derive(Debug, Clone)]
pub struct CommandLinter {
    command: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandLinter {
    pub fn new(command: Vec<String>, timeout: Duration, output_limit_bytes: usize) -> Self {
        Self {
            command,
            timeout,
            output_limit_bytes,
        }
    }

    pub fn from_config(cfg: &GateConfig) -> Self {
        Self::new(
            cfg.lint_command.clone(),
            cfg.lint_timeout(),
            cfg.output_limit_bytes,
        )
    }
}

impl Linter for CommandLinter {
    #[instrument(skip_all, fields(%path))]
    fn lint(&self, path: &str, content: &str) -> Result<LintVerdict> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("lint command is empty"))?;

        let suffix = std::path::Path::new(path)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default();
        let mut file = tempfile::Builder::new()
            .prefix("lint-")
            .suffix(&suffix)
            .tempfile()
            .context("create lint temp file")?;
        file.write_all(content.as_bytes())
            .context("write lint temp file")?;
        file.flush().context("flush lint temp file")?;

        let mut cmd = Command::new(program);
        cmd.args(args).arg(file.path());
        let output = run_command_with_timeout(cmd, None, self.timeout, self.output_limit_bytes)
            .with_context(|| format!("run {program}"))?;

        if output.timed_out {
            warn!(timeout_secs = self.timeout.as_secs(), "analyzer timed out");
            return Ok(LintVerdict::Issues(format!(
                "{program} timed out after {}s",
                self.timeout.as_secs()
            )));
        }
        if output.status.success() {
            debug!("analyzer reported no issues");
            return Ok(LintVerdict::Clean);
        }

        let mut report = output.stdout_text();
        let stderr = output.stderr_text();
        if !stderr.trim().is_empty() {
            report.push_str(&stderr);
        }
        debug!(exit_code = ?output.status.code(), "analyzer reported issues");
        Ok(LintVerdict::Issues(report.trim().to_string()))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh_linter(script: &str) -> CommandLinter {
        CommandLinter::new(
            vec!["sh".to_string(), "-c".to_string(), script.to_string(), "lint".to_string()],
            Duration::from_secs(10),
            4096,
        )
    }

    #[test]
    fn zero_exit_is_clean() {
        let linter = sh_linter("exit 0");
        assert_eq!(
            linter.lint("utils.py", "x = 1\n").expect("lint"),
            LintVerdict::Clean
        );
    }

    #[test]
    fn non_zero_exit_reports_output() {
        let linter = sh_linter("echo \"$1: unused import\"; exit 4");
        match linter.lint("utils.py", "import os\n").expect("lint") {
            LintVerdict::Issues(report) => {
                assert!(report.contains(".py: unused import"), "report: {report}");
            }
            other => panic!("expected issues, got {other:?}"),
        }
    }

    #[test]
    fn temp_file_carries_artifact_content() {
        let linter = sh_linter("grep -q 'def greet' \"$1\"");
        assert_eq!(
            linter
                .lint("utils.py", "def greet():\n    return 1\n")
                .expect("lint"),
            LintVerdict::Clean
        );
    }

    #[test]
    fn missing_program_is_an_error() {
        let linter = CommandLinter::new(
            vec!["definitely-not-an-analyzer".to_string()],
            Duration::from_secs(5),
            1024,
        );
        assert!(linter.lint("a.py", "").is_err());
    }
}
