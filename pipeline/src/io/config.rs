//! Application configuration: optional `pipeline.toml` plus environment overlay.
//!
//! The value is built once at process start and passed by reference to every
//! component. Nothing below this module reads the environment.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::types::NewFilePolicy;

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "pipeline.toml";

/// Pipeline configuration (TOML).
///
/// Missing fields default to the values the service has always run with.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub completion: CompletionConfig,
    pub hosting: HostingConfig,
    pub git: GitConfig,
    pub parser: ParserConfig,
    pub gate: GateConfig,
    pub sandbox: SandboxConfig,
    pub commit: CommitConfig,
}

/// Text-completion service (Azure OpenAI deployment).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CompletionConfig {
    /// Resource endpoint, e.g. `https://my-resource.openai.azure.com`.
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    /// Deployment (model) name.
    pub deployment: String,
    pub api_version: String,
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            deployment: "gpt-4.1".to_string(),
            api_version: "2024-12-01-preview".to_string(),
            timeout_secs: 120,
        }
    }
}

impl CompletionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Pull request hosting service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HostingConfig {
    pub token: Option<String>,
    /// Owner used for clone URLs and pull requests; falls back to the
    /// owner parsed from the remote URL.
    pub organization: Option<String>,
    pub api_base: String,
    pub timeout_secs: u64,
}

impl Default for HostingConfig {
    fn default() -> Self {
        Self {
            token: None,
            organization: None,
            api_base: "https://api.github.com".to_string(),
            timeout_secs: 30,
        }
    }
}

impl HostingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GitConfig {
    pub remote: String,
    pub base_branch: String,
    /// Committer identity; when unset git's own configuration applies.
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    /// Root directory for cloned working copies.
    pub data_dir: PathBuf,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            remote: "origin".to_string(),
            base_branch: "main".to_string(),
            author_name: None,
            author_email: None,
            data_dir: PathBuf::from("data"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ParserConfig {
    /// Extensions (without dot) of artifacts that are persisted.
    pub allowed_extensions: Vec<String>,
    /// Primary dependency manifest.
    pub manifest: String,
    /// Generated file whose entries are unioned into the primary manifest.
    pub manifest_addendum: String,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            allowed_extensions: vec!["py".to_string(), "txt".to_string()],
            manifest: "requirements.txt".to_string(),
            manifest_addendum: "requirements-new.txt".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GateConfig {
    /// Static-analysis command; the artifact's temp file path is appended.
    pub lint_command: Vec<String>,
    /// Extensions that go through static analysis.
    pub lint_extensions: Vec<String>,
    pub lint_timeout_secs: u64,
    /// Truncate captured analyzer output beyond this many bytes.
    pub output_limit_bytes: usize,
    /// Policy for paths that do not exist yet (interactive flow).
    pub new_files: NewFilePolicy,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            lint_command: vec!["pylint".to_string()],
            lint_extensions: vec!["py".to_string()],
            lint_timeout_secs: 60,
            output_limit_bytes: 100_000,
            new_files: NewFilePolicy::Reject,
        }
    }
}

impl GateConfig {
    pub fn lint_timeout(&self) -> Duration {
        Duration::from_secs(self.lint_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SandboxConfig {
    pub exec_timeout_secs: u64,
    pub install_timeout_secs: u64,
    pub output_limit_bytes: usize,
    /// Interpreter used when no explicit command is given.
    pub interpreter: String,
    /// Package installer invoked as `<installer> install -r <manifest>`.
    pub installer: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            exec_timeout_secs: 10,
            install_timeout_secs: 60,
            output_limit_bytes: 100_000,
            interpreter: "python3".to_string(),
            installer: "pip".to_string(),
        }
    }
}

impl SandboxConfig {
    pub fn exec_timeout(&self) -> Duration {
        Duration::from_secs(self.exec_timeout_secs)
    }

    pub fn install_timeout(&self) -> Duration {
        Duration::from_secs(self.install_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CommitConfig {
    /// Prefix for studio commit messages and for the fallback message.
    pub studio_prefix: String,
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            studio_prefix: "[Studio]".to_string(),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        if self.completion.timeout_secs == 0 {
            return Err(anyhow!("completion.timeout_secs must be > 0"));
        }
        if self.hosting.timeout_secs == 0 {
            return Err(anyhow!("hosting.timeout_secs must be > 0"));
        }
        if self.gate.lint_timeout_secs == 0 {
            return Err(anyhow!("gate.lint_timeout_secs must be > 0"));
        }
        if self.sandbox.exec_timeout_secs == 0 || self.sandbox.install_timeout_secs == 0 {
            return Err(anyhow!("sandbox timeouts must be > 0"));
        }
        if self.gate.output_limit_bytes == 0 || self.sandbox.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.gate.lint_command.is_empty() || self.gate.lint_command[0].trim().is_empty() {
            return Err(anyhow!("gate.lint_command must be a non-empty array"));
        }
        if self.parser.allowed_extensions.is_empty() {
            return Err(anyhow!("parser.allowed_extensions must not be empty"));
        }
        if self.parser.manifest.trim().is_empty() {
            return Err(anyhow!("parser.manifest must not be empty"));
        }
        if self.parser.manifest == self.parser.manifest_addendum {
            return Err(anyhow!(
                "parser.manifest_addendum must differ from parser.manifest"
            ));
        }
        if self.git.remote.trim().is_empty() || self.git.base_branch.trim().is_empty() {
            return Err(anyhow!("git.remote and git.base_branch must not be empty"));
        }
        Ok(())
    }

    /// Overlay environment settings. The first non-empty variable of each
    /// group wins.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |names: &[&str]| {
            names
                .iter()
                .filter_map(|&name| lookup(name))
                .map(|value| value.trim().to_string())
                .find(|value| !value.is_empty())
        };

        if let Some(endpoint) = first(&["AZURE_OPENAI_ENDPOINT", "OPENAI_ENDPOINT"]) {
            self.completion.endpoint = Some(endpoint);
        }
        if let Some(key) = first(&["AZURE_OPENAI_API_KEY", "OPENAI_KEY"]) {
            self.completion.api_key = Some(key);
        }
        if let Some(model) = first(&["OPENAI_MODEL"]) {
            self.completion.deployment = model;
        }
        if let Some(version) = first(&["OPENAI_API_VERSION"]) {
            self.completion.api_version = version;
        }
        if let Some(token) = first(&["GITHUB_TOKEN"]) {
            self.hosting.token = Some(token);
        }
        if let Some(org) = first(&["GITHUB_ORG"]) {
            self.hosting.organization = Some(org);
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AppConfig::default()`.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "config file missing, using defaults");
        let cfg = AppConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AppConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Load the file (or defaults), overlay the process environment, validate.
pub fn load_startup_config(path: Option<&Path>) -> Result<AppConfig> {
    let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
    let mut cfg = load_config(path)?;
    cfg.apply_env(|name| std::env::var(name).ok());
    cfg.validate()?;
    Ok(cfg)
}
