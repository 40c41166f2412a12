//! Prompt rendering for the completion-service calls.
//!
//! Templates are compiled into the binary and rendered with minijinja.

use anyhow::Result;
use minijinja::{Environment, context};
use serde::Serialize;

const IDENTIFY_TEMPLATE: &str = include_str!("prompts/identify.md");
const GENERATE_TEMPLATE: &str = include_str!("prompts/generate.md");
const DESCRIBE_TEMPLATE: &str = include_str!("prompts/describe.md");
const DESCRIBE_SYSTEM: &str = include_str!("prompts/describe_system.md");

/// System message for the resolver and generator calls.
pub const ASSISTANT_SYSTEM: &str = "You are a helpful assistant.";

/// One changed file as listed in a description prompt.
#[derive(Debug, Clone, Serialize)]
pub struct FileLine {
    pub path: String,
    pub status: String,
}

/// Inputs for the pull request description prompt.
#[derive(Debug, Clone, Default)]
pub struct DescribeInputs<'a> {
    pub request: &'a str,
    pub notes: Option<&'a str>,
    /// Ledger summary lines (`path: description`).
    pub changes: Vec<String>,
    pub files: Vec<FileLine>,
    pub diff: Option<&'a str>,
    pub base: &'a str,
    pub head: &'a str,
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("identify", IDENTIFY_TEMPLATE)
            .expect("identify template should be valid");
        env.add_template("generate", GENERATE_TEMPLATE)
            .expect("generate template should be valid");
        env.add_template("describe", DESCRIBE_TEMPLATE)
            .expect("describe template should be valid");
        Self { env }
    }

    pub fn describe_system(&self) -> &'static str {
        DESCRIBE_SYSTEM.trim()
    }

    pub fn render_identify(&self, request: &str, files: &[String]) -> Result<String> {
        let template = self.env.get_template("identify")?;
        Ok(template.render(context! {
            request => request.trim(),
            files => files,
        })?)
    }

    pub fn render_generate(
        &self,
        request: &str,
        targets: &str,
        manifest: &str,
        manifest_addendum: &str,
    ) -> Result<String> {
        let template = self.env.get_template("generate")?;
        Ok(template.render(context! {
            request => request.trim(),
            targets => targets.trim(),
            manifest => manifest,
            manifest_addendum => manifest_addendum,
        })?)
    }

    pub fn render_describe(&self, input: &DescribeInputs<'_>) -> Result<String> {
        let template = self.env.get_template("describe")?;
        Ok(template.render(context! {
            request => input.request.trim(),
            notes => input.notes.map(str::trim).filter(|s| !s.is_empty()),
            changes => &input.changes,
            files => &input.files,
            diff => input.diff.map(str::trim).filter(|s| !s.is_empty()),
            base => input.base,
            head => input.head,
        })?)
    }
}
