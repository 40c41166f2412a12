//! ChangeGenerator: requests a plan and multi-file change, then parses it.

use std::fs;
use std::path::Path;

use tracing::{debug, info, instrument, warn};

use crate::core::manifest::fold_manifest;
use crate::core::parser::{ParsedResponse, parse_response};
use crate::core::types::FileArtifact;
use crate::error::{PipelineError, Result};
use crate::io::completion::{CompletionRequest, CompletionService, GENERATOR_SAMPLING};
use crate::io::config::ParserConfig;
use crate::io::prompt::{ASSISTANT_SYSTEM, PromptEngine};

pub struct ChangeGenerator<'a, C: CompletionService + ?Sized> {
    completion: &'a C,
    prompts: &'a PromptEngine,
    cfg: &'a ParserConfig,
}

/// Artifacts that will go through the gate, plus paths dropped by the
/// extension allow-list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EligibleSet {
    pub artifacts: Vec<FileArtifact>,
    pub discarded: Vec<String>,
}

impl<'a, C: CompletionService + ?Sized> ChangeGenerator<'a, C> {
    pub fn new(completion: &'a C, prompts: &'a PromptEngine, cfg: &'a ParserConfig) -> Self {
        Self {
            completion,
            prompts,
            cfg,
        }
    }

    /// One completion call; the response is parsed, never rejected.
    #[instrument(skip_all)]
    pub fn generate(&self, request: &str, targets: &str) -> Result<ParsedResponse> {
        let prompt = self
            .prompts
            .render_generate(
                request,
                targets,
                &self.cfg.manifest,
                &self.cfg.manifest_addendum,
            )
            .map_err(PipelineError::completion)?;
        let response = self
            .completion
            .complete(&CompletionRequest::new(
                ASSISTANT_SYSTEM,
                prompt,
                GENERATOR_SAMPLING,
            ))
            .map_err(PipelineError::completion)?;

        let parsed = parse_response(&response);
        if let Some(ambiguity) = parsed.ambiguity {
            warn!(?ambiguity, "generation response did not follow the grammar");
        }
        info!(
            files = parsed.files.len(),
            has_plan = parsed.plan.is_some(),
            "generation response parsed"
        );
        Ok(parsed)
    }

    /// Apply the extension allow-list and fold manifest artifacts into one
    /// merged primary manifest read from `root`.
    pub fn eligible_artifacts(&self, parsed: &ParsedResponse, root: &Path) -> Result<EligibleSet> {
        let eligibility = parsed.eligible(&self.cfg.allowed_extensions);
        for path in &eligibility.discarded {
            debug!(path = %path, "artifact extension not allowed, discarded");
        }
        let manifest_path = root.join(&self.cfg.manifest);
        let existing = if manifest_path.is_file() {
            fs::read_to_string(&manifest_path)?
        } else {
            String::new()
        };
        let artifacts = fold_manifest(
            eligibility.eligible,
            &existing,
            &self.cfg.manifest,
            &self.cfg.manifest_addendum,
        );
        Ok(EligibleSet {
            artifacts,
            discarded: eligibility.discarded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parser::ParseAmbiguity;
    use crate::core::types::Provenance;
    use crate::test_support::ScriptedCompletion;

    const RESPONSE: &str = concat!(
        "---\nPlan:\nAdd greet.\n---\nCode:\n",
        "# utils.py\ndef greet(name):\n    return f\"hi {name}\"\n",
        "# notes.md\nignored\n",
        "# requirements-new.txt\nrequests\n---",
    );

    #[test]
    fn generate_parses_plan_and_files() {
        let completion = ScriptedCompletion::new([RESPONSE]);
        let prompts = PromptEngine::new();
        let cfg = ParserConfig::default();
        let generator = ChangeGenerator::new(&completion, &prompts, &cfg);
        let parsed = generator.generate("add greet", "utils.py").expect("generate");
        assert_eq!(parsed.plan.as_deref(), Some("Add greet."));
        assert_eq!(parsed.files.len(), 3);
        assert_eq!(completion.requests()[0].max_tokens, 1200);
    }

    #[test]
    fn eligible_artifacts_filter_and_merge_manifest() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("requirements.txt"), "flask\n").expect("write");
        let completion = ScriptedCompletion::new([RESPONSE]);
        let prompts = PromptEngine::new();
        let cfg = ParserConfig::default();
        let generator = ChangeGenerator::new(&completion, &prompts, &cfg);
        let parsed = generator.generate("add greet", "utils.py").expect("generate");

        let set = generator
            .eligible_artifacts(&parsed, temp.path())
            .expect("eligible");
        assert_eq!(set.discarded, vec!["notes.md".to_string()]);
        let paths: Vec<&str> = set.artifacts.iter().map(|a| a.path.as_str()).collect();
        assert_eq!(paths, vec!["utils.py", "requirements.txt"]);
        assert_eq!(set.artifacts[1].provenance, Provenance::ManifestMerge);
        assert_eq!(set.artifacts[1].content, "flask\nrequests\n");
    }

    #[test]
    fn unstructured_response_yields_no_artifacts() {
        let completion = ScriptedCompletion::new(["def greet():\n    pass\n"]);
        let prompts = PromptEngine::new();
        let cfg = ParserConfig::default();
        let generator = ChangeGenerator::new(&completion, &prompts, &cfg);
        let parsed = generator.generate("x", "").expect("generate");
        assert!(parsed.files.is_empty());
        assert_eq!(parsed.ambiguity, Some(ParseAmbiguity::NoSections));
    }
}
