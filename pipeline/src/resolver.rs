//! TargetFileResolver: asks the completion service which files a request concerns.

use tracing::{debug, info, instrument};

use crate::error::{PipelineError, Result};
use crate::io::completion::{CompletionRequest, CompletionService, RESOLVER_SAMPLING};
use crate::io::prompt::{ASSISTANT_SYSTEM, PromptEngine};

pub struct TargetFileResolver<'a, C: CompletionService + ?Sized> {
    completion: &'a C,
    prompts: &'a PromptEngine,
}

impl<'a, C: CompletionService + ?Sized> TargetFileResolver<'a, C> {
    pub fn new(completion: &'a C, prompts: &'a PromptEngine) -> Self {
        Self {
            completion,
            prompts,
        }
    }

    /// Single round trip. The answer is opaque text and is passed through
    /// unchanged, even when empty.
    #[instrument(skip_all, fields(file_count = files.len()))]
    pub fn resolve(&self, request: &str, files: &[String]) -> Result<String> {
        let prompt = self
            .prompts
            .render_identify(request, files)
            .map_err(PipelineError::completion)?;
        let answer = self
            .completion
            .complete(&CompletionRequest::new(
                ASSISTANT_SYSTEM,
                prompt,
                RESOLVER_SAMPLING,
            ))
            .map_err(PipelineError::completion)?;
        let answer = answer.trim().to_string();
        info!(targets = %answer, "target files resolved");
        Ok(answer)
    }
}

/// Whether the resolver's free-text answer names `path`.
pub fn answer_mentions(answer: &str, path: &str) -> bool {
    let found = answer
        .split(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | '`' | '"' | '\''))
        .map(|token| token.trim_start_matches("./"))
        .any(|token| token == path);
    debug!(path, found, "checked resolver answer");
    found
}
