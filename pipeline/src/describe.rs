//! PRDescriptionSynthesizer: title and body from the ledger or a diff.

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::core::ledger::ChangeLedger;
use crate::core::message::first_line;
use crate::core::types::DiffRecord;
use crate::diff::combined_patch;
use crate::error::{PipelineError, Result};
use crate::io::completion::{CompletionRequest, CompletionService, DESCRIPTION_SAMPLING};
use crate::io::prompt::{DescribeInputs, FileLine, PromptEngine};

/// Diff text beyond this many bytes is cut before it is sent.
pub const MAX_DIFF_BYTES: usize = 60_000;

/// What the description is synthesized from.
#[derive(Debug, Clone, Copy)]
pub enum DescriptionSource<'a> {
    /// Accepted changes, in acceptance order.
    Ledger(&'a ChangeLedger),
    /// Full patch between two refs.
    Diff {
        base: &'a str,
        head: &'a str,
        records: &'a [DiffRecord],
    },
    /// Changed paths and their classification only.
    Files(&'a [DiffRecord]),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrDescription {
    /// First line of the body.
    pub title: String,
    pub body: String,
}

impl PrDescription {
    pub fn from_body(body: impl Into<String>) -> Self {
        let body = body.into().trim().to_string();
        let title = first_line(&body).unwrap_or_default().to_string();
        Self { title, body }
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

pub struct PrDescriptionSynthesizer<'a, C: CompletionService + ?Sized> {
    completion: &'a C,
    prompts: &'a PromptEngine,
}

impl<'a, C: CompletionService + ?Sized> PrDescriptionSynthesizer<'a, C> {
    pub fn new(completion: &'a C, prompts: &'a PromptEngine) -> Self {
        Self {
            completion,
            prompts,
        }
    }

    /// One completion call. An empty reply is logged and returned as an empty
    /// description rather than an error.
    #[instrument(skip_all)]
    pub fn synthesize(
        &self,
        request: &str,
        notes: Option<&str>,
        source: DescriptionSource<'_>,
    ) -> Result<PrDescription> {
        let diff_text;
        let mut input = DescribeInputs {
            request,
            notes,
            ..DescribeInputs::default()
        };
        match source {
            DescriptionSource::Ledger(ledger) => input.changes = ledger.summary_lines(),
            DescriptionSource::Diff {
                base,
                head,
                records,
            } => {
                diff_text = truncate_bytes(&combined_patch(records), MAX_DIFF_BYTES);
                input.diff = Some(diff_text.as_str());
                input.base = base;
                input.head = head;
            }
            DescriptionSource::Files(records) => input.files = file_lines(records),
        }

        let prompt = self
            .prompts
            .render_describe(&input)
            .map_err(PipelineError::completion)?;
        let body = self
            .completion
            .complete(&CompletionRequest::new(
                self.prompts.describe_system(),
                prompt,
                DESCRIPTION_SAMPLING,
            ))
            .map_err(PipelineError::completion)?;

        let description = PrDescription::from_body(body);
        if description.is_empty() {
            warn!("description service returned no text");
        } else {
            info!(title = %description.title, "description synthesized");
        }
        Ok(description)
    }
}

fn file_lines(records: &[DiffRecord]) -> Vec<FileLine> {
    records
        .iter()
        .map(|record| FileLine {
            path: record.path.clone(),
            status: record.change_type.as_str().to_string(),
        })
        .collect()
}

fn truncate_bytes(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!(
        "{}\n[diff truncated {} bytes]",
        &text[..end],
        text.len() - end
    )
}
