//! DiffCollector: patch set between two refs.

use tracing::{debug, instrument};

use crate::core::types::DiffRecord;
use crate::error::{PipelineError, Result};
use crate::io::git::Git;

pub struct DiffCollector<'a> {
    git: &'a Git,
}

impl<'a> DiffCollector<'a> {
    pub fn new(git: &'a Git) -> Self {
        Self { git }
    }

    /// One record per changed path, classified by git. Patch bytes that are
    /// not valid UTF-8 are replaced, never rejected.
    #[instrument(skip_all, fields(%base, %head))]
    pub fn collect(&self, base: &str, head: &str) -> Result<Vec<DiffRecord>> {
        let entries = self
            .git
            .diff_name_status(base, head)
            .map_err(PipelineError::branch_operation)?;
        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            let mut paths: Vec<&str> = Vec::with_capacity(2);
            if let Some(old) = entry.old_path.as_deref() {
                paths.push(old);
            }
            paths.push(&entry.path);
            let patch = self
                .git
                .diff_patch(base, head, &paths)
                .map_err(PipelineError::branch_operation)?;
            records.push(DiffRecord {
                path: entry.path.clone(),
                old_path: entry.old_path.clone(),
                change_type: entry.change_type,
                patch: String::from_utf8_lossy(&patch).into_owned(),
            });
        }
        debug!(files = records.len(), "diff collected");
        Ok(records)
    }
}

/// Concatenated patch text of all records.
pub fn combined_patch(records: &[DiffRecord]) -> String {
    records.iter().map(|record| record.patch.as_str()).collect()
}
