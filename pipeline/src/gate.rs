//! ValidationGate: the only path by which an artifact reaches disk and the ledger.
//!
//! Checks run in order: safe relative path, new-file policy, static analysis
//! (for configured extensions), write. Any failure rejects the whole artifact
//! and leaves both the file and the ledger untouched.

use std::path::Path;

use tracing::{debug, instrument, warn};

use crate::core::ledger::ChangeLedger;
use crate::core::types::{
    FileArtifact, NewFilePolicy, Provenance, RejectReason, ValidationFailure,
};
use crate::io::lint::{LintVerdict, Linter};
use crate::io::workspace::{safe_relative_path, write_file};

pub struct ValidationGate<'a, L: Linter + ?Sized> {
    root: &'a Path,
    linter: &'a L,
    policy: NewFilePolicy,
    lint_extensions: &'a [String],
}

impl<'a, L: Linter + ?Sized> ValidationGate<'a, L> {
    pub fn new(
        root: &'a Path,
        linter: &'a L,
        policy: NewFilePolicy,
        lint_extensions: &'a [String],
    ) -> Self {
        Self {
            root,
            linter,
            policy,
            lint_extensions,
        }
    }

    /// Validate, write, then record `artifact` in the ledger.
    #[instrument(skip_all, fields(path = %artifact.path))]
    pub fn admit(
        &self,
        artifact: &FileArtifact,
        description: &str,
        ledger: &mut ChangeLedger,
    ) -> Result<(), ValidationFailure> {
        let reject = |reason: RejectReason| {
            warn!(path = %artifact.path, ?reason, "artifact rejected");
            ValidationFailure {
                path: artifact.path.clone(),
                reason,
            }
        };

        let rel =
            safe_relative_path(&artifact.path).ok_or_else(|| reject(RejectReason::UnsafePath))?;

        let exists = self.root.join(&rel).is_file();
        let creation_allowed =
            self.policy == NewFilePolicy::Allow || artifact.provenance == Provenance::ManifestMerge;
        if !exists && !creation_allowed {
            return Err(reject(RejectReason::FileNotFound));
        }

        if artifact.has_extension_in(self.lint_extensions) {
            match self.linter.lint(&artifact.path, &artifact.content) {
                Ok(LintVerdict::Clean) => debug!("static analysis clean"),
                Ok(LintVerdict::Issues(report)) => {
                    return Err(reject(RejectReason::LintIssues(report)));
                }
                Err(err) => {
                    return Err(reject(RejectReason::LinterUnavailable(format!("{err:#}"))));
                }
            }
        }

        write_file(self.root, &rel, &artifact.content)
            .map_err(|err| reject(RejectReason::WriteFailed(format!("{err:#}"))))?;
        ledger.record(artifact.path.clone(), description);
        debug!(entries = ledger.len(), "artifact accepted");
        Ok(())
    }
}
