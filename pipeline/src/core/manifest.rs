//! Union of dependency manifest entries.

use crate::core::types::{FileArtifact, Provenance};

/// Merge `additions` into `existing`, one entry per non-empty line.
///
/// Existing entries keep their order; new entries are appended in the order
/// they appear. Duplicates (after trimming) are dropped. The result ends with
/// a newline.
pub fn union_entries(existing: &str, additions: &str) -> String {
    let mut merged: Vec<&str> = Vec::new();
    for line in existing.lines().chain(additions.lines()) {
        let entry = line.trim();
        if entry.is_empty() || merged.contains(&entry) {
            continue;
        }
        merged.push(entry);
    }
    let mut out = merged.join("\n");
    out.push('\n');
    out
}

/// Replace every artifact naming the primary manifest or its addendum with a
/// single merged manifest artifact, placed where the first of them was.
///
/// `existing` is the primary manifest currently on disk (empty if absent).
/// Artifacts are returned unchanged when none of them touch the manifest.
pub fn fold_manifest(
    files: Vec<FileArtifact>,
    existing: &str,
    manifest: &str,
    addendum: &str,
) -> Vec<FileArtifact> {
    let mut out = Vec::with_capacity(files.len());
    let mut additions = String::new();
    let mut slot = None;
    for file in files {
        if file.path == manifest || file.path == addendum {
            slot.get_or_insert(out.len());
            additions.push_str(&file.content);
            additions.push('\n');
        } else {
            out.push(file);
        }
    }
    if let Some(index) = slot {
        out.insert(
            index,
            FileArtifact {
                path: manifest.to_string(),
                content: union_entries(existing, &additions),
                provenance: Provenance::ManifestMerge,
            },
        );
    }
    out
}
