//! Repository working-copy helpers: acquisition, listing and file writes.

use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument};
use walkdir::WalkDir;

use crate::core::locator::repo_name_from_reference;
use crate::io::git::Git;

/// True for references that must be cloned rather than opened in place.
pub fn is_remote_reference(reference: &str) -> bool {
    let reference = reference.trim();
    reference.contains("://") || reference.starts_with("git@")
}

/// Where the working copy for `reference` lives, without touching it.
///
/// Local paths map to themselves; remote references map to
/// `<data_dir>/<name>`.
pub fn working_copy_path(reference: &str, data_dir: &Path) -> Result<PathBuf> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(anyhow!("repository reference is empty"));
    }
    if !is_remote_reference(reference) {
        return Ok(PathBuf::from(reference));
    }
    let name = repo_name_from_reference(reference)
        .ok_or_else(|| anyhow!("cannot derive repository name from '{reference}'"))?;
    Ok(data_dir.join(name))
}

/// Resolve a repository reference to a local working copy.
///
/// Existing local paths are used as-is. Remote references are cloned into
/// `<data_dir>/<name>` unless that directory already exists.
#[instrument(skip_all, fields(%reference))]
pub fn acquire_repository(reference: &str, data_dir: &Path) -> Result<PathBuf> {
    let path = working_copy_path(reference, data_dir)?;
    if !is_remote_reference(reference) {
        if path.is_dir() {
            debug!("using local working copy");
            return Ok(path);
        }
        return Err(anyhow!("repository path {} does not exist", path.display()));
    }
    ensure_working_copy(&path, reference.trim())?;
    Ok(path)
}

/// Clone `url` into `path` when `path` does not exist yet.
pub fn ensure_working_copy(path: &Path, url: &str) -> Result<()> {
    if path.exists() {
        debug!(path = %path.display(), "working copy already present");
        return Ok(());
    }
    info!(path = %path.display(), "cloning working copy");
    Git::clone_into(url, path).with_context(|| format!("clone into {}", path.display()))?;
    Ok(())
}

/// Repository-relative file paths (forward slashes), excluding `.git`, sorted.
pub fn list_files(root: &Path) -> Result<Vec<String>> {
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || entry.file_name() != ".git");
    for entry in walker {
        let entry = entry.with_context(|| format!("walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .with_context(|| format!("strip prefix {}", root.display()))?;
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        files.push(parts.join("/"));
    }
    files.sort();
    Ok(files)
}

/// Validate a repository-relative path: not empty, not absolute, no `..`,
/// and not inside `.git`.
pub fn safe_relative_path(path: &str) -> Option<PathBuf> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return None;
    }
    let candidate = Path::new(trimmed);
    let mut out = PathBuf::new();
    for component in candidate.components() {
        match component {
            Component::Normal(part) => {
                if out.as_os_str().is_empty() && part == ".git" {
                    return None;
                }
                out.push(part);
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    (!out.as_os_str().is_empty()).then_some(out)
}

/// Write `content` to `root/rel`, creating parent directories.
pub fn write_file(root: &Path, rel: &Path, content: &str) -> Result<()> {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(&path, content).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}
