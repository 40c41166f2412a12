//! Exclusive per-repository leases.
//!
//! A working copy is shared mutable state (checkout, writes, staging, push),
//! so every flow holds the lease for its repository path while it runs.
//! Runs against different paths proceed in parallel.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex, MutexGuard};

use tracing::debug;

/// Process-wide table of held repository leases.
#[derive(Debug, Default)]
pub struct RepoLeases {
    held: Mutex<HashSet<PathBuf>>,
    released: Condvar,
}

/// Held lease; released on drop.
#[derive(Debug)]
pub struct RepoLease<'a> {
    table: &'a RepoLeases,
    key: PathBuf,
}

impl RepoLeases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the lease for `path` is free, then take it.
    pub fn acquire(&self, path: &Path) -> RepoLease<'_> {
        let key = lease_key(path);
        let mut held = self.lock();
        while held.contains(&key) {
            debug!(path = %key.display(), "waiting for repository lease");
            held = self
                .released
                .wait(held)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        held.insert(key.clone());
        debug!(path = %key.display(), "repository lease acquired");
        RepoLease { table: self, key }
    }

    /// Take the lease only if nobody holds it.
    #[cfg(test)]
    fn try_acquire(&self, path: &Path) -> Option<RepoLease<'_>> {
        let key = lease_key(path);
        let mut held = self.lock();
        if !held.insert(key.clone()) {
            return None;
        }
        Some(RepoLease { table: self, key })
    }

    #[cfg(test)]
    fn is_held(&self, path: &Path) -> bool {
        self.lock().contains(&lease_key(path))
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        // The set stays consistent even if a holder panicked mid-run.
        self.held
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for RepoLease<'_> {
    fn drop(&mut self) {
        self.table.lock().remove(&self.key);
        self.table.released.notify_all();
        debug!(path = %self.key.display(), "repository lease released");
    }
}

/// Canonical form of `path`.
///
/// A path that does not exist yet is keyed by its deepest existing ancestor,
/// canonicalized, plus the remaining components, so the key does not change
/// once the working copy is created.
fn lease_key(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut existing = absolute.as_path();
    let mut missing = Vec::new();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            return missing
                .iter()
                .rev()
                .fold(canonical, |key, part| key.join(part));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return absolute,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn second_lease_on_same_path_waits_for_release() {
        let temp = tempfile::tempdir().expect("tempdir");
        let leases = RepoLeases::new();
        let lease = leases.acquire(temp.path());
        assert!(leases.try_acquire(temp.path()).is_none());
        drop(lease);
        assert!(leases.try_acquire(temp.path()).is_some());
    }

    #[test]
    fn equivalent_spellings_share_one_lease() {
        let temp = tempfile::tempdir().expect("tempdir");
        let leases = RepoLeases::new();
        let _lease = leases.acquire(temp.path());
        let dotted = temp.path().join(".");
        assert!(leases.is_held(&dotted));
    }

    #[cfg(unix)]
    #[test]
    fn key_survives_working_copy_creation_under_symlinked_root() {
        let temp = tempfile::tempdir().expect("tempdir");
        let real = temp.path().join("real");
        std::fs::create_dir(&real).expect("mkdir");
        let link = temp.path().join("data");
        std::os::unix::fs::symlink(&real, &link).expect("symlink");
        let repo = link.join("widgets");
        let leases = RepoLeases::new();

        let _lease = leases.acquire(&repo);
        std::fs::create_dir_all(&repo).expect("create working copy");

        assert!(leases.try_acquire(&repo).is_none());
        assert!(leases.try_acquire(&real.join("widgets")).is_none());
    }

    #[test]
    fn missing_nested_path_keys_under_existing_ancestor() {
        let temp = tempfile::tempdir().expect("tempdir");
        let canonical = temp.path().canonicalize().expect("canonicalize");
        assert_eq!(
            lease_key(&temp.path().join("a").join("b")),
            canonical.join("a").join("b")
        );
    }

    #[test]
    fn different_paths_do_not_contend() {
        let a = tempfile::tempdir().expect("tempdir");
        let b = tempfile::tempdir().expect("tempdir");
        let leases = RepoLeases::new();
        let _a = leases.acquire(a.path());
        assert!(leases.try_acquire(b.path()).is_some());
    }

    #[test]
    fn concurrent_holders_are_serialized() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().to_path_buf();
        let leases = Arc::new(RepoLeases::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let leases = Arc::clone(&leases);
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                let path = path.clone();
                thread::spawn(move || {
                    let _lease = leases.acquire(&path);
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(20));
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("join");
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }
}
