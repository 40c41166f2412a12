//! In-memory record of accepted file changes for one run.

use serde::Serialize;

use crate::core::types::ChangeDescriptor;

/// Ordered `path -> description` map scoped to a single run.
///
/// Keys are unique. Re-recording a path replaces its description in place,
/// so acceptance order is preserved for commit and PR message synthesis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ChangeLedger {
    entries: Vec<ChangeDescriptor>,
}

impl ChangeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an accepted change. Returns `true` if the path was new.
    pub fn record(&mut self, path: impl Into<String>, description: impl Into<String>) -> bool {
        let path = path.into();
        let description = description.into();
        match self.entries.iter_mut().find(|entry| entry.path == path) {
            Some(existing) => {
                existing.description = description;
                false
            }
            None => {
                self.entries.push(ChangeDescriptor { path, description });
                true
            }
        }
    }

    pub fn entries(&self) -> &[ChangeDescriptor] {
        &self.entries
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.path.as_str())
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.iter().any(|entry| entry.path == path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `path: description` lines in acceptance order.
    pub fn summary_lines(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|entry| format!("{}: {}", entry.path, entry.description))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_acceptance_order() {
        let mut ledger = ChangeLedger::new();
        ledger.record("b.py", "second file");
        ledger.record("a.py", "first file");
        assert_eq!(
            ledger.summary_lines(),
            vec!["b.py: second file".to_string(), "a.py: first file".to_string()]
        );
    }

    #[test]
    fn re_recording_overwrites_without_duplicating() {
        let mut ledger = ChangeLedger::new();
        assert!(ledger.record("a.py", "old"));
        ledger.record("b.py", "other");
        assert!(!ledger.record("a.py", "new"));

        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.entries()[0].description, "new");
        assert_eq!(ledger.paths().collect::<Vec<_>>(), vec!["a.py", "b.py"]);
    }

    #[test]
    fn serializes_as_list_of_rows() {
        let mut ledger = ChangeLedger::new();
        ledger.record("a.py", "why");
        let json = serde_json::to_string(&ledger).expect("serialize");
        assert_eq!(json, r#"[{"path":"a.py","description":"why"}]"#);
    }
}
