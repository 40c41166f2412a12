//! Deterministic branch naming.
//!
//! `feature/<requester>/<slug>` for the interactive flow and
//! `feature/<requester>/<timestamp>` for the studio flow.

use chrono::NaiveDateTime;

pub const BRANCH_PREFIX: &str = "feature";
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Lowercase `text` and replace whitespace with hyphens.
///
/// Characters git refuses in ref names are also replaced with hyphens, and
/// leading/trailing hyphens and dots are trimmed.
pub fn slugify(text: &str) -> String {
    let mapped: String = text
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_whitespace() || is_ref_unsafe(c) {
                '-'
            } else {
                c
            }
        })
        .collect();
    let mut slug = mapped.trim_matches(|c| c == '-' || c == '.').to_string();
    while slug.contains("..") {
        slug = slug.replace("..", ".");
    }
    slug
}

fn is_ref_unsafe(c: char) -> bool {
    c.is_control() || matches!(c, '~' | '^' | ':' | '?' | '*' | '[' | '\\' | '/' | '@' | '{')
}

/// Branch name for the interactive flow. Same inputs, same name.
pub fn slug_branch_name(requester: &str, descriptive_name: &str) -> String {
    format!(
        "{BRANCH_PREFIX}/{}/{}",
        slugify(requester),
        slugify(descriptive_name)
    )
}

/// Branch name for the studio flow.
pub fn timestamp_branch_name(requester: &str, at: NaiveDateTime) -> String {
    format!(
        "{BRANCH_PREFIX}/{}/{}",
        slugify(requester),
        at.format(TIMESTAMP_FORMAT)
    )
}

/// True when some `/`-separated segment is empty, e.g. a name whose slug
/// normalized to nothing.
pub fn has_empty_segment(name: &str) -> bool {
    name.split('/').any(str::is_empty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn slug_branch_lowercases_and_hyphenates() {
        assert_eq!(
            slug_branch_name("Alice", "Add greet function"),
            "feature/alice/add-greet-function"
        );
    }

    #[test]
    fn slug_branch_is_a_pure_function() {
        let first = slug_branch_name("bob", "Fix Parser Bug");
        let second = slug_branch_name("bob", "Fix Parser Bug");
        assert_eq!(first, second);
    }

    #[test]
    fn slugify_replaces_ref_unsafe_characters() {
        assert_eq!(slugify("fix: a/b ~c"), "fix--a-b--c");
        assert_eq!(slugify("  .hidden.. "), "hidden");
    }

    #[test]
    fn timestamp_branch_uses_compact_timestamp() {
        let at = NaiveDate::from_ymd_opt(2025, 3, 9)
            .and_then(|d| d.and_hms_opt(14, 5, 7))
            .expect("valid datetime");
        assert_eq!(
            timestamp_branch_name("Carol", at),
            "feature/carol/20250309140507"
        );
    }

    #[test]
    fn empty_slug_leaves_an_empty_segment() {
        assert!(has_empty_segment(&slug_branch_name("alice", "  ..  ")));
        assert!(!has_empty_segment(&slug_branch_name("alice", "Add greet")));
    }
}
