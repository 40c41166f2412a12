//! Parser for the plan + multi-file code response grammar.
//!
//! ```text
//! ---
//! Plan:
//! <free text>
//! ---
//! Code:
//! # relative/path/one
//! <content>
//! # relative/path/two
//! <content>
//! ---
//! ```
//!
//! Parsing never fails. Responses that do not follow the grammar are
//! flagged with a [`ParseAmbiguity`] and parsed as far as possible.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::types::FileArtifact;

const SECTION_SEPARATOR: &str = "---";
const PLAN_HEADER: &str = "Plan:";
const CODE_HEADER: &str = "Code:";

/// A file boundary is `# ` followed by a path with no embedded whitespace.
static FILE_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^# (\S+)$").expect("file boundary pattern is valid"));

/// Ways a response can deviate from the expected grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseAmbiguity {
    /// No `---` separators; the whole response was treated as code.
    NoSections,
    /// Separators present but no section starts with `Code:`.
    MissingCodeSection,
    /// Code section contained no `# <path>` boundary.
    NoFileBoundaries,
}

/// Structured view of a generation response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedResponse {
    pub plan: Option<String>,
    /// File blocks in declaration order; duplicates keep the later content.
    pub files: Vec<FileArtifact>,
    pub ambiguity: Option<ParseAmbiguity>,
}

/// Eligible artifacts split from the ones dropped by extension.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Eligibility {
    pub eligible: Vec<FileArtifact>,
    pub discarded: Vec<String>,
}

impl ParsedResponse {
    /// Keep only artifacts whose path ends in an allow-listed extension.
    pub fn eligible(&self, allowed_extensions: &[String]) -> Eligibility {
        let mut out = Eligibility::default();
        for file in &self.files {
            if file.has_extension_in(allowed_extensions) {
                out.eligible.push(file.clone());
            } else {
                out.discarded.push(file.path.clone());
            }
        }
        out
    }
}

/// Parse a generation response into plan text and file artifacts.
pub fn parse_response(response: &str) -> ParsedResponse {
    let normalized = response.replace("\r\n", "\n");
    let text = normalized.trim();

    let (plan, code, mut ambiguity) = if text.contains(SECTION_SEPARATOR) {
        let mut plan = None;
        let mut code = None;
        for part in text.split(SECTION_SEPARATOR) {
            let part = part.trim();
            if let Some(rest) = part.strip_prefix(PLAN_HEADER) {
                plan = Some(rest.trim().to_string());
            }
            if let Some(rest) = part.strip_prefix(CODE_HEADER) {
                code = Some(rest.trim().to_string());
            }
        }
        let ambiguity = code.is_none().then_some(ParseAmbiguity::MissingCodeSection);
        (plan, code, ambiguity)
    } else {
        (None, Some(text.to_string()), Some(ParseAmbiguity::NoSections))
    };

    let files = code.as_deref().map(split_file_blocks).unwrap_or_default();
    if files.is_empty() && ambiguity.is_none() {
        ambiguity = Some(ParseAmbiguity::NoFileBoundaries);
    }

    ParsedResponse {
        plan,
        files,
        ambiguity,
    }
}

/// Split a code section on `# <path>` lines.
///
/// Text before the first boundary is dropped. A repeated path replaces the
/// earlier content but keeps the earlier position.
fn split_file_blocks(code: &str) -> Vec<FileArtifact> {
    let boundaries: Vec<_> = FILE_BOUNDARY.captures_iter(code).collect();
    let mut files: Vec<FileArtifact> = Vec::with_capacity(boundaries.len());

    for (i, caps) in boundaries.iter().enumerate() {
        let (Some(line), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let end = boundaries
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map(|next| next.start())
            .unwrap_or(code.len());
        let path = name.as_str().trim();
        let content = code[line.end()..end].trim();

        match files.iter_mut().find(|file| file.path == path) {
            Some(existing) => existing.content = content.to_string(),
            None => files.push(FileArtifact::generated(path, content)),
        }
    }

    files
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(parsed: &ParsedResponse) -> Vec<&str> {
        parsed.files.iter().map(|f| f.path.as_str()).collect()
    }

    #[test]
    fn parses_plan_and_two_files_in_order() {
        let response = concat!(
            "---\nPlan:\n1. add greet\n2. test it\n---\nCode:\n",
            "# utils.py\ndef greet(name):\n    return f\"hi {name}\"\n\n",
            "# tests/test_utils.py\nfrom utils import greet\n---\n",
        );
        let parsed = parse_response(response);

        assert_eq!(parsed.plan.as_deref(), Some("1. add greet\n2. test it"));
        assert_eq!(paths(&parsed), vec!["utils.py", "tests/test_utils.py"]);
        assert_eq!(
            parsed.files[0].content,
            "def greet(name):\n    return f\"hi {name}\""
        );
        assert_eq!(parsed.files[1].content, "from utils import greet");
        assert_eq!(parsed.ambiguity, None);
    }

    #[test]
    fn later_duplicate_block_wins() {
        let response = "---\nCode:\n# a.py\nfirst = 1\n# b.py\nb = 2\n# a.py\nsecond = 2\n---";
        let parsed = parse_response(response);

        assert_eq!(paths(&parsed), vec!["a.py", "b.py"]);
        assert_eq!(parsed.files[0].content, "second = 2");
    }

    #[test]
    fn boundary_detection_does_not_require_an_extension() {
        let response = "---\nCode:\n# Makefile\nall:\n\techo hi\n# docs/notes.md\nhello\n---";
        let parsed = parse_response(response);
        assert_eq!(paths(&parsed), vec!["Makefile", "docs/notes.md"]);
    }

    #[test]
    fn comment_with_spaces_is_not_a_boundary() {
        let response = "---\nCode:\n# app.py\n# compute the total\ntotal = 1\n---";
        let parsed = parse_response(response);
        assert_eq!(paths(&parsed), vec!["app.py"]);
        assert_eq!(parsed.files[0].content, "# compute the total\ntotal = 1");
    }

    #[test]
    fn response_without_separators_is_treated_as_code() {
        let parsed = parse_response("# utils.py\nx = 1\n");
        assert_eq!(parsed.plan, None);
        assert_eq!(paths(&parsed), vec!["utils.py"]);
        assert_eq!(parsed.ambiguity, Some(ParseAmbiguity::NoSections));
    }

    #[test]
    fn malformed_response_yields_no_artifacts() {
        let parsed = parse_response("Sure! You should add a greet function to utils.");
        assert!(parsed.files.is_empty());
        assert_eq!(parsed.ambiguity, Some(ParseAmbiguity::NoSections));
    }

    #[test]
    fn missing_code_section_is_flagged() {
        let parsed = parse_response("---\nPlan:\ndo things\n---");
        assert_eq!(parsed.plan.as_deref(), Some("do things"));
        assert!(parsed.files.is_empty());
        assert_eq!(parsed.ambiguity, Some(ParseAmbiguity::MissingCodeSection));
    }

    #[test]
    fn code_section_without_boundaries_is_flagged() {
        let parsed = parse_response("---\nCode:\nprint('hi')\n---");
        assert!(parsed.files.is_empty());
        assert_eq!(parsed.ambiguity, Some(ParseAmbiguity::NoFileBoundaries));
    }

    #[test]
    fn crlf_line_endings_are_normalized() {
        let parsed = parse_response("---\r\nCode:\r\n# a.py\r\nx = 1\r\n---\r\n");
        assert_eq!(paths(&parsed), vec!["a.py"]);
        assert_eq!(parsed.files[0].content, "x = 1");
    }

    #[test]
    fn eligibility_discards_unlisted_extensions() {
        let response =
            "---\nCode:\n# a.py\nx = 1\n# b.js\nlet y;\n# requirements-new.txt\nrequests\n---";
        let parsed = parse_response(response);
        let split = parsed.eligible(&["py".to_string(), "txt".to_string()]);

        let eligible: Vec<&str> = split.eligible.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(eligible, vec!["a.py", "requirements-new.txt"]);
        assert_eq!(split.discarded, vec!["b.js".to_string()]);
    }
}
