//! Commit message and pull request title derivation.

/// First non-empty line of `body`, trimmed.
pub fn first_line(body: &str) -> Option<&str> {
    body.lines().map(str::trim).find(|line| !line.is_empty())
}

/// Commit message: the first line of the synthesized body when there is
/// one, otherwise `<prefix> <title>`.
pub fn commit_message(body: Option<&str>, title: &str, prefix: &str) -> String {
    match body.and_then(first_line) {
        Some(line) => line.to_string(),
        None => fallback_message(title, prefix),
    }
}

/// `<prefix> <title>` with the separator dropped when either side is empty.
pub fn fallback_message(title: &str, prefix: &str) -> String {
    let (title, prefix) = (title.trim(), prefix.trim());
    match (prefix.is_empty(), title.is_empty()) {
        (true, _) => title.to_string(),
        (false, true) => prefix.to_string(),
        (false, false) => format!("{prefix} {title}"),
    }
}
