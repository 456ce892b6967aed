//! Contributor names from commit metadata.
//!
//! Co-authors come from `Co-authored-by: Name <email>` trailer lines. This is
//! a best-effort classifier: one trailer per line, case-insensitive, and a
//! malformed trailer is simply missed.

use std::sync::OnceLock;

use regex::Regex;

/// Substrings (lowercase) that mark a name as an automation account.
const BOT_MARKERS: &[&str] = &["bot", "github-actions"];

const NOREPLY_SUFFIX: &str = "@users.noreply.github.com";

fn coauthor_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?im)^[ \t]*Co-authored-by:[ \t]*([^<\n\r]+?)(?:[ \t]*<[^>\n\r]+>)?[ \t]*\r?$")
            .expect("regex is valid")
    })
}

/// Human co-author names from `message`, in order of appearance.
///
/// Names of two characters or fewer, bot accounts and names that still start
/// with the trailer keyword are dropped. Duplicates within one message are
/// kept; callers deduplicate across history.
pub fn extract_coauthors(message: &str) -> Vec<String> {
    coauthor_regex()
        .captures_iter(message)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|name| is_human_name(name))
        .collect()
}

fn is_human_name(name: &str) -> bool {
    if name.chars().count() <= 2 {
        return false;
    }
    let lower = name.to_lowercase();
    if lower.starts_with("co-authored-by") {
        return false;
    }
    !BOT_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// GitHub username encoded in a noreply address.
///
/// Handles both `user@users.noreply.github.com` and
/// `12345+user@users.noreply.github.com`.
pub fn github_username_from_email(email: &str) -> Option<&str> {
    let local = email.strip_suffix(NOREPLY_SUFFIX)?;
    let username = local.rsplit('+').next().unwrap_or(local);
    (!username.is_empty()).then_some(username)
}

/// Label for a committer: `username (Full Name)` when the email reveals a
/// GitHub username different from the name, else the name alone.
pub fn contributor_display_name(name: &str, email: &str) -> String {
    match github_username_from_email(email) {
        Some(username) if username != name => format!("{username} ({name})"),
        _ => name.to_string(),
    }
}

/// Committer name behind a label built by [`contributor_display_name`]:
/// the part in the trailing parentheses, or the whole label.
pub fn contributor_name_from_label(label: &str) -> &str {
    label
        .strip_suffix(')')
        .and_then(|rest| rest.rsplit_once(" ("))
        .map(|(_, name)| name)
        .filter(|name| !name.is_empty())
        .unwrap_or(label)
}
