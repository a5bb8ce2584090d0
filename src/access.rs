use std::collections::HashSet;

/// Splits a comma-separated allow-list into trimmed, lowercased, non-empty
/// entries.
pub fn parse_admin_allow_list(raw: &str) -> HashSet<String> {
    raw.split(',')
        .map(|email| email.trim().to_lowercase())
        .filter(|email| !email.is_empty())
        .collect()
}

/// Fail-closed admin check.
///
/// A missing or empty email, or an empty allow-list, grants nothing.
/// Otherwise the email matches case-insensitively. `allow_list` must hold
/// lowercased entries, as produced by [`parse_admin_allow_list`].
pub fn is_authorized_admin(email: Option<&str>, allow_list: &HashSet<String>) -> bool {
    let Some(email) = email.filter(|e| !e.is_empty()) else {
        return false;
    };
    if allow_list.is_empty() {
        return false;
    }
    allow_list.contains(&email.to_lowercase())
}
