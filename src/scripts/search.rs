//! Name filtering for the script list

use std::sync::Arc;

use super::types::ScriptEntry;

/// Check if haystack contains needle (case-insensitive).
/// `needle_lower` must already be lowercase.
pub(crate) fn contains_ignore_case(haystack: &str, needle_lower: &str) -> bool {
    if needle_lower.is_empty() {
        return true;
    }
    if haystack.is_ascii() && needle_lower.is_ascii() {
        let h = haystack.as_bytes();
        let n = needle_lower.as_bytes();
        if n.len() > h.len() {
            return false;
        }
        return h
            .windows(n.len())
            .any(|window| window.iter().zip(n).all(|(a, b)| a.to_ascii_lowercase() == *b));
    }
    haystack.to_lowercase().contains(needle_lower)
}

/// Keep entries whose name contains `query`, ignoring case. Empty query keeps all.
pub fn filter_entries(entries: &[Arc<ScriptEntry>], query: &str) -> Vec<Arc<ScriptEntry>> {
    let query_lower = query.trim().to_lowercase();
    entries
        .iter()
        .filter(|entry| contains_ignore_case(&entry.name, &query_lower))
        .cloned()
        .collect()
}
