//! FTS5 query building for card search.

use regex::Regex;
use std::sync::LazyLock;

/// Characters FTS5 treats as syntax or token separators inside a bare term.
static FTS5_SPECIAL_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[-._"':*()^+,;/\\]"#).unwrap());

/// Quote a term when it contains characters FTS5 would interpret.
pub fn escape_fts5_term(term: &str) -> String {
    if FTS5_SPECIAL_CHARS.is_match(term) {
        format!("\"{}\"", term.replace('"', "\"\""))
    } else {
        term.to_string()
    }
}

/// Build an FTS5 match expression from free text.
///
/// Every whitespace-separated term must match (implicit AND), each as a
/// prefix:
/// - "elf princess" → `elf* princess*`
/// - "sci-fi" → `"sci-fi"*`
pub fn build_fts5_query(search_term: &str) -> String {
    search_term
        .to_lowercase()
        .split_whitespace()
        .filter(|term| term.chars().any(char::is_alphanumeric))
        .map(|term| format!("{}*", escape_fts5_term(term)))
        .collect::<Vec<_>>()
        .join(" ")
}
