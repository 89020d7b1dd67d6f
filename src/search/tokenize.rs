//! Tokenization rules shared by keyword matching, exclusion, and BM25
//! (spec §4.3.3). Phrase matching deliberately bypasses this module: it is
//! plain case-insensitive substring search on raw content.

const PUNCTUATION: &[char] = &[
    ' ', '\t', '\n', '\r', '.', ',', ';', ':', '!', '?', '(', ')', '[', ']', '{', '}', '"', '\'',
    '`', '/', '\\', '-',
];

/// Lowercases and splits on Unicode whitespace plus the ASCII punctuation
/// set, discarding empty tokens. No stemming, no stop words.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| c.is_whitespace() || PUNCTUATION.contains(&c))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Normalizes a single query term (a `keywords`/`exclude_keywords` entry)
/// the same way as `tokenize`, taking the first resulting token. Entries
/// with internal whitespace collapse to their first word; callers wanting
/// multi-word matching should use `phrases` instead (see DESIGN.md).
pub fn normalize_term(term: &str) -> Option<String> {
    tokenize(term).into_iter().next()
}

/// Case-insensitive substring search, returning the byte offset of the
/// first match in `haystack` if any.
pub fn find_ci(haystack: &str, needle: &str) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    let haystack_lower = haystack.to_lowercase();
    let needle_lower = needle.to_lowercase();
    haystack_lower.find(&needle_lower)
}
