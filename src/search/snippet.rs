//! Snippet extraction (spec §4.3.4).

const SNIPPET_LEN: usize = 100;
const CONTEXT_BEFORE: usize = 20;

/// Builds the final snippet string for a search result: the extracted
/// window around the first match (or the clipped title, or the
/// unavailable-content fallback), plus the literal `" (+N more)"` suffix
/// when more than one message matched.
pub fn build(
    first_match: Option<(&str, usize)>,
    title: &str,
    title_only_match: bool,
    additional_matches: usize,
) -> String {
    let mut base = match first_match {
        Some((content, offset)) if !content.is_empty() => extract(content, offset),
        _ if title_only_match => clip_title(title),
        _ => "[Content unavailable]".to_string(),
    };
    if additional_matches > 0 {
        base.push_str(&format!(" (+{additional_matches} more)"));
    }
    base
}

/// Extracts ~100 characters of `content` around `match_offset` (a byte
/// offset), breaking on whitespace and appending `"..."` when the window
/// doesn't reach the end of the content.
fn extract(content: &str, match_offset: usize) -> String {
    if content.is_empty() {
        return "[Content unavailable]".to_string();
    }
    let start = floor_char_boundary(content, match_offset.saturating_sub(CONTEXT_BEFORE));
    let raw_end = floor_char_boundary(content, (start + SNIPPET_LEN).min(content.len()));
    let truncated = raw_end < content.len();

    let mut window = &content[start..raw_end];
    if truncated {
        if let Some(last_ws) = window.trim_end().rfind(char::is_whitespace) {
            if last_ws > 0 {
                window = &window[..last_ws];
            }
        }
    }
    let trimmed = window.trim();
    if trimmed.is_empty() {
        return "[Content unavailable]".to_string();
    }
    if truncated {
        format!("{trimmed}...")
    } else {
        trimmed.to_string()
    }
}

fn clip_title(title: &str) -> String {
    let end = floor_char_boundary(title, SNIPPET_LEN);
    if end >= title.len() {
        title.to_string()
    } else {
        format!("{}...", title[..end].trim_end())
    }
}

fn floor_char_boundary(s: &str, index: usize) -> usize {
    let index = index.min(s.len());
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_content_is_returned_whole() {
        let snippet = build(Some(("hello world", 0)), "title", false, 0);
        assert_eq!(snippet, "hello world");
    }

    #[test]
    fn long_content_is_truncated_with_ellipsis() {
        let content = "word ".repeat(40);
        let snippet = build(Some((content.as_str(), 0)), "title", false, 0);
        assert!(snippet.ends_with("..."));
        assert!(snippet.len() <= SNIPPET_LEN + 3);
    }

    #[test]
    fn additional_matches_suffix_is_literal() {
        let snippet = build(Some(("hello world", 0)), "title", false, 3);
        assert_eq!(snippet, "hello world (+3 more)");
    }

    #[test]
    fn title_only_match_clips_title() {
        let long_title = "a ".repeat(80);
        let snippet = build(None, &long_title, true, 0);
        assert!(snippet.ends_with("..."));
    }

    #[test]
    fn empty_content_falls_back_to_unavailable() {
        let snippet = build(Some(("", 0)), "title", false, 0);
        assert_eq!(snippet, "[Content unavailable]");
        let snippet = build(None, "title", false, 0);
        assert_eq!(snippet, "[Content unavailable]");
    }
}
