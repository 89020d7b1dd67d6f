//! The two-stage, two-pass search engine (spec §4.3).
//!
//! Pass one streams the file once, applying the cheap gates, the
//! phrase/keyword content match, and the exclusion filter, and for every
//! surviving candidate keeps only a lightweight statistics record (term
//! frequencies, snippet, matched message ids) — never the full
//! `Conversation`. Once every candidate has been scored, sorted, and
//! truncated to `limit`, pass two re-streams the file a second time to
//! recover the handful of `Conversation` values the caller actually gets
//! back.

pub mod bm25;
pub mod snippet;
pub mod tokenize;

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};

use crate::error::Error;
use crate::model::{Conversation, Message, Role};
use crate::provider::{ProviderAdapter, StreamOptions};

/// Whether all `keywords` must match (`All`) or just one (`Any`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    #[default]
    Any,
    All,
}

/// The field search results are ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortBy {
    #[default]
    Score,
    Date,
    Title,
    Messages,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl Default for SortOrder {
    fn default() -> Self {
        SortOrder::Desc
    }
}

/// A search request (spec §3.3). At least one of `keywords`, `phrases`, or
/// `title_filter` must be set; call [`SearchQuery::validate`] (done
/// automatically by [`search`]) to surface violations as `InvalidQuery`
/// before any streaming begins.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub keywords: Vec<String>,
    pub phrases: Vec<String>,
    pub match_mode: MatchMode,
    pub exclude_keywords: Vec<String>,
    pub role_filter: Option<Role>,
    pub title_filter: Option<String>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub min_messages: Option<usize>,
    pub max_messages: Option<usize>,
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
    pub limit: usize,
}

impl Default for SearchQuery {
    fn default() -> Self {
        SearchQuery {
            keywords: Vec::new(),
            phrases: Vec::new(),
            match_mode: MatchMode::default(),
            exclude_keywords: Vec::new(),
            role_filter: None,
            title_filter: None,
            from_date: None,
            to_date: None,
            min_messages: None,
            max_messages: None,
            sort_by: SortBy::default(),
            sort_order: SortOrder::default(),
            limit: 10,
        }
    }
}

impl SearchQuery {
    pub fn validate(&self) -> Result<(), Error> {
        if self.keywords.is_empty() && self.phrases.is_empty() && self.title_filter.is_none() {
            return Err(Error::InvalidQuery(
                "at least one of keywords, phrases, or title_filter is required".to_string(),
            ));
        }
        if let (Some(from), Some(to)) = (self.from_date, self.to_date) {
            if from > to {
                return Err(Error::InvalidQuery(
                    "from_date must be <= to_date".to_string(),
                ));
            }
        }
        if let (Some(min), Some(max)) = (self.min_messages, self.max_messages) {
            if min > max {
                return Err(Error::InvalidQuery(
                    "min_messages must be <= max_messages".to_string(),
                ));
            }
        }
        if self.limit == 0 {
            return Err(Error::InvalidQuery("limit must be >= 1".to_string()));
        }
        Ok(())
    }
}

/// A ranked hit (spec §3.4).
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub conversation: Conversation,
    pub score: f64,
    pub matched_message_ids: Vec<String>,
    pub snippet: String,
}

/// Per-candidate state carried between pass one and pass two — intentionally
/// everything *except* the full `Conversation`.
struct Candidate {
    id: String,
    title: String,
    updated_at_or_created: DateTime<Utc>,
    message_count: usize,
    source_order: usize,
    doc_stats: bm25::DocStats,
    matched_message_ids: Vec<String>,
    snippet: String,
    score: f64,
}

/// Runs `query` against every conversation `adapter` streams from `path`,
/// returning the final, sorted, `limit`-truncated result set.
///
/// `opts`'s `progress`/`on_skip` callbacks are wired to the first (scanning)
/// pass only — the second pass re-reads only the candidates already kept,
/// so reporting it too would double-count conversations the caller already
/// saw progress for during pass one.
pub fn search(
    adapter: ProviderAdapter,
    path: &Path,
    query: &SearchQuery,
    opts: StreamOptions<'_>,
) -> Result<Vec<SearchResult>, Error> {
    query.validate()?;

    let keyword_terms: Vec<String> = query
        .keywords
        .iter()
        .filter_map(|k| tokenize::normalize_term(k))
        .collect();
    let exclude_terms: Vec<String> = query
        .exclude_keywords
        .iter()
        .filter_map(|k| tokenize::normalize_term(k))
        .collect();

    let mut candidates = first_pass(adapter, path, query, &keyword_terms, &exclude_terms, opts)?;

    let doc_stats: Vec<bm25::DocStats> = candidates.iter().map(|c| c.doc_stats.clone()).collect();
    let scores = bm25::score_all(&doc_stats, &keyword_terms);
    for (candidate, score) in candidates.iter_mut().zip(scores) {
        candidate.score = score;
    }

    sort_candidates(&mut candidates, query);
    candidates.truncate(query.limit);

    second_pass(adapter, path, candidates)
}

fn first_pass(
    adapter: ProviderAdapter,
    path: &Path,
    query: &SearchQuery,
    keyword_terms: &[String],
    exclude_terms: &[String],
    opts: StreamOptions<'_>,
) -> Result<Vec<Candidate>, Error> {
    let mut candidates = Vec::new();
    let mut source_order = 0usize;

    for conversation in adapter.stream(path, opts)? {
        let conversation = conversation?;
        let order = source_order;
        source_order += 1;

        if !passes_cheap_gates(&conversation, query) {
            continue;
        }

        let searchable: Vec<&Message> = conversation
            .messages
            .iter()
            .filter(|m| query.role_filter.map(|r| r == m.role).unwrap_or(true))
            .collect();

        if exclude_hit(&searchable, &conversation.title, exclude_terms) {
            continue;
        }

        let phrase_hit = query
            .phrases
            .iter()
            .any(|p| phrase_present(&searchable, &conversation.title, p));
        let keyword_hit = !keyword_terms.is_empty() && keyword_condition(&searchable, &conversation.title, keyword_terms, query.match_mode);

        let stage1_satisfied =
            (query.phrases.is_empty() && query.keywords.is_empty()) || phrase_hit || keyword_hit;
        if !stage1_satisfied {
            continue;
        }

        let matched_message_ids = contributing_message_ids(&searchable, &query.phrases, keyword_terms);
        let doc_stats = build_doc_stats(&searchable, &conversation.title, keyword_terms);
        let snippet = build_snippet(
            &searchable,
            &conversation.title,
            &matched_message_ids,
            &query.phrases,
            keyword_terms,
        );

        candidates.push(Candidate {
            id: conversation.id.clone(),
            title: conversation.title.clone(),
            updated_at_or_created: conversation.updated_at_or_created(),
            message_count: conversation.message_count(),
            source_order: order,
            doc_stats,
            matched_message_ids,
            snippet,
            score: 0.0,
        });
    }

    Ok(candidates)
}

fn second_pass(
    adapter: ProviderAdapter,
    path: &Path,
    candidates: Vec<Candidate>,
) -> Result<Vec<SearchResult>, Error> {
    if candidates.is_empty() {
        return Ok(Vec::new());
    }
    let wanted: HashSet<&str> = candidates.iter().map(|c| c.id.as_str()).collect();
    let mut found: HashMap<String, Conversation> = HashMap::new();

    for conversation in adapter.stream(path, StreamOptions::default())? {
        let conversation = conversation?;
        if wanted.contains(conversation.id.as_str()) {
            let id = conversation.id.clone();
            found.insert(id, conversation);
            if found.len() == wanted.len() {
                break;
            }
        }
    }

    let mut results = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if let Some(conversation) = found.remove(&candidate.id) {
            results.push(SearchResult {
                conversation,
                score: candidate.score,
                matched_message_ids: candidate.matched_message_ids,
                snippet: candidate.snippet,
            });
        }
    }
    Ok(results)
}

fn passes_cheap_gates(conversation: &Conversation, query: &SearchQuery) -> bool {
    let created = conversation.created_at.date_naive();
    if let Some(from) = query.from_date {
        if created < from {
            return false;
        }
    }
    if let Some(to) = query.to_date {
        if created > to {
            return false;
        }
    }
    if let Some(min) = query.min_messages {
        if conversation.message_count() < min {
            return false;
        }
    }
    if let Some(max) = query.max_messages {
        if conversation.message_count() > max {
            return false;
        }
    }
    if let Some(title_filter) = &query.title_filter {
        if tokenize::find_ci(&conversation.title, title_filter).is_none() {
            return false;
        }
    }
    true
}

fn phrase_present(searchable: &[&Message], title: &str, phrase: &str) -> bool {
    tokenize::find_ci(title, phrase).is_some()
        || searchable
            .iter()
            .any(|m| tokenize::find_ci(&m.content, phrase).is_some())
}

fn keyword_condition(
    searchable: &[&Message],
    title: &str,
    keyword_terms: &[String],
    mode: MatchMode,
) -> bool {
    let mut present: HashSet<String> = HashSet::new();
    for m in searchable {
        present.extend(tokenize::tokenize(&m.content));
    }
    present.extend(tokenize::tokenize(title));

    match mode {
        MatchMode::Any => keyword_terms.iter().any(|k| present.contains(k)),
        MatchMode::All => keyword_terms.iter().all(|k| present.contains(k)),
    }
}

fn exclude_hit(searchable: &[&Message], title: &str, exclude_terms: &[String]) -> bool {
    if exclude_terms.is_empty() {
        return false;
    }
    let mut present: HashSet<String> = HashSet::new();
    for m in searchable {
        present.extend(tokenize::tokenize(&m.content));
    }
    present.extend(tokenize::tokenize(title));
    exclude_terms.iter().any(|term| present.contains(term))
}

/// Ids of every searchable message that contributed a phrase or keyword
/// token, in source order. Used both for `SearchResult::matched_message_ids`
/// and to locate the first match for snippet extraction.
fn contributing_message_ids(
    searchable: &[&Message],
    phrases: &[String],
    keyword_terms: &[String],
) -> Vec<String> {
    let mut ids = Vec::new();
    for m in searchable {
        let phrase_contributes = phrases.iter().any(|p| tokenize::find_ci(&m.content, p).is_some());
        let keyword_contributes = if keyword_terms.is_empty() {
            false
        } else {
            let tokens: HashSet<String> = tokenize::tokenize(&m.content).into_iter().collect();
            keyword_terms.iter().any(|k| tokens.contains(k))
        };
        if phrase_contributes || keyword_contributes {
            ids.push(m.id.clone());
        }
    }
    ids
}

fn build_doc_stats(
    searchable: &[&Message],
    title: &str,
    keyword_terms: &[String],
) -> bm25::DocStats {
    let mut stats = bm25::DocStats::new();
    accumulate_terms(&mut stats, searchable.iter().flat_map(|m| tokenize::tokenize(&m.content)), 1.0, keyword_terms);
    accumulate_terms(&mut stats, tokenize::tokenize(title).into_iter(), 2.0, keyword_terms);
    stats
}

fn accumulate_terms(
    stats: &mut bm25::DocStats,
    tokens: impl Iterator<Item = String>,
    weight: f64,
    keyword_terms: &[String],
) {
    for token in tokens {
        if keyword_terms.contains(&token) {
            stats.add_occurrence(&token, weight);
        } else {
            stats.doc_len += weight;
        }
    }
}

fn build_snippet(
    searchable: &[&Message],
    title: &str,
    matched_message_ids: &[String],
    phrases: &[String],
    keyword_terms: &[String],
) -> String {
    let first_matched = matched_message_ids
        .first()
        .and_then(|id| searchable.iter().find(|m| &m.id == id));
    let first_match =
        first_matched.map(|m| (m.content.as_str(), first_match_offset(&m.content, phrases, keyword_terms)));
    let additional = matched_message_ids.len().saturating_sub(1);
    snippet::build(first_match, title, matched_message_ids.is_empty(), additional)
}

/// Byte offset of whichever matched phrase or keyword token occurs earliest
/// in `content`, used to center the extracted snippet window (spec §4.3.4).
/// Falls back to 0 if, somehow, nothing in `content` actually matches.
fn first_match_offset(content: &str, phrases: &[String], keyword_terms: &[String]) -> usize {
    let mut earliest: Option<usize> = None;
    for phrase in phrases {
        if let Some(offset) = tokenize::find_ci(content, phrase) {
            earliest = Some(earliest.map_or(offset, |e: usize| e.min(offset)));
        }
    }
    if !keyword_terms.is_empty() {
        let lower = content.to_lowercase();
        for (start, word) in word_spans(&lower) {
            if keyword_terms.iter().any(|k| k == word) {
                earliest = Some(earliest.map_or(start, |e: usize| e.min(start)));
            }
        }
    }
    earliest.unwrap_or(0)
}

/// Splits `text` on the same punctuation/whitespace set as [`tokenize::tokenize`],
/// pairing each resulting word with its starting byte offset in `text`.
fn word_spans(text: &str) -> Vec<(usize, &str)> {
    const PUNCTUATION: &[char] = &[
        ' ', '\t', '\n', '\r', '.', ',', ';', ':', '!', '?', '(', ')', '[', ']', '{', '}', '"',
        '\'', '`', '/', '\\', '-',
    ];
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;
    for (i, c) in text.char_indices() {
        let is_boundary = c.is_whitespace() || PUNCTUATION.contains(&c);
        match (is_boundary, start) {
            (false, None) => start = Some(i),
            (true, Some(s)) => {
                spans.push((s, &text[s..i]));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push((s, &text[s..]));
    }
    spans
}

fn sort_candidates(candidates: &mut [Candidate], query: &SearchQuery) {
    candidates.sort_by(|a, b| {
        let primary = match query.sort_by {
            SortBy::Score => a.score.partial_cmp(&b.score).unwrap_or(Ordering::Equal),
            SortBy::Date => a.updated_at_or_created.cmp(&b.updated_at_or_created),
            SortBy::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
            SortBy::Messages => a.message_count.cmp(&b.message_count),
        };
        let primary = match query.sort_order {
            SortOrder::Desc => primary.reverse(),
            SortOrder::Asc => primary,
        };
        primary.then_with(|| match query.sort_by {
            SortBy::Score => a.id.cmp(&b.id),
            _ => a.source_order.cmp(&b.source_order),
        })
    });
}
