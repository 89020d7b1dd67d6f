//! Classical Okapi BM25 scoring (spec §4.3.2), `k1 = 1.5`, `b = 0.75`.
//!
//! Operates entirely on the lightweight per-candidate statistics table the
//! search pipeline's first pass builds — never on the full `Conversation`
//! values themselves, so the working set stays `O(candidates)` rather than
//! `O(file)`.

use std::collections::HashMap;

const K1: f64 = 1.5;
const B: f64 = 0.75;

/// A candidate's weighted term-frequency table and total weighted length.
/// Title tokens are folded in here with the fixed 2.0 multiplier from
/// §4.3.1 step 5, so this module itself stays unaware of titles.
#[derive(Debug, Clone, Default)]
pub struct DocStats {
    pub doc_len: f64,
    pub term_freqs: HashMap<String, f64>,
}

impl DocStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_occurrence(&mut self, term: &str, weight: f64) {
        *self.term_freqs.entry(term.to_string()).or_insert(0.0) += weight;
        self.doc_len += weight;
    }
}

/// Scores every document against `query_terms`, returning scores in the
/// same order, normalized into `[0.0, 1.0]` by dividing by the maximum raw
/// score in this result set. An empty document set or an empty query
/// yields all zeros (no normalization is performed, per spec).
pub fn score_all(docs: &[DocStats], query_terms: &[String]) -> Vec<f64> {
    if docs.is_empty() || query_terms.is_empty() {
        return vec![0.0; docs.len()];
    }

    let n = docs.len() as f64;
    let total_len: f64 = docs.iter().map(|d| d.doc_len).sum();
    let avgdl = if total_len > 0.0 { total_len / n } else { 1.0 };

    let idf: HashMap<&str, f64> = query_terms
        .iter()
        .map(|term| {
            let n_q = docs
                .iter()
                .filter(|d| d.term_freqs.get(term).copied().unwrap_or(0.0) > 0.0)
                .count() as f64;
            let value = ((n - n_q + 0.5) / (n_q + 0.5) + 1.0).ln();
            (term.as_str(), value)
        })
        .collect();

    let raw: Vec<f64> = docs
        .iter()
        .map(|doc| {
            query_terms
                .iter()
                .map(|term| {
                    let tf = doc.term_freqs.get(term).copied().unwrap_or(0.0);
                    if tf == 0.0 {
                        return 0.0;
                    }
                    let idf_term = idf[term.as_str()];
                    let denom = tf + K1 * (1.0 - B + B * doc.doc_len / avgdl);
                    idf_term * tf * (K1 + 1.0) / denom
                })
                .sum()
        })
        .collect();

    let max = raw.iter().cloned().fold(0.0_f64, f64::max);
    if max <= 0.0 {
        return vec![0.0; docs.len()];
    }
    raw.into_iter().map(|s| (s / max).clamp(0.0, 1.0)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(terms: &[(&str, f64)], extra_len: f64) -> DocStats {
        let mut stats = DocStats::new();
        for (term, weight) in terms {
            stats.add_occurrence(term, *weight);
        }
        stats.doc_len += extra_len;
        stats
    }

    #[test]
    fn top_match_normalizes_to_one() {
        let docs = vec![
            doc(&[("python", 5.0)], 10.0),
            doc(&[("python", 1.0)], 50.0),
            doc(&[], 20.0),
        ];
        let scores = score_all(&docs, &["python".to_string()]);
        assert_eq!(scores.len(), 3);
        assert!((scores[0] - 1.0).abs() < 1e-9);
        assert!(scores[0] > scores[1]);
        assert_eq!(scores[2], 0.0);
    }

    #[test]
    fn empty_query_or_docs_yields_zero() {
        let docs = vec![doc(&[("a", 1.0)], 0.0)];
        assert_eq!(score_all(&docs, &[]), vec![0.0]);
        assert_eq!(score_all(&[], &["a".to_string()]), Vec::<f64>::new());
    }

    #[test]
    fn scores_are_bounded_and_nonnegative() {
        let docs = vec![
            doc(&[("rust", 3.0), ("async", 1.0)], 30.0),
            doc(&[("rust", 1.0)], 5.0),
            doc(&[], 5.0),
        ];
        let scores = score_all(&docs, &["rust".to_string(), "async".to_string()]);
        for s in scores {
            assert!((0.0..=1.0).contains(&s));
        }
    }
}
