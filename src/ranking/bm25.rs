//! In-memory inverted index with Okapi BM25 scoring.
//!
//! Corpus statistics are maintained incrementally: every add retracts the
//! previous version of a document before applying the new one, so the
//! per-document lengths always sum to the running total and each document
//! frequency equals the number of documents containing the term.

use regex::Regex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use crate::store::RecordSource;

pub const DEFAULT_K1: f64 = 1.2;
pub const DEFAULT_B: f64 = 0.75;

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "from", "is", "it", "as", "was", "are", "be", "has", "had", "have", "been", "were", "will",
    "would", "could", "should", "may", "might", "can", "this", "that", "these", "those", "not",
    "no", "do", "does", "did", "so", "if", "then", "than", "too", "very",
];

static STOP_WORD_SET: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| STOP_WORDS.iter().copied().collect());

static FTS5_OPERATORS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:NEAR|NOT|AND|OR)\b").ok());

// ── Tokenization ──────────────────────────────────────────────────────────────

/// Suffix stripper. Only the first matching rule applies; lengths are measured
/// before stripping. `-ment` is never stripped.
pub fn stem(word: &str) -> String {
    let w = word.to_lowercase();
    let len = w.chars().count();

    let suffix = if w.ends_with("ing") && len > 5 {
        Some("ing")
    } else if w.ends_with("tion") && len > 6 {
        Some("tion")
    } else if w.ends_with("ed") && len > 4 {
        Some("ed")
    } else if w.ends_with("ly") && len > 4 {
        Some("ly")
    } else if w.ends_with("es") && len > 4 {
        Some("es")
    } else if w.ends_with('s') && len > 3 {
        Some("s")
    } else {
        None
    };

    match suffix {
        Some(suffix) => w[..w.len() - suffix.len()].to_string(),
        None => w,
    }
}

/// Lowercase, blank out everything except `a-z 0-9 - _` and whitespace, split,
/// drop short tokens and stop words, then stem.
pub fn tokenize(text: &str) -> Vec<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace() || c == '-' || c == '_' {
                c
            } else {
                ' '
            }
        })
        .collect();

    cleaned
        .split_whitespace()
        .filter(|t| t.len() >= 2 && !STOP_WORD_SET.contains(t))
        .map(stem)
        .collect()
}

fn term_frequencies(tokens: &[String]) -> HashMap<String, u32> {
    let mut freq = HashMap::new();
    for token in tokens {
        *freq.entry(token.clone()).or_insert(0) += 1;
    }
    freq
}

/// Make arbitrary user text safe for an FTS5 `MATCH`: drop boolean/proximity
/// operators and syntax characters, then quote every remaining term.
pub fn sanitize_fts5_query(query: &str) -> String {
    let without_ops = match FTS5_OPERATORS.as_ref() {
        Some(re) => re.replace_all(query, "").into_owned(),
        None => query.to_string(),
    };

    without_ops
        .chars()
        .filter(|c| !matches!(c, '*' | '^' | '(' | ')' | '{' | '}' | '[' | ']' | '"'))
        .map(|c| if c == ':' { ' ' } else { c })
        .collect::<String>()
        .split_whitespace()
        .map(|term| format!("\"{term}\""))
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Index ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
    pub k1: f64,
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self {
            k1: DEFAULT_K1,
            b: DEFAULT_B,
        }
    }
}

#[derive(Debug, Clone)]
struct IndexedDocument {
    length: usize,
    term_freq: HashMap<String, u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bm25Hit {
    pub id: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bm25Stats {
    pub document_count: usize,
    pub term_count: usize,
    pub avg_doc_length: f64,
}

#[derive(Debug, Default)]
pub struct Bm25Index {
    params: Bm25Params,
    documents: HashMap<String, IndexedDocument>,
    document_freq: HashMap<String, usize>,
    total_length: usize,
}

impl Bm25Index {
    pub fn new(params: Bm25Params) -> Self {
        Self {
            params,
            ..Default::default()
        }
    }

    pub fn params(&self) -> Bm25Params {
        self.params
    }

    /// Index `text` under `id`, replacing any earlier version wholesale.
    pub fn add_document(&mut self, id: &str, text: &str) {
        self.remove_document(id);

        let tokens = tokenize(text);
        let term_freq = term_frequencies(&tokens);
        for term in term_freq.keys() {
            *self.document_freq.entry(term.clone()).or_insert(0) += 1;
        }
        self.total_length += tokens.len();
        self.documents.insert(
            id.to_string(),
            IndexedDocument {
                length: tokens.len(),
                term_freq,
            },
        );
    }

    pub fn add_documents<'a, I>(&mut self, docs: I)
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (id, text) in docs {
            self.add_document(id, text);
        }
    }

    /// Retract a document's contribution. Returns whether it was indexed.
    pub fn remove_document(&mut self, id: &str) -> bool {
        let Some(doc) = self.documents.remove(id) else {
            return false;
        };

        self.total_length -= doc.length;
        for term in doc.term_freq.keys() {
            let df = self.document_frequency(term);
            if df <= 1 {
                self.document_freq.remove(term);
            } else {
                self.document_freq.insert(term.clone(), df - 1);
            }
        }
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.documents.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn document_frequency(&self, term: &str) -> usize {
        self.document_freq.get(term).copied().unwrap_or(0)
    }

    pub fn total_length(&self) -> usize {
        self.total_length
    }

    fn avg_doc_length(&self) -> f64 {
        if self.documents.is_empty() {
            0.0
        } else {
            self.total_length as f64 / self.documents.len() as f64
        }
    }

    /// `ln((N - df + 0.5) / (df + 0.5) + 1)`; zero for unseen terms or an
    /// empty corpus, so scores are never negative.
    pub fn idf(&self, term: &str) -> f64 {
        let n = self.documents.len() as f64;
        let df = self.document_frequency(term) as f64;
        if df == 0.0 || n == 0.0 {
            return 0.0;
        }
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }

    /// BM25 score of one document for already-tokenized query terms.
    pub fn score(&self, query_terms: &[String], doc_id: &str) -> f64 {
        let Some(doc) = self.documents.get(doc_id) else {
            return 0.0;
        };

        let Bm25Params { k1, b } = self.params;
        let length_ratio = doc.length as f64 / self.avg_doc_length().max(1.0);

        query_terms
            .iter()
            .filter_map(|term| doc.term_freq.get(term).map(|tf| (term, *tf as f64)))
            .map(|(term, tf)| {
                let numerator = tf * (k1 + 1.0);
                let denominator = tf + k1 * (1.0 - b + b * length_ratio);
                self.idf(term) * (numerator / denominator)
            })
            .sum()
    }

    /// Rank documents sharing at least one term with `query`. Zero scores are
    /// dropped; ties break on id so results are deterministic.
    pub fn search(&self, query: &str, limit: usize) -> Vec<Bm25Hit> {
        let terms = tokenize(query);
        if terms.is_empty() {
            return Vec::new();
        }

        let mut hits: Vec<Bm25Hit> = self
            .documents
            .iter()
            .filter(|(_, doc)| terms.iter().any(|t| doc.term_freq.contains_key(t)))
            .map(|(id, _)| Bm25Hit {
                id: id.clone(),
                score: self.score(&terms, id),
            })
            .filter(|hit| hit.score > 0.0)
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(limit);
        hits
    }

    pub fn stats(&self) -> Bm25Stats {
        Bm25Stats {
            document_count: self.documents.len(),
            term_count: self.document_freq.len(),
            avg_doc_length: self.avg_doc_length(),
        }
    }

    pub fn clear(&mut self) {
        self.documents.clear();
        self.document_freq.clear();
        self.total_length = 0;
    }

    /// Clear, then index every non-archived record from `source`. Returns the
    /// number of rows read; a store failure is logged and yields 0 with the
    /// index left empty.
    pub fn rebuild_from_database(&mut self, source: &dyn RecordSource) -> usize {
        self.clear();

        let rows = match source.lexical_rows() {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(error = %e, "lexical index rebuild failed");
                return 0;
            }
        };

        for row in rows.iter().filter(|r| !r.archived) {
            let text = row.lexical_text();
            if !text.trim().is_empty() {
                self.add_document(&row.id, &text);
            }
        }

        tracing::info!(rows = rows.len(), documents = self.len(), "lexical index rebuilt");
        rows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{StoreError, StoreResult};
    use crate::store::IndexRecord;

    fn terms(query: &str) -> Vec<String> {
        tokenize(query)
    }

    #[test]
    fn stemmer_rules_apply_in_order() {
        assert_eq!(stem("running"), "runn");
        assert_eq!(stem("sing"), "sing");
        assert_eq!(stem("creation"), "crea");
        assert_eq!(stem("nation"), "nation");
        assert_eq!(stem("indexed"), "index");
        assert_eq!(stem("quickly"), "quick");
        assert_eq!(stem("classes"), "class");
        assert_eq!(stem("cats"), "cat");
        assert_eq!(stem("gas"), "gas");
        assert_eq!(stem("deployment"), "deployment");
    }

    #[test]
    fn tokenize_strips_punctuation_and_stop_words() {
        let tokens = tokenize("The quick-fix, for THE auth_flow: it's done!");
        assert_eq!(tokens, vec!["quick-fix", "auth_flow", "done"]);
    }

    #[test]
    fn tokenize_drops_short_tokens_and_non_ascii_letters() {
        assert_eq!(tokenize("a b cd"), vec!["cd"]);
        assert_eq!(tokenize("café"), vec!["caf"]);
        assert!(tokenize("").is_empty());
        assert!(tokenize("   !!! ").is_empty());
    }

    #[test]
    fn higher_term_frequency_scores_higher() {
        let mut index = Bm25Index::default();
        index.add_document("three", "rust rust rust compiler");
        index.add_document("one", "rust tooling guide pages");
        index.add_document("none", "python scripting guide");

        let q = terms("rust");
        assert!(index.score(&q, "three") > index.score(&q, "one"));
        assert_eq!(index.score(&q, "none"), 0.0);
    }

    #[test]
    fn absent_term_contributes_nothing() {
        let mut index = Bm25Index::default();
        index.add_document("a", "database migration schema");
        index.add_document("b", "network socket");
        let base = index.score(&terms("database"), "a");
        let with_absent = index.score(&terms("database zebra"), "a");
        assert_eq!(base, with_absent);
        assert_eq!(index.idf("zebra"), 0.0);
    }

    #[test]
    fn idf_is_zero_on_empty_corpus() {
        let index = Bm25Index::default();
        assert_eq!(index.idf("anything"), 0.0);
        assert_eq!(index.score(&terms("anything"), "missing"), 0.0);
    }

    #[test]
    fn readd_replaces_document() {
        let mut index = Bm25Index::default();
        index.add_document("a", "alpha beta");
        index.add_document("a", "gamma");
        assert_eq!(index.len(), 1);
        assert_eq!(index.document_frequency("alpha"), 0);
        assert_eq!(index.document_frequency("gamma"), 1);
        assert_eq!(index.total_length(), 1);
        assert!(index.search("alpha", 10).is_empty());
    }

    #[test]
    fn remove_retracts_statistics() {
        let mut index = Bm25Index::default();
        index.add_document("a", "shared alpha");
        index.add_document("b", "shared beta");
        assert_eq!(index.document_frequency("shar"), 2);

        assert!(index.remove_document("a"));
        assert!(!index.remove_document("a"));
        assert_eq!(index.document_frequency("shar"), 1);
        assert_eq!(index.document_frequency("alpha"), 0);
        assert_eq!(index.stats().term_count, 2);
        assert_eq!(index.total_length(), 2);
    }

    #[test]
    fn search_sorts_and_truncates() {
        let mut index = Bm25Index::default();
        index.add_document("a", "cache eviction policy cache");
        index.add_document("b", "cache warmup");
        index.add_document("c", "unrelated text here");

        let hits = index.search("cache", 10);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "a");
        assert!(hits[0].score > hits[1].score);

        assert_eq!(index.search("cache", 1).len(), 1);
        assert!(index.search("the and", 10).is_empty());
    }

    #[test]
    fn search_ties_break_on_id() {
        let mut index = Bm25Index::default();
        index.add_document("zeta", "token bucket");
        index.add_document("alpha", "token bucket");
        index.add_document("mid", "other words");
        let hits = index.search("token", 10);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "alpha");
        assert_eq!(hits[1].id, "zeta");
    }

    #[test]
    fn stats_report_average_length() {
        let mut index = Bm25Index::default();
        assert_eq!(index.stats().avg_doc_length, 0.0);
        index.add_documents([("a", "one two three"), ("b", "four")]);
        let stats = index.stats();
        assert_eq!(stats.document_count, 2);
        assert_eq!(stats.avg_doc_length, 2.0);
        index.clear();
        assert!(index.is_empty());
        assert_eq!(index.total_length(), 0);
    }

    #[test]
    fn sanitize_strips_operators_and_syntax() {
        assert_eq!(sanitize_fts5_query("rust AND cargo"), "\"rust\" \"cargo\"");
        assert_eq!(sanitize_fts5_query("a or b not c"), "\"a\" \"b\" \"c\"");
        assert_eq!(sanitize_fts5_query("title:(auth*) \"x\""), "\"title\" \"auth\" \"x\"");
        assert_eq!(sanitize_fts5_query("ORACLE android"), "\"ORACLE\" \"android\"");
        assert_eq!(sanitize_fts5_query("NEAR ^ {}"), "");
    }

    struct Rows(Vec<IndexRecord>);

    impl RecordSource for Rows {
        fn lexical_rows(&self) -> StoreResult<Vec<IndexRecord>> {
            Ok(self.0.clone())
        }
        fn trigger_rows(&self) -> StoreResult<Vec<IndexRecord>> {
            Ok(Vec::new())
        }
    }

    struct Broken;

    impl RecordSource for Broken {
        fn lexical_rows(&self) -> StoreResult<Vec<IndexRecord>> {
            Err(StoreError::Unavailable("offline".into()))
        }
        fn trigger_rows(&self) -> StoreResult<Vec<IndexRecord>> {
            Err(StoreError::Unavailable("offline".into()))
        }
    }

    #[test]
    fn rebuild_indexes_joined_fields_and_skips_blank() {
        let rows = Rows(vec![
            IndexRecord {
                id: "1".into(),
                title: "Deploy checklist".into(),
                path: "ops/deploy.md".into(),
                ..Default::default()
            },
            IndexRecord {
                id: "2".into(),
                ..Default::default()
            },
        ]);

        let mut index = Bm25Index::default();
        index.add_document("stale", "leftover");
        assert_eq!(index.rebuild_from_database(&rows), 2);
        assert!(!index.contains("stale"));
        assert!(!index.contains("2"));
        assert_eq!(index.search("checklist", 5)[0].id, "1");
        assert_eq!(index.search("ops", 5)[0].id, "1");
    }

    #[test]
    fn rebuild_failure_returns_zero_and_empty_index() {
        let mut index = Bm25Index::default();
        index.add_document("old", "content");
        assert_eq!(index.rebuild_from_database(&Broken), 0);
        assert!(index.is_empty());
    }
}
