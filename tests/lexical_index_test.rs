mod helpers;

use std::collections::BTreeMap;

use mnemos::ranking::bm25::{tokenize, Bm25Index};
use mnemos::store::SqliteStore;
use proptest::prelude::*;

const WORDS: &[&str] = &[
    "deploy", "rollback", "cache", "caching", "session", "sessions", "token", "refresh", "policy",
    "quickly", "pooling", "the", "and", "retry", "migration", "schema",
];

fn doc_text() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(WORDS), 0..12).prop_map(|w| w.join(" "))
}

#[derive(Debug, Clone)]
enum Op {
    Add(u8, String),
    Remove(u8),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0u8..6, doc_text()).prop_map(|(id, text)| Op::Add(id, text)),
        1 => (0u8..6).prop_map(Op::Remove),
    ]
}

proptest! {
    /// Any sequence of adds and removes leaves the same corpus statistics as
    /// indexing the surviving documents from scratch.
    #[test]
    fn incremental_updates_match_fresh_build(ops in prop::collection::vec(op(), 1..40)) {
        let mut index = Bm25Index::default();
        let mut live: BTreeMap<String, String> = BTreeMap::new();

        for op in ops {
            match op {
                Op::Add(id, text) => {
                    let id = format!("doc-{id}");
                    index.add_document(&id, &text);
                    live.insert(id, text);
                }
                Op::Remove(id) => {
                    let id = format!("doc-{id}");
                    index.remove_document(&id);
                    live.remove(&id);
                }
            }
        }

        let mut fresh = Bm25Index::default();
        for (id, text) in &live {
            fresh.add_document(id, text);
        }

        prop_assert_eq!(index.len(), fresh.len());
        prop_assert_eq!(index.total_length(), fresh.total_length());
        let expected_total: usize = live.values().map(|t| tokenize(t).len()).sum();
        prop_assert_eq!(index.total_length(), expected_total);

        for word in WORDS {
            for term in tokenize(word) {
                let containing = live.values().filter(|t| tokenize(t).contains(&term)).count();
                prop_assert_eq!(index.document_frequency(&term), containing);
            }
        }
        prop_assert_eq!(index.stats().term_count, fresh.stats().term_count);
    }

    /// Absent query terms contribute nothing and scores never go negative.
    #[test]
    fn scores_are_non_negative(docs in prop::collection::vec(doc_text(), 1..8), query in doc_text()) {
        let mut index = Bm25Index::default();
        for (i, text) in docs.iter().enumerate() {
            index.add_document(&format!("d{i}"), text);
        }
        let terms = tokenize(&query);
        for i in 0..docs.len() {
            let score = index.score(&terms, &format!("d{i}"));
            prop_assert!(score >= 0.0);
            let doc_terms = tokenize(&docs[i]);
            if terms.iter().all(|t| !doc_terms.contains(t)) {
                prop_assert_eq!(score, 0.0);
            }
        }
    }
}

#[test]
fn rebuild_reads_from_store_and_skips_archived() {
    let conn = helpers::test_db();
    helpers::insert_record(&conn, "a", "Deploy guide", "blue green deploys");
    helpers::insert_record(&conn, "b", "Schema notes", "migration ordering");
    mnemos::store::sqlite::archive_record(&conn, "b").unwrap();

    let mut index = Bm25Index::default();
    let rows = index.rebuild_from_database(&SqliteStore::new(&conn));
    assert_eq!(rows, 1);
    assert!(index.contains("a"));
    assert!(!index.contains("b"));
    assert!(index.search("migration", 5).is_empty());
}

#[test]
fn higher_term_frequency_scores_higher() {
    let mut index = Bm25Index::default();
    index.add_document("three", "cache cache cache layer");
    index.add_document("one", "cache layer notes here");
    index.add_document("none", "unrelated schema text");

    let hits = index.search("cache", 10);
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].id, "three");
    assert!(hits[0].score > hits[1].score);
}
