mod helpers;

use mnemos::config::FeatureFlags;
use mnemos::engine::SearchRequest;
use mnemos::ranking::budget::ComplexityTier;
use mnemos::ranking::fusion::ChannelSource;
use mnemos::store::sqlite::{archive_record, delete_record};
use mnemos::store::{Relation, SqliteStore};

fn seeded() -> rusqlite::Connection {
    let conn = helpers::test_db();
    helpers::insert_record(&conn, "auth", "Authentication flow", "oauth token refresh and session expiry");
    helpers::insert_record(&conn, "pool", "Database pooling", "connection pool sizing and retry policy");
    helpers::insert_record(&conn, "cache", "Cache layer", "redis cache invalidation for sessions");
    helpers::insert_triggered(&conn, "deploy", "Deploy runbook", &["deploy to production"], Some(0.9));
    conn
}

#[test]
fn lexical_and_full_text_channels_converge() {
    let conn = seeded();
    let store = SqliteStore::new(&conn);
    let engine = helpers::engine();
    assert_eq!(engine.rebuild_from_database(&store), 4);

    let response = engine.hybrid_search(&store, &SearchRequest::new("oauth token", 5));
    let top = &response.results[0];
    assert_eq!(top.id, "auth");
    assert!(top.source_channels.contains(&ChannelSource::Bm25));
    assert!(top.source_channels.contains(&ChannelSource::Fts));
    assert!(top.total_score > 2.0 / 61.0);
}

#[test]
fn trigger_phrase_surfaces_keyword_channel() {
    let conn = seeded();
    let store = SqliteStore::new(&conn);
    let engine = helpers::engine();
    engine.rebuild_from_database(&store);

    let response = engine.hybrid_search(&store, &SearchRequest::new("please deploy to production now", 5));
    let deploy = response.results.iter().find(|r| r.id == "deploy").unwrap();
    assert!(deploy.source_channels.contains(&ChannelSource::Keyword));
}

#[test]
fn vector_results_are_fused_with_internal_channels() {
    let conn = seeded();
    let store = SqliteStore::new(&conn);
    let engine = helpers::engine();
    engine.rebuild_from_database(&store);

    let request = SearchRequest::new("sessions", 5)
        .with_vector_results(vec![("pool".into(), 88.0), ("cache".into(), 80.0)]);
    let response = engine.hybrid_search(&store, &request);

    let cache = response.results.iter().find(|r| r.id == "cache").unwrap();
    assert!(cache.source_channels.contains(&ChannelSource::Vector));
    assert_eq!(cache.raw_scores[&ChannelSource::Vector], 80.0);
    assert_eq!(response.results[0].id, "cache");
}

#[test]
fn degree_channel_rewards_connected_records() {
    let conn = seeded();
    helpers::insert_edge(&conn, "cache", "auth", Relation::Caused, 1.0);
    helpers::insert_edge(&conn, "pool", "auth", Relation::Enabled, 0.8);
    let store = SqliteStore::new(&conn);
    let engine = helpers::engine();
    engine.rebuild_from_database(&store);

    let response = engine.hybrid_search(&store, &SearchRequest::new("session", 5));
    let auth = response.results.iter().find(|r| r.id == "auth").unwrap();
    assert!(auth.source_channels.contains(&ChannelSource::Degree));
}

#[test]
fn archived_and_deleted_records_drop_out() {
    let conn = seeded();
    let store = SqliteStore::new(&conn);
    let engine = helpers::engine();
    engine.rebuild_from_database(&store);

    archive_record(&conn, "pool").unwrap();
    engine.on_record_changed(&store, "pool");
    delete_record(&conn, "cache").unwrap();
    engine.on_record_removed("cache");

    let response = engine.hybrid_search(&store, &SearchRequest::new("pool cache", 5));
    assert!(response.results.iter().all(|r| r.id != "pool" && r.id != "cache"));
}

#[test]
fn co_activation_reports_linked_records() {
    let conn = seeded();
    helpers::link(&conn, "pool", &[("cache", 85.0)]);
    let store = SqliteStore::new(&conn);
    let engine = helpers::engine();
    engine.rebuild_from_database(&store);

    let response = engine.hybrid_search(&store, &SearchRequest::new("retry policy", 1));
    assert_eq!(response.results.len(), 1);
    assert_eq!(response.results[0].id, "pool");
    assert!(response.co_activated.iter().any(|r| r.id == "cache" && r.hop == 1));
}

#[test]
fn co_activation_gate_off_skips_spreading() {
    let conn = seeded();
    helpers::link(&conn, "pool", &[("cache", 85.0)]);
    let store = SqliteStore::new(&conn);
    let engine = helpers::engine_with(FeatureFlags {
        co_activation: false,
        ..FeatureFlags::default()
    });
    engine.rebuild_from_database(&store);

    let response = engine.hybrid_search(&store, &SearchRequest::new("retry policy", 1));
    assert!(response.co_activated.is_empty());
}

#[test]
fn complexity_router_sizes_budget() {
    let conn = seeded();
    let store = SqliteStore::new(&conn);
    let engine = helpers::engine_with(FeatureFlags {
        complexity_router: true,
        dynamic_token_budget: true,
        ..FeatureFlags::default()
    });

    let short = engine.hybrid_search(&store, &SearchRequest::new("deploy to production", 5));
    assert_eq!(short.classification.tier, ComplexityTier::Simple);
    assert!(short.classification.features.has_trigger_match);
    assert_eq!(short.budget.budget, 1500);

    let long = engine.hybrid_search(
        &store,
        &SearchRequest::new(
            "explain how token refresh interacts with connection pool retries during redis cache invalidation",
            5,
        ),
    );
    assert_eq!(long.classification.tier, ComplexityTier::Complex);
    assert_eq!(long.budget.budget, 4000);
}

#[test]
fn signals_are_reported_when_enabled() {
    let conn = seeded();
    let store = SqliteStore::new(&conn);
    let engine = helpers::engine_with(FeatureFlags {
        signal_vocab: true,
        ..FeatureFlags::default()
    });
    let response = engine.hybrid_search(&store, &SearchRequest::new("actually I prefer redis", 5));
    assert_eq!(response.signals.len(), 2);
}
