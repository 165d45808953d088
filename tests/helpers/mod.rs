#![allow(dead_code)]

use mnemos::config::{FeatureFlags, MnemosConfig};
use mnemos::db;
use mnemos::engine::RankingEngine;
use mnemos::store::sqlite::{set_related_memories, upsert_edge, upsert_record};
use mnemos::store::{IndexRecord, Neighbor, Relation, TypedEdge};
use rusqlite::Connection;

/// Open a fresh in-memory database with schema and migrations applied.
pub fn test_db() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.pragma_update(None, "foreign_keys", "ON").unwrap();
    db::schema::init_schema(&conn).unwrap();
    db::migrations::run_migrations(&conn).unwrap();
    conn
}

/// Insert a record with a title and body. Returns its id.
pub fn insert_record(conn: &Connection, id: &str, title: &str, body: &str) -> String {
    upsert_record(
        conn,
        &IndexRecord {
            id: id.into(),
            title: title.into(),
            body: body.into(),
            path: format!("specs/{id}.md"),
            folder: "specs".into(),
            ..Default::default()
        },
    )
    .unwrap()
}

/// Insert a record that carries trigger phrases and an importance weight.
pub fn insert_triggered(
    conn: &Connection,
    id: &str,
    title: &str,
    phrases: &[&str],
    weight: Option<f64>,
) -> String {
    upsert_record(
        conn,
        &IndexRecord {
            id: id.into(),
            title: title.into(),
            body: format!("notes about {title}"),
            trigger_phrases: Some(serde_json::to_string(phrases).unwrap()),
            path: format!("specs/{id}.md"),
            folder: "specs".into(),
            importance_weight: weight,
            ..Default::default()
        },
    )
    .unwrap()
}

/// Insert a record at a given importance tier.
pub fn insert_tiered(conn: &Connection, id: &str, tier: &str) -> String {
    upsert_record(
        conn,
        &IndexRecord {
            id: id.into(),
            title: format!("record {id}"),
            importance_tier: tier.into(),
            ..Default::default()
        },
    )
    .unwrap()
}

pub fn insert_edge(conn: &Connection, source: &str, target: &str, relation: Relation, strength: f64) -> TypedEdge {
    let edge = TypedEdge::new(source, target, relation, strength);
    upsert_edge(conn, &edge).unwrap();
    edge
}

pub fn link(conn: &Connection, id: &str, neighbors: &[(&str, f64)]) {
    let links: Vec<Neighbor> = neighbors
        .iter()
        .map(|(n, similarity)| Neighbor {
            id: n.to_string(),
            similarity: *similarity,
        })
        .collect();
    set_related_memories(conn, id, &links).unwrap();
}

pub fn engine() -> RankingEngine {
    RankingEngine::new(&MnemosConfig::default())
}

pub fn engine_with(flags: FeatureFlags) -> RankingEngine {
    RankingEngine::new(&MnemosConfig {
        features: flags,
        ..Default::default()
    })
}
