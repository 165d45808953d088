//! SQLite implementation of the store traits, plus the write helpers the CLI
//! and tests use to populate `memory_index` and `causal_edges`.

use anyhow::{bail, Result};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::{
    clamp_unit, EdgeSource, FullTextSource, IndexRecord, Neighbor, NeighborSource, RecordSource,
    Relation, TypedEdge,
};
use crate::error::StoreResult;
use crate::ranking::bm25::sanitize_fts5_query;

const RECORD_COLUMNS: &str = "id, title, body, trigger_phrases, path, folder, \
     importance_weight, importance_tier, archived";

/// Read-only view over a record database.
pub struct SqliteStore<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn conn(&self) -> &Connection {
        self.conn
    }

    fn query_records(&self, where_clause: &str) -> StoreResult<Vec<IndexRecord>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM memory_index WHERE {where_clause} ORDER BY id");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn query_edges(&self, sql: &str, ids: &[String]) -> StoreResult<Vec<TypedEdge>> {
        let mut stmt = self.conn.prepare(sql)?;
        let raw = stmt
            .query_map(params_from_iter(ids.iter()), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, f64>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut edges = Vec::with_capacity(raw.len());
        for (source_id, target_id, relation, strength) in raw {
            match relation.parse::<Relation>() {
                Ok(relation) => edges.push(TypedEdge::new(source_id, target_id, relation, strength)),
                Err(e) => tracing::debug!(error = %e, "skipping edge with unknown relation"),
            }
        }
        Ok(edges)
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<IndexRecord> {
    Ok(IndexRecord {
        id: row.get(0)?,
        title: row.get(1)?,
        body: row.get(2)?,
        trigger_phrases: row.get(3)?,
        path: row.get(4)?,
        folder: row.get(5)?,
        importance_weight: row.get(6)?,
        importance_tier: row.get(7)?,
        archived: row.get::<_, i64>(8)? != 0,
    })
}

fn placeholders(n: usize) -> String {
    (1..=n).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ")
}

impl RecordSource for SqliteStore<'_> {
    fn lexical_rows(&self) -> StoreResult<Vec<IndexRecord>> {
        self.query_records("archived = 0")
    }

    fn trigger_rows(&self) -> StoreResult<Vec<IndexRecord>> {
        self.query_records(
            "trigger_phrases IS NOT NULL AND trigger_phrases != '' AND trigger_phrases != '[]'",
        )
    }

    fn records_by_ids(&self, ids: &[String]) -> StoreResult<Vec<IndexRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM memory_index WHERE archived = 0 AND id IN ({})",
            placeholders(ids.len())
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(ids.iter()), record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl EdgeSource for SqliteStore<'_> {
    fn edges_for(&self, ids: &[String]) -> StoreResult<Vec<TypedEdge>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let list = placeholders(ids.len());
        let sql = format!(
            "SELECT source_id, target_id, relation, strength FROM causal_edges \
             WHERE source_id IN ({list}) OR target_id IN ({list})"
        );
        self.query_edges(&sql, ids)
    }

    fn all_edges(&self) -> StoreResult<Vec<TypedEdge>> {
        self.query_edges(
            "SELECT source_id, target_id, relation, strength FROM causal_edges",
            &[],
        )
    }

    fn constitutional_ids(&self, ids: &[String]) -> StoreResult<HashSet<String>> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }
        let sql = format!(
            "SELECT id FROM memory_index \
             WHERE importance_tier = 'constitutional' AND id IN ({})",
            placeholders(ids.len())
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let found = stmt
            .query_map(params_from_iter(ids.iter()), |row| row.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(found)
    }
}

impl FullTextSource for SqliteStore<'_> {
    /// FTS5 rank is negative (more negative = better), so it is negated.
    fn full_text_search(&self, query: &str, limit: usize) -> StoreResult<Vec<(String, f64)>> {
        let sanitized = sanitize_fts5_query(query);
        if sanitized.is_empty() {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(
            "SELECT id, rank FROM memory_fts \
             WHERE memory_fts MATCH ?1 ORDER BY rank LIMIT ?2",
        )?;
        let results = stmt
            .query_map(params![sanitized, limit as i64], |row| {
                Ok((row.get::<_, String>(0)?, -row.get::<_, f64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(results)
    }
}

/// Stored shape of one precomputed similarity link.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RelatedLink {
    id: String,
    similarity: f64,
}

impl NeighborSource for SqliteStore<'_> {
    fn similarity_neighbors(&self, id: &str, limit: usize) -> StoreResult<Vec<Neighbor>> {
        let raw: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT related_memories FROM memory_index WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        let Some(Some(json)) = raw else {
            return Ok(Vec::new());
        };
        // Malformed link data reads as "no links".
        let links: Vec<RelatedLink> = match serde_json::from_str(&json) {
            Ok(links) => links,
            Err(e) => {
                tracing::debug!(id, error = %e, "ignoring malformed related_memories");
                return Ok(Vec::new());
            }
        };

        Ok(links
            .into_iter()
            .filter(|link| link.id != id)
            .take(limit)
            .map(|link| Neighbor {
                id: link.id,
                similarity: link.similarity,
            })
            .collect())
    }

    fn causal_neighbors(&self, id: &str, limit: usize) -> StoreResult<Vec<Neighbor>> {
        let mut stmt = self.conn.prepare(
            "SELECT CASE WHEN source_id = ?1 THEN target_id ELSE source_id END, strength \
             FROM causal_edges \
             WHERE source_id = ?1 OR target_id = ?1 \
             ORDER BY strength DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![id, limit as i64], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .filter(|(neighbor, _)| neighbor != id)
            .map(|(neighbor, strength)| Neighbor {
                id: neighbor,
                similarity: (clamp_unit(strength) * 100.0).round(),
            })
            .collect())
    }
}

// ── Write helpers ─────────────────────────────────────────────────────────────

/// Insert or update a record and keep its full-text row in sync.
///
/// An empty `record.id` gets a fresh UUID v7. Returns the record id.
pub fn upsert_record(conn: &Connection, record: &IndexRecord) -> Result<String> {
    let id = if record.id.is_empty() {
        uuid::Uuid::now_v7().to_string()
    } else {
        record.id.clone()
    };
    let tier = if record.importance_tier.is_empty() {
        "normal"
    } else {
        record.importance_tier.as_str()
    };
    let now = chrono::Utc::now().to_rfc3339();

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO memory_index \
         (id, title, body, trigger_phrases, path, folder, importance_weight, importance_tier, \
          archived, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10) \
         ON CONFLICT(id) DO UPDATE SET \
           title = excluded.title, body = excluded.body, \
           trigger_phrases = excluded.trigger_phrases, path = excluded.path, \
           folder = excluded.folder, importance_weight = excluded.importance_weight, \
           importance_tier = excluded.importance_tier, archived = excluded.archived, \
           updated_at = excluded.updated_at",
        params![
            id,
            record.title,
            record.body,
            record.trigger_phrases,
            record.path,
            record.folder,
            record.importance_weight,
            tier,
            record.archived as i64,
            now,
        ],
    )?;

    tx.execute("DELETE FROM memory_fts WHERE id = ?1", params![id])?;
    if !record.archived {
        tx.execute(
            "INSERT INTO memory_fts (title, body, trigger_phrases, path, id) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.title,
                record.body,
                record.trigger_phrases.as_deref().unwrap_or(""),
                record.path,
                id
            ],
        )?;
    }
    tx.commit()?;

    Ok(id)
}

/// Mark a record archived and drop it from full-text search. Returns whether
/// the record existed.
pub fn archive_record(conn: &Connection, id: &str) -> Result<bool> {
    let now = chrono::Utc::now().to_rfc3339();
    let changed = conn.execute(
        "UPDATE memory_index SET archived = 1, updated_at = ?2 WHERE id = ?1",
        params![id, now],
    )?;
    conn.execute("DELETE FROM memory_fts WHERE id = ?1", params![id])?;
    Ok(changed > 0)
}

/// Delete a record, its full-text row and (by cascade) its edges.
pub fn delete_record(conn: &Connection, id: &str) -> Result<bool> {
    conn.execute("DELETE FROM memory_fts WHERE id = ?1", params![id])?;
    let changed = conn.execute("DELETE FROM memory_index WHERE id = ?1", params![id])?;
    Ok(changed > 0)
}

/// Store an edge. The `(source, target, relation)` triple is unique; storing
/// it again updates the strength. Returns the edge id.
pub fn upsert_edge(conn: &Connection, edge: &TypedEdge) -> Result<String> {
    if edge.source_id == edge.target_id {
        bail!("self-referencing edge on {}", edge.source_id);
    }

    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM causal_edges \
             WHERE source_id = ?1 AND target_id = ?2 AND relation = ?3",
            params![edge.source_id, edge.target_id, edge.relation.as_str()],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(id) = existing {
        conn.execute(
            "UPDATE causal_edges SET strength = ?2 WHERE id = ?1",
            params![id, edge.strength],
        )?;
        return Ok(id);
    }

    let id = uuid::Uuid::now_v7().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO causal_edges (id, source_id, target_id, relation, strength, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            id,
            edge.source_id,
            edge.target_id,
            edge.relation.as_str(),
            edge.strength,
            now
        ],
    )?;
    Ok(id)
}

pub fn delete_edge(conn: &Connection, edge: &TypedEdge) -> Result<bool> {
    let changed = conn.execute(
        "DELETE FROM causal_edges WHERE source_id = ?1 AND target_id = ?2 AND relation = ?3",
        params![edge.source_id, edge.target_id, edge.relation.as_str()],
    )?;
    Ok(changed > 0)
}

/// Replace a record's precomputed similarity links.
pub fn set_related_memories(conn: &Connection, id: &str, links: &[Neighbor]) -> Result<()> {
    let stored: Vec<RelatedLink> = links
        .iter()
        .map(|n| RelatedLink {
            id: n.id.clone(),
            similarity: n.similarity,
        })
        .collect();
    let json = serde_json::to_string(&stored)?;
    let changed = conn.execute(
        "UPDATE memory_index SET related_memories = ?2 WHERE id = ?1",
        params![id, json],
    )?;
    if changed == 0 {
        bail!("record not found: {id}");
    }
    Ok(())
}
