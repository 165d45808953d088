//! Boundary between the ranking engine and the persistent record store.
//!
//! The engine only ever reads through these traits. [`sqlite`] provides the
//! SQLite-backed implementation used by the CLI and the integration tests.

pub mod sqlite;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::StoreResult;

pub use sqlite::SqliteStore;

/// One row of the record index as seen by the lexical and trigger channels.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndexRecord {
    pub id: String,
    pub title: String,
    pub body: String,
    /// Raw JSON array text, exactly as stored. Parsed by the trigger matcher.
    pub trigger_phrases: Option<String>,
    pub path: String,
    pub folder: String,
    pub importance_weight: Option<f64>,
    pub importance_tier: String,
    pub archived: bool,
}

impl IndexRecord {
    /// Text indexed by the lexical channel: title, body, phrases and path
    /// joined by single spaces, skipping empty parts.
    pub fn lexical_text(&self) -> String {
        [
            self.title.as_str(),
            self.body.as_str(),
            self.trigger_phrases.as_deref().unwrap_or(""),
            self.path.as_str(),
        ]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
    }
}

/// Typed causal relation between two records, ordered strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    Caused,
    DerivedFrom,
    Enabled,
    Contradicts,
    Supersedes,
    Supports,
}

impl Relation {
    pub const ALL: [Relation; 6] = [
        Self::Caused,
        Self::DerivedFrom,
        Self::Enabled,
        Self::Contradicts,
        Self::Supersedes,
        Self::Supports,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Caused => "caused",
            Self::DerivedFrom => "derived_from",
            Self::Enabled => "enabled",
            Self::Contradicts => "contradicts",
            Self::Supersedes => "supersedes",
            Self::Supports => "supports",
        }
    }

    /// Contribution of one edge of this type to typed degree.
    pub fn weight(&self) -> f64 {
        match self {
            Self::Caused => 1.0,
            Self::DerivedFrom => 0.9,
            Self::Enabled => 0.8,
            Self::Contradicts => 0.7,
            Self::Supersedes => 0.6,
            Self::Supports => 0.5,
        }
    }
}

impl std::fmt::Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Relation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "caused" => Ok(Self::Caused),
            "derived_from" => Ok(Self::DerivedFrom),
            "enabled" => Ok(Self::Enabled),
            "contradicts" => Ok(Self::Contradicts),
            "supersedes" => Ok(Self::Supersedes),
            "supports" => Ok(Self::Supports),
            _ => Err(format!("unknown relation: {s}")),
        }
    }
}

/// Weight of a raw relation name; unrecognized names weigh nothing.
pub fn relation_weight(name: &str) -> f64 {
    name.parse::<Relation>().map(|r| r.weight()).unwrap_or(0.0)
}

/// Directed, weighted edge of the causal graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypedEdge {
    pub source_id: String,
    pub target_id: String,
    pub relation: Relation,
    /// Always within `[0, 1]`.
    pub strength: f64,
}

impl TypedEdge {
    /// Build an edge, clamping `strength` into `[0, 1]` (NaN becomes 0).
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        relation: Relation,
        strength: f64,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            relation,
            strength: clamp_unit(strength),
        }
    }

    pub fn touches(&self, id: &str) -> bool {
        self.source_id == id || self.target_id == id
    }
}

pub(crate) fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// A neighbor reached from a record, with similarity on a 0–100 scale.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub id: String,
    pub similarity: f64,
}

/// Records for the lexical index and the trigger cache.
pub trait RecordSource {
    /// Every non-archived record.
    fn lexical_rows(&self) -> StoreResult<Vec<IndexRecord>>;

    /// Every record whose trigger phrase list is present and non-empty.
    fn trigger_rows(&self) -> StoreResult<Vec<IndexRecord>>;

    /// The non-archived records among `ids`, in no particular order.
    fn records_by_ids(&self, ids: &[String]) -> StoreResult<Vec<IndexRecord>> {
        let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
        Ok(self
            .lexical_rows()?
            .into_iter()
            .filter(|r| wanted.contains(r.id.as_str()))
            .collect())
    }
}

/// Read access to the causal edge graph.
pub trait EdgeSource {
    /// Edges with either endpoint in `ids`.
    fn edges_for(&self, ids: &[String]) -> StoreResult<Vec<TypedEdge>>;

    fn all_edges(&self) -> StoreResult<Vec<TypedEdge>>;

    /// The subset of `ids` pinned at the constitutional tier.
    fn constitutional_ids(&self, ids: &[String]) -> StoreResult<HashSet<String>>;
}

/// The store's own full-text channel. Results are `(id, score)` with higher
/// scores better.
pub trait FullTextSource {
    fn full_text_search(&self, query: &str, limit: usize) -> StoreResult<Vec<(String, f64)>>;
}

/// Neighbor lookups used by spreading activation.
pub trait NeighborSource {
    /// Precomputed similarity links of a record.
    fn similarity_neighbors(&self, id: &str, limit: usize) -> StoreResult<Vec<Neighbor>>;

    /// Causal-graph neighbors, strongest edges first, with strength mapped to
    /// similarity as `round(strength * 100)`.
    fn causal_neighbors(&self, id: &str, limit: usize) -> StoreResult<Vec<Neighbor>>;
}

/// Everything the hybrid search needs from a store.
pub trait MemoryStore: RecordSource + EdgeSource + FullTextSource + NeighborSource {}

impl<T: RecordSource + EdgeSource + FullTextSource + NeighborSource> MemoryStore for T {}
