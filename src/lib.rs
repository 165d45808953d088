//! Hybrid retrieval ranking for persistent AI-agent memory.
//!
//! Given a query or a conversational prompt, mnemos decides which stored
//! records are most relevant and in what order. Several independent channels
//! each produce a ranked list, and reciprocal rank fusion merges them:
//!
//! | Channel | Source | Signal |
//! |---------|--------|--------|
//! | **bm25** | in-memory inverted index | term frequency, inverse document frequency |
//! | **fts** | SQLite FTS5 | the store's own full-text rank |
//! | **keyword** | trigger phrase cache | whole-phrase hits in the prompt |
//! | **degree** | causal edge graph | typed, strength-weighted centrality |
//! | **vector** | caller supplied | embedding similarity |
//!
//! Fused results can be lifted further by co-activation (records with many
//! strongly similar neighbors) and by conversational signals such as
//! corrections and stated preferences. A complexity tier picks the token
//! budget for the assembled context.
//!
//! # Modules
//!
//! - [`config`]: configuration from TOML files and environment variables
//! - [`db`]: SQLite initialization, schema, migrations and health checks
//! - [`error`]: errors raised at the store boundary
//! - [`store`]: the traits the engine reads through, and their SQLite implementation
//! - [`ranking`]: the individual scoring components
//! - [`engine`]: [`engine::RankingEngine`], which owns the caches and runs hybrid search

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod ranking;
pub mod store;
