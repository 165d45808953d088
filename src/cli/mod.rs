pub mod budget;
pub mod degree;
pub mod doctor;
pub mod records;
pub mod search;
pub mod stats;
pub mod triggers;

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;

use mnemos::config::MnemosConfig;
use mnemos::engine::RankingEngine;
use mnemos::store::SqliteStore;

/// Open the configured database.
pub fn open(config: &MnemosConfig) -> Result<Connection> {
    let db_path = config.resolved_db_path();
    mnemos::db::open_database(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))
}

/// Build an engine with its lexical index populated from `conn`.
pub fn warm_engine(config: &MnemosConfig, conn: &Connection) -> RankingEngine {
    let engine = RankingEngine::new(config);
    engine.rebuild_from_database(&SqliteStore::new(conn));
    engine
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{cut}...")
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_respects_char_boundaries() {
        assert_eq!(preview("héllo wörld", 5), "héllo...");
        assert_eq!(preview("short", 10), "short");
    }
}
