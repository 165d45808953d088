use anyhow::Result;

use mnemos::config::MnemosConfig;
use mnemos::engine::RankingEngine;
use mnemos::store::SqliteStore;

pub fn degree(config: &MnemosConfig, ids: &[String], json: bool) -> Result<()> {
    let conn = super::open(config)?;
    let store = SqliteStore::new(&conn);
    let engine = RankingEngine::new(config);

    let scores = engine.compute_degree_scores(&store, ids);

    if json {
        return super::print_json(&scores);
    }
    for id in ids {
        let score = scores.get(id).copied().unwrap_or(0.0);
        println!("  {:<40} {:.4}", id, score);
    }
    Ok(())
}
