use anyhow::Result;

use mnemos::config::MnemosConfig;
use mnemos::engine::RankingEngine;
use mnemos::store::SqliteStore;

/// Show which records a prompt's trigger phrases surface.
pub fn triggers(config: &MnemosConfig, prompt: &str, limit: Option<usize>, json: bool) -> Result<()> {
    let conn = super::open(config)?;
    let store = SqliteStore::new(&conn);
    let engine = RankingEngine::new(config);

    let report = engine.match_with_stats(&store, prompt, limit);

    if json {
        return super::print_json(&report);
    }

    if report.matches.is_empty() {
        println!("No trigger matches ({} phrases cached).", report.stats.cache_size);
    } else {
        for m in &report.matches {
            println!(
                "  {} [{}] weight {:.2}: {}",
                m.memory_id,
                m.path,
                m.importance_weight,
                m.matched_phrases.join(", ")
            );
        }
    }

    if let Some(signals) = &report.stats.signals {
        for signal in signals {
            println!(
                "  signal {} (+{:.2}): {}",
                signal.category,
                signal.boost,
                signal.keywords.join(", ")
            );
        }
    }
    println!("Matched in {} ms", report.stats.match_time_ms);

    Ok(())
}
