use anyhow::Result;
use serde::Serialize;

use mnemos::config::{FeatureFlags, MnemosConfig};
use mnemos::ranking::bm25::Bm25Stats;
use mnemos::ranking::triggers::TriggerCacheStats;
use mnemos::store::SqliteStore;

#[derive(Serialize)]
struct StatsReport {
    lexical: Bm25Stats,
    triggers: TriggerCacheStats,
    features: FeatureFlags,
}

/// Display index and cache statistics in the terminal.
pub fn stats(config: &MnemosConfig, json: bool) -> Result<()> {
    let conn = super::open(config)?;
    let store = SqliteStore::new(&conn);
    let engine = super::warm_engine(config, &conn);
    engine.trigger_phrases(&store);

    let report = StatsReport {
        lexical: engine.lexical_stats(),
        triggers: engine.trigger_cache_stats(),
        features: engine.flags(),
    };

    if json {
        return super::print_json(&report);
    }

    println!("Ranking Statistics");
    println!("{}", "=".repeat(40));
    println!("Lexical index:");
    println!("  Documents:           {}", report.lexical.document_count);
    println!("  Distinct terms:      {}", report.lexical.term_count);
    println!("  Avg doc length:      {:.1}", report.lexical.avg_doc_length);
    println!();
    println!("Trigger cache:");
    println!("  Phrases:             {}", report.triggers.size);
    println!(
        "  Compiled patterns:   {}/{}",
        report.triggers.pattern_cache_size, report.triggers.pattern_cache_capacity
    );
    println!();

    println!("Features:");
    let flags = [
        ("lexical_index", report.features.lexical_index),
        ("signal_vocab", report.features.signal_vocab),
        ("dynamic_token_budget", report.features.dynamic_token_budget),
        ("co_activation", report.features.co_activation),
        ("complexity_router", report.features.complexity_router),
    ];
    for (name, on) in flags {
        println!("  {:<22} {}", name, if on { "on" } else { "off" });
    }

    Ok(())
}
