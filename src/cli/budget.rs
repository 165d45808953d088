use anyhow::Result;
use serde::Serialize;

use mnemos::config::MnemosConfig;
use mnemos::engine::RankingEngine;
use mnemos::ranking::budget::{Classification, TokenBudget};
use mnemos::store::SqliteStore;

#[derive(Serialize)]
struct BudgetReport {
    classification: Classification,
    budget: TokenBudget,
}

pub fn budget(config: &MnemosConfig, query: &str, json: bool) -> Result<()> {
    let conn = super::open(config)?;
    let store = SqliteStore::new(&conn);
    let engine = RankingEngine::new(config);

    let classification = engine.classify_query(&store, query);
    let budget = engine.get_dynamic_token_budget(classification.tier, None);

    if json {
        return super::print_json(&BudgetReport {
            classification,
            budget,
        });
    }

    println!("Tier:        {} ({:?} confidence)", classification.tier, classification.confidence);
    println!("Terms:       {}", classification.features.term_count);
    println!("Trigger hit: {}", classification.features.has_trigger_match);
    println!(
        "Budget:      {} tokens{}",
        budget.budget,
        if budget.applied { "" } else { " (flat default)" }
    );
    Ok(())
}
