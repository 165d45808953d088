use anyhow::Result;
use std::collections::HashMap;

use mnemos::config::MnemosConfig;
use mnemos::engine::SearchRequest;
use mnemos::store::{RecordSource, SqliteStore};

/// Run a fused search from the terminal.
pub fn search(config: &MnemosConfig, query: &str, limit: usize, json: bool) -> Result<()> {
    let conn = super::open(config)?;
    let store = SqliteStore::new(&conn);
    let engine = super::warm_engine(config, &conn);

    let response = engine.hybrid_search(&store, &SearchRequest::new(query, limit));

    if json {
        return super::print_json(&response);
    }

    if response.results.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    let ids: Vec<String> = response.results.iter().map(|r| r.id.clone()).collect();
    let titles: HashMap<String, String> = store
        .records_by_ids(&ids)?
        .into_iter()
        .map(|r| (r.id, r.title))
        .collect();

    println!(
        "Found {} result(s) (tier: {}, budget: {} tokens)\n",
        response.results.len(),
        response.classification.tier,
        response.budget.budget
    );

    for (i, item) in response.results.iter().enumerate() {
        let channels: Vec<&str> = item.source_channels.iter().map(|c| c.as_str()).collect();
        println!(
            "  {}. {} (score: {:.4}, channels: {})",
            i + 1,
            item.id,
            item.total_score,
            channels.join("+"),
        );
        if let Some(title) = titles.get(&item.id) {
            println!("     {}", super::preview(title, 120));
        }
    }

    if !response.co_activated.is_empty() {
        println!("\nAlso related:");
        for related in &response.co_activated {
            println!(
                "  {} (activation: {:.3}, via {})",
                related.id,
                related.activation_score,
                related.path.join(" -> ")
            );
        }
    }

    Ok(())
}
