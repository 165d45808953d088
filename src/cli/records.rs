use anyhow::{Context, Result};

use mnemos::config::MnemosConfig;
use mnemos::store::sqlite::{upsert_edge, upsert_record};
use mnemos::store::{IndexRecord, Relation, TypedEdge};

pub struct AddInput {
    pub id: Option<String>,
    pub title: String,
    pub body: String,
    pub triggers: Vec<String>,
    pub path: String,
    pub importance: Option<f64>,
    pub tier: String,
}

pub fn add(config: &MnemosConfig, input: AddInput) -> Result<()> {
    let conn = super::open(config)?;

    let trigger_phrases = if input.triggers.is_empty() {
        None
    } else {
        Some(serde_json::to_string(&input.triggers)?)
    };
    let folder = std::path::Path::new(&input.path)
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();

    let record = IndexRecord {
        id: input.id.unwrap_or_default(),
        title: input.title,
        body: input.body,
        trigger_phrases,
        path: input.path,
        folder,
        importance_weight: input.importance,
        importance_tier: input.tier,
        archived: false,
    };
    let id = upsert_record(&conn, &record)?;
    println!("{id}");
    Ok(())
}

pub fn relate(
    config: &MnemosConfig,
    source: &str,
    target: &str,
    relation: &str,
    strength: f64,
) -> Result<()> {
    let relation: Relation = relation
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))
        .context("invalid --relation")?;
    let conn = super::open(config)?;
    let edge = TypedEdge::new(source, target, relation, strength);
    let id = upsert_edge(&conn, &edge)?;
    println!("{id}");
    Ok(())
}
