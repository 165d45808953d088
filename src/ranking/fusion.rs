//! Reciprocal rank fusion across heterogeneous retrieval channels.
//!
//! Each channel contributes `weight / (k + rank)` (1-indexed rank) for every
//! id it returns; ids found by several channels also earn a convergence bonus
//! of `bonus * (channels - 1)`.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::config::FusionConfig;

pub const DEFAULT_RRF_K: f64 = 60.0;
pub const DEFAULT_CONVERGENCE_BONUS: f64 = 0.10;
pub const DEFAULT_GRAPH_WEIGHT: f64 = 1.5;
pub const DEFAULT_TERM_MATCH_BONUS: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelSource {
    Vector,
    Fts,
    Bm25,
    Graph,
    Degree,
    Keyword,
}

impl ChannelSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vector => "vector",
            Self::Fts => "fts",
            Self::Bm25 => "bm25",
            Self::Graph => "graph",
            Self::Degree => "degree",
            Self::Keyword => "keyword",
        }
    }
}

impl std::fmt::Display for ChannelSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One result as produced by a retrieval channel, in that channel's own terms.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelHit {
    Vector { id: String, similarity: f64 },
    Lexical { id: String, score: f64 },
    FullText { id: String, rank: f64 },
    Degree { id: String, score: f64 },
    Graph { id: String, score: f64 },
    Keyword { id: String },
}

impl ChannelHit {
    pub fn id(&self) -> &str {
        match self {
            Self::Vector { id, .. }
            | Self::Lexical { id, .. }
            | Self::FullText { id, .. }
            | Self::Degree { id, .. }
            | Self::Graph { id, .. }
            | Self::Keyword { id } => id,
        }
    }

    /// The channel's native score, if it has one.
    pub fn raw_score(&self) -> Option<f64> {
        match self {
            Self::Vector { similarity, .. } => Some(*similarity),
            Self::FullText { rank, .. } => Some(*rank),
            Self::Lexical { score, .. }
            | Self::Degree { score, .. }
            | Self::Graph { score, .. } => Some(*score),
            Self::Keyword { .. } => None,
        }
    }
}

/// A ranked list from one channel. `weight: None` uses the channel default.
#[derive(Debug, Clone)]
pub struct RankedList {
    pub source: ChannelSource,
    pub results: Vec<ChannelHit>,
    pub weight: Option<f64>,
}

impl RankedList {
    pub fn new(source: ChannelSource, results: Vec<ChannelHit>) -> Self {
        Self {
            source,
            results,
            weight: None,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }
}

/// A fused result. Built fresh by every fusion call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedItem {
    pub id: String,
    pub total_score: f64,
    pub source_channels: Vec<ChannelSource>,
    /// RRF contribution of each channel.
    pub source_scores: BTreeMap<ChannelSource, f64>,
    /// Native score each channel reported, where it has one.
    pub raw_scores: BTreeMap<ChannelSource, f64>,
    pub convergence_bonus: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub term_matches: Option<usize>,
}

impl RankedItem {
    /// Project a channel hit into an unscored fused item.
    pub fn from_hit(source: ChannelSource, hit: &ChannelHit) -> Self {
        let mut raw_scores = BTreeMap::new();
        if let Some(score) = hit.raw_score() {
            raw_scores.insert(source, score);
        }
        Self {
            id: hit.id().to_string(),
            total_score: 0.0,
            source_channels: Vec::new(),
            source_scores: BTreeMap::new(),
            raw_scores,
            convergence_bonus: 0.0,
            term_matches: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionParams {
    pub k: f64,
    pub convergence_bonus: f64,
    pub graph_weight: f64,
}

impl Default for FusionParams {
    fn default() -> Self {
        Self {
            k: DEFAULT_RRF_K,
            convergence_bonus: DEFAULT_CONVERGENCE_BONUS,
            graph_weight: DEFAULT_GRAPH_WEIGHT,
        }
    }
}

impl From<&FusionConfig> for FusionParams {
    fn from(config: &FusionConfig) -> Self {
        Self {
            k: config.rrf_k,
            convergence_bonus: config.convergence_bonus,
            graph_weight: config.graph_weight_boost,
        }
    }
}

fn sort_by_score(items: &mut [RankedItem]) {
    // Stable: equal scores keep first-appearance order.
    items.sort_by(|a, b| {
        b.total_score
            .partial_cmp(&a.total_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Fuse any number of ranked channel lists.
pub fn fuse_results_multi(lists: &[RankedList], params: &FusionParams) -> Vec<RankedItem> {
    let mut items: Vec<RankedItem> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for list in lists {
        let weight = list.weight.unwrap_or(match list.source {
            ChannelSource::Graph => params.graph_weight,
            _ => 1.0,
        });

        let mut seen_in_list: HashSet<&str> = HashSet::new();
        for (position, hit) in list.results.iter().enumerate() {
            // A repeated id within one list counts once, at its first
            // position; later items keep their own positions.
            if !seen_in_list.insert(hit.id()) {
                continue;
            }
            let rank = position + 1;
            let contribution = weight / (params.k + rank as f64);

            let idx = match positions.get(hit.id()) {
                Some(&idx) => idx,
                None => {
                    positions.insert(hit.id().to_string(), items.len());
                    items.push(RankedItem::from_hit(list.source, hit));
                    items.len() - 1
                }
            };
            let item = &mut items[idx];
            item.total_score += contribution;
            *item.source_scores.entry(list.source).or_insert(0.0) += contribution;
            if let Some(raw) = hit.raw_score() {
                item.raw_scores.entry(list.source).or_insert(raw);
            }
            if !item.source_channels.contains(&list.source) {
                item.source_channels.push(list.source);
            }
        }
    }

    for item in &mut items {
        let channels = item.source_channels.len();
        if channels >= 2 {
            let bonus = params.convergence_bonus * (channels - 1) as f64;
            item.convergence_bonus = bonus;
            item.total_score += bonus;
        }
    }

    sort_by_score(&mut items);
    items
}

/// Two-list convenience: vector results fused with full-text results.
pub fn fuse_pair(vector: &[ChannelHit], fts: &[ChannelHit], k: f64) -> Vec<RankedItem> {
    let lists = [
        RankedList::new(ChannelSource::Vector, vector.to_vec()),
        RankedList::new(ChannelSource::Fts, fts.to_vec()),
    ];
    let params = FusionParams {
        k,
        ..FusionParams::default()
    };
    fuse_results_multi(&lists, &params)
}

/// Lowercased whitespace-separated query terms of at least two characters.
fn query_terms(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split_whitespace()
        .filter(|t| t.chars().count() >= 2)
        .map(str::to_string)
        .collect()
}

/// Reward items whose own text (title, trigger phrases, path) contains query
/// terms verbatim: `bonus` per matching term, then re-sort. `texts` maps id to
/// that searchable text; items without an entry get no bonus.
pub fn apply_term_match_bonus(
    items: Vec<RankedItem>,
    query: &str,
    texts: &HashMap<String, String>,
    bonus: f64,
) -> Vec<RankedItem> {
    let terms = query_terms(query);
    let mut boosted: Vec<RankedItem> = items
        .into_iter()
        .map(|mut item| {
            let haystack = texts
                .get(&item.id)
                .map(|t| t.to_lowercase())
                .unwrap_or_default();
            let matches = terms.iter().filter(|t| haystack.contains(t.as_str())).count();
            item.total_score += matches as f64 * bonus;
            item.term_matches = Some(matches);
            item
        })
        .collect();
    sort_by_score(&mut boosted);
    boosted
}

/// A lazily evaluated, fallible channel.
pub struct ChannelProducer<'a> {
    pub source: ChannelSource,
    pub weight: Option<f64>,
    pub run: Box<dyn FnOnce() -> anyhow::Result<Vec<ChannelHit>> + 'a>,
}

impl<'a> ChannelProducer<'a> {
    pub fn new<F>(source: ChannelSource, run: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<Vec<ChannelHit>> + 'a,
    {
        Self {
            source,
            weight: None,
            run: Box::new(run),
        }
    }

    pub fn with_weight(mut self, weight: Option<f64>) -> Self {
        self.weight = weight;
        self
    }
}

/// Run every producer and fuse the results. A failing channel is logged and
/// contributes an empty list; it never aborts the fusion.
pub fn fuse_channels(producers: Vec<ChannelProducer<'_>>, params: &FusionParams) -> Vec<RankedItem> {
    let lists: Vec<RankedList> = producers
        .into_iter()
        .map(|producer| {
            let results = match (producer.run)() {
                Ok(results) => results,
                Err(e) => {
                    tracing::warn!(channel = %producer.source, error = %e, "channel failed, fusing without it");
                    Vec::new()
                }
            };
            RankedList {
                source: producer.source,
                results,
                weight: producer.weight,
            }
        })
        .collect();
    fuse_results_multi(&lists, params)
}
