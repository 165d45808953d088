//! Co-activation: records that are related to many strongly similar records
//! get a boost, damped by the fan effect so hubs do not dominate.

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use crate::config::CoActivationConfig;
use crate::store::{Neighbor, NeighborSource};

pub const DEFAULT_BOOST_FACTOR: f64 = 0.25;
pub const DEFAULT_MAX_RELATED: usize = 5;

/// Branches whose activation falls below this are not explored.
const MIN_ACTIVATION: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoActivationSettings {
    pub enabled: bool,
    pub boost_factor: f64,
    pub max_related: usize,
    pub decay_per_hop: f64,
    pub max_hops: usize,
    pub max_spread_results: usize,
}

impl Default for CoActivationSettings {
    fn default() -> Self {
        Self::from_config(&CoActivationConfig::default(), true)
    }
}

impl CoActivationSettings {
    pub fn from_config(config: &CoActivationConfig, enabled: bool) -> Self {
        Self {
            enabled,
            boost_factor: config.boost_factor,
            max_related: config.max_related,
            decay_per_hop: config.decay_per_hop,
            max_hops: config.max_hops,
            max_spread_results: config.max_spread_results,
        }
    }

    /// `base + max(0, factor * (count / max_related) * (avg / 100) / sqrt(count))`.
    /// Returns `base` unchanged when disabled or nothing is related.
    pub fn boost_score(&self, base: f64, related_count: usize, avg_similarity: f64) -> f64 {
        if !self.enabled || related_count == 0 {
            return base;
        }
        let max_related = self.max_related.max(1) as f64;
        let count = related_count as f64;
        let raw = self.boost_factor * (count / max_related) * (avg_similarity / 100.0);
        let applied = raw / count.max(1.0).sqrt();
        base + applied.max(0.0)
    }
}

/// Boost with default settings.
pub fn boost_score(base: f64, related_count: usize, avg_similarity: f64) -> f64 {
    CoActivationSettings::default().boost_score(base, related_count, avg_similarity)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpreadResult {
    pub id: String,
    pub activation_score: f64,
    pub hop: usize,
    pub path: Vec<String>,
}

/// Max-heap entry: highest activation first, then earliest pushed.
struct Frontier {
    id: String,
    score: f64,
    hop: usize,
    path: Vec<String>,
    seq: usize,
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frontier {}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Similarity links merged with causal neighbors, keeping the higher
/// similarity per id. Lookup failures degrade to no neighbors.
fn merged_neighbors(source: &dyn NeighborSource, id: &str, limit: usize) -> Vec<Neighbor> {
    let similar = source.similarity_neighbors(id, limit).unwrap_or_else(|e| {
        tracing::warn!(id, error = %e, "similarity neighbors unavailable");
        Vec::new()
    });
    let causal = source.causal_neighbors(id, limit).unwrap_or_else(|e| {
        tracing::warn!(id, error = %e, "causal neighbors unavailable");
        Vec::new()
    });

    let mut merged: Vec<Neighbor> = Vec::with_capacity(similar.len() + causal.len());
    for n in similar.into_iter().chain(causal) {
        if n.id == id {
            continue;
        }
        match merged.iter_mut().find(|m| m.id == n.id) {
            Some(existing) if n.similarity > existing.similarity => existing.similarity = n.similarity,
            Some(_) => {}
            None => merged.push(n),
        }
    }
    merged
}

/// Best-first spreading activation from `seeds`. Seeds start at 1.0 and are
/// not reported; each hop multiplies by `decay_per_hop * similarity / 100`.
pub fn spread_activation(
    seeds: &[String],
    source: &dyn NeighborSource,
    settings: &CoActivationSettings,
    max_hops: usize,
    limit: usize,
) -> Vec<SpreadResult> {
    if seeds.is_empty() || limit == 0 {
        return Vec::new();
    }

    let mut visited: HashSet<String> = HashSet::new();
    let mut results: Vec<SpreadResult> = Vec::new();
    let mut queue: BinaryHeap<Frontier> = seeds
        .iter()
        .enumerate()
        .map(|(seq, id)| Frontier {
            id: id.clone(),
            score: 1.0,
            hop: 0,
            path: vec![id.clone()],
            seq,
        })
        .collect();
    let mut next_seq = seeds.len();

    while results.len() < limit {
        let Some(current) = queue.pop() else {
            break;
        };
        if !visited.insert(current.id.clone()) {
            continue;
        }

        if current.hop > 0 {
            results.push(SpreadResult {
                id: current.id.clone(),
                activation_score: (current.score * 1000.0).round() / 1000.0,
                hop: current.hop,
                path: current.path.clone(),
            });
        }

        if current.hop >= max_hops {
            continue;
        }

        for neighbor in merged_neighbors(source, &current.id, settings.max_related) {
            if visited.contains(&neighbor.id) {
                continue;
            }
            let decayed = current.score * settings.decay_per_hop * (neighbor.similarity / 100.0);
            if decayed < MIN_ACTIVATION {
                continue;
            }
            let mut path = current.path.clone();
            path.push(neighbor.id.clone());
            queue.push(Frontier {
                id: neighbor.id,
                score: decayed,
                hop: current.hop + 1,
                path,
                seq: next_seq,
            });
            next_seq += 1;
        }
    }

    results.sort_by(|a, b| {
        b.activation_score
            .partial_cmp(&a.activation_score)
            .unwrap_or(Ordering::Equal)
    });
    tracing::debug!(seeds = seeds.len(), activated = results.len(), "spread activation");
    results
}
