//! Graph degree channel.
//!
//! Scores each record by its typed, strength-weighted degree in the causal
//! graph, log-normalized against the graph-wide maximum into a small bounded
//! boost. Scores are cached per node; since normalization depends on the global
//! maximum, any reported edge change also drops the memoized maximum and with
//! it every cached score.

use std::collections::HashMap;

use crate::config::DegreeConfig;
use crate::store::{EdgeSource, TypedEdge};

/// Typed degree of `node_id`: sum of `weight(relation) * strength` over every
/// edge touching it, capped at `max_total`.
pub fn typed_degree(node_id: &str, edges: &[TypedEdge], max_total: f64) -> f64 {
    let raw: f64 = edges
        .iter()
        .filter(|e| e.touches(node_id))
        .map(|e| e.relation.weight() * e.strength)
        .sum();
    raw.min(max_total)
}

/// `min(cap, ln(1 + degree) / ln(1 + max) * cap)`, or 0 when either input is
/// not positive. Equals `cap` exactly when `degree == max`.
pub fn normalize_degree(degree: f64, max_degree: f64, cap: f64) -> f64 {
    if degree <= 0.0 || max_degree <= 0.0 {
        return 0.0;
    }
    let scaled = (1.0 + degree).ln() / (1.0 + max_degree).ln() * cap;
    scaled.min(cap)
}

/// Maximum typed degree across all nodes of `edges`, or `None` when the graph
/// has no positive degree.
pub fn max_typed_degree(edges: &[TypedEdge], max_total: f64) -> Option<f64> {
    let mut totals: HashMap<&str, f64> = HashMap::new();
    for edge in edges {
        let contribution = edge.relation.weight() * edge.strength;
        *totals.entry(edge.source_id.as_str()).or_insert(0.0) += contribution;
        *totals.entry(edge.target_id.as_str()).or_insert(0.0) += contribution;
    }
    totals
        .values()
        .map(|d| d.min(max_total))
        .filter(|d| *d > 0.0)
        .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |m| m.max(d))))
}

pub struct DegreeChannel {
    config: DegreeConfig,
    scores: HashMap<String, f64>,
    max_degree: Option<f64>,
}

impl DegreeChannel {
    pub fn new(config: DegreeConfig) -> Self {
        Self {
            config,
            scores: HashMap::new(),
            max_degree: None,
        }
    }

    /// Graph-wide maximum typed degree, memoized until the next edge change.
    /// An empty graph (or one whose maximum is 0) uses the configured fallback.
    pub fn compute_max_typed_degree(&mut self, source: &dyn EdgeSource) -> f64 {
        if let Some(max) = self.max_degree {
            return max;
        }
        let edges = match source.all_edges() {
            Ok(edges) => edges,
            Err(e) => {
                tracing::warn!(error = %e, "failed to load edges for max degree");
                return self.config.default_max_typed_degree;
            }
        };
        let max = max_typed_degree(&edges, self.config.max_total_degree)
            .unwrap_or(self.config.default_max_typed_degree);
        self.max_degree = Some(max);
        max
    }

    /// Normalized degree score for every id. Constitutional records score 0.
    /// A store failure scores every id 0 and caches nothing.
    pub fn compute_degree_scores(
        &mut self,
        source: &dyn EdgeSource,
        ids: &[String],
    ) -> HashMap<String, f64> {
        let mut result = HashMap::with_capacity(ids.len());
        if ids.is_empty() {
            return result;
        }

        let pending: Vec<String> = ids
            .iter()
            .filter(|id| !self.scores.contains_key(id.as_str()))
            .cloned()
            .collect();

        if !pending.is_empty() {
            if let Err(e) = self.fill_scores(source, &pending) {
                tracing::warn!(error = %e, ids = pending.len(), "degree scoring degraded to zero");
                return ids.iter().map(|id| (id.clone(), 0.0)).collect();
            }
        }

        for id in ids {
            let score = self.scores.get(id).copied().unwrap_or(0.0);
            result.insert(id.clone(), score);
        }
        result
    }

    fn fill_scores(
        &mut self,
        source: &dyn EdgeSource,
        pending: &[String],
    ) -> crate::error::StoreResult<()> {
        let pinned = source.constitutional_ids(pending)?;
        let edges = source.edges_for(pending)?;
        let max = self.compute_max_typed_degree(source);

        for id in pending {
            let score = if pinned.contains(id) {
                0.0
            } else {
                let raw = typed_degree(id, &edges, self.config.max_total_degree);
                normalize_degree(raw, max, self.config.boost_cap)
            };
            self.scores.insert(id.clone(), score);
        }
        Ok(())
    }

    /// Ranked degree list for fusion: positive scores only, highest first,
    /// ties broken by id.
    pub fn degree_channel(&mut self, source: &dyn EdgeSource, ids: &[String]) -> Vec<(String, f64)> {
        let mut ranked: Vec<(String, f64)> = self
            .compute_degree_scores(source, ids)
            .into_iter()
            .filter(|(_, score)| *score > 0.0)
            .collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        ranked
    }

    /// Drop cached scores for `ids` and the memoized maximum.
    pub fn invalidate_nodes(&mut self, ids: &[&str]) {
        for id in ids {
            self.scores.remove(*id);
        }
        self.invalidate_max();
    }

    /// An edge was added, removed or re-weighted. The global maximum may have
    /// moved, so every cached score goes.
    pub fn invalidate_edge(&mut self, edge: &TypedEdge) {
        tracing::debug!(source = %edge.source_id, target = %edge.target_id, "degree cache invalidated");
        self.clear();
    }

    fn invalidate_max(&mut self) {
        if self.max_degree.take().is_some() {
            // Normalized scores were relative to the old maximum.
            self.scores.clear();
        }
    }

    pub fn clear(&mut self) {
        self.scores.clear();
        self.max_degree = None;
    }

    pub fn cached_len(&self) -> usize {
        self.scores.len()
    }

    pub fn cached_max(&self) -> Option<f64> {
        self.max_degree
    }
}
