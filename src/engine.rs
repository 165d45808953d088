//! The long-lived ranking context.
//!
//! [`RankingEngine`] owns the lexical index, the trigger phrase cache and the
//! degree cache, together with the resolved configuration. Build one at
//! startup and share it by reference; the store is passed into each call.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::config::{FeatureFlags, MnemosConfig};
use crate::ranking::bm25::{Bm25Hit, Bm25Index, Bm25Params, Bm25Stats};
use crate::ranking::budget::{
    classify_query_complexity, BudgetAllocator, Classification, ComplexityTier, TierBudgets,
    TokenBudget,
};
use crate::ranking::co_activation::{spread_activation, CoActivationSettings, SpreadResult};
use crate::ranking::degree::DegreeChannel;
use crate::ranking::fusion::{
    apply_term_match_bonus, fuse_channels, fuse_results_multi, ChannelHit, ChannelProducer,
    ChannelSource, FusionParams, RankedItem, RankedList,
};
use crate::ranking::signals::{self, Signal};
use crate::ranking::triggers::{TriggerCacheStats, TriggerMatch, TriggerMatchReport, TriggerMatcher};
use crate::store::{EdgeSource, MemoryStore, NeighborSource, RecordSource, TypedEdge};

/// Seeds taken from the top of the fused list for spreading activation.
const SPREAD_SEEDS: usize = 3;

/// Inputs to [`RankingEngine::hybrid_search`].
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub limit: usize,
    /// Vector-channel results computed by the caller, best first, with
    /// similarity on a 0–100 scale.
    pub vector_results: Vec<(String, f64)>,
    /// Per-channel weight overrides.
    pub weights: HashMap<ChannelSource, f64>,
    pub include_degree: bool,
    pub include_triggers: bool,
    pub apply_term_bonus: bool,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, limit: usize) -> Self {
        Self {
            query: query.into(),
            limit,
            vector_results: Vec::new(),
            weights: HashMap::new(),
            include_degree: true,
            include_triggers: true,
            apply_term_bonus: true,
        }
    }

    pub fn with_vector_results(mut self, results: Vec<(String, f64)>) -> Self {
        self.vector_results = results;
        self
    }

    pub fn with_weight(mut self, source: ChannelSource, weight: f64) -> Self {
        self.weights.insert(source, weight);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub results: Vec<RankedItem>,
    /// Records reached by spreading activation from the top results that
    /// were not already in `results`.
    pub co_activated: Vec<SpreadResult>,
    pub classification: Classification,
    pub budget: TokenBudget,
    pub signals: Vec<Signal>,
}

pub struct RankingEngine {
    flags: FeatureFlags,
    candidate_limit: usize,
    trigger_limit: usize,
    degree_weight: f64,
    term_match_bonus: f64,
    fusion: FusionParams,
    co_activation: CoActivationSettings,
    budget: BudgetAllocator,
    lexical: RwLock<Bm25Index>,
    triggers: Mutex<TriggerMatcher>,
    degree: Mutex<DegreeChannel>,
}

// Every cache here is rebuildable from the store, so a poisoned lock is
// recovered rather than surfaced.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(l: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    l.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(l: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    l.write().unwrap_or_else(PoisonError::into_inner)
}

impl RankingEngine {
    pub fn new(config: &MnemosConfig) -> Self {
        let flags = config.features;
        Self {
            flags,
            candidate_limit: 50,
            trigger_limit: config.triggers.default_limit,
            degree_weight: config.fusion.degree_weight,
            term_match_bonus: config.fusion.term_match_bonus,
            fusion: FusionParams::from(&config.fusion),
            co_activation: CoActivationSettings::from_config(&config.co_activation, flags.co_activation),
            budget: BudgetAllocator::from_config(&config.budget, flags.dynamic_token_budget),
            lexical: RwLock::new(Bm25Index::new(Bm25Params {
                k1: config.lexical.k1,
                b: config.lexical.b,
            })),
            triggers: Mutex::new(TriggerMatcher::new(config.triggers.clone(), flags.signal_vocab)),
            degree: Mutex::new(DegreeChannel::new(config.degree.clone())),
        }
    }

    pub fn flags(&self) -> FeatureFlags {
        self.flags
    }

    /// Number of candidates each internal channel contributes to a hybrid search.
    pub fn with_candidate_limit(mut self, limit: usize) -> Self {
        self.candidate_limit = limit.max(1);
        self
    }

    // ── Lexical index ────────────────────────────────────────────────────────

    pub fn search(&self, query: &str, limit: usize) -> Vec<Bm25Hit> {
        if !self.flags.lexical_index {
            return Vec::new();
        }
        read(&self.lexical).search(query, limit)
    }

    pub fn add_document(&self, id: &str, text: &str) {
        if self.flags.lexical_index {
            write(&self.lexical).add_document(id, text);
        }
    }

    pub fn remove_document(&self, id: &str) -> bool {
        if !self.flags.lexical_index {
            return false;
        }
        write(&self.lexical).remove_document(id)
    }

    pub fn rebuild_from_database(&self, source: &dyn RecordSource) -> usize {
        if !self.flags.lexical_index {
            tracing::debug!("lexical index disabled, skipping rebuild");
            return 0;
        }
        write(&self.lexical).rebuild_from_database(source)
    }

    pub fn lexical_stats(&self) -> Bm25Stats {
        read(&self.lexical).stats()
    }

    // ── Triggers and signals ─────────────────────────────────────────────────

    pub fn match_trigger_phrases(
        &self,
        source: &dyn RecordSource,
        prompt: &str,
        limit: Option<usize>,
    ) -> Vec<TriggerMatch> {
        let limit = limit.unwrap_or(self.trigger_limit);
        lock(&self.triggers).match_trigger_phrases(source, prompt, limit)
    }

    pub fn match_with_stats(
        &self,
        source: &dyn RecordSource,
        prompt: &str,
        limit: Option<usize>,
    ) -> TriggerMatchReport {
        let limit = limit.unwrap_or(self.trigger_limit);
        lock(&self.triggers).match_with_stats(source, prompt, limit)
    }

    pub fn trigger_phrases(&self, source: &dyn RecordSource) -> Vec<String> {
        lock(&self.triggers).all_phrases(source)
    }

    pub fn trigger_cache_stats(&self) -> TriggerCacheStats {
        lock(&self.triggers).cache_stats()
    }

    /// Detected signals, or nothing with the signal vocabulary disabled.
    pub fn detect_signals(&self, prompt: &str) -> Vec<Signal> {
        if !self.flags.signal_vocab {
            return Vec::new();
        }
        signals::detect_signals(prompt)
    }

    pub fn apply_signal_boosts(&self, matches: &[TriggerMatch], signals: &[Signal]) -> Vec<TriggerMatch> {
        if !self.flags.signal_vocab {
            return matches.to_vec();
        }
        signals::apply_signal_boosts(matches, signals)
    }

    // ── Graph degree ─────────────────────────────────────────────────────────

    pub fn compute_degree_scores(&self, source: &dyn EdgeSource, ids: &[String]) -> HashMap<String, f64> {
        lock(&self.degree).compute_degree_scores(source, ids)
    }

    pub fn degree_channel(&self, source: &dyn EdgeSource, ids: &[String]) -> Vec<(String, f64)> {
        lock(&self.degree).degree_channel(source, ids)
    }

    // ── Fusion, co-activation, budgets ───────────────────────────────────────

    pub fn fuse_results_multi(&self, lists: &[RankedList]) -> Vec<RankedItem> {
        fuse_results_multi(lists, &self.fusion)
    }

    pub fn boost_score(&self, base: f64, related_count: usize, avg_similarity: f64) -> f64 {
        self.co_activation.boost_score(base, related_count, avg_similarity)
    }

    pub fn spread_activation(&self, source: &dyn NeighborSource, seeds: &[String]) -> Vec<SpreadResult> {
        if !self.co_activation.enabled {
            return Vec::new();
        }
        spread_activation(
            seeds,
            source,
            &self.co_activation,
            self.co_activation.max_hops,
            self.co_activation.max_spread_results,
        )
    }

    pub fn get_dynamic_token_budget(
        &self,
        tier: ComplexityTier,
        override_tiers: Option<&TierBudgets>,
    ) -> TokenBudget {
        self.budget.get_dynamic_token_budget(tier, override_tiers)
    }

    pub fn classify_query(&self, source: &dyn RecordSource, query: &str) -> Classification {
        let phrases = if self.flags.complexity_router {
            self.trigger_phrases(source)
        } else {
            Vec::new()
        };
        classify_query_complexity(query, &phrases, self.flags.complexity_router)
    }

    // ── Invalidation ─────────────────────────────────────────────────────────

    /// Re-read one record after a write: re-index (or drop, if archived or
    /// gone), reset the trigger cache and forget its degree score.
    pub fn on_record_changed(&self, source: &dyn RecordSource, id: &str) {
        let ids = [id.to_string()];
        match source.records_by_ids(&ids) {
            Ok(rows) => match rows.into_iter().find(|r| r.id == id) {
                Some(row) => {
                    let text = row.lexical_text();
                    if text.trim().is_empty() {
                        self.remove_document(id);
                    } else {
                        self.add_document(id, &text);
                    }
                }
                None => {
                    self.remove_document(id);
                }
            },
            Err(e) => {
                tracing::warn!(id, error = %e, "could not reload changed record, dropping it from the index");
                self.remove_document(id);
            }
        }
        lock(&self.triggers).clear_cache();
        lock(&self.degree).invalidate_nodes(&[id]);
    }

    pub fn on_record_removed(&self, id: &str) {
        self.remove_document(id);
        lock(&self.triggers).clear_cache();
        lock(&self.degree).invalidate_nodes(&[id]);
    }

    pub fn on_edge_changed(&self, edge: &TypedEdge) {
        lock(&self.degree).invalidate_edge(edge);
    }

    pub fn invalidate_all(&self) {
        write(&self.lexical).clear();
        lock(&self.triggers).clear_cache();
        lock(&self.degree).clear();
        tracing::info!("ranking caches invalidated");
    }

    // ── Orchestration ────────────────────────────────────────────────────────

    /// Fuse every available channel for `request.query`, then apply the term
    /// match bonus and co-activation boosts and size the token budget.
    /// Channel failures degrade to empty lists; this never fails.
    pub fn hybrid_search<S: MemoryStore>(&self, store: &S, request: &SearchRequest) -> SearchResponse {
        let query = request.query.trim();
        let classification = self.classify_query(store, query);
        let budget = self.get_dynamic_token_budget(classification.tier, None);
        let signals = self.detect_signals(query);

        if query.is_empty() || request.limit == 0 {
            return SearchResponse {
                results: Vec::new(),
                co_activated: Vec::new(),
                classification,
                budget,
                signals,
            };
        }

        let candidates = self.candidate_limit.max(request.limit);
        let weight = |source: ChannelSource| request.weights.get(&source).copied();

        let vector: Vec<ChannelHit> = request
            .vector_results
            .iter()
            .map(|(id, similarity)| ChannelHit::Vector {
                id: id.clone(),
                similarity: *similarity,
            })
            .collect();
        let lexical: Vec<ChannelHit> = self
            .search(query, candidates)
            .into_iter()
            .map(|hit| ChannelHit::Lexical {
                id: hit.id,
                score: hit.score,
            })
            .collect();
        let full_text: Vec<ChannelHit> = match store.full_text_search(query, candidates) {
            Ok(rows) => rows
                .into_iter()
                .map(|(id, rank)| ChannelHit::FullText { id, rank })
                .collect(),
            Err(e) => {
                tracing::warn!(channel = "fts", error = %e, "channel failed, fusing without it");
                Vec::new()
            }
        };
        let keyword: Vec<ChannelHit> = if request.include_triggers {
            self.match_trigger_phrases(store, query, Some(candidates))
                .into_iter()
                .map(|m| ChannelHit::Keyword { id: m.memory_id })
                .collect()
        } else {
            Vec::new()
        };

        // Degree ranks the candidates the other channels surfaced.
        let degree: Vec<ChannelHit> = if request.include_degree {
            let mut seen = HashSet::new();
            let ids: Vec<String> = vector
                .iter()
                .chain(&lexical)
                .chain(&full_text)
                .chain(&keyword)
                .map(|hit| hit.id().to_string())
                .filter(|id| seen.insert(id.clone()))
                .collect();
            self.degree_channel(store, &ids)
                .into_iter()
                .map(|(id, score)| ChannelHit::Degree { id, score })
                .collect()
        } else {
            Vec::new()
        };

        let producers = vec![
            ChannelProducer::new(ChannelSource::Vector, move || Ok(vector))
                .with_weight(weight(ChannelSource::Vector)),
            ChannelProducer::new(ChannelSource::Bm25, move || Ok(lexical))
                .with_weight(weight(ChannelSource::Bm25)),
            ChannelProducer::new(ChannelSource::Fts, move || Ok(full_text))
                .with_weight(weight(ChannelSource::Fts)),
            ChannelProducer::new(ChannelSource::Keyword, move || Ok(keyword))
                .with_weight(weight(ChannelSource::Keyword)),
            ChannelProducer::new(ChannelSource::Degree, move || Ok(degree))
                .with_weight(weight(ChannelSource::Degree).or(Some(self.degree_weight))),
        ];
        let mut results = fuse_channels(producers, &self.fusion);

        if request.apply_term_bonus && !results.is_empty() {
            let texts = self.term_texts(store, &results);
            results = apply_term_match_bonus(results, query, &texts, self.term_match_bonus);
        }

        let co_activated = if self.co_activation.enabled {
            self.apply_co_activation(store, &mut results, request.limit)
        } else {
            Vec::new()
        };

        results.truncate(request.limit);
        tracing::debug!(
            query_len = query.len(),
            results = results.len(),
            co_activated = co_activated.len(),
            tier = %classification.tier,
            "hybrid search"
        );

        SearchResponse {
            results,
            co_activated,
            classification,
            budget,
            signals,
        }
    }

    /// Title, trigger phrases and path of each fused record.
    fn term_texts(&self, store: &dyn RecordSource, items: &[RankedItem]) -> HashMap<String, String> {
        let ids: Vec<String> = items.iter().map(|i| i.id.clone()).collect();
        match store.records_by_ids(&ids) {
            Ok(rows) => rows
                .into_iter()
                .map(|r| {
                    let text = format!(
                        "{} {} {}",
                        r.title,
                        r.trigger_phrases.as_deref().unwrap_or(""),
                        r.path
                    );
                    (r.id, text)
                })
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "term match bonus skipped");
                HashMap::new()
            }
        }
    }

    /// Boost the top `limit` results by their similarity links, re-sort, and
    /// return the records spreading activation reaches beyond them.
    fn apply_co_activation(
        &self,
        store: &dyn NeighborSource,
        results: &mut [RankedItem],
        limit: usize,
    ) -> Vec<SpreadResult> {
        let top = limit.min(results.len());
        for item in results[..top].iter_mut() {
            let related = match store.similarity_neighbors(&item.id, self.co_activation.max_related) {
                Ok(related) => related,
                Err(e) => {
                    tracing::warn!(id = %item.id, error = %e, "co-activation lookup failed");
                    continue;
                }
            };
            if related.is_empty() {
                continue;
            }
            let avg = related.iter().map(|n| n.similarity).sum::<f64>() / related.len() as f64;
            item.total_score = self.boost_score(item.total_score, related.len(), avg);
        }
        results.sort_by(|a, b| {
            b.total_score
                .partial_cmp(&a.total_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let seeds: Vec<String> = results.iter().take(SPREAD_SEEDS).map(|i| i.id.clone()).collect();
        let shown: HashSet<&str> = results.iter().take(limit).map(|i| i.id.as_str()).collect();
        self.spread_activation(store, &seeds)
            .into_iter()
            .filter(|r| !shown.contains(r.id.as_str()))
            .collect()
    }
}
