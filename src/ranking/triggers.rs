//! Trigger phrase matching.
//!
//! Records carry short trigger phrases (a JSON array of strings). The matcher
//! flattens every phrase into a cache entry with a compiled boundary pattern,
//! then tests prompts against the whole cache. The cache is rebuilt in bulk on
//! first use or once its TTL expires, and is only ever invalidated wholesale.

use serde::Serialize;
use std::collections::HashSet;
use std::time::{Duration, Instant};
use unicode_normalization::UnicodeNormalization;

use super::pattern_cache::PatternCache;
use super::signals::{apply_signal_boosts, detect_signals, Signal};
use crate::config::TriggerConfig;
use crate::store::{IndexRecord, RecordSource};

/// Records without a usable importance weight rank as average.
pub const DEFAULT_IMPORTANCE_WEIGHT: f64 = 0.5;

/// NFC-compose and lowercase. Accents are kept.
pub fn normalize_text(text: &str) -> String {
    text.nfc().collect::<String>().to_lowercase()
}

#[derive(Debug, Clone)]
struct TriggerEntry {
    phrase: String,
    pattern: regex::Regex,
    memory_id: String,
    folder: String,
    path: String,
    title: String,
    importance_weight: f64,
}

/// All phrases of one record that matched a prompt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggerMatch {
    pub memory_id: String,
    pub folder: String,
    pub path: String,
    pub title: String,
    pub importance_weight: f64,
    pub matched_phrases: Vec<String>,
}

/// A record registered under a given phrase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhraseOwner {
    pub memory_id: String,
    pub folder: String,
    pub path: String,
    pub title: String,
    pub importance_weight: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TriggerMatchStats {
    pub prompt_length: usize,
    pub cache_size: usize,
    pub match_count: usize,
    pub total_matched_phrases: usize,
    pub match_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signals: Option<Vec<Signal>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TriggerMatchReport {
    pub matches: Vec<TriggerMatch>,
    pub stats: TriggerMatchStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct TriggerCacheStats {
    pub size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_ms: Option<u64>,
    pub pattern_cache_size: usize,
    pub pattern_cache_capacity: usize,
}

pub struct TriggerMatcher {
    config: TriggerConfig,
    signal_vocab: bool,
    entries: Option<Vec<TriggerEntry>>,
    loaded_at: Option<Instant>,
    patterns: PatternCache,
}

impl TriggerMatcher {
    pub fn new(config: TriggerConfig, signal_vocab: bool) -> Self {
        let patterns = PatternCache::new(config.pattern_cache_capacity);
        Self {
            config,
            signal_vocab,
            entries: None,
            loaded_at: None,
            patterns,
        }
    }

    fn ttl(&self) -> Duration {
        Duration::from_secs(self.config.cache_ttl_secs)
    }

    fn is_fresh(&self) -> bool {
        match (&self.entries, self.loaded_at) {
            (Some(_), Some(at)) => at.elapsed() < self.ttl(),
            _ => false,
        }
    }

    /// Make sure the phrase cache is populated and within its TTL. Returns the
    /// number of cached phrase entries. A store failure leaves the cache empty
    /// so the next call retries.
    pub fn ensure_loaded(&mut self, source: &dyn RecordSource) -> usize {
        if self.is_fresh() {
            return self.cache_len();
        }

        let rows = match source.trigger_rows() {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(error = %e, "trigger cache load failed");
                self.entries = None;
                self.loaded_at = None;
                return 0;
            }
        };

        let mut entries = Vec::new();
        for row in &rows {
            self.flatten_record(row, &mut entries);
        }

        tracing::debug!(records = rows.len(), phrases = entries.len(), "trigger cache loaded");
        let len = entries.len();
        self.entries = Some(entries);
        self.loaded_at = Some(Instant::now());
        len
    }

    fn flatten_record(&mut self, row: &IndexRecord, out: &mut Vec<TriggerEntry>) {
        let Some(raw) = row.trigger_phrases.as_deref() else {
            return;
        };
        let phrases = match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(serde_json::Value::Array(items)) => items,
            Ok(_) => {
                tracing::debug!(id = %row.id, "trigger phrases are not an array, skipping");
                return;
            }
            Err(e) => {
                tracing::debug!(id = %row.id, error = %e, "invalid trigger phrase JSON, skipping");
                return;
            }
        };

        let importance_weight = match row.importance_weight {
            Some(w) if w.is_finite() && w != 0.0 => w,
            _ => DEFAULT_IMPORTANCE_WEIGHT,
        };

        for item in phrases {
            let Some(phrase) = item.as_str() else {
                continue;
            };
            if phrase.chars().count() < self.config.min_phrase_length {
                continue;
            }
            let phrase = normalize_text(phrase);
            let Some(pattern) = self.patterns.get_or_compile(&phrase) else {
                continue;
            };
            out.push(TriggerEntry {
                phrase,
                pattern,
                memory_id: row.id.clone(),
                folder: row.folder.clone(),
                path: row.path.clone(),
                title: row.title.clone(),
                importance_weight,
            });
        }
    }

    fn cache_len(&self) -> usize {
        self.entries.as_ref().map_or(0, Vec::len)
    }

    /// Match a prompt against every cached phrase. Matches are grouped per
    /// record (phrases in first-seen order), ordered by matched phrase count
    /// then importance, and truncated to `limit`.
    pub fn match_trigger_phrases(
        &mut self,
        source: &dyn RecordSource,
        prompt: &str,
        limit: usize,
    ) -> Vec<TriggerMatch> {
        if prompt.is_empty() {
            return Vec::new();
        }
        let started = Instant::now();

        let truncated: String = prompt.chars().take(self.config.max_prompt_length).collect();
        let normalized = normalize_text(&truncated);

        if self.ensure_loaded(source) == 0 {
            return Vec::new();
        }
        let entries = self.entries.as_deref().unwrap_or_default();

        let mut grouped: Vec<TriggerMatch> = Vec::new();
        for entry in entries {
            if !entry.pattern.is_match(&normalized) {
                continue;
            }
            match grouped.iter_mut().find(|m| m.memory_id == entry.memory_id) {
                Some(existing) => existing.matched_phrases.push(entry.phrase.clone()),
                None => grouped.push(TriggerMatch {
                    memory_id: entry.memory_id.clone(),
                    folder: entry.folder.clone(),
                    path: entry.path.clone(),
                    title: entry.title.clone(),
                    importance_weight: entry.importance_weight,
                    matched_phrases: vec![entry.phrase.clone()],
                }),
            }
        }

        // Stable sort keeps first-seen order among equal keys.
        grouped.sort_by(|a, b| {
            b.matched_phrases
                .len()
                .cmp(&a.matched_phrases.len())
                .then_with(|| {
                    b.importance_weight
                        .partial_cmp(&a.importance_weight)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
        });
        grouped.truncate(limit);

        self.log_timing(started.elapsed(), truncated.chars().count(), &grouped);
        grouped
    }

    fn log_timing(&self, elapsed: Duration, prompt_length: usize, matches: &[TriggerMatch]) {
        let elapsed_ms = elapsed.as_millis() as u64;
        let total_phrases: usize = matches.iter().map(|m| m.matched_phrases.len()).sum();
        if elapsed_ms >= self.config.slow_match_ms {
            tracing::warn!(
                elapsed_ms,
                prompt_length,
                cache_size = self.cache_len(),
                match_count = matches.len(),
                total_phrases,
                "slow trigger match"
            );
        } else {
            tracing::debug!(
                elapsed_ms,
                prompt_length,
                match_count = matches.len(),
                total_phrases,
                "trigger match"
            );
        }
    }

    /// Like [`match_trigger_phrases`](Self::match_trigger_phrases), plus
    /// statistics. With the signal vocabulary enabled, detected signals are
    /// reported and their boosts applied to the returned matches.
    pub fn match_with_stats(
        &mut self,
        source: &dyn RecordSource,
        prompt: &str,
        limit: usize,
    ) -> TriggerMatchReport {
        let started = Instant::now();
        let cache_size = self.ensure_loaded(source);
        let mut matches = self.match_trigger_phrases(source, prompt, limit);

        let signals = if self.signal_vocab {
            let detected = detect_signals(prompt);
            matches = apply_signal_boosts(&matches, &detected);
            Some(detected)
        } else {
            None
        };

        TriggerMatchReport {
            stats: TriggerMatchStats {
                prompt_length: prompt.chars().count(),
                cache_size,
                match_count: matches.len(),
                total_matched_phrases: matches.iter().map(|m| m.matched_phrases.len()).sum(),
                match_time_ms: started.elapsed().as_millis() as u64,
                signals,
            },
            matches,
        }
    }

    /// Every distinct cached phrase, in cache order.
    pub fn all_phrases(&mut self, source: &dyn RecordSource) -> Vec<String> {
        self.ensure_loaded(source);
        let mut seen = HashSet::new();
        self.entries
            .iter()
            .flatten()
            .filter(|e| seen.insert(e.phrase.as_str()))
            .map(|e| e.phrase.clone())
            .collect()
    }

    /// Records registered under `phrase`, one per record.
    pub fn memories_by_phrase(&mut self, source: &dyn RecordSource, phrase: &str) -> Vec<PhraseOwner> {
        self.ensure_loaded(source);
        let wanted = normalize_text(phrase);
        let mut seen = HashSet::new();
        self.entries
            .iter()
            .flatten()
            .filter(|e| e.phrase == wanted && seen.insert(e.memory_id.as_str()))
            .map(|e| PhraseOwner {
                memory_id: e.memory_id.clone(),
                folder: e.folder.clone(),
                path: e.path.clone(),
                title: e.title.clone(),
                importance_weight: e.importance_weight,
            })
            .collect()
    }

    pub fn cache_stats(&self) -> TriggerCacheStats {
        TriggerCacheStats {
            size: self.cache_len(),
            age_ms: self.loaded_at.map(|at| at.elapsed().as_millis() as u64),
            pattern_cache_size: self.patterns.len(),
            pattern_cache_capacity: self.patterns.capacity(),
        }
    }

    /// Drop the phrase cache and every compiled pattern.
    pub fn clear_cache(&mut self) {
        self.entries = None;
        self.loaded_at = None;
        self.patterns.clear();
    }

    /// Clear and reload immediately. Returns the new cache size.
    pub fn refresh(&mut self, source: &dyn RecordSource) -> usize {
        self.clear_cache();
        self.ensure_loaded(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{StoreError, StoreResult};
    use std::cell::Cell;

    struct Phrases {
        rows: Vec<IndexRecord>,
        loads: Cell<usize>,
    }

    impl Phrases {
        fn new(rows: Vec<IndexRecord>) -> Self {
            Self {
                rows,
                loads: Cell::new(0),
            }
        }
    }

    impl RecordSource for Phrases {
        fn lexical_rows(&self) -> StoreResult<Vec<IndexRecord>> {
            Ok(self.rows.clone())
        }
        fn trigger_rows(&self) -> StoreResult<Vec<IndexRecord>> {
            self.loads.set(self.loads.get() + 1);
            Ok(self.rows.clone())
        }
    }

    struct Offline;

    impl RecordSource for Offline {
        fn lexical_rows(&self) -> StoreResult<Vec<IndexRecord>> {
            Err(StoreError::Unavailable("offline".into()))
        }
        fn trigger_rows(&self) -> StoreResult<Vec<IndexRecord>> {
            Err(StoreError::Unavailable("offline".into()))
        }
    }

    fn row(id: &str, phrases: &str, weight: Option<f64>) -> IndexRecord {
        IndexRecord {
            id: id.into(),
            title: format!("title {id}"),
            trigger_phrases: Some(phrases.into()),
            path: format!("specs/{id}.md"),
            folder: "specs".into(),
            importance_weight: weight,
            ..Default::default()
        }
    }

    fn matcher() -> TriggerMatcher {
        TriggerMatcher::new(TriggerConfig::default(), false)
    }

    #[test]
    fn groups_phrases_per_record_and_orders() {
        let source = Phrases::new(vec![
            row("low", r#"["deploy"]"#, Some(0.9)),
            row("multi", r#"["deploy", "rollback plan"]"#, Some(0.2)),
            row("high", r#"["deploy"]"#, Some(0.95)),
        ]);
        let mut m = matcher();
        let hits = m.match_trigger_phrases(&source, "Deploy with a rollback plan", 3);

        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].memory_id, "multi");
        assert_eq!(hits[0].matched_phrases, vec!["deploy", "rollback plan"]);
        assert_eq!(hits[1].memory_id, "high");
        assert_eq!(hits[2].memory_id, "low");
    }

    #[test]
    fn limit_truncates() {
        let source = Phrases::new(vec![
            row("a", r#"["cache"]"#, None),
            row("b", r#"["cache"]"#, None),
        ]);
        let mut m = matcher();
        assert_eq!(m.match_trigger_phrases(&source, "clear the cache", 1).len(), 1);
    }

    #[test]
    fn skips_bad_json_short_and_non_string_phrases() {
        let source = Phrases::new(vec![
            row("bad", "not json", None),
            row("obj", r#"{"phrase": "deploy"}"#, None),
            row("mixed", r#"[42, "ab", null, "deploy"]"#, None),
        ]);
        let mut m = matcher();
        assert_eq!(m.ensure_loaded(&source), 1);
        let hits = m.match_trigger_phrases(&source, "ab deploy", 5);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].memory_id, "mixed");
        assert_eq!(hits[0].matched_phrases, vec!["deploy"]);
    }

    #[test]
    fn missing_or_zero_weight_defaults() {
        let source = Phrases::new(vec![
            row("none", r#"["alpha"]"#, None),
            row("zero", r#"["beta"]"#, Some(0.0)),
        ]);
        let mut m = matcher();
        let hits = m.match_trigger_phrases(&source, "alpha beta", 5);
        assert!(hits.iter().all(|h| h.importance_weight == DEFAULT_IMPORTANCE_WEIGHT));
    }

    #[test]
    fn empty_prompt_matches_nothing() {
        let source = Phrases::new(vec![row("a", r#"["deploy"]"#, None)]);
        let mut m = matcher();
        assert!(m.match_trigger_phrases(&source, "", 3).is_empty());
        assert_eq!(source.loads.get(), 0);
    }

    #[test]
    fn prompt_is_truncated_before_matching() {
        let source = Phrases::new(vec![row("a", r#"["needle"]"#, None)]);
        let mut m = matcher();
        let prompt = format!("{} needle", "x ".repeat(3000));
        assert!(m.match_trigger_phrases(&source, &prompt, 3).is_empty());
        assert_eq!(m.match_trigger_phrases(&source, "a needle", 3).len(), 1);
    }

    #[test]
    fn normalizes_unicode_and_case() {
        // "cafe\u{301}" decomposed; the prompt uses the composed form.
        let source = Phrases::new(vec![row("a", "[\"Cafe\u{301} Order\"]", None)]);
        let mut m = matcher();
        let hits = m.match_trigger_phrases(&source, "my CAF\u{c9} ORDER please", 3);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].matched_phrases, vec!["caf\u{e9} order"]);
    }

    #[test]
    fn cache_is_reused_within_ttl() {
        let source = Phrases::new(vec![row("a", r#"["deploy"]"#, None)]);
        let mut m = matcher();
        m.match_trigger_phrases(&source, "deploy", 3);
        m.match_trigger_phrases(&source, "deploy now", 3);
        assert_eq!(source.loads.get(), 1);

        m.refresh(&source);
        assert_eq!(source.loads.get(), 2);
    }

    #[test]
    fn zero_ttl_reloads_every_time() {
        let source = Phrases::new(vec![row("a", r#"["deploy"]"#, None)]);
        let config = TriggerConfig {
            cache_ttl_secs: 0,
            ..Default::default()
        };
        let mut m = TriggerMatcher::new(config, false);
        m.match_trigger_phrases(&source, "deploy", 3);
        m.match_trigger_phrases(&source, "deploy", 3);
        assert_eq!(source.loads.get(), 2);
    }

    #[test]
    fn store_failure_yields_empty_and_retries() {
        let mut m = matcher();
        assert!(m.match_trigger_phrases(&Offline, "deploy", 3).is_empty());
        assert_eq!(m.cache_stats().size, 0);

        let source = Phrases::new(vec![row("a", r#"["deploy"]"#, None)]);
        assert_eq!(m.match_trigger_phrases(&source, "deploy", 3).len(), 1);
    }

    #[test]
    fn all_phrases_and_memories_by_phrase_dedupe() {
        let source = Phrases::new(vec![
            row("a", r#"["deploy", "deploy", "rollback"]"#, None),
            row("b", r#"["deploy"]"#, Some(0.7)),
        ]);
        let mut m = matcher();
        assert_eq!(m.all_phrases(&source), vec!["deploy", "rollback"]);

        let owners = m.memories_by_phrase(&source, "DEPLOY");
        assert_eq!(owners.len(), 2);
        assert_eq!(owners[0].memory_id, "a");
        assert_eq!(owners[1].importance_weight, 0.7);
    }

    #[test]
    fn stats_include_signals_only_when_enabled() {
        let source = Phrases::new(vec![row("a", r#"["typescript"]"#, Some(0.5))]);

        let mut off = matcher();
        let report = off.match_with_stats(&source, "actually, I prefer TypeScript", 3);
        assert!(report.stats.signals.is_none());
        assert_eq!(report.matches[0].importance_weight, 0.5);

        let mut on = TriggerMatcher::new(TriggerConfig::default(), true);
        let report = on.match_with_stats(&source, "actually, I prefer TypeScript", 3);
        assert_eq!(report.stats.signals.as_ref().map(Vec::len), Some(2));
        assert_eq!(report.matches[0].importance_weight, 0.8);
        assert_eq!(report.stats.match_count, 1);
        assert_eq!(report.stats.total_matched_phrases, 1);
        assert_eq!(report.stats.cache_size, 1);
    }

    #[test]
    fn clear_cache_drops_patterns() {
        let source = Phrases::new(vec![row("a", r#"["deploy", "rollback"]"#, None)]);
        let mut m = matcher();
        m.ensure_loaded(&source);
        let stats = m.cache_stats();
        assert_eq!(stats.size, 2);
        assert_eq!(stats.pattern_cache_size, 2);
        assert_eq!(stats.pattern_cache_capacity, 100);
        assert!(stats.age_ms.is_some());

        m.clear_cache();
        let stats = m.cache_stats();
        assert_eq!(stats.size, 0);
        assert_eq!(stats.pattern_cache_size, 0);
        assert!(stats.age_ms.is_none());
    }
}
