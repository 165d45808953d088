//! Signal vocabulary: conversational cues that a prompt corrects an earlier
//! statement or states a preference. Detected signals raise the importance
//! of trigger matches for that prompt.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

use super::pattern_cache::boundary_pattern;
use super::triggers::{normalize_text, TriggerMatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalCategory {
    Correction,
    Preference,
}

impl SignalCategory {
    pub const ALL: [SignalCategory; 2] = [Self::Correction, Self::Preference];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Correction => "correction",
            Self::Preference => "preference",
        }
    }

    pub fn boost(&self) -> f64 {
        match self {
            Self::Correction => 0.20,
            Self::Preference => 0.10,
        }
    }

    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            Self::Correction => &[
                "actually",
                "wait",
                "i was wrong",
                "correction",
                "not quite",
                "let me rephrase",
                "that's not right",
            ],
            Self::Preference => &[
                "prefer",
                "like",
                "want",
                "always use",
                "never use",
                "i want",
                "please use",
            ],
        }
    }
}

impl std::fmt::Display for SignalCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    pub category: SignalCategory,
    pub keywords: Vec<String>,
    pub boost: f64,
}

struct VocabEntry {
    category: SignalCategory,
    keyword: &'static str,
    pattern: Regex,
}

static VOCABULARY: LazyLock<Vec<VocabEntry>> = LazyLock::new(|| {
    SignalCategory::ALL
        .into_iter()
        .flat_map(|category| {
            category.keywords().iter().copied().filter_map(move |keyword| {
                boundary_pattern(keyword).ok().map(|pattern| VocabEntry {
                    category,
                    keyword,
                    pattern,
                })
            })
        })
        .collect()
});

/// Scan the whole prompt (never truncated) for signal keywords. Returns one
/// signal per category that fired, listing every keyword that matched.
pub fn detect_signals(prompt: &str) -> Vec<Signal> {
    if prompt.trim().is_empty() {
        return Vec::new();
    }
    let normalized = normalize_text(prompt);

    let mut signals: Vec<Signal> = Vec::new();
    for entry in VOCABULARY.iter() {
        if !entry.pattern.is_match(&normalized) {
            continue;
        }
        match signals.iter_mut().find(|s| s.category == entry.category) {
            Some(signal) => signal.keywords.push(entry.keyword.to_string()),
            None => signals.push(Signal {
                category: entry.category,
                keywords: vec![entry.keyword.to_string()],
                boost: entry.category.boost(),
            }),
        }
    }
    signals
}

/// Add the summed signal boost to each match's importance, capped at 1.0.
/// The inputs are left untouched.
pub fn apply_signal_boosts(matches: &[TriggerMatch], signals: &[Signal]) -> Vec<TriggerMatch> {
    let total: f64 = signals.iter().map(|s| s.boost).sum();
    if signals.is_empty() || total <= 0.0 {
        return matches.to_vec();
    }

    matches
        .iter()
        .map(|m| TriggerMatch {
            importance_weight: (m.importance_weight + total).min(1.0),
            ..m.clone()
        })
        .collect()
}
