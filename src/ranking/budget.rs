//! Token budget per query-complexity tier, plus the classifier that picks
//! the tier.

use serde::Serialize;

use crate::config::BudgetConfig;

pub const DEFAULT_TOKEN_BUDGET: usize = 4000;
pub const SIMPLE_TERM_THRESHOLD: usize = 3;
pub const COMPLEX_TERM_THRESHOLD: usize = 8;

/// Above this many terms a complex classification is certain.
const VERY_LONG_QUERY_TERMS: usize = 12;
const CONTENT_RICH_STOP_RATIO: f64 = 0.3;

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "in", "on", "at", "to", "for", "of", "and",
    "or", "but", "not", "with", "this", "that", "it", "from", "by", "as", "be", "has", "had",
    "have", "do", "does", "did", "will", "would", "can", "could", "should", "may", "might",
    "i", "you", "we", "they", "what", "how", "why", "when", "where", "which", "who", "my",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityTier {
    Simple,
    Moderate,
    Complex,
}

impl ComplexityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Moderate => "moderate",
            Self::Complex => "complex",
        }
    }
}

impl std::fmt::Display for ComplexityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ComplexityTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" => Ok(Self::Simple),
            "moderate" => Ok(Self::Moderate),
            "complex" => Ok(Self::Complex),
            other => Err(format!("unknown complexity tier: {other}")),
        }
    }
}

/// Per-tier budgets, either the configured defaults or a caller override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TierBudgets {
    pub simple: usize,
    pub moderate: usize,
    pub complex: usize,
}

impl TierBudgets {
    pub fn for_tier(&self, tier: ComplexityTier) -> usize {
        match tier {
            ComplexityTier::Simple => self.simple,
            ComplexityTier::Moderate => self.moderate,
            ComplexityTier::Complex => self.complex,
        }
    }
}

impl Default for TierBudgets {
    fn default() -> Self {
        Self {
            simple: 1500,
            moderate: 2500,
            complex: 4000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TokenBudget {
    pub budget: usize,
    pub applied: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BudgetAllocator {
    enabled: bool,
    default_budget: usize,
    tiers: TierBudgets,
}

impl Default for BudgetAllocator {
    fn default() -> Self {
        Self::from_config(&BudgetConfig::default(), false)
    }
}

impl BudgetAllocator {
    pub fn from_config(config: &BudgetConfig, enabled: bool) -> Self {
        Self {
            enabled,
            default_budget: config.default_budget,
            tiers: TierBudgets {
                simple: config.simple,
                moderate: config.moderate,
                complex: config.complex,
            },
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Flat default budget when disabled; otherwise the tier's budget from
    /// `override_tiers` if given, else from configuration.
    pub fn get_dynamic_token_budget(
        &self,
        tier: ComplexityTier,
        override_tiers: Option<&TierBudgets>,
    ) -> TokenBudget {
        if !self.enabled {
            return TokenBudget {
                budget: self.default_budget,
                applied: false,
            };
        }
        let tiers = override_tiers.unwrap_or(&self.tiers);
        TokenBudget {
            budget: tiers.for_tier(tier),
            applied: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationFeatures {
    pub term_count: usize,
    pub has_trigger_match: bool,
    pub stop_word_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub tier: ComplexityTier,
    pub confidence: Confidence,
    pub features: ClassificationFeatures,
}

pub fn extract_terms(query: &str) -> Vec<&str> {
    query.split_whitespace().collect()
}

pub fn stop_word_ratio(terms: &[&str]) -> f64 {
    if terms.is_empty() {
        return 0.0;
    }
    let stops = terms
        .iter()
        .filter(|t| STOP_WORDS.contains(&t.to_lowercase().as_str()))
        .count();
    stops as f64 / terms.len() as f64
}

/// Whole-query, case-insensitive equality with one of the phrases.
pub fn has_trigger_match(query: &str, trigger_phrases: &[String]) -> bool {
    let query = query.trim().to_lowercase();
    !query.is_empty()
        && trigger_phrases
            .iter()
            .any(|p| p.trim().to_lowercase() == query)
}

/// Classify a query by term count and trigger hits. With the router
/// disabled, or for a blank query, everything is complex with fallback
/// confidence so callers get the full budget.
pub fn classify_query_complexity(
    query: &str,
    trigger_phrases: &[String],
    router_enabled: bool,
) -> Classification {
    let terms = extract_terms(query);
    let features = ClassificationFeatures {
        term_count: terms.len(),
        has_trigger_match: has_trigger_match(query, trigger_phrases),
        stop_word_ratio: stop_word_ratio(&terms),
    };

    if !router_enabled || terms.is_empty() {
        return Classification {
            tier: ComplexityTier::Complex,
            confidence: Confidence::Fallback,
            features,
        };
    }

    let (tier, confidence) = if features.has_trigger_match || features.term_count <= SIMPLE_TERM_THRESHOLD {
        (ComplexityTier::Simple, Confidence::High)
    } else if features.term_count > COMPLEX_TERM_THRESHOLD {
        let confidence = if features.term_count > VERY_LONG_QUERY_TERMS
            || features.stop_word_ratio < CONTENT_RICH_STOP_RATIO
        {
            Confidence::High
        } else {
            Confidence::Medium
        };
        (ComplexityTier::Complex, confidence)
    } else {
        let near_boundary = features.term_count == SIMPLE_TERM_THRESHOLD + 1
            || features.term_count == COMPLEX_TERM_THRESHOLD;
        let confidence = if near_boundary { Confidence::Low } else { Confidence::Medium };
        (ComplexityTier::Moderate, confidence)
    };

    Classification {
        tier,
        confidence,
        features,
    }
}
