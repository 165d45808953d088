use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct MnemosConfig {
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
    pub features: FeatureFlags,
    pub lexical: LexicalConfig,
    pub triggers: TriggerConfig,
    pub fusion: FusionConfig,
    pub degree: DegreeConfig,
    pub co_activation: CoActivationConfig,
    pub budget: BudgetConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

/// Boolean feature gates, resolved once at startup and threaded through
/// constructors. Turning a gate off reproduces the pre-feature behavior.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct FeatureFlags {
    pub lexical_index: bool,
    pub signal_vocab: bool,
    pub dynamic_token_budget: bool,
    pub co_activation: bool,
    pub complexity_router: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LexicalConfig {
    pub k1: f64,
    pub b: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TriggerConfig {
    pub cache_ttl_secs: u64,
    pub default_limit: usize,
    pub min_phrase_length: usize,
    pub max_prompt_length: usize,
    pub pattern_cache_capacity: usize,
    pub slow_match_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FusionConfig {
    pub rrf_k: f64,
    pub convergence_bonus: f64,
    pub graph_weight_boost: f64,
    pub degree_weight: f64,
    pub term_match_bonus: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DegreeConfig {
    pub boost_cap: f64,
    pub max_total_degree: f64,
    pub default_max_typed_degree: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CoActivationConfig {
    pub boost_factor: f64,
    pub max_related: usize,
    pub decay_per_hop: f64,
    pub max_hops: usize,
    pub max_spread_results: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BudgetConfig {
    pub default_budget: usize,
    pub simple: usize,
    pub moderate: usize,
    pub complex: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_mnemos_dir()
            .join("memory.db")
            .to_string_lossy()
            .into_owned();
        Self { db_path }
    }
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            lexical_index: true,
            signal_vocab: false,
            dynamic_token_budget: false,
            co_activation: true,
            complexity_router: false,
        }
    }
}

impl Default for LexicalConfig {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 60,
            default_limit: 3,
            min_phrase_length: 3,
            max_prompt_length: 5000,
            pattern_cache_capacity: 100,
            slow_match_ms: 30,
        }
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            rrf_k: 60.0,
            convergence_bonus: 0.10,
            graph_weight_boost: 1.5,
            degree_weight: 0.4,
            term_match_bonus: 0.05,
        }
    }
}

impl Default for DegreeConfig {
    fn default() -> Self {
        Self {
            boost_cap: 0.15,
            max_total_degree: 50.0,
            default_max_typed_degree: 15.0,
        }
    }
}

impl Default for CoActivationConfig {
    fn default() -> Self {
        Self {
            boost_factor: 0.25,
            max_related: 5,
            decay_per_hop: 0.5,
            max_hops: 2,
            max_spread_results: 20,
        }
    }
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            default_budget: 4000,
            simple: 1500,
            moderate: 2500,
            complex: 4000,
        }
    }
}

/// Returns `~/.mnemos/`, or `./.mnemos` when no home directory is known.
pub fn default_mnemos_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mnemos")
}

/// Returns the default config file path: `~/.mnemos/config.toml`
pub fn default_config_path() -> PathBuf {
    default_mnemos_dir().join("config.toml")
}

impl MnemosConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            MnemosConfig::default()
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply environment overrides read through `lookup`. `load_from` passes
    /// the process environment; this is the only place it is consulted.
    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("MNEMOS_DB") {
            self.storage.db_path = val;
        }
        if let Some(val) = lookup("MNEMOS_LOG_LEVEL") {
            self.logging.level = val;
        }
        // BM25 and co-activation are on unless explicitly disabled.
        if let Some(val) = lookup("MNEMOS_BM25") {
            self.features.lexical_index = val != "false";
        }
        if let Some(val) = lookup("MNEMOS_COACTIVATION") {
            self.features.co_activation = val != "false";
        }
        if let Some(val) = lookup("MNEMOS_SIGNAL_VOCAB") {
            self.features.signal_vocab = parse_opt_in(&val);
        }
        if let Some(val) = lookup("MNEMOS_DYNAMIC_TOKEN_BUDGET") {
            self.features.dynamic_token_budget = parse_opt_in(&val);
        }
        if let Some(val) = lookup("MNEMOS_COMPLEXITY_ROUTER") {
            self.features.complexity_router = parse_opt_in(&val);
        }
        if let Some(val) = lookup("MNEMOS_COACTIVATION_STRENGTH") {
            match val.parse::<f64>() {
                Ok(strength) if strength.is_finite() => {
                    self.co_activation.boost_factor = strength;
                }
                _ => tracing::warn!(value = %val, "ignoring invalid MNEMOS_COACTIVATION_STRENGTH"),
            }
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

/// Opt-in gates accept `true`/`1`/`yes`/`on`; anything else leaves them off.
fn parse_opt_in(val: &str) -> bool {
    matches!(
        val.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
