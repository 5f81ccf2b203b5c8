//! Search configuration
//!
//! Config loading priority:
//! 1. Explicit path (`--config`)
//! 2. `CHAT_SEARCH_CONFIG` environment variable
//! 3. Built-in defaults
//!
//! The file layout is a list of strategy descriptors plus a global `search`
//! block. Every field has a default, so a partial file is valid.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use super::error::{Result, SearchError};
use crate::search::query::{SearchMode, Strategy};

/// Environment variable pointing at a config file
pub const CONFIG_PATH_ENV: &str = "CHAT_SEARCH_CONFIG";

/// Default Model2Vec model ID
pub const DEFAULT_MODEL2VEC_MODEL: &str = "minishlab/potion-base-8M";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_search_modes")]
    pub search_modes: Vec<StrategyDescriptor>,

    #[serde(default)]
    pub search: GlobalSettings,
}

/// One matching strategy as declared in the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyDescriptor {
    pub name: Strategy,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_weight")]
    pub weight: f64,

    /// Strategy specific options, decoded on demand
    #[serde(default, skip_serializing_if = "serde_yaml::Value::is_null")]
    pub options: serde_yaml::Value,
}

impl StrategyDescriptor {
    pub fn new(name: Strategy, weight: f64) -> Self {
        Self {
            name,
            enabled: true,
            weight,
            options: serde_yaml::Value::Null,
        }
    }

    /// Decode the options block into a typed structure
    pub fn options<T: DeserializeOwned + Default>(&self) -> Result<T> {
        if self.options.is_null() {
            return Ok(T::default());
        }
        serde_yaml::from_value(self.options.clone()).map_err(|e| {
            SearchError::Config(format!("options for '{}': {}", self.name.as_str(), e))
        })
    }
}

fn default_true() -> bool {
    true
}

fn default_weight() -> f64 {
    1.0
}

fn default_search_modes() -> Vec<StrategyDescriptor> {
    vec![
        StrategyDescriptor::new(Strategy::Regex, 1.2),
        StrategyDescriptor::new(Strategy::Exact, 1.0),
        StrategyDescriptor::new(Strategy::Semantic, 1.5),
    ]
}

/// How per-strategy scores are combined into one ranking
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombineStrategy {
    /// `sum(weight * normalized score) + bonus`
    #[default]
    WeightedSum,
    /// `sum(weight / (k + rank)) + bonus`
    ReciprocalRank,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalSettings {
    #[serde(default)]
    pub default_mode: SearchMode,

    #[serde(default = "default_max_results_per_space")]
    pub max_results_per_space: usize,

    #[serde(default)]
    pub combine_results_strategy: CombineStrategy,

    /// Bonus per additional agreeing strategy
    #[serde(default = "default_multi_strategy_bonus")]
    pub multi_strategy_bonus: f64,

    #[serde(default = "default_rrf_k")]
    pub rrf_k: usize,

    /// Concurrent space fetches per call
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_max_results_per_space() -> usize {
    1000
}

fn default_multi_strategy_bonus() -> f64 {
    0.2
}

fn default_rrf_k() -> usize {
    60
}

fn default_max_concurrency() -> usize {
    4
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            default_mode: SearchMode::default(),
            max_results_per_space: default_max_results_per_space(),
            combine_results_strategy: CombineStrategy::default(),
            multi_strategy_bonus: default_multi_strategy_bonus(),
            rrf_k: default_rrf_k(),
            max_concurrency: default_max_concurrency(),
            log_level: default_log_level(),
        }
    }
}

/// Options for the pattern (regex) strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternOptions {
    #[serde(default = "default_true")]
    pub ignore_case: bool,

    #[serde(default)]
    pub dot_all: bool,

    #[serde(default = "default_max_pattern_length")]
    pub max_pattern_length: usize,
}

fn default_max_pattern_length() -> usize {
    1000
}

impl Default for PatternOptions {
    fn default() -> Self {
        Self {
            ignore_case: true,
            dot_all: false,
            max_pattern_length: default_max_pattern_length(),
        }
    }
}

/// Options for the literal (exact) strategy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiteralOptions {
    /// Also match contraction variants ("don't" / "do not" / "didn't")
    #[serde(default)]
    pub expand_contractions: bool,
}

/// Cache eviction policy for embedding vectors
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Evict the least recently read entry
    #[default]
    Lru,
    /// Evict the oldest inserted entry
    Fifo,
}

/// Options for the semantic strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticOptions {
    /// Model2Vec model ID (HuggingFace) used when `model_path` is unset
    #[serde(default = "default_model_id")]
    pub model: String,

    #[serde(default)]
    pub model_path: Option<String>,

    /// Use the built-in hashing embedder instead of a model
    #[serde(default)]
    pub builtin_embedder: bool,

    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Desired number of matches before threshold relaxation stops
    #[serde(default = "default_min_results")]
    pub min_results: usize,

    #[serde(default = "default_relaxation_step")]
    pub relaxation_step: f32,

    #[serde(default = "default_max_relaxation_steps")]
    pub max_relaxation_steps: usize,

    #[serde(default = "default_cache_max_size")]
    pub cache_max_size: usize,

    #[serde(default)]
    pub eviction_policy: EvictionPolicy,
}

fn default_model_id() -> String {
    DEFAULT_MODEL2VEC_MODEL.to_string()
}

fn default_similarity_threshold() -> f32 {
    0.30
}

fn default_min_results() -> usize {
    1
}

fn default_relaxation_step() -> f32 {
    0.05
}

fn default_max_relaxation_steps() -> usize {
    2
}

fn default_cache_max_size() -> usize {
    10_000
}

impl Default for SemanticOptions {
    fn default() -> Self {
        Self {
            model: default_model_id(),
            model_path: None,
            builtin_embedder: false,
            similarity_threshold: default_similarity_threshold(),
            min_results: default_min_results(),
            relaxation_step: default_relaxation_step(),
            max_relaxation_steps: default_max_relaxation_steps(),
            cache_max_size: default_cache_max_size(),
            eviction_policy: EvictionPolicy::default(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            search_modes: default_search_modes(),
            search: GlobalSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings following the documented priority
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from));

        match path {
            Some(path) => {
                let settings = Self::load_from_file(&path)?;
                tracing::info!(
                    path = %path.display(),
                    strategies = settings.search_modes.len(),
                    "Loaded search configuration"
                );
                Ok(settings)
            }
            None => {
                tracing::debug!("No search configuration given, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let settings: Settings = serde_yaml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Generate default config file content
    pub fn default_yaml() -> Result<String> {
        Settings::default().to_yaml()
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = Vec::new();
        for descriptor in &self.search_modes {
            if seen.contains(&descriptor.name) {
                return Err(SearchError::Config(format!(
                    "strategy '{}' is declared more than once",
                    descriptor.name.as_str()
                )));
            }
            seen.push(descriptor.name);

            if !descriptor.weight.is_finite() || descriptor.weight < 0.0 {
                return Err(SearchError::Config(format!(
                    "weight for '{}' must be a non-negative number",
                    descriptor.name.as_str()
                )));
            }
        }

        let pattern = self.pattern_options()?;
        if pattern.max_pattern_length == 0 {
            return Err(SearchError::Config(
                "max_pattern_length must be at least 1".to_string(),
            ));
        }
        self.literal_options()?;

        let semantic = self.semantic_options()?;
        if !(0.0..=1.0).contains(&semantic.similarity_threshold) {
            return Err(SearchError::Config(
                "similarity_threshold must be within [0, 1]".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&semantic.relaxation_step) {
            return Err(SearchError::Config(
                "relaxation_step must be within [0, 1]".to_string(),
            ));
        }

        if self.search.max_concurrency == 0 {
            return Err(SearchError::Config(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if !self.search.multi_strategy_bonus.is_finite() || self.search.multi_strategy_bonus < 0.0
        {
            return Err(SearchError::Config(
                "multi_strategy_bonus must be a non-negative number".to_string(),
            ));
        }

        Ok(())
    }

    pub fn descriptor(&self, strategy: Strategy) -> Option<&StrategyDescriptor> {
        self.search_modes.iter().find(|d| d.name == strategy)
    }

    /// Declared and enabled; disabled strategies are absent, not zero-weighted
    pub fn is_enabled(&self, strategy: Strategy) -> bool {
        self.descriptor(strategy).map(|d| d.enabled).unwrap_or(false)
    }

    pub fn weight(&self, strategy: Strategy) -> f64 {
        self.descriptor(strategy).map(|d| d.weight).unwrap_or(0.0)
    }

    fn options_for<T: DeserializeOwned + Default>(&self, strategy: Strategy) -> Result<T> {
        match self.descriptor(strategy) {
            Some(descriptor) => descriptor.options(),
            None => Ok(T::default()),
        }
    }

    pub fn pattern_options(&self) -> Result<PatternOptions> {
        self.options_for(Strategy::Regex)
    }

    pub fn literal_options(&self) -> Result<LiteralOptions> {
        self.options_for(Strategy::Exact)
    }

    pub fn semantic_options(&self) -> Result<SemanticOptions> {
        self.options_for(Strategy::Semantic)
    }
}
