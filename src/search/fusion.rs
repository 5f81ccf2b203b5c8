//! Score fusion
//!
//! Combines per-strategy results into one ranked list:
//! - WeightedSum: `Σ weight(s) * score(s) + bonus(|S|)` (default)
//! - ReciprocalRank: `Σ weight(s) / (k + rank(s)) + bonus(|S|)`
//!
//! Presence-only strategies report a score of 1.0, so they contribute their
//! weight directly; semantic contributes `weight * similarity`. The bonus is
//! `multi_strategy_bonus * (|S| - 1)`, so agreement across strategies only
//! ever adds.

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::matcher::StrategyResult;
use super::query::Strategy;
use crate::core::config::{CombineStrategy, Settings};
use crate::core::message::Message;

// ============================================================================
// Fusion Configuration
// ============================================================================

/// Weights and combination rule for one call
#[derive(Debug, Clone, PartialEq)]
pub struct FusionConfig {
    pub weights: BTreeMap<Strategy, f64>,
    pub multi_strategy_bonus: f64,
    pub method: CombineStrategy,
    /// RRF k parameter - controls rank contribution decay (default: 60)
    pub rrf_k: usize,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl FusionConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        let weights = Strategy::ALL
            .iter()
            .map(|s| (*s, settings.weight(*s)))
            .collect();

        Self {
            weights,
            multi_strategy_bonus: settings.search.multi_strategy_bonus,
            method: settings.search.combine_results_strategy,
            rrf_k: settings.search.rrf_k,
        }
    }

    pub fn weight(&self, strategy: Strategy) -> f64 {
        self.weights.get(&strategy).copied().unwrap_or(0.0)
    }

    /// Agreement bonus for `n` distinct contributing strategies
    pub fn bonus(&self, n: usize) -> f64 {
        self.multi_strategy_bonus * n.saturating_sub(1) as f64
    }
}

// ============================================================================
// Fused Result
// ============================================================================

/// A message with its combined score
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusedResult {
    pub message: Message,
    pub combined_score: f64,
    pub contributing_strategies: BTreeSet<Strategy>,
    /// Normalized per-strategy score before weighting
    pub strategy_scores: BTreeMap<Strategy, f64>,
}

/// Total order: score desc, strategy count desc, newest first, then id
pub fn compare_fused(a: &FusedResult, b: &FusedResult) -> Ordering {
    b.combined_score
        .total_cmp(&a.combined_score)
        .then_with(|| {
            b.contributing_strategies
                .len()
                .cmp(&a.contributing_strategies.len())
        })
        .then_with(|| b.message.create_time.cmp(&a.message.create_time))
        .then_with(|| a.message.id.cmp(&b.message.id))
}

fn normalize_score(score: f64) -> f64 {
    if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

// ============================================================================
// Fusion
// ============================================================================

/// Fuse matched results of every strategy into one ranked list
///
/// `messages` resolves message ids; results for unknown ids and unmatched
/// results are ignored. A strategy may report a message at most once.
pub fn fuse(
    results: &[StrategyResult],
    messages: &HashMap<&str, &Message>,
    config: &FusionConfig,
) -> Vec<FusedResult> {
    let mut by_message: HashMap<&str, BTreeMap<Strategy, f64>> = HashMap::new();
    for result in results.iter().filter(|r| r.matched) {
        if !messages.contains_key(result.message_id.as_str()) {
            continue;
        }
        let scores = by_message.entry(result.message_id.as_str()).or_default();
        let score = normalize_score(result.score);
        let slot = scores.entry(result.strategy).or_insert(score);
        if score > *slot {
            *slot = score;
        }
    }

    let ranks = match config.method {
        CombineStrategy::WeightedSum => None,
        CombineStrategy::ReciprocalRank => Some(strategy_ranks(&by_message, messages)),
    };

    let mut fused: Vec<FusedResult> = by_message
        .into_iter()
        .filter_map(|(id, strategy_scores)| {
            let message = messages.get(id)?;
            let base: f64 = strategy_scores
                .iter()
                .map(|(strategy, score)| match &ranks {
                    None => config.weight(*strategy) * score,
                    Some(ranks) => {
                        let rank = ranks.get(&(*strategy, id)).copied().unwrap_or(usize::MAX);
                        config.weight(*strategy) / (config.rrf_k as f64 + rank as f64)
                    }
                })
                .sum();
            let contributing: BTreeSet<Strategy> = strategy_scores.keys().copied().collect();

            Some(FusedResult {
                message: (*message).clone(),
                combined_score: base + config.bonus(contributing.len()),
                contributing_strategies: contributing,
                strategy_scores,
            })
        })
        .collect();

    fused.sort_by(compare_fused);
    fused
}

/// 1-based rank of each message within each strategy
///
/// Within a strategy, messages order by score desc, newest first, then id.
fn strategy_ranks<'a>(
    by_message: &HashMap<&'a str, BTreeMap<Strategy, f64>>,
    messages: &HashMap<&str, &Message>,
) -> HashMap<(Strategy, &'a str), usize> {
    let mut per_strategy: BTreeMap<Strategy, Vec<(&'a str, f64)>> = BTreeMap::new();
    for (id, scores) in by_message {
        for (strategy, score) in scores {
            per_strategy.entry(*strategy).or_default().push((*id, *score));
        }
    }

    let mut ranks = HashMap::new();
    for (strategy, mut entries) in per_strategy {
        entries.sort_by(|(a_id, a_score), (b_id, b_score)| {
            let a_time = messages.get(a_id).map(|m| m.create_time);
            let b_time = messages.get(b_id).map(|m| m.create_time);
            b_score
                .total_cmp(a_score)
                .then_with(|| b_time.cmp(&a_time))
                .then_with(|| a_id.cmp(b_id))
        });
        for (rank, (id, _)) in entries.into_iter().enumerate() {
            ranks.insert((strategy, id), rank + 1);
        }
    }
    ranks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::message;

    fn config() -> FusionConfig {
        FusionConfig::default()
    }

    fn index(messages: &[Message]) -> HashMap<&str, &Message> {
        messages.iter().map(|m| (m.id.as_str(), m)).collect()
    }

    fn hit(id: &str, strategy: Strategy, score: f64) -> StrategyResult {
        StrategyResult::hit(id, strategy, score)
    }

    #[test]
    fn test_default_weights() {
        let config = config();
        assert_eq!(config.weight(Strategy::Regex), 1.2);
        assert_eq!(config.weight(Strategy::Exact), 1.0);
        assert_eq!(config.weight(Strategy::Semantic), 1.5);
        assert_eq!(config.bonus(1), 0.0);
        assert!((config.bonus(3) - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_weighted_sum() {
        let messages = vec![message("m1", "2024-05-13", "x")];
        let results = vec![
            hit("m1", Strategy::Regex, 1.0),
            hit("m1", Strategy::Semantic, 0.8),
        ];

        let fused = fuse(&results, &index(&messages), &config());
        assert_eq!(fused.len(), 1);
        // 1.2 * 1.0 + 1.5 * 0.8 + 0.2
        assert!((fused[0].combined_score - 2.6).abs() < 1e-9);
        assert_eq!(fused[0].contributing_strategies.len(), 2);
    }

    #[test]
    fn test_hybrid_agreement_outranks_single_strategy() {
        let messages = vec![
            message("both", "2024-05-13", "x"),
            message("semantic-only", "2024-05-13", "y"),
        ];
        let results = vec![
            hit("both", Strategy::Regex, 1.0),
            hit("both", Strategy::Semantic, 0.7),
            hit("semantic-only", Strategy::Semantic, 0.7),
        ];

        let fused = fuse(&results, &index(&messages), &config());
        assert_eq!(fused[0].message.id, "both");
        assert_eq!(fused[1].message.id, "semantic-only");
    }

    #[test]
    fn test_more_strategies_never_lowers_score() {
        let messages = vec![message("m1", "2024-05-13", "x")];
        let subsets: Vec<Vec<Strategy>> = vec![
            vec![Strategy::Semantic],
            vec![Strategy::Semantic, Strategy::Exact],
            vec![Strategy::Semantic, Strategy::Exact, Strategy::Regex],
        ];

        for method in [CombineStrategy::WeightedSum, CombineStrategy::ReciprocalRank] {
            let config = FusionConfig {
                method,
                ..config()
            };
            let mut previous = f64::MIN;
            for subset in &subsets {
                let results: Vec<StrategyResult> =
                    subset.iter().map(|s| hit("m1", *s, 0.5)).collect();
                let score = fuse(&results, &index(&messages), &config)[0].combined_score;
                assert!(score >= previous, "{:?} lowered score", subset);
                previous = score;
            }
        }
    }

    #[test]
    fn test_tie_break_recency_then_id() {
        let messages = vec![
            message("b", "2024-05-13", "x"),
            message("a", "2024-05-13", "x"),
            message("c", "2024-05-14", "x"),
        ];
        let results = vec![
            hit("a", Strategy::Exact, 1.0),
            hit("b", Strategy::Exact, 1.0),
            hit("c", Strategy::Exact, 1.0),
        ];

        for _ in 0..5 {
            let fused = fuse(&results, &index(&messages), &config());
            let ids: Vec<&str> = fused.iter().map(|f| f.message.id.as_str()).collect();
            assert_eq!(ids, vec!["c", "a", "b"]);
        }
    }

    #[test]
    fn test_tie_break_strategy_count_before_recency() {
        let a = message("a", "2024-05-10", "x");
        let b = message("b", "2024-05-20", "x");
        let mut strategies = BTreeSet::new();
        strategies.insert(Strategy::Regex);
        let single = FusedResult {
            message: b,
            combined_score: 1.0,
            contributing_strategies: strategies.clone(),
            strategy_scores: BTreeMap::new(),
        };
        strategies.insert(Strategy::Exact);
        let double = FusedResult {
            message: a,
            combined_score: 1.0,
            contributing_strategies: strategies,
            strategy_scores: BTreeMap::new(),
        };

        assert_eq!(compare_fused(&double, &single), Ordering::Less);
    }

    #[test]
    fn test_unmatched_and_unknown_results_ignored() {
        let messages = vec![message("m1", "2024-05-13", "x")];
        let results = vec![
            StrategyResult::miss("m1", Strategy::Regex),
            hit("ghost", Strategy::Exact, 1.0),
        ];
        assert!(fuse(&results, &index(&messages), &config()).is_empty());
    }

    #[test]
    fn test_disabled_strategy_weight_is_absent() {
        let mut settings = Settings::default();
        settings.search_modes.retain(|d| d.name != Strategy::Exact);
        let config = FusionConfig::from_settings(&settings);
        assert_eq!(config.weight(Strategy::Exact), 0.0);
    }

    #[test]
    fn test_rrf_fusion() {
        let messages = vec![
            message("doc1", "2024-05-13", "x"),
            message("doc2", "2024-05-13", "x"),
            message("doc3", "2024-05-13", "x"),
        ];
        let results = vec![
            hit("doc1", Strategy::Semantic, 0.9),
            hit("doc2", Strategy::Semantic, 0.8),
            hit("doc2", Strategy::Exact, 1.0),
            hit("doc3", Strategy::Exact, 1.0),
        ];
        let config = FusionConfig {
            method: CombineStrategy::ReciprocalRank,
            multi_strategy_bonus: 0.0,
            ..config()
        };

        let fused = fuse(&results, &index(&messages), &config);

        // doc2 appears in both strategies, should be ranked first
        assert_eq!(fused[0].message.id, "doc2");
        assert_eq!(fused.len(), 3);
    }

    #[test]
    fn test_rrf_score_calculation() {
        let messages = vec![message("doc1", "2024-05-13", "x")];
        let results = vec![hit("doc1", Strategy::Semantic, 0.9)];
        let mut weights = BTreeMap::new();
        weights.insert(Strategy::Semantic, 1.0);
        let config = FusionConfig {
            weights,
            multi_strategy_bonus: 0.0,
            method: CombineStrategy::ReciprocalRank,
            rrf_k: 60,
        };

        let fused = fuse(&results, &index(&messages), &config);

        // Expected score: 1.0 / (60 + 1) = 0.01639...
        let expected = 1.0 / 61.0;
        assert!((fused[0].combined_score - expected).abs() < 1e-9);
    }

    #[test]
    fn test_empty_results() {
        let messages: Vec<Message> = vec![];
        assert!(fuse(&[], &index(&messages), &config()).is_empty());
    }
}
