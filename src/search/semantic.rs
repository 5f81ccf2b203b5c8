//! Semantic matcher with dynamic threshold relaxation
//!
//! The query and every candidate are embedded with the same model and
//! compared by cosine similarity. A candidate matches when its similarity
//! clears the effective threshold, which starts at the configured base and
//! steps down while too few candidates clear it.

use std::sync::Arc;

use super::cache::{CacheKey, EmbeddingCache};
use super::embedder::{cosine_similarity, Embedder};
use super::matcher::{Matcher, StrategyResult};
use super::query::Strategy;
use crate::core::config::SemanticOptions;
use crate::core::error::{Result, SearchError};
use crate::core::message::Message;

/// Result of one semantic pass over a candidate set
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticMatches {
    /// Matched candidates only, score = similarity
    pub results: Vec<StrategyResult>,
    /// Threshold that was finally applied
    pub threshold: f32,
    /// Number of relaxation steps taken (0 = base threshold)
    pub relaxation_steps: usize,
}

impl SemanticMatches {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Pick the effective threshold for a set of similarities
///
/// Tries `max(base - k * step, 0)` for `k = 0..=max_relaxation_steps` and
/// stops at the first threshold cleared by at least `min_results` candidates.
/// When none is, the lowest threshold of the progression is used.
pub fn relaxed_threshold(similarities: &[f32], options: &SemanticOptions) -> (f32, usize) {
    let mut threshold = options.similarity_threshold;
    let mut steps = 0;

    for k in 0..=options.max_relaxation_steps {
        threshold = (options.similarity_threshold - k as f32 * options.relaxation_step).max(0.0);
        steps = k;

        let cleared = similarities.iter().filter(|s| **s >= threshold).count();
        if cleared >= options.min_results {
            break;
        }
        tracing::debug!(
            threshold,
            cleared,
            min_results = options.min_results,
            "Semantic threshold too strict"
        );
        if threshold <= 0.0 {
            break;
        }
    }

    (threshold, steps)
}

/// Embedding similarity matcher bound to one query
#[derive(Clone)]
pub struct SemanticMatcher {
    embedder: Arc<dyn Embedder>,
    cache: Arc<EmbeddingCache>,
    options: SemanticOptions,
    query_vector: Arc<[f32]>,
}

impl SemanticMatcher {
    /// Embed the query (through the cache) and bind the matcher to it
    pub fn new(
        query: &str,
        embedder: Arc<dyn Embedder>,
        cache: Arc<EmbeddingCache>,
        options: SemanticOptions,
    ) -> Result<Self> {
        let query_vector = cache.get_or_compute_query(embedder.as_ref(), query)?;
        Ok(Self {
            embedder,
            cache,
            options,
            query_vector,
        })
    }

    pub fn options(&self) -> &SemanticOptions {
        &self.options
    }

    pub fn model_version(&self) -> &str {
        self.embedder.name()
    }

    /// Cosine similarity between the query and one message
    pub fn similarity(&self, message: &Message) -> Result<f32> {
        let vector = self
            .cache
            .get_or_compute(self.embedder.as_ref(), &message.id, &message.text)?;
        Ok(cosine_similarity(&self.query_vector, &vector))
    }

    /// Similarities for a candidate set, batching cache misses
    pub fn similarities(&self, candidates: &[&Message]) -> Result<Vec<f32>> {
        let model = self.embedder.name();
        let mut vectors: Vec<Option<Arc<[f32]>>> = Vec::with_capacity(candidates.len());
        let mut missing: Vec<usize> = Vec::new();

        for (i, message) in candidates.iter().enumerate() {
            let cached = self.cache.get(&CacheKey::new(model, &message.id));
            if cached.is_none() {
                missing.push(i);
            }
            vectors.push(cached);
        }

        if !missing.is_empty() {
            let texts: Vec<&str> = missing.iter().map(|i| candidates[*i].text.as_str()).collect();
            let computed = self.embedder.embed_batch(&texts)?;
            if computed.len() != texts.len() {
                return Err(SearchError::EmbeddingUnavailable(format!(
                    "{} returned {} vectors for {} texts",
                    model,
                    computed.len(),
                    texts.len()
                )));
            }
            for (i, vector) in missing.into_iter().zip(computed) {
                let key = CacheKey::new(model, &candidates[i].id);
                vectors[i] = Some(self.cache.insert(key, vector));
            }
        }

        Ok(vectors
            .into_iter()
            .map(|v| match v {
                Some(vector) => cosine_similarity(&self.query_vector, &vector),
                None => 0.0,
            })
            .collect())
    }

    /// Score every candidate and keep those clearing the relaxed threshold
    pub fn match_candidates(&self, candidates: &[&Message]) -> Result<SemanticMatches> {
        let similarities = self.similarities(candidates)?;
        let (threshold, relaxation_steps) = relaxed_threshold(&similarities, &self.options);

        if relaxation_steps > 0 {
            tracing::debug!(
                threshold,
                relaxation_steps,
                candidates = candidates.len(),
                "Relaxed semantic threshold"
            );
        }

        let results = candidates
            .iter()
            .zip(similarities)
            .filter(|(_, similarity)| *similarity >= threshold)
            .map(|(message, similarity)| {
                StrategyResult::hit(&message.id, Strategy::Semantic, f64::from(similarity))
            })
            .collect();

        Ok(SemanticMatches {
            results,
            threshold,
            relaxation_steps,
        })
    }
}

impl Matcher for SemanticMatcher {
    fn strategy(&self) -> Strategy {
        Strategy::Semantic
    }

    /// Single-message evaluation against the base threshold
    fn evaluate(&self, message: &Message) -> Result<StrategyResult> {
        let similarity = self.similarity(message)?;
        if similarity >= self.options.similarity_threshold {
            Ok(StrategyResult::hit(
                &message.id,
                Strategy::Semantic,
                f64::from(similarity),
            ))
        } else {
            Ok(StrategyResult::miss(&message.id, Strategy::Semantic))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::EvictionPolicy;
    use crate::test_support::{message, ShortBatchEmbedder, TopicEmbedder};

    fn options() -> SemanticOptions {
        SemanticOptions {
            similarity_threshold: 0.30,
            min_results: 1,
            relaxation_step: 0.05,
            max_relaxation_steps: 2,
            ..Default::default()
        }
    }

    fn matcher(query: &str, options: SemanticOptions) -> SemanticMatcher {
        SemanticMatcher::new(
            query,
            Arc::new(TopicEmbedder),
            Arc::new(EmbeddingCache::new(100, EvictionPolicy::Lru)),
            options,
        )
        .unwrap()
    }

    #[test]
    fn test_relaxed_threshold_no_relaxation_needed() {
        let (threshold, steps) = relaxed_threshold(&[0.9, 0.1], &options());
        assert_eq!(steps, 0);
        assert!((threshold - 0.30).abs() < 1e-6);
    }

    #[test]
    fn test_relaxed_threshold_steps_down() {
        let (threshold, steps) = relaxed_threshold(&[0.26, 0.1], &options());
        assert_eq!(steps, 1);
        assert!((threshold - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_relaxed_threshold_budget_exhausted() {
        let (threshold, steps) = relaxed_threshold(&[0.05], &options());
        assert_eq!(steps, 2);
        assert!((threshold - 0.20).abs() < 1e-6);
    }

    #[test]
    fn test_relaxed_threshold_never_negative() {
        let opts = SemanticOptions {
            similarity_threshold: 0.05,
            relaxation_step: 0.1,
            max_relaxation_steps: 5,
            ..options()
        };
        let (threshold, steps) = relaxed_threshold(&[-0.5], &opts);
        assert_eq!(threshold, 0.0);
        assert_eq!(steps, 1);
    }

    #[test]
    fn test_min_results_drives_relaxation() {
        let opts = SemanticOptions {
            min_results: 2,
            ..options()
        };
        let (_, steps) = relaxed_threshold(&[0.9, 0.27], &opts);
        assert_eq!(steps, 1);
    }

    #[test]
    fn test_match_candidates_scores_are_similarities() {
        let m = matcher("continuous integration pipeline", options());
        let ci = message("m1", "2024-05-13", "Updated the CICD pipeline");
        let lunch = message("m2", "2024-05-20", "Team lunch?");

        let matches = m.match_candidates(&[&ci, &lunch]).unwrap();
        assert_eq!(matches.results.len(), 1);
        assert_eq!(matches.results[0].message_id, "m1");
        assert!(matches.results[0].score > 0.3 && matches.results[0].score <= 1.0);
        assert_eq!(matches.relaxation_steps, 0);
    }

    #[test]
    fn test_evaluate_uses_base_threshold() {
        let m = matcher("continuous integration pipeline", options());
        let lunch = message("m2", "2024-05-20", "Team lunch?");
        assert!(!m.evaluate(&lunch).unwrap().matched);
    }

    #[test]
    fn test_embeddings_are_cached() {
        let cache = Arc::new(EmbeddingCache::new(100, EvictionPolicy::Lru));
        let m = SemanticMatcher::new(
            "deploy",
            Arc::new(TopicEmbedder),
            Arc::clone(&cache),
            options(),
        )
        .unwrap();
        let msg = message("m1", "2024-05-13", "deploy failed");

        m.match_candidates(&[&msg]).unwrap();
        m.match_candidates(&[&msg]).unwrap();

        // query + one message
        assert_eq!(cache.len(), 2);
        assert!(cache.metrics().hits >= 1);
    }

    #[test]
    fn test_short_batch_is_an_error() {
        let m = SemanticMatcher::new(
            "deploy",
            Arc::new(ShortBatchEmbedder),
            Arc::new(EmbeddingCache::new(100, EvictionPolicy::Lru)),
            options(),
        )
        .unwrap();
        let a = message("m1", "2024-05-13", "deploy failed");
        let b = message("m2", "2024-05-14", "deploy fixed");

        let err = m.match_candidates(&[&a, &b]).unwrap_err();
        assert!(matches!(err, SearchError::EmbeddingUnavailable(_)));
    }
}
