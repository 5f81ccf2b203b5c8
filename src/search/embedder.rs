//! Embedder trait and implementations for semantic matching
//!
//! The embedding model itself is an external collaborator. Provides:
//! - HashingEmbedder: word + character trigram projection (built-in, no model file)
//! - Model2VecEmbedder: static neural embeddings (requires model download)

use std::sync::Arc;

use crate::core::config::SemanticOptions;
use crate::core::error::{Result, SearchError};

/// Embedding model abstraction
pub trait Embedder: Send + Sync {
    /// Generate embedding for a single text
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Get embedding dimension
    fn dimension(&self) -> usize;

    /// Model name/version; part of every cache key
    fn name(&self) -> &str;
}

/// Calculate cosine similarity between two embeddings
///
/// Mismatched or zero vectors score 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a > 0.0 && norm_b > 0.0 {
        dot / (norm_a * norm_b)
    } else {
        0.0
    }
}

// ============================================================================
// Hashing Embedder
// ============================================================================

/// Dimension of the built-in hashing embedder
pub const HASHING_DIM: usize = 384;

const TRIGRAM_WEIGHT: f32 = 0.5;

/// Deterministic feature-hashing embedder
///
/// Words and character trigrams are hashed into signed buckets, then the
/// vector is L2-normalized. Captures lexical overlap and spelling variants,
/// not meaning; it keeps semantic mode usable without a model.
#[derive(Debug, Clone, Default)]
pub struct HashingEmbedder;

impl HashingEmbedder {
    pub fn new() -> Self {
        Self
    }

    fn fnv1a(bytes: &[u8]) -> u64 {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for b in bytes {
            hash ^= u64::from(*b);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        hash
    }

    fn add_feature(vector: &mut [f32], feature: &str, weight: f32) {
        let hash = Self::fnv1a(feature.as_bytes());
        let bucket = (hash % vector.len() as u64) as usize;
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

impl Embedder for HashingEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; HASHING_DIM];
        let lowered = text.to_lowercase();

        for word in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            Self::add_feature(&mut vector, word, 1.0);

            let padded: Vec<char> = format!("#{}#", word).chars().collect();
            for window in padded.windows(3) {
                let trigram: String = window.iter().collect();
                Self::add_feature(&mut vector, &trigram, TRIGRAM_WEIGHT);
            }
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        HASHING_DIM
    }

    fn name(&self) -> &str {
        "hashing-384"
    }
}

// ============================================================================
// Model2Vec Embedder
// ============================================================================

#[cfg(feature = "model2vec")]
pub use self::model2vec_embedder::Model2VecEmbedder;

#[cfg(feature = "model2vec")]
mod model2vec_embedder {
    use super::*;
    use model2vec::Model2Vec;
    use std::path::Path;

    /// Model2Vec based embedder
    pub struct Model2VecEmbedder {
        model: Model2Vec,
        model_id: String,
        dimension: usize,
    }

    impl Model2VecEmbedder {
        /// Load model from local path
        pub fn from_path(path: &Path) -> Result<Self> {
            let model = Model2Vec::from_pretrained(path.to_string_lossy().as_ref(), None, None)
                .map_err(|e| {
                    SearchError::EmbeddingUnavailable(format!(
                        "failed to load Model2Vec from {}: {}",
                        path.display(),
                        e
                    ))
                })?;
            Self::probe(model, path.to_string_lossy().to_string())
        }

        /// Load model from HuggingFace Hub
        pub fn from_pretrained(model_id: &str) -> Result<Self> {
            let model = Model2Vec::from_pretrained(model_id, None, None).map_err(|e| {
                SearchError::EmbeddingUnavailable(format!(
                    "failed to load Model2Vec {}: {}",
                    model_id, e
                ))
            })?;
            Self::probe(model, model_id.to_string())
        }

        fn probe(model: Model2Vec, model_id: String) -> Result<Self> {
            let embeddings = model
                .encode(&["probe"])
                .map_err(|e| SearchError::EmbeddingUnavailable(e.to_string()))?;
            let dimension = embeddings.row(0).len();
            Ok(Self {
                model,
                model_id,
                dimension,
            })
        }
    }

    impl Embedder for Model2VecEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let texts = [text];
            let embeddings = self
                .model
                .encode(&texts)
                .map_err(|e| SearchError::EmbeddingUnavailable(e.to_string()))?;
            Ok(embeddings.row(0).to_vec())
        }

        fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            let embeddings = self
                .model
                .encode(texts)
                .map_err(|e| SearchError::EmbeddingUnavailable(e.to_string()))?;
            Ok(embeddings.rows().into_iter().map(|r| r.to_vec()).collect())
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn name(&self) -> &str {
            &self.model_id
        }
    }
}

// ============================================================================
// Factory function
// ============================================================================

/// Create embedder based on semantic options
///
/// # Errors
/// Returns `EmbeddingUnavailable` when a model is configured but cannot be
/// loaded; the caller decides whether that is fatal.
pub fn create_embedder(options: &SemanticOptions) -> Result<Arc<dyn Embedder>> {
    if options.builtin_embedder {
        return Ok(Arc::new(HashingEmbedder::new()));
    }

    #[cfg(feature = "model2vec")]
    {
        let embedder = match &options.model_path {
            Some(path) => Model2VecEmbedder::from_path(std::path::Path::new(path))?,
            None => Model2VecEmbedder::from_pretrained(&options.model)?,
        };
        tracing::info!(model = embedder.name(), dim = embedder.dimension(), "Loaded embedding model");
        Ok(Arc::new(embedder))
    }

    #[cfg(not(feature = "model2vec"))]
    {
        Err(SearchError::EmbeddingUnavailable(
            "built without the model2vec feature".to_string(),
        ))
    }
}
