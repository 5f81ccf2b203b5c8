//! Multi-strategy message search
//!
//! - Matchers: regex pattern, literal substring, semantic similarity
//! - Date policy: strict window for pattern/literal, soft window with one
//!   fallback pass for semantic
//! - Fusion: weighted sum or reciprocal rank plus a multi-strategy bonus
//! - Pagination: stateless page tokens over the ranked list

pub mod cache;
pub mod date_policy;
pub mod embedder;
pub mod fusion;
pub mod matcher;
pub mod normalize;
pub mod orchestrator;
pub mod pagination;
pub mod params;
pub mod query;
pub mod semantic;

pub use cache::{CacheKey, CacheMetrics, EmbeddingCache, ItemKind};
pub use embedder::{create_embedder, Embedder, HashingEmbedder};
#[cfg(feature = "model2vec")]
pub use embedder::Model2VecEmbedder;
pub use fusion::{FusedResult, FusionConfig};
pub use matcher::{LiteralMatcher, Matcher, PatternMatcher, StrategyResult};
pub use orchestrator::{FetchReport, SearchEngine, SearchOutcome, SpaceStatus};
pub use pagination::{Page, PageToken};
pub use params::{ErrorResponse, MessageHit, SearchMetadata, SearchParams, SearchResponse};
pub use query::{SearchMode, SearchQuery, Strategy};
pub use semantic::SemanticMatcher;
