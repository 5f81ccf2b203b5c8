//! Error types for the search engine
//!
//! Input errors are rejected before any message is fetched. Upstream and
//! strategy errors are decided per call by the orchestrator.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for search operations
pub type Result<T> = std::result::Result<T, SearchError>;

/// Errors that can occur during a search call
#[derive(Debug, Error)]
pub enum SearchError {
    /// The query does not compile as a regular expression
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// A date parameter is not a valid YYYY-MM-DD date
    #[error("Invalid date for '{field}': '{value}' must be in YYYY-MM-DD format")]
    InvalidDate { field: &'static str, value: String },

    /// Any other malformed request parameter
    #[error("Invalid value for '{field}': {reason}")]
    InvalidQuery { field: &'static str, reason: String },

    /// The message source failed for a space
    #[error("Failed to fetch messages from {space}: {reason}")]
    UpstreamFetch { space: String, reason: String },

    /// The embedding model cannot produce vectors
    #[error("Embedding model unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// The caller deadline expired; partial results are discarded
    #[error("Search timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// A worker task panicked or was cancelled
    #[error("Search task failed: {0}")]
    Task(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl SearchError {
    /// Stable error code for JSON responses
    pub const fn error_type(&self) -> &'static str {
        match self {
            Self::InvalidPattern { .. } => "INVALID_PATTERN",
            Self::InvalidDate { .. } => "INVALID_DATE",
            Self::InvalidQuery { .. } => "INVALID_QUERY",
            Self::UpstreamFetch { .. } => "UPSTREAM_FETCH",
            Self::EmbeddingUnavailable(_) => "EMBEDDING_UNAVAILABLE",
            Self::Timeout(_) => "TIMEOUT",
            Self::Task(_) => "TASK_FAILED",
            Self::Config(_) => "CONFIG",
            Self::Io(_) => "IO_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::Yaml(_) => "YAML_ERROR",
        }
    }

    /// Request field at fault, if the error is tied to one
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::InvalidPattern { .. } => Some("query"),
            Self::InvalidDate { field, .. } | Self::InvalidQuery { field, .. } => Some(*field),
            _ => None,
        }
    }

    /// Whether the caller can fix this by changing the request
    pub const fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidPattern { .. } | Self::InvalidDate { .. } | Self::InvalidQuery { .. }
        )
    }

    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidQuery {
            field,
            reason: reason.into(),
        }
    }
}
