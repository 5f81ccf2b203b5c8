//! Chat message search engine
//!
//! Runs pattern, literal and semantic matching over chat messages, applies a
//! per-strategy date policy, fuses the scores into one ranking and pages
//! through it with stateless tokens.
//!
//! ```no_run
//! use std::sync::Arc;
//! use chat_search::core::Settings;
//! use chat_search::search::{SearchEngine, SearchMode, SearchParams};
//! use chat_search::source::JsonFileSource;
//!
//! # async fn demo() -> chat_search::core::Result<()> {
//! let source = Arc::new(JsonFileSource::load("export.json".as_ref())?);
//! let engine = SearchEngine::new(source, Settings::load(None)?)?;
//! let params = SearchParams::new("ci/?cd").with_mode(SearchMode::Hybrid);
//! let response = engine.search(&params).await?;
//! println!("{} results", response.messages.len());
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod search;
pub mod source;

#[cfg(test)]
pub(crate) mod test_support;
