//! Query model: strategies, modes and the validated per-call query

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::core::datetime::DateWindow;
use crate::core::error::{Result, SearchError};
use crate::source::MessageFilter;

/// One independent matching algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Regular expression matching
    Regex,
    /// Case-insensitive substring matching
    Exact,
    /// Embedding similarity
    Semantic,
}

impl Strategy {
    pub const ALL: [Strategy; 3] = [Strategy::Regex, Strategy::Exact, Strategy::Semantic];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Regex => "regex",
            Strategy::Exact => "exact",
            Strategy::Semantic => "semantic",
        }
    }

    /// Pattern and literal matching treat the date window as a hard filter
    pub fn has_strict_date_filter(&self) -> bool {
        !matches!(self, Strategy::Semantic)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Search mode requested by the caller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    #[default]
    Regex,
    Exact,
    Semantic,
    /// All enabled strategies, fused
    Hybrid,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Regex => "regex",
            SearchMode::Exact => "exact",
            SearchMode::Semantic => "semantic",
            SearchMode::Hybrid => "hybrid",
        }
    }

    /// Strategies implied by this mode, before config filtering
    pub fn strategies(&self) -> Vec<Strategy> {
        match self {
            SearchMode::Regex => vec![Strategy::Regex],
            SearchMode::Exact => vec![Strategy::Exact],
            SearchMode::Semantic => vec![Strategy::Semantic],
            SearchMode::Hybrid => Strategy::ALL.to_vec(),
        }
    }
}

impl FromStr for SearchMode {
    type Err = SearchError;

    /// Parse search mode from string
    ///
    /// # Examples
    /// ```
    /// use chat_search::search::SearchMode;
    /// assert_eq!("semantic".parse::<SearchMode>().unwrap(), SearchMode::Semantic);
    /// assert_eq!("pattern".parse::<SearchMode>().unwrap(), SearchMode::Regex);
    /// assert_eq!("literal".parse::<SearchMode>().unwrap(), SearchMode::Exact);
    /// assert!("fuzzy".parse::<SearchMode>().is_err());
    /// ```
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "regex" | "pattern" => Ok(SearchMode::Regex),
            "exact" | "literal" => Ok(SearchMode::Exact),
            "semantic" => Ok(SearchMode::Semantic),
            "hybrid" => Ok(SearchMode::Hybrid),
            other => Err(SearchError::invalid(
                "search_mode",
                format!(
                    "unknown mode '{}', expected one of regex, exact, semantic, hybrid",
                    other
                ),
            )),
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated, immutable search request
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub raw_query: String,
    pub mode: SearchMode,
    /// `None` searches every space the source can see
    pub target_spaces: Option<BTreeSet<String>>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub max_results: usize,
    pub extra_filter: Option<String>,
}

impl SearchQuery {
    pub fn new(raw_query: impl Into<String>, mode: SearchMode) -> Self {
        Self {
            raw_query: raw_query.into(),
            mode,
            target_spaces: None,
            date_from: None,
            date_to: None,
            max_results: 50,
            extra_filter: None,
        }
    }

    pub fn with_spaces<I, S>(mut self, spaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.target_spaces = Some(spaces.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_dates(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.date_from = from;
        self.date_to = to;
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    /// Check invariants that do not depend on configuration
    pub fn validate(&self) -> Result<()> {
        if self.raw_query.trim().is_empty() {
            return Err(SearchError::invalid("query", "query must not be empty"));
        }
        if self.max_results == 0 {
            return Err(SearchError::invalid(
                "max_results",
                "max_results must be at least 1",
            ));
        }
        if let Some(spaces) = &self.target_spaces {
            if spaces.is_empty() {
                return Err(SearchError::invalid("spaces", "spaces must not be empty"));
            }
        }
        if let Some(filter) = &self.extra_filter {
            MessageFilter::parse(filter)?;
        }
        self.window()?;
        Ok(())
    }

    pub fn window(&self) -> Result<DateWindow> {
        DateWindow::from_dates(self.date_from, self.date_to)
    }

    /// Stable fingerprint of every parameter that shapes the ranked list
    ///
    /// Page size and presentation flags are deliberately left out so a caller
    /// may change them between pages.
    pub fn signature(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(b"q\0");
        hasher.update(self.raw_query.as_bytes());
        hasher.update(b"\0m\0");
        hasher.update(self.mode.as_str().as_bytes());
        hasher.update(b"\0s\0");
        match &self.target_spaces {
            Some(spaces) => {
                for space in spaces {
                    hasher.update(space.as_bytes());
                    hasher.update(b"\x1f");
                }
            }
            None => hasher.update(b"*"),
        }
        hasher.update(b"\0f\0");
        if let Some(from) = self.date_from {
            hasher.update(from.to_string().as_bytes());
        }
        hasher.update(b"\0t\0");
        if let Some(to) = self.date_to {
            hasher.update(to.to_string().as_bytes());
        }
        hasher.update(b"\0n\0");
        hasher.update(self.max_results.to_le_bytes());
        hasher.update(b"\0x\0");
        if let Some(filter) = &self.extra_filter {
            hasher.update(filter.as_bytes());
        }

        let digest = hasher.finalize();
        hex::encode(&digest[..12])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_mode_from_str() {
        assert_eq!("regex".parse::<SearchMode>().unwrap(), SearchMode::Regex);
        assert_eq!("REGEX".parse::<SearchMode>().unwrap(), SearchMode::Regex);
        assert_eq!("exact".parse::<SearchMode>().unwrap(), SearchMode::Exact);
        assert_eq!(" Hybrid ".parse::<SearchMode>().unwrap(), SearchMode::Hybrid);

        let err = "bm25".parse::<SearchMode>().unwrap_err();
        assert_eq!(err.field(), Some("search_mode"));
    }

    #[test]
    fn test_search_mode_default() {
        assert_eq!(SearchMode::default(), SearchMode::Regex);
    }

    #[test]
    fn test_hybrid_runs_all_strategies() {
        assert_eq!(SearchMode::Hybrid.strategies().len(), 3);
        assert_eq!(SearchMode::Exact.strategies(), vec![Strategy::Exact]);
    }

    #[test]
    fn test_strict_date_filter_classes() {
        assert!(Strategy::Regex.has_strict_date_filter());
        assert!(Strategy::Exact.has_strict_date_filter());
        assert!(!Strategy::Semantic.has_strict_date_filter());
    }

    #[test]
    fn test_validate() {
        assert!(SearchQuery::new("cicd", SearchMode::Regex).validate().is_ok());

        let err = SearchQuery::new("   ", SearchMode::Regex).validate().unwrap_err();
        assert_eq!(err.field(), Some("query"));

        let err = SearchQuery::new("x", SearchMode::Regex)
            .with_max_results(0)
            .validate()
            .unwrap_err();
        assert_eq!(err.field(), Some("max_results"));

        let empty: Vec<String> = vec![];
        let err = SearchQuery::new("x", SearchMode::Regex)
            .with_spaces(empty)
            .validate()
            .unwrap_err();
        assert_eq!(err.field(), Some("spaces"));

        let mut query = SearchQuery::new("x", SearchMode::Regex);
        query.extra_filter = Some(r#"space = "spaces/A""#.to_string());
        assert_eq!(query.validate().unwrap_err().field(), Some("filter_str"));
    }

    #[test]
    fn test_signature_is_stable_and_order_independent() {
        let a = SearchQuery::new("cicd", SearchMode::Hybrid).with_spaces(["spaces/B", "spaces/A"]);
        let b = SearchQuery::new("cicd", SearchMode::Hybrid).with_spaces(["spaces/A", "spaces/B"]);
        assert_eq!(a.signature(), b.signature());
        assert_eq!(a.signature().len(), 24);
    }

    #[test]
    fn test_signature_tracks_ranking_parameters() {
        let base = SearchQuery::new("cicd", SearchMode::Regex);
        let other_mode = SearchQuery::new("cicd", SearchMode::Exact);
        let other_limit = SearchQuery::new("cicd", SearchMode::Regex).with_max_results(10);
        let other_date = SearchQuery::new("cicd", SearchMode::Regex)
            .with_dates(NaiveDate::from_ymd_opt(2024, 5, 18), None);

        assert_ne!(base.signature(), other_mode.signature());
        assert_ne!(base.signature(), other_limit.signature());
        assert_ne!(base.signature(), other_date.signature());
    }
}
