//! Search call parameters and response shapes

use chrono::{Days, NaiveDate, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::fusion::FusedResult;
use super::query::{SearchMode, SearchQuery, Strategy};
use crate::core::config::Settings;
use crate::core::datetime::{parse_optional_date, rfc3339_format};
use crate::core::error::{Result, SearchError};

/// Parameters for one search call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SearchParams {
    /// Search text, or a regular expression in regex mode
    #[schemars(description = "Search text; a regular expression when search_mode is regex")]
    pub query: String,
    /// Search mode: "regex" (default), "exact", "semantic", "hybrid"
    #[schemars(description = "Search mode: 'regex' (default), 'exact', 'semantic', 'hybrid'")]
    #[serde(default)]
    pub search_mode: Option<String>,
    /// Space resource names; all accessible spaces when omitted
    #[schemars(description = "Space names to search (e.g., 'spaces/AAQA'); all spaces when omitted")]
    #[serde(default)]
    pub spaces: Option<Vec<String>>,
    /// Maximum number of ranked results across all spaces (default: 50)
    #[schemars(description = "Maximum results after ranking (default: 50)")]
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// Only messages created after this date (YYYY-MM-DD)
    #[schemars(description = "Start date, YYYY-MM-DD (exclusive of earlier messages)")]
    #[serde(default)]
    pub start_date: Option<String>,
    /// Only messages created before this date (YYYY-MM-DD)
    #[schemars(description = "End date, YYYY-MM-DD (exclusive)")]
    #[serde(default)]
    pub end_date: Option<String>,
    /// Sliding window: search the `days_window` days ending `offset` days ago
    #[schemars(
        description = "Days to look back, ending `offset` days before today (e.g., 3 = last 3 days). Cannot be combined with start_date/end_date"
    )]
    #[serde(default)]
    pub days_window: Option<u32>,
    /// Days between today and the end of the sliding window (default: 0)
    #[schemars(description = "Days to shift the sliding window back from today (requires days_window)")]
    #[serde(default)]
    pub offset: Option<u32>,
    /// Include sender id and display name in results
    #[schemars(description = "Include sender information in results")]
    #[serde(default)]
    pub include_sender_info: bool,
    /// Extra upstream filter expression
    #[schemars(description = "Additional upstream filter expression")]
    #[serde(default)]
    pub filter_str: Option<String>,
    /// Results per page (default: max_results)
    #[schemars(description = "Results per page (default: max_results)")]
    #[serde(default)]
    pub page_size: Option<usize>,
    /// Token from a previous response to fetch the next page
    #[schemars(description = "next_page_token from a previous call")]
    #[serde(default)]
    pub page_token: Option<String>,
}

pub fn default_max_results() -> usize {
    50
}

impl SearchParams {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            max_results: default_max_results(),
            ..Default::default()
        }
    }

    pub fn with_mode(mut self, mode: SearchMode) -> Self {
        self.search_mode = Some(mode.as_str().to_string());
        self
    }

    pub fn with_spaces<I, S>(mut self, spaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spaces = Some(spaces.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_dates(mut self, start: Option<&str>, end: Option<&str>) -> Self {
        self.start_date = start.map(String::from);
        self.end_date = end.map(String::from);
        self
    }

    pub fn with_days_window(mut self, days_window: u32, offset: u32) -> Self {
        self.days_window = Some(days_window);
        self.offset = Some(offset);
        self
    }

    /// Validate and convert into an immutable query, relative to today (UTC)
    ///
    /// # Errors
    /// Input errors naming the offending field; nothing is fetched yet.
    pub fn to_query(&self, settings: &Settings) -> Result<SearchQuery> {
        self.to_query_at(settings, Utc::now().date_naive())
    }

    /// Same as [`Self::to_query`] with an explicit current date
    pub fn to_query_at(&self, settings: &Settings, today: NaiveDate) -> Result<SearchQuery> {
        let mode = match self.search_mode.as_deref().map(str::trim) {
            None | Some("") => settings.search.default_mode,
            Some(mode) => mode.parse()?,
        };
        let (date_from, date_to) = self.resolve_dates(today)?;

        let mut query = SearchQuery::new(self.query.clone(), mode)
            .with_dates(date_from, date_to)
            .with_max_results(self.max_results);
        if let Some(spaces) = &self.spaces {
            query = query.with_spaces(spaces.iter().map(|s| s.trim().to_string()));
        }
        query.extra_filter = self
            .filter_str
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(String::from);

        query.validate()?;
        Ok(query)
    }

    /// Date bounds from either explicit dates or the sliding window
    ///
    /// The sliding window covers whole days: with `today` = 2024-05-20,
    /// `days_window` = 3 and `offset` = 0 it spans 2024-05-17 through
    /// 2024-05-20, i.e. `date_from` = 05-17 and `date_to` = 05-21.
    pub fn resolve_dates(&self, today: NaiveDate) -> Result<(Option<NaiveDate>, Option<NaiveDate>)> {
        let explicit = self.start_date.is_some() || self.end_date.is_some();
        match (self.days_window, self.offset) {
            (None, None) => Ok((
                parse_optional_date("start_date", self.start_date.as_deref())?,
                parse_optional_date("end_date", self.end_date.as_deref())?,
            )),
            (None, Some(_)) => Err(SearchError::invalid("offset", "offset requires days_window")),
            (Some(_), _) if explicit => Err(SearchError::invalid(
                "days_window",
                "days_window cannot be combined with start_date or end_date",
            )),
            (Some(0), _) => Err(SearchError::invalid(
                "days_window",
                "days_window must be at least 1",
            )),
            (Some(days), offset) => {
                let out_of_range = || SearchError::invalid("offset", "date window out of range");
                let end = today
                    .checked_sub_days(Days::new(u64::from(offset.unwrap_or(0))))
                    .ok_or_else(out_of_range)?;
                let date_from = end
                    .checked_sub_days(Days::new(u64::from(days)))
                    .ok_or_else(out_of_range)?;
                let date_to = end.checked_add_days(Days::new(1)).ok_or_else(out_of_range)?;
                Ok((Some(date_from), Some(date_to)))
            }
        }
    }

    /// Page size, defaulting to `max_results`
    pub fn effective_page_size(&self) -> Result<usize> {
        match self.page_size {
            Some(0) => Err(SearchError::invalid(
                "page_size",
                "page_size must be at least 1",
            )),
            Some(size) => Ok(size),
            None => Ok(self.max_results.max(1)),
        }
    }
}

/// Sender details, present only when requested
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SenderInfo {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// One ranked message in a response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageHit {
    pub id: String,
    pub space: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread: Option<String>,
    pub create_time: String,
    pub text: String,
    pub score: f64,
    pub matched_by: Vec<Strategy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<SenderInfo>,
}

impl MessageHit {
    pub fn from_fused(result: FusedResult, include_sender: bool) -> Self {
        let message = result.message;
        let sender = include_sender.then(|| SenderInfo {
            id: message.sender_id.clone(),
            display_name: message.sender_name.clone(),
        });

        Self {
            create_time: rfc3339_format(&message.create_time),
            id: message.id,
            space: message.space_id,
            thread: message.thread_id,
            text: message.text,
            score: result.combined_score,
            matched_by: result.contributing_strategies.into_iter().collect(),
            sender,
        }
    }
}

/// What the call searched and how
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchMetadata {
    pub mode: String,
    pub strategies: Vec<Strategy>,
    /// Spaces fetched successfully
    pub searched_spaces: Vec<String>,
    /// Spaces whose fetch failed; their messages are absent
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_spaces: Vec<String>,
    /// Strategies skipped for this call, e.g. an unavailable embedder
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped_strategies: Vec<Strategy>,
    pub messages_searched: usize,
    /// Length of the ranked list before pagination
    pub total_results: usize,
    /// Semantic matches came from the pass without the date window
    pub semantic_date_fallback: bool,
}

/// Response of one search call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResponse {
    pub messages: Vec<MessageHit>,
    pub next_page_token: Option<String>,
    pub search_metadata: SearchMetadata,
}

/// Error body for JSON output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorResponse {
    pub error_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}

impl From<&SearchError> for ErrorResponse {
    fn from(err: &SearchError) -> Self {
        Self {
            error_type: err.error_type().to_string(),
            field: err.field().map(String::from),
            message: err.to_string(),
        }
    }
}
