//! Message sources
//!
//! The engine reads messages through [`MessageSource`]; transport and
//! credentials live behind it. Adapters may push the date window down to the
//! upstream API, but the engine re-applies strict filtering locally.

use async_trait::async_trait;

use crate::core::datetime::DateWindow;
use crate::core::error::Result;
use crate::core::message::Message;

pub mod file;
pub mod filter;
pub mod memory;

pub use file::JsonFileSource;
pub use filter::MessageFilter;
pub use memory::InMemorySource;

/// Per-space fetch parameters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchOptions {
    /// Window to push down; unbounded for the semantic fallback fetch
    pub window: DateWindow,
    /// Upper bound on messages returned for the space
    pub limit: usize,
    /// Caller-supplied upstream filter expression
    pub extra_filter: Option<String>,
}

impl FetchOptions {
    /// Extra filter for adapters that evaluate it locally
    pub fn message_filter(&self) -> Result<MessageFilter> {
        match &self.extra_filter {
            Some(expression) => MessageFilter::parse(expression),
            None => Ok(MessageFilter::default()),
        }
    }

    /// Upstream filter expression: the window plus any extra filter
    pub fn filter_string(&self) -> Option<String> {
        let extra = self
            .extra_filter
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty());

        match (self.window.filter_string(), extra) {
            (Some(window), Some(extra)) => Some(format!("{} AND {}", window, extra)),
            (Some(window), None) => Some(window),
            (None, Some(extra)) => Some(extra.to_string()),
            (None, None) => None,
        }
    }
}

/// Supplier of chat messages, one space at a time
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Source name for logging
    fn name(&self) -> &str;

    /// Every space the caller can read
    async fn list_spaces(&self) -> Result<Vec<String>>;

    /// Messages of one space, newest first or in any stable order
    async fn list_messages(&self, space: &str, options: &FetchOptions) -> Result<Vec<Message>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_filter_string_combines_window_and_extra() {
        let window = DateWindow::from_dates(NaiveDate::from_ymd_opt(2024, 5, 18), None).unwrap();
        let options = FetchOptions {
            window,
            limit: 100,
            extra_filter: Some("threadName = \"spaces/A/threads/t1\"".to_string()),
        };
        assert_eq!(
            options.filter_string().unwrap(),
            "createTime > \"2024-05-18T00:00:00Z\" AND threadName = \"spaces/A/threads/t1\""
        );
    }

    #[test]
    fn test_filter_string_empty() {
        let options = FetchOptions {
            extra_filter: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(options.filter_string().is_none());
    }
}
