//! Extra filter expressions
//!
//! The subset of the chat API filter dialect that local adapters evaluate:
//! `field = "value"` clauses joined by `AND`. Date bounds belong in the
//! query's date window, not here.

use lazy_static::lazy_static;
use regex::Regex;

use crate::core::error::{Result, SearchError};
use crate::core::message::Message;

lazy_static! {
    static ref AND_SEPARATOR: Regex = Regex::new(r"\s+AND\s+").unwrap();
    static ref CLAUSE: Regex = Regex::new(r#"^\s*([A-Za-z][A-Za-z.]*)\s*=\s*"([^"]*)"\s*$"#).unwrap();
}

/// Message attribute a clause tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterField {
    /// `thread.name` or `threadName`
    Thread,
    /// `sender.name` or `sender`
    Sender,
}

impl FilterField {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "thread.name" | "threadName" => Some(FilterField::Thread),
            "sender.name" | "sender" => Some(FilterField::Sender),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterClause {
    pub field: FilterField,
    pub value: String,
}

/// Conjunction of equality clauses; empty matches everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageFilter {
    clauses: Vec<FilterClause>,
}

impl MessageFilter {
    /// Parse a filter expression
    ///
    /// # Errors
    /// `InvalidQuery` on `filter_str` for anything outside the supported subset.
    pub fn parse(expression: &str) -> Result<Self> {
        let expression = expression.trim();
        if expression.is_empty() {
            return Ok(Self::default());
        }

        let mut clauses = Vec::new();
        for part in AND_SEPARATOR.split(expression) {
            let caps = CLAUSE.captures(part).ok_or_else(|| {
                SearchError::invalid(
                    "filter_str",
                    format!("unsupported filter clause '{}'", part.trim()),
                )
            })?;
            let name = &caps[1];
            let field = FilterField::parse(name).ok_or_else(|| {
                SearchError::invalid(
                    "filter_str",
                    format!(
                        "unsupported filter field '{}' (use thread.name or sender.name; dates go in start_date/end_date)",
                        name
                    ),
                )
            })?;
            clauses.push(FilterClause {
                field,
                value: caps[2].to_string(),
            });
        }

        Ok(Self { clauses })
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn clauses(&self) -> &[FilterClause] {
        &self.clauses
    }

    pub fn matches(&self, message: &Message) -> bool {
        self.clauses.iter().all(|clause| match clause.field {
            FilterField::Thread => message.thread_id.as_deref() == Some(clause.value.as_str()),
            FilterField::Sender => message.sender_id == clause.value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::message;

    #[test]
    fn test_parse_clauses() {
        let filter =
            MessageFilter::parse(r#"thread.name = "spaces/A/threads/t1" AND sender = "users/1""#)
                .unwrap();
        assert_eq!(
            filter.clauses(),
            &[
                FilterClause {
                    field: FilterField::Thread,
                    value: "spaces/A/threads/t1".to_string()
                },
                FilterClause {
                    field: FilterField::Sender,
                    value: "users/1".to_string()
                },
            ]
        );
        assert!(MessageFilter::parse("   ").unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_unsupported() {
        let err = MessageFilter::parse(r#"createTime > "2024-05-18T00:00:00Z""#).unwrap_err();
        assert_eq!(err.field(), Some("filter_str"));

        let err = MessageFilter::parse(r#"space = "spaces/A""#).unwrap_err();
        assert_eq!(err.field(), Some("filter_str"));

        let err = MessageFilter::parse("threadName = unquoted").unwrap_err();
        assert_eq!(err.error_type(), "INVALID_QUERY");
    }

    #[test]
    fn test_matches() {
        let threaded = message("m1", "2024-05-13", "cicd").with_thread("spaces/A/threads/t1");
        let plain = message("m2", "2024-05-13", "cicd");

        let filter = MessageFilter::parse(r#"threadName = "spaces/A/threads/t1""#).unwrap();
        assert!(filter.matches(&threaded));
        assert!(!filter.matches(&plain));

        let filter = MessageFilter::parse(r#"sender = "users/2""#).unwrap();
        assert!(!filter.matches(&plain));
        assert!(MessageFilter::default().matches(&plain));
    }
}
