//! Date parsing and date windows
//!
//! Window bounds follow the upstream chat API filter convention:
//! `createTime > from` and `createTime < to`, with both bounds at midnight UTC.
//! A single day is therefore `[day, day + 1)` from the caller's side.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

use super::error::{Result, SearchError};

/// Parse a `YYYY-MM-DD` request parameter
pub fn parse_date(field: &'static str, value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| SearchError::InvalidDate {
        field,
        value: value.to_string(),
    })
}

/// Parse an optional date parameter, treating blank strings as absent
pub fn parse_optional_date(field: &'static str, value: Option<&str>) -> Result<Option<NaiveDate>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => parse_date(field, v).map(Some),
    }
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0)
        .unwrap_or_default()
        .and_utc()
}

/// Format a timestamp the way the chat API filter grammar expects
///
/// Microseconds are kept only when non-zero, always with a `Z` suffix.
pub fn rfc3339_format(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// An optional `(from, to)` window over message creation times
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DateWindow {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateWindow {
    /// Build a window from request dates
    ///
    /// Fails when both bounds are present and the window is empty.
    pub fn from_dates(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Result<Self> {
        if let (Some(f), Some(t)) = (from, to) {
            if f >= t {
                return Err(SearchError::invalid(
                    "end_date",
                    format!("end_date {} must be after start_date {}", t, f),
                ));
            }
        }

        Ok(Self {
            from: from.map(start_of_day),
            to: to.map(start_of_day),
        })
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn is_unbounded(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    /// Strict containment: strictly after `from`, strictly before `to`
    pub fn contains(&self, ts: &DateTime<Utc>) -> bool {
        if let Some(from) = &self.from {
            if ts <= from {
                return false;
            }
        }
        if let Some(to) = &self.to {
            if ts >= to {
                return false;
            }
        }
        true
    }

    /// Render as a chat API filter expression, or `None` when unbounded
    pub fn filter_string(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(from) = &self.from {
            parts.push(format!("createTime > \"{}\"", rfc3339_format(from)));
        }
        if let Some(to) = &self.to {
            parts.push(format!("createTime < \"{}\"", rfc3339_format(to)));
        }

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" AND "))
        }
    }
}
