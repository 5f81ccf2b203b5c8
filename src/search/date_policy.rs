//! Date filter policy
//!
//! Pattern and literal strategies treat the window as a hard filter applied
//! before matching; an empty outcome stays empty. The semantic strategy
//! treats it as a preference: a window pass first, and when that yields
//! nothing, exactly one fallback pass over every candidate.

use super::matcher::{Matcher, StrategyResult};
use super::query::Strategy;
use super::semantic::{SemanticMatcher, SemanticMatches};
use crate::core::datetime::DateWindow;
use crate::core::error::Result;
use crate::core::message::Message;

/// How a strategy treats the date window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateTreatment {
    /// Out-of-window messages are never evaluated
    Strict,
    /// Window first, then one unbounded fallback pass if nothing matched
    SoftPreference,
}

impl DateTreatment {
    pub fn for_strategy(strategy: Strategy) -> Self {
        if strategy.has_strict_date_filter() {
            DateTreatment::Strict
        } else {
            DateTreatment::SoftPreference
        }
    }
}

/// Messages inside the window, in input order
pub fn within_window<'a>(messages: &'a [Message], window: &DateWindow) -> Vec<&'a Message> {
    messages
        .iter()
        .filter(|m| window.contains(&m.create_time))
        .collect()
}

/// Run a strict-window strategy; returns matched results only
pub fn run_strict(
    matcher: &dyn Matcher,
    messages: &[Message],
    window: &DateWindow,
) -> Result<Vec<StrategyResult>> {
    let mut hits = Vec::new();
    for message in within_window(messages, window) {
        let result = matcher.evaluate(message)?;
        if result.matched {
            hits.push(result);
        }
    }
    Ok(hits)
}

/// Outcome of the semantic window pass plus optional fallback
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticOutcome {
    pub matches: SemanticMatches,
    /// True when the window pass was empty and the unbounded pass ran
    pub fell_back: bool,
}

/// Semantic pass over the in-window candidates
pub fn semantic_window_pass(
    matcher: &SemanticMatcher,
    messages: &[Message],
    window: &DateWindow,
) -> Result<SemanticMatches> {
    matcher.match_candidates(&within_window(messages, window))
}

/// Whether the window pass calls for the single unbounded pass
pub fn needs_fallback(window_pass: &SemanticMatches, window: &DateWindow) -> bool {
    window_pass.is_empty() && !window.is_unbounded()
}

/// The unbounded pass; `candidates` must not be date filtered
pub fn semantic_fallback_pass(
    matcher: &SemanticMatcher,
    candidates: &[Message],
) -> Result<SemanticMatches> {
    let all: Vec<&Message> = candidates.iter().collect();
    let fallback = matcher.match_candidates(&all)?;
    tracing::info!(
        candidates = all.len(),
        matches = fallback.results.len(),
        "No semantic matches in date window, searched without it"
    );
    Ok(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{EvictionPolicy, PatternOptions, SemanticOptions};
    use crate::search::cache::EmbeddingCache;
    use crate::search::matcher::PatternMatcher;
    use crate::test_support::{message, TopicEmbedder};
    use chrono::NaiveDate;
    use std::sync::Arc;

    fn day(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    fn corpus() -> Vec<Message> {
        vec![
            message("m1", "2024-05-13", "Updated the CICD pipeline"),
            message("m2", "2024-05-20", "Team lunch?"),
        ]
    }

    fn semantic(query: &str) -> SemanticMatcher {
        SemanticMatcher::new(
            query,
            Arc::new(TopicEmbedder),
            Arc::new(EmbeddingCache::new(64, EvictionPolicy::Lru)),
            SemanticOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_treatment_by_strategy() {
        assert_eq!(DateTreatment::for_strategy(Strategy::Regex), DateTreatment::Strict);
        assert_eq!(DateTreatment::for_strategy(Strategy::Exact), DateTreatment::Strict);
        assert_eq!(
            DateTreatment::for_strategy(Strategy::Semantic),
            DateTreatment::SoftPreference
        );
    }

    #[test]
    fn test_strict_filter_excludes_out_of_window_match() {
        let matcher = PatternMatcher::new("cicd", &PatternOptions::default()).unwrap();
        let window = DateWindow::from_dates(day(2024, 5, 18), None).unwrap();

        let hits = run_strict(&matcher, &corpus(), &window).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_strict_filter_keeps_in_window_match() {
        let matcher = PatternMatcher::new("cicd", &PatternOptions::default()).unwrap();
        let window = DateWindow::from_dates(day(2024, 5, 13), day(2024, 5, 14)).unwrap();

        let hits = run_strict(&matcher, &corpus(), &window).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].message_id, "m1");
    }

    /// Window pass, then the fallback over the same candidates if needed
    fn run_semantic(matcher: &SemanticMatcher, messages: &[Message], window: &DateWindow) -> SemanticOutcome {
        let matches = semantic_window_pass(matcher, messages, window).unwrap();
        if !needs_fallback(&matches, window) {
            return SemanticOutcome {
                matches,
                fell_back: false,
            };
        }
        SemanticOutcome {
            matches: semantic_fallback_pass(matcher, messages).unwrap(),
            fell_back: true,
        }
    }

    #[test]
    fn test_semantic_falls_back_when_window_is_empty() {
        let window = DateWindow::from_dates(day(2024, 5, 18), None).unwrap();
        let outcome = run_semantic(&semantic("continuous integration pipeline"), &corpus(), &window);

        assert!(outcome.fell_back);
        assert_eq!(outcome.matches.results.len(), 1);
        assert_eq!(outcome.matches.results[0].message_id, "m1");
    }

    #[test]
    fn test_semantic_no_fallback_when_window_has_results() {
        let mut messages = corpus();
        messages.push(message("m3", "2024-05-21", "jenkins build broke again"));
        let window = DateWindow::from_dates(day(2024, 5, 18), None).unwrap();

        let outcome = run_semantic(&semantic("continuous integration pipeline"), &messages, &window);

        assert!(!outcome.fell_back);
        let ids: Vec<&str> = outcome
            .matches
            .results
            .iter()
            .map(|r| r.message_id.as_str())
            .collect();
        assert_eq!(ids, vec!["m3"]);
    }

    #[test]
    fn test_semantic_fallback_may_still_be_empty() {
        let window = DateWindow::from_dates(day(2024, 5, 18), None).unwrap();
        let outcome = run_semantic(&semantic("budget invoice"), &corpus(), &window);

        assert!(outcome.fell_back);
        assert!(outcome.matches.is_empty());
    }

    #[test]
    fn test_no_fallback_without_window() {
        let matches = semantic_window_pass(
            &semantic("budget invoice"),
            &corpus(),
            &DateWindow::unbounded(),
        )
        .unwrap();
        assert!(matches.is_empty());
        assert!(!needs_fallback(&matches, &DateWindow::unbounded()));
    }
}
