//! Matcher strategies
//!
//! Each matcher is built once per call from the query and then evaluated
//! against every candidate message. Pattern and literal matchers report a
//! fixed normalized score of 1.0 on a match; weighting happens in fusion.

use regex::{Regex, RegexBuilder};

use super::normalize::{contraction_variants, fold_case, normalize_text};
use super::query::Strategy;
use crate::core::config::{LiteralOptions, PatternOptions};
use crate::core::error::{Result, SearchError};
use crate::core::message::Message;

/// Normalized score reported by presence-only strategies
pub const FIXED_MATCH_SCORE: f64 = 1.0;

/// Outcome of one strategy for one message
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyResult {
    pub message_id: String,
    pub strategy: Strategy,
    /// Normalized score in `[0, 1]`
    pub score: f64,
    pub matched: bool,
}

impl StrategyResult {
    pub fn hit(message_id: &str, strategy: Strategy, score: f64) -> Self {
        Self {
            message_id: message_id.to_string(),
            strategy,
            score,
            matched: true,
        }
    }

    pub fn miss(message_id: &str, strategy: Strategy) -> Self {
        Self {
            message_id: message_id.to_string(),
            strategy,
            score: 0.0,
            matched: false,
        }
    }
}

/// A matching strategy bound to one query
pub trait Matcher: Send + Sync {
    fn strategy(&self) -> Strategy;

    /// Score a single message
    fn evaluate(&self, message: &Message) -> Result<StrategyResult>;
}

// ============================================================================
// Pattern Matcher
// ============================================================================

/// Regular expression matcher, case-insensitive unless the pattern says otherwise
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    regex: Regex,
}

impl PatternMatcher {
    /// Compile the query as a pattern
    ///
    /// # Errors
    /// Returns `InvalidPattern` when the pattern is too long or does not compile.
    pub fn new(pattern: &str, options: &PatternOptions) -> Result<Self> {
        if pattern.chars().count() > options.max_pattern_length {
            return Err(SearchError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: format!(
                    "pattern exceeds {} characters",
                    options.max_pattern_length
                ),
            });
        }

        let normalized = normalize_text(pattern);
        let regex = RegexBuilder::new(&normalized)
            .case_insensitive(options.ignore_case)
            .dot_matches_new_line(options.dot_all)
            .unicode(true)
            .build()
            .map_err(|e| SearchError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self { regex })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(&normalize_text(text))
    }
}

impl Matcher for PatternMatcher {
    fn strategy(&self) -> Strategy {
        Strategy::Regex
    }

    fn evaluate(&self, message: &Message) -> Result<StrategyResult> {
        if self.is_match(&message.text) {
            Ok(StrategyResult::hit(&message.id, Strategy::Regex, FIXED_MATCH_SCORE))
        } else {
            Ok(StrategyResult::miss(&message.id, Strategy::Regex))
        }
    }
}

// ============================================================================
// Literal Matcher
// ============================================================================

/// Case-insensitive substring matcher; never fails
#[derive(Debug, Clone)]
pub struct LiteralMatcher {
    needles: Vec<String>,
}

impl LiteralMatcher {
    pub fn new(query: &str, options: &LiteralOptions) -> Self {
        let folded = fold_case(query);
        let needles = if options.expand_contractions {
            contraction_variants(&folded)
        } else {
            vec![folded]
        };
        Self { needles }
    }

    pub fn is_match(&self, text: &str) -> bool {
        let haystack = fold_case(text);
        self.needles.iter().any(|needle| haystack.contains(needle.as_str()))
    }
}

impl Matcher for LiteralMatcher {
    fn strategy(&self) -> Strategy {
        Strategy::Exact
    }

    fn evaluate(&self, message: &Message) -> Result<StrategyResult> {
        if self.is_match(&message.text) {
            Ok(StrategyResult::hit(&message.id, Strategy::Exact, FIXED_MATCH_SCORE))
        } else {
            Ok(StrategyResult::miss(&message.id, Strategy::Exact))
        }
    }
}
