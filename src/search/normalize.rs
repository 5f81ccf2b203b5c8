//! Text normalization shared by the pattern and literal matchers
//!
//! Chat clients send typographic apostrophes and composed characters, so both
//! sides of a comparison are NFKD-normalized and `‘`/`’` become `'`.

use lazy_static::lazy_static;
use std::borrow::Cow;
use unicode_normalization::{is_nfkd_quick, IsNormalized, UnicodeNormalization};

lazy_static! {
    /// Contraction groups; every member of a group matches the others
    static ref CONTRACTION_GROUPS: Vec<Vec<&'static str>> = vec![
        vec!["don't", "didn't", "do not", "did not"],
        vec!["isn't", "wasn't", "is not", "was not"],
        vec!["can't", "couldn't", "cannot", "could not"],
        vec!["won't", "wouldn't", "will not", "would not"],
        vec!["aren't", "weren't", "are not", "were not"],
        vec!["haven't", "hadn't", "have not", "had not"],
    ];
}

/// NFKD-normalize and replace typographic apostrophes
pub fn normalize_text(text: &str) -> Cow<'_, str> {
    let needs_nfkd = !matches!(is_nfkd_quick(text.chars()), IsNormalized::Yes);
    let has_smart_quote = text.contains(['\u{2018}', '\u{2019}']);

    if !needs_nfkd && !has_smart_quote {
        return Cow::Borrowed(text);
    }

    let normalized: String = text
        .nfkd()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' => '\'',
            other => other,
        })
        .collect();
    Cow::Owned(normalized)
}

/// Normalized, lowercased form used for case-insensitive containment
pub fn fold_case(text: &str) -> String {
    normalize_text(text).to_lowercase()
}

/// The query plus every contraction variant of it
///
/// The input is expected to be case-folded already. The first element is
/// always the query itself.
pub fn contraction_variants(folded_query: &str) -> Vec<String> {
    let mut variants = vec![folded_query.to_string()];

    for group in CONTRACTION_GROUPS.iter() {
        for form in group {
            if !folded_query.contains(form) {
                continue;
            }
            for alternative in group.iter().filter(|a| *a != form) {
                let candidate = folded_query.replace(form, alternative);
                if !variants.contains(&candidate) {
                    variants.push(candidate);
                }
            }
        }
    }

    variants
}
