//! Stateless pagination over a ranked list
//!
//! A page token encodes the query signature and the offset of the next item.
//! Resuming re-runs the identical query and slices from that offset; nothing
//! is kept between calls.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Serialize;

use crate::core::error::{Result, SearchError};

const TOKEN_VERSION: &str = "v1";

/// Decoded page token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageToken {
    pub signature: String,
    pub offset: usize,
}

impl PageToken {
    pub fn new(signature: impl Into<String>, offset: usize) -> Self {
        Self {
            signature: signature.into(),
            offset,
        }
    }

    /// Opaque, URL-safe form
    pub fn encode(&self) -> String {
        URL_SAFE_NO_PAD.encode(format!("{}:{}:{}", TOKEN_VERSION, self.signature, self.offset))
    }

    /// Decode a token and check it belongs to the query with `signature`
    ///
    /// # Errors
    /// `InvalidQuery` on field `page_token` when the token is malformed or
    /// was issued for different query parameters.
    pub fn decode(token: &str, signature: &str) -> Result<Self> {
        let malformed = || SearchError::invalid("page_token", "malformed page token");

        let bytes = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|_| malformed())?;
        let text = String::from_utf8(bytes).map_err(|_| malformed())?;

        let mut parts = text.splitn(3, ':');
        let (Some(version), Some(token_signature), Some(offset)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(malformed());
        };
        if version != TOKEN_VERSION {
            return Err(malformed());
        }
        let offset: usize = offset.parse().map_err(|_| malformed())?;

        if token_signature != signature {
            return Err(SearchError::invalid(
                "page_token",
                "page token was issued for different search parameters",
            ));
        }

        Ok(Self::new(token_signature, offset))
    }
}

/// One page of a ranked list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// `None` exactly when no items remain after this page
    pub next_page_token: Option<String>,
}

/// Slice `ranked` at `offset` and mint the token for the next page
///
/// An offset at or past the end yields an empty last page.
pub fn paginate<T>(ranked: Vec<T>, signature: &str, offset: usize, page_size: usize) -> Result<Page<T>> {
    if page_size == 0 {
        return Err(SearchError::invalid("page_size", "page_size must be at least 1"));
    }

    let total = ranked.len();
    let end = offset.saturating_add(page_size).min(total);
    let items: Vec<T> = ranked.into_iter().skip(offset).take(page_size).collect();

    let next_page_token = if end < total {
        Some(PageToken::new(signature, end).encode())
    } else {
        None
    };

    Ok(Page {
        items,
        next_page_token,
    })
}
