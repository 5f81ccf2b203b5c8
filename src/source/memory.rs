//! In-memory message source

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{FetchOptions, MessageSource};
use crate::core::error::{Result, SearchError};
use crate::core::message::Message;

/// Messages held in memory, grouped by space
///
/// Spaces can be scripted to fail or to respond slowly, which makes upstream
/// behavior reproducible.
#[derive(Debug, Default)]
pub struct InMemorySource {
    spaces: BTreeMap<String, Vec<Message>>,
    failing: BTreeSet<String>,
    latency: Option<Duration>,
    fetches: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from messages, grouping them by `space_id`
    pub fn from_messages(messages: impl IntoIterator<Item = Message>) -> Self {
        let mut source = Self::new();
        for message in messages {
            source
                .spaces
                .entry(message.space_id.clone())
                .or_default()
                .push(message);
        }
        source
    }

    pub fn with_space(mut self, space: impl Into<String>, messages: Vec<Message>) -> Self {
        self.spaces.insert(space.into(), messages);
        self
    }

    /// Make every fetch of `space` fail with an upstream error
    pub fn with_failing_space(mut self, space: impl Into<String>) -> Self {
        let space = space.into();
        self.spaces.entry(space.clone()).or_default();
        self.failing.insert(space);
        self
    }

    /// Delay every fetch by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of `list_messages` calls served so far
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }

    /// Most `list_messages` calls ever running at once
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn fetch(&self, space: &str, options: &FetchOptions) -> Result<Vec<Message>> {
        if self.failing.contains(space) {
            return Err(SearchError::UpstreamFetch {
                space: space.to_string(),
                reason: "scripted failure".to_string(),
            });
        }

        let messages = self.spaces.get(space).ok_or_else(|| SearchError::UpstreamFetch {
            space: space.to_string(),
            reason: "space not found".to_string(),
        })?;

        let filter = options.message_filter()?;
        let limit = if options.limit == 0 { usize::MAX } else { options.limit };
        Ok(messages
            .iter()
            .filter(|m| options.window.contains(&m.create_time) && filter.matches(m))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl MessageSource for InMemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list_spaces(&self) -> Result<Vec<String>> {
        Ok(self.spaces.keys().cloned().collect())
    }

    async fn list_messages(&self, space: &str, options: &FetchOptions) -> Result<Vec<Message>> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let result = self.fetch(space, options);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
