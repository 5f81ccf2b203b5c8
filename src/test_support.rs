//! Shared fixtures for unit tests

use chrono::{DateTime, NaiveDate, Utc};
use std::time::Duration;

use crate::core::error::{Result, SearchError};
use crate::core::message::Message;
use crate::search::embedder::Embedder;

/// Keyword groups, one embedding dimension each; other words share the last one
const TOPICS: &[&[&str]] = &[
    &[
        "ci", "cicd", "continuous", "integration", "pipeline", "pipelines", "build", "builds",
        "jenkins", "deploy", "deployment",
    ],
    &["lunch", "dinner", "pizza", "food", "coffee"],
    &["budget", "finance", "cost", "costs", "invoice"],
    &["meeting", "standup", "sync", "agenda"],
];

const OTHER_WEIGHT: f32 = 0.3;

/// Deterministic embedder mapping keywords to topic dimensions
pub struct TopicEmbedder;

impl Embedder for TopicEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; TOPICS.len() + 1];
        for word in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            match TOPICS.iter().position(|topic| topic.contains(&word)) {
                Some(dim) => vector[dim] += 1.0,
                None => vector[TOPICS.len()] += OTHER_WEIGHT,
            }
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        TOPICS.len() + 1
    }

    fn name(&self) -> &str {
        "topic-test"
    }
}

/// Embedder that always fails, as an unreachable model would
pub struct BrokenEmbedder;

impl Embedder for BrokenEmbedder {
    fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(SearchError::EmbeddingUnavailable(
            "model offline".to_string(),
        ))
    }

    fn dimension(&self) -> usize {
        0
    }

    fn name(&self) -> &str {
        "broken"
    }
}

/// Topic embedder whose batch call drops the last vector
pub struct ShortBatchEmbedder;

impl Embedder for ShortBatchEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        TopicEmbedder.embed(text)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = TopicEmbedder.embed_batch(texts)?;
        vectors.pop();
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        TopicEmbedder.dimension()
    }

    fn name(&self) -> &str {
        "short-batch"
    }
}

/// Topic embedder that blocks the calling thread before every call
pub struct SlowEmbedder(pub Duration);

impl Embedder for SlowEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        std::thread::sleep(self.0);
        TopicEmbedder.embed(text)
    }

    fn dimension(&self) -> usize {
        TopicEmbedder.dimension()
    }

    fn name(&self) -> &str {
        "slow-topic"
    }
}

/// Message in `spaces/A` created at noon UTC on `date` (`YYYY-MM-DD`)
pub fn message(id: &str, date: &str, text: &str) -> Message {
    message_in("spaces/A", id, date, text)
}

pub fn message_in(space: &str, id: &str, date: &str, text: &str) -> Message {
    Message::new(id, space, noon(date), text).with_sender("users/1", Some("Dana"))
}

/// Noon UTC on `date`
pub fn noon(date: &str) -> DateTime<Utc> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
        .and_utc()
}
