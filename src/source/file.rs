//! JSON export message source
//!
//! Reads a chat export of the form
//! `{ "spaces": [ { "name": "spaces/A", "messages": [ ... ] } ] }`.
//! Message records may omit `space_id` (taken from the enclosing space) and
//! `sender_id`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use super::{FetchOptions, InMemorySource, MessageSource};
use crate::core::error::Result;
use crate::core::message::Message;

#[derive(Debug, Deserialize)]
struct Export {
    #[serde(default)]
    spaces: Vec<ExportSpace>,
}

#[derive(Debug, Deserialize)]
struct ExportSpace {
    name: String,
    #[serde(default)]
    messages: Vec<ExportMessage>,
}

#[derive(Debug, Deserialize)]
struct ExportMessage {
    id: String,
    #[serde(default)]
    space_id: Option<String>,
    #[serde(default)]
    sender_id: String,
    #[serde(default)]
    sender_name: Option<String>,
    create_time: DateTime<Utc>,
    #[serde(default)]
    text: String,
    #[serde(default)]
    thread_id: Option<String>,
    #[serde(default)]
    is_deleted: bool,
}

impl ExportMessage {
    fn into_message(self, space: &str) -> Message {
        Message {
            id: self.id,
            space_id: self.space_id.unwrap_or_else(|| space.to_string()),
            sender_id: self.sender_id,
            sender_name: self.sender_name,
            create_time: self.create_time,
            text: self.text,
            thread_id: self.thread_id,
            is_deleted: self.is_deleted,
        }
    }
}

/// Message source backed by a JSON export file
#[derive(Debug)]
pub struct JsonFileSource {
    path: Option<PathBuf>,
    inner: InMemorySource,
}

impl JsonFileSource {
    /// Load an export file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let mut source = Self::from_json(&content)?;
        source.path = Some(path.to_path_buf());
        tracing::debug!(path = %path.display(), "Loaded message export");
        Ok(source)
    }

    /// Parse export content
    pub fn from_json(content: &str) -> Result<Self> {
        let export: Export = serde_json::from_str(content)?;

        let mut inner = InMemorySource::new();
        for space in export.spaces {
            let messages = space
                .messages
                .into_iter()
                .map(|m| m.into_message(&space.name))
                .collect();
            inner = inner.with_space(space.name, messages);
        }

        Ok(Self { path: None, inner })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

#[async_trait]
impl MessageSource for JsonFileSource {
    fn name(&self) -> &str {
        "json-file"
    }

    async fn list_spaces(&self) -> Result<Vec<String>> {
        self.inner.list_spaces().await
    }

    async fn list_messages(&self, space: &str, options: &FetchOptions) -> Result<Vec<Message>> {
        self.inner.list_messages(space, options).await
    }
}
