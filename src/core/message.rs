//! Chat message model
//!
//! Messages are owned by the message source; the engine only reads them for
//! the duration of one search call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single chat message as delivered by a [`crate::source::MessageSource`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Resource name, e.g. `spaces/AAQA/messages/xyz`
    pub id: String,
    pub space_id: String,
    pub sender_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    pub create_time: DateTime<Utc>,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub is_deleted: bool,
}

impl Message {
    pub fn new(
        id: impl Into<String>,
        space_id: impl Into<String>,
        create_time: DateTime<Utc>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            space_id: space_id.into(),
            sender_id: String::new(),
            sender_name: None,
            create_time,
            text: text.into(),
            thread_id: None,
            is_deleted: false,
        }
    }

    pub fn with_sender(mut self, sender_id: impl Into<String>, name: Option<&str>) -> Self {
        self.sender_id = sender_id.into();
        self.sender_name = name.map(String::from);
        self
    }

    pub fn with_thread(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    pub fn deleted(mut self) -> Self {
        self.is_deleted = true;
        self
    }

    /// Whether the message can take part in a search at all
    pub fn is_searchable(&self) -> bool {
        !self.is_deleted
    }
}
