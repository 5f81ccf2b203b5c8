//! Core types shared by the engine: configuration, messages, dates, errors

pub mod config;
pub mod datetime;
pub mod error;
pub mod message;

pub use config::Settings;
pub use datetime::DateWindow;
pub use error::{Result, SearchError};
pub use message::Message;
