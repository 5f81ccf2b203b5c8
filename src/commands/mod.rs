pub mod config;
pub mod model;
pub mod schema;
pub mod search;
