//! Schema command - JSON schema of the search call parameters

use anyhow::Result;

use chat_search::search::SearchParams;

pub fn run() -> Result<()> {
    let schema = schemars::schema_for!(SearchParams);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}
