//! Config command - print the effective configuration

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;

use chat_search::core::config::CONFIG_PATH_ENV;
use chat_search::core::Settings;

pub fn run(config_path: Option<&Path>, defaults: bool) -> Result<()> {
    let yaml = if defaults {
        Settings::default_yaml()?
    } else {
        Settings::load(config_path)
            .context("Failed to load search configuration")?
            .to_yaml()?
    };

    if !defaults && config_path.is_none() && std::env::var_os(CONFIG_PATH_ENV).is_none() {
        eprintln!(
            "{} No config given (--config or {}), showing defaults",
            "ℹ".blue(),
            CONFIG_PATH_ENV.yellow()
        );
    }
    print!("{}", yaml);
    Ok(())
}
