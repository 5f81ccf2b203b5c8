//! Model management commands - Download and inspect the semantic model

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;

use chat_search::core::Settings;
use chat_search::search::create_embedder;

/// Run model subcommand
pub fn run(subcmd: &str, json: bool, config_path: Option<&Path>) -> Result<()> {
    let settings = Settings::load(config_path).context("Failed to load search configuration")?;
    match subcmd {
        "download" => download(&settings, json),
        "status" => status(&settings, json),
        _ => {
            if !json {
                println!("{} Unknown subcommand: {}", "!".yellow().bold(), subcmd);
                println!();
                println!("Available subcommands:");
                println!(
                    "  {} - Download the configured Model2Vec model",
                    "download".cyan()
                );
                println!("  {} - Show model status", "status".cyan());
            }
            Ok(())
        }
    }
}

/// Load the configured model, downloading it from HuggingFace Hub if needed
fn download(settings: &Settings, json: bool) -> Result<()> {
    let options = settings.semantic_options()?;
    let source = options.model_path.clone().unwrap_or_else(|| options.model.clone());

    if !json {
        if options.builtin_embedder {
            println!(
                "{} Built-in embedder configured, nothing to download",
                "→".dimmed()
            );
        } else {
            println!("{} Loading model: {}", "→".dimmed(), source.cyan());
            println!("  This may take a few minutes on first download...");
        }
        println!();
    }

    match create_embedder(&options) {
        Ok(embedder) => {
            if json {
                println!(
                    "{}",
                    serde_json::json!({
                        "success": true,
                        "model": source,
                        "name": embedder.name(),
                        "dimension": embedder.dimension(),
                    })
                );
            } else {
                println!("{} Model ready!", "✓".green().bold());
                println!();
                println!("  {} Model: {}", "→".dimmed(), embedder.name());
                println!("  {} Dimension: {}", "→".dimmed(), embedder.dimension());
            }
            Ok(())
        }
        Err(e) => {
            if json {
                println!(
                    "{}",
                    serde_json::json!({
                        "success": false,
                        "error_type": e.error_type(),
                        "error": e.to_string(),
                    })
                );
            } else {
                println!("{} Failed to load model: {}", "✗".red().bold(), e);
            }
            Err(e.into())
        }
    }
}

/// Show model configuration
fn status(settings: &Settings, json: bool) -> Result<()> {
    let options = settings.semantic_options()?;
    let enabled = settings.is_enabled(chat_search::search::Strategy::Semantic);
    let compiled = cfg!(feature = "model2vec");

    if json {
        println!(
            "{}",
            serde_json::json!({
                "semantic_enabled": enabled,
                "model": options.model,
                "model_path": options.model_path,
                "builtin_embedder": options.builtin_embedder,
                "model2vec_compiled": compiled,
                "cache_max_size": options.cache_max_size,
            })
        );
        return Ok(());
    }

    println!("{}", "Model Status".bold());
    println!();

    let embedder = if options.builtin_embedder {
        "built-in hashing".to_string()
    } else {
        options.model_path.clone().unwrap_or_else(|| options.model.clone())
    };
    println!("  {} Embedder: {}", "→".dimmed(), embedder.cyan());

    let enabled_status = if enabled {
        "Enabled".green()
    } else {
        "Disabled".yellow()
    };
    println!("  {} Semantic Search: {}", "→".dimmed(), enabled_status);
    println!(
        "  {} Threshold: {:.2} (relaxes by {:.2} up to {} steps)",
        "→".dimmed(),
        options.similarity_threshold,
        options.relaxation_step,
        options.max_relaxation_steps
    );
    println!(
        "  {} Cache: {} vectors ({:?})",
        "→".dimmed(),
        options.cache_max_size,
        options.eviction_policy
    );

    if !compiled && !options.builtin_embedder {
        println!();
        println!(
            "  {} Built without the {} feature; set {} or rebuild",
            "!".yellow().bold(),
            "model2vec".cyan(),
            "builtin_embedder: true".cyan()
        );
    }

    Ok(())
}
