//! Search command - one search call against a JSON message export

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chat_search::core::Settings;
use chat_search::search::{ErrorResponse, SearchEngine, SearchParams, SearchResponse};
use chat_search::source::JsonFileSource;

/// Search command options
pub struct SearchArgs {
    pub query: String,
    pub messages: std::path::PathBuf,
    pub mode: Option<String>,
    pub spaces: Vec<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub days_window: Option<u32>,
    pub offset: Option<u32>,
    pub max_results: Option<usize>,
    pub page_size: Option<usize>,
    pub page_token: Option<String>,
    pub filter: Option<String>,
    pub sender: bool,
    pub json: bool,
    pub timeout: Option<u64>,
}

impl SearchArgs {
    fn to_params(&self) -> SearchParams {
        let mut params = SearchParams::new(self.query.clone());
        params.search_mode = self.mode.clone();
        if !self.spaces.is_empty() {
            params.spaces = Some(self.spaces.clone());
        }
        if let Some(max_results) = self.max_results {
            params.max_results = max_results;
        }
        params.start_date = self.start_date.clone();
        params.end_date = self.end_date.clone();
        params.days_window = self.days_window;
        params.offset = self.offset;
        params.include_sender_info = self.sender;
        params.filter_str = self.filter.clone();
        params.page_size = self.page_size;
        params.page_token = self.page_token.clone();
        params
    }
}

pub fn run(args: SearchArgs, config_path: Option<&Path>) -> Result<()> {
    let settings = Settings::load(config_path).context("Failed to load search configuration")?;
    let source = JsonFileSource::load(&args.messages)
        .with_context(|| format!("Failed to read messages from {}", args.messages.display()))?;
    let engine = SearchEngine::new(Arc::new(source), settings)?;

    let params = args.to_params();
    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(async {
        match args.timeout {
            Some(secs) => {
                engine
                    .search_with_timeout(&params, Duration::from_secs(secs))
                    .await
            }
            None => engine.search(&params).await,
        }
    });

    match result {
        Ok(response) if args.json => {
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        Ok(response) => {
            print_response(&args.query, &response);
            Ok(())
        }
        Err(e) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&ErrorResponse::from(&e))?);
            } else {
                println!("{} {}", "✗".red().bold(), e);
            }
            Err(e.into())
        }
    }
}

fn print_response(query: &str, response: &SearchResponse) {
    let meta = &response.search_metadata;

    for space in &meta.failed_spaces {
        println!("{} Could not fetch {}", "!".yellow().bold(), space.yellow());
    }
    if !meta.skipped_strategies.is_empty() {
        let skipped: Vec<&str> = meta.skipped_strategies.iter().map(|s| s.as_str()).collect();
        println!(
            "{} Skipped strategies: {}",
            "!".yellow().bold(),
            skipped.join(", ")
        );
    }

    if response.messages.is_empty() {
        println!("{} No results found for: {}", "→".dimmed(), query.cyan());
        return;
    }

    println!(
        "{} {} of {} results for: {} ({} mode, {} messages in {} spaces)",
        "→".dimmed(),
        response.messages.len(),
        meta.total_results,
        query.cyan(),
        meta.mode,
        meta.messages_searched,
        meta.searched_spaces.len()
    );
    if meta.semantic_date_fallback {
        println!(
            "  {} No semantic matches in the date range; showing matches from any date",
            "ℹ".blue()
        );
    }
    println!();

    for (i, hit) in response.messages.iter().enumerate() {
        let score_str = format!("{:.2}", hit.score);
        let score_colored = if hit.matched_by.len() > 1 {
            score_str.green()
        } else {
            score_str.yellow()
        };
        let strategies: Vec<&str> = hit.matched_by.iter().map(|s| s.as_str()).collect();

        println!(
            "{}. [{}] {} {}",
            (i + 1).to_string().bold(),
            score_colored,
            hit.create_time.dimmed(),
            hit.space.cyan()
        );

        // Truncate text for display (char-aware for Unicode)
        let display_text = if hit.text.chars().count() > 120 {
            format!("{}...", hit.text.chars().take(120).collect::<String>())
        } else {
            hit.text.clone()
        };
        println!("   {}", display_text);

        match &hit.sender {
            Some(sender) => println!(
                "   {} | {}",
                sender.display_name.as_deref().unwrap_or(&sender.id),
                strategies.join("+").dimmed()
            ),
            None => println!("   {}", strategies.join("+").dimmed()),
        }
        println!();
    }

    if let Some(token) = &response.next_page_token {
        println!("{} Next page: --page-token {}", "→".dimmed(), token);
    }
}
