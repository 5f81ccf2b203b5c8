mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use chat_search::core::Settings;

#[derive(Parser)]
#[command(name = "chat-search")]
#[command(about = "Search chat messages with pattern, literal and semantic matching", long_about = None)]
#[command(version)]
struct Cli {
    /// Search configuration file (YAML)
    #[arg(long, global = true, env = "CHAT_SEARCH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search a JSON message export
    Search {
        query: String,
        #[arg(long, help = "Message export file (JSON)")]
        messages: PathBuf,
        #[arg(long, short, help = "Search mode: regex, exact, semantic, hybrid")]
        mode: Option<String>,
        #[arg(long = "space", help = "Space to search (repeatable, default: all)")]
        spaces: Vec<String>,
        #[arg(long, help = "Only messages after this date (YYYY-MM-DD)")]
        start_date: Option<String>,
        #[arg(long, help = "Only messages before this date (YYYY-MM-DD)")]
        end_date: Option<String>,
        #[arg(long, help = "Search the last N days instead of explicit dates")]
        days_window: Option<u32>,
        #[arg(long, help = "Shift the --days-window back by N days")]
        offset: Option<u32>,
        #[arg(long, short = 'n', help = "Maximum results (default: 50)")]
        max_results: Option<usize>,
        #[arg(long, help = "Results per page (default: max results)")]
        page_size: Option<usize>,
        #[arg(long, help = "Continue from a previous page")]
        page_token: Option<String>,
        #[arg(long, help = "Additional upstream filter expression")]
        filter: Option<String>,
        #[arg(long, help = "Include sender information")]
        sender: bool,
        #[arg(long, help = "JSON output")]
        json: bool,
        #[arg(long, help = "Abort after this many seconds")]
        timeout: Option<u64>,
    },
    /// Print the effective configuration as YAML
    Config {
        #[arg(long, help = "Print built-in defaults instead")]
        defaults: bool,
    },
    /// Print the JSON schema of the search parameters
    Schema,
    /// Manage the Model2Vec model used for semantic search
    Model {
        /// Subcommand: download, status
        #[arg(default_value = "status")]
        action: String,
        #[arg(long, help = "JSON output")]
        json: bool,
    },
}

/// Log to stderr; `RUST_LOG` wins over the configured level
fn init_tracing(config: Option<&std::path::Path>) {
    let level = Settings::load(config)
        .map(|s| s.search.log_level)
        .unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.config.as_deref();
    init_tracing(config);

    match cli.command {
        Commands::Search {
            query,
            messages,
            mode,
            spaces,
            start_date,
            end_date,
            days_window,
            offset,
            max_results,
            page_size,
            page_token,
            filter,
            sender,
            json,
            timeout,
        } => commands::search::run(
            commands::search::SearchArgs {
                query,
                messages,
                mode,
                spaces,
                start_date,
                end_date,
                days_window,
                offset,
                max_results,
                page_size,
                page_token,
                filter,
                sender,
                json,
                timeout,
            },
            config,
        ),
        Commands::Config { defaults } => commands::config::run(config, defaults),
        Commands::Schema => commands::schema::run(),
        Commands::Model { action, json } => commands::model::run(&action, json, config),
    }
}
