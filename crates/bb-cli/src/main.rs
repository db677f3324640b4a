//! Feed Blocker CLI
//!
//! CLI tool for talking to the blocklist service and replaying page fixtures
//! through the filtering engine.

mod replay;
mod service;

use std::fs;
use std::time::Duration;

use clap::{Parser, Subcommand};

use bb_core::{EngineConfig, PageKind};

#[derive(Parser)]
#[command(name = "bb-cli")]
#[command(about = "Feed blocker service client and fixture replay")]
struct Cli {
    /// JSON config file
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Blocklist service base URL (overrides the config)
    #[arg(short, long, global = true)]
    server: Option<String>,

    /// HTTP timeout in milliseconds
    #[arg(long, global = true, default_value_t = 5_000)]
    timeout_ms: u64,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show how a page URL is filtered
    Page {
        #[arg(short, long)]
        url: String,
    },

    /// Verify identifiers against the service
    Check {
        /// Comma-separated identifiers
        #[arg(short, long, required = true, value_delimiter = ',')]
        ids: Vec<String>,

        /// Identifiers are content ids (BV...)
        #[arg(long)]
        content: bool,

        /// One request per identifier
        #[arg(long)]
        single: bool,
    },

    /// Add a user to the blocklist
    Block {
        #[arg(short, long)]
        mid: String,

        #[arg(short, long)]
        name: String,
    },

    /// Remove a user from the blocklist
    Unblock {
        #[arg(short, long)]
        mid: String,
    },

    /// Check that the service is up
    Ping,

    /// Run scan cycles over a fixture page and report what got hidden
    Replay {
        /// Fixture page JSON
        #[arg(short, long)]
        fixture: String,

        /// URL the fixture was captured from
        #[arg(short, long)]
        url: String,

        #[arg(long, default_value_t = 1)]
        cycles: u32,

        /// Answer lookups from a JSON map of id -> "True"/"False" instead of the service
        #[arg(long)]
        verdicts: Option<String>,
    },

    /// Print the effective configuration
    Config,
}

fn main() {
    let cli = Cli::parse();
    setup_logging(&cli.log_level);

    let result = load_config(cli.config.as_deref(), cli.server.as_deref()).and_then(|config| {
        let timeout = Duration::from_millis(cli.timeout_ms);
        match cli.command {
            Commands::Page { url } => cmd_page(&config, &url),
            Commands::Check { ids, content, single } => service::cmd_check(&config, timeout, &ids, content, single),
            Commands::Block { mid, name } => service::cmd_block(&config, timeout, &mid, &name),
            Commands::Unblock { mid } => service::cmd_unblock(&config, timeout, &mid),
            Commands::Ping => service::cmd_ping(&config, timeout),
            Commands::Replay {
                fixture,
                url,
                cycles,
                verdicts,
            } => replay::cmd_replay(&config, timeout, &fixture, &url, cycles, verdicts.as_deref()),
            Commands::Config => cmd_config(&config),
        }
    });

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn setup_logging(level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&str>, server: Option<&str>) -> Result<EngineConfig, String> {
    let mut config = match path {
        Some(path) => {
            let text = fs::read_to_string(path).map_err(|e| format!("Failed to read {}: {}", path, e))?;
            EngineConfig::from_json(&text).map_err(|e| format!("{}: {}", path, e))?
        }
        None => EngineConfig::default(),
    };
    if let Some(server) = server {
        config.server_url = server.to_string();
        config.validate().map_err(|e| e.to_string())?;
    }
    Ok(config)
}

fn cmd_page(config: &EngineConfig, url: &str) -> Result<(), String> {
    let kind = PageKind::from_url(url).ok_or_else(|| format!("Page is not filtered: {}", url))?;
    let strategy = bb_core::strategy::for_url(url).ok_or_else(|| format!("No strategy for {}", url))?;
    let timings = config.timings(kind);

    println!("Page: {}", kind.as_str());
    match strategy.entry_selector() {
        Some(selector) => println!("  Entries: {}", selector),
        None => println!("  Entries: none (toggle only)"),
    }
    if let Some(subject) = strategy.current_subject() {
        println!("  Subject: {}", subject);
    }
    println!("  Identifier: {:?}", strategy.id_kind());
    println!("  Lookup: {:?}", strategy.shape());
    println!("  Scan interval: {} ms", timings.scan_interval_ms);
    println!("  Start delay: {} ms", timings.start_delay_ms);
    match timings.cache_clear_ms {
        Some(ms) => println!("  Cache clear: {} ms", ms),
        None => println!("  Cache clear: never"),
    }
    Ok(())
}

fn cmd_config(config: &EngineConfig) -> Result<(), String> {
    let json = serde_json::to_string_pretty(config).map_err(|e| format!("Failed to serialize config: {}", e))?;
    println!("{}", json);
    Ok(())
}
