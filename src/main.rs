//! Binary entry point for newsdedup.
//!
//! Parses feed files, runs them through the deduplication engine against a
//! JSON-lines history, and prints the decisions as JSON.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use newsdedup::collectors::parser_for;
use newsdedup::config::NewsdedupConfig;
use newsdedup::embedding::{BulkheadEmbedder, DiskCachedEmbedder, Embedder, FastEmbedEmbedder};
use newsdedup::observability::{self, InitOptions};
use newsdedup::{CandidateItem, DeduplicationEngine, ItemStore, JsonlStore};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

/// Newsdedup - incremental deduplication for AI/ML news feeds.
#[derive(Parser)]
#[command(name = "newsdedup")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true, env = "NEWSDEDUP_CONFIG")]
    config: Option<PathBuf>,

    /// Expose Prometheus metrics over HTTP while running.
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Parse feed files and report which items are duplicates.
    Check {
        /// Feed documents (RSS, Atom or arXiv XML).
        #[arg(required = true)]
        feeds: Vec<PathBuf>,

        /// Source name for the items; defaults to the file stem. Names
        /// containing "arxiv" select the arXiv parser.
        #[arg(short, long)]
        source: Option<String>,

        /// Item store path (overrides config).
        #[arg(long)]
        store: Option<PathBuf>,

        /// Reference time for recency windows (RFC 3339); defaults to now.
        #[arg(long)]
        as_of: Option<String>,

        /// Semantic similarity threshold (overrides config).
        #[arg(long)]
        threshold: Option<f32>,

        /// Only print duplicate decisions.
        #[arg(long)]
        duplicates_only: bool,
    },

    /// Manage the on-disk embedding cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Print the effective configuration.
    Config {
        /// Print as JSON instead of TOML.
        #[arg(long)]
        json: bool,
    },
}

/// Embedding cache maintenance.
#[derive(Subcommand)]
enum CacheAction {
    /// Remove every cached vector.
    Clear,
    /// Remove vectors older than the given age.
    Cleanup {
        /// Maximum age in days.
        #[arg(long, default_value = "30")]
        older_than_days: u64,
    },
}

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::FAILURE;
        },
    };

    let _observability = match observability::init_from_config(
        &config.observability,
        InitOptions {
            verbose: cli.verbose,
            metrics_expose: cli.metrics,
        },
    ) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        },
    };

    match run_command(cli.command, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

fn load_config(path: Option<&Path>) -> Result<NewsdedupConfig> {
    match path {
        Some(path) => NewsdedupConfig::load_from_file(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => NewsdedupConfig::load_default().context("loading default config"),
    }
}

fn run_command(command: Commands, config: NewsdedupConfig) -> Result<()> {
    match command {
        Commands::Check {
            feeds,
            source,
            store,
            as_of,
            threshold,
            duplicates_only,
        } => {
            let mut config = config;
            if let Some(store) = store {
                config.store_path = store;
            }
            if let Some(threshold) = threshold {
                config.dedup.similarity_threshold = threshold;
                config.dedup.validate()?;
            }
            let as_of = parse_as_of(as_of.as_deref())?;
            cmd_check(&config, &feeds, source.as_deref(), as_of, duplicates_only)
        },
        Commands::Cache { action } => cmd_cache(&config, action),
        Commands::Config { json } => cmd_config(&config, json),
    }
}

fn parse_as_of(raw: Option<&str>) -> Result<DateTime<Utc>> {
    raw.map_or_else(
        || Ok(Utc::now()),
        |raw| {
            DateTime::parse_from_rfc3339(raw)
                .map(|dt| dt.with_timezone(&Utc))
                .with_context(|| format!("invalid --as-of '{raw}'"))
        },
    )
}

/// Builds the provider stack: bulkhead over the optional disk cache over the model.
fn build_embedder(config: &NewsdedupConfig) -> Result<Arc<dyn Embedder>> {
    let bulkhead = config.embedding.bulkhead();
    if config.embedding.disk_cache_enabled {
        let cached = DiskCachedEmbedder::new(FastEmbedEmbedder::new(), &config.embedding.cache_dir)?;
        Ok(Arc::new(BulkheadEmbedder::new(cached, bulkhead)))
    } else {
        Ok(Arc::new(BulkheadEmbedder::new(FastEmbedEmbedder::new(), bulkhead)))
    }
}

fn read_feeds(feeds: &[PathBuf], source: Option<&str>) -> Result<Vec<CandidateItem>> {
    let mut items = Vec::new();
    for path in feeds {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading feed {}", path.display()))?;
        let name = source.map_or_else(
            || {
                path.file_stem()
                    .map_or_else(|| "feed".to_string(), |s| s.to_string_lossy().into_owned())
            },
            ToString::to_string,
        );
        let parsed = parser_for(&name)
            .parse(&raw)
            .with_context(|| format!("parsing feed {}", path.display()))?;
        tracing::info!(feed = %path.display(), source = %name, items = parsed.len(), "Read feed");
        items.extend(parsed);
    }
    Ok(items)
}

/// JSON report for one `check` run.
#[derive(Serialize)]
struct CheckReport<'a> {
    items: usize,
    duplicates: u64,
    partial: bool,
    cancelled: bool,
    counters: &'a newsdedup::DedupCounters,
    decisions: Vec<DecisionLine<'a>>,
}

#[derive(Serialize)]
struct DecisionLine<'a> {
    url: &'a str,
    title: &'a str,
    #[serde(flatten)]
    decision: &'a newsdedup::DuplicateMatch,
}

fn cmd_check(
    config: &NewsdedupConfig,
    feeds: &[PathBuf],
    source: Option<&str>,
    as_of: DateTime<Utc>,
    duplicates_only: bool,
) -> Result<()> {
    let items = read_feeds(feeds, source)?;
    if items.is_empty() {
        bail!("no items found in {} feed file(s)", feeds.len());
    }

    let store: Arc<dyn ItemStore> = Arc::new(
        JsonlStore::open(&config.store_path)
            .with_context(|| format!("opening store {}", config.store_path.display()))?,
    );
    let engine = DeduplicationEngine::new(build_embedder(config)?, store, config.dedup.clone());
    let result = engine.check_batch(&items, as_of);

    if result.partial {
        tracing::warn!("Store was unavailable during the run; long-tail duplicates may be missed");
    }

    let decisions = items
        .iter()
        .zip(&result.decisions)
        .filter(|(_, decision)| !duplicates_only || decision.is_duplicate)
        .map(|(item, decision)| DecisionLine {
            url: &item.url,
            title: &item.title,
            decision,
        })
        .collect();
    let report = CheckReport {
        items: items.len(),
        duplicates: result.counters.duplicates(),
        partial: result.partial,
        cancelled: result.cancelled,
        counters: &result.counters,
        decisions,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn cmd_cache(config: &NewsdedupConfig, action: CacheAction) -> Result<()> {
    let cache = DiskCachedEmbedder::new(FastEmbedEmbedder::new(), &config.embedding.cache_dir)?;
    let removed = match action {
        CacheAction::Clear => cache.clear()?,
        CacheAction::Cleanup { older_than_days } => {
            cache.cleanup_older_than(Duration::from_secs(older_than_days.saturating_mul(86_400)))?
        },
    };
    println!("Removed {removed} cached embedding(s) from {}", cache.dir().display());
    Ok(())
}

fn cmd_config(config: &NewsdedupConfig, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(config)?);
    } else {
        print!("{}", config.to_toml()?);
    }
    Ok(())
}
