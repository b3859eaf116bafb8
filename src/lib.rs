//! docmigrate: move a legacy flat-file document store into embedded collections.
//!
//! The legacy store keeps one JSON file per key, grouped into category
//! directories (`users/`, `chats/`, ...). A run reads every document, rewrites
//! keys the destination cannot hold, and upserts each record into one SQLite
//! collection per category. Finally it compacts those collections.
//!
//! # Guarantees
//!
//! - **Idempotent**: upserts replace, so re-running converges to the same state.
//! - **Bounded**: at most `concurrency` read/write tasks are in flight.
//! - **Partial-failure tolerant**: a bad record is logged and counted; its
//!   siblings still migrate.
//!
//! # Usage
//!
//! ```bash
//! # Defaults: ./database -> ./storage, 500 in-flight tasks
//! docmigrate
//!
//! # Explicit roots and a smaller pool
//! docmigrate --source ./legacy --destination ./out --concurrency 64
//! ```
//!
//! # Crate Structure
//!
//! - [`core`]: sanitizer, reader, writer, scheduler, compaction, orchestrator

pub mod core;

use crate::core::config::MigrationConfig;
use crate::core::error::MigrateError;
use crate::core::orchestrator::{MigrationSummary, Orchestrator};
use clap::Parser;
use std::path::PathBuf;
use tracing::Level;

#[derive(Parser, Debug)]
#[clap(
    name = "docmigrate",
    version = env!("CARGO_PKG_VERSION"),
    about = "Migrate a legacy JSON file store into per-category SQLite collections"
)]
pub struct Cli {
    /// Path to a TOML config file (defaults to ./docmigrate.toml when present).
    #[clap(short, long)]
    config: Option<PathBuf>,
    /// Root of the legacy store, one directory per category.
    #[clap(long)]
    source: Option<PathBuf>,
    /// Directory receiving one collection file per category.
    #[clap(long)]
    destination: Option<PathBuf>,
    /// Maximum in-flight read/write tasks.
    #[clap(long)]
    concurrency: Option<usize>,
    /// Log verbosity: debug, info, warn, error.
    #[clap(long, default_value = "info")]
    verbosity: String,
    /// Log format: text or json.
    #[clap(long, default_value = "text")]
    log_format: String,
    /// Print the run summary as JSON instead of text.
    #[clap(long)]
    output_json: bool,
}

impl Cli {
    fn into_config(self) -> Result<(MigrationConfig, bool), MigrateError> {
        let mut config = MigrationConfig::load(self.config.as_deref())?;
        if let Some(source) = self.source {
            config.source_root = source;
        }
        if let Some(destination) = self.destination {
            config.destination_root = destination;
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }
        config.validate()?;
        Ok((config, self.output_json))
    }
}

pub fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr);

    // A subscriber may already be installed when embedded in tests.
    let _ = if format == "json" {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    };
}

pub fn print_summary(summary: &MigrationSummary) {
    use colored::Colorize;

    println!();
    for (category, totals) in &summary.totals.per_category {
        println!(
            "  {} {:<10} {} migrated, {} failed",
            "▸".bright_cyan(),
            category.name().bright_white(),
            totals.migrated,
            totals.read_failed + totals.write_failed
        );
    }
    for category in &summary.skipped_categories {
        println!(
            "  {} {:<10} {}",
            "▸".bright_cyan(),
            category.name().bright_white(),
            "skipped (no source directory)".yellow()
        );
    }
    let mark = if summary.totals.failed() == 0 {
        "✓".bright_green()
    } else {
        "!".bright_yellow()
    };
    println!(
        "  {} Migrated {} record(s) ({} failed, {} excluded) in {} ms",
        mark,
        summary.totals.migrated.to_string().bright_green(),
        summary.totals.failed(),
        summary.excluded,
        summary.elapsed_ms
    );
}

pub fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();
    setup_logging(&cli.verbosity, &cli.log_format);
    let (config, output_json) = cli.into_config()?;

    let orchestrator = Orchestrator::new(config)?;
    let summary = orchestrator.run()?;

    if output_json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}
