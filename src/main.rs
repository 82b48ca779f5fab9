//! Catalog-Harvest main entry point
//!
//! This is the command-line interface for the Catalog-Harvest crawler.

use anyhow::Context;
use catalog_harvest::config::{load_config_with_hash, validate, validate_date, Config};
use catalog_harvest::crawler::{reset_date, resume_from_last, select_window, Coordinator};
use catalog_harvest::output::{finalize, load_statistics, print_statistics};
use catalog_harvest::storage::{open_storage, STATE_DB_FILE};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Catalog-Harvest: a resumable catalog crawler
///
/// Catalog-Harvest paginates category listings, extracts every product into
/// CSV rows and checkpoints its progress, so an interrupted crawl resumes
/// where it stopped.
#[derive(Parser, Debug)]
#[command(name = "catalog-harvest")]
#[command(version)]
#[command(about = "A resumable catalog crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Clear the date's states, cache and temporary output before crawling
    #[arg(long, conflicts_with = "resume_last")]
    fresh: bool,

    /// Copy progress from the most recent earlier date before crawling
    #[arg(long, conflicts_with = "fresh")]
    resume_last: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with_all = ["stats", "finalize_only"])]
    dry_run: bool,

    /// Show checkpoint statistics for the date and exit
    #[arg(long, conflicts_with_all = ["dry_run", "finalize_only"])]
    stats: bool,

    /// Merge the date's per-page CSV files without crawling
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    finalize_only: bool,

    /// Crawl these product URLs instead of the categories (repeatable)
    #[arg(long = "url", value_name = "URL")]
    urls: Vec<String>,

    /// Crawl date stamp (YYYYMMDD), overriding [site].date
    #[arg(long, value_name = "YYYYMMDD")]
    date: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if let Some(date) = &cli.date {
        validate_date(date)?;
        config.site.date = Some(date.clone());
    }
    if !cli.urls.is_empty() {
        config.urls = cli.urls.clone();
        validate(&config)?;
    }
    // Pin the date so every step below agrees on it
    let date = config.crawl_date();
    config.site.date = Some(date.clone());

    if cli.dry_run {
        handle_dry_run(&config, &date);
    } else if cli.stats {
        handle_stats(&config, &date)?;
    } else if cli.finalize_only {
        handle_finalize(&config, &date)?;
    } else {
        handle_crawl(config, config_hash, &date, cli.fresh, cli.resume_last).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("catalog_harvest=info,warn"),
            1 => EnvFilter::new("catalog_harvest=debug,info"),
            2 => EnvFilter::new("catalog_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows what would be crawled
fn handle_dry_run(config: &Config, date: &str) {
    println!("=== Catalog-Harvest Dry Run ===\n");

    println!("Site: {} ({})", config.site.name, date);
    println!("  Output directory: {}", config.site_dir().display());
    println!("  Start page: {}", config.site.start_page);

    println!("\nNetwork:");
    println!(
        "  Rate limit: {} requests / {}ms",
        config.network.rate_limit, config.network.period_ms
    );
    println!(
        "  Request timeout: {}s, max retries: {}",
        config.network.request_timeout_secs, config.network.max_retries
    );

    println!("\nCheckpoints:");
    println!("  Category states: {}", config.checkpoint.category_states);
    println!("  Product states: {}", config.checkpoint.product_states);
    println!("  Save HTML: {}", config.checkpoint.save_html);

    println!("\nColumns ({}):", config.column.len());
    for column in &config.column {
        println!("  - {} <- {}", column.header, column.field);
    }

    if !config.urls.is_empty() {
        println!("\nProduct URLs ({}):", config.urls.len());
        for url in &config.urls {
            println!("  - {}", url);
        }
        println!("\n✓ Configuration is valid");
        return;
    }

    let window = select_window(
        &config.category,
        config.categories.start.as_deref(),
        config.categories.end.as_deref(),
    );
    println!(
        "\nCategories ({} of {}, {} at a time):",
        window.len(),
        config.category.len(),
        config.categories.chunk_size
    );
    for category in window {
        println!("  - {}: {}", category.name, category.url);
    }
    println!(
        "\nProducts per chunk: {} to {}",
        config.products.min_chunk_size, config.products.max_chunk_size
    );

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows checkpoint statistics of the date
fn handle_stats(config: &Config, date: &str) -> anyhow::Result<()> {
    let path = config.site_dir().join(STATE_DB_FILE);
    println!("Database: {}\n", path.display());

    let storage = open_storage(&path)?;
    let stats = load_statistics(&storage, &config.site.name, date)?;
    print_statistics(&config.site.name, date, &stats);

    Ok(())
}

/// Handles the --finalize-only mode: merges per-page files
fn handle_finalize(config: &Config, date: &str) -> anyhow::Result<()> {
    let report = finalize(config, date)?;
    if report.files == 0 {
        println!("Nothing to merge for {}", date);
    } else {
        println!(
            "✓ Merged {} files into {} ({} rows, {} duplicates dropped)",
            report.files,
            report.path.display(),
            report.rows,
            report.duplicates
        );
    }
    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(
    config: Config,
    config_hash: String,
    date: &str,
    fresh: bool,
    resume_last: bool,
) -> anyhow::Result<()> {
    {
        let storage = open_storage(&config.site_dir().join(STATE_DB_FILE))?;
        if fresh {
            tracing::info!("Starting fresh crawl (clearing previous state of {})", date);
            reset_date(&config, &storage, date)?;
        } else if resume_last {
            resume_from_last(&config, &storage, date)?;
        } else {
            tracing::info!("Starting crawl (will resume if interrupted run exists)");
        }
    }

    let coordinator = Coordinator::from_config(config.clone(), config_hash)?;

    let summary = match coordinator.run().await {
        Ok(summary) => summary,
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            return Err(e.into());
        }
    };

    tracing::info!(
        "Crawl finished: {} categories done, {} unfinished, {} products failed",
        summary.categories_done,
        summary.categories_failed,
        summary.products_failed
    );

    let report = finalize(&config, date).context("failed to merge CSV files")?;
    if report.files > 0 {
        println!("✓ Output written to {}", report.path.display());
    }

    Ok(())
}
