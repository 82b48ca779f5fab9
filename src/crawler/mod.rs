//! Crawler module for catalog crawling
//!
//! This module contains the core crawling logic, including:
//! - Request rate limiting shared by every task
//! - Chunked scheduling of categories and products
//! - Overall crawl coordination and checkpointing
//! - Resetting a date or carrying an earlier date's progress over

mod coordinator;
mod scheduler;
mod throttle;

pub use coordinator::{run_crawl, Coordinator};
pub use scheduler::{run_chunked, select_window, ChunkReport, ChunkSizer};
pub use throttle::RateLimiter;

use crate::cache::ContentCache;
use crate::config::Config;
use crate::output::{copy_temp_files, temp_dir};
use crate::storage::StateStore;
use crate::Result;
use std::path::Path;

/// Drops everything recorded for one date
///
/// Category and product states, cached documents and per-page CSV files of
/// `date` are removed so the next crawl starts from scratch. Other dates and
/// merged final files are left alone.
pub fn reset_date(config: &Config, storage: &dyn StateStore, date: &str) -> Result<()> {
    let root = Path::new(&config.output.directory);
    let site = config.site.name.as_str();

    storage.clear_date(site, date)?;
    ContentCache::new(root).clear_date(site, date)?;

    let temp = temp_dir(root, site, date);
    if temp.exists() {
        std::fs::remove_dir_all(&temp)?;
    }

    tracing::info!("Cleared states, cache and output of {} for {}", site, date);
    Ok(())
}

/// Continues the most recent earlier crawl under `date`
///
/// The states, cached documents and per-page CSV files of the latest date
/// before `date` are copied onto `date`, so the crawl picks up where that
/// one stopped.
///
/// # Returns
///
/// * `Ok(Some(previous))` - The date that was copied
/// * `Ok(None)` - No earlier date has saved states
pub fn resume_from_last(
    config: &Config,
    storage: &dyn StateStore,
    date: &str,
) -> Result<Option<String>> {
    let root = Path::new(&config.output.directory);
    let site = config.site.name.as_str();

    let previous = storage
        .known_dates(site)?
        .into_iter()
        .filter(|d| d.as_str() < date)
        .max();
    let Some(previous) = previous else {
        tracing::info!("No earlier crawl of {} to resume from", site);
        return Ok(None);
    };

    let states = storage.copy_date(site, &previous, date)?;
    let documents = ContentCache::new(root).copy_date(site, &previous, date)?;

    let files = copy_temp_files(root, site, &previous, date)?;

    tracing::info!(
        "Resuming {} from {}: {} states, {} documents, {} CSV files copied",
        site,
        previous,
        states,
        documents,
        files
    );
    Ok(Some(previous))
}
