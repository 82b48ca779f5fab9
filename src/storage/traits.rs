//! Storage traits and error types
//!
//! This module defines the trait interface for checkpoint backends and
//! associated error types.

use crate::state::{CategoryState, ProductState};
use crate::storage::{RunRecord, RunStatus, StateStatistics};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Storage lock poisoned")]
    Poisoned,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for checkpoint backends
///
/// Every write is an idempotent upsert keyed by site, category, date and (for
/// products) product id. Implementations are shared between concurrently
/// running category and product tasks, so all methods take `&self`.
pub trait StateStore: Send + Sync {
    // ===== Category States =====

    /// Loads the saved state of a category, or a fresh one
    ///
    /// # Arguments
    ///
    /// * `site` - Site name
    /// * `category_name` - Category name (sanitized by the store)
    /// * `date` - Crawl date stamp
    /// * `start_page` - Page a fresh state starts from
    ///
    /// # Returns
    ///
    /// * `Ok(Some(state))` - Saved state to resume, or a fresh state
    /// * `Ok(None)` - The category is already done for this date
    fn load_category_state(
        &self,
        site: &str,
        category_name: &str,
        date: &str,
        start_page: u32,
    ) -> StorageResult<Option<CategoryState>>;

    /// Durably saves a category state, replacing any previous one
    fn save_category_state(&self, state: &CategoryState) -> StorageResult<()>;

    // ===== Product States =====

    /// Loads the state of a product, creating it on first sight
    ///
    /// Returns `Ok(None)` when the product is already done, so the caller
    /// skips it.
    fn load_or_create_product_state(
        &self,
        site: &str,
        product_id: &str,
        category_name: &str,
        date: &str,
    ) -> StorageResult<Option<ProductState>>;

    /// Durably saves a product state, replacing any previous one
    fn save_product_state(&self, state: &ProductState) -> StorageResult<()>;

    // ===== Date Management =====

    /// Deletes every category and product state of a date
    fn clear_date(&self, site: &str, date: &str) -> StorageResult<()>;

    /// Copies all states of `from` onto `to`, returning the number of rows
    /// copied; existing states of `to` are overwritten
    fn copy_date(&self, site: &str, from: &str, to: &str) -> StorageResult<usize>;

    /// Dates that have saved states, ascending
    fn known_dates(&self, site: &str) -> StorageResult<Vec<String>>;

    // ===== Runs =====

    /// Records the start of a crawl run
    fn create_run(&self, site: &str, date: &str, config_hash: &str) -> StorageResult<i64>;

    /// Records the end of a crawl run
    fn complete_run(&self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Counts runs recorded for a site and date
    fn count_runs(&self, site: &str, date: &str) -> StorageResult<u64>;

    // ===== Statistics =====

    /// Aggregates checkpoint counts for a site and date
    fn statistics(&self, site: &str, date: &str) -> StorageResult<StateStatistics>;
}
