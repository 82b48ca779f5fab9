//! Storage module for persisting crawl progress
//!
//! This module handles all database operations for the crawler, including:
//! - SQLite database initialization and schema management
//! - Category and product checkpoint persistence
//! - Resetting a date and carrying states over from an earlier date
//! - Run tracking for the per-date run report

mod schema;
mod sqlite;
mod traits;

pub use sqlite::{init_database, SqliteStateStore};
pub use traits::{StateStore, StorageError, StorageResult};

use crate::HarvestError;

use std::path::Path;

/// File name of the state database inside the site directory
pub const STATE_DB_FILE: &str = "state.db";

/// Initializes or opens a state database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file; parent directories are created
///
/// # Returns
///
/// * `Ok(SqliteStateStore)` - Successfully initialized storage
/// * `Err(HarvestError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> Result<SqliteStateStore, HarvestError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(SqliteStateStore::new(path)?)
}

/// Aggregated checkpoint counts for one site and date
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateStatistics {
    pub categories_total: u64,
    pub categories_done: u64,
    /// Pages fully processed, summed over all categories
    pub pages_done: u64,
    pub products_total: u64,
    pub products_done: u64,
    /// Per category: (name, next page, done)
    pub categories: Vec<(String, u32, bool)>,
}

/// Represents a crawl run
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub site: String,
    pub date: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
}

/// Status of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
