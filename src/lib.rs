//! Catalog-Harvest: a resumable catalog crawler
//!
//! This crate implements the shared crawl engine behind per-site product
//! crawlers: it paginates category listings, fans products out in bounded
//! chunks, checkpoints progress per category and per product, and appends
//! extracted rows to CSV files as soon as they are produced.

pub mod cache;
pub mod config;
pub mod crawler;
pub mod driver;
pub mod extract;
pub mod output;
pub mod retry;
pub mod state;
pub mod storage;

use std::time::Duration;
use thiserror::Error;

/// Main error type for Catalog-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{what} not found at {url}")]
    NotFound { what: String, url: String },

    #[error("Failed to parse document from {url}: {message}")]
    ParseFailure { url: String, message: String },

    #[error("Timed out after {elapsed:?} at {url}")]
    TimeoutExceeded { url: String, elapsed: Duration },

    #[error("Gave up after {tries} tries: {last}")]
    MaxTriesReached { tries: u32, last: String },

    #[error("Inconsistent data at {url}: {message}")]
    InconsistentData { url: String, message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Driver error: {0}")]
    Driver(#[from] driver::DriverError),

    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The closed set of failure kinds the orchestrator reasons about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// An expected element or value was absent
    NotFound,
    /// Content did not parse into a usable document
    ParseFailure,
    /// A network or interaction timeout
    TimeoutExceeded,
    /// A bounded retry loop was exhausted
    MaxTriesReached,
    /// A structural assumption about the page was violated
    InconsistentData,
    /// State, cache or output write failed
    StorageFailure,
    /// Anything the crawl has no recovery for
    Fatal,
}

impl HarvestError {
    pub fn not_found(what: impl Into<String>, url: impl Into<String>) -> Self {
        Self::NotFound {
            what: what.into(),
            url: url.into(),
        }
    }

    pub fn inconsistent(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InconsistentData {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn parse_failure(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ParseFailure {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Classifies this error into one of the crawl's failure kinds
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::ParseFailure { .. } | Self::Selector { .. } => ErrorKind::ParseFailure,
            Self::TimeoutExceeded { .. } => ErrorKind::TimeoutExceeded,
            Self::MaxTriesReached { .. } => ErrorKind::MaxTriesReached,
            Self::InconsistentData { .. } => ErrorKind::InconsistentData,
            Self::Storage(_) | Self::Io(_) => ErrorKind::StorageFailure,
            Self::Driver(e) if e.is_timeout() => ErrorKind::TimeoutExceeded,
            Self::Config(_) | Self::Driver(_) => ErrorKind::Fatal,
        }
    }

    /// Returns true for kinds that are handled next to the extraction call site
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NotFound | ErrorKind::InconsistentData | ErrorKind::TimeoutExceeded
        )
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Malformed categories file line {line}: {content}")]
    CategoryLine { line: usize, content: String },
}

/// Result type alias for Catalog-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::{Category, Config};
pub use extract::{ProductRef, Row, Value};
pub use state::{CategoryState, ProductState};
