//! Browser driver boundary
//!
//! The crawl engine talks to whatever loads pages through two traits:
//!
//! - [`Browser`] fetches raw content and opens pages
//! - [`Page`] is one navigable tab: go to a URL, read its content, nudge
//!   lazily loaded parts into view
//!
//! [`HttpBrowser`] implements both over plain HTTP. Its pages have no live
//! DOM, so "focusing" re-requests the document.

mod document;
mod http;

pub use document::{
    parse, resolve_link, Document, Element, HtmlDocument, PageDocument, ParserEngine,
};
pub use http::{build_http_client, HttpBrowser, HttpPage};

use crate::HarvestError;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a driver
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Timed out after {elapsed:?} loading {url}")]
    Timeout { url: String, elapsed: Duration },

    #[error("HTTP {status} from {url}")]
    Http { url: String, status: u16 },

    #[error("Request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    #[error("Page has no document loaded")]
    NoDocument,

    #[error("Page is closed")]
    Closed,
}

impl DriverError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result type for driver operations
pub type DriverResult<T> = Result<T, DriverError>;

/// Maps driver failures the crawl can handle onto typed errors
///
/// Timeouts become `TimeoutExceeded` and 404/410 responses become
/// `NotFound`; anything else is handed back unchanged. Meant to be used
/// with [`crate::retry::attempt`].
pub fn recognize(err: DriverError) -> Result<HarvestError, DriverError> {
    match err {
        DriverError::Timeout { url, elapsed } => {
            Ok(HarvestError::TimeoutExceeded { url, elapsed })
        }
        DriverError::Http { url, status: 404 | 410 } => Ok(HarvestError::not_found("page", url)),
        other => Err(other),
    }
}

/// What a fetch does with an error status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnFailure {
    /// Error statuses fail the fetch with `DriverError::Http`
    #[default]
    Raise,

    /// The body is returned whatever the status
    ReturnBody,
}

/// When a navigation counts as finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitUntil {
    #[default]
    Load,
    DomContentLoaded,
    NetworkIdle,
}

/// Options for a single fetch
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub on_failure: OnFailure,
    pub wait_until: WaitUntil,
    pub timeout: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            on_failure: OnFailure::Raise,
            wait_until: WaitUntil::Load,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Loads documents and opens pages
#[async_trait]
pub trait Browser: Send + Sync {
    /// Fetches the raw content at `url`
    async fn fetch(&self, url: &str, options: &FetchOptions) -> DriverResult<Vec<u8>>;

    /// Opens a new page; the caller closes it
    async fn new_page(&self) -> DriverResult<Box<dyn Page>>;
}

/// One navigable page
#[async_trait]
pub trait Page: Send + Sync {
    /// Navigates to `url` and waits for the given load state
    async fn goto(&mut self, url: &str, wait_until: WaitUntil) -> DriverResult<()>;

    /// Current markup of the page
    async fn content(&self) -> DriverResult<String>;

    /// Brings the element matching `selector` into focus
    ///
    /// Used as the recovery step for lazily loaded content. Drivers without
    /// a notion of focus do nothing.
    async fn focus(&mut self, _selector: &str) -> DriverResult<()> {
        Ok(())
    }

    /// URL of the last successful navigation
    fn url(&self) -> Option<&str>;

    async fn close(&mut self) -> DriverResult<()>;
}
