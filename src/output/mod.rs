//! Output module for crawl results and reports
//!
//! This module handles:
//! - Appending extracted rows to per-page CSV files as products finish
//! - Merging the per-page files of a date into one final file
//! - Printing checkpoint statistics
//! - Appending a report of every run

mod finalize;
mod report;
mod sink;
pub mod stats;

pub use finalize::{final_path, finalize, FinalizeReport};
pub use report::{append_run_report, format_elapsed, report_path, REPORTS_DIR};
pub use sink::{copy_temp_files, temp_dir, CsvSink, CUSTOM_URLS, TEMP_DIR};
pub use stats::{load_statistics, print_statistics};

use std::time::Duration;

/// What one crawl run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    pub site: String,
    pub date: String,

    /// Categories finished during this run
    pub categories_done: usize,

    /// Categories that were already done before this run
    pub categories_skipped: usize,

    /// Categories that stopped on a failed page or an error
    pub categories_failed: usize,

    /// Listing pages checkpointed during this run
    pub pages: usize,

    pub products_done: usize,

    /// Products skipped as already done or inconsistent
    pub products_skipped: usize,

    pub products_failed: usize,

    /// CSV rows written
    pub rows: usize,

    pub elapsed: Duration,
}
