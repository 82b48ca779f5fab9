//! Per-date run reports
//!
//! Every run appends a short block to `<root>/<site>/reports/<date>.txt`, so
//! the file tells how many runs a date needed and what each one achieved.

use crate::output::CrawlSummary;
use chrono::{DateTime, Local};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory (below the site directory) holding run reports
pub const REPORTS_DIR: &str = "reports";

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// `<root>/<site>/reports/<date>.txt`
pub fn report_path(root: &Path, site: &str, date: &str) -> PathBuf {
    root.join(site)
        .join(REPORTS_DIR)
        .join(format!("{}.txt", date))
}

/// Appends the report of one run
///
/// # Arguments
///
/// * `path` - Report file; created along with its directory when missing
/// * `run_number` - 1-based number of the run for this date
/// * `started` - Local start time
/// * `finished` - Local end time
/// * `summary` - Counters of the run
pub fn append_run_report(
    path: &Path,
    run_number: u64,
    started: DateTime<Local>,
    finished: DateTime<Local>,
    summary: &CrawlSummary,
) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let elapsed = (finished - started).to_std().unwrap_or(summary.elapsed);

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "Run #{}", run_number)?;
    writeln!(file, "  Started:    {}", started.format(TIME_FORMAT))?;
    writeln!(file, "  Finished:   {}", finished.format(TIME_FORMAT))?;
    writeln!(file, "  Elapsed:    {}", format_elapsed(elapsed))?;
    writeln!(
        file,
        "  Categories: {} done, {} already done, {} unfinished",
        summary.categories_done, summary.categories_skipped, summary.categories_failed
    )?;
    writeln!(file, "  Pages:      {}", summary.pages)?;
    writeln!(
        file,
        "  Products:   {} written ({} rows), {} skipped, {} failed",
        summary.products_done, summary.rows, summary.products_skipped, summary.products_failed
    )?;
    writeln!(file)?;
    file.sync_data()
}

/// Formats a duration as `1h 02m 03s`
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{}h {:02}m {:02}s", secs / 3600, (secs % 3600) / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_secs(0)), "0h 00m 00s");
        assert_eq!(format_elapsed(Duration::from_secs(3723)), "1h 02m 03s");
        assert_eq!(format_elapsed(Duration::from_secs(90_061)), "25h 01m 01s");
    }

    #[test]
    fn test_reports_accumulate() {
        let dir = TempDir::new().unwrap();
        let path = report_path(dir.path(), "shop", "20240105");
        assert!(path.ends_with("shop/reports/20240105.txt"));

        let started = Local.with_ymd_and_hms(2024, 1, 5, 9, 0, 0).unwrap();
        let finished = Local.with_ymd_and_hms(2024, 1, 5, 9, 42, 7).unwrap();
        let summary = CrawlSummary {
            products_done: 12,
            rows: 30,
            pages: 2,
            ..CrawlSummary::default()
        };

        append_run_report(&path, 1, started, finished, &summary).unwrap();
        append_run_report(&path, 2, started, finished, &CrawlSummary::default()).unwrap();

        let report = std::fs::read_to_string(&path).unwrap();
        assert!(report.starts_with("Run #1\n"));
        assert!(report.contains("Started:    2024-01-05 09:00:00"));
        assert!(report.contains("Elapsed:    0h 42m 07s"));
        assert!(report.contains("12 written (30 rows)"));
        assert!(report.contains("\nRun #2\n"));
    }
}
