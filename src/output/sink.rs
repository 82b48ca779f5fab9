//! Incremental CSV output
//!
//! Rows are appended to one CSV file per (category, page) as soon as a
//! product has been extracted. Every append is flushed and synced before it
//! returns, so a crash loses at most the product that was being written and
//! finished products never need to be crawled again.

use crate::config::ColumnMapping;
use crate::extract::Row;
use crate::state::sanitize_name;
use crate::storage::{StorageError, StorageResult};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Directory (below the site directory) holding per-page CSV files
pub const TEMP_DIR: &str = "temp";

/// Category name used for the file of the URL list mode
pub const CUSTOM_URLS: &str = "CUSTOM_URLS";

/// Appends extracted rows to CSV files below the output directory
#[derive(Debug)]
pub struct CsvSink {
    root: PathBuf,
    // Appends are synchronous, one at a time
    write_lock: Mutex<()>,
}

impl CsvSink {
    /// Creates a sink writing below `root` (the configured output directory)
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of the per-page files of one date
    pub fn temp_dir(&self, site: &str, date: &str) -> PathBuf {
        temp_dir(&self.root, site, date)
    }

    /// File receiving the rows of one listing page
    pub fn page_path(&self, site: &str, date: &str, category: &str, page: u32) -> PathBuf {
        self.temp_dir(site, date).join(format!(
            "products_{}_{}_{}_{}.csv",
            site,
            date,
            sanitize_name(category),
            page
        ))
    }

    /// File receiving the rows of the URL list mode
    pub fn custom_urls_path(&self, site: &str, date: &str) -> PathBuf {
        self.temp_dir(site, date)
            .join(format!("products_{}_{}_{}.csv", site, date, CUSTOM_URLS))
    }

    /// Appends `rows` to the file at `path`
    ///
    /// The header row is written when the file is empty. Cells follow the
    /// order of `columns`; fields a row does not carry are left empty. The
    /// file is flushed and synced before this returns.
    ///
    /// # Returns
    ///
    /// The number of rows written
    pub fn append_rows(&self, path: &Path, columns: &[ColumnMapping], rows: &[Row]) -> StorageResult<usize> {
        let _guard = self.write_lock.lock().map_err(|_| StorageError::Poisoned)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let needs_header = file.metadata()?.len() == 0;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        if needs_header {
            writer.write_record(columns.iter().map(|c| c.header.as_str()))?;
        }
        for row in rows {
            writer.write_record(row.record(columns))?;
        }

        writer.flush()?;
        let file = writer
            .into_inner()
            .map_err(|e| StorageError::Io(e.into_error()))?;
        file.sync_data()?;

        tracing::trace!("Appended {} rows to {}", rows.len(), path.display());
        Ok(rows.len())
    }
}

/// `<root>/<site>/temp/<date>`
pub fn temp_dir(root: &Path, site: &str, date: &str) -> PathBuf {
    root.join(site).join(TEMP_DIR).join(date)
}

/// Copies the per-page CSV files of date `from` over to date `to`
///
/// File names carry their date, so copies are renamed to `to`; files of
/// another naming scheme keep their name.
///
/// # Returns
///
/// The number of files copied
pub fn copy_temp_files(root: &Path, site: &str, from: &str, to: &str) -> StorageResult<usize> {
    let source = temp_dir(root, site, from);
    if !source.is_dir() {
        return Ok(0);
    }

    let target = temp_dir(root, site, to);
    std::fs::create_dir_all(&target)?;

    let old_prefix = format!("products_{}_{}_", site, from);
    let new_prefix = format!("products_{}_{}_", site, to);
    let mut copied = 0;

    for entry in std::fs::read_dir(&source)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().into_owned();
        let name = match name.strip_prefix(old_prefix.as_str()) {
            Some(rest) => format!("{}{}", new_prefix, rest),
            None => name,
        };

        std::fs::copy(entry.path(), target.join(&name))?;
        tracing::debug!("Copied {} as {}", entry.path().display(), name);
        copied += 1;
    }

    Ok(copied)
}
