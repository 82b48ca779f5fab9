//! Merging per-page CSV files into the final output
//!
//! The crawl writes one file per (category, page). Finalization concatenates
//! the files of a date in category and page order into a single CSV with the
//! configured headers, optionally dropping rows whose dedup columns repeat an
//! earlier row.

use crate::config::Config;
use crate::output::sink::{temp_dir, CUSTOM_URLS};
use crate::state::sanitize_name;
use crate::storage::{StorageError, StorageResult};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// What a finalization pass produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeReport {
    /// The merged file; not written when there was nothing to merge
    pub path: PathBuf,
    pub files: usize,
    pub rows: usize,
    pub duplicates: usize,
}

/// Location of the merged file of a date
///
/// `[output].final-file` is taken relative to the site directory; without it
/// the file is `products_<site>_<date>.csv`.
pub fn final_path(config: &Config, date: &str) -> PathBuf {
    let name = config
        .output
        .final_file
        .clone()
        .unwrap_or_else(|| format!("products_{}_{}.csv", config.site.name, date));
    config.site_dir().join(name)
}

/// Merges the per-page files of `date` into [`final_path`]
///
/// In URL list mode only the custom URL file is merged. Columns are matched
/// by header, so files written with an older column order still line up.
/// The merged file is written to a temporary file and renamed into place.
pub fn finalize(config: &Config, date: &str) -> StorageResult<FinalizeReport> {
    let dir = temp_dir(Path::new(&config.output.directory), &config.site.name, date);
    let files = page_files(config, &dir, date)?;
    let target = final_path(config, date);

    let mut report = FinalizeReport {
        path: target.clone(),
        files: files.len(),
        rows: 0,
        duplicates: 0,
    };

    if files.is_empty() {
        tracing::warn!("No CSV files to merge in {}", dir.display());
        return Ok(report);
    }

    let headers = config.columns();
    let dedup: Vec<usize> = config
        .output
        .dedup_columns
        .iter()
        .filter_map(|column| headers.iter().position(|h| h == column))
        .collect();

    let parent = target
        .parent()
        .ok_or_else(|| StorageError::Serialization(format!("no parent for {:?}", target)))?;
    std::fs::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;

    {
        let mut writer = csv::Writer::from_writer(tmp.as_file_mut());
        writer.write_record(&headers)?;

        let mut seen: HashSet<Vec<String>> = HashSet::new();
        for file in &files {
            let mut reader = csv::Reader::from_path(file)?;
            let file_headers = reader.headers()?.clone();
            let positions: Vec<Option<usize>> = headers
                .iter()
                .map(|h| file_headers.iter().position(|f| f == h))
                .collect();

            for record in reader.records() {
                let record = record?;
                let cells: Vec<&str> = positions
                    .iter()
                    .map(|p| p.and_then(|i| record.get(i)).unwrap_or(""))
                    .collect();

                if !dedup.is_empty() {
                    let key = dedup.iter().map(|&i| cells[i].to_string()).collect();
                    if !seen.insert(key) {
                        report.duplicates += 1;
                        continue;
                    }
                }

                writer.write_record(&cells)?;
                report.rows += 1;
            }
            tracing::debug!("Merged {}", file.display());
        }

        writer.flush()?;
    }

    tmp.as_file().sync_all()?;
    tmp.persist(&target).map_err(|e| StorageError::Io(e.error))?;

    tracing::info!(
        "Merged {} files into {} ({} rows, {} duplicates dropped)",
        report.files,
        target.display(),
        report.rows,
        report.duplicates
    );
    Ok(report)
}

/// Per-page files of a date, in category then page order
fn page_files(config: &Config, dir: &Path, date: &str) -> StorageResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let prefix = format!("products_{}_{}_", config.site.name, date);
    let url_mode = !config.urls.is_empty();
    let categories: Vec<String> = config
        .category
        .iter()
        .map(|c| sanitize_name(&c.name))
        .collect();

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(stem) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_suffix(".csv"))
            .and_then(|n| n.strip_prefix(prefix.as_str()))
            .map(str::to_string)
        else {
            continue;
        };

        if (stem == CUSTOM_URLS) != url_mode {
            continue;
        }

        let (category, page) = match stem.rsplit_once('_') {
            Some((category, page)) => (category.to_string(), page.parse::<u32>().unwrap_or(0)),
            None => (stem.clone(), 0),
        };
        let order = categories
            .iter()
            .position(|c| *c == category)
            .unwrap_or(usize::MAX);

        files.push(((order, category, page), path));
    }

    files.sort();
    Ok(files.into_iter().map(|(_, path)| path).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ColumnMapping;
    use crate::extract::Row;
    use crate::output::CsvSink;
    use tempfile::TempDir;

    fn config(dir: &Path) -> Config {
        let toml = format!(
            r#"
            [site]
            name = "shop"

            [[category]]
            name = "Tents"
            url = "https://shop.test/c/tents"

            [[category]]
            name = "Bags"
            url = "https://shop.test/c/bags"

            [output]
            directory = "{}"

            [[column]]
            field = "product_id"
            header = "ID"

            [[column]]
            field = "option1"
            header = "Size"
            "#,
            dir.display()
        );
        toml::from_str(&toml).unwrap()
    }

    fn write(sink: &CsvSink, columns: &[ColumnMapping], category: &str, page: u32, ids: &[&str]) {
        let rows: Vec<Row> = ids
            .iter()
            .map(|id| Row::new().with("product_id", *id).with("option1", "M"))
            .collect();
        let path = sink.page_path("shop", "20240105", category, page);
        sink.append_rows(&path, columns, &rows).unwrap();
    }

    #[test]
    fn test_merge_follows_category_and_page_order() {
        let dir = TempDir::new().unwrap();
        let config = config(dir.path());
        let sink = CsvSink::new(dir.path());

        write(&sink, &config.column, "Bags", 1, &["b1"]);
        write(&sink, &config.column, "Tents", 10, &["t10"]);
        write(&sink, &config.column, "Tents", 2, &["t2"]);
        write(&sink, &config.column, "Tents", 1, &["t1"]);
        // Belongs to the URL list mode, not merged here
        sink.append_rows(
            &sink.custom_urls_path("shop", "20240105"),
            &config.column,
            &[Row::new().with("product_id", "u1")],
        )
        .unwrap();

        let report = finalize(&config, "20240105").unwrap();
        assert_eq!(report.files, 4);
        assert_eq!(report.rows, 4);

        let merged = std::fs::read_to_string(&report.path).unwrap();
        assert_eq!(merged, "ID,Size\nt1,M\nt2,M\nt10,M\nb1,M\n");
        assert!(report.path.ends_with("shop/products_shop_20240105.csv"));
    }

    #[test]
    fn test_dedup_drops_repeated_keys() {
        let dir = TempDir::new().unwrap();
        let mut config = config(dir.path());
        config.output.dedup_columns = vec!["ID".to_string()];
        config.output.final_file = Some("all.csv".to_string());
        let sink = CsvSink::new(dir.path());

        write(&sink, &config.column, "Tents", 1, &["p1", "p2"]);
        write(&sink, &config.column, "Tents", 2, &["p2", "p3"]);

        let report = finalize(&config, "20240105").unwrap();
        assert_eq!(report.rows, 3);
        assert_eq!(report.duplicates, 1);
        assert!(report.path.ends_with("shop/all.csv"));
    }

    #[test]
    fn test_columns_matched_by_header() {
        let dir = TempDir::new().unwrap();
        let config = config(dir.path());
        let path = CsvSink::new(dir.path()).page_path("shop", "20240105", "Tents", 1);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "Size,ID\nL,p9\n").unwrap();

        let report = finalize(&config, "20240105").unwrap();
        assert_eq!(
            std::fs::read_to_string(report.path).unwrap(),
            "ID,Size\np9,L\n"
        );
    }

    #[test]
    fn test_nothing_to_merge() {
        let dir = TempDir::new().unwrap();
        let report = finalize(&config(dir.path()), "20240105").unwrap();
        assert_eq!(report.files, 0);
        assert!(!report.path.exists());
    }
}
