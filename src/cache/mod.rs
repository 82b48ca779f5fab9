//! Content cache for fetched documents
//!
//! Raw HTML of category and product pages is kept on disk per crawl date so
//! a re-run can re-parse pages without fetching them again. Entries are
//! write-once from the crawler's point of view: callers check [`ContentCache::exists`]
//! before saving. There is no eviction; a date's cache is dropped as a whole
//! on reset.

mod key;

pub use key::{date_dir, CacheKey, HTML_DIR};

use crate::storage::{StorageError, StorageResult};
use std::io::Write;
use std::path::{Path, PathBuf};

/// On-disk document cache rooted at the output directory
#[derive(Debug, Clone)]
pub struct ContentCache {
    root: PathBuf,
}

impl ContentCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, key: &CacheKey) -> PathBuf {
        key.path(&self.root)
    }

    /// Returns true when a document is stored under `key`
    pub fn exists(&self, key: &CacheKey) -> bool {
        self.path_of(key).is_file()
    }

    /// Stores `content` under `key`, replacing any previous entry
    ///
    /// The content is written to a temporary file in the target directory
    /// and renamed into place, so readers never observe a partial document.
    ///
    /// # Returns
    ///
    /// The path of the stored document
    pub fn save(&self, key: &CacheKey, content: &[u8]) -> StorageResult<PathBuf> {
        let path = self.path_of(key);
        let dir = path
            .parent()
            .ok_or_else(|| StorageError::Serialization(format!("no parent for {:?}", path)))?;
        std::fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(content)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| StorageError::Io(e.error))?;

        tracing::debug!("Cached {} bytes at {}", content.len(), path.display());
        Ok(path)
    }

    /// Reads the document stored under `key`
    pub fn load(&self, key: &CacheKey) -> StorageResult<Vec<u8>> {
        Ok(std::fs::read(self.path_of(key))?)
    }

    /// Reads the document under `key` when present
    pub fn get(&self, key: &CacheKey) -> StorageResult<Option<Vec<u8>>> {
        match std::fs::read(self.path_of(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Deletes every cached document of one date
    pub fn clear_date(&self, site: &str, date: &str) -> StorageResult<()> {
        let dir = date_dir(&self.root, site, date);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }

    /// Copies every cached document of `from` into `to`
    ///
    /// Returns the number of files copied.
    pub fn copy_date(&self, site: &str, from: &str, to: &str) -> StorageResult<usize> {
        let source = date_dir(&self.root, site, from);
        if !source.exists() {
            return Ok(0);
        }
        copy_tree(&source, &date_dir(&self.root, site, to))
    }
}

/// Recursively copies a directory tree, returning the number of files copied
fn copy_tree(from: &Path, to: &Path) -> StorageResult<usize> {
    std::fs::create_dir_all(to)?;
    let mut copied = 0;

    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copied += copy_tree(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }

    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let cache = ContentCache::new(dir.path());
        let key = CacheKey::product("acorn", "20240105", "Tents", Some(1), "P-1");

        assert!(!cache.exists(&key));
        assert!(cache.get(&key).unwrap().is_none());

        let body = "<html><body>\u{d14c}\u{d2b8}</body></html>".as_bytes();
        let path = cache.save(&key, body).unwrap();

        assert!(cache.exists(&key));
        assert_eq!(cache.load(&key).unwrap(), body);
        assert!(path.ends_with("acorn/html/20240105/Tents/1/P-1.html"));
    }

    #[test]
    fn test_save_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let cache = ContentCache::new(dir.path());
        let key = CacheKey::category_page("acorn", "20240105", "Tents", 1);

        cache.save(&key, b"first").unwrap();
        cache.save(&key, b"second").unwrap();

        let date = date_dir(dir.path(), "acorn", "20240105");
        let files: Vec<_> = std::fs::read_dir(&date).unwrap().collect();
        assert_eq!(files.len(), 1);
        assert_eq!(cache.load(&key).unwrap(), b"second");
    }

    #[test]
    fn test_load_missing_is_error() {
        let dir = TempDir::new().unwrap();
        let cache = ContentCache::new(dir.path());
        let key = CacheKey::category_page("acorn", "20240105", "Tents", 9);
        assert!(matches!(cache.load(&key), Err(StorageError::Io(_))));
    }

    #[test]
    fn test_copy_and_clear_date() {
        let dir = TempDir::new().unwrap();
        let cache = ContentCache::new(dir.path());
        cache
            .save(&CacheKey::category_page("acorn", "20240105", "Tents", 1), b"a")
            .unwrap();
        cache
            .save(
                &CacheKey::product("acorn", "20240105", "Tents", Some(1), "P-1"),
                b"b",
            )
            .unwrap();

        assert_eq!(cache.copy_date("acorn", "20240105", "20240107").unwrap(), 2);
        assert!(cache.exists(&CacheKey::product("acorn", "20240107", "Tents", Some(1), "P-1")));

        cache.clear_date("acorn", "20240105").unwrap();
        assert!(!cache.exists(&CacheKey::category_page("acorn", "20240105", "Tents", 1)));
        assert!(cache.exists(&CacheKey::category_page("acorn", "20240107", "Tents", 1)));

        assert_eq!(cache.copy_date("acorn", "19990101", "20240108").unwrap(), 0);
    }
}
