//! Cache keys and their on-disk layout

use crate::state::sanitize_name;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Directory under the site directory that holds cached documents
pub const HTML_DIR: &str = "html";

/// Identifies one cached document
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// A category listing page
    ///
    /// Stored at `<site>/html/<date>/<category>-<page>.html`
    CategoryPage {
        site: String,
        date: String,
        category: String,
        page: u32,
    },

    /// A product page
    ///
    /// Stored at `<site>/html/<date>/<category>/<page>/<product_id>.html`,
    /// or `<site>/html/<date>/<category>/<product_id>.html` without a page
    Product {
        site: String,
        date: String,
        category: String,
        page: Option<u32>,
        product_id: String,
    },
}

impl CacheKey {
    pub fn category_page(site: &str, date: &str, category: &str, page: u32) -> Self {
        Self::CategoryPage {
            site: site.to_string(),
            date: date.to_string(),
            category: category.to_string(),
            page,
        }
    }

    pub fn product(
        site: &str,
        date: &str,
        category: &str,
        page: Option<u32>,
        product_id: &str,
    ) -> Self {
        Self::Product {
            site: site.to_string(),
            date: date.to_string(),
            category: category.to_string(),
            page,
            product_id: product_id.to_string(),
        }
    }

    /// Resolves the key to a file path below `root`
    pub fn path(&self, root: &Path) -> PathBuf {
        match self {
            Self::CategoryPage {
                site,
                date,
                category,
                page,
            } => date_dir(root, site, date).join(format!("{}-{}.html", sanitize_name(category), page)),
            Self::Product {
                site,
                date,
                category,
                page,
                product_id,
            } => {
                let mut dir = date_dir(root, site, date).join(sanitize_name(category));
                if let Some(page) = page {
                    dir = dir.join(page.to_string());
                }
                dir.join(format!("{}.html", file_stem(product_id)))
            }
        }
    }
}

/// Directory holding every cached document of one date
pub fn date_dir(root: &Path, site: &str, date: &str) -> PathBuf {
    root.join(site).join(HTML_DIR).join(date)
}

/// File-safe stem for a product id
///
/// Plain ids are used as they are; ids that are URLs or otherwise carry
/// unsafe characters are replaced by a SHA-256 prefix.
fn file_stem(product_id: &str) -> String {
    let plain = !product_id.is_empty()
        && product_id.len() <= 100
        && product_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !product_id.starts_with('.');

    if plain {
        return product_id.to_string();
    }

    let mut hasher = Sha256::new();
    hasher.update(product_id.as_bytes());
    hex::encode(hasher.finalize())[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_page_path() {
        let key = CacheKey::category_page("acorn", "20240105", "Outdoor>Tents", 3);
        assert_eq!(
            key.path(Path::new("/out")),
            PathBuf::from("/out/acorn/html/20240105/Outdoor_Tents-3.html")
        );
    }

    #[test]
    fn test_product_path() {
        let key = CacheKey::product("acorn", "20240105", "Tents", Some(2), "P-1001");
        assert_eq!(
            key.path(Path::new("/out")),
            PathBuf::from("/out/acorn/html/20240105/Tents/2/P-1001.html")
        );

        let no_page = CacheKey::product("acorn", "20240105", "CUSTOM_URLS", None, "P-1001");
        assert_eq!(
            no_page.path(Path::new("/out")),
            PathBuf::from("/out/acorn/html/20240105/CUSTOM_URLS/P-1001.html")
        );
    }

    #[test]
    fn test_url_product_ids_are_hashed() {
        let stem = file_stem("https://shop.example.com/item?pcode=1");
        assert_eq!(stem.len(), 16);
        assert!(stem.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(stem, file_stem("https://shop.example.com/item?pcode=1"));
        assert_ne!(stem, file_stem("https://shop.example.com/item?pcode=2"));

        assert_ne!(file_stem("../etc"), "../etc");
    }
}
