//! Extraction pipeline
//!
//! A [`SiteExtractor`] knows one site's markup: how listing pages are
//! addressed, how many products a listing holds, where each product's page
//! lives and which rows a product page yields. The crawl engine only drives
//! it; it never looks at markup itself.
//!
//! [`SelectorExtractor`] is the declarative implementation configured from
//! the `[extract]` table.

mod context;
mod selector;

pub use context::ProductContext;
pub use selector::SelectorExtractor;

use crate::config::{Category, ColumnMapping};
use crate::driver::Document;
use crate::Result;
use async_trait::async_trait;
use std::fmt;

/// A single output cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Text(String),
    Int(i64),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{}", s),
            Self::Int(n) => write!(f, "{}", n),
        }
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

/// One output row: field names mapped to values, in insertion order
///
/// A product with N options yields N rows that share every non-option field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    fields: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a field, replacing an earlier value of the same name
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    /// Builder form of [`Row::set`]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Cells in column order; fields without a column are dropped and
    /// columns without a field are empty
    pub fn record(&self, columns: &[ColumnMapping]) -> Vec<String> {
        columns
            .iter()
            .map(|c| self.get(&c.field).map(Value::to_string).unwrap_or_default())
            .collect()
    }
}

/// Identity and location of one product
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProductRef {
    pub id: String,
    pub url: String,
}

/// Site-specific extraction logic
///
/// The synchronous methods work on an already parsed document; the async
/// ones may load product pages through the [`ProductContext`].
#[async_trait]
pub trait SiteExtractor: Send + Sync {
    /// URL of listing page `pageno` (1-based) of a category
    fn page_url(&self, category: &Category, pageno: u32) -> Result<String>;

    /// Number of products on a listing page, `Ok(None)` when it cannot tell
    fn count_products(&self, document: &dyn Document) -> Result<Option<usize>>;

    /// Resolves the product at `index` on a listing page
    fn product_ref(&self, document: &dyn Document, index: usize, page_url: &str)
        -> Result<ProductRef>;

    /// Extracts the rows of one product
    async fn extract_rows(&self, ctx: &ProductContext<'_>, product: &ProductRef)
        -> Result<Vec<Row>>;

    /// Extracts the rows behind an explicitly configured product URL
    async fn extract_url(&self, ctx: &ProductContext<'_>, url: &str) -> Result<Vec<Row>>;
}
