use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure for Catalog-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub site: SiteConfig,
    #[serde(default)]
    pub categories: CategoriesConfig,
    #[serde(default)]
    pub category: Vec<Category>,
    #[serde(default)]
    pub products: ProductsConfig,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub column: Vec<ColumnMapping>,
    /// Explicit product URLs; when present the category path is bypassed
    #[serde(default)]
    pub urls: Vec<String>,
    pub extract: Option<ExtractConfig>,
}

/// Site identity and crawl date
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Short site name, used as a storage namespace
    pub name: String,

    /// Crawl date stamp (YYYYMMDD); today when absent
    pub date: Option<String>,

    /// Page number a fresh category starts from
    #[serde(rename = "start-page", default = "default_start_page")]
    pub start_page: u32,
}

/// A listing to paginate
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Category {
    pub name: String,
    pub url: String,
}

/// Category selection and scheduling
#[derive(Debug, Clone, Deserialize)]
pub struct CategoriesConfig {
    /// File with one `name, url` pair per line, merged after inline categories
    pub file: Option<String>,

    /// First category of the inclusive crawl window
    pub start: Option<String>,

    /// Last category of the inclusive crawl window
    pub end: Option<String>,

    /// Number of categories crawled concurrently
    #[serde(rename = "chunk-size", default = "default_categories_chunk_size")]
    pub chunk_size: usize,
}

/// Product-level chunking
#[derive(Debug, Clone, Deserialize)]
pub struct ProductsConfig {
    #[serde(rename = "min-chunk-size", default = "default_products_chunk_size")]
    pub min_chunk_size: usize,

    #[serde(rename = "max-chunk-size", default = "default_products_chunk_size")]
    pub max_chunk_size: usize,
}

/// Which progress gets persisted
#[derive(Debug, Clone, Deserialize)]
pub struct CheckpointConfig {
    #[serde(rename = "category-states", default = "default_true")]
    pub category_states: bool,

    #[serde(rename = "product-states", default = "default_true")]
    pub product_states: bool,

    /// Keep raw fetched HTML in the content cache
    #[serde(rename = "save-html", default = "default_true")]
    pub save_html: bool,
}

/// Timeouts, retries and politeness
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    /// Upper bound for one network operation (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Navigation timeout handed to the driver (milliseconds)
    #[serde(rename = "navigation-timeout-ms", default = "default_navigation_timeout")]
    pub navigation_timeout_ms: u64,

    /// Requests allowed per rate-limit period
    #[serde(rename = "rate-limit", default = "default_rate_limit")]
    pub rate_limit: u32,

    /// Length of the rate-limit period (milliseconds)
    #[serde(rename = "period-ms", default = "default_period")]
    pub period_ms: u64,

    /// Attempts for an operation that keeps timing out
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// First backoff delay (milliseconds), doubled per attempt
    #[serde(rename = "backoff-base-ms", default = "default_backoff_base")]
    pub backoff_base_ms: u64,

    /// Attempts to get past a lazy-load placeholder
    #[serde(rename = "lazy-retries", default = "default_lazy_retries")]
    pub lazy_retries: u32,

    #[serde(rename = "user-agent")]
    pub user_agent: Option<String>,
}

/// Output locations
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Root directory for states, cache, temporary CSVs and reports
    pub directory: String,

    /// Name of the merged CSV written by finalization
    #[serde(rename = "final-file")]
    pub final_file: Option<String>,

    /// Header names whose combined values identify duplicate rows
    #[serde(rename = "dedup-columns", default)]
    pub dedup_columns: Vec<String>,
}

/// Maps an extracted field to an output column header
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ColumnMapping {
    pub field: String,
    pub header: String,
}

/// Declarative selectors for the built-in extractor
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractConfig {
    /// Selector matching one element per product on a listing page
    pub products: String,

    /// Selector (within a product element) of the product link
    #[serde(default = "default_link_selector")]
    pub link: String,

    /// Regex whose first group is the product id; the whole link when absent
    #[serde(rename = "id-pattern")]
    pub id_pattern: Option<String>,

    /// Query parameter that carries the page number
    #[serde(rename = "page-param", default = "default_page_param")]
    pub page_param: String,

    /// Selector of option entries on a product page
    pub options: Option<String>,

    /// Text marking lazily loaded content that has not arrived yet
    pub placeholder: Option<String>,

    /// Selector focused between attempts while the placeholder is present
    #[serde(default = "default_focus_selector")]
    pub focus: String,

    #[serde(default)]
    pub field: Vec<FieldSelector>,
}

/// One product field pulled from the product page
#[derive(Debug, Clone, Deserialize)]
pub struct FieldSelector {
    pub name: String,
    pub selector: String,
    /// Attribute to read instead of the element text
    pub attr: Option<String>,
    /// Parse the value as an integer (digits only)
    #[serde(default)]
    pub integer: bool,
    /// Missing elements yield an empty value instead of an error
    #[serde(default)]
    pub optional: bool,
    /// One match per option entry, zipped with the options
    #[serde(rename = "per-option", default)]
    pub per_option: bool,
}

impl Config {
    /// Crawl date stamp: configured or today's local date
    pub fn crawl_date(&self) -> String {
        self.site
            .date
            .clone()
            .unwrap_or_else(|| chrono::Local::now().format("%Y%m%d").to_string())
    }

    /// Ordered output column headers
    pub fn columns(&self) -> Vec<String> {
        self.column.iter().map(|c| c.header.clone()).collect()
    }

    /// Root directory of everything written for this site
    pub fn site_dir(&self) -> PathBuf {
        Path::new(&self.output.directory).join(&self.site.name)
    }
}

impl Default for CategoriesConfig {
    fn default() -> Self {
        Self {
            file: None,
            start: None,
            end: None,
            chunk_size: default_categories_chunk_size(),
        }
    }
}

impl Default for ProductsConfig {
    fn default() -> Self {
        Self {
            min_chunk_size: default_products_chunk_size(),
            max_chunk_size: default_products_chunk_size(),
        }
    }
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            category_states: true,
            product_states: true,
            save_html: true,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            navigation_timeout_ms: default_navigation_timeout(),
            rate_limit: default_rate_limit(),
            period_ms: default_period(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base(),
            lazy_retries: default_lazy_retries(),
            user_agent: None,
        }
    }
}

fn default_start_page() -> u32 {
    1
}

fn default_categories_chunk_size() -> usize {
    5
}

fn default_products_chunk_size() -> usize {
    10
}

fn default_true() -> bool {
    true
}

fn default_request_timeout() -> u64 {
    60
}

fn default_navigation_timeout() -> u64 {
    300_000
}

fn default_rate_limit() -> u32 {
    10
}

fn default_period() -> u64 {
    1000
}

fn default_max_retries() -> u32 {
    5
}

fn default_backoff_base() -> u64 {
    1000
}

fn default_lazy_retries() -> u32 {
    5
}

fn default_link_selector() -> String {
    "a".to_string()
}

fn default_focus_selector() -> String {
    "img".to_string()
}

fn default_page_param() -> String {
    "page".to_string()
}
