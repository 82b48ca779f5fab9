use crate::config::types::{
    Category, CheckpointConfig, ColumnMapping, Config, ExtractConfig, NetworkConfig,
    ProductsConfig, SiteConfig,
};
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_site_config(&config.site)?;
    validate_work_source(config)?;
    for category in &config.category {
        validate_category(category)?;
    }
    for url in &config.urls {
        validate_http_url(url)?;
    }
    if config.categories.chunk_size < 1 {
        return Err(ConfigError::Validation(
            "categories chunk-size must be >= 1".to_string(),
        ));
    }
    validate_products_config(&config.products)?;
    validate_checkpoint_config(&config.checkpoint)?;
    validate_network_config(&config.network)?;
    validate_columns(&config.column, &config.output.dedup_columns)?;
    if let Some(extract) = &config.extract {
        validate_extract_config(extract)?;
    }

    if config.output.directory.is_empty() {
        return Err(ConfigError::Validation(
            "output directory cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates site identity and date
fn validate_site_config(config: &SiteConfig) -> Result<(), ConfigError> {
    if config.name.is_empty() {
        return Err(ConfigError::Validation(
            "site name cannot be empty".to_string(),
        ));
    }

    // The name becomes a directory and a storage namespace
    if !config
        .name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "site name must contain only alphanumeric characters, '-' or '_', got '{}'",
            config.name
        )));
    }

    if let Some(date) = &config.date {
        validate_date(date)?;
    }

    if config.start_page < 1 {
        return Err(ConfigError::Validation(format!(
            "start-page must be >= 1, got {}",
            config.start_page
        )));
    }

    Ok(())
}

/// A crawl needs categories to paginate or URLs to visit
fn validate_work_source(config: &Config) -> Result<(), ConfigError> {
    if config.category.is_empty() && config.urls.is_empty() {
        return Err(ConfigError::Validation(
            "at least one category or url is required".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for category in &config.category {
        if !seen.insert(category.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate category name '{}'",
                category.name
            )));
        }
    }

    Ok(())
}

/// Validates a single category entry
pub(crate) fn validate_category(category: &Category) -> Result<(), ConfigError> {
    if category.name.trim().is_empty() {
        return Err(ConfigError::Validation(
            "category name cannot be empty".to_string(),
        ));
    }
    validate_http_url(&category.url)
}

fn validate_http_url(raw: &str) -> Result<(), ConfigError> {
    let url = Url::parse(raw)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid URL '{}': {}", raw, e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "URL '{}' must use http or https",
            raw
        )));
    }

    Ok(())
}

/// Validates a YYYYMMDD date stamp
pub fn validate_date(date: &str) -> Result<(), ConfigError> {
    chrono::NaiveDate::parse_from_str(date, "%Y%m%d")
        .map(|_| ())
        .map_err(|_| {
            ConfigError::Validation(format!("date must be formatted as YYYYMMDD, got '{}'", date))
        })
}

fn validate_products_config(config: &ProductsConfig) -> Result<(), ConfigError> {
    if config.min_chunk_size < 1 {
        return Err(ConfigError::Validation(
            "products min-chunk-size must be >= 1".to_string(),
        ));
    }

    if config.min_chunk_size > config.max_chunk_size {
        return Err(ConfigError::Validation(format!(
            "products min-chunk-size ({}) cannot exceed max-chunk-size ({})",
            config.min_chunk_size, config.max_chunk_size
        )));
    }

    Ok(())
}

fn validate_checkpoint_config(config: &CheckpointConfig) -> Result<(), ConfigError> {
    if config.product_states && !config.category_states {
        tracing::warn!(
            "product-states without category-states: finished pages will be re-fetched on resume"
        );
    }
    Ok(())
}

fn validate_network_config(config: &NetworkConfig) -> Result<(), ConfigError> {
    if config.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "request-timeout-secs must be >= 1".to_string(),
        ));
    }

    if config.rate_limit < 1 {
        return Err(ConfigError::Validation(format!(
            "rate-limit must be >= 1, got {}",
            config.rate_limit
        )));
    }

    if config.period_ms < 1 {
        return Err(ConfigError::Validation(
            "period-ms must be >= 1".to_string(),
        ));
    }

    if config.max_retries < 1 {
        return Err(ConfigError::Validation(
            "max-retries must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates column mapping and dedup columns
fn validate_columns(columns: &[ColumnMapping], dedup: &[String]) -> Result<(), ConfigError> {
    if columns.is_empty() {
        return Err(ConfigError::Validation(
            "at least one [[column]] mapping is required".to_string(),
        ));
    }

    let mut headers = HashSet::new();
    for column in columns {
        if column.field.is_empty() || column.header.is_empty() {
            return Err(ConfigError::Validation(
                "column field and header cannot be empty".to_string(),
            ));
        }
        if !headers.insert(column.header.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate column header '{}'",
                column.header
            )));
        }
    }

    for name in dedup {
        if !headers.contains(name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "dedup column '{}' is not a configured header",
                name
            )));
        }
    }

    Ok(())
}

fn validate_extract_config(config: &ExtractConfig) -> Result<(), ConfigError> {
    if config.products.trim().is_empty() {
        return Err(ConfigError::Validation(
            "extract products selector cannot be empty".to_string(),
        ));
    }

    validate_selector("products", &config.products)?;
    validate_selector("link", &config.link)?;
    validate_selector("focus", &config.focus)?;
    if let Some(options) = &config.options {
        validate_selector("options", options)?;
    }
    for field in &config.field {
        validate_selector(&format!("field '{}'", field.name), &field.selector)?;
    }

    if let Some(pattern) = &config.id_pattern {
        let regex = regex::Regex::new(pattern).map_err(|e| {
            ConfigError::Validation(format!("invalid id-pattern '{}': {}", pattern, e))
        })?;
        if regex.captures_len() < 2 {
            return Err(ConfigError::Validation(format!(
                "id-pattern '{}' needs a capture group",
                pattern
            )));
        }
    }

    Ok(())
}

fn validate_selector(name: &str, selector: &str) -> Result<(), ConfigError> {
    scraper::Selector::parse(selector).map_err(|e| {
        ConfigError::Validation(format!("invalid {} selector '{}': {}", name, selector, e))
    })?;
    Ok(())
}
