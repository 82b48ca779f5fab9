//! Configuration module for Catalog-Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files, plus the plain-text categories file a site may keep next to it.
//!
//! # Example
//!
//! ```no_run
//! use catalog_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Crawling {} categories", config.category.len());
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    CategoriesConfig, Category, CheckpointConfig, ColumnMapping, Config, ExtractConfig,
    FieldSelector, NetworkConfig, OutputConfig, ProductsConfig, SiteConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_categories_file, load_config, load_config_with_hash};
pub use validation::{validate, validate_date};
