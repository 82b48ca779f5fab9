use crate::config::types::{Category, Config};
use crate::config::validation::{validate, validate_category};
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// A relative `[categories].file` is resolved against the directory of the
/// configuration file, and its categories are appended to the inline ones.
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use catalog_harvest::config::load_config;
///
/// let config = load_config(Path::new("harvest.toml")).unwrap();
/// println!("Site: {}", config.site.name);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;

    let mut config: Config = toml::from_str(&content)?;

    if let Some(file) = &config.categories.file {
        let categories_path = match path.parent() {
            Some(dir) if Path::new(file).is_relative() => dir.join(file),
            _ => Path::new(file).to_path_buf(),
        };
        let from_file = load_categories_file(&categories_path)?;
        config.category.extend(from_file);
    }

    validate(&config)?;

    Ok(config)
}

/// Reads categories from a text file with one `name, url` pair per line
///
/// Blank lines and lines starting with `#` are ignored. The url is the text
/// after the last `", "` separator, so category names may contain commas.
pub fn load_categories_file(path: &Path) -> Result<Vec<Category>, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_categories(&content)
}

pub(crate) fn parse_categories(content: &str) -> Result<Vec<Category>, ConfigError> {
    let mut categories = Vec::new();

    for (idx, raw) in content.lines().enumerate() {
        let line = raw.trim().trim_start_matches('\u{feff}');
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (name, url) = line.rsplit_once(", ").ok_or_else(|| ConfigError::CategoryLine {
            line: idx + 1,
            content: line.to_string(),
        })?;

        let category = Category {
            name: name.trim().to_string(),
            url: url.trim().to_string(),
        };
        validate_category(&category)?;
        categories.push(category);
    }

    Ok(categories)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Logged at startup so runs over the same date can be told apart when the
/// configuration changed in between.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}
