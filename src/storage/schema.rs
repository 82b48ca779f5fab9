//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the state database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    site TEXT NOT NULL,
    date TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_runs_site_date ON runs(site, date);

-- One checkpoint per category and crawl date
CREATE TABLE IF NOT EXISTS category_states (
    site TEXT NOT NULL,
    category TEXT NOT NULL,
    date TEXT NOT NULL,
    pageno INTEGER NOT NULL,
    done INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (site, category, date)
);

-- One checkpoint per product, category and crawl date
CREATE TABLE IF NOT EXISTS product_states (
    site TEXT NOT NULL,
    category TEXT NOT NULL,
    date TEXT NOT NULL,
    product_id TEXT NOT NULL,
    done INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (site, category, date, product_id)
);

CREATE INDEX IF NOT EXISTS idx_product_states_date ON product_states(site, date);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)
}
