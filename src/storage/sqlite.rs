//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the StateStore trait.

use crate::state::{sanitize_name, CategoryState, ProductState};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{StateStore, StorageError, StorageResult};
use crate::storage::{RunRecord, RunStatus, StateStatistics};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite checkpoint backend
///
/// The connection sits behind a mutex that is held for a single statement
/// (or a single transaction), never across an await point.
pub struct SqliteStateStore {
    conn: Mutex<Connection>,
}

impl SqliteStateStore {
    /// Creates a new SqliteStateStore instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStateStore)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = init_database(path)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database (for tests and dry runs)
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

impl StateStore for SqliteStateStore {
    // ===== Category States =====

    fn load_category_state(
        &self,
        site: &str,
        category_name: &str,
        date: &str,
        start_page: u32,
    ) -> StorageResult<Option<CategoryState>> {
        let category = sanitize_name(category_name);
        let conn = self.lock()?;

        let saved = conn
            .query_row(
                "SELECT pageno, done FROM category_states
                 WHERE site = ?1 AND category = ?2 AND date = ?3",
                params![site, category, date],
                |row| Ok((row.get::<_, u32>(0)?, row.get::<_, bool>(1)?)),
            )
            .optional()?;

        match saved {
            Some((_, true)) => {
                tracing::debug!("Category {} already done for {}", category, date);
                Ok(None)
            }
            Some((pageno, false)) => {
                tracing::debug!("Resuming category {} at page {}", category, pageno);
                Ok(Some(CategoryState {
                    site: site.to_string(),
                    category_name: category,
                    date: date.to_string(),
                    pageno,
                    done: false,
                }))
            }
            None => Ok(Some(CategoryState::new(site, &category, date, start_page))),
        }
    }

    fn save_category_state(&self, state: &CategoryState) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO category_states (site, category, date, pageno, done, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(site, category, date) DO UPDATE SET
                pageno = excluded.pageno,
                done = excluded.done,
                updated_at = excluded.updated_at",
            params![
                state.site,
                state.category_name,
                state.date,
                state.pageno,
                state.done,
                now()
            ],
        )?;
        Ok(())
    }

    // ===== Product States =====

    fn load_or_create_product_state(
        &self,
        site: &str,
        product_id: &str,
        category_name: &str,
        date: &str,
    ) -> StorageResult<Option<ProductState>> {
        let category = sanitize_name(category_name);
        let conn = self.lock()?;

        conn.execute(
            "INSERT OR IGNORE INTO product_states (site, category, date, product_id, done, updated_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5)",
            params![site, category, date, product_id, now()],
        )?;

        let done: bool = conn.query_row(
            "SELECT done FROM product_states
             WHERE site = ?1 AND category = ?2 AND date = ?3 AND product_id = ?4",
            params![site, category, date, product_id],
            |row| row.get(0),
        )?;

        if done {
            return Ok(None);
        }

        Ok(Some(ProductState {
            site: site.to_string(),
            category_name: category,
            date: date.to_string(),
            product_id: product_id.to_string(),
            done: false,
        }))
    }

    fn save_product_state(&self, state: &ProductState) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO product_states (site, category, date, product_id, done, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(site, category, date, product_id) DO UPDATE SET
                done = excluded.done,
                updated_at = excluded.updated_at",
            params![
                state.site,
                state.category_name,
                state.date,
                state.product_id,
                state.done,
                now()
            ],
        )?;
        Ok(())
    }

    // ===== Date Management =====

    fn clear_date(&self, site: &str, date: &str) -> StorageResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM category_states WHERE site = ?1 AND date = ?2",
            params![site, date],
        )?;
        tx.execute(
            "DELETE FROM product_states WHERE site = ?1 AND date = ?2",
            params![site, date],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn copy_date(&self, site: &str, from: &str, to: &str) -> StorageResult<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let stamp = now();

        let categories = tx.execute(
            "INSERT INTO category_states (site, category, date, pageno, done, updated_at)
             SELECT site, category, ?3, pageno, done, ?4 FROM category_states
             WHERE site = ?1 AND date = ?2
             ON CONFLICT(site, category, date) DO UPDATE SET
                pageno = excluded.pageno,
                done = excluded.done,
                updated_at = excluded.updated_at",
            params![site, from, to, stamp],
        )?;
        let products = tx.execute(
            "INSERT INTO product_states (site, category, date, product_id, done, updated_at)
             SELECT site, category, ?3, product_id, done, ?4 FROM product_states
             WHERE site = ?1 AND date = ?2
             ON CONFLICT(site, category, date, product_id) DO UPDATE SET
                done = excluded.done,
                updated_at = excluded.updated_at",
            params![site, from, to, stamp],
        )?;

        tx.commit()?;
        Ok(categories + products)
    }

    fn known_dates(&self, site: &str) -> StorageResult<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT date FROM category_states WHERE site = ?1
             UNION
             SELECT date FROM product_states WHERE site = ?1
             ORDER BY date",
        )?;

        let dates = stmt
            .query_map(params![site], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(dates)
    }

    // ===== Runs =====

    fn create_run(&self, site: &str, date: &str, config_hash: &str) -> StorageResult<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO runs (site, date, started_at, config_hash, status)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![site, date, now(), config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn complete_run(&self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), now(), run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, site, date, started_at, finished_at, config_hash, status
             FROM runs WHERE id = ?1",
            params![run_id],
            |row| {
                Ok(RunRecord {
                    id: row.get(0)?,
                    site: row.get(1)?,
                    date: row.get(2)?,
                    started_at: row.get(3)?,
                    finished_at: row.get(4)?,
                    config_hash: row.get(5)?,
                    status: RunStatus::from_db_string(&row.get::<_, String>(6)?)
                        .unwrap_or(RunStatus::Running),
                })
            },
        )
        .optional()?
        .ok_or(StorageError::RunNotFound(run_id))
    }

    fn count_runs(&self, site: &str, date: &str) -> StorageResult<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM runs WHERE site = ?1 AND date = ?2",
            params![site, date],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // ===== Statistics =====

    fn statistics(&self, site: &str, date: &str) -> StorageResult<StateStatistics> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT category, pageno, done FROM category_states
             WHERE site = ?1 AND date = ?2 ORDER BY category",
        )?;
        let categories = stmt
            .query_map(params![site, date], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?, row.get::<_, bool>(2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let (products_total, products_done): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(done), 0) FROM product_states
             WHERE site = ?1 AND date = ?2",
            params![site, date],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(StateStatistics {
            categories_total: categories.len() as u64,
            categories_done: categories.iter().filter(|(_, _, done)| *done).count() as u64,
            pages_done: categories
                .iter()
                .map(|(_, pageno, _)| u64::from(pageno.saturating_sub(1)))
                .sum(),
            products_total: products_total as u64,
            products_done: products_done as u64,
            categories,
        })
    }
}

/// Opens or creates a database file with the crawler's pragmas and schema
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(Connection)` - Successfully opened/created database
/// * `Err(rusqlite::Error)` - Failed to open database
pub fn init_database(path: &Path) -> Result<Connection, rusqlite::Error> {
    let conn = Connection::open(path)?;

    // Checkpoints must survive a crash, so keep synchronous at FULL
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = FULL;
        PRAGMA busy_timeout = 5000;
    ",
    )?;

    initialize_schema(&conn)?;

    Ok(conn)
}
