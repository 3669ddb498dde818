//! Persistent tally of confirmed quantities per barcode
//!
//! Every mutation is a single autocommitted statement, so the file on disk
//! is current as soon as a call returns.

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to create {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("stored quantity for {0} is corrupt")]
    Corrupt(String),
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS tally (
        code     TEXT PRIMARY KEY NOT NULL,
        quantity INTEGER NOT NULL CHECK (quantity >= 0)
    );
";

/// Mapping from barcode to accumulated quantity
pub struct TallyStore {
    conn: Mutex<Connection>,
}

impl TallyStore {
    /// Open or create the store at `path`
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StorageError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let conn = Connection::open(path)?;
        info!("Opened tally store at {:?}", path);
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Add `delta` to `code`, creating the entry if absent. Returns the new total.
    pub fn add(&self, code: &str, delta: NonZeroU32) -> Result<u64, StorageError> {
        let conn = self.conn.lock();
        let total: i64 = conn.query_row(
            "INSERT INTO tally (code, quantity) VALUES (?1, ?2)
             ON CONFLICT(code) DO UPDATE SET quantity = quantity + excluded.quantity
             RETURNING quantity",
            params![code, delta.get()],
            |row| row.get(0),
        )?;
        debug!(code, delta = delta.get(), total, "Tally updated");
        u64::try_from(total).map_err(|_| StorageError::Corrupt(code.to_string()))
    }

    /// Snapshot of every entry, ordered by code
    pub fn get(&self) -> Result<BTreeMap<String, u64>, StorageError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT code, quantity FROM tally ORDER BY code")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;

        let mut entries = BTreeMap::new();
        for row in rows {
            let (code, quantity) = row?;
            let quantity = u64::try_from(quantity).map_err(|_| StorageError::Corrupt(code.clone()))?;
            entries.insert(code, quantity);
        }
        Ok(entries)
    }

    /// Quantity recorded for `code`, if any
    pub fn quantity(&self, code: &str) -> Result<Option<u64>, StorageError> {
        let conn = self.conn.lock();
        let quantity: Option<i64> = conn
            .query_row("SELECT quantity FROM tally WHERE code = ?1", params![code], |row| {
                row.get(0)
            })
            .optional()?;
        quantity
            .map(|q| u64::try_from(q).map_err(|_| StorageError::Corrupt(code.to_string())))
            .transpose()
    }

    pub fn is_empty(&self) -> Result<bool, StorageError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM tally", [], |row| row.get(0))?;
        Ok(count == 0)
    }

    /// Remove every entry. Returns how many were removed.
    pub fn clear(&self) -> Result<usize, StorageError> {
        let removed = self.conn.lock().execute("DELETE FROM tally", [])?;
        info!(removed, "Tally cleared");
        Ok(removed)
    }

    /// Add every entry of `entries` in one transaction
    pub fn merge<'a, I>(&self, entries: I) -> Result<usize, StorageError>
    where
        I: IntoIterator<Item = (&'a str, NonZeroU32)>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut merged = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO tally (code, quantity) VALUES (?1, ?2)
                 ON CONFLICT(code) DO UPDATE SET quantity = quantity + excluded.quantity",
            )?;
            for (code, delta) in entries {
                stmt.execute(params![code, delta.get()])?;
                merged += 1;
            }
        }
        tx.commit()?;
        Ok(merged)
    }
}
