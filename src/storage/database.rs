//! `SQLite` database connection.
//!
//! The database is stored at `~/.rollcall/rollcall.db` and contains tables for:
//! - Key-value entries (the sync queue snapshot)
//! - Local volunteer, event and attendance records

use rusqlite::Connection;

use crate::config::Paths;
use crate::error::RollcallError;

use super::migrations;

/// Database connection wrapper.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the database at the default location.
    ///
    /// Creates the database file and runs migrations if necessary.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub fn open(paths: &Paths) -> Result<Self, RollcallError> {
        paths.ensure_dirs()?;
        Self::open_at(&paths.database)
    }

    /// Open the database at a specific path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub fn open_at(path: &std::path::Path) -> Result<Self, RollcallError> {
        let conn = Connection::open(path).map_err(|e| {
            RollcallError::Database(format!("Failed to open database {}: {e}", path.display()))
        })?;

        Self::prepare(conn)
    }

    /// Open an in-memory database (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrations fail.
    pub fn open_in_memory() -> Result<Self, RollcallError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            RollcallError::Database(format!("Failed to open in-memory database: {e}"))
        })?;

        Self::prepare(conn)
    }

    fn prepare(conn: Connection) -> Result<Self, RollcallError> {
        // WAL lets the queue and the entity store hold separate connections
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get::<_, String>(0))
            .map_err(|e| RollcallError::Database(format!("Failed to set journal mode: {e}")))?;
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(|e| RollcallError::Database(format!("Failed to set busy timeout: {e}")))?;

        let db = Self { conn };
        migrations::run(&db.conn)?;

        Ok(db)
    }

    /// Get the current schema version.
    ///
    /// # Errors
    ///
    /// Returns an error if the version cannot be read.
    pub fn schema_version(&self) -> Result<i32, RollcallError> {
        migrations::get_version(&self.conn)
    }

    /// Get a reference to the underlying connection.
    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }
}
