//! Command implementations for rollcall.
//!
//! Every command returns the text to print; `main` does the printing.

mod config;
mod queue;
mod record;

pub use config::config;
pub use queue::queue;
pub use record::record;

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use crate::cli::args::{Commands, OutputFormat};
use crate::config::{Config, Paths};
use crate::error::RollcallError;
use crate::features::sync::{EventBus, HttpSynchronizer, SyncQueue};
use crate::storage::{Database, EntityStore, SqliteKvStore, WriterLock};

/// Resolved settings shared by all commands.
pub struct Context {
    pub paths: Paths,
    pub config: Config,
    pub format: OutputFormat,
}

impl Context {
    #[must_use]
    pub const fn new(paths: Paths, config: Config, format: OutputFormat) -> Self {
        Self {
            paths,
            config,
            format,
        }
    }

    /// Open the persistent queue for changes, holding the writer lock.
    ///
    /// # Errors
    ///
    /// Returns `RollcallError::Busy` if another process has the queue open
    /// for changes, or an error if the database cannot be opened.
    pub fn open_queue(&self) -> Result<SyncQueue<SqliteKvStore>, RollcallError> {
        self.paths.ensure_dirs()?;
        let lock = WriterLock::acquire(&self.paths.queue_lock)?;
        Ok(self.inspect_queue()?.holding(lock))
    }

    /// Open the persistent queue for reading only.
    ///
    /// Does not take the writer lock, so it works while a sync is running.
    /// Nothing opened this way may change the queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn inspect_queue(&self) -> Result<SyncQueue<SqliteKvStore>, RollcallError> {
        let db = Database::open(&self.paths)?;
        Ok(SyncQueue::open(
            SqliteKvStore::new(db),
            self.config.queue.clone(),
        ))
    }

    /// Open the local entity store on its own connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn open_entities(&self) -> Result<EntityStore, RollcallError> {
        Ok(EntityStore::new(Database::open(&self.paths)?))
    }

    /// Build the HTTP synchronizer, emitting on `events`.
    ///
    /// # Errors
    ///
    /// Returns `RollcallError::Config` if no remote endpoint is configured.
    pub fn synchronizer(&self, events: EventBus) -> Result<HttpSynchronizer, RollcallError> {
        self.config.remote.require_endpoint()?;
        let entities = Arc::new(self.open_entities()?);
        HttpSynchronizer::new(&self.config.remote, entities, events)
    }
}

/// Run one parsed command.
///
/// # Errors
///
/// Returns whatever error the command produced.
pub async fn dispatch(ctx: &Context, command: Commands) -> Result<String, RollcallError> {
    match command {
        Commands::Queue(args) => queue(ctx, args.command).await,
        Commands::Record { data_type, file } => record(ctx, &data_type, &file),
        Commands::Config(args) => config(ctx, args.command),
    }
}

/// Read a JSON file holding an array of records.
fn read_records(path: &Path) -> Result<Value, RollcallError> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        RollcallError::InvalidOperation(format!("Failed to read {}: {e}", path.display()))
    })?;
    let value: Value = serde_json::from_str(&contents).map_err(|e| {
        RollcallError::InvalidOperation(format!("{} is not valid JSON: {e}", path.display()))
    })?;

    if value.is_array() {
        Ok(value)
    } else {
        Err(RollcallError::InvalidOperation(format!(
            "{} must contain a JSON array of records",
            path.display()
        )))
    }
}
