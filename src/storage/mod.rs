//! Storage layer for rollcall.
//!
//! This module provides SQLite-based persistence for:
//! - Key-value entries (the sync queue snapshot)
//! - Local volunteer, event and attendance records
//!
//! plus the single-writer lock file guarding the queue.

mod database;
mod entities;
mod kv;
mod lock;
mod migrations;

pub use database::Database;
pub use entities::{EntityStore, MergeOutcome, MergeReport};
pub use kv::{KeyValueStore, MemoryKvStore, SqliteKvStore};
pub use lock::WriterLock;
