//! Local copies of volunteer, event and attendance records.
//!
//! Downloads are merged here with last-writer-wins on the `updatedAt` field.
//! A record whose body is identical to the local copy counts as a cache hit.

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use super::Database;
use crate::error::RollcallError;
use crate::features::sync::{DataType, Entity};

/// What happened to one remote record during a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Remote copy written locally
    Applied,
    /// Local copy is strictly newer; kept
    Conflict,
    /// Local copy already identical
    Unchanged,
}

/// Totals for one merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub applied: usize,
    pub conflicts: usize,
    pub unchanged: usize,
}

impl MergeReport {
    fn record(&mut self, outcome: MergeOutcome) {
        match outcome {
            MergeOutcome::Applied => self.applied += 1,
            MergeOutcome::Conflict => self.conflicts += 1,
            MergeOutcome::Unchanged => self.unchanged += 1,
        }
    }

    #[must_use]
    pub const fn total(&self) -> usize {
        self.applied + self.conflicts + self.unchanged
    }
}

/// Storage for local entities, keyed by data type and id.
pub struct EntityStore {
    db: Mutex<Database>,
}

impl EntityStore {
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    fn db(&self) -> Result<MutexGuard<'_, Database>, RollcallError> {
        self.db
            .lock()
            .map_err(|_| RollcallError::Database("Entity store lock poisoned".to_string()))
    }

    /// Write a local record, replacing any stored copy.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be encoded or written.
    pub fn upsert(&self, data_type: DataType, entity: &Entity) -> Result<(), RollcallError> {
        let db = self.db()?;
        write_entity(&db, data_type, entity)
    }

    /// Merge remote records into the local store.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be read or written. Nothing
    /// is written in that case.
    pub fn merge_remote(
        &self,
        data_type: DataType,
        entities: &[Entity],
    ) -> Result<MergeReport, RollcallError> {
        self.merge_remote_with(data_type, entities, |_, _| {})
    }

    /// Like [`merge_remote`](Self::merge_remote), calling `on_record` with the
    /// index and outcome of every record as it is merged.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be read or written.
    pub fn merge_remote_with<F>(
        &self,
        data_type: DataType,
        entities: &[Entity],
        mut on_record: F,
    ) -> Result<MergeReport, RollcallError>
    where
        F: FnMut(usize, MergeOutcome),
    {
        let db = self.db()?;
        let tx = db
            .connection()
            .unchecked_transaction()
            .map_err(|e| RollcallError::Database(format!("Failed to begin merge: {e}")))?;

        let mut report = MergeReport::default();
        for (index, remote) in entities.iter().enumerate() {
            let outcome = match read_entity(&db, data_type, &remote.id)? {
                Some(local) => resolve(&local, remote),
                None => MergeOutcome::Applied,
            };
            if outcome == MergeOutcome::Applied {
                write_entity(&db, data_type, remote)?;
            }
            report.record(outcome);
            on_record(index, outcome);
        }

        tx.commit()
            .map_err(|e| RollcallError::Database(format!("Failed to commit merge: {e}")))?;
        Ok(report)
    }

    /// All records of one data type, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be read.
    pub fn list(&self, data_type: DataType) -> Result<Vec<Entity>, RollcallError> {
        let db = self.db()?;
        let mut stmt = db
            .connection()
            .prepare("SELECT body FROM entities WHERE data_type = ?1 ORDER BY id")
            .map_err(|e| RollcallError::Database(format!("Failed to prepare query: {e}")))?;

        let bodies = stmt
            .query_map([data_type.as_str()], |row| row.get::<_, String>(0))
            .map_err(|e| RollcallError::Database(format!("Failed to list entities: {e}")))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| RollcallError::Database(format!("Failed to read entity row: {e}")))?;

        bodies
            .iter()
            .map(|body| serde_json::from_str(body).map_err(RollcallError::from))
            .collect()
    }

    /// # Errors
    ///
    /// Returns an error if the database cannot be read.
    pub fn get(&self, data_type: DataType, id: &str) -> Result<Option<Entity>, RollcallError> {
        let db = self.db()?;
        read_entity(&db, data_type, id)
    }

    /// Number of records stored for one data type.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be read.
    pub fn count(&self, data_type: DataType) -> Result<usize, RollcallError> {
        let db = self.db()?;
        let count: i64 = db
            .connection()
            .query_row(
                "SELECT COUNT(*) FROM entities WHERE data_type = ?1",
                [data_type.as_str()],
                |row| row.get(0),
            )
            .map_err(|e| RollcallError::Database(format!("Failed to count entities: {e}")))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

/// Last-writer-wins on `updatedAt`; ties and missing timestamps go to the remote.
fn resolve(local: &Entity, remote: &Entity) -> MergeOutcome {
    if local == remote {
        return MergeOutcome::Unchanged;
    }
    match (local.updated_at(), remote.updated_at()) {
        (Some(local_at), Some(remote_at)) if local_at > remote_at => MergeOutcome::Conflict,
        _ => MergeOutcome::Applied,
    }
}

fn read_entity(
    db: &Database,
    data_type: DataType,
    id: &str,
) -> Result<Option<Entity>, RollcallError> {
    let body: Option<String> = db
        .connection()
        .query_row(
            "SELECT body FROM entities WHERE data_type = ?1 AND id = ?2",
            params![data_type.as_str(), id],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| RollcallError::Database(format!("Failed to read entity {id}: {e}")))?;

    body.map(|body| serde_json::from_str(&body).map_err(RollcallError::from))
        .transpose()
}

fn write_entity(db: &Database, data_type: DataType, entity: &Entity) -> Result<(), RollcallError> {
    let body = serde_json::to_string(entity)?;
    let updated_at = entity.updated_at().map(|t: DateTime<Utc>| t.to_rfc3339());

    db.connection()
        .execute(
            r"INSERT INTO entities (data_type, id, body, updated_at) VALUES (?1, ?2, ?3, ?4)
              ON CONFLICT(data_type, id) DO UPDATE SET body = excluded.body,
                                                      updated_at = excluded.updated_at",
            params![data_type.as_str(), entity.id, body, updated_at],
        )
        .map_err(|e| {
            RollcallError::Database(format!("Failed to write entity {}: {e}", entity.id))
        })?;
    Ok(())
}
