//! Durable queue snapshot.
//!
//! The whole queue is stored as one JSON value, `{"queue": [...], "savedAt": ...}`,
//! under a fixed key. Loading never fails: an unreadable snapshot is logged
//! and replaced by an empty queue, since pending work can be re-derived by a
//! full re-sync. Saving always propagates errors, since the queue's
//! durability depends on it.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::operation::Operation;
use crate::error::RollcallError;
use crate::storage::KeyValueStore;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotOut<'a> {
    queue: &'a [Operation],
    saved_at: DateTime<Utc>,
}

// Records are kept as raw values so one bad record does not discard the rest.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotIn {
    queue: Vec<Value>,
    #[serde(default)]
    saved_at: Option<DateTime<Utc>>,
}

/// Loads and saves the queue under one storage key.
pub struct QueueStore<S> {
    store: S,
    key: String,
    retention: Duration,
}

impl<S: KeyValueStore> QueueStore<S> {
    #[must_use]
    pub fn new(store: S, key: impl Into<String>, retention: Duration) -> Self {
        Self {
            store,
            key: key.into(),
            retention,
        }
    }

    /// The underlying key-value store.
    #[must_use]
    pub const fn inner(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Load the persisted queue, dropping records older than the retention window.
    #[must_use]
    pub fn load(&self, now: DateTime<Utc>) -> Vec<Operation> {
        let raw = match self.store.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(key = %self.key, error = %e, "Failed to read queue snapshot, starting empty");
                return Vec::new();
            }
        };

        let snapshot: SnapshotIn = match serde_json::from_str(&raw) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(key = %self.key, error = %e, "Corrupt queue snapshot, starting empty");
                return Vec::new();
            }
        };

        let cutoff = now - self.retention;
        let mut seen = HashSet::new();
        let mut expired = 0usize;
        let mut operations = Vec::with_capacity(snapshot.queue.len());

        for value in snapshot.queue {
            let operation: Operation = match serde_json::from_value(value) {
                Ok(op) => op,
                Err(e) => {
                    warn!(error = %e, "Dropping unreadable queue record");
                    continue;
                }
            };
            if let Err(e) = operation.validate() {
                warn!(id = %operation.id, error = %e, "Dropping invalid queue record");
                continue;
            }
            if operation.queued_at < cutoff {
                expired += 1;
                continue;
            }
            if !seen.insert(operation.id.clone()) {
                warn!(id = %operation.id, "Dropping duplicate queue record");
                continue;
            }
            operations.push(operation);
        }

        debug!(
            loaded = operations.len(),
            expired,
            saved_at = ?snapshot.saved_at,
            "Loaded queue snapshot"
        );

        operations
    }

    /// Persist the queue.
    ///
    /// # Errors
    ///
    /// Returns `RollcallError::Persistence` if the snapshot was not written.
    pub fn save(&self, operations: &[Operation], now: DateTime<Utc>) -> Result<(), RollcallError> {
        let snapshot = SnapshotOut {
            queue: operations,
            saved_at: now,
        };
        let raw = serde_json::to_string(&snapshot)
            .map_err(|e| RollcallError::Persistence(format!("Failed to encode snapshot: {e}")))?;

        self.store.set(&self.key, &raw).map_err(|e| match e {
            RollcallError::Persistence(_) => e,
            other => RollcallError::Persistence(other.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::sync::operation::{DataType, Entity, OperationRequest};
    use crate::storage::MemoryKvStore;

    fn store() -> QueueStore<MemoryKvStore> {
        QueueStore::new(MemoryKvStore::new(), "sync_queue", Duration::days(7))
    }

    fn upload(id: &str, queued_at: DateTime<Utc>) -> Operation {
        Operation::new(
            id.to_string(),
            OperationRequest::upload(DataType::Attendance, vec![Entity::new(format!("{id}-a"))]),
            queued_at,
        )
    }

    #[test]
    fn test_missing_snapshot_is_empty() {
        assert!(store().load(Utc::now()).is_empty());
    }

    #[test]
    fn test_round_trip_drops_expired() {
        let store = store();
        let now = Utc::now();
        let fresh = upload("op_fresh", now - Duration::days(6));
        let stale = upload("op_stale", now - Duration::days(8));

        store.save(&[stale, fresh.clone()], now).unwrap();

        let loaded = store.load(now);
        assert_eq!(loaded, vec![fresh]);
    }

    #[test]
    fn test_snapshot_layout() {
        let store = store();
        let now = Utc::now();
        store.save(&[upload("op_1", now)], now).unwrap();

        let raw = store.inner().get("sync_queue").unwrap().unwrap();
        let value: Value = serde_json::from_str(&raw).unwrap();
        assert!(value["queue"].is_array());
        assert!(value["savedAt"].is_string());
        assert_eq!(value["queue"][0]["id"], "op_1");
    }

    #[test]
    fn test_corrupt_snapshot_is_empty() {
        let store = store();
        store.inner().set("sync_queue", "{not json").unwrap();

        assert!(store.load(Utc::now()).is_empty());
    }

    #[test]
    fn test_bad_records_dropped_individually() {
        let store = store();
        let now = Utc::now();
        let good = upload("op_good", now);
        let raw = serde_json::json!({
            "queue": [
                serde_json::to_value(&good).unwrap(),
                {"id": "op_bad", "type": "teleport", "dataType": "events"},
                {"id": "op_empty", "type": "upload", "dataType": "events", "data": [],
                 "status": "queued", "queuedAt": now.to_rfc3339()},
                serde_json::to_value(&good).unwrap(),
            ],
            "savedAt": now.to_rfc3339(),
        });
        store.inner().set("sync_queue", &raw.to_string()).unwrap();

        assert_eq!(store.load(now), vec![good]);
    }
}
