//! Operation records for the sync queue.
//!
//! An operation is one deferred upload, download or delete against a single
//! data type. In-crate callers build operations through [`OperationRequest`],
//! whose variants make an upload without entities unrepresentable apart from
//! the empty case. JSON coming from outside the crate goes through
//! [`validate_operation`] first.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::RollcallError;

/// Logical collection an operation acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Volunteers,
    Events,
    Attendance,
}

impl DataType {
    /// Every data type, in display order.
    pub const ALL: [Self; 3] = [Self::Volunteers, Self::Events, Self::Attendance];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Volunteers => "volunteers",
            Self::Events => "events",
            Self::Attendance => "attendance",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = RollcallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "volunteers" => Ok(Self::Volunteers),
            "events" => Ok(Self::Events),
            "attendance" => Ok(Self::Attendance),
            other => Err(RollcallError::InvalidOperation(format!(
                "unknown data type '{other}' (expected volunteers, events or attendance)"
            ))),
        }
    }
}

/// Operation type without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Upload,
    Download,
    Delete,
}

impl OperationType {
    pub const ALL: [Self; 3] = [Self::Upload, Self::Download, Self::Delete];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Download => "download",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = RollcallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "upload" => Ok(Self::Upload),
            "download" => Ok(Self::Download),
            "delete" => Ok(Self::Delete),
            other => Err(RollcallError::InvalidOperation(format!(
                "unknown operation type '{other}' (expected upload, download or delete)"
            ))),
        }
    }
}

/// Status of a queued operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    /// Waiting for the next drain
    Queued,
    /// Failed at least once, will be attempted again
    Retry,
    /// Executed successfully; purged at the end of the drain
    Completed,
    /// Retries exhausted; only an explicit reset brings it back
    Failed,
}

impl OperationStatus {
    pub const ALL: [Self; 4] = [Self::Queued, Self::Retry, Self::Completed, Self::Failed];

    /// Check if a drain should execute an operation in this status.
    #[must_use]
    pub const fn is_eligible(&self) -> bool {
        matches!(self, Self::Queued | Self::Retry)
    }

    /// Check if this status is terminal (no automatic action follows).
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Retry => "retry",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationStatus {
    type Err = RollcallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "queued" | "pending" => Ok(Self::Queued),
            "retry" => Ok(Self::Retry),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(RollcallError::InvalidOperation(format!(
                "unknown status '{other}'"
            ))),
        }
    }
}

/// A volunteer, event or attendance record.
///
/// Only `id` is interpreted by the queue; every other field is carried as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(deserialize_with = "id_from_string_or_number")]
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Entity {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: Map::new(),
        }
    }

    /// Builder-style field setter.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Last modification time carried in the `updatedAt` field, if any.
    #[must_use]
    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.fields
            .get("updatedAt")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))
    }
}

// Spreadsheet rows frequently come back with numeric ids.
fn id_from_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "entity id must be a string or number, got {other}"
        ))),
    }
}

/// The action an operation performs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OperationKind {
    /// Push local entities to the remote store.
    Upload { data: Vec<Entity> },
    /// Pull the remote collection into the local store.
    Download,
    /// Reserved; execution always fails.
    Delete,
}

impl OperationKind {
    #[must_use]
    pub const fn operation_type(&self) -> OperationType {
        match self {
            Self::Upload { .. } => OperationType::Upload,
            Self::Download => OperationType::Download,
            Self::Delete => OperationType::Delete,
        }
    }

    /// Entities carried by an upload; empty for other kinds.
    #[must_use]
    pub fn entities(&self) -> &[Entity] {
        match self {
            Self::Upload { data } => data,
            Self::Download | Self::Delete => &[],
        }
    }

    /// Fold a newer operation of the same type into this one.
    ///
    /// Uploads keep one entity per id: an incoming entity replaces the stored
    /// one in place, unseen ids are appended in incoming order.
    pub fn absorb(&mut self, incoming: Self) {
        if let (Self::Upload { data }, Self::Upload { data: newer }) = (self, incoming) {
            for entity in newer {
                upsert_entity(data, entity);
            }
        }
    }

    fn validate(&self) -> Result<(), RollcallError> {
        if let Self::Upload { data } = self {
            if data.is_empty() {
                return Err(RollcallError::InvalidOperation(
                    "upload requires a non-empty data sequence".to_string(),
                ));
            }
            if let Some(pos) = data.iter().position(|e| e.id.trim().is_empty()) {
                return Err(RollcallError::InvalidOperation(format!(
                    "upload entity at index {pos} has an empty id"
                )));
            }
        }
        Ok(())
    }
}

fn upsert_entity(data: &mut Vec<Entity>, entity: Entity) {
    match data.iter_mut().find(|e| e.id == entity.id) {
        Some(existing) => *existing = entity,
        None => data.push(entity),
    }
}

fn dedupe_entities(data: Vec<Entity>) -> Vec<Entity> {
    let mut unique = Vec::with_capacity(data.len());
    for entity in data {
        upsert_entity(&mut unique, entity);
    }
    unique
}

/// A request to enqueue work, before it receives an id and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationRequest {
    pub kind: OperationKind,
    pub data_type: DataType,
}

impl OperationRequest {
    #[must_use]
    pub fn upload(data_type: DataType, data: Vec<Entity>) -> Self {
        Self {
            kind: OperationKind::Upload { data },
            data_type,
        }
    }

    #[must_use]
    pub const fn download(data_type: DataType) -> Self {
        Self {
            kind: OperationKind::Download,
            data_type,
        }
    }

    #[must_use]
    pub const fn delete(data_type: DataType) -> Self {
        Self {
            kind: OperationKind::Delete,
            data_type,
        }
    }

    /// Check the request can enter the queue.
    ///
    /// # Errors
    ///
    /// Returns `RollcallError::InvalidOperation` for an upload with no
    /// entities or an entity without an id.
    pub fn validate(&self) -> Result<(), RollcallError> {
        self.kind.validate()
    }

    #[must_use]
    pub const fn operation_type(&self) -> OperationType {
        self.kind.operation_type()
    }
}

/// Validate an externally constructed operation (e.g. a JSON file handed to
/// the CLI) and convert it into a request.
///
/// # Errors
///
/// Returns `RollcallError::InvalidOperation` describing the first problem found.
pub fn validate_operation(value: &Value) -> Result<OperationRequest, RollcallError> {
    let object = value.as_object().ok_or_else(|| {
        RollcallError::InvalidOperation("operation must be a JSON object".to_string())
    })?;

    let op_type: OperationType = object
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| RollcallError::InvalidOperation("missing string field 'type'".to_string()))?
        .parse()?;

    let data_type: DataType = object
        .get("dataType")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            RollcallError::InvalidOperation("missing string field 'dataType'".to_string())
        })?
        .parse()?;

    let request = match op_type {
        OperationType::Upload => {
            let raw = object.get("data").and_then(Value::as_array).ok_or_else(|| {
                RollcallError::InvalidOperation("upload requires a 'data' array".to_string())
            })?;
            let data = raw
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    Entity::deserialize(item).map_err(|e| {
                        RollcallError::InvalidOperation(format!("upload entity at index {i}: {e}"))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            OperationRequest::upload(data_type, data)
        }
        OperationType::Download => OperationRequest::download(data_type),
        OperationType::Delete => OperationRequest::delete(data_type),
    };

    request.validate()?;
    Ok(request)
}

/// A queued operation with its lifecycle metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub id: String,
    #[serde(flatten)]
    pub kind: OperationKind,
    pub data_type: DataType,
    pub status: OperationStatus,
    #[serde(default)]
    pub attempts: u32,
    pub queued_at: DateTime<Utc>,
    #[serde(default)]
    pub last_attempt: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl Operation {
    /// Create a queued operation from a validated request.
    #[must_use]
    pub fn new(id: String, request: OperationRequest, now: DateTime<Utc>) -> Self {
        let kind = match request.kind {
            OperationKind::Upload { data } => OperationKind::Upload {
                data: dedupe_entities(data),
            },
            other => other,
        };

        Self {
            id,
            kind,
            data_type: request.data_type,
            status: OperationStatus::Queued,
            attempts: 0,
            queued_at: now,
            last_attempt: None,
            completed_at: None,
            last_error: None,
        }
    }

    /// Generate an operation id: millisecond timestamp plus a random suffix.
    #[must_use]
    pub fn generate_id(now: DateTime<Utc>) -> String {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!("op_{}_{}", now.timestamp_millis(), &suffix[..8])
    }

    #[must_use]
    pub const fn operation_type(&self) -> OperationType {
        self.kind.operation_type()
    }

    /// Number of entities carried (uploads only).
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.kind.entities().len()
    }

    /// Whether `request` would be merged into this operation.
    #[must_use]
    pub fn can_absorb(&self, request: &OperationRequest) -> bool {
        self.status == OperationStatus::Queued
            && self.data_type == request.data_type
            && self.operation_type() == request.operation_type()
    }

    /// Merge a newer request into this queued operation.
    pub fn absorb(&mut self, request: OperationRequest, now: DateTime<Utc>) {
        self.kind.absorb(request.kind);
        self.queued_at = self.queued_at.max(now);
    }

    /// Re-check invariants on a record that came from outside (e.g. a snapshot).
    ///
    /// # Errors
    ///
    /// Returns `RollcallError::InvalidOperation` if the record is malformed.
    pub fn validate(&self) -> Result<(), RollcallError> {
        if self.id.trim().is_empty() {
            return Err(RollcallError::InvalidOperation(
                "operation id is empty".to_string(),
            ));
        }
        self.kind.validate()
    }

    pub fn mark_completed(&mut self, now: DateTime<Utc>) {
        self.status = OperationStatus::Completed;
        self.last_attempt = Some(now);
        self.completed_at = Some(now);
        self.last_error = None;
    }

    /// Record a failed attempt and return the resulting status.
    pub fn record_failure(
        &mut self,
        error: String,
        max_retries: u32,
        now: DateTime<Utc>,
    ) -> OperationStatus {
        self.attempts = self.attempts.saturating_add(1);
        self.last_attempt = Some(now);
        self.last_error = Some(error);
        self.status = if self.attempts >= max_retries {
            OperationStatus::Failed
        } else {
            OperationStatus::Retry
        };
        self.status
    }

    /// Put the operation back in line without touching its attempt count.
    pub fn requeue(&mut self) {
        self.status = OperationStatus::Queued;
        self.last_error = None;
    }

    /// Operator reset: back in line with a fresh attempt budget.
    pub fn reset(&mut self) {
        self.requeue();
        self.attempts = 0;
        self.completed_at = None;
    }

    /// Fail a pending record whose attempts already reached `max_retries`.
    ///
    /// Returns whether the status changed.
    pub fn enforce_ceiling(&mut self, max_retries: u32) -> bool {
        if self.status.is_eligible() && self.attempts > 0 && self.attempts >= max_retries {
            self.status = OperationStatus::Failed;
            true
        } else {
            false
        }
    }

    /// Time spent in the queue so far.
    #[must_use]
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.queued_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ids(op: &Operation) -> Vec<&str> {
        op.kind.entities().iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn test_parse_enums() {
        assert_eq!("Volunteers".parse::<DataType>().unwrap(), DataType::Volunteers);
        assert_eq!("upload".parse::<OperationType>().unwrap(), OperationType::Upload);
        assert_eq!("retry".parse::<OperationStatus>().unwrap(), OperationStatus::Retry);
        assert!("donations".parse::<DataType>().is_err());
        assert!("sync".parse::<OperationType>().is_err());
    }

    #[test]
    fn test_status_predicates() {
        assert!(OperationStatus::Queued.is_eligible());
        assert!(OperationStatus::Retry.is_eligible());
        assert!(!OperationStatus::Failed.is_eligible());
        assert!(OperationStatus::Completed.is_terminal());
        assert!(OperationStatus::Failed.is_terminal());
        assert!(!OperationStatus::Retry.is_terminal());
    }

    #[test]
    fn test_empty_upload_rejected() {
        let request = OperationRequest::upload(DataType::Attendance, vec![]);
        assert!(matches!(
            request.validate(),
            Err(RollcallError::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_blank_entity_id_rejected() {
        let request = OperationRequest::upload(DataType::Events, vec![Entity::new(" ")]);
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_download_and_delete_need_no_data() {
        assert!(OperationRequest::download(DataType::Events).validate().is_ok());
        assert!(OperationRequest::delete(DataType::Events).validate().is_ok());
    }

    #[test]
    fn test_validate_operation_from_json() {
        let value = json!({
            "type": "upload",
            "dataType": "attendance",
            "data": [{"id": "a1", "present": true}, {"id": 42}]
        });

        let request = validate_operation(&value).unwrap();
        assert_eq!(request.data_type, DataType::Attendance);
        let data = request.kind.entities();
        assert_eq!(data.len(), 2);
        assert_eq!(data[0].fields.get("present"), Some(&json!(true)));
        assert_eq!(data[1].id, "42");
    }

    #[test]
    fn test_validate_operation_rejects_bad_shapes() {
        let cases = [
            json!("upload"),
            json!({"dataType": "events"}),
            json!({"type": "merge", "dataType": "events"}),
            json!({"type": "download", "dataType": "donors"}),
            json!({"type": "upload", "dataType": "events"}),
            json!({"type": "upload", "dataType": "events", "data": []}),
            json!({"type": "upload", "dataType": "events", "data": [{"name": "no id"}]}),
        ];

        for case in cases {
            let err = validate_operation(&case).unwrap_err();
            assert!(
                matches!(err, RollcallError::InvalidOperation(_)),
                "expected invalid operation for {case}"
            );
        }
    }

    #[test]
    fn test_new_operation_dedupes_data() {
        let request = OperationRequest::upload(
            DataType::Volunteers,
            vec![
                Entity::new("v1").with_field("name", "Ann"),
                Entity::new("v2"),
                Entity::new("v1").with_field("name", "Anne"),
            ],
        );
        let op = Operation::new("op_1".to_string(), request, Utc::now());

        assert_eq!(ids(&op), vec!["v1", "v2"]);
        assert_eq!(op.kind.entities()[0].fields.get("name"), Some(&json!("Anne")));
        assert_eq!(op.status, OperationStatus::Queued);
        assert_eq!(op.attempts, 0);
    }

    #[test]
    fn test_absorb_unions_by_id() {
        let now = Utc::now();
        let mut op = Operation::new(
            "op_1".to_string(),
            OperationRequest::upload(DataType::Attendance, vec![Entity::new("a1")]),
            now,
        );

        let later = now + chrono::Duration::seconds(5);
        let request = OperationRequest::upload(
            DataType::Attendance,
            vec![Entity::new("a1"), Entity::new("a2")],
        );
        assert!(op.can_absorb(&request));
        op.absorb(request, later);

        assert_eq!(ids(&op), vec!["a1", "a2"]);
        assert_eq!(op.queued_at, later);
    }

    #[test]
    fn test_can_absorb_requires_queued_and_same_key() {
        let mut op = Operation::new(
            "op_1".to_string(),
            OperationRequest::download(DataType::Events),
            Utc::now(),
        );

        assert!(op.can_absorb(&OperationRequest::download(DataType::Events)));
        assert!(!op.can_absorb(&OperationRequest::download(DataType::Volunteers)));
        assert!(!op.can_absorb(&OperationRequest::delete(DataType::Events)));

        op.status = OperationStatus::Retry;
        assert!(!op.can_absorb(&OperationRequest::download(DataType::Events)));
    }

    #[test]
    fn test_record_failure_reaches_ceiling() {
        let now = Utc::now();
        let mut op = Operation::new(
            "op_1".to_string(),
            OperationRequest::download(DataType::Events),
            now,
        );

        assert_eq!(op.record_failure("offline".into(), 3, now), OperationStatus::Retry);
        assert_eq!(op.record_failure("offline".into(), 3, now), OperationStatus::Retry);
        assert_eq!(op.record_failure("offline".into(), 3, now), OperationStatus::Failed);
        assert_eq!(op.attempts, 3);
        assert_eq!(op.last_error.as_deref(), Some("offline"));

        op.reset();
        assert_eq!(op.status, OperationStatus::Queued);
        assert_eq!(op.attempts, 0);
        assert!(op.last_error.is_none());
    }

    #[test]
    fn test_enforce_ceiling() {
        let now = Utc::now();
        let mut op = Operation::new(
            "op_1".to_string(),
            OperationRequest::download(DataType::Events),
            now,
        );
        assert!(!op.enforce_ceiling(3));

        op.status = OperationStatus::Retry;
        op.attempts = 5;
        assert!(op.enforce_ceiling(3));
        assert_eq!(op.status, OperationStatus::Failed);

        // Terminal records are left as they are
        op.status = OperationStatus::Completed;
        assert!(!op.enforce_ceiling(3));
        assert_eq!(op.status, OperationStatus::Completed);
    }

    #[test]
    fn test_serialized_layout() {
        let now = Utc::now();
        let op = Operation::new(
            "op_1".to_string(),
            OperationRequest::upload(DataType::Attendance, vec![Entity::new("a1")]),
            now,
        );

        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(value["type"], "upload");
        assert_eq!(value["dataType"], "attendance");
        assert_eq!(value["status"], "queued");
        assert_eq!(value["data"][0]["id"], "a1");
        assert!(value.get("queuedAt").is_some());

        let back: Operation = serde_json::from_value(value).unwrap();
        assert_eq!(back, op);
    }

    #[test]
    fn test_generate_id_shape() {
        let now = Utc::now();
        let a = Operation::generate_id(now);
        let b = Operation::generate_id(now);

        assert!(a.starts_with(&format!("op_{}_", now.timestamp_millis())));
        assert_ne!(a, b);
    }

    #[test]
    fn test_entity_updated_at() {
        let entity = Entity::new("e1").with_field("updatedAt", "2026-03-01T10:00:00Z");
        assert_eq!(
            entity.updated_at().unwrap().to_rfc3339(),
            "2026-03-01T10:00:00+00:00"
        );
        assert!(Entity::new("e2").updated_at().is_none());
    }
}
