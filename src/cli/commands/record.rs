//! Record command: store records locally and queue their upload.

use std::path::Path;

use colored::Colorize;
use serde_json::json;
use tracing::info;

use super::{read_records, Context};
use crate::cli::args::OutputFormat;
use crate::error::RollcallError;
use crate::features::sync::validate_operation;
use crate::output::to_json;

/// Write the records in `file` to the local store and enqueue one upload.
///
/// Nothing is written if the records fail validation.
///
/// # Errors
///
/// Returns `RollcallError::InvalidOperation` for a bad data type or file,
/// and database or persistence errors from the stores.
pub fn record(ctx: &Context, data_type: &str, file: &Path) -> Result<String, RollcallError> {
    let value = json!({
        "type": "upload",
        "dataType": data_type,
        "data": read_records(file)?,
    });
    let request = validate_operation(&value)?;
    let data_type = request.data_type;
    let entities = request.kind.entities().to_vec();

    // Lock the queue first so a busy queue leaves the local store untouched
    let queue = ctx.open_queue()?;
    let store = ctx.open_entities()?;
    for entity in &entities {
        store.upsert(data_type, entity)?;
    }

    let id = queue.enqueue(request)?;
    info!(%data_type, count = entities.len(), id = %id, "Recorded locally and queued for upload");

    match ctx.format {
        OutputFormat::Json => to_json(&json!({
            "id": id,
            "dataType": data_type,
            "recorded": entities.len(),
            "stored": store.count(data_type)?,
        })),
        OutputFormat::Pretty => Ok(format!(
            "{} Recorded {} {data_type} record(s), queued as {id}",
            "✓".green(),
            entities.len()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Paths};
    use crate::features::sync::{DataType, OperationType};
    use tempfile::TempDir;

    fn context(dir: &TempDir) -> Context {
        Context::new(
            Paths::with_root(dir.path().join("home")),
            Config::default(),
            OutputFormat::Json,
        )
    }

    #[test]
    fn test_record_stores_and_queues() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let file = dir.path().join("checkins.json");
        std::fs::write(&file, r#"[{"id": "a1", "eventId": "e1"}, {"id": "a2", "eventId": "e1"}]"#)
            .unwrap();

        record(&ctx, "attendance", &file).unwrap();
        record(&ctx, "attendance", &file).unwrap();

        let store = ctx.open_entities().unwrap();
        assert_eq!(store.count(DataType::Attendance).unwrap(), 2);

        let queue = ctx.open_queue().unwrap();
        let ops = queue.operations();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].operation_type(), OperationType::Upload);
        assert_eq!(ops[0].entity_count(), 2);
    }

    #[test]
    fn test_record_refused_while_queue_is_held() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let file = dir.path().join("checkins.json");
        std::fs::write(&file, r#"[{"id": "a1"}]"#).unwrap();

        let held = ctx.open_queue().unwrap();
        let err = record(&ctx, "attendance", &file).unwrap_err();
        assert!(matches!(err, RollcallError::Busy(_)));
        drop(held);

        assert_eq!(ctx.open_entities().unwrap().count(DataType::Attendance).unwrap(), 0);
        assert!(ctx.open_queue().unwrap().is_empty());
    }

    #[test]
    fn test_record_rejects_unknown_data_type() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let file = dir.path().join("donors.json");
        std::fs::write(&file, r#"[{"id": "d1"}]"#).unwrap();

        let err = record(&ctx, "donors", &file).unwrap_err();
        assert!(matches!(err, RollcallError::InvalidOperation(_)));
        assert!(!ctx.paths.database.exists());
    }
}
