//! Sync queue command implementation.
//!
//! Handles sync queue management commands.

use std::path::PathBuf;
use std::sync::Arc;

use colored::Colorize;
use serde_json::json;

use super::{read_records, Context};
use crate::cli::args::{OutputFormat, QueueCommands};
use crate::error::RollcallError;
use crate::features::progress::ProgressTracker;
use crate::features::sync::{
    validate_operation, DrainResult, OperationOutcome, OperationStatus, SyncEvent, SyncQueue,
};
use crate::output::{format_operations, format_statistics, format_status, format_summary, to_json};
use crate::storage::KeyValueStore;

/// Execute queue subcommands.
///
/// # Errors
///
/// Returns an error if the queue cannot be opened or the subcommand fails.
pub async fn queue(ctx: &Context, cmd: QueueCommands) -> Result<String, RollcallError> {
    let format = ctx.format;

    // Reads skip the writer lock; everything else holds it until the command ends
    match cmd {
        QueueCommands::Status => format_status(&ctx.inspect_queue()?.queue_status(), format),
        QueueCommands::List { status, limit } => {
            list_operations(&ctx.inspect_queue()?, status, limit, format)
        }
        QueueCommands::Stats => format_statistics(&ctx.inspect_queue()?.statistics(), format),
        QueueCommands::Run => run_queue(ctx, &ctx.open_queue()?, false).await,
        QueueCommands::Retry { id: Some(id) } => {
            reset_operation(&ctx.open_queue()?, &id, format)
        }
        QueueCommands::Retry { id: None } => run_queue(ctx, &ctx.open_queue()?, true).await,
        QueueCommands::Remove { id } => remove_operation(&ctx.open_queue()?, &id, format),
        QueueCommands::Clear { force } => clear_queue(&ctx.open_queue()?, force, format),
        QueueCommands::Add {
            operation,
            data_type,
            file,
        } => add_operation(&ctx.open_queue()?, &operation, &data_type, file, format),
    }
}

/// List queued operations, optionally filtered by status.
fn list_operations<S: KeyValueStore>(
    queue: &SyncQueue<S>,
    status_filter: Option<String>,
    limit: usize,
    format: OutputFormat,
) -> Result<String, RollcallError> {
    let (operations, title) = match status_filter {
        Some(filter) => {
            let status: OperationStatus = filter.parse()?;
            (queue.operations_by_status(status), status.to_string())
        }
        None => (queue.operations(), "all".to_string()),
    };

    format_operations(&operations, &title, limit, format)
}

/// Drain the queue against the remote service.
async fn run_queue<S: KeyValueStore>(
    ctx: &Context,
    queue: &SyncQueue<S>,
    retry_failed: bool,
) -> Result<String, RollcallError> {
    let synchronizer = ctx.synchronizer(queue.events().clone())?;

    let tracker = Arc::new(ProgressTracker::new(ctx.config.progress.window));
    queue.subscribe(Arc::clone(&tracker) as _);
    if ctx.format == OutputFormat::Pretty {
        queue.subscribe(Arc::new(print_progress));
    }

    let result = if retry_failed {
        queue.retry_failed_operations(&synchronizer).await?
    } else {
        queue.process_queue(&synchronizer).await?
    };

    match result {
        DrainResult::Completed(summary) => {
            let performance = tracker.performance_summary();
            format_summary(&summary, Some(&performance), ctx.format)
        }
        DrainResult::AlreadyRunning => match ctx.format {
            OutputFormat::Json => to_json(&json!({
                "alreadyRunning": true,
                "requeued": retry_failed,
            })),
            OutputFormat::Pretty if retry_failed => Ok(
                "A sync is already in progress; failed operations were re-queued for it or the next run."
                    .to_string(),
            ),
            OutputFormat::Pretty => Ok("A sync is already in progress.".to_string()),
        },
    }
}

/// Per-operation progress lines on stderr, so stdout stays clean for the summary.
fn print_progress(event: &SyncEvent) {
    match event {
        SyncEvent::OperationStarted {
            operation_type,
            data_type,
            entities,
            position,
            total,
            ..
        } => {
            let records = if *entities > 0 {
                format!(" ({entities} records)")
            } else {
                String::new()
            };
            eprint!("[{position}/{total}] {operation_type} {data_type}{records}... ");
        }
        SyncEvent::OperationFinished { outcome, .. } => match outcome {
            OperationOutcome::Succeeded(_) => eprintln!("{}", "done".green()),
            OperationOutcome::Retrying(_) => eprintln!("{}", "will retry".yellow()),
            OperationOutcome::Failed(_) => eprintln!("{}", "failed".red()),
        },
        SyncEvent::OperationsEvicted { ids } => {
            eprintln!(
                "{} queue full, dropped {} oldest operation(s)",
                "warning:".yellow(),
                ids.len()
            );
        }
        _ => {}
    }
}

/// Give one operation a fresh attempt budget.
fn reset_operation<S: KeyValueStore>(
    queue: &SyncQueue<S>,
    id: &str,
    format: OutputFormat,
) -> Result<String, RollcallError> {
    let operation = queue.reset_operation(id)?;

    match format {
        OutputFormat::Json => to_json(&operation),
        OutputFormat::Pretty => Ok(format!(
            "{} Operation {} reset; it runs on the next 'rollcall queue run'",
            "✓".green(),
            operation.id
        )),
    }
}

fn remove_operation<S: KeyValueStore>(
    queue: &SyncQueue<S>,
    id: &str,
    format: OutputFormat,
) -> Result<String, RollcallError> {
    let operation = queue
        .remove_operation(id)?
        .ok_or_else(|| RollcallError::NotFound(format!("Operation {id}")))?;

    match format {
        OutputFormat::Json => to_json(&json!({ "removed": operation })),
        OutputFormat::Pretty => Ok(format!("{} Removed operation {}", "✓".green(), operation.id)),
    }
}

fn clear_queue<S: KeyValueStore>(
    queue: &SyncQueue<S>,
    force: bool,
    format: OutputFormat,
) -> Result<String, RollcallError> {
    if !force {
        let count = queue.len();
        return match format {
            OutputFormat::Json => to_json(&json!({ "cleared": 0, "wouldClear": count })),
            OutputFormat::Pretty => Ok(format!(
                "This removes {count} operation(s). Re-run with --force to confirm."
            )),
        };
    }

    let count = queue.clear_queue()?;
    match format {
        OutputFormat::Json => to_json(&json!({ "cleared": count })),
        OutputFormat::Pretty => Ok(format!("{} Cleared {count} operation(s)", "✓".green())),
    }
}

/// Add an operation built from command-line arguments.
fn add_operation<S: KeyValueStore>(
    queue: &SyncQueue<S>,
    operation_type: &str,
    data_type: &str,
    file: Option<PathBuf>,
    format: OutputFormat,
) -> Result<String, RollcallError> {
    let mut value = json!({
        "type": operation_type,
        "dataType": data_type,
    });
    if let Some(path) = file {
        value["data"] = read_records(&path)?;
    }

    let request = validate_operation(&value)?;
    let enqueued = queue.submit(request)?;

    match format {
        OutputFormat::Json => to_json(&json!({
            "id": enqueued.id,
            "merged": enqueued.merged,
            "evicted": enqueued.evicted,
            "queueLength": queue.len(),
        })),
        OutputFormat::Pretty => {
            let verb = if enqueued.merged { "Merged into" } else { "Queued" };
            Ok(format!("{} {verb} operation {}", "✓".green(), enqueued.id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Paths};
    use crate::features::sync::DataType;
    use tempfile::TempDir;

    fn context(dir: &TempDir) -> Context {
        Context::new(
            Paths::with_root(dir.path().join("home")),
            Config::default(),
            OutputFormat::Json,
        )
    }

    #[tokio::test]
    async fn test_add_then_list() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let records = dir.path().join("records.json");
        std::fs::write(&records, r#"[{"id": "a1"}, {"id": "a2"}]"#).unwrap();

        let added = queue(
            &ctx,
            QueueCommands::Add {
                operation: "upload".to_string(),
                data_type: "attendance".to_string(),
                file: Some(records),
            },
        )
        .await
        .unwrap();
        let added: serde_json::Value = serde_json::from_str(&added).unwrap();
        assert_eq!(added["merged"], false);
        assert_eq!(added["queueLength"], 1);

        let listed = queue(
            &ctx,
            QueueCommands::List {
                status: Some("queued".to_string()),
                limit: 20,
            },
        )
        .await
        .unwrap();
        let listed: serde_json::Value = serde_json::from_str(&listed).unwrap();
        assert_eq!(listed["count"], 1);
        assert_eq!(listed["items"][0]["dataType"], "attendance");
        assert_eq!(listed["items"][0]["data"][1]["id"], "a2");
    }

    #[tokio::test]
    async fn test_add_download_needs_no_file() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);

        for expected in [false, true] {
            let added = queue(
                &ctx,
                QueueCommands::Add {
                    operation: "download".to_string(),
                    data_type: "events".to_string(),
                    file: None,
                },
            )
            .await
            .unwrap();
            let added: serde_json::Value = serde_json::from_str(&added).unwrap();
            assert_eq!(added["merged"], expected);
            assert_eq!(added["evicted"], 0);
        }

        let queue = ctx.open_queue().unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.operations()[0].data_type, DataType::Events);
    }

    #[tokio::test]
    async fn test_add_upload_without_file_fails() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);

        let err = queue(
            &ctx,
            QueueCommands::Add {
                operation: "upload".to_string(),
                data_type: "events".to_string(),
                file: None,
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, RollcallError::InvalidOperation(_)));
        assert!(ctx.open_queue().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_without_endpoint_is_config_error() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);

        let err = queue(&ctx, QueueCommands::Run).await.unwrap_err();
        assert!(matches!(err, RollcallError::Config(_)));
    }

    #[tokio::test]
    async fn test_clear_requires_force() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        ctx.open_queue()
            .unwrap()
            .enqueue(crate::features::sync::OperationRequest::download(DataType::Volunteers))
            .unwrap();

        queue(&ctx, QueueCommands::Clear { force: false }).await.unwrap();
        assert_eq!(ctx.open_queue().unwrap().len(), 1);

        let out = queue(&ctx, QueueCommands::Clear { force: true }).await.unwrap();
        assert!(out.contains("\"cleared\": 1"));
        assert!(ctx.open_queue().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reads_work_while_queue_is_held() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let held = ctx.open_queue().unwrap();
        held.enqueue(crate::features::sync::OperationRequest::download(DataType::Events))
            .unwrap();

        let status = queue(&ctx, QueueCommands::Status).await.unwrap();
        assert!(status.contains("\"total\": 1"));

        let err = queue(&ctx, QueueCommands::Clear { force: true }).await.unwrap_err();
        assert!(matches!(err, RollcallError::Busy(_)));
        assert_eq!(held.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_unknown_is_not_found() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);

        let err = queue(
            &ctx,
            QueueCommands::Remove {
                id: "op_missing".to_string(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RollcallError::NotFound(_)));
    }
}
