//! JSON output formatting for rollcall.

use serde::Serialize;
use serde_json::json;

use crate::error::RollcallError;
use crate::features::progress::PerformanceSummary;
use crate::features::sync::{Operation, ProcessSummary};

/// Format queue records as JSON
///
/// # Errors
///
/// Returns `RollcallError::Parse` if JSON serialization fails.
pub fn format_operations_json(operations: &[Operation]) -> Result<String, RollcallError> {
    let output = json!({
        "count": operations.len(),
        "items": operations
    });
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Format a drain result as JSON
///
/// # Errors
///
/// Returns `RollcallError::Parse` if JSON serialization fails.
pub fn format_summary_json(
    summary: &ProcessSummary,
    performance: Option<&PerformanceSummary>,
) -> Result<String, RollcallError> {
    let output = json!({
        "processed": summary.processed,
        "failed": summary.failed,
        "retrying": summary.retrying,
        "skipped": summary.skipped,
        "remaining": summary.remaining,
        "elapsedMs": u64::try_from(summary.elapsed.as_millis()).unwrap_or(u64::MAX),
        "errors": summary.errors,
        "performance": performance,
    });
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Serialize any value as pretty JSON
///
/// # Errors
///
/// Returns `RollcallError::Parse` if JSON serialization fails.
pub fn to_json<T: Serialize>(value: &T) -> Result<String, RollcallError> {
    Ok(serde_json::to_string_pretty(value)?)
}
