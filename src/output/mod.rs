//! Output formatting for rollcall.
//!
//! This module provides formatters for displaying queue state in various formats.

mod json;
mod pretty;

use crate::cli::args::OutputFormat;
use crate::error::RollcallError;
use crate::features::progress::PerformanceSummary;
use crate::features::sync::{Operation, ProcessSummary, QueueStatistics, QueueStatus};

pub use json::*;
pub use pretty::*;

/// Format queue status based on output format
///
/// # Errors
///
/// Returns `RollcallError::Parse` if JSON serialization fails.
pub fn format_status(status: &QueueStatus, format: OutputFormat) -> Result<String, RollcallError> {
    match format {
        OutputFormat::Pretty => Ok(format_status_pretty(status)),
        OutputFormat::Json => to_json(status),
    }
}

/// Format queue records based on output format
///
/// # Errors
///
/// Returns `RollcallError::Parse` if JSON serialization fails.
pub fn format_operations(
    operations: &[Operation],
    title: &str,
    limit: usize,
    format: OutputFormat,
) -> Result<String, RollcallError> {
    match format {
        OutputFormat::Pretty => Ok(format_operations_pretty(operations, title, limit)),
        OutputFormat::Json => {
            let shown = &operations[..operations.len().min(limit)];
            format_operations_json(shown)
        }
    }
}

/// Format queue statistics based on output format
///
/// # Errors
///
/// Returns `RollcallError::Parse` if JSON serialization fails.
pub fn format_statistics(
    stats: &QueueStatistics,
    format: OutputFormat,
) -> Result<String, RollcallError> {
    match format {
        OutputFormat::Pretty => Ok(format_statistics_pretty(stats)),
        OutputFormat::Json => to_json(stats),
    }
}

/// Format a drain result based on output format
///
/// # Errors
///
/// Returns `RollcallError::Parse` if JSON serialization fails.
pub fn format_summary(
    summary: &ProcessSummary,
    performance: Option<&PerformanceSummary>,
    format: OutputFormat,
) -> Result<String, RollcallError> {
    match format {
        OutputFormat::Pretty => Ok(format_summary_pretty(summary, performance)),
        OutputFormat::Json => format_summary_json(summary, performance),
    }
}
