use std::fmt::Write as _;

use chrono::{Duration, Utc};
use colored::Colorize;

use crate::features::progress::PerformanceSummary;
use crate::features::sync::{
    DataType, Operation, OperationStatus, OperationType, ProcessSummary, QueueStatistics,
    QueueStatus,
};

/// Format queue status as a short report
pub fn format_status_pretty(status: &QueueStatus) -> String {
    let mut lines = Vec::new();

    lines.push("Sync Queue Status".bold().to_string());
    lines.push("─".repeat(40));

    lines.push(format!(
        "  Queued:     {} {}",
        status.queued,
        if status.queued > 0 {
            "operations waiting".dimmed()
        } else {
            "".dimmed()
        }
    ));
    lines.push(format!(
        "  Retrying:   {} {}",
        status.retry,
        if status.retry > 0 {
            "operations will be retried".yellow()
        } else {
            "".normal()
        }
    ));
    lines.push(format!(
        "  Failed:     {} {}",
        status.failed,
        if status.failed > 0 {
            "operations need attention".red()
        } else {
            "".normal()
        }
    ));

    if let Some(oldest) = status.oldest_queued_at {
        let age = format_age(Utc::now().signed_duration_since(oldest));
        lines.push(format!("  Oldest:     {}", age.dimmed()));
    }

    if status.processing {
        lines.push(format!("  {}", "A sync is in progress".cyan()));
    }

    if status.queued + status.retry > 0 {
        lines.push(String::new());
        lines.push(
            "Run 'rollcall queue run' to sync pending operations"
                .dimmed()
                .to_string(),
        );
    }

    lines.join("\n")
}

/// Format queue records as a table
pub fn format_operations_pretty(operations: &[Operation], title: &str, limit: usize) -> String {
    if operations.is_empty() {
        return format!("No {title} operations in queue.");
    }

    let mut lines = Vec::new();
    lines.push(format!("{} Operations ({})", title.to_uppercase(), operations.len()));
    lines.push("─".repeat(78));
    lines.push(format!(
        "{:<30} {:<9} {:<11} {:>8} {:<16} {}",
        "ID", "Type", "Data", "Records", "Queued", "Status"
    ));
    lines.push("─".repeat(78));

    for op in operations.iter().take(limit) {
        let queued = op.queued_at.format("%Y-%m-%d %H:%M").to_string();
        lines.push(format!(
            "{:<30} {:<9} {:<11} {:>8} {:<16} {}",
            op.id,
            op.operation_type().as_str(),
            op.data_type.as_str(),
            op.entity_count(),
            queued,
            status_label(op.status, op.attempts)
        ));

        if let Some(error) = &op.last_error {
            let short_error = if error.chars().count() > 70 {
                format!("{}...", error.chars().take(67).collect::<String>())
            } else {
                error.clone()
            };
            lines.push(format!("    {}", short_error.red()));
        }
    }

    if operations.len() > limit {
        lines.push(
            format!("... and {} more", operations.len() - limit)
                .dimmed()
                .to_string(),
        );
    }

    lines.join("\n")
}

fn status_label(status: OperationStatus, attempts: u32) -> String {
    match status {
        OperationStatus::Queued => "queued".to_string(),
        OperationStatus::Retry => format!("retry ({attempts})").yellow().to_string(),
        OperationStatus::Completed => "✓".green().to_string(),
        OperationStatus::Failed => format!("✗ failed ({attempts})").red().to_string(),
    }
}

/// Format queue statistics
pub fn format_statistics_pretty(stats: &QueueStatistics) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", "Sync Queue Statistics".bold());
    let _ = writeln!(out, "{}", "─".repeat(40));
    let _ = writeln!(out, "  Total:      {}", stats.total);

    let _ = writeln!(out, "\n{}", "By status".bold());
    for status in OperationStatus::ALL {
        let count = stats.by_status.get(&status).copied().unwrap_or_default();
        let _ = writeln!(out, "  {:<11} {count}", status.as_str());
    }

    let _ = writeln!(out, "\n{}", "By type".bold());
    for op_type in OperationType::ALL {
        let count = stats.by_type.get(&op_type).copied().unwrap_or_default();
        let _ = writeln!(out, "  {:<11} {count}", op_type.as_str());
    }

    let _ = writeln!(out, "\n{}", "By data type".bold());
    for data_type in DataType::ALL {
        let count = stats.by_data_type.get(&data_type).copied().unwrap_or_default();
        let _ = writeln!(out, "  {:<11} {count}", data_type.as_str());
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "  Records:    {}", stats.total_entities);
    let _ = writeln!(out, "  Attempts:   {}", stats.total_attempts);
    if let Some(oldest) = stats.oldest_age_secs {
        let _ = writeln!(out, "  Oldest:     {}", format_age(Duration::seconds(oldest)));
    }
    if let Some(newest) = stats.newest_age_secs {
        let _ = write!(out, "  Newest:     {}", format_age(Duration::seconds(newest)));
    }

    out.trim_end().to_string()
}

/// Format a drain result, with performance figures when available
pub fn format_summary_pretty(
    summary: &ProcessSummary,
    performance: Option<&PerformanceSummary>,
) -> String {
    if summary.attempted() == 0 {
        return "No pending operations to sync.".to_string();
    }

    let mut lines = Vec::new();
    lines.push("Sync Results".bold().to_string());
    lines.push("─".repeat(40));
    lines.push(format!("  {} {}", "Synced:".green(), summary.processed));
    if summary.retrying > 0 {
        lines.push(format!("  {} {}", "Retrying:".yellow(), summary.retrying));
    }
    if summary.failed > 0 {
        lines.push(format!("  {} {}", "Failed:".red(), summary.failed));
    }
    if summary.skipped > 0 {
        lines.push(format!("  {} {}", "Skipped:".dimmed(), summary.skipped));
    }
    lines.push(format!("  Remaining: {}", summary.remaining));

    if !summary.errors.is_empty() {
        lines.push(String::new());
        lines.push("Errors:".red().to_string());
        for error in &summary.errors {
            lines.push(format!(
                "  {} {} {}: {}",
                error.id.dimmed(),
                error.operation_type,
                error.data_type,
                error.message
            ));
        }
    }

    if let Some(performance) = performance {
        lines.push(String::new());
        lines.push(format!(
            "{} {:.1}s",
            "Elapsed:".dimmed(),
            summary.elapsed.as_secs_f64()
        ));
        if let Some(ms) = performance.average_latency_ms {
            lines.push(format!("{} {ms:.0}ms", "Avg latency:".dimmed()));
        }
        if let Some(rate) = performance.cache_hit_rate {
            lines.push(format!("{} {:.0}%", "Cache hits:".dimmed(), rate * 100.0));
        }
    }

    lines.join("\n")
}

/// Human-readable age ("3 hours ago")
pub fn format_age(age: Duration) -> String {
    if age.num_days() > 0 {
        format!("{} days ago", age.num_days())
    } else if age.num_hours() > 0 {
        format!("{} hours ago", age.num_hours())
    } else if age.num_minutes() > 0 {
        format!("{} minutes ago", age.num_minutes())
    } else {
        "just now".to_string()
    }
}
