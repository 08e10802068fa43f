//! Progress and performance tracking for sync drains.
//!
//! Provides:
//! - The operation currently executing, with phase and ETA
//! - Rolling averages for operation time and request latency
//! - Cache hit and success rates
//! - Recent warnings and errors

pub mod metrics;
pub mod tracker;

pub use metrics::{PerformanceMetrics, PerformanceSummary, RollingWindow};
pub use tracker::{OperationProgress, ProgressTracker};
