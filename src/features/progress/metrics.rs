//! Rolling performance metrics for sync operations.

use std::collections::VecDeque;
use std::time::Duration;

use serde::Serialize;

/// Fixed-capacity window of the most recent samples.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl RollingWindow {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Add a sample, dropping the oldest when full.
    pub fn push(&mut self, sample: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Mean of the held samples, or `None` when empty.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn average(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().sum::<f64>() / self.samples.len() as f64)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Point-in-time view of sync performance.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSummary {
    /// Mean wall time per executed operation, in milliseconds
    pub average_operation_ms: Option<f64>,
    /// Mean remote request latency, in milliseconds
    pub average_latency_ms: Option<f64>,
    /// Share of downloaded records already identical locally (0.0 to 1.0)
    pub cache_hit_rate: Option<f64>,
    /// Share of executed operations that succeeded (0.0 to 1.0)
    pub success_rate: Option<f64>,
    /// Operations finished since the tracker was created
    pub operations: usize,
    pub warnings: usize,
    pub errors: usize,
}

/// Accumulates samples for a [`PerformanceSummary`].
#[derive(Debug, Clone)]
pub struct PerformanceMetrics {
    operation_times: RollingWindow,
    latencies: RollingWindow,
    cache_lookups: RollingWindow,
    outcomes: RollingWindow,
    operations: usize,
    warnings: usize,
    errors: usize,
}

impl PerformanceMetrics {
    /// Metrics averaging over the last `window` samples of each kind.
    #[must_use]
    pub fn new(window: usize) -> Self {
        Self {
            operation_times: RollingWindow::new(window),
            latencies: RollingWindow::new(window),
            cache_lookups: RollingWindow::new(window),
            outcomes: RollingWindow::new(window),
            operations: 0,
            warnings: 0,
            errors: 0,
        }
    }

    pub fn record_operation(&mut self, elapsed: Duration, success: bool) {
        self.operations += 1;
        self.operation_times.push(millis(elapsed));
        self.outcomes.push(if success { 1.0 } else { 0.0 });
    }

    pub fn record_latency(&mut self, latency: Duration) {
        self.latencies.push(millis(latency));
    }

    pub fn record_cache_lookup(&mut self, hit: bool) {
        self.cache_lookups.push(if hit { 1.0 } else { 0.0 });
    }

    pub fn record_warning(&mut self) {
        self.warnings += 1;
    }

    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    #[must_use]
    pub fn summary(&self) -> PerformanceSummary {
        PerformanceSummary {
            average_operation_ms: self.operation_times.average(),
            average_latency_ms: self.latencies.average(),
            cache_hit_rate: self.cache_lookups.average(),
            success_rate: self.outcomes.average(),
            operations: self.operations,
            warnings: self.warnings,
            errors: self.errors,
        }
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}
