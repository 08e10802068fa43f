//! Progress tracking for the operation being executed.
//!
//! The tracker is a plain [`QueueObserver`]: subscribe it to a queue's event
//! bus and query it at any time. Synchronization never depends on it.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;

use super::metrics::{PerformanceMetrics, PerformanceSummary};
use crate::features::sync::{
    DataType, OperationOutcome, OperationType, QueueObserver, SyncEvent, SyncPhase,
};

/// Maximum number of warnings and errors kept.
pub const MESSAGE_LIMIT: usize = 100;

/// Snapshot of the operation currently executing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationProgress {
    pub id: String,
    pub kind: OperationType,
    pub data_type: DataType,
    pub phase: SyncPhase,
    /// Position of this operation within the current drain
    pub position: usize,
    pub of: usize,
    pub processed: usize,
    pub total: usize,
    pub progress_percentage: f64,
    pub records_per_second: Option<f64>,
    pub estimated_time_remaining: Option<Duration>,
}

#[derive(Debug)]
struct Current {
    id: String,
    kind: OperationType,
    data_type: DataType,
    phase: SyncPhase,
    position: usize,
    of: usize,
    processed: usize,
    total: usize,
    started: Instant,
}

impl Current {
    fn snapshot(&self, now: Instant) -> OperationProgress {
        let (records_per_second, estimated_time_remaining) =
            estimate(self.processed, self.total, now.duration_since(self.started));

        OperationProgress {
            id: self.id.clone(),
            kind: self.kind,
            data_type: self.data_type,
            phase: self.phase,
            position: self.position,
            of: self.of,
            processed: self.processed,
            total: self.total,
            progress_percentage: percentage(self.phase, self.processed, self.total),
            records_per_second,
            estimated_time_remaining,
        }
    }
}

#[derive(Debug)]
struct TrackerState {
    current: Option<Current>,
    metrics: PerformanceMetrics,
    warnings: VecDeque<String>,
    errors: VecDeque<String>,
}

/// Observer turning queue and synchronizer events into progress figures.
#[derive(Debug)]
pub struct ProgressTracker {
    state: Mutex<TrackerState>,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(50)
    }
}

impl ProgressTracker {
    /// Tracker averaging over the last `window` samples.
    #[must_use]
    pub fn new(window: usize) -> Self {
        Self {
            state: Mutex::new(TrackerState {
                current: None,
                metrics: PerformanceMetrics::new(window),
                warnings: VecDeque::new(),
                errors: VecDeque::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Progress of the executing operation, if one is running.
    #[must_use]
    pub fn current_operation(&self) -> Option<OperationProgress> {
        let now = Instant::now();
        self.state().current.as_ref().map(|c| c.snapshot(now))
    }

    #[must_use]
    pub fn performance_summary(&self) -> PerformanceSummary {
        self.state().metrics.summary()
    }

    /// Most recent warnings, oldest first.
    #[must_use]
    pub fn recent_warnings(&self) -> Vec<String> {
        self.state().warnings.iter().cloned().collect()
    }

    /// Most recent errors, oldest first.
    #[must_use]
    pub fn recent_errors(&self) -> Vec<String> {
        self.state().errors.iter().cloned().collect()
    }
}

impl TrackerState {
    fn warn(&mut self, message: String) {
        self.metrics.record_warning();
        push_bounded(&mut self.warnings, message);
    }

    fn error(&mut self, message: String) {
        self.metrics.record_error();
        push_bounded(&mut self.errors, message);
    }
}

impl QueueObserver for ProgressTracker {
    fn on_event(&self, event: &SyncEvent) {
        let mut state = self.state();

        match event {
            SyncEvent::OperationStarted {
                id,
                operation_type,
                data_type,
                entities,
                position,
                total,
            } => {
                state.current = Some(Current {
                    id: id.clone(),
                    kind: *operation_type,
                    data_type: *data_type,
                    phase: SyncPhase::Preparing,
                    position: *position,
                    of: *total,
                    processed: 0,
                    total: *entities,
                    started: Instant::now(),
                });
            }
            SyncEvent::PhaseChanged { phase } => {
                if let Some(current) = state.current.as_mut() {
                    current.phase = *phase;
                }
            }
            SyncEvent::RecordProgress { processed, total } => {
                if let Some(current) = state.current.as_mut() {
                    current.processed = (*processed).min(*total);
                    current.total = *total;
                }
            }
            SyncEvent::NetworkRequest { latency, .. } => {
                state.metrics.record_latency(*latency);
            }
            SyncEvent::CacheLookup { hit } => state.metrics.record_cache_lookup(*hit),
            SyncEvent::OperationFinished {
                id,
                outcome,
                elapsed,
                ..
            } => {
                state
                    .metrics
                    .record_operation(*elapsed, outcome.is_success());
                match outcome {
                    OperationOutcome::Succeeded(_) => {}
                    OperationOutcome::Retrying(message) => {
                        state.warn(format!("{id}: {message} (will retry)"));
                    }
                    OperationOutcome::Failed(message) => {
                        state.error(format!("{id}: {message}"));
                    }
                }
                state.current = None;
            }
            SyncEvent::OperationsEvicted { ids } => {
                state.warn(format!("queue full, evicted {} oldest operation(s)", ids.len()));
            }
            SyncEvent::Warning { message } => state.warn(message.clone()),
            SyncEvent::Error { message } => state.error(message.clone()),
            SyncEvent::QueueProcessed { .. } => state.current = None,
            SyncEvent::OperationQueued { .. }
            | SyncEvent::DrainStarted { .. }
            | SyncEvent::QueueCleared { .. }
            | SyncEvent::OperationRemoved { .. } => {}
        }
    }
}

fn push_bounded(messages: &mut VecDeque<String>, message: String) {
    if messages.len() == MESSAGE_LIMIT {
        messages.pop_front();
    }
    messages.push_back(message);
}

/// Completion percentage. Record counts win; otherwise the phase decides.
#[allow(clippy::cast_precision_loss)]
fn percentage(phase: SyncPhase, processed: usize, total: usize) -> f64 {
    match phase {
        SyncPhase::Complete => 100.0,
        _ if total > 0 => (processed as f64 / total as f64 * 100.0).clamp(0.0, 100.0),
        SyncPhase::Preparing | SyncPhase::Failed => 0.0,
        SyncPhase::Uploading | SyncPhase::Downloading => 25.0,
        SyncPhase::Merging => 60.0,
        SyncPhase::Finalizing => 90.0,
    }
}

/// Throughput and time left, once at least one record has been processed.
#[allow(clippy::cast_precision_loss)]
fn estimate(processed: usize, total: usize, elapsed: Duration) -> (Option<f64>, Option<Duration>) {
    let secs = elapsed.as_secs_f64();
    if processed == 0 || secs <= 0.0 {
        return (None, None);
    }

    let rate = processed as f64 / secs;
    let remaining = total.saturating_sub(processed) as f64 / rate;
    (Some(rate), Duration::try_from_secs_f64(remaining).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueConfig;
    use crate::error::RollcallError;
    use crate::features::sync::{
        Entity, EventBus, OperationRequest, SyncQueue, SyncReport, Synchronizer,
    };
    use crate::storage::MemoryKvStore;
    use async_trait::async_trait;
    use std::sync::Arc;

    fn started(tracker: &ProgressTracker, entities: usize) {
        tracker.on_event(&SyncEvent::OperationStarted {
            id: "op_1".to_string(),
            operation_type: OperationType::Download,
            data_type: DataType::Events,
            entities,
            position: 1,
            total: 2,
        });
    }

    fn finished(tracker: &ProgressTracker, outcome: OperationOutcome) {
        tracker.on_event(&SyncEvent::OperationFinished {
            id: "op_1".to_string(),
            operation_type: OperationType::Download,
            data_type: DataType::Events,
            outcome,
            elapsed: Duration::from_millis(200),
        });
    }

    #[test]
    fn test_estimate() {
        let (rate, eta) = estimate(50, 200, Duration::from_secs(10));
        assert!((rate.unwrap() - 5.0).abs() < f64::EPSILON);
        assert_eq!(eta, Some(Duration::from_secs(30)));

        assert_eq!(estimate(0, 200, Duration::from_secs(10)), (None, None));
        assert_eq!(estimate(10, 10, Duration::ZERO), (None, None));
    }

    #[test]
    fn test_percentage() {
        assert!((percentage(SyncPhase::Merging, 3, 4) - 75.0).abs() < f64::EPSILON);
        assert!((percentage(SyncPhase::Merging, 0, 0) - 60.0).abs() < f64::EPSILON);
        assert!((percentage(SyncPhase::Complete, 0, 10) - 100.0).abs() < f64::EPSILON);
        assert!(percentage(SyncPhase::Preparing, 0, 0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_tracks_current_operation() {
        let tracker = ProgressTracker::default();
        assert!(tracker.current_operation().is_none());

        started(&tracker, 0);
        tracker.on_event(&SyncEvent::PhaseChanged {
            phase: SyncPhase::Merging,
        });
        tracker.on_event(&SyncEvent::RecordProgress {
            processed: 5,
            total: 10,
        });

        let progress = tracker.current_operation().unwrap();
        assert_eq!(progress.id, "op_1");
        assert_eq!(progress.phase, SyncPhase::Merging);
        assert_eq!((progress.position, progress.of), (1, 2));
        assert!((progress.progress_percentage - 50.0).abs() < f64::EPSILON);

        finished(&tracker, OperationOutcome::Succeeded(SyncReport::with_count(10)));
        assert!(tracker.current_operation().is_none());
    }

    #[test]
    fn test_collects_metrics_and_messages() {
        let tracker = ProgressTracker::new(50);

        started(&tracker, 0);
        tracker.on_event(&SyncEvent::NetworkRequest {
            latency: Duration::from_millis(40),
            success: true,
        });
        tracker.on_event(&SyncEvent::CacheLookup { hit: true });
        tracker.on_event(&SyncEvent::CacheLookup { hit: false });
        finished(&tracker, OperationOutcome::Retrying("offline".to_string()));

        started(&tracker, 0);
        finished(&tracker, OperationOutcome::Failed("offline".to_string()));

        let summary = tracker.performance_summary();
        assert_eq!(summary.operations, 2);
        assert!((summary.success_rate.unwrap()).abs() < f64::EPSILON);
        assert!((summary.cache_hit_rate.unwrap() - 0.5).abs() < f64::EPSILON);
        assert_eq!(summary.warnings, 1);
        assert_eq!(summary.errors, 1);
        assert_eq!(tracker.recent_warnings(), vec!["op_1: offline (will retry)"]);
        assert_eq!(tracker.recent_errors(), vec!["op_1: offline"]);
    }

    #[test]
    fn test_messages_are_bounded() {
        let tracker = ProgressTracker::default();
        for i in 0..(MESSAGE_LIMIT + 5) {
            tracker.on_event(&SyncEvent::Warning {
                message: format!("warning {i}"),
            });
        }

        let warnings = tracker.recent_warnings();
        assert_eq!(warnings.len(), MESSAGE_LIMIT);
        assert_eq!(warnings[0], "warning 5");
        assert_eq!(tracker.performance_summary().warnings, MESSAGE_LIMIT + 5);
    }

    /// Reports on the queue's bus the way the HTTP synchronizer does and
    /// samples the tracker halfway through each download.
    struct Reporting {
        events: EventBus,
        tracker: Arc<ProgressTracker>,
        midway: Mutex<Vec<OperationProgress>>,
    }

    #[async_trait]
    impl Synchronizer for Reporting {
        async fn upload_changes(
            &self,
            _data_type: DataType,
            _data: &[Entity],
        ) -> Result<SyncReport, RollcallError> {
            self.events.emit(&SyncEvent::PhaseChanged {
                phase: SyncPhase::Uploading,
            });
            self.events.emit(&SyncEvent::NetworkRequest {
                latency: Duration::from_millis(30),
                success: false,
            });
            Err(RollcallError::Sync("remote returned HTTP 503".to_string()))
        }

        async fn download_changes(&self, _data_type: DataType) -> Result<SyncReport, RollcallError> {
            self.events.emit(&SyncEvent::PhaseChanged {
                phase: SyncPhase::Downloading,
            });
            self.events.emit(&SyncEvent::NetworkRequest {
                latency: Duration::from_millis(30),
                success: true,
            });
            self.events.emit(&SyncEvent::PhaseChanged {
                phase: SyncPhase::Merging,
            });
            for processed in 1..=4 {
                self.events.emit(&SyncEvent::CacheLookup {
                    hit: processed % 2 == 0,
                });
                self.events.emit(&SyncEvent::RecordProgress {
                    processed,
                    total: 4,
                });
                if processed == 2 {
                    if let Some(progress) = self.tracker.current_operation() {
                        self.midway.lock().unwrap().push(progress);
                    }
                }
            }
            self.events.emit(&SyncEvent::PhaseChanged {
                phase: SyncPhase::Complete,
            });
            Ok(SyncReport::with_count(4))
        }
    }

    #[tokio::test]
    async fn test_follows_a_real_drain() {
        let events = EventBus::new();
        let queue = SyncQueue::with_events(
            MemoryKvStore::new(),
            QueueConfig::default(),
            events.clone(),
        );
        let tracker = Arc::new(ProgressTracker::default());
        queue.subscribe(Arc::clone(&tracker) as _);

        let download = queue
            .enqueue(OperationRequest::download(DataType::Events))
            .unwrap();
        queue
            .enqueue(OperationRequest::upload(
                DataType::Volunteers,
                vec![Entity::new("v1")],
            ))
            .unwrap();

        let sync = Reporting {
            events,
            tracker: Arc::clone(&tracker),
            midway: Mutex::new(Vec::new()),
        };
        queue.process_queue(&sync).await.unwrap();

        let midway = sync.midway.lock().unwrap();
        assert_eq!(midway.len(), 1);
        let progress = &midway[0];
        assert_eq!(progress.id, download);
        assert_eq!(progress.kind, OperationType::Download);
        assert_eq!(progress.data_type, DataType::Events);
        assert_eq!(progress.phase, SyncPhase::Merging);
        assert_eq!((progress.position, progress.of), (1, 2));
        assert_eq!((progress.processed, progress.total), (2, 4));
        assert!((progress.progress_percentage - 50.0).abs() < f64::EPSILON);

        assert!(tracker.current_operation().is_none());
        let summary = tracker.performance_summary();
        assert_eq!(summary.operations, 2);
        assert!((summary.success_rate.unwrap() - 0.5).abs() < f64::EPSILON);
        assert!((summary.cache_hit_rate.unwrap() - 0.5).abs() < f64::EPSILON);
        assert!((summary.average_latency_ms.unwrap() - 30.0).abs() < 1e-6);
        assert!(summary.average_operation_ms.is_some());
        assert_eq!(summary.warnings, 1);
        assert_eq!(tracker.recent_warnings().len(), 1);
        assert!(tracker.recent_warnings()[0].contains("HTTP 503"));
    }
}
