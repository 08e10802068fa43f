//! Sync queue management.
//!
//! The queue is the single owner of pending synchronization work. Every
//! mutation is persisted before it becomes visible, so a restart never loses
//! an accepted operation. Draining is single-flight: a second `process_queue`
//! while one is running returns [`DrainResult::AlreadyRunning`] immediately.
//!
//! Each save rewrites the whole snapshot, so only one queue may be open for
//! changes per storage key. Callers sharing a database across processes hold
//! a [`WriterLock`] via [`SyncQueue::holding`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::events::{EventBus, OperationOutcome, QueueObserver, SyncEvent};
use super::operation::{
    DataType, Operation, OperationKind, OperationRequest, OperationStatus, OperationType,
};
use super::snapshot::QueueStore;
use super::synchronizer::{SyncReport, Synchronizer};
use crate::config::QueueConfig;
use crate::error::RollcallError;
use crate::storage::{KeyValueStore, WriterLock};

/// A per-operation failure captured during a drain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationError {
    pub id: String,
    #[serde(rename = "type")]
    pub operation_type: OperationType,
    pub data_type: DataType,
    pub attempts: u32,
    pub message: String,
    /// The failure used up the last retry
    pub exhausted: bool,
}

/// Result of one drain.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessSummary {
    /// Operations executed successfully, including any removed from the
    /// queue while their remote call was running
    pub processed: usize,
    /// Operations that exhausted their retries this pass
    pub failed: usize,
    /// Operations that failed but will be attempted again
    pub retrying: usize,
    /// Records not executed (completed or failed), plus records removed
    /// mid-drain whose remote call failed
    pub skipped: usize,
    pub errors: Vec<OperationError>,
    /// Records left in the queue after completed ones were purged
    pub remaining: usize,
    pub elapsed: Duration,
}

impl ProcessSummary {
    /// Check if nothing failed this pass.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.errors.is_empty()
    }

    /// Records attempted this pass.
    #[must_use]
    pub const fn attempted(&self) -> usize {
        self.processed + self.failed + self.retrying
    }
}

/// Where an accepted request ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Enqueued {
    /// Record now carrying the work
    pub id: String,
    /// Folded into an existing queued record rather than appended
    pub merged: bool,
    /// Records dropped to make room
    pub evicted: usize,
}

/// Outcome of a `process_queue` call.
#[derive(Debug, Clone, PartialEq)]
pub enum DrainResult {
    Completed(ProcessSummary),
    /// Another drain was in flight; nothing was done.
    AlreadyRunning,
}

impl DrainResult {
    #[must_use]
    pub const fn summary(&self) -> Option<&ProcessSummary> {
        match self {
            Self::Completed(summary) => Some(summary),
            Self::AlreadyRunning => None,
        }
    }

    #[must_use]
    pub const fn is_already_running(&self) -> bool {
        matches!(self, Self::AlreadyRunning)
    }
}

/// Queue counts by status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub total: usize,
    pub queued: usize,
    pub retry: usize,
    pub completed: usize,
    pub failed: usize,
    pub processing: bool,
    pub oldest_queued_at: Option<DateTime<Utc>>,
}

/// Aggregate view of the queue contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatistics {
    pub total: usize,
    pub by_status: BTreeMap<OperationStatus, usize>,
    pub by_type: BTreeMap<OperationType, usize>,
    pub by_data_type: BTreeMap<DataType, usize>,
    pub total_attempts: u64,
    pub total_entities: usize,
    pub oldest_age_secs: Option<i64>,
    pub newest_age_secs: Option<i64>,
    pub average_age_secs: Option<f64>,
}

#[derive(Debug, Default)]
struct QueueState {
    operations: Vec<Operation>,
    /// Record currently handed to the synchronizer; never a merge target.
    in_flight: Option<String>,
}

enum Slot {
    Missing,
    Skip,
    Run(Operation),
}

/// Resets the single-flight flag when the drain ends, however it ends.
struct ProcessingGuard<'a>(&'a AtomicBool);

impl<'a> ProcessingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Durable, ordered queue of pending sync operations.
pub struct SyncQueue<S> {
    store: QueueStore<S>,
    config: QueueConfig,
    state: Mutex<QueueState>,
    processing: AtomicBool,
    events: EventBus,
    writer: Option<WriterLock>,
}

impl<S: KeyValueStore> SyncQueue<S> {
    /// Open a queue over `store`, restoring any persisted snapshot.
    #[must_use]
    pub fn open(store: S, config: QueueConfig) -> Self {
        Self::with_events(store, config, EventBus::new())
    }

    /// Open a queue that emits on an existing event bus.
    #[must_use]
    pub fn with_events(store: S, config: QueueConfig, events: EventBus) -> Self {
        let store = QueueStore::new(store, config.storage_key.clone(), config.retention());
        let mut operations = store.load(Utc::now());
        for operation in &mut operations {
            if operation.enforce_ceiling(config.max_retries) {
                warn!(
                    id = %operation.id,
                    attempts = operation.attempts,
                    max = config.max_retries,
                    "Stored operation already at retry ceiling, marking failed"
                );
            }
        }
        debug!(count = operations.len(), "Sync queue opened");

        Self {
            store,
            config,
            state: Mutex::new(QueueState {
                operations,
                in_flight: None,
            }),
            processing: AtomicBool::new(false),
            events,
            writer: None,
        }
    }

    /// Keep `lock` for as long as this queue lives.
    ///
    /// The snapshot is rewritten wholesale on every save, so a second queue on
    /// the same storage key would overwrite this one's work. Holding the
    /// writer lock makes any other opener fail instead.
    #[must_use]
    pub fn holding(mut self, lock: WriterLock) -> Self {
        self.writer = Some(lock);
        self
    }

    /// Whether this queue holds the writer lock for its data root.
    #[must_use]
    pub const fn holds_writer_lock(&self) -> bool {
        self.writer.is_some()
    }

    #[must_use]
    pub const fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// The bus this queue emits on.
    #[must_use]
    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    /// Register an observer for queue events.
    pub fn subscribe(&self, observer: Arc<dyn QueueObserver>) {
        self.events.subscribe(observer);
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Persist `candidate`, then make it the live queue.
    fn commit(&self, state: &mut QueueState, candidate: Vec<Operation>) -> Result<(), RollcallError> {
        self.store.save(&candidate, Utc::now())?;
        state.operations = candidate;
        Ok(())
    }

    fn persist(&self) -> Result<(), RollcallError> {
        let state = self.state();
        self.store.save(&state.operations, Utc::now())
    }

    /// Add an operation, merging it into a queued duplicate when possible.
    ///
    /// Returns the id of the record that now carries the work.
    ///
    /// # Errors
    ///
    /// Returns `RollcallError::InvalidOperation` if validation fails and
    /// `RollcallError::Persistence` if the snapshot cannot be written. In both
    /// cases the queue is unchanged.
    pub fn enqueue(&self, request: OperationRequest) -> Result<String, RollcallError> {
        self.submit(request).map(|enqueued| enqueued.id)
    }

    /// Like [`SyncQueue::enqueue`], also reporting whether the request was
    /// merged and how many records were evicted.
    ///
    /// # Errors
    ///
    /// Same as [`SyncQueue::enqueue`].
    pub fn submit(&self, request: OperationRequest) -> Result<Enqueued, RollcallError> {
        request.validate()?;

        let now = Utc::now();
        let mut state = self.state();
        let mut candidate = state.operations.clone();

        let merge_target = if self.config.merge_duplicates {
            let in_flight = state.in_flight.as_deref();
            candidate
                .iter()
                .position(|op| op.can_absorb(&request) && in_flight != Some(op.id.as_str()))
        } else {
            None
        };

        let (id, merged, evicted) = if let Some(index) = merge_target {
            let target = &mut candidate[index];
            target.absorb(request, now);
            (target.id.clone(), true, Vec::new())
        } else {
            let evicted = evict_oldest(&mut candidate, self.config.max_queue_size);
            let id = unique_id(&candidate, now);
            candidate.push(Operation::new(id.clone(), request, now));
            (id, false, evicted)
        };

        self.commit(&mut state, candidate)?;
        let operation = state.operations.iter().find(|op| op.id == id).cloned();
        drop(state);

        let enqueued = Enqueued {
            id,
            merged,
            evicted: evicted.len(),
        };
        if !evicted.is_empty() {
            warn!(
                count = evicted.len(),
                max = self.config.max_queue_size,
                "Sync queue full, evicted oldest operations"
            );
            self.events.emit(&SyncEvent::OperationsEvicted { ids: evicted });
        }

        if let Some(operation) = operation {
            debug!(
                id = %operation.id,
                op_type = %operation.operation_type(),
                data_type = %operation.data_type,
                merged,
                "Operation queued"
            );
            self.events
                .emit(&SyncEvent::OperationQueued { operation, merged });
        }

        Ok(enqueued)
    }

    /// Drain the queue once, executing every queued or retrying record in order.
    ///
    /// Individual failures are recorded on their records and reported in the
    /// summary; they never abort the drain.
    ///
    /// # Errors
    ///
    /// Returns `RollcallError::Persistence` if progress cannot be saved.
    pub async fn process_queue<Y>(&self, synchronizer: &Y) -> Result<DrainResult, RollcallError>
    where
        Y: Synchronizer + ?Sized,
    {
        let Some(_guard) = ProcessingGuard::acquire(&self.processing) else {
            debug!("Drain already in progress, skipping");
            return Ok(DrainResult::AlreadyRunning);
        };

        self.drain(synchronizer).await.map(DrainResult::Completed)
    }

    async fn drain<Y>(&self, synchronizer: &Y) -> Result<ProcessSummary, RollcallError>
    where
        Y: Synchronizer + ?Sized,
    {
        let started = Instant::now();
        let (ids, eligible) = {
            let mut state = self.state();
            state.in_flight = None;
            let ids: Vec<String> = state.operations.iter().map(|op| op.id.clone()).collect();
            let eligible = state
                .operations
                .iter()
                .filter(|op| op.status.is_eligible())
                .count();
            (ids, eligible)
        };

        info!(eligible, total = ids.len(), "Draining sync queue");
        self.events.emit(&SyncEvent::DrainStarted { eligible });

        let persist_every = self.config.persist_every.max(1);
        let mut summary = ProcessSummary::default();
        let mut position = 0usize;

        for id in ids {
            let operation = match self.claim(&id) {
                Slot::Missing => continue,
                Slot::Skip => {
                    summary.skipped += 1;
                    continue;
                }
                Slot::Run(operation) => operation,
            };

            position += 1;
            self.events.emit(&SyncEvent::OperationStarted {
                id: operation.id.clone(),
                operation_type: operation.operation_type(),
                data_type: operation.data_type,
                entities: operation.entity_count(),
                position,
                total: eligible,
            });

            let op_started = Instant::now();
            let result = execute(synchronizer, &operation).await;
            let succeeded = result.is_ok();

            let Some((outcome, attempts)) = self.settle(&id, result) else {
                // The remote write happened even though the record is gone
                if succeeded {
                    summary.processed += 1;
                } else {
                    summary.skipped += 1;
                }
                continue;
            };

            match &outcome {
                OperationOutcome::Succeeded(_) => summary.processed += 1,
                OperationOutcome::Retrying(message) | OperationOutcome::Failed(message) => {
                    let exhausted = matches!(outcome, OperationOutcome::Failed(_));
                    if exhausted {
                        summary.failed += 1;
                    } else {
                        summary.retrying += 1;
                    }
                    summary.errors.push(OperationError {
                        id: id.clone(),
                        operation_type: operation.operation_type(),
                        data_type: operation.data_type,
                        attempts,
                        message: message.clone(),
                        exhausted,
                    });
                }
            }

            self.events.emit(&SyncEvent::OperationFinished {
                id,
                operation_type: operation.operation_type(),
                data_type: operation.data_type,
                outcome,
                elapsed: op_started.elapsed(),
            });

            if position % persist_every == 0 {
                self.persist()?;
            }
        }

        {
            let mut state = self.state();
            state.operations.retain(|op| op.status != OperationStatus::Completed);
            summary.remaining = state.operations.len();
            self.store.save(&state.operations, Utc::now())?;
        }

        summary.elapsed = started.elapsed();
        info!(
            processed = summary.processed,
            failed = summary.failed,
            retrying = summary.retrying,
            skipped = summary.skipped,
            remaining = summary.remaining,
            "Sync queue drained"
        );
        self.events.emit(&SyncEvent::QueueProcessed {
            summary: summary.clone(),
        });

        Ok(summary)
    }

    /// Mark a record in flight if it should run this pass.
    fn claim(&self, id: &str) -> Slot {
        let mut state = self.state();
        let Some(operation) = state.operations.iter().find(|op| op.id == id) else {
            return Slot::Missing;
        };
        if !operation.status.is_eligible() {
            return Slot::Skip;
        }
        let operation = operation.clone();
        state.in_flight = Some(operation.id.clone());
        Slot::Run(operation)
    }

    /// Apply an execution result to the live record.
    fn settle(
        &self,
        id: &str,
        result: Result<SyncReport, RollcallError>,
    ) -> Option<(OperationOutcome, u32)> {
        let now = Utc::now();
        let max_retries = self.config.max_retries;
        let mut state = self.state();
        state.in_flight = None;

        let Some(operation) = state.operations.iter_mut().find(|op| op.id == id) else {
            debug!(id, "Operation removed while in flight");
            return None;
        };

        let outcome = match result {
            Ok(report) => {
                operation.mark_completed(now);
                debug!(id, count = report.count, "Operation completed");
                OperationOutcome::Succeeded(report)
            }
            Err(e) => {
                let message = e.to_string();
                match operation.record_failure(message.clone(), max_retries, now) {
                    OperationStatus::Failed => {
                        error!(id, attempts = operation.attempts, error = %message, "Operation failed permanently");
                        OperationOutcome::Failed(message)
                    }
                    _ => {
                        warn!(id, attempts = operation.attempts, error = %message, "Operation failed, will retry");
                        OperationOutcome::Retrying(message)
                    }
                }
            }
        };

        Some((outcome, operation.attempts))
    }

    /// Re-queue every failed or retrying record that still has attempts left,
    /// then drain.
    ///
    /// Records that exhausted their retries are left alone. If a drain is
    /// already running, the records are still re-queued and this returns
    /// [`DrainResult::AlreadyRunning`]; the running drain picks up any it has
    /// not reached yet and the next drain takes the rest.
    ///
    /// # Errors
    ///
    /// Returns `RollcallError::Persistence` if the queue cannot be saved.
    pub async fn retry_failed_operations<Y>(
        &self,
        synchronizer: &Y,
    ) -> Result<DrainResult, RollcallError>
    where
        Y: Synchronizer + ?Sized,
    {
        let requeued = {
            let max_retries = self.config.max_retries;
            let mut state = self.state();
            let in_flight = state.in_flight.clone();
            let mut candidate = state.operations.clone();
            let mut requeued = 0usize;
            for operation in &mut candidate {
                let retryable = matches!(
                    operation.status,
                    OperationStatus::Failed | OperationStatus::Retry
                ) && operation.attempts < max_retries
                    && in_flight.as_deref() != Some(operation.id.as_str());
                if retryable {
                    operation.requeue();
                    requeued += 1;
                }
            }
            if requeued > 0 {
                self.commit(&mut state, candidate)?;
            }
            requeued
        };

        info!(requeued, "Retrying failed operations");
        self.process_queue(synchronizer).await
    }

    /// Operator reset of one record: back to queued with a fresh attempt budget.
    ///
    /// # Errors
    ///
    /// Returns `RollcallError::NotFound` for an unknown id and
    /// `RollcallError::Persistence` if the queue cannot be saved.
    pub fn reset_operation(&self, id: &str) -> Result<Operation, RollcallError> {
        let mut state = self.state();
        let mut candidate = state.operations.clone();
        let operation = candidate
            .iter_mut()
            .find(|op| op.id == id)
            .ok_or_else(|| RollcallError::NotFound(format!("Operation {id}")))?;
        operation.reset();
        let reset = operation.clone();

        self.commit(&mut state, candidate)?;
        info!(id, "Operation reset for retry");
        Ok(reset)
    }

    /// Remove one record.
    ///
    /// # Errors
    ///
    /// Returns `RollcallError::Persistence` if the queue cannot be saved.
    pub fn remove_operation(&self, id: &str) -> Result<Option<Operation>, RollcallError> {
        let mut state = self.state();
        let Some(index) = state.operations.iter().position(|op| op.id == id) else {
            return Ok(None);
        };

        let mut candidate = state.operations.clone();
        let removed = candidate.remove(index);
        self.commit(&mut state, candidate)?;
        drop(state);

        info!(id, "Operation removed");
        self.events.emit(&SyncEvent::OperationRemoved {
            operation: removed.clone(),
        });
        Ok(Some(removed))
    }

    /// Remove every record. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns `RollcallError::Persistence` if the queue cannot be saved.
    pub fn clear_queue(&self) -> Result<usize, RollcallError> {
        let mut state = self.state();
        let count = state.operations.len();
        self.commit(&mut state, Vec::new())?;
        drop(state);

        info!(count, "Sync queue cleared");
        self.events.emit(&SyncEvent::QueueCleared { count });
        Ok(count)
    }

    /// Counts by status.
    #[must_use]
    pub fn queue_status(&self) -> QueueStatus {
        let state = self.state();
        let mut status = QueueStatus {
            total: state.operations.len(),
            processing: self.is_processing(),
            ..QueueStatus::default()
        };

        for operation in &state.operations {
            match operation.status {
                OperationStatus::Queued => status.queued += 1,
                OperationStatus::Retry => status.retry += 1,
                OperationStatus::Completed => status.completed += 1,
                OperationStatus::Failed => status.failed += 1,
            }
        }
        status.oldest_queued_at = state
            .operations
            .iter()
            .filter(|op| op.status.is_eligible())
            .map(|op| op.queued_at)
            .min();

        status
    }

    /// Counts by status, type and data type, plus age figures.
    #[must_use]
    pub fn statistics(&self) -> QueueStatistics {
        let now = Utc::now();
        let state = self.state();
        let mut stats = QueueStatistics {
            total: state.operations.len(),
            ..QueueStatistics::default()
        };

        for operation in &state.operations {
            *stats.by_status.entry(operation.status).or_default() += 1;
            *stats.by_type.entry(operation.operation_type()).or_default() += 1;
            *stats.by_data_type.entry(operation.data_type).or_default() += 1;
            stats.total_attempts += u64::from(operation.attempts);
            stats.total_entities += operation.entity_count();
        }

        let ages: Vec<i64> = state
            .operations
            .iter()
            .map(|op| op.age(now).num_seconds().max(0))
            .collect();
        stats.oldest_age_secs = ages.iter().max().copied();
        stats.newest_age_secs = ages.iter().min().copied();
        if !ages.is_empty() {
            #[allow(clippy::cast_precision_loss)]
            let average = ages.iter().sum::<i64>() as f64 / ages.len() as f64;
            stats.average_age_secs = Some(average);
        }

        stats
    }

    /// Records with the given status, in queue order.
    #[must_use]
    pub fn operations_by_status(&self, status: OperationStatus) -> Vec<Operation> {
        self.state()
            .operations
            .iter()
            .filter(|op| op.status == status)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn operation(&self, id: &str) -> Option<Operation> {
        self.state().operations.iter().find(|op| op.id == id).cloned()
    }

    /// A copy of the whole queue, in order.
    #[must_use]
    pub fn operations(&self) -> Vec<Operation> {
        self.state().operations.clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state().operations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if any record is waiting for a drain.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.state()
            .operations
            .iter()
            .any(|op| op.status.is_eligible())
    }

    #[must_use]
    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    /// The underlying key-value store.
    #[must_use]
    pub const fn store(&self) -> &S {
        self.store.inner()
    }
}

async fn execute<Y>(synchronizer: &Y, operation: &Operation) -> Result<SyncReport, RollcallError>
where
    Y: Synchronizer + ?Sized,
{
    match &operation.kind {
        OperationKind::Upload { data } => {
            synchronizer
                .upload_changes(operation.data_type, data)
                .await
        }
        OperationKind::Download => synchronizer.download_changes(operation.data_type).await,
        OperationKind::Delete => Err(RollcallError::UnsupportedOperation(format!(
            "delete is not implemented for {}",
            operation.data_type
        ))),
    }
}

/// Drop the oldest tenth of the queue if it is at capacity. Returns the evicted ids.
fn evict_oldest(operations: &mut Vec<Operation>, max_size: usize) -> Vec<String> {
    let max_size = max_size.max(1);
    if operations.len() < max_size {
        return Vec::new();
    }

    let count = (max_size / 10).max(1).min(operations.len());
    operations.drain(..count).map(|op| op.id).collect()
}

fn unique_id(operations: &[Operation], now: DateTime<Utc>) -> String {
    loop {
        let id = Operation::generate_id(now);
        if !operations.iter().any(|op| op.id == id) {
            return id;
        }
    }
}
