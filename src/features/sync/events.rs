//! Events emitted by the sync queue and synchronizers.
//!
//! Each queue instance owns an [`EventBus`]. Observers register on it and are
//! called synchronously, in registration order, for every event. A
//! synchronizer can hold a clone of the bus to report phases and timings for
//! the operation it is executing.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::Serialize;

use super::operation::{DataType, Operation, OperationType};
use super::queue::ProcessSummary;
use super::synchronizer::SyncReport;

/// Coarse stage of the operation currently executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    Preparing,
    Uploading,
    Downloading,
    Merging,
    Finalizing,
    Complete,
    Failed,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Preparing => "preparing",
            Self::Uploading => "uploading",
            Self::Downloading => "downloading",
            Self::Merging => "merging",
            Self::Finalizing => "finalizing",
            Self::Complete => "complete",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// How a single execution ended.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutcome {
    Succeeded(SyncReport),
    /// Failed, still below the retry ceiling
    Retrying(String),
    /// Failed and exhausted its retries
    Failed(String),
}

impl OperationOutcome {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }
}

/// Something observable happened in the queue or the synchronizer.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// A new record was appended, or merged into an existing queued record.
    OperationQueued { operation: Operation, merged: bool },
    /// The queue hit its size limit and dropped its oldest records.
    OperationsEvicted { ids: Vec<String> },
    DrainStarted { eligible: usize },
    OperationStarted {
        id: String,
        operation_type: OperationType,
        data_type: DataType,
        entities: usize,
        position: usize,
        total: usize,
    },
    OperationFinished {
        id: String,
        operation_type: OperationType,
        data_type: DataType,
        outcome: OperationOutcome,
        elapsed: Duration,
    },
    QueueProcessed { summary: ProcessSummary },
    QueueCleared { count: usize },
    OperationRemoved { operation: Operation },
    PhaseChanged { phase: SyncPhase },
    RecordProgress { processed: usize, total: usize },
    NetworkRequest { latency: Duration, success: bool },
    CacheLookup { hit: bool },
    Warning { message: String },
    Error { message: String },
}

impl SyncEvent {
    /// Stable event name, as listeners outside the crate know it.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::OperationQueued { .. } => "operationQueued",
            Self::OperationsEvicted { .. } => "operationsEvicted",
            Self::DrainStarted { .. } => "drainStarted",
            Self::OperationStarted { .. } => "operationStarted",
            Self::OperationFinished { .. } => "operationFinished",
            Self::QueueProcessed { .. } => "queueProcessed",
            Self::QueueCleared { .. } => "queueCleared",
            Self::OperationRemoved { .. } => "operationRemoved",
            Self::PhaseChanged { .. } => "phaseChanged",
            Self::RecordProgress { .. } => "recordProgress",
            Self::NetworkRequest { .. } => "networkRequest",
            Self::CacheLookup { .. } => "cacheLookup",
            Self::Warning { .. } => "warning",
            Self::Error { .. } => "error",
        }
    }
}

/// Receives events from an [`EventBus`].
pub trait QueueObserver: Send + Sync {
    fn on_event(&self, event: &SyncEvent);
}

impl<F> QueueObserver for F
where
    F: Fn(&SyncEvent) + Send + Sync,
{
    fn on_event(&self, event: &SyncEvent) {
        self(event);
    }
}

/// Observer registry owned by one queue instance.
#[derive(Clone, Default)]
pub struct EventBus {
    observers: Arc<RwLock<Vec<Arc<dyn QueueObserver>>>>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer for all subsequent events.
    pub fn subscribe(&self, observer: Arc<dyn QueueObserver>) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    /// Deliver an event to every observer.
    pub fn emit(&self, event: &SyncEvent) {
        // Snapshot so an observer may subscribe from inside its callback.
        let observers: Vec<_> = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for observer in observers {
            observer.on_event(event);
        }
    }

    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("observers", &self.observer_count())
            .finish()
    }
}
