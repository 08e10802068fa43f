//! Sync queue for offline operations.
//!
//! Uploads and downloads are queued while the remote spreadsheet service is
//! unreachable and drained in order once it is back.
//!
//! Features:
//! - Merge of duplicate queued operations
//! - Durable snapshot with retention on load
//! - Retry accounting per operation
//! - Progress events for observers

pub mod events;
pub mod operation;
pub mod queue;
pub mod remote;
pub mod snapshot;
pub mod synchronizer;

pub use events::{EventBus, OperationOutcome, QueueObserver, SyncEvent, SyncPhase};
pub use operation::{
    validate_operation, DataType, Entity, Operation, OperationKind, OperationRequest,
    OperationStatus, OperationType,
};
pub use queue::{
    DrainResult, Enqueued, OperationError, ProcessSummary, QueueStatistics, QueueStatus, SyncQueue,
};
pub use remote::HttpSynchronizer;
pub use snapshot::QueueStore;
pub use synchronizer::{SyncReport, Synchronizer};
