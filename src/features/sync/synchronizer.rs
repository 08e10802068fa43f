//! The seam between the queue and the remote store.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::operation::{DataType, Entity};
use crate::error::RollcallError;

/// What the remote reported for one upload or download.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Records written (upload) or received (download)
    pub count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflicts: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped: Option<usize>,
}

impl SyncReport {
    #[must_use]
    pub const fn with_count(count: usize) -> Self {
        Self {
            count,
            conflicts: None,
            skipped: None,
        }
    }
}

/// Performs uploads and downloads against the remote store.
///
/// Any `Err` counts as a failed attempt for the operation being executed.
#[async_trait]
pub trait Synchronizer: Send + Sync {
    /// Push local entities of one data type.
    async fn upload_changes(
        &self,
        data_type: DataType,
        data: &[Entity],
    ) -> Result<SyncReport, RollcallError>;

    /// Pull the remote collection of one data type into the local store.
    async fn download_changes(&self, data_type: DataType) -> Result<SyncReport, RollcallError>;
}
