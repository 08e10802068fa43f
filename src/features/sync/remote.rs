//! HTTP synchronizer for the spreadsheet web app.
//!
//! Uploads post a batch of records; downloads fetch a whole collection and
//! merge it into the local [`EntityStore`]. Phases, record progress, request
//! latency and cache hits are reported on the queue's [`EventBus`].

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::events::{EventBus, SyncEvent, SyncPhase};
use super::operation::{DataType, Entity};
use super::synchronizer::{SyncReport, Synchronizer};
use crate::config::RemoteConfig;
use crate::error::RollcallError;
use crate::storage::{EntityStore, MergeOutcome};

#[derive(Deserialize)]
struct DownloadResponse {
    #[serde(default)]
    records: Vec<Value>,
}

/// Client for the remote spreadsheet service.
pub struct HttpSynchronizer {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    entities: Arc<EntityStore>,
    events: EventBus,
}

impl HttpSynchronizer {
    /// Build a synchronizer from the remote settings.
    ///
    /// # Errors
    ///
    /// Returns `RollcallError::Config` if no endpoint is configured and
    /// `RollcallError::Sync` if the HTTP client cannot be built.
    pub fn new(
        config: &RemoteConfig,
        entities: Arc<EntityStore>,
        events: EventBus,
    ) -> Result<Self, RollcallError> {
        let endpoint = config.require_endpoint()?.to_string();
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            client,
            endpoint,
            api_key: config.api_key.clone(),
            entities,
            events,
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn phase(&self, phase: SyncPhase) {
        self.events.emit(&SyncEvent::PhaseChanged { phase });
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    /// Send a request, reporting its latency, and return the JSON body.
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, RollcallError> {
        let started = Instant::now();
        let result = self.authorize(request).send().await;

        let response = match result {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                self.network(started, false);
                return Err(RollcallError::Sync(format!(
                    "remote returned HTTP {}",
                    response.status()
                )));
            }
            Err(e) => {
                self.network(started, false);
                return Err(e.into());
            }
        };

        let body = response.json::<Value>().await;
        self.network(started, body.is_ok());
        Ok(body?)
    }

    fn network(&self, started: Instant, success: bool) {
        self.events.emit(&SyncEvent::NetworkRequest {
            latency: started.elapsed(),
            success,
        });
    }

    fn fail(&self, error: RollcallError) -> RollcallError {
        self.phase(SyncPhase::Failed);
        error
    }
}

#[async_trait]
impl Synchronizer for HttpSynchronizer {
    async fn upload_changes(
        &self,
        data_type: DataType,
        data: &[Entity],
    ) -> Result<SyncReport, RollcallError> {
        self.phase(SyncPhase::Preparing);
        let body = upload_body(data_type, data);

        self.phase(SyncPhase::Uploading);
        let request = self.client.post(&self.endpoint).json(&body);
        let value = self.send(request).await.map_err(|e| self.fail(e))?;
        let report: SyncReport = serde_json::from_value(value)
            .map_err(|e| self.fail(RollcallError::Sync(format!("invalid upload response: {e}"))))?;

        self.events.emit(&SyncEvent::RecordProgress {
            processed: data.len(),
            total: data.len(),
        });
        if let Some(conflicts) = report.conflicts.filter(|c| *c > 0) {
            self.events.emit(&SyncEvent::Warning {
                message: format!("{conflicts} {data_type} record(s) conflicted on upload"),
            });
        }

        debug!(%data_type, count = report.count, "Upload accepted");
        self.phase(SyncPhase::Complete);
        Ok(report)
    }

    async fn download_changes(&self, data_type: DataType) -> Result<SyncReport, RollcallError> {
        self.phase(SyncPhase::Preparing);

        self.phase(SyncPhase::Downloading);
        let request = self
            .client
            .get(&self.endpoint)
            .query(&[("action", "download"), ("dataType", data_type.as_str())]);
        let value = self.send(request).await.map_err(|e| self.fail(e))?;
        let (records, unreadable) = parse_download(value).map_err(|e| self.fail(e))?;

        if unreadable > 0 {
            warn!(%data_type, unreadable, "Skipping unreadable remote records");
            self.events.emit(&SyncEvent::Warning {
                message: format!("{unreadable} unreadable {data_type} record(s) skipped"),
            });
        }

        self.phase(SyncPhase::Merging);
        let total = records.len();
        let merged = self
            .entities
            .merge_remote_with(data_type, &records, |index, outcome| {
                self.events.emit(&SyncEvent::CacheLookup {
                    hit: outcome == MergeOutcome::Unchanged,
                });
                self.events.emit(&SyncEvent::RecordProgress {
                    processed: index + 1,
                    total,
                });
            })
            .map_err(|e| self.fail(e))?;

        self.phase(SyncPhase::Finalizing);
        if merged.conflicts > 0 {
            self.events.emit(&SyncEvent::Warning {
                message: format!(
                    "{} local {data_type} record(s) newer than remote, kept",
                    merged.conflicts
                ),
            });
        }

        debug!(
            %data_type,
            applied = merged.applied,
            conflicts = merged.conflicts,
            unchanged = merged.unchanged,
            "Download merged"
        );
        self.phase(SyncPhase::Complete);

        Ok(SyncReport {
            count: total,
            conflicts: Some(merged.conflicts),
            skipped: Some(unreadable),
        })
    }
}

fn upload_body(data_type: DataType, data: &[Entity]) -> Value {
    json!({
        "action": "upload",
        "dataType": data_type,
        "records": data,
    })
}

/// Split a download response into readable entities and a count of bad records.
fn parse_download(value: Value) -> Result<(Vec<Entity>, usize), RollcallError> {
    let response: DownloadResponse = serde_json::from_value(value)
        .map_err(|e| RollcallError::Sync(format!("invalid download response: {e}")))?;

    let mut unreadable = 0usize;
    let records = response
        .records
        .into_iter()
        .filter_map(|record| match serde_json::from_value::<Entity>(record) {
            Ok(entity) if !entity.id.trim().is_empty() => Some(entity),
            _ => {
                unreadable += 1;
                None
            }
        })
        .collect();

    Ok((records, unreadable))
}
