//! The outbound sync loop.
//!
//! Polls the attendance ledger for unsynced records on a fixed interval
//! and publishes them with acknowledgement-gated retry. Only confirmed
//! records flip to synced; a timeout abandons the rest of the batch
//! until the next interval so a degraded broker is not hammered.

use crate::broker::{BrokerError, BrokerHandle};
use crate::netcheck;
use std::sync::Arc;
use std::time::Duration;
use tally_store::{AttendanceRecord, Store, StoreError};
use thiserror::Error;
use tokio::sync::watch;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("store: {0}")]
    Store(#[from] StoreError),
}

/// At-least-once publish seam. The broker handle implements this for
/// production; tests drive the engine with synthetic publishers.
pub trait AckPublisher: Send + Sync {
    fn publish_record(
        &self,
        payload: serde_json::Value,
    ) -> impl std::future::Future<Output = Result<(), BrokerError>> + Send;
}

impl AckPublisher for BrokerHandle {
    async fn publish_record(&self, payload: serde_json::Value) -> Result<(), BrokerError> {
        self.publish_acked(payload.to_string().into_bytes()).await
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Seconds between publish cycles while online.
    pub interval: Duration,
    /// Seconds to wait after a failed reachability probe.
    pub retry_interval: Duration,
    /// Max records fetched per cycle.
    pub batch_limit: usize,
    /// Bounded wait for one record's publish confirmation.
    pub publish_timeout: Duration,
    /// External endpoint probed before each cycle.
    pub probe_addr: String,
    pub probe_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            interval: Duration::from_secs(10),
            retry_interval: Duration::from_secs(15),
            batch_limit: 10,
            publish_timeout: Duration::from_secs(3),
            probe_addr: "8.8.8.8:53".to_string(),
            probe_timeout: Duration::from_secs(3),
        }
    }
}

/// Restricted wire projection of an attendance record. Internal fields
/// (sync flag, shift id, derived date/clock columns) never leave the
/// device.
pub fn record_payload(record: &AttendanceRecord) -> serde_json::Value {
    serde_json::json!({
        "id": record.id,
        "identity_id": record.identity_id,
        "display_name": record.display_name,
        "device_id": record.device_id,
        "punch_time": record.punch_time.format("%Y-%m-%d %H:%M:%S").to_string(),
        "punch_type": record.punch_type.as_str(),
        "status": record.status.as_str(),
        "late_minutes": record.late_minutes,
        "early_departure_minutes": record.early_departure_minutes,
        "overtime_minutes": record.overtime_minutes,
        "confidence": record.confidence,
    })
}

pub struct SyncEngine<P> {
    store: Arc<Store>,
    publisher: P,
    config: SyncConfig,
}

impl<P: AckPublisher> SyncEngine<P> {
    pub fn new(store: Arc<Store>, publisher: P, config: SyncConfig) -> Self {
        SyncEngine {
            store,
            publisher,
            config,
        }
    }

    /// Run publish cycles until the shutdown flag flips. Offline cycles
    /// are skipped entirely; records wait unbounded.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            batch_limit = self.config.batch_limit,
            "sync engine starting"
        );
        let mut delay = self.config.interval;
        loop {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("sync engine stopping");
                        break;
                    }
                    continue;
                }
            }

            if !netcheck::reachable(&self.config.probe_addr, self.config.probe_timeout).await {
                tracing::warn!(
                    retry_secs = self.config.retry_interval.as_secs(),
                    "no connectivity, skipping sync cycle"
                );
                delay = self.config.retry_interval;
                continue;
            }
            delay = self.config.interval;

            match self.sync_cycle().await {
                Ok(0) => {}
                Ok(count) => tracing::info!(count, "records synced"),
                Err(err) => tracing::warn!(error = %err, "sync cycle failed"),
            }
        }
    }

    /// One publish cycle. Returns how many records were confirmed.
    pub async fn sync_cycle(&self) -> Result<usize, SyncError> {
        let records = self.store.unsynced_records(self.config.batch_limit)?;
        if records.is_empty() {
            return Ok(0);
        }
        tracing::debug!(count = records.len(), "publishing attendance records");

        let mut confirmed = Vec::new();
        for record in &records {
            let publish = self.publisher.publish_record(record_payload(record));
            match tokio::time::timeout(self.config.publish_timeout, publish).await {
                Ok(Ok(())) => confirmed.push(record.id),
                Ok(Err(err)) => {
                    tracing::warn!(
                        record = record.id,
                        error = %err,
                        "publish failed, deferring remainder of batch"
                    );
                    break;
                }
                Err(_) => {
                    tracing::warn!(
                        record = record.id,
                        "publish confirmation timed out, deferring remainder of batch"
                    );
                    break;
                }
            }
        }

        self.store.mark_synced(&confirmed)?;
        Ok(confirmed.len())
    }
}
