//! Read and write policies over the local and remote tiers.
//!
//! - **write**: the local cache is updated synchronously before returning;
//!   the remote upsert is queued and performed later by [`RemoteSync`].
//!   Remote failures are logged and dropped, never rolled back.
//! - **read**: a local entry always wins. Only when the local cache has
//!   nothing is the remote store consulted, and its answer seeds the cache.
//! - **clear**: removes the local entry only.

use super::{LocalCache, RecordKey, RecordStore};
use crate::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A remote upsert waiting to be sent
#[derive(Debug)]
struct PendingWrite {
    key: RecordKey,
    record: Value,
}

/// Counts of remote writes processed by a [`RemoteSync`] worker
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub synced: usize,
    pub failed: usize,
}

/// Single logical read/write path over both tiers
pub struct Reconciler {
    local: Arc<dyn LocalCache>,
    remote: Arc<dyn RecordStore>,
    queue: mpsc::UnboundedSender<PendingWrite>,
}

/// Background worker draining queued remote writes
///
/// `run` returns once every [`Reconciler`] feeding it has been dropped and
/// the queue is empty.
pub struct RemoteSync {
    remote: Arc<dyn RecordStore>,
    rx: mpsc::UnboundedReceiver<PendingWrite>,
}

impl Reconciler {
    /// Build a reconciler and the worker that performs its remote writes
    pub fn new(local: Arc<dyn LocalCache>, remote: Arc<dyn RecordStore>) -> (Self, RemoteSync) {
        let (queue, rx) = mpsc::unbounded_channel();
        let sync = RemoteSync {
            remote: Arc::clone(&remote),
            rx,
        };
        (
            Self {
                local,
                remote,
                queue,
            },
            sync,
        )
    }

    /// Build a reconciler and spawn its worker on the current tokio runtime
    pub fn spawn(
        local: Arc<dyn LocalCache>,
        remote: Arc<dyn RecordStore>,
    ) -> (Self, JoinHandle<SyncReport>) {
        let (reconciler, sync) = Self::new(local, remote);
        (reconciler, tokio::spawn(sync.run()))
    }

    /// Write locally, then queue the remote upsert
    pub fn write<T: Serialize>(&self, key: &RecordKey, value: &T) -> Result<()> {
        let record = serde_json::to_value(value)?;
        self.local.set(key, &record)?;

        if self
            .queue
            .send(PendingWrite {
                key: key.clone(),
                record,
            })
            .is_err()
        {
            tracing::debug!("Remote sync not running; {} stays local", key);
        }
        Ok(())
    }

    /// Read from the local cache only
    ///
    /// Entries that no longer decode as `T` are logged and read as absent.
    pub fn read_local<T: DeserializeOwned>(&self, key: &RecordKey) -> Result<Option<T>> {
        let Some(value) = self.local.get(key)? else {
            return Ok(None);
        };
        match serde_json::from_value(value) {
            Ok(decoded) => Ok(Some(decoded)),
            Err(e) => {
                tracing::warn!("Discarding undecodable local entry {}: {}", key, e);
                Ok(None)
            }
        }
    }

    /// Local-wins read with remote fallback
    pub async fn read<T: DeserializeOwned>(&self, key: &RecordKey) -> Result<Option<T>> {
        if let Some(local) = self.read_local(key)? {
            tracing::debug!("Read {} from local cache", key);
            return Ok(Some(local));
        }

        let value = match self.remote.get(key).await {
            Ok(Some(value)) => value,
            Ok(None) => return Ok(None),
            Err(e) => {
                tracing::warn!("Remote read of {} failed: {}", key, e);
                return Ok(None);
            }
        };

        let decoded = match serde_json::from_value::<T>(value.clone()) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::warn!("Discarding undecodable remote record {}: {}", key, e);
                return Ok(None);
            }
        };

        if let Err(e) = self.local.set(key, &value) {
            tracing::warn!("Failed to seed local cache with {}: {}", key, e);
        } else {
            tracing::info!("Seeded local cache with remote {}", key);
        }
        Ok(Some(decoded))
    }

    /// Drop the local entry; the remote record is left alone
    pub fn clear(&self, key: &RecordKey) -> Result<()> {
        self.local.remove(key)
    }
}

impl RemoteSync {
    pub async fn run(mut self) -> SyncReport {
        let mut report = SyncReport::default();

        while let Some(write) = self.rx.recv().await {
            match self.remote.upsert(&write.key, write.record).await {
                Ok(_) => {
                    report.synced += 1;
                    tracing::debug!("Synced {} to remote", write.key);
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!("Remote write of {} failed: {}", write.key, e);
                }
            }
        }

        tracing::debug!(
            "Remote sync finished: {} synced, {} failed",
            report.synced,
            report.failed
        );
        report
    }
}
