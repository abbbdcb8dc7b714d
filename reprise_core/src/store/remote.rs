//! In-process record stores.

use super::{RecordKey, RecordStore};
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Record store held in memory; clones share the same records
///
/// Writes can be switched to fail to simulate an unreachable backend.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    records: Arc<Mutex<HashMap<RecordKey, Value>>>,
    upserts: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of successful upserts so far
    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    /// Insert a record directly, bypassing failure simulation
    pub async fn seed(&self, key: RecordKey, record: Value) {
        self.records.lock().await.insert(key, record);
    }

    pub async fn snapshot(&self, key: &RecordKey) -> Option<Value> {
        self.records.lock().await.get(key).cloned()
    }

    fn check_reachable(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Store("remote store unreachable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get(&self, key: &RecordKey) -> Result<Option<Value>> {
        self.check_reachable()?;
        Ok(self.records.lock().await.get(key).cloned())
    }

    async fn upsert(&self, key: &RecordKey, record: Value) -> Result<Value> {
        self.check_reachable()?;
        self.records.lock().await.insert(key.clone(), record.clone());
        self.upserts.fetch_add(1, Ordering::SeqCst);
        Ok(record)
    }
}

/// Remote store for running without a backend: every call fails
#[derive(Clone, Copy, Debug, Default)]
pub struct OfflineStore;

#[async_trait]
impl RecordStore for OfflineStore {
    async fn get(&self, key: &RecordKey) -> Result<Option<Value>> {
        Err(Error::Store(format!("offline: cannot read {}", key)))
    }

    async fn upsert(&self, key: &RecordKey, _record: Value) -> Result<Value> {
        Err(Error::Store(format!("offline: cannot write {}", key)))
    }
}
