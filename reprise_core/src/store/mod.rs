//! Two-tier persistence: a synchronous local cache in front of an
//! asynchronous, fallible remote record store.
//!
//! The local tier is authoritative once populated. See [`Reconciler`] for
//! the read and write policies.

mod journal;
mod local;
mod reconcile;
mod remote;

pub use journal::JournalStore;
pub use local::{FileCache, MemoryCache};
pub use reconcile::{Reconciler, RemoteSync, SyncReport};
pub use remote::{MemoryStore, OfflineStore};

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Remote tables the engine writes to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Players,
    PlayerStats,
    DailyQuestProgress,
    WorkoutSessions,
    Workouts,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Players => "players",
            Table::PlayerStats => "player_stats",
            Table::DailyQuestProgress => "daily_quest_progress",
            Table::WorkoutSessions => "workout_sessions",
            Table::Workouts => "workouts",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Address of one record
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub table: Table,
    pub id: String,
}

impl RecordKey {
    pub fn new(table: Table, id: impl Into<String>) -> Self {
        Self {
            table,
            id: id.into(),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.table, self.id)
    }
}

/// Synchronous cache that is always reachable
pub trait LocalCache: Send + Sync {
    fn get(&self, key: &RecordKey) -> Result<Option<Value>>;
    fn set(&self, key: &RecordKey, value: &Value) -> Result<()>;
    fn remove(&self, key: &RecordKey) -> Result<()>;
}

/// Remote record store reached over the network
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, key: &RecordKey) -> Result<Option<Value>>;
    /// Insert or replace the record, returning what was stored
    async fn upsert(&self, key: &RecordKey, record: Value) -> Result<Value>;
}
