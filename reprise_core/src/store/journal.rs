//! Append-only journal standing in for a remote record store.
//!
//! Upserts are appended to a JSONL file with file locking; reads scan the
//! journal and the last entry for a key wins.

use super::{RecordKey, RecordStore};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// One line of the journal
#[derive(Clone, Debug, Serialize, Deserialize)]
struct JournalEntry {
    #[serde(flatten)]
    key: RecordKey,
    record: Value,
    written_at: DateTime<Utc>,
}

/// JSONL-backed record store
#[derive(Clone, Debug)]
pub struct JournalStore {
    path: PathBuf,
}

impl JournalStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

fn append_entry(path: &Path, entry: &JournalEntry) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    file.lock_exclusive()?;

    let mut writer = std::io::BufWriter::new(&file);
    let line = serde_json::to_string(entry)?;
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()?;

    file.unlock()?;
    tracing::debug!("Journaled {}", entry.key);
    Ok(())
}

fn find_latest(path: &Path, key: &RecordKey) -> Result<Option<Value>> {
    if !path.exists() {
        return Ok(None);
    }

    let file = File::open(path)?;
    file.lock_shared()?;

    let reader = BufReader::new(&file);
    let mut latest = None;

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<JournalEntry>(&line) {
            Ok(entry) if entry.key == *key => latest = Some(entry.record),
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("Failed to parse journal line {}: {}", line_num + 1, e);
            }
        }
    }

    file.unlock()?;
    Ok(latest)
}

fn join_error(e: tokio::task::JoinError) -> Error {
    Error::Store(format!("journal task failed: {}", e))
}

#[async_trait]
impl RecordStore for JournalStore {
    async fn get(&self, key: &RecordKey) -> Result<Option<Value>> {
        let path = self.path.clone();
        let key = key.clone();
        tokio::task::spawn_blocking(move || find_latest(&path, &key))
            .await
            .map_err(join_error)?
    }

    async fn upsert(&self, key: &RecordKey, record: Value) -> Result<Value> {
        let path = self.path.clone();
        let entry = JournalEntry {
            key: key.clone(),
            record,
            written_at: Utc::now(),
        };
        tokio::task::spawn_blocking(move || {
            append_entry(&path, &entry)?;
            Ok(entry.record)
        })
        .await
        .map_err(join_error)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Table;
    use serde_json::json;

    #[tokio::test]
    async fn test_last_write_wins() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = JournalStore::new(temp_dir.path().join("remote.jsonl"));
        let key = RecordKey::new(Table::Players, "p");

        store.upsert(&key, json!({"xp": 100})).await.unwrap();
        store
            .upsert(&RecordKey::new(Table::Players, "other"), json!({"xp": 1}))
            .await
            .unwrap();
        store.upsert(&key, json!({"xp": 250})).await.unwrap();

        assert_eq!(store.get(&key).await.unwrap(), Some(json!({"xp": 250})));
    }

    #[tokio::test]
    async fn test_missing_journal_reads_none() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = JournalStore::new(temp_dir.path().join("absent.jsonl"));
        let key = RecordKey::new(Table::Players, "p");
        assert!(store.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_lines_are_skipped() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("remote.jsonl");
        let store = JournalStore::new(&path);
        let key = RecordKey::new(Table::PlayerStats, "p");

        store.upsert(&key, json!({"force": 4.0})).await.unwrap();
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{{ not json").unwrap();

        assert_eq!(store.get(&key).await.unwrap(), Some(json!({"force": 4.0})));
    }

    #[tokio::test]
    async fn test_entries_are_one_line_each() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("remote.jsonl");
        let store = JournalStore::new(&path);
        for i in 0..3 {
            store
                .upsert(&RecordKey::new(Table::Workouts, format!("w{}", i)), json!({"done": true}))
                .await
                .unwrap();
        }
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 3);
        assert!(contents.contains("\"table\":\"workouts\""));
    }
}
