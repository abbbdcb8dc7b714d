//! Local cache tier with file locking.
//!
//! `FileCache` keeps one JSON file per record and replaces it atomically,
//! so an interrupted process always finds the last committed snapshot.

use super::{LocalCache, RecordKey};
use crate::{Error, Result};
use fs2::FileExt;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::Value;
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

/// Characters kept verbatim in cache file names
const FILE_NAME: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_');

/// In-process cache; clones share the same entries
#[derive(Clone, Debug, Default)]
pub struct MemoryCache {
    entries: Arc<Mutex<HashMap<RecordKey, Value>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> Error {
    Error::Store("local cache lock poisoned".into())
}

impl LocalCache for MemoryCache {
    fn get(&self, key: &RecordKey) -> Result<Option<Value>> {
        Ok(self.entries.lock().map_err(poisoned)?.get(key).cloned())
    }

    fn set(&self, key: &RecordKey, value: &Value) -> Result<()> {
        self.entries
            .lock()
            .map_err(poisoned)?
            .insert(key.clone(), value.clone());
        Ok(())
    }

    fn remove(&self, key: &RecordKey) -> Result<()> {
        self.entries.lock().map_err(poisoned)?.remove(key);
        Ok(())
    }
}

/// Directory-backed cache: `<root>/<table>/<id>.json`
#[derive(Clone, Debug)]
pub struct FileCache {
    root: PathBuf,
}

impl FileCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path of the file holding `key`
    ///
    /// Ids are percent-encoded, so distinct ids never share a file.
    pub fn path_for(&self, key: &RecordKey) -> PathBuf {
        let file_name = utf8_percent_encode(&key.id, FILE_NAME);
        self.root
            .join(key.table.as_str())
            .join(format!("{}.json", file_name))
    }
}

impl LocalCache for FileCache {
    /// Read an entry with shared locking
    ///
    /// A file that cannot be read or parsed is logged and treated as absent.
    fn get(&self, key: &RecordKey) -> Result<Option<Value>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }

        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!("Unable to open cache entry {:?}: {}. Ignoring.", path, e);
                return Ok(None);
            }
        };

        if let Err(e) = file.lock_shared() {
            tracing::warn!("Unable to lock cache entry {:?}: {}. Ignoring.", path, e);
            return Ok(None);
        }

        let mut contents = String::new();
        let mut reader = std::io::BufReader::new(&file);
        if let Err(e) = reader.read_to_string(&mut contents) {
            let _ = file.unlock();
            tracing::warn!("Failed to read cache entry {:?}: {}. Ignoring.", path, e);
            return Ok(None);
        }

        file.unlock()?;

        match serde_json::from_str::<Value>(&contents) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!("Corrupt cache entry {:?}: {}. Ignoring.", path, e);
                Ok(None)
            }
        }
    }

    /// Write an entry atomically
    ///
    /// The value goes to a locked temp file in the same directory, is synced,
    /// then renamed over the previous entry.
    fn set(&self, key: &RecordKey, value: &Value) -> Result<()> {
        let path = self.path_for(key);
        let parent = path
            .parent()
            .ok_or_else(|| Error::Store(format!("cache path {:?} has no parent", path)))?;
        std::fs::create_dir_all(parent)?;

        let temp = NamedTempFile::new_in(parent)?;
        temp.as_file().lock_exclusive()?;

        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            let contents = serde_json::to_string(value)?;
            writer.write_all(contents.as_bytes())?;
            writer.flush()?;
        }

        temp.as_file().sync_all()?;
        temp.as_file().unlock()?;

        temp.persist(&path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!("Cached {} at {:?}", key, path);
        Ok(())
    }

    fn remove(&self, key: &RecordKey) -> Result<()> {
        let path = self.path_for(key);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!("Removed cache entry {}", key);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
