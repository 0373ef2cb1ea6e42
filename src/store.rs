//! Durable key → record maps backed by a single JSON file.
//!
//! Every mutation rewrites the whole map through a same-directory temp file and an
//! atomic rename. Loading never fails: a missing file is an empty store, an
//! unparsable file is discarded, and malformed entries are skipped one by one.
//!
//! The file may be shared with another process (the daemon and a one-shot
//! command). Before each access the store compares the file's modification
//! stamp with the one it last loaded or wrote, and reloads when they differ, so
//! a write never drops records another process added.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StoreError;
use crate::types::ScheduleRecord;
use crate::util::{atomic_write_str, file_stamp, FileStamp};
use crate::week::WeekPlan;

/// A record that carries its own map key.
pub trait StoreRecord: Clone + Serialize + DeserializeOwned {
    fn key(&self) -> &str;
}

impl StoreRecord for ScheduleRecord {
    fn key(&self) -> &str {
        self.date.as_str()
    }
}

impl StoreRecord for WeekPlan {
    fn key(&self) -> &str {
        self.week.as_str()
    }
}

pub type ScheduleStore = JsonStore<ScheduleRecord>;
pub type WeekStore = JsonStore<WeekPlan>;

pub struct JsonStore<R> {
    path: PathBuf,
    inner: RwLock<Inner<R>>,
}

struct Inner<R> {
    data: BTreeMap<String, R>,
    /// Stamp of the file as last loaded or written by this store.
    seen: Option<FileStamp>,
}

impl<R: StoreRecord> JsonStore<R> {
    /// Open the store at `path`, loading whatever is readable.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let seen = file_stamp(&path);
        let data = load_entries(&path);
        Self {
            path,
            inner: RwLock::new(Inner { data, seen }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has(&self, key: impl AsRef<str>) -> bool {
        self.refresh();
        self.inner.read().data.contains_key(key.as_ref())
    }

    pub fn get(&self, key: impl AsRef<str>) -> Option<R> {
        self.refresh();
        self.inner.read().data.get(key.as_ref()).cloned()
    }

    /// Upsert by the record's own key, then persist the whole map.
    ///
    /// On a persistence error the in-memory map keeps the new record.
    pub fn set(&self, record: R) -> Result<(), StoreError> {
        let mut guard = self.inner.write();
        self.refresh_locked(&mut guard);
        guard.data.insert(record.key().to_string(), record);
        self.save_locked(&mut guard)
    }

    /// Delete `key` if present. Persists only when something was removed.
    pub fn remove(&self, key: impl AsRef<str>) -> Result<bool, StoreError> {
        let mut guard = self.inner.write();
        self.refresh_locked(&mut guard);
        if guard.data.remove(key.as_ref()).is_none() {
            return Ok(false);
        }
        self.save_locked(&mut guard)?;
        Ok(true)
    }

    /// Snapshot copy of every record.
    pub fn all(&self) -> BTreeMap<String, R> {
        self.refresh();
        self.inner.read().data.clone()
    }

    pub fn len(&self) -> usize {
        self.refresh();
        self.inner.read().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self, persist: bool) -> Result<(), StoreError> {
        let mut guard = self.inner.write();
        guard.data.clear();
        if persist {
            self.save_locked(&mut guard)?;
        }
        Ok(())
    }

    fn refresh(&self) {
        if file_stamp(&self.path) == self.inner.read().seen {
            return;
        }
        let mut guard = self.inner.write();
        self.refresh_locked(&mut guard);
    }

    // A vanished file leaves memory alone; the next write recreates it.
    fn refresh_locked(&self, inner: &mut Inner<R>) {
        let current = file_stamp(&self.path);
        if current.is_some() && current != inner.seen {
            log::debug!("{} changed on disk, reloading", self.path.display());
            inner.data = load_entries(&self.path);
        }
        inner.seen = current;
    }

    // Caller holds the write lock so concurrent writers cannot interleave renames.
    fn save_locked(&self, inner: &mut Inner<R>) -> Result<(), StoreError> {
        let content =
            serde_json::to_string_pretty(&inner.data).map_err(|e| StoreError::Serialize {
                path: self.path.clone(),
                message: e.to_string(),
            })?;
        atomic_write_str(&self.path, &content).map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
        })?;
        inner.seen = file_stamp(&self.path);
        Ok(())
    }
}

fn load_entries<R: StoreRecord>(path: &Path) -> BTreeMap<String, R> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
        Err(e) => {
            log::warn!("Failed to read {}: {}. Starting empty.", path.display(), e);
            return BTreeMap::new();
        }
    };

    let raw: serde_json::Map<String, serde_json::Value> = match serde_json::from_str(&content) {
        Ok(map) => map,
        Err(e) => {
            log::warn!("Discarding corrupt {}: {}", path.display(), e);
            return BTreeMap::new();
        }
    };

    let mut data = BTreeMap::new();
    let mut skipped = 0usize;
    for (key, value) in raw {
        if !value.is_object() {
            skipped += 1;
            continue;
        }
        match serde_json::from_value::<R>(value) {
            Ok(record) => {
                if record.key() != key {
                    log::warn!("Entry '{}' carries key '{}', re-keying", key, record.key());
                }
                data.insert(record.key().to_string(), record);
            }
            Err(e) => {
                log::debug!("Skipping malformed entry '{}': {}", key, e);
                skipped += 1;
            }
        }
    }

    if skipped > 0 {
        log::warn!(
            "Skipped {} malformed entries in {}",
            skipped,
            path.display()
        );
    }

    data
}
