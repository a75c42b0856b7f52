//! Flat string-keyed fallback store.
//!
//! Mirrors a subset of cache slots so they survive when the primary store
//! cannot be opened or has lost its data. Entries live in memory and every
//! write rewrites the backing JSON file. Sizes are measured the way browser
//! storage measures them: two bytes per UTF-16 code unit.

use crate::Error;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Flat key/value store with a hard byte quota.
#[derive(Debug)]
pub struct FallbackStore {
    path: Option<PathBuf>,
    quota_bytes: u64,
    entries: Mutex<BTreeMap<String, String>>,
}

/// Storage size of one entry in bytes.
pub(crate) fn entry_bytes(key: &str, value: &str) -> u64 {
    ((key.encode_utf16().count() + value.encode_utf16().count()) * 2) as u64
}

impl FallbackStore {
    /// Load the store from `path`. A missing file starts empty; an unreadable
    /// or corrupt file is logged and also starts empty.
    pub fn open(path: impl AsRef<Path>, quota_bytes: u64) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<BTreeMap<String, String>>(&bytes) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "fallback store is corrupt, starting empty");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "fallback store unreadable, starting empty");
                BTreeMap::new()
            }
        };
        Self { path: Some(path), quota_bytes, entries: Mutex::new(entries) }
    }

    /// Memory-only store; nothing survives the process.
    pub fn in_memory(quota_bytes: u64) -> Self {
        Self { path: None, quota_bytes, entries: Mutex::new(BTreeMap::new()) }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get_item(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    /// Store `value` under `key`.
    ///
    /// # Errors
    ///
    /// Returns `Error::QuotaExceeded` when the write would push the store past
    /// its quota (the previous value is kept), or `Error::Io` if the backing
    /// file cannot be written.
    pub fn set_item(&self, key: &str, value: String) -> Result<(), Error> {
        let mut entries = self.lock();
        let current: u64 = entries.iter().map(|(k, v)| entry_bytes(k, v)).sum();
        let replaced = entries.get(key).map(|v| entry_bytes(key, v)).unwrap_or(0);
        let projected = current - replaced + entry_bytes(key, &value);
        if projected > self.quota_bytes {
            return Err(Error::QuotaExceeded(format!(
                "fallback store: writing {key} needs {projected} of {} bytes",
                self.quota_bytes
            )));
        }
        entries.insert(key.to_string(), value);
        self.write_file(&entries)
    }

    pub fn remove_item(&self, key: &str) -> Result<(), Error> {
        let mut entries = self.lock();
        if entries.remove(key).is_some() {
            self.write_file(&entries)?;
        }
        Ok(())
    }

    /// Remove every key starting with `prefix`, returning how many were removed.
    pub fn remove_prefixed(&self, prefix: &str) -> Result<usize, Error> {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(prefix));
        let removed = before - entries.len();
        if removed > 0 {
            self.write_file(&entries)?;
        }
        Ok(removed)
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// Bytes used by keys starting with `prefix`.
    pub fn usage_bytes(&self, prefix: &str) -> u64 {
        self.lock()
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| entry_bytes(k, v))
            .sum()
    }

    fn write_file(&self, entries: &BTreeMap<String, String>) -> Result<(), Error> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec(entries)?;
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}
