//! Small persistent key-value storage.
//!
//! Notification preferences and the terminal permission decision survive
//! restarts through a [`KeyValueStore`]. [`FileStore`] keeps a flat JSON
//! object on disk; [`MemoryStore`] is the in-process double used by tests.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// String key-value storage.
pub trait KeyValueStore: Send + std::fmt::Debug {
    /// Read the value stored under `key`.
    fn get(&self, key: &str) -> Option<String>;

    /// Store `value` under `key`, replacing any previous value.
    fn set(&mut self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`. Removing a missing key is not an error.
    fn remove(&mut self, key: &str) -> Result<()>;

    /// Pick up changes made by other writers. Stores without a backing
    /// file have nothing to do.
    fn reload(&mut self) -> Result<()> {
        Ok(())
    }
}

/// JSON-file backed store.
///
/// The whole map is rewritten on every change. Files are created with
/// owner-only permissions on Unix.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl FileStore {
    /// Open (or lazily create) the store at `path`.
    ///
    /// A missing file yields an empty store. A corrupt file is logged and
    /// treated as empty; it is overwritten on the next write.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = read_entries(&path)?;
        Ok(Self { path, entries })
    }

    /// Location of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        // Write aside and rename so concurrent readers never see a partial file
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, serde_json::to_string_pretty(&self.entries)?)
            .with_context(|| format!("Failed to write store {}", staging.display()))?;

        #[cfg(unix)]
        fs::set_permissions(&staging, fs::Permissions::from_mode(0o600))?;

        fs::rename(&staging, &self.path)
            .with_context(|| format!("Failed to replace store {}", self.path.display()))?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        self.flush()
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        if self.entries.remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }

    fn reload(&mut self) -> Result<()> {
        self.entries = read_entries(&self.path)?;
        Ok(())
    }
}

fn read_entries(path: &Path) -> Result<BTreeMap<String, String>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read store {}", path.display()))?;
    match serde_json::from_str(&content) {
        Ok(entries) => Ok(entries),
        Err(e) => {
            log::warn!("[Storage] Ignoring corrupt store {}: {}", path.display(), e);
            Ok(BTreeMap::new())
        }
    }
}

/// In-memory store for tests.
///
/// Clones share the same map, so a test can inspect what the component
/// under test persisted.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<BTreeMap<String, String>>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.lock().remove(key);
        Ok(())
    }
}
