//! Preference storage for persisted access tokens
//!
//! The OAuth clients persist their current token under
//! `"<protocol>_<profile>"` after every change. The store is injected as an
//! `Arc<dyn PreferenceStore>` so tests and hosts can pick the backing.
//!
//! `FileStore` keeps a JSON object on disk. All writes use atomic temp-file
//! + rename to prevent corruption on crash, and a Mutex serializes writers.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde_json::Value;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Synchronous key-value store for JSON preference values.
///
/// Setting `Value::Null` removes the key. Implementations must be safe to
/// call from any thread.
pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>>;

    fn set(&self, key: &str, value: Value) -> Result<()>;
}

/// Build the store key for a protocol prefix and profile name.
pub fn preference_key(prefix: &str, profile: &str) -> String {
    format!("{prefix}_{profile}")
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Writers only insert or remove a single key; a poisoned map is consistent.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-process store. Contents are lost on drop.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.values).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PreferenceStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(lock(&self.values).get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut values = lock(&self.values);
        if value.is_null() {
            values.remove(key);
        } else {
            values.insert(key.to_string(), value);
        }
        Ok(())
    }
}

/// JSON-file store.
///
/// The whole file is read once at `open`; every `set` rewrites it.
pub struct FileStore {
    path: PathBuf,
    state: Mutex<HashMap<String, Value>>,
}

impl FileStore {
    /// Open the store at `path`.
    ///
    /// If the file doesn't exist, creates it as `{}`.
    pub fn open(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| Error::Store(format!("reading {}: {e}", path.display())))?;
            let values: HashMap<String, Value> = serde_json::from_str(&contents)
                .map_err(|e| Error::Store(format!("parsing {}: {e}", path.display())))?;
            info!(path = %path.display(), keys = values.len(), "loaded preference store");
            values
        } else {
            info!(path = %path.display(), "preference file not found, starting empty");
            let values = HashMap::new();
            write_atomic(&path, &values)?;
            values
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All stored keys.
    pub fn keys(&self) -> Vec<String> {
        lock(&self.state).keys().cloned().collect()
    }
}

impl PreferenceStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(lock(&self.state).get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut state = lock(&self.state);
        if value.is_null() {
            if state.remove(key).is_none() {
                return Ok(());
            }
            debug!(key, "removed preference");
        } else {
            state.insert(key.to_string(), value);
            debug!(key, "stored preference");
        }
        write_atomic(&self.path, &state)
    }
}

/// Write the map to `path` atomically with owner-only permissions.
fn write_atomic(path: &Path, data: &HashMap<String, Value>) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::Store(format!("serializing preferences: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Store("preference path has no parent directory".into()))?;
    let tmp_path = dir.join(format!(".preferences.tmp.{}", std::process::id()));

    std::fs::write(&tmp_path, json.as_bytes())
        .map_err(|e| Error::Store(format!("writing temp preference file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))
            .map_err(|e| Error::Store(format!("setting preference file permissions: {e}")))?;
    }

    std::fs::rename(&tmp_path, path)
        .map_err(|e| Error::Store(format!("renaming temp preference file: {e}")))?;

    debug!(path = %path.display(), "persisted preferences");
    Ok(())
}
