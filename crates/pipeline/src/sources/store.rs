//! JSON-file key-value store and the settings provider built on it.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::SystemTime;

use serde_json::{Map, Value};
use tracing::{info, warn};

use super::SettingsProvider;
use crate::error::{PipelineError, Result};

/// Settings key: filtering is switched off entirely.
pub const FILTERING_DISABLED_KEY: &str = "filtering-disabled";
/// Settings key: allow-list exempts listed domains (`false` = inverted).
pub const DEFAULT_WHITELIST_MODE_KEY: &str = "default-whitelist-mode";

#[derive(Debug, Default)]
struct Snapshot {
    items: Map<String, Value>,
    modified: Option<SystemTime>,
}

/// Persistent string-keyed store backed by a single JSON object file.
///
/// Reads are served from memory; the file is re-read when its modification
/// time changes so edits made by other processes are picked up. Writes go
/// to a dot-prefixed temp file that is renamed over the target.
#[derive(Debug)]
pub struct KeyValueStore {
    path: PathBuf,
    state: RwLock<Snapshot>,
}

impl KeyValueStore {
    /// Open the store, reading the file if it exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let snapshot = read_snapshot(&path)?;
        Ok(Self {
            path,
            state: RwLock::new(snapshot),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get_item(&self, key: &str) -> Option<Value> {
        self.refresh();
        self.read().items.get(key).cloned()
    }

    pub fn has_item(&self, key: &str) -> bool {
        self.refresh();
        self.read().items.contains_key(key)
    }

    /// Set a key and persist. Keys written by other processes since the last
    /// read are kept.
    pub fn set_item(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        let mut state = self.write();
        self.reload(&mut state);
        state.items.insert(key.to_string(), value.into());
        state.modified = self.persist(&state.items)?;
        Ok(())
    }

    /// Remove a key, returning whether it was present.
    pub fn remove_item(&self, key: &str) -> Result<bool> {
        let mut state = self.write();
        self.reload(&mut state);
        let removed = state.items.remove(key).is_some();
        if removed {
            state.modified = self.persist(&state.items)?;
        }
        Ok(removed)
    }

    fn refresh(&self) {
        if modified_time(&self.path) == self.read().modified {
            return;
        }
        let mut state = self.write();
        // another reader may have reloaded while we waited for the lock
        if modified_time(&self.path) != state.modified {
            info!(path = %self.path.display(), "settings file changed, reloading");
            self.reload(&mut state);
        }
    }

    /// Replace `state` with the file contents. Writers call this
    /// unconditionally: mtime has timestamp-tick granularity.
    fn reload(&self, state: &mut Snapshot) {
        match read_snapshot(&self.path) {
            Ok(snapshot) => *state = snapshot,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to reload settings, keeping previous values");
            }
        }
    }

    fn persist(&self, items: &Map<String, Value>) -> Result<Option<SystemTime>> {
        let file_name = self
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("store.json");
        let tmp_path = self.path.with_file_name(format!(".{file_name}.tmp"));

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&tmp_path, serde_json::to_vec_pretty(items)?)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(modified_time(&self.path))
    }

    fn read(&self) -> RwLockReadGuard<'_, Snapshot> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Snapshot> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn read_snapshot(path: &Path) -> Result<Snapshot> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Snapshot::default()),
        Err(e) => return Err(e.into()),
    };
    let items = match serde_json::from_str::<Value>(&contents)? {
        Value::Object(map) => map,
        other => {
            return Err(PipelineError::source_failed(
                "settings",
                format!("{} must contain a JSON object, found {}", path.display(), other),
            ))
        }
    };
    Ok(Snapshot {
        items,
        modified: modified_time(path),
    })
}

/// [`SettingsProvider`] reading its flags from a [`KeyValueStore`].
///
/// Missing or non-boolean values fall back to: filtering enabled, default
/// allow-list mode.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    store: Arc<KeyValueStore>,
}

impl StoreSettings {
    pub fn new(store: Arc<KeyValueStore>) -> Self {
        Self { store }
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        self.store
            .get_item(key)
            .and_then(|v| v.as_bool())
            .unwrap_or(default)
    }
}

impl SettingsProvider for StoreSettings {
    fn is_filtering_disabled(&self) -> bool {
        self.flag(FILTERING_DISABLED_KEY, false)
    }

    fn is_default_white_list_mode(&self) -> bool {
        self.flag(DEFAULT_WHITELIST_MODE_KEY, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_store() -> (TempDir, KeyValueStore) {
        let dir = TempDir::new().expect("create tempdir");
        let store = KeyValueStore::open(dir.path().join("settings.json")).unwrap();
        (dir, store)
    }

    #[test]
    fn set_get_remove_roundtrip_persists() {
        let (dir, store) = temp_store();
        assert!(!store.has_item("k"));

        store.set_item("k", true).unwrap();
        assert_eq!(store.get_item("k"), Some(Value::Bool(true)));

        let reopened = KeyValueStore::open(dir.path().join("settings.json")).unwrap();
        assert!(reopened.has_item("k"));

        assert!(store.remove_item("k").unwrap());
        assert!(!store.remove_item("k").unwrap());
        assert!(!store.has_item("k"));
    }

    #[test]
    fn temp_file_is_not_left_behind() {
        let (dir, store) = temp_store();
        store.set_item("a", 1).unwrap();
        assert!(!dir.path().join(".settings.json.tmp").exists());
    }

    #[test]
    fn writes_keep_keys_set_by_another_store() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        let first = KeyValueStore::open(&path).unwrap();
        let second = KeyValueStore::open(&path).unwrap();

        first.set_item("a", 1).unwrap();
        second.set_item("b", 2).unwrap();

        let reopened = KeyValueStore::open(&path).unwrap();
        assert_eq!(reopened.get_item("a"), Some(Value::from(1)));
        assert_eq!(reopened.get_item("b"), Some(Value::from(2)));

        assert!(first.remove_item("b").unwrap());
        let reopened = KeyValueStore::open(&path).unwrap();
        assert_eq!(reopened.get_item("a"), Some(Value::from(1)));
        assert!(!reopened.has_item("b"));
    }

    #[test]
    fn non_object_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "[1, 2]").unwrap();
        assert!(KeyValueStore::open(&path).is_err());
    }

    #[test]
    fn settings_defaults_and_overrides() {
        let (_dir, store) = temp_store();
        let store = Arc::new(store);
        let settings = StoreSettings::new(Arc::clone(&store));
        assert!(!settings.is_filtering_disabled());
        assert!(settings.is_default_white_list_mode());

        store.set_item(FILTERING_DISABLED_KEY, true).unwrap();
        store.set_item(DEFAULT_WHITELIST_MODE_KEY, false).unwrap();
        assert!(settings.is_filtering_disabled());
        assert!(!settings.is_default_white_list_mode());

        store.set_item(FILTERING_DISABLED_KEY, "yes").unwrap();
        assert!(!settings.is_filtering_disabled());
    }
}
