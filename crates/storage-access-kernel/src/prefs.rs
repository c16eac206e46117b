//! Persisted preferences: the granted root and its access type.
//!
//! The store has one writer (the permission flow) and many readers (the
//! classifier resolving the app directory). It promises nothing beyond an
//! atomic commit per `set_all`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use storage_access_types::{AccessType, GrantedRoot, StorageError, StorageResult};

/// Key of the granted tree URI.
pub const KEY_SAVED_URI: &str = "saved_uri";
/// Key of the access type the grant was made with.
pub const KEY_ACCESS_TYPE: &str = "access_type";

/// Minimal key-value store.
pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Set several keys in one commit.
    fn set_all(&self, entries: &[(&str, &str)]) -> StorageResult<()> {
        for (key, value) in entries {
            self.set(key, value)?;
        }
        Ok(())
    }

    /// Remove every key.
    fn clear(&self) -> StorageResult<()>;
}

/// Read the persisted grant, if any.
///
/// An unreadable access type falls back to the default rather than hiding
/// the grant.
pub fn load_grant(store: &dyn PreferenceStore) -> Option<GrantedRoot> {
    let uri = store.get(KEY_SAVED_URI).filter(|u| !u.is_empty())?;
    let access_type = store
        .get(KEY_ACCESS_TYPE)
        .and_then(|raw| match raw.parse::<AccessType>() {
            Ok(t) => Some(t),
            Err(e) => {
                tracing::warn!(%raw, error = %e, "ignoring stored access type");
                None
            }
        })
        .unwrap_or_default();
    Some(GrantedRoot { uri, access_type })
}

/// Persist a grant.
pub fn save_grant(store: &dyn PreferenceStore, grant: &GrantedRoot) -> StorageResult<()> {
    store.set_all(&[
        (KEY_SAVED_URI, grant.uri.as_str()),
        (KEY_ACCESS_TYPE, grant.access_type.as_str()),
    ])
}

fn poisoned() -> StorageError {
    StorageError::Io("preference lock poisoned".into())
}

/// In-memory store for tests and embedders without persistence.
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    values: RwLock<BTreeMap<String, String>>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferences {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.values
            .write()
            .map_err(|_| poisoned())?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn clear(&self) -> StorageResult<()> {
        self.values.write().map_err(|_| poisoned())?.clear();
        Ok(())
    }
}

/// JSON file store.
///
/// Every commit writes a sibling temp file and renames it over the target,
/// so readers see either the old or the new content.
#[derive(Debug)]
pub struct FilePreferences {
    path: PathBuf,
    values: RwLock<BTreeMap<String, String>>,
}

impl FilePreferences {
    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        let values = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                StorageError::Io(format!("corrupt preferences {}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn commit(&self, values: &BTreeMap<String, String>) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(values)
            .map_err(|e| StorageError::Io(format!("failed to encode preferences: {e}")))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        Ok(())
    }

    fn update(&self, apply: impl FnOnce(&mut BTreeMap<String, String>)) -> StorageResult<()> {
        let mut values = self.values.write().map_err(|_| poisoned())?;
        let mut next = values.clone();
        apply(&mut next);
        self.commit(&next)?;
        *values = next;
        Ok(())
    }
}

impl PreferenceStore for FilePreferences {
    fn get(&self, key: &str) -> Option<String> {
        self.values.read().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.update(|values| {
            values.insert(key.to_string(), value.to_string());
        })
    }

    fn set_all(&self, entries: &[(&str, &str)]) -> StorageResult<()> {
        self.update(|values| {
            for (key, value) in entries {
                values.insert(key.to_string(), value.to_string());
            }
        })
    }

    fn clear(&self) -> StorageResult<()> {
        self.update(BTreeMap::clear)
    }
}
