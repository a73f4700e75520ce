//! Read-only access to VM definitions.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use vmkeeper_shared::errors::{VmkeeperError, VmkeeperResult};

use super::VmDefinition;

/// Lookup of VM definitions by name.
///
/// The engine only reads through this trait; creating, editing and deleting
/// definitions belongs to whoever owns the store.
pub trait DefinitionStore: Send + Sync {
    /// Returns `Ok(None)` if no definition with that name exists.
    fn get(&self, name: &str) -> VmkeeperResult<Option<VmDefinition>>;

    /// All definitions, sorted by name.
    fn list(&self) -> VmkeeperResult<Vec<VmDefinition>>;
}

/// In-process store backed by a map.
#[derive(Default)]
pub struct MemoryDefinitionStore {
    vms: RwLock<HashMap<String, VmDefinition>>,
}

impl MemoryDefinitionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a definition.
    pub fn insert(&self, definition: VmDefinition) {
        self.vms.write().insert(definition.name.clone(), definition);
    }

    pub fn remove(&self, name: &str) -> Option<VmDefinition> {
        self.vms.write().remove(name)
    }
}

impl FromIterator<VmDefinition> for MemoryDefinitionStore {
    fn from_iter<I: IntoIterator<Item = VmDefinition>>(iter: I) -> Self {
        let store = Self::new();
        for def in iter {
            store.insert(def);
        }
        store
    }
}

impl DefinitionStore for MemoryDefinitionStore {
    fn get(&self, name: &str) -> VmkeeperResult<Option<VmDefinition>> {
        Ok(self.vms.read().get(name).cloned())
    }

    fn list(&self) -> VmkeeperResult<Vec<VmDefinition>> {
        let mut list: Vec<VmDefinition> = self.vms.read().values().cloned().collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(list)
    }
}

/// Store that loads every `*.yaml` file of a directory.
///
/// Files are read once at open time and on [`reload`](Self::reload).
/// Files that fail to parse are skipped with a warning.
pub struct DirectoryDefinitionStore {
    dir: PathBuf,
    inner: MemoryDefinitionStore,
}

impl DirectoryDefinitionStore {
    /// Open the store, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> VmkeeperResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            VmkeeperError::Storage(format!(
                "Failed to create definition directory {}: {}",
                dir.display(),
                e
            ))
        })?;

        let store = Self {
            dir,
            inner: MemoryDefinitionStore::new(),
        };
        store.reload()?;
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Re-read the directory. Returns the number of definitions loaded.
    pub fn reload(&self) -> VmkeeperResult<usize> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| {
            VmkeeperError::Storage(format!("Failed to read {}: {}", self.dir.display(), e))
        })?;

        let mut loaded = HashMap::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                continue;
            }
            match load_definition(&path) {
                Ok(def) => {
                    tracing::debug!(vm = %def.name, path = %path.display(), "Loaded VM definition");
                    loaded.insert(def.name.clone(), def);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping VM definition");
                }
            }
        }

        let count = loaded.len();
        *self.inner.vms.write() = loaded;
        Ok(count)
    }
}

fn load_definition(path: &Path) -> VmkeeperResult<VmDefinition> {
    let data = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&data)
        .map_err(|e| VmkeeperError::Storage(format!("{}: {}", path.display(), e)))
}

impl DefinitionStore for DirectoryDefinitionStore {
    fn get(&self, name: &str) -> VmkeeperResult<Option<VmDefinition>> {
        self.inner.get(name)
    }

    fn list(&self) -> VmkeeperResult<Vec<VmDefinition>> {
        self.inner.list()
    }
}
