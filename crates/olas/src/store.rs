//! Local persistence of known services.

use crate::error::{LifecycleError, LifecycleResult};
use crate::service::Service;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Keeps services between runs, keyed by `network:service_id`.
pub trait ServiceStore: Send + Sync {
    /// Looks up a service.
    fn load(&self, key: &str) -> Option<Service>;

    /// Inserts or replaces a service.
    fn save(&self, service: &Service) -> LifecycleResult<()>;

    /// Every stored service.
    fn list(&self) -> Vec<Service>;

    /// Marks a stored service as the one commands act on by default.
    fn set_active(&self, key: &str) -> LifecycleResult<()>;

    /// The active service, if any.
    fn active(&self) -> Option<Service>;
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    services: BTreeMap<String, Service>,
    #[serde(default)]
    active: Option<String>,
}

/// A [`ServiceStore`] backed by one JSON file.
///
/// Every mutation rewrites the file through a temporary sibling and a rename.
#[derive(Debug)]
pub struct JsonServiceStore {
    path: PathBuf,
    contents: Mutex<StoreFile>,
}

impl JsonServiceStore {
    /// Opens the store at `path`, starting empty when the file does not exist.
    pub fn open(path: impl Into<PathBuf>) -> LifecycleResult<Self> {
        let path = path.into();
        let contents = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| LifecycleError::store(format!("read {}: {e}", path.display())))?;
            serde_json::from_str(&raw)
                .map_err(|e| LifecycleError::store(format!("parse {}: {e}", path.display())))?
        } else {
            StoreFile::default()
        };
        Ok(Self {
            path,
            contents: Mutex::new(contents),
        })
    }

    /// File backing the store.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, contents: &StoreFile) -> LifecycleResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| LifecycleError::store(format!("create {}: {e}", parent.display())))?;
        }
        let raw = serde_json::to_string_pretty(contents)
            .map_err(|e| LifecycleError::store(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, raw)
            .map_err(|e| LifecycleError::store(format!("write {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| LifecycleError::store(format!("rename to {}: {e}", self.path.display())))?;
        debug!(path = %self.path.display(), services = contents.services.len(), "service store written");
        Ok(())
    }
}

impl ServiceStore for JsonServiceStore {
    fn load(&self, key: &str) -> Option<Service> {
        self.contents.lock().services.get(key).cloned()
    }

    fn save(&self, service: &Service) -> LifecycleResult<()> {
        let mut contents = self.contents.lock();
        contents.services.insert(service.key(), service.clone());
        self.persist(&contents)
    }

    fn list(&self) -> Vec<Service> {
        self.contents.lock().services.values().cloned().collect()
    }

    fn set_active(&self, key: &str) -> LifecycleResult<()> {
        let mut contents = self.contents.lock();
        if !contents.services.contains_key(key) {
            return Err(LifecycleError::store(format!("unknown service {key}")));
        }
        contents.active = Some(key.to_string());
        self.persist(&contents)
    }

    fn active(&self) -> Option<Service> {
        let contents = self.contents.lock();
        let key = contents.active.as_ref()?;
        contents.services.get(key).cloned()
    }
}
