//! Area registry
//!
//! Maps each storage area to the one adapter instance that implements it.
//! Managers are handed their adapter from here at construction; an area
//! missing from the registry is one the host does not support. The
//! in-memory fallback is always present.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use stowage_common::config::StorageConfig;
use stowage_common::StorageArea;
use stowage_store::{MemoryStorage, PersistentStorage, WebStorage};
use tracing::warn;

/// Adapters available to managers, keyed by area
#[derive(Clone)]
pub struct StorageRegistry {
    areas: BTreeMap<StorageArea, Arc<dyn WebStorage>>,
    memory: Arc<dyn WebStorage>,
}

impl StorageRegistry {
    /// Registry with only the in-memory fallback
    pub fn new() -> Self {
        Self {
            areas: BTreeMap::new(),
            memory: Arc::new(MemoryStorage::new()),
        }
    }

    /// Registry with all three areas opened as configured
    ///
    /// A persistent area that cannot be opened is left out, so selecting it
    /// later reports it as unsupported.
    pub fn from_config(config: &StorageConfig) -> Self {
        let mut registry =
            Self::new().with_area(Arc::new(MemoryStorage::session(config.session_quota)));
        match PersistentStorage::open(&config.persistent_path, config.persistent_quota) {
            Ok(storage) => registry.register(Arc::new(storage)),
            Err(e) => warn!(
                "Persistent storage at {:?} is disabled: {}",
                config.persistent_path, e
            ),
        }
        registry
    }

    /// Builder form of [`Self::register`]
    #[must_use]
    pub fn with_area(mut self, storage: Arc<dyn WebStorage>) -> Self {
        self.register(storage);
        self
    }

    /// Bind an adapter to the area it implements, replacing any previous one
    pub fn register(&mut self, storage: Arc<dyn WebStorage>) {
        let area = storage.area();
        if area == StorageArea::Memory {
            self.memory = storage;
        } else {
            self.areas.insert(area, storage);
        }
    }

    /// Adapter for `area`, if the host supports it
    pub fn get(&self, area: StorageArea) -> Option<Arc<dyn WebStorage>> {
        if area == StorageArea::Memory {
            return Some(Arc::clone(&self.memory));
        }
        self.areas.get(&area).cloned()
    }

    /// The in-memory fallback adapter
    pub fn memory(&self) -> Arc<dyn WebStorage> {
        Arc::clone(&self.memory)
    }

    pub fn contains(&self, area: StorageArea) -> bool {
        area == StorageArea::Memory || self.areas.contains_key(&area)
    }

    /// Supported areas in selection order
    pub fn areas(&self) -> Vec<StorageArea> {
        StorageArea::ALL
            .into_iter()
            .filter(|area| self.contains(*area))
            .collect()
    }
}

impl Default for StorageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StorageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageRegistry")
            .field("areas", &self.areas())
            .finish()
    }
}
