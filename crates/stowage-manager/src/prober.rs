//! Capacity probing
//!
//! Hosts do not expose how much a storage area can hold, so the prober
//! measures it: it fills the emptied area with fixed-size filler entries
//! until the area rejects a write, then puts the original content back.
//! The result is cached inside the area under [`STORE_SPACE_KEY`], so the
//! destructive measurement runs once per area lifetime.
//!
//! The measurement is not atomic with respect to other agents sharing the
//! area: they observe it empty or partially restored while it runs.

use crate::clock::{Clock, SystemClock};
use crate::registry::StorageRegistry;
use serde_json::Value;
use std::sync::Arc;
use stowage_common::config::ProbeConfig;
use stowage_common::{Entry, Error, Result, STORE_SPACE_KEY, StorageArea, Units};
use stowage_store::WebStorage;
use tracing::{debug, error, info, warn};

/// Probed capacity of the host's bounded areas
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavigatorSpace {
    pub persistent: Units,
    pub session: Units,
}

/// Measures and caches storage area capacity
#[derive(Clone)]
pub struct CapacityProber {
    config: ProbeConfig,
    clock: Arc<dyn Clock>,
}

impl CapacityProber {
    pub fn new(config: ProbeConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    /// Total capacity of the area behind `storage`
    ///
    /// Returns the cached record when present; otherwise measures the area
    /// and caches the result. The in-memory fallback is unbounded and is
    /// never measured.
    pub fn probe(&self, storage: &dyn WebStorage) -> Result<Units> {
        let area = storage.area();
        if !area.is_bounded() {
            return Ok(Units::UNBOUNDED);
        }

        if let Some(total) = self.cached(storage)? {
            debug!("Using cached capacity of {} units for {}", total, area);
            return Ok(total);
        }

        let total = self.measure(storage)?;
        if let Err(e) = self.record(storage, total) {
            // the measurement stands; the next call measures again
            warn!("Failed to cache capacity of {}: {}", area, e);
        }
        info!("Probed {} capacity: {} units", area, total);
        Ok(total)
    }

    /// Probe the area registered for `area`
    pub fn probe_area(&self, registry: &StorageRegistry, area: StorageArea) -> Result<Units> {
        let storage = registry.get(area).ok_or(Error::UnsupportedArea(area))?;
        self.probe(storage.as_ref())
    }

    /// Capacities of the persistent and session areas
    pub fn navigator_space(&self, registry: &StorageRegistry) -> Result<NavigatorSpace> {
        Ok(NavigatorSpace {
            persistent: self.probe_area(registry, StorageArea::Persistent)?,
            session: self.probe_area(registry, StorageArea::Session)?,
        })
    }

    /// Capacity cached inside the area, if a live record exists
    pub fn cached(&self, storage: &dyn WebStorage) -> Result<Option<Units>> {
        let Some(raw) = storage.get_item(STORE_SPACE_KEY)? else {
            return Ok(None);
        };

        let entry = match Entry::parse(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(
                    "Ignoring malformed capacity record in {}: {}",
                    storage.area(),
                    e
                );
                return Ok(None);
            }
        };
        if entry.is_expired(self.clock.now_millis()) {
            debug!("Capacity record in {} has expired", storage.area());
            return Ok(None);
        }

        match entry.data {
            Value::Number(n) => Ok(n.as_u64().map(Units::from_whole)),
            other => {
                warn!(
                    "Ignoring capacity record in {} with non-integer data {}",
                    storage.area(),
                    other
                );
                Ok(None)
            }
        }
    }

    /// Write the capacity record for `total` into the area
    ///
    /// Unbounded areas carry no record.
    pub fn record(&self, storage: &dyn WebStorage, total: Units) -> Result<()> {
        if total.is_unbounded() {
            return Ok(());
        }
        let record = Entry::new(Value::from(total.whole()));
        storage.set_item(STORE_SPACE_KEY, &record.to_json()?)
    }

    /// Snapshot, fill, restore
    fn measure(&self, storage: &dyn WebStorage) -> Result<Units> {
        let snapshot = storage.entries()?;
        storage.clear()?;

        let filled = self.fill(storage);
        let restored = restore(storage, &snapshot);
        if let Err(e) = &restored {
            error!(
                "Failed to restore {} entries of {} after probing: {}",
                snapshot.len(),
                storage.area(),
                e
            );
        }

        let writes = filled?;
        restored?;
        Ok(Units::from_whole(writes))
    }

    /// Number of filler writes the area accepts before its first rejection
    ///
    /// The rejected attempt is not counted. An area that never rejects
    /// within the ceiling reports the ceiling.
    fn fill(&self, storage: &dyn WebStorage) -> Result<u64> {
        let filler = "a".repeat(self.config.filler_len);
        for i in 0..self.config.max_writes {
            match storage.set_item(&i.to_string(), &filler) {
                Ok(()) => {}
                Err(e) if e.is_quota_exceeded() => {
                    debug!("{} rejected filler write {}: {}", storage.area(), i, e);
                    return Ok(i);
                }
                Err(e) => return Err(e),
            }
        }
        debug!(
            "{} accepted all {} filler writes",
            storage.area(),
            self.config.max_writes
        );
        Ok(self.config.max_writes)
    }
}

impl Default for CapacityProber {
    fn default() -> Self {
        Self::new(ProbeConfig::default(), Arc::new(SystemClock))
    }
}

/// Replace the area's content with `snapshot`, verbatim
fn restore(storage: &dyn WebStorage, snapshot: &[(String, String)]) -> Result<()> {
    storage.clear()?;
    for (key, value) in snapshot {
        storage.set_item(key, value)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crossbeam_channel::Receiver;
    use stowage_common::StorageEvent;
    use stowage_store::{MemoryStorage, PersistentStorage};

    fn prober() -> CapacityProber {
        CapacityProber::default()
    }

    /// Session area that fails with a backend error on one key
    struct FlakyStorage {
        inner: MemoryStorage,
        poisoned: &'static str,
    }

    impl WebStorage for FlakyStorage {
        fn area(&self) -> StorageArea {
            self.inner.area()
        }
        fn get_item(&self, key: &str) -> Result<Option<String>> {
            self.inner.get_item(key)
        }
        fn set_item(&self, key: &str, value: &str) -> Result<()> {
            if key == self.poisoned {
                return Err(Error::backend("disk on fire"));
            }
            self.inner.set_item(key, value)
        }
        fn remove_item(&self, key: &str) -> Result<()> {
            self.inner.remove_item(key)
        }
        fn clear(&self) -> Result<()> {
            self.inner.clear()
        }
        fn len(&self) -> Result<usize> {
            self.inner.len()
        }
        fn key(&self, index: usize) -> Result<Option<String>> {
            self.inner.key(index)
        }
        fn keys(&self) -> Result<Vec<String>> {
            self.inner.keys()
        }
        fn entries(&self) -> Result<Vec<(String, String)>> {
            self.inner.entries()
        }
        fn subscribe(&self) -> Receiver<StorageEvent> {
            self.inner.subscribe()
        }
    }

    #[test]
    fn test_default_host_quota() {
        // 5,000,000 code units hold 4864 fillers of 1024 chars plus their keys
        let storage = MemoryStorage::session(5_000_000);
        assert_eq!(prober().probe(&storage).unwrap(), Units::from_whole(4_864));
    }

    #[test]
    fn test_probe_caches_record() {
        let storage = MemoryStorage::session(50_000);
        let total = prober().probe(&storage).unwrap();
        assert_eq!(total, Units::from_whole(48));
        assert_eq!(
            storage.get_item(STORE_SPACE_KEY).unwrap().as_deref(),
            Some(r#"{"data":48,"expires":0}"#)
        );
        assert_eq!(prober().cached(&storage).unwrap(), Some(total));
    }

    #[test]
    fn test_probe_is_idempotent_and_preserves_content() {
        let storage = MemoryStorage::session(50_000);
        storage.set_item("user", r#"{"data":"ada","expires":0}"#).unwrap();
        storage.set_item("0", "not a filler").unwrap();

        let first = prober().probe(&storage).unwrap();

        let rx = storage.subscribe();
        let second = prober().probe(&storage).unwrap();
        assert_eq!(first, second);
        // second call performs no writes
        assert!(rx.try_recv().is_err());

        assert_eq!(
            storage.get_item("user").unwrap().as_deref(),
            Some(r#"{"data":"ada","expires":0}"#)
        );
        assert_eq!(storage.get_item("0").unwrap().as_deref(), Some("not a filler"));
        assert_eq!(storage.keys().unwrap(), vec!["0", STORE_SPACE_KEY, "user"]);
    }

    #[test]
    fn test_probe_fresh_persistent_area() {
        let dir = tempfile::tempdir().unwrap();
        let storage = PersistentStorage::open(dir.path().join("local.redb"), 20_000).unwrap();

        assert_eq!(prober().probe(&storage).unwrap(), Units::from_whole(19));
        assert_eq!(storage.keys().unwrap(), vec![STORE_SPACE_KEY]);
    }

    #[test]
    fn test_full_area_keeps_measurement_without_record() {
        // the restored content leaves no room for the capacity record
        let storage = MemoryStorage::session(20_000);
        storage.set_item("big", &"b".repeat(19_990)).unwrap();

        assert_eq!(prober().probe(&storage).unwrap(), Units::from_whole(19));
        assert_eq!(storage.get_item(STORE_SPACE_KEY).unwrap(), None);
        assert_eq!(storage.keys().unwrap(), vec!["big"]);
    }

    #[test]
    fn test_memory_area_is_unbounded() {
        let storage = MemoryStorage::new();
        assert_eq!(prober().probe(&storage).unwrap(), Units::UNBOUNDED);
        assert!(storage.is_empty().unwrap());
    }

    #[test]
    fn test_ceiling() {
        let storage = MemoryStorage::session(usize::MAX);
        let prober = CapacityProber::new(
            ProbeConfig {
                filler_len: 1024,
                max_writes: 16,
            },
            Arc::new(SystemClock),
        );
        assert_eq!(prober.probe(&storage).unwrap(), Units::from_whole(16));
        assert_eq!(storage.keys().unwrap(), vec![STORE_SPACE_KEY]);
    }

    #[test]
    fn test_expired_record_is_reprobed() {
        let clock = ManualClock::new(10_000);
        let prober = CapacityProber::new(ProbeConfig::default(), Arc::new(clock.clone()));
        let storage = MemoryStorage::session(50_000);
        storage
            .set_item(STORE_SPACE_KEY, r#"{"data":7,"expires":9000}"#)
            .unwrap();

        assert_eq!(prober.probe(&storage).unwrap(), Units::from_whole(48));

        // a record that is still live wins over measurement
        storage
            .set_item(STORE_SPACE_KEY, r#"{"data":7,"expires":20000}"#)
            .unwrap();
        assert_eq!(prober.probe(&storage).unwrap(), Units::from_whole(7));
    }

    #[test]
    fn test_malformed_record_is_reprobed() {
        let storage = MemoryStorage::session(50_000);
        storage.set_item(STORE_SPACE_KEY, "4864").unwrap();
        assert_eq!(prober().probe(&storage).unwrap(), Units::from_whole(48));

        storage.set_item(STORE_SPACE_KEY, "[4864,0]").unwrap();
        assert_eq!(prober().probe(&storage).unwrap(), Units::from_whole(48));
    }

    #[test]
    fn test_failure_restores_content() {
        let storage = FlakyStorage {
            inner: MemoryStorage::session(50_000),
            poisoned: "3",
        };
        storage.inner.set_item("keep", "me").unwrap();

        let err = prober().probe(&storage).unwrap_err();
        assert!(matches!(err, Error::Backend(_)));
        assert_eq!(
            storage.entries().unwrap(),
            vec![("keep".to_string(), "me".to_string())]
        );
    }

    #[test]
    fn test_navigator_space() {
        let registry = StorageRegistry::new()
            .with_area(Arc::new(MemoryStorage::session(50_000)))
            .with_area(Arc::new(MemoryStorage::with_quota(
                StorageArea::Persistent,
                20_000,
            )));
        let space = prober().navigator_space(&registry).unwrap();
        assert_eq!(space.persistent, Units::from_whole(19));
        assert_eq!(space.session, Units::from_whole(48));

        let err = prober()
            .navigator_space(&StorageRegistry::new())
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedArea(StorageArea::Persistent)));
    }
}
