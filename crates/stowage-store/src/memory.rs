//! In-process storage areas
//!
//! `MemoryStorage` backs two areas: the unbounded in-memory fallback, which
//! never rejects a write, and the session area, which enforces a quota the
//! same way a host does. Neither survives a process restart.

use crate::backend::{ChangeFeed, WebStorage};
use crate::quota::QuotaMeter;
use crossbeam_channel::Receiver;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use stowage_common::{Result, StorageArea, StorageEvent};

#[derive(Debug, Default)]
struct MapState {
    entries: BTreeMap<String, String>,
    /// `None` for the unbounded fallback
    meter: Option<QuotaMeter>,
}

/// Map-backed storage area
#[derive(Debug)]
pub struct MemoryStorage {
    area: StorageArea,
    state: RwLock<MapState>,
    feed: ChangeFeed,
}

impl MemoryStorage {
    /// Unbounded in-memory fallback area
    pub fn new() -> Self {
        Self {
            area: StorageArea::Memory,
            state: RwLock::new(MapState::default()),
            feed: ChangeFeed::new(),
        }
    }

    /// Session area holding at most `quota` code units
    pub fn session(quota: usize) -> Self {
        Self::with_quota(StorageArea::Session, quota)
    }

    /// Quota-bound map standing in for `area`
    pub fn with_quota(area: StorageArea, quota: usize) -> Self {
        Self {
            area,
            state: RwLock::new(MapState {
                entries: BTreeMap::new(),
                meter: Some(QuotaMeter::new(quota)),
            }),
            feed: ChangeFeed::new(),
        }
    }

    /// Code units currently billed against the quota
    pub fn quota_used(&self) -> Option<usize> {
        self.state.read().meter.map(|m| m.used())
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl WebStorage for MemoryStorage {
    fn area(&self) -> StorageArea {
        self.area
    }

    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.state.read().entries.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let old = {
            let mut state = self.state.write();
            let MapState { entries, meter } = &mut *state;
            if let Some(meter) = meter.as_mut() {
                let usage =
                    meter.usage_after_set(key, entries.get(key).map(String::as_str), value)?;
                meter.commit(usage);
            }
            entries.insert(key.to_string(), value.to_string())
        };
        self.feed
            .publish_change(self.area, key, old, Some(value.to_string()));
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        let old = {
            let mut state = self.state.write();
            let old = state.entries.remove(key);
            if let (Some(meter), Some(old)) = (state.meter.as_mut(), old.as_deref()) {
                meter.release(key, old);
            }
            old
        };
        if old.is_some() {
            self.feed.publish_change(self.area, key, old, None);
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        {
            let mut state = self.state.write();
            state.entries.clear();
            if let Some(meter) = state.meter.as_mut() {
                meter.reset();
            }
        }
        self.feed.publish_clear(self.area);
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.state.read().entries.len())
    }

    fn key(&self, index: usize) -> Result<Option<String>> {
        Ok(self.state.read().entries.keys().nth(index).cloned())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.state.read().entries.keys().cloned().collect())
    }

    fn entries(&self) -> Result<Vec<(String, String)>> {
        Ok(self
            .state
            .read()
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn subscribe(&self) -> Receiver<StorageEvent> {
        self.feed.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_operations() {
        let store = MemoryStorage::new();
        assert!(store.is_empty().unwrap());

        store.set_item("b", "2").unwrap();
        store.set_item("a", "1").unwrap();

        assert_eq!(store.get_item("a").unwrap().as_deref(), Some("1"));
        assert_eq!(store.len().unwrap(), 2);
        assert_eq!(store.key(0).unwrap().as_deref(), Some("a"));
        assert_eq!(store.key(2).unwrap(), None);
        assert_eq!(store.keys().unwrap(), vec!["a", "b"]);

        store.remove_item("a").unwrap();
        store.remove_item("missing").unwrap();
        assert_eq!(store.get_item("a").unwrap(), None);

        store.clear().unwrap();
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_fallback_never_overflows() {
        let store = MemoryStorage::new();
        let big = "0".repeat(12_000_000);
        store.set_item("big", &big).unwrap();
        assert_eq!(store.quota_used(), None);
    }

    #[test]
    fn test_session_quota() {
        // mirrors a host configured with a 10000 code unit quota
        let store = MemoryStorage::session(10_000);
        store.set_item("foo", "00000").unwrap();
        store.set_item("foo", &"0".repeat(9_995)).unwrap();

        let err = store.set_item("foo", &"0".repeat(15_000)).unwrap_err();
        assert!(err.is_quota_exceeded());
        // failed write leaves the old value in place
        assert_eq!(store.get_item("foo").unwrap().unwrap().len(), 9_995);
        assert_eq!(store.quota_used(), Some(9_998));
    }

    #[test]
    fn test_remove_releases_quota() {
        let store = MemoryStorage::session(100);
        store.set_item("k", &"x".repeat(90)).unwrap();
        assert!(store.set_item("j", &"x".repeat(20)).is_err());
        store.remove_item("k").unwrap();
        store.set_item("j", &"x".repeat(20)).unwrap();
        assert_eq!(store.quota_used(), Some(21));
    }

    #[test]
    fn test_events() {
        let store = MemoryStorage::session(1_000);
        let rx = store.subscribe();

        store.set_item("k", "1").unwrap();
        store.set_item("k", "2").unwrap();
        store.remove_item("k").unwrap();
        store.remove_item("k").unwrap();
        store.clear().unwrap();

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 4);
        assert_eq!(events[1].old_value.as_deref(), Some("1"));
        assert_eq!(events[1].new_value.as_deref(), Some("2"));
        assert_eq!(events[2].new_value, None);
        assert_eq!(events[3].key, None);
        assert!(events.iter().all(|e| e.area == StorageArea::Session));
    }
}
