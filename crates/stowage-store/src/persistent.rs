//! Persistent storage area using Redb
//!
//! Stores every key/value pair of the area in a single table so the area
//! survives process restarts. The quota meter is rebuilt from the file on
//! open and enforced before every write.

use crate::backend::{ChangeFeed, WebStorage};
use crate::quota::QuotaMeter;
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use redb::{Database, ReadableTable, TableDefinition};
use std::fmt::Display;
use std::path::Path;
use stowage_common::{Error, Result, StorageArea, StorageEvent};
use tracing::debug;

/// Entries: key (str) → raw stored value (str)
const ENTRIES: TableDefinition<&str, &str> = TableDefinition::new("entries");

/// Map any redb error into the common backend error
trait BackendExt<T> {
    fn backend(self) -> Result<T>;
}

impl<T, E: Display> BackendExt<T> for std::result::Result<T, E> {
    fn backend(self) -> Result<T> {
        self.map_err(Error::backend)
    }
}

/// Persistent area backed by Redb
pub struct PersistentStorage {
    db: Database,
    /// Held for the duration of every write so check and apply are atomic
    meter: Mutex<QuotaMeter>,
    feed: ChangeFeed,
}

impl PersistentStorage {
    /// Open (or create) the area at `path` with a quota of `quota` code units
    pub fn open(path: impl AsRef<Path>, quota: usize) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).backend()?;

        // Ensure the table exists so read txns never fail on a fresh file
        let wtx = db.begin_write().backend()?;
        wtx.open_table(ENTRIES).backend()?;
        wtx.commit().backend()?;

        let storage = Self {
            db,
            meter: Mutex::new(QuotaMeter::new(quota)),
            feed: ChangeFeed::new(),
        };
        storage.rebuild_meter()?;
        debug!(
            "Opened persistent storage at {:?} ({} of {} code units used)",
            path,
            storage.quota_used(),
            quota
        );
        Ok(storage)
    }

    /// Code units currently billed against the quota
    pub fn quota_used(&self) -> usize {
        self.meter.lock().used()
    }

    fn rebuild_meter(&self) -> Result<()> {
        let mut meter = self.meter.lock();
        meter.reset();
        for (key, value) in self.entries()? {
            meter.charge(&key, &value);
        }
        Ok(())
    }
}

impl WebStorage for PersistentStorage {
    fn area(&self) -> StorageArea {
        StorageArea::Persistent
    }

    fn get_item(&self, key: &str) -> Result<Option<String>> {
        let rtx = self.db.begin_read().backend()?;
        let table = rtx.open_table(ENTRIES).backend()?;
        Ok(table.get(key).backend()?.map(|v| v.value().to_string()))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let mut meter = self.meter.lock();
        let wtx = self.db.begin_write().backend()?;
        let old = {
            let mut table = wtx.open_table(ENTRIES).backend()?;
            let old = table.get(key).backend()?.map(|v| v.value().to_string());
            // On failure the uncommitted transaction is dropped and aborted
            let usage = meter.usage_after_set(key, old.as_deref(), value)?;
            table.insert(key, value).backend()?;
            meter.commit(usage);
            old
        };
        if let Err(e) = wtx.commit() {
            drop(meter);
            self.rebuild_meter()?;
            return Err(Error::backend(e));
        }
        drop(meter);

        self.feed
            .publish_change(StorageArea::Persistent, key, old, Some(value.to_string()));
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        let mut meter = self.meter.lock();
        let wtx = self.db.begin_write().backend()?;
        let old = wtx
            .open_table(ENTRIES)
            .backend()?
            .remove(key)
            .backend()?
            .map(|v| v.value().to_string());
        wtx.commit().backend()?;
        if let Some(old) = old.as_deref() {
            meter.release(key, old);
        }
        drop(meter);

        if old.is_some() {
            self.feed
                .publish_change(StorageArea::Persistent, key, old, None);
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut meter = self.meter.lock();
        let wtx = self.db.begin_write().backend()?;
        {
            let mut table = wtx.open_table(ENTRIES).backend()?;
            let keys: Vec<String> = table
                .iter()
                .backend()?
                .map(|entry| entry.map(|(k, _)| k.value().to_string()))
                .collect::<std::result::Result<Vec<String>, _>>()
                .backend()?;
            for key in &keys {
                table.remove(key.as_str()).backend()?;
            }
        }
        wtx.commit().backend()?;
        meter.reset();
        drop(meter);

        self.feed.publish_clear(StorageArea::Persistent);
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        let rtx = self.db.begin_read().backend()?;
        let table = rtx.open_table(ENTRIES).backend()?;
        Ok(table.iter().backend()?.count())
    }

    fn key(&self, index: usize) -> Result<Option<String>> {
        let rtx = self.db.begin_read().backend()?;
        let table = rtx.open_table(ENTRIES).backend()?;
        match table.iter().backend()?.nth(index) {
            Some(entry) => {
                let (k, _) = entry.backend()?;
                Ok(Some(k.value().to_string()))
            }
            None => Ok(None),
        }
    }

    fn keys(&self) -> Result<Vec<String>> {
        let rtx = self.db.begin_read().backend()?;
        let table = rtx.open_table(ENTRIES).backend()?;
        let mut keys = Vec::new();
        for entry in table.iter().backend()? {
            let (k, _) = entry.backend()?;
            keys.push(k.value().to_string());
        }
        Ok(keys)
    }

    fn entries(&self) -> Result<Vec<(String, String)>> {
        let rtx = self.db.begin_read().backend()?;
        let table = rtx.open_table(ENTRIES).backend()?;
        let mut entries = Vec::new();
        for entry in table.iter().backend()? {
            let (k, v) = entry.backend()?;
            entries.push((k.value().to_string(), v.value().to_string()));
        }
        Ok(entries)
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
        let dir = tempfile::tempdir().unwrap();
        let store = PersistentStorage::open(dir.path().join("local.redb"), 1_000).unwrap();

        store.set_item("b", "2").unwrap();
        store.set_item("a", "1").unwrap();
        assert_eq!(store.get_item("b").unwrap().as_deref(), Some("2"));
        assert_eq!(store.len().unwrap(), 2);
        assert_eq!(store.key(0).unwrap().as_deref(), Some("a"));
        assert_eq!(store.key(5).unwrap(), None);
        assert_eq!(
            store.entries().unwrap(),
            vec![("a".into(), "1".into()), ("b".into(), "2".into())]
        );

        store.remove_item("a").unwrap();
        store.remove_item("a").unwrap();
        assert_eq!(store.keys().unwrap(), vec!["b"]);

        store.clear().unwrap();
        assert!(store.is_empty().unwrap());
        assert_eq!(store.quota_used(), 0);
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("local.redb");
        {
            let store = PersistentStorage::open(&path, 1_000).unwrap();
            store.set_item("user", r#"{"data":"ada","expires":0}"#).unwrap();
        }

        let store = PersistentStorage::open(&path, 1_000).unwrap();
        assert_eq!(
            store.get_item("user").unwrap().as_deref(),
            Some(r#"{"data":"ada","expires":0}"#)
        );
        // usage is rebuilt from the file
        assert_eq!(store.quota_used(), 4 + 26);
    }

    #[test]
    fn test_quota_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistentStorage::open(dir.path().join("local.redb"), 100).unwrap();

        store.set_item("k", &"x".repeat(60)).unwrap();
        let err = store.set_item("j", &"x".repeat(60)).unwrap_err();
        assert!(err.is_quota_exceeded());
        assert_eq!(store.get_item("j").unwrap(), None);
        assert_eq!(store.quota_used(), 61);

        // overwriting in place credits the old value
        store.set_item("k", &"y".repeat(99)).unwrap();
        assert_eq!(store.quota_used(), 100);
    }

    #[test]
    fn test_events() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistentStorage::open(dir.path().join("local.redb"), 100).unwrap();
        let rx = store.subscribe();

        store.set_item("k", "v").unwrap();
        store.remove_item("k").unwrap();
        store.clear().unwrap();

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].area, StorageArea::Persistent);
        assert_eq!(events[1].old_value.as_deref(), Some("v"));
        assert_eq!(events[2].key, None);
    }
}
