//! Backing store contract
//!
//! Every storage area exposes the same capability surface. Adapters are
//! shared between all managers bound to the same area, so every method
//! takes `&self` and implementations synchronize internally.

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use stowage_common::{Result, StorageArea, StorageEvent};

/// Uniform key/value surface of one storage area
pub trait WebStorage: Send + Sync {
    /// Area this adapter implements
    fn area(&self) -> StorageArea;

    /// Raw value stored under `key`
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`
    ///
    /// Fails with `Error::CapacityExceeded` when the area is full, in which
    /// case the area is left unchanged.
    fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`; removing an absent key is a no-op
    fn remove_item(&self, key: &str) -> Result<()>;

    /// Remove every key
    fn clear(&self) -> Result<()>;

    /// Number of stored keys
    fn len(&self) -> Result<usize>;

    /// Key at `index` in the area's enumeration order
    fn key(&self, index: usize) -> Result<Option<String>>;

    /// All keys in enumeration order
    fn keys(&self) -> Result<Vec<String>>;

    /// Snapshot of every key/value pair in enumeration order
    fn entries(&self) -> Result<Vec<(String, String)>>;

    /// Receive an event for every later mutation of this area
    fn subscribe(&self) -> Receiver<StorageEvent>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// Fan-out of storage events to subscribers
///
/// Delivery is asynchronous: events queue in each subscriber's channel
/// until the subscriber drains it. Subscribers that dropped their receiver
/// are pruned on the next publish.
#[derive(Debug, Default)]
pub struct ChangeFeed {
    subscribers: Mutex<Vec<Sender<StorageEvent>>>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber
    pub fn subscribe(&self) -> Receiver<StorageEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Deliver an event to every live subscriber
    pub fn publish(&self, event: StorageEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Publish a single-key mutation
    pub fn publish_change(
        &self,
        area: StorageArea,
        key: &str,
        old_value: Option<String>,
        new_value: Option<String>,
    ) {
        if self.is_idle() {
            return;
        }
        self.publish(StorageEvent {
            area,
            key: Some(key.to_string()),
            old_value,
            new_value,
        });
    }

    /// Publish the clearing of a whole area
    pub fn publish_clear(&self, area: StorageArea) {
        self.publish(StorageEvent {
            area,
            key: None,
            old_value: None,
            new_value: None,
        });
    }

    fn is_idle(&self) -> bool {
        self.subscribers.lock().is_empty()
    }
}
