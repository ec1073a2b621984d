//! Entry manager
//!
//! `WebStorageManager` is the public get/set/remove/clear surface over one
//! storage area. Values are stored as JSON inside an [`Entry`] envelope
//! that carries their expiration time. Every write is checked against the
//! area's remaining space before it reaches the backing store, and the
//! space account is updated incrementally afterwards.

use crate::accountant::SpaceAccount;
use crate::availability::check_availability;
use crate::clock::{Clock, SystemClock};
use crate::prober::CapacityProber;
use crate::registry::StorageRegistry;
use crossbeam_channel::Receiver;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use stowage_common::config::ProbeConfig;
use stowage_common::units::utf16_len;
use stowage_common::{Entry, Error, Result, StorageArea, StorageEvent, Units};
use stowage_store::WebStorage;
use tracing::{debug, error, warn};

/// Observer of mutations made to the area by any agent
pub type ChangeObserver = Box<dyn FnMut(&StorageEvent) + Send>;

/// Construction options shared by every manager of a host
#[derive(Clone)]
pub struct ManagerOptions {
    pub probe: ProbeConfig,
    pub clock: Arc<dyn Clock>,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            probe: ProbeConfig::default(),
            clock: Arc::new(SystemClock),
        }
    }
}

/// Capacity-aware manager bound to one storage area
pub struct WebStorageManager {
    area: StorageArea,
    storage: Arc<dyn WebStorage>,
    prober: CapacityProber,
    clock: Arc<dyn Clock>,
    space: SpaceAccount,
    events: Option<Receiver<StorageEvent>>,
    observer: Option<ChangeObserver>,
}

impl WebStorageManager {
    /// Bind to `area`, failing if it is unsupported or unusable
    pub fn open(registry: &StorageRegistry, area: StorageArea) -> Result<Self> {
        Self::open_with(registry, area, ManagerOptions::default())
    }

    /// [`Self::open`] with explicit options
    pub fn open_with(
        registry: &StorageRegistry,
        area: StorageArea,
        options: ManagerOptions,
    ) -> Result<Self> {
        let storage = check_availability(registry, area)?;
        let manager = Self::bind(storage, options);
        // Measure (or load the cached capacity) up front
        manager.total_units()?;
        Ok(manager)
    }

    /// Bind to `area`, or to the in-memory fallback if that fails
    pub fn get_instance(registry: &StorageRegistry, area: StorageArea) -> Self {
        Self::get_instance_with(registry, area, ManagerOptions::default())
    }

    /// [`Self::get_instance`] with explicit options
    pub fn get_instance_with(
        registry: &StorageRegistry,
        area: StorageArea,
        options: ManagerOptions,
    ) -> Self {
        match Self::open_with(registry, area, options.clone()) {
            Ok(manager) => manager,
            Err(e) => {
                error!("{}", e);
                warn!(
                    "Using \"{}\", your changes will be lost if you refresh.",
                    StorageArea::Memory
                );
                Self::bind(registry.memory(), options)
            }
        }
    }

    fn bind(storage: Arc<dyn WebStorage>, options: ManagerOptions) -> Self {
        Self {
            area: storage.area(),
            prober: CapacityProber::new(options.probe, Arc::clone(&options.clock)),
            clock: options.clock,
            storage,
            space: SpaceAccount::new(),
            events: None,
            observer: None,
        }
    }

    /// Area this manager is bound to
    pub const fn area(&self) -> StorageArea {
        self.area
    }

    // ---- Entries ----

    /// Store `value` under `key` without expiration
    pub fn set_item<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<()> {
        self.set_value(key, Some(serde_json::to_value(value)?), None)
    }

    /// Store `value` under `key`, expiring `ttl` from now
    pub fn set_item_with_ttl<T: Serialize + ?Sized>(
        &mut self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<()> {
        self.set_value(key, Some(serde_json::to_value(value)?), Some(ttl))
    }

    /// Store a JSON value under `key`
    ///
    /// `None` is the absent value (as opposed to `Value::Null`) and is
    /// rejected with `InvalidValue`. A zero `ttl` means no expiration.
    /// Fails with `InsufficientSpace` when the serialized entry is not
    /// strictly smaller than the space available to it; the stored content
    /// is then left untouched.
    pub fn set_value(&mut self, key: &str, value: Option<Value>, ttl: Option<Duration>) -> Result<()> {
        let value = value.ok_or(Error::InvalidValue)?;
        let ttl_ms = ttl.map_or(0, |ttl| u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX));
        let entry = Entry::with_ttl(value, self.clock.now_millis(), ttl_ms);
        let raw = entry.to_json()?;
        let size = entry_size(key, &raw)?;

        let previous = self
            .storage
            .get_item(key)?
            .map(|old| entry_size(key, &old))
            .transpose()?;
        let available = self.available_units()?;
        if size >= available {
            return Err(Error::InsufficientSpace {
                area: self.area,
                required: size,
                available,
            });
        }

        self.storage.set_item(key, &raw)?;
        if let Some(previous) = previous {
            self.space.account_removal(previous);
        }
        self.space.account_insertion(size);
        debug!("Stored {} ({} units) in {}", key, size, self.area);
        Ok(())
    }

    /// Value stored under `key`, or `None` if absent
    ///
    /// An expired entry is removed (freeing its space) and reported as
    /// `ExpiredKey`.
    pub fn get_item<T: DeserializeOwned>(&mut self, key: &str) -> Result<Option<T>> {
        match self.get_value(key)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// JSON value stored under `key`, or `None` if absent
    pub fn get_value(&mut self, key: &str) -> Result<Option<Value>> {
        let Some(raw) = self.storage.get_item(key)? else {
            return Ok(None);
        };
        let entry = decode_entry(raw);
        if entry.is_expired(self.clock.now_millis()) {
            debug!("Evicting expired key {} from {}", key, self.area);
            self.remove_item(key)?;
            return Err(Error::ExpiredKey(key.to_string()));
        }
        Ok(Some(entry.data))
    }

    /// Delete `key`, failing with `UnknownKey` if it is absent
    pub fn remove_item(&mut self, key: &str) -> Result<()> {
        let Some(raw) = self.storage.get_item(key)? else {
            return Err(Error::UnknownKey {
                area: self.area,
                key: key.to_string(),
            });
        };
        let size = entry_size(key, &raw)?;

        // Resolve before mutating so the removal is applied as a delta
        self.available_units()?;
        self.storage.remove_item(key)?;
        self.space.account_removal(size);
        Ok(())
    }

    /// Delete every entry
    ///
    /// The capacity record is written back so the area is not measured
    /// again.
    pub fn clear(&mut self) -> Result<()> {
        let total = self.total_units()?;
        self.storage.clear()?;
        self.prober.record(self.storage.as_ref(), total)?;
        self.space.reset(total);
        Ok(())
    }

    /// Whether `key` is stored
    ///
    /// Expiry is not evaluated: an expired entry still counts until it is
    /// read.
    pub fn has_item(&self, key: &str) -> Result<bool> {
        Ok(self.storage.get_item(key)?.is_some())
    }

    /// Number of stored keys, the capacity record included
    pub fn len(&self) -> Result<usize> {
        self.storage.len()
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.storage.is_empty()
    }

    /// Key at `index` in the area's enumeration order
    pub fn key(&self, index: usize) -> Result<Option<String>> {
        self.storage.key(index)
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        self.storage.keys()
    }

    /// Every stored key with its raw value
    pub fn content(&self) -> Result<Vec<(String, String)>> {
        self.storage.entries()
    }

    /// The area's content as a JSON object of raw values
    pub fn to_json_string(&self) -> Result<String> {
        serialize_content(self.storage.as_ref())
    }

    // ---- Space ----

    /// Capacity of the area
    pub fn total_units(&self) -> Result<Units> {
        self.prober.probe(self.storage.as_ref())
    }

    /// Space taken by the area's content
    pub fn used_units(&mut self) -> Result<Units> {
        let storage = self.storage.as_ref();
        self.space.used_units(|| content_units(storage))
    }

    /// Space left in the area
    pub fn available_units(&mut self) -> Result<Units> {
        let storage = self.storage.as_ref();
        let prober = &self.prober;
        self.space
            .available_units(|| content_units(storage), || prober.probe(storage))
    }

    /// Space taken by the entry under `key`, or `None` if absent
    pub fn used_space_for(&self, key: &str) -> Result<Option<Units>> {
        self.storage
            .get_item(key)?
            .map(|raw| entry_size(key, &raw))
            .transpose()
    }

    /// Current space account, without resolving it
    pub const fn space(&self) -> &SpaceAccount {
        &self.space
    }

    // ---- Change notification ----

    /// Register the observer of changes made to the area
    ///
    /// Replaces any previous observer. Events are delivered by
    /// [`Self::dispatch_events`].
    pub fn on_change(&mut self, observer: impl FnMut(&StorageEvent) + Send + 'static) {
        if self.events.is_none() {
            self.events = Some(self.storage.subscribe());
        }
        self.observer = Some(Box::new(observer));
    }

    /// Deliver every pending change event to the observer
    ///
    /// Each event invalidates the space account first, since the change
    /// may not have gone through this manager. Returns the number of events
    /// delivered.
    pub fn dispatch_events(&mut self) -> usize {
        let Some(events) = self.events.as_ref() else {
            return 0;
        };
        let mut delivered = 0;
        for event in events.try_iter() {
            self.space.invalidate();
            if let Some(observer) = self.observer.as_mut() {
                observer(&event);
            }
            delivered += 1;
        }
        delivered
    }
}

impl fmt::Debug for WebStorageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebStorageManager")
            .field("area", &self.area)
            .field("space", &self.space)
            .field("observing", &self.observer.is_some())
            .finish_non_exhaustive()
    }
}

/// Units an entry adds to the serialized content, `"key":"raw",`
///
/// Kept in step with [`serialize_content`] so the incremental account
/// matches a rescan of the area.
fn entry_size(key: &str, raw: &str) -> Result<Units> {
    let key = serde_json::to_string(key)?;
    let raw = serde_json::to_string(raw)?;
    Ok(Units::from_chars(utf16_len(&key) + utf16_len(&raw) + 2))
}

/// Read a stored value, tolerating values written without the envelope
fn decode_entry(raw: String) -> Entry {
    if let Ok(entry) = Entry::parse(&raw) {
        return entry;
    }
    match serde_json::from_str(&raw) {
        Ok(value) => Entry::new(value),
        Err(_) => Entry::new(Value::String(raw)),
    }
}

fn serialize_content(storage: &dyn WebStorage) -> Result<String> {
    let content: Map<String, Value> = storage
        .entries()?
        .into_iter()
        .map(|(key, value)| (key, Value::String(value)))
        .collect();
    Ok(serde_json::to_string(&content)?)
}

/// Units taken by the area's serialized content
fn content_units(storage: &dyn WebStorage) -> Result<Units> {
    Ok(Units::of_str(&serialize_content(storage)?))
}
