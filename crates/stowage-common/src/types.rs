//! Core types for Stowage

use crate::error::{Error, Result};
use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Reserved key under which an area caches its own probed capacity
pub const STORE_SPACE_KEY: &str = "StoreSpace";

/// `expires` value of an entry that never expires
pub const NEVER_EXPIRES: u64 = 0;

/// One selectable storage backend
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum StorageArea {
    /// Survives process restarts
    #[default]
    #[serde(rename = "localStorage", alias = "persistent")]
    Persistent,
    /// Lives as long as the session that created it
    #[serde(rename = "sessionStorage", alias = "session")]
    Session,
    /// In-memory fallback, unbounded and never persisted
    #[serde(rename = "windowStorage", alias = "memory")]
    Memory,
}

impl StorageArea {
    /// Every area, in selection order
    pub const ALL: [Self; 3] = [Self::Persistent, Self::Session, Self::Memory];

    /// Host name of the area
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Persistent => "localStorage",
            Self::Session => "sessionStorage",
            Self::Memory => "windowStorage",
        }
    }

    /// Whether the area enforces a quota that has to be probed
    #[must_use]
    pub const fn is_bounded(self) -> bool {
        !matches!(self, Self::Memory)
    }
}

impl fmt::Display for StorageArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageArea {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "localStorage" | "persistent" | "local" => Ok(Self::Persistent),
            "sessionStorage" | "session" => Ok(Self::Session),
            "windowStorage" | "memory" | "window" => Ok(Self::Memory),
            other => Err(Error::configuration(format!(
                "unknown storage area \"{other}\""
            ))),
        }
    }
}

/// Stored envelope around a value: `{"data": <value>, "expires": <ms>}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub data: Value,
    /// Milliseconds since the epoch, or [`NEVER_EXPIRES`]
    pub expires: u64,
}

impl Entry {
    /// Wrap a value that never expires
    #[must_use]
    pub const fn new(data: Value) -> Self {
        Self {
            data,
            expires: NEVER_EXPIRES,
        }
    }

    /// Wrap a value that expires `ttl_ms` after `now_ms`
    ///
    /// A zero TTL means the entry never expires.
    #[must_use]
    pub const fn with_ttl(data: Value, now_ms: u64, ttl_ms: u64) -> Self {
        let expires = if ttl_ms == 0 {
            NEVER_EXPIRES
        } else {
            now_ms.saturating_add(ttl_ms)
        };
        Self { data, expires }
    }

    /// Check whether the entry is logically gone at `now_ms`
    #[must_use]
    pub const fn is_expired(&self, now_ms: u64) -> bool {
        self.expires != NEVER_EXPIRES && self.expires <= now_ms
    }

    /// Serialize to the stored string form
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a stored string
    ///
    /// Only a JSON object is an entry; serde would otherwise also accept
    /// a two-element array as the struct.
    pub fn parse(raw: &str) -> Result<Self> {
        match serde_json::from_str(raw)? {
            value @ Value::Object(_) => Ok(serde_json::from_value(value)?),
            other => Err(serde_json::Error::custom(format!(
                "expected an entry object, found {other}"
            ))
            .into()),
        }
    }
}

/// A mutation observed on a backing store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    /// Area the mutation happened in
    pub area: StorageArea,
    /// Key that changed, `None` when the whole area was cleared
    pub key: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_area_names() {
        for area in StorageArea::ALL {
            assert_eq!(area.as_str().parse::<StorageArea>().unwrap(), area);
        }
        assert_eq!(
            "session".parse::<StorageArea>().unwrap(),
            StorageArea::Session
        );
        assert!("cookies".parse::<StorageArea>().is_err());
        assert!(!StorageArea::Memory.is_bounded());
        assert!(StorageArea::Persistent.is_bounded());
    }

    #[test]
    fn test_entry_wire_format() {
        let entry = Entry::new(json!({"a": 1}));
        assert_eq!(entry.to_json().unwrap(), r#"{"data":{"a":1},"expires":0}"#);

        let parsed = Entry::parse(r#"{"data":4864,"expires":0}"#).unwrap();
        assert_eq!(parsed.data, json!(4864));
        assert_eq!(parsed.expires, NEVER_EXPIRES);
    }

    #[test]
    fn test_entry_expiry() {
        let entry = Entry::with_ttl(json!("v"), 1_000, 5_000);
        assert_eq!(entry.expires, 6_000);
        assert!(!entry.is_expired(5_999));
        assert!(entry.is_expired(6_000));

        let forever = Entry::with_ttl(json!("v"), 1_000, 0);
        assert!(!forever.is_expired(u64::MAX));
    }

    #[test]
    fn test_parse_rejects_raw_values() {
        assert!(Entry::parse("plain text").is_err());
        assert!(Entry::parse("4864").is_err());
    }

    #[test]
    fn test_parse_rejects_arrays() {
        assert!(Entry::parse("[1,2]").is_err());
        assert!(Entry::parse("[4864,0]").is_err());
    }

    #[test]
    fn test_default_area() {
        assert_eq!(StorageArea::default(), StorageArea::Persistent);
    }
}
