//! Quota metering
//!
//! Hosts bill web storage by the UTF-16 length of keys plus values. The
//! meter keeps the running total for one area and decides whether a write
//! fits before it is applied.

use stowage_common::units::utf16_len;
use stowage_common::{Error, Result};

/// Running usage of a quota-bound area
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaMeter {
    quota: usize,
    used: usize,
}

impl QuotaMeter {
    /// Empty meter with `quota` code units available
    pub const fn new(quota: usize) -> Self {
        Self { quota, used: 0 }
    }

    /// Code units a key/value pair occupies
    pub fn cost(key: &str, value: &str) -> usize {
        utf16_len(key) + utf16_len(value)
    }

    pub const fn quota(&self) -> usize {
        self.quota
    }

    pub const fn used(&self) -> usize {
        self.used
    }

    /// Usage after replacing `old` (if any) with `value` under `key`
    ///
    /// Fails with `CapacityExceeded` when the result would exceed the quota.
    pub fn usage_after_set(&self, key: &str, old: Option<&str>, value: &str) -> Result<usize> {
        let released = old.map_or(0, |old| Self::cost(key, old));
        let required = self.used.saturating_sub(released) + Self::cost(key, value);
        if required > self.quota {
            return Err(Error::CapacityExceeded {
                required,
                quota: self.quota,
            });
        }
        Ok(required)
    }

    /// Record a write previously validated by [`Self::usage_after_set`]
    pub const fn commit(&mut self, usage: usize) {
        self.used = usage;
    }

    /// Give back the space held by a removed pair
    pub fn release(&mut self, key: &str, value: &str) {
        self.used = self.used.saturating_sub(Self::cost(key, value));
    }

    /// Add the space held by an existing pair (used when rebuilding)
    pub fn charge(&mut self, key: &str, value: &str) {
        self.used += Self::cost(key, value);
    }

    pub const fn reset(&mut self) {
        self.used = 0;
    }
}
