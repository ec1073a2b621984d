//! Space accounting
//!
//! A manager keeps a running account of the space its area uses and has
//! left. Both counters are resolved lazily from the stored content and then
//! kept current incrementally, so ordinary writes never rescan the area.
//! Anything this manager did not account for itself (a bulk operation, a
//! change made by another agent) invalidates the account, and the next
//! read re-derives it.

use stowage_common::{Result, Units};

/// A lazily computed value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cached<T> {
    Resolved(T),
    #[default]
    Unresolved,
}

impl<T: Copy> Cached<T> {
    /// The value, if resolved
    pub const fn get(&self) -> Option<T> {
        match self {
            Self::Resolved(value) => Some(*value),
            Self::Unresolved => None,
        }
    }

    /// The value, computing and caching it first if needed
    pub fn get_or_resolve(&mut self, resolve: impl FnOnce() -> Result<T>) -> Result<T> {
        if let Self::Resolved(value) = self {
            return Ok(*value);
        }
        let value = resolve()?;
        *self = Self::Resolved(value);
        Ok(value)
    }
}

/// Used/available counters of one manager
///
/// `used + available == total` whenever both are resolved and the stored
/// content fits the probed capacity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpaceAccount {
    used: Cached<Units>,
    available: Cached<Units>,
}

impl SpaceAccount {
    pub fn new() -> Self {
        Self::default()
    }

    /// Space in use; `measure` derives it from the stored content
    ///
    /// A derived value is floored to whole units, so rounding never leaks
    /// space over repeated rescans.
    pub fn used_units(&mut self, measure: impl FnOnce() -> Result<Units>) -> Result<Units> {
        self.used.get_or_resolve(|| measure().map(Units::floor))
    }

    /// Space left; derived as `total - used` when unresolved
    ///
    /// Probed totals are whole, so a derived value is whole as well.
    pub fn available_units(
        &mut self,
        measure: impl FnOnce() -> Result<Units>,
        total: impl FnOnce() -> Result<Units>,
    ) -> Result<Units> {
        if let Some(available) = self.available.get() {
            return Ok(available);
        }
        let used = self.used_units(measure)?;
        let available = total()?.saturating_sub(used);
        self.available = Cached::Resolved(available);
        Ok(available)
    }

    /// Record a write of `size`
    ///
    /// Callers resolve the account before writing. If it is unresolved, it
    /// stays that way: the next read derives it from content that already
    /// includes the write.
    pub fn account_insertion(&mut self, size: Units) {
        if let (Cached::Resolved(used), Cached::Resolved(available)) = (self.used, self.available)
        {
            self.used = Cached::Resolved(used.saturating_add(size));
            self.available = Cached::Resolved(available.saturating_sub(size));
        }
    }

    /// Record the removal of an entry of `size`
    pub fn account_removal(&mut self, size: Units) {
        if let (Cached::Resolved(used), Cached::Resolved(available)) = (self.used, self.available)
        {
            self.used = Cached::Resolved(used.saturating_sub(size));
            self.available = Cached::Resolved(available.saturating_add(size));
        }
    }

    /// Forget both counters
    pub fn invalidate(&mut self) {
        self.used = Cached::Unresolved;
        self.available = Cached::Unresolved;
    }

    /// Account for an empty area of capacity `total`
    pub fn reset(&mut self, total: Units) {
        self.used = Cached::Resolved(Units::ZERO);
        self.available = Cached::Resolved(total);
    }

    /// Current counters without resolving them
    pub const fn peek(&self) -> (Option<Units>, Option<Units>) {
        (self.used.get(), self.available.get())
    }
}
