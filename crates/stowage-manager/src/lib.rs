//! Stowage Manager - Capacity-aware web storage
//!
//! This crate layers quota awareness on top of the backing store adapters:
//! - Capacity probing, cached inside each area under a sentinel key
//! - Incremental used/available space accounting
//! - Entries with optional expiration
//! - Change notification relay to a single observer
//! - Area registry and availability checks with in-memory fallback
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │  WebStorageManager   │  get/set/remove/clear, expiry, observer
//! └───┬──────────────┬───┘
//!     │              │
//! ┌───▼──────────┐ ┌─▼─────────────┐
//! │ SpaceAccount │ │CapacityProber │
//! └───┬──────────┘ └─┬─────────────┘
//!     │              │
//! ┌───▼──────────────▼───┐
//! │  WebStorage adapter  │  (persistent / session / memory)
//! └──────────────────────┘
//! ```

pub mod accountant;
pub mod availability;
pub mod clock;
pub mod manager;
pub mod prober;
pub mod registry;

pub use accountant::{Cached, SpaceAccount};
pub use availability::check_availability;
pub use clock::{Clock, ManualClock, SystemClock};
pub use manager::{ManagerOptions, WebStorageManager};
pub use prober::{CapacityProber, NavigatorSpace};
pub use registry::StorageRegistry;
