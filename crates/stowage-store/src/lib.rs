//! Stowage Store - Backing store adapters
//!
//! This crate implements the key/value areas Stowage manages:
//! - `WebStorage`, the uniform capability surface every area exposes
//! - Change feed delivering mutation events to subscribers
//! - Unbounded in-memory fallback and quota-bound session area
//! - Persistent area backed by redb
//! - Quota metering in UTF-16 code units

pub mod backend;
pub mod memory;
pub mod persistent;
pub mod quota;

// Re-exports
pub use backend::{ChangeFeed, WebStorage};
pub use memory::MemoryStorage;
pub use persistent::PersistentStorage;
pub use quota::QuotaMeter;
