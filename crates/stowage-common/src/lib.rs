//! Stowage Common - Shared types and utilities
//!
//! This crate provides the storage area identifiers, the quota unit
//! arithmetic, the stored entry envelope, error definitions and
//! configuration used across all Stowage components.

pub mod config;
pub mod error;
pub mod types;
pub mod units;

pub use config::StowageConfig;
pub use error::{Error, Result};
pub use types::*;
pub use units::Units;
