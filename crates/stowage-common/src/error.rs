//! Error types for Stowage
//!
//! This module defines the common error types used throughout the system.

use crate::types::StorageArea;
use crate::units::Units;
use thiserror::Error;

/// Common result type for Stowage operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for Stowage
#[derive(Debug, Error)]
pub enum Error {
    // Area selection errors
    #[error("web storage \"{0}\" is not supported")]
    UnsupportedArea(StorageArea),

    #[error("web storage \"{0}\" is not available")]
    AreaUnavailable(StorageArea),

    #[error("web storage \"{0}\" has no available space")]
    NoAvailableSpace(StorageArea),

    // Backing store contract
    #[error("storage quota exceeded: write needs {required} code units, quota is {quota}")]
    CapacityExceeded { required: usize, quota: usize },

    // Entry errors
    #[error("\"undefined\" is not an allowed value")]
    InvalidValue,

    #[error(
        "there is not enough space in web storage \"{area}\": required {required}, available {available}"
    )]
    InsufficientSpace {
        area: StorageArea,
        required: Units,
        available: Units,
    },

    #[error("key \"{0}\" has expired")]
    ExpiredKey(String),

    #[error("web storage \"{area}\" has no \"{key}\" key")]
    UnknownKey { area: StorageArea, key: String },

    // Plumbing
    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Create a backend error from anything displayable
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Check if a backing store rejected a write because its quota is full
    #[must_use]
    pub const fn is_quota_exceeded(&self) -> bool {
        matches!(self, Self::CapacityExceeded { .. })
    }

    /// Check if this is a not found error
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::UnknownKey { .. } | Self::ExpiredKey(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_quota_exceeded() {
        assert!(
            Error::CapacityExceeded {
                required: 10,
                quota: 5
            }
            .is_quota_exceeded()
        );
        assert!(!Error::InvalidValue.is_quota_exceeded());
    }

    #[test]
    fn test_error_not_found() {
        assert!(
            Error::UnknownKey {
                area: StorageArea::Session,
                key: "k".into()
            }
            .is_not_found()
        );
        assert!(Error::ExpiredKey("k".into()).is_not_found());
        assert!(!Error::InvalidValue.is_not_found());
    }

    #[test]
    fn test_error_messages() {
        let err = Error::UnknownKey {
            area: StorageArea::Persistent,
            key: "user".into(),
        };
        assert_eq!(
            err.to_string(),
            "web storage \"localStorage\" has no \"user\" key"
        );
        assert_eq!(
            Error::NoAvailableSpace(StorageArea::Session).to_string(),
            "web storage \"sessionStorage\" has no available space"
        );
    }
}
