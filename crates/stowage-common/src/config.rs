//! Configuration types for Stowage
//!
//! Every field has a default so a partial (or missing) config file is
//! always usable.

use crate::types::StorageArea;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Quota browsers grant each web storage area, in UTF-16 code units
pub const DEFAULT_AREA_QUOTA: usize = 5_000_000;

/// Length of each filler value written while probing
pub const DEFAULT_FILLER_LEN: usize = 1024;

/// Probe ceiling: 10 MiB of headroom in 1 KiB fillers
pub const DEFAULT_MAX_PROBE_WRITES: u64 = 10 * 1024;

/// Root configuration for Stowage
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StowageConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Backing store configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Area selected when none is given explicitly
    #[serde(default)]
    pub default_area: StorageArea,
    /// Database file backing the persistent area
    #[serde(default = "default_persistent_path")]
    pub persistent_path: PathBuf,
    /// Quota of the persistent area (code units)
    #[serde(default = "default_quota")]
    pub persistent_quota: usize,
    /// Quota of the session area (code units)
    #[serde(default = "default_quota")]
    pub session_quota: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            default_area: StorageArea::default(),
            persistent_path: default_persistent_path(),
            persistent_quota: default_quota(),
            session_quota: default_quota(),
        }
    }
}

/// Capacity probe configuration
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Characters per filler entry
    #[serde(default = "default_filler_len")]
    pub filler_len: usize,
    /// Stop probing after this many successful writes
    #[serde(default = "default_max_writes")]
    pub max_writes: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            filler_len: default_filler_len(),
            max_writes: default_max_writes(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_persistent_path() -> PathBuf {
    PathBuf::from("./stowage-data/local.redb")
}

const fn default_quota() -> usize {
    DEFAULT_AREA_QUOTA
}

const fn default_filler_len() -> usize {
    DEFAULT_FILLER_LEN
}

const fn default_max_writes() -> u64 {
    DEFAULT_MAX_PROBE_WRITES
}

fn default_log_level() -> String {
    "info".to_string()
}
