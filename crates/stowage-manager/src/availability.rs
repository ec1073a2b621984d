//! Area availability checks
//!
//! An area can be registered yet unusable: blocked by the host, or so full
//! that not even a small write fits. Before a manager binds to an area it
//! writes and removes a small test value to find out.

use crate::registry::StorageRegistry;
use std::sync::Arc;
use stowage_common::{Error, Result, StorageArea};
use stowage_store::WebStorage;
use tracing::debug;

const TEST_KEY: &str = "test";

/// Characters in the test value
const TEST_VALUE_LEN: usize = 512;

/// Adapter for `area` if it is supported and accepts writes
///
/// Fails with `UnsupportedArea` when the registry has no adapter for the
/// area, `NoAvailableSpace` when the test write is rejected for quota while
/// the area holds data, and `AreaUnavailable` for any other failure.
pub fn check_availability(
    registry: &StorageRegistry,
    area: StorageArea,
) -> Result<Arc<dyn WebStorage>> {
    let storage = registry.get(area).ok_or(Error::UnsupportedArea(area))?;

    match write_test_value(storage.as_ref()) {
        Ok(()) => Ok(storage),
        Err(e) if e.is_quota_exceeded() && !storage.is_empty().unwrap_or(true) => {
            debug!("{} rejected the availability test write: {}", area, e);
            Err(Error::NoAvailableSpace(area))
        }
        Err(e) => {
            debug!("{} failed the availability test write: {}", area, e);
            Err(Error::AreaUnavailable(area))
        }
    }
}

/// Write then remove the test value, putting back any value it displaced
fn write_test_value(storage: &dyn WebStorage) -> Result<()> {
    let displaced = storage.get_item(TEST_KEY)?;
    storage.set_item(TEST_KEY, &"a".repeat(TEST_VALUE_LEN))?;
    match displaced {
        Some(previous) => storage.set_item(TEST_KEY, &previous),
        None => storage.remove_item(TEST_KEY),
    }
}
