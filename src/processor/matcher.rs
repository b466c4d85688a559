use tracing::warn;

use super::{META_FIPS6, META_UGC};
use crate::m2x::{Device, DeviceApi};

/// Devices registered for any of the given region codes.
///
/// County codes match the `fips6` metadata field, zone codes the `ugc`
/// field. A failed directory query is logged and contributes zero results;
/// the remaining codes are still queried. Duplicates across codes are kept,
/// downstream stream writes are idempotent by value.
pub async fn find_affected_devices<D: DeviceApi>(
    api: &D,
    county_codes: &[String],
    zone_codes: &[String],
) -> Vec<Device> {
    let mut devices = Vec::new();

    for code in county_codes {
        match api.search_by_metadata(META_FIPS6, code).await {
            Ok(found) => devices.extend(found),
            Err(e) => warn!("Device search for fips6 {} failed: {}", code, e),
        }
    }

    for code in zone_codes {
        match api.search_by_metadata(META_UGC, code).await {
            Ok(found) => devices.extend(found),
            Err(e) => warn!("Device search for ugc {} failed: {}", code, e),
        }
    }

    devices
}
