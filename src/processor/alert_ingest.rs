use anyhow::Result;
use serde_json::json;
use tracing::{debug, info, warn};

use super::matcher;
use super::{
    CMD_UPDATE_ALERT, STATUS_ACTIVE, STREAM_ALERT_MESSAGE, STREAM_ALERT_STATUS, STREAM_ALERT_URL,
};
use crate::db::ledger::{AlertStore, ReconcileOutcome};
use crate::feed::{self, FeedEntry};
use crate::m2x::{Device, DeviceApi};

/// One alert ingestion pass.
///
/// Fetches the feed, reconciles every entry against the ledger and pushes
/// new or changed, still-active alerts out to the affected devices. Only a
/// feed fetch or parse failure aborts the pass; everything per-entry
/// degrades and continues.
pub async fn run<S: AlertStore, D: DeviceApi>(
    http: &reqwest::Client,
    feed_url: &str,
    ledger: &S,
    devices: &D,
) -> Result<()> {
    info!("Checking for new alerts & updating affected devices");

    let body = feed::fetch_feed(http, feed_url).await?;
    let entries = feed::parse_feed(&body)?;
    info!("Feed listed {} alerts", entries.len());

    for entry in entries {
        process_entry(http, ledger, devices, entry).await;
    }
    Ok(())
}

async fn process_entry<S: AlertStore, D: DeviceApi>(
    http: &reqwest::Client,
    ledger: &S,
    devices: &D,
    entry: FeedEntry,
) {
    let outcome = ledger.reconcile(&entry.id, &entry.updated).await;
    if outcome == ReconcileOutcome::Unchanged {
        // Exact revision already processed on an earlier cycle.
        debug!("Skipping {}", entry.id);
        return;
    }

    if feed::is_expired(http, &entry.id).await {
        // Went from unseen straight to expired; drop the ledger row and
        // never touch devices.
        ledger.remove(&entry.id).await;
        return;
    }

    let affected =
        matcher::find_affected_devices(devices, &entry.county_codes, &entry.zone_codes).await;
    info!("{:?} alert {} affects {} devices", outcome, entry.id, affected.len());

    let mut target_ids: Vec<String> = Vec::new();
    for device in &affected {
        if let Err(e) = update_device(devices, device, &entry).await {
            warn!("Failed to update streams of device {}: {}", device.id, e);
            continue;
        }
        if !target_ids.contains(&device.id) {
            target_ids.push(device.id.clone());
        }
    }

    if target_ids.is_empty() {
        return;
    }
    if let Err(e) = devices
        .send_command(CMD_UPDATE_ALERT, json!({ "message": entry.title }), target_ids)
        .await
    {
        warn!("Failed to broadcast {}: {}", CMD_UPDATE_ALERT, e);
    }
}

/// Mirror the alert into the device's url, message and status streams.
async fn update_device<D: DeviceApi>(
    devices: &D,
    device: &Device,
    entry: &FeedEntry,
) -> Result<()> {
    devices
        .append_stream_value(&device.id, STREAM_ALERT_URL, &entry.id)
        .await?;
    devices
        .append_stream_value(&device.id, STREAM_ALERT_MESSAGE, &entry.title)
        .await?;
    devices
        .append_stream_value(&device.id, STREAM_ALERT_STATUS, STATUS_ACTIVE)
        .await?;
    Ok(())
}
