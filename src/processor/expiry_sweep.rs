use anyhow::Result;
use serde_json::json;
use tracing::{info, warn};

use super::{CMD_CLEAR_ALERT, STATUS_ACTIVE, STATUS_EXPIRED, STREAM_ALERT_STATUS, STREAM_ALERT_URL};
use crate::db::ledger::AlertStore;
use crate::feed;
use crate::m2x::DeviceApi;

/// One expiry sweep pass.
///
/// Re-checks every device currently flagged with an active alert and clears
/// the ones whose alert has expired: status stream gets `expired`, the
/// ledger row is dropped and the device receives a clear command at the end
/// of the sweep. Devices whose alert is still live are left untouched.
pub async fn run<S: AlertStore, D: DeviceApi>(
    http: &reqwest::Client,
    ledger: &S,
    devices: &D,
) -> Result<()> {
    info!("Checking for expired alerts & updating affected devices");

    let flagged = devices
        .search_by_stream_value(STREAM_ALERT_STATUS, STATUS_ACTIVE)
        .await?;
    info!("{} devices currently carry an active alert", flagged.len());

    let mut cleared_ids: Vec<String> = Vec::new();
    for device in flagged {
        let alert_url = match devices
            .latest_stream_value(&device.id, STREAM_ALERT_URL)
            .await
        {
            Ok(Some(url)) => url,
            // Flagged but never initialized; nothing to re-check.
            Ok(None) => continue,
            Err(e) => {
                warn!("Could not read alert url of device {}: {}", device.id, e);
                continue;
            }
        };

        if !feed::is_expired(http, &alert_url).await {
            continue;
        }

        if let Err(e) = devices
            .append_stream_value(&device.id, STREAM_ALERT_STATUS, STATUS_EXPIRED)
            .await
        {
            // Status still reads active, so the next sweep retries it.
            warn!("Failed to mark device {} expired: {}", device.id, e);
            continue;
        }
        ledger.remove(&alert_url).await;
        if !cleared_ids.contains(&device.id) {
            cleared_ids.push(device.id.clone());
        }
    }

    if cleared_ids.is_empty() {
        return Ok(());
    }
    if let Err(e) = devices
        .send_command(CMD_CLEAR_ALERT, json!({}), cleared_ids)
        .await
    {
        warn!("Failed to broadcast {}: {}", CMD_CLEAR_ALERT, e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ledger::MockAlertStore;
    use crate::m2x::{Device, MockDeviceApi};
    use mockall::predicate::eq;

    fn device(id: &str) -> Device {
        Device {
            id: id.to_string(),
            name: None,
        }
    }

    fn detail_body(description: &str) -> String {
        format!(
            r#"<alert xmlns="urn:oasis:names:tc:emergency:cap:1.1"><info><description>{}</description></info></alert>"#,
            description
        )
    }

    #[tokio::test]
    async fn expired_alert_is_cleared_from_device_and_ledger() {
        let mut server = mockito::Server::new_async().await;
        let alert_url = format!("{}/alerts/a1", server.url());
        server
            .mock("GET", "/alerts/a1")
            .with_status(200)
            .with_body(detail_body("This alert has expired"))
            .create_async()
            .await;

        let mut devices = MockDeviceApi::new();
        devices
            .expect_search_by_stream_value()
            .with(eq(STREAM_ALERT_STATUS), eq(STATUS_ACTIVE))
            .times(1)
            .returning(|_, _| Ok(vec![device("dev-1")]));
        {
            let alert_url = alert_url.clone();
            devices
                .expect_latest_stream_value()
                .with(eq("dev-1"), eq(STREAM_ALERT_URL))
                .times(1)
                .returning(move |_, _| Ok(Some(alert_url.clone())));
        }
        devices
            .expect_append_stream_value()
            .withf(|id, stream, value| {
                id == "dev-1" && stream == STREAM_ALERT_STATUS && value == STATUS_EXPIRED
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        devices
            .expect_send_command()
            .withf(|name, data, targets| {
                name == CMD_CLEAR_ALERT
                    && *data == json!({})
                    && *targets == vec!["dev-1".to_string()]
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let mut ledger = MockAlertStore::new();
        {
            let alert_url = alert_url.clone();
            ledger
                .expect_remove()
                .withf(move |id| id == alert_url)
                .times(1)
                .returning(|_| ());
        }

        let http = reqwest::Client::new();
        run(&http, &ledger, &devices).await.unwrap();
    }

    #[tokio::test]
    async fn live_alert_leaves_device_untouched() {
        let mut server = mockito::Server::new_async().await;
        let alert_url = format!("{}/alerts/a1", server.url());
        server
            .mock("GET", "/alerts/a1")
            .with_status(200)
            .with_body(detail_body("The Flood Warning continues"))
            .create_async()
            .await;

        let mut devices = MockDeviceApi::new();
        devices
            .expect_search_by_stream_value()
            .returning(|_, _| Ok(vec![device("dev-1")]));
        {
            let alert_url = alert_url.clone();
            devices
                .expect_latest_stream_value()
                .returning(move |_, _| Ok(Some(alert_url.clone())));
        }
        // No append, no command: the strict mock panics on either.

        let ledger = MockAlertStore::new();

        let http = reqwest::Client::new();
        run(&http, &ledger, &devices).await.unwrap();
    }

    #[tokio::test]
    async fn device_without_stored_url_is_skipped() {
        let mut devices = MockDeviceApi::new();
        devices
            .expect_search_by_stream_value()
            .returning(|_, _| Ok(vec![device("dev-1")]));
        devices
            .expect_latest_stream_value()
            .returning(|_, _| Ok(None));

        let ledger = MockAlertStore::new();

        let http = reqwest::Client::new();
        run(&http, &ledger, &devices).await.unwrap();
    }

    #[tokio::test]
    async fn directory_failure_aborts_the_sweep() {
        let mut devices = MockDeviceApi::new();
        devices
            .expect_search_by_stream_value()
            .returning(|_, _| Err(anyhow::anyhow!("directory unavailable")));

        let ledger = MockAlertStore::new();

        let http = reqwest::Client::new();
        assert!(run(&http, &ledger, &devices).await.is_err());
    }

    #[tokio::test]
    async fn status_append_failure_leaves_ledger_and_batch_alone() {
        let mut server = mockito::Server::new_async().await;
        let alert_url = format!("{}/alerts/a1", server.url());
        server
            .mock("GET", "/alerts/a1")
            .with_status(200)
            .with_body(detail_body("This alert has expired"))
            .create_async()
            .await;

        let mut devices = MockDeviceApi::new();
        devices
            .expect_search_by_stream_value()
            .returning(|_, _| Ok(vec![device("dev-1")]));
        {
            let alert_url = alert_url.clone();
            devices
                .expect_latest_stream_value()
                .returning(move |_, _| Ok(Some(alert_url.clone())));
        }
        devices
            .expect_append_stream_value()
            .times(1)
            .returning(|_, _, _| Err(anyhow::anyhow!("stream write rejected")));
        // No send_command: nothing was cleared.

        let ledger = MockAlertStore::new();

        let http = reqwest::Client::new();
        run(&http, &ledger, &devices).await.unwrap();
    }
}
