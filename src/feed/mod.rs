//! NWS alert feed access: the Atom listing of current alerts and the
//! per-alert CAP detail document used for expiry checks.

use anyhow::{Context, Result};
use roxmltree::{Document, Node};
use std::time::Duration;
use tracing::warn;

pub mod geocode;

// Namespaces of the XML returned by NWS.
const ATOM_NS: &str = "http://www.w3.org/2005/Atom";
const CAP_NS: &str = "urn:oasis:names:tc:emergency:cap:1.1";

/// Exact description text NWS serves once an alert has lapsed.
const EXPIRED_DESCRIPTION: &str = "This alert has expired";

/// Pause after each detail fetch, politeness toward the NWS host.
const DETAIL_FETCH_PAUSE: Duration = Duration::from_secs(1);

/// One feed entry with its region codes already extracted.
///
/// `id` doubles as the URL of the alert's detail document. `updated` is an
/// opaque revision token, only ever compared for equality.
#[derive(Debug, Clone)]
pub struct FeedEntry {
    pub id: String,
    pub updated: String,
    pub title: String,
    pub county_codes: Vec<String>,
    pub zone_codes: Vec<String>,
}

/// Fetch the current alert feed document.
pub async fn fetch_feed(http: &reqwest::Client, url: &str) -> Result<String> {
    let body = http
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await
        .with_context(|| format!("failed to read feed body from {}", url))?;
    Ok(body)
}

/// Parse the feed into entries.
///
/// A document that is not well-formed XML fails the whole pass; an entry
/// missing its id or revision token is skipped with a warning, and a missing
/// geocode block degrades to empty region-code sets.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedEntry>> {
    let doc = Document::parse(xml).context("feed is not well-formed XML")?;

    let mut entries = Vec::new();
    for entry in doc
        .root_element()
        .children()
        .filter(|n| n.has_tag_name((ATOM_NS, "entry")))
    {
        let Some(id) = child_text(entry, ATOM_NS, "id") else {
            warn!("Feed entry without id, skipping");
            continue;
        };
        let Some(updated) = child_text(entry, ATOM_NS, "updated") else {
            warn!("Feed entry {} without updated, skipping", id);
            continue;
        };
        let title = child_text(entry, ATOM_NS, "title").unwrap_or_default();

        let (county_field, zone_field) = entry
            .children()
            .find(|n| n.has_tag_name((CAP_NS, "geocode")))
            .map(geocode::geocode_fields)
            .unwrap_or_default();

        entries.push(FeedEntry {
            id,
            updated,
            title,
            county_codes: geocode::extract_county(&county_field),
            zone_codes: geocode::extract_zone(&zone_field),
        });
    }
    Ok(entries)
}

fn child_text(node: Node<'_, '_>, ns: &str, name: &str) -> Option<String> {
    node.children()
        .find(|n| n.has_tag_name((ns, name)))
        .and_then(|n| n.text())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Whether the alert behind the given URL has expired.
///
/// Fails open: a fetch or parse problem reports the alert as still active so
/// delivery keeps going; the next cycle gets another chance at the check.
pub async fn is_expired(http: &reqwest::Client, alert_url: &str) -> bool {
    match check_expired(http, alert_url).await {
        Ok(expired) => expired,
        Err(e) => {
            warn!(
                "Expiry check failed for {}, assuming still active: {:#}",
                alert_url, e
            );
            false
        }
    }
}

async fn check_expired(http: &reqwest::Client, alert_url: &str) -> Result<bool> {
    let body = http
        .get(alert_url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    tokio::time::sleep(DETAIL_FETCH_PAUSE).await;
    description_is_expired(&body)
}

fn description_is_expired(xml: &str) -> Result<bool> {
    let doc = Document::parse(xml).context("alert detail is not well-formed XML")?;
    let info = doc
        .root_element()
        .children()
        .find(|n| n.has_tag_name((CAP_NS, "info")))
        .context("alert detail has no info block")?;
    let description = info
        .children()
        .find(|n| n.has_tag_name((CAP_NS, "description")))
        .and_then(|n| n.text())
        .context("alert detail has no description")?;
    Ok(description.trim() == EXPIRED_DESCRIPTION)
}
