mod config;
mod db;
mod feed;
mod m2x;
mod processor;

use std::time::{Duration, Instant};

use config::AppConfig;
use db::ledger::AlertLedger;
use m2x::M2xClient;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load config
    let config = AppConfig::load()?;

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(config.log_level.as_str())
        .init();

    info!("Starting NWS alert sync cycle...");

    // Init DB
    let pool = db::init_pool(&config.database_url).await?;
    info!("Connected to database");

    let ledger = AlertLedger::new(pool);
    ledger.initialize().await;

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.http_timeout_secs))
        .build()?;
    let m2x = M2xClient::new(&config.m2x_api_base, &config.m2x_api_key, http.clone());

    // One full cycle: ingestion pass, then expiry sweep. The passes fail
    // independently; a failed pass is retried by the next scheduled run.
    let started = Instant::now();

    if let Err(e) = processor::alert_ingest::run(&http, &config.feed_url, &ledger, &m2x).await {
        error!("Alert ingestion pass failed: {:#}", e);
    }
    if let Err(e) = processor::expiry_sweep::run(&http, &ledger, &m2x).await {
        error!("Expiry sweep failed: {:#}", e);
    }

    info!("Cycle finished in {:?}", started.elapsed());
    Ok(())
}
