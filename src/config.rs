use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

/// Default NWS CAP/Atom feed listing all current US alerts.
pub const DEFAULT_FEED_URL: &str = "http://alerts.weather.gov/cap/us.php?x=0";

const DEFAULT_M2X_API_BASE: &str = "https://api-m2x.att.com/v2";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub m2x_api_key: String,
    pub m2x_api_base: String,
    pub feed_url: String,
    pub http_timeout_secs: u64,
    pub log_level: String,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        dotenv().ok();

        let database_url =
            env::var("DATABASE_URL").context("DATABASE_URL must be set (postgres://...)")?;
        let m2x_api_key = env::var("M2X_API_KEY").context("M2X_API_KEY must be set")?;
        let m2x_api_base =
            env::var("M2X_API_BASE").unwrap_or_else(|_| DEFAULT_M2X_API_BASE.to_string());
        let feed_url = env::var("FEED_URL").unwrap_or_else(|_| DEFAULT_FEED_URL.to_string());

        let http_timeout_secs = env::var("HTTP_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .unwrap_or(30);

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            database_url,
            m2x_api_key,
            m2x_api_base,
            feed_url,
            http_timeout_secs,
            log_level,
        })
    }
}
