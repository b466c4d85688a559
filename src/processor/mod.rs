pub mod alert_ingest;
pub mod expiry_sweep;
pub mod matcher;

/// Device streams the alert state is mirrored into.
pub const STREAM_ALERT_URL: &str = "weather_alert_url";
pub const STREAM_ALERT_MESSAGE: &str = "weather_alert_message";
pub const STREAM_ALERT_STATUS: &str = "weather_alert_status";

/// `weather_alert_status` stream values.
pub const STATUS_ACTIVE: &str = "active";
pub const STATUS_EXPIRED: &str = "expired";

/// Broadcast command names.
pub const CMD_UPDATE_ALERT: &str = "UPDATE_WEATHER_ALERT";
pub const CMD_CLEAR_ALERT: &str = "CLEAR_WEATHER_ALERT";

/// Metadata keys devices register their regions under.
pub const META_FIPS6: &str = "fips6";
pub const META_UGC: &str = "ugc";
