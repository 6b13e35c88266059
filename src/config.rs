use anyhow::Result;
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub feed_host: String,
    pub feed_port: u16,
    pub feed_handshake: String,
    pub feed_reconnect_delay: Duration,
    pub feed_max_retries: u32,
    pub position_interval: Duration,
    pub trip_idle_timeout_min: i64,
    pub vehicle_stale_timeout_min: i64,
    pub sweep_interval: Duration,
    pub geocoding_url: String,
    pub geocoding_api_key: String,
    pub database_url: String,
    pub log_level: String,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        dotenv().ok();

        let feed_host = env_or("FEED_HOST", "pogog.ovh");
        let feed_port = env_parse("FEED_PORT", 5050);
        let feed_handshake = env_or("FEED_HANDSHAKE", "Hello");
        let feed_reconnect_delay =
            Duration::from_secs(env_parse("FEED_RECONNECT_DELAY_SECS", 5));
        let feed_max_retries = env_parse("FEED_MAX_RETRIES", 10);

        let position_interval = Duration::from_secs(env_parse("POSITION_INTERVAL_SECS", 30));
        let trip_idle_timeout_min = env_parse("TRIP_IDLE_TIMEOUT_MIN", 5);
        let vehicle_stale_timeout_min = env_parse("VEHICLE_STALE_TIMEOUT_MIN", 15);
        let sweep_interval = Duration::from_secs(env_parse("SWEEP_INTERVAL_SECS", 60));

        let geocoding_url = env_or(
            "GEOCODING_URL",
            "https://api.opencagedata.com/geocode/v1/json",
        );
        let geocoding_api_key = env::var("GEOCODING_API_KEY").unwrap_or_default();

        let db_host = env_or("DB_HOST", "localhost");
        let db_port = env_or("DB_PORT", "5432");
        let db_name = env_or("DB_DATABASE", "fleettrace");
        let db_user = env_or("DB_USER", "fleettrace");
        let db_pwd = env_or("DB_PWD", "fleettrace");

        let database_url = format!(
            "postgres://{}:{}@{}:{}/{}",
            db_user, db_pwd, db_host, db_port, db_name
        );

        let log_level = env_or("LOG_LEVEL", "info");

        Ok(Self {
            feed_host,
            feed_port,
            feed_handshake,
            feed_reconnect_delay,
            feed_max_retries,
            position_interval,
            trip_idle_timeout_min,
            vehicle_stale_timeout_min,
            sweep_interval,
            geocoding_url,
            geocoding_api_key,
            database_url,
            log_level,
        })
    }
}
