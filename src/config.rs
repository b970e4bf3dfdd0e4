use std::time::Duration;

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AuthorityConfig {
    pub base_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub authority: AuthorityConfig,
    /// NATS url; `None` publishes to the log only.
    pub event_bus_uri: Option<String>,
    pub request_timeout: Duration,
    pub host: String,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database = DatabaseConfig {
            url: std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            max_connections: env_parse("DATABASE_MAX_CONNECTIONS").unwrap_or(10),
            acquire_timeout: Duration::from_secs(
                env_parse("DATABASE_ACQUIRE_TIMEOUT_SECS").unwrap_or(5),
            ),
        };
        let authority = AuthorityConfig {
            base_url: std::env::var("AUTHORITY_URL")
                .unwrap_or_else(|_| "http://localhost:8081".into()),
            timeout: Duration::from_millis(env_parse("AUTHORITY_TIMEOUT_MS").unwrap_or(3000)),
        };
        let event_bus_uri = std::env::var("EVENT_BUS_URI")
            .ok()
            .filter(|v| !v.trim().is_empty());

        Ok(Self {
            database,
            authority,
            event_bus_uri,
            request_timeout: Duration::from_secs(env_parse("REQUEST_TIMEOUT_SECS").unwrap_or(30)),
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env_parse("APP_PORT").unwrap_or(8080),
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}
