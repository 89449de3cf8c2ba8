// src/config.rs

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use dotenvy::dotenv;
use thiserror::Error;

/// Keys per event-log query. Large IN-lists push Postgres into sequential scans.
pub const DEFAULT_EVENT_LOG_CHUNK_SIZE: usize = 50;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} has an invalid value '{value}'")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub rust_log: String,
    pub bind_addr: SocketAddr,
    pub cors_origins: Vec<String>,
    pub db_max_connections: u32,
    pub event_log_chunk_size: usize,
    pub event_log_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        let database_url = env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let bind_addr = parse_or("BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 3000)))?;

        let cors_origins = env::var("CORS_ORIGINS")
            .map(|raw| parse_origins(&raw))
            .unwrap_or_else(|_| {
                vec![
                    "http://localhost:3000".to_string(),
                    "http://127.0.0.1:3000".to_string(),
                ]
            });

        let db_max_connections = parse_or("DB_MAX_CONNECTIONS", 5u32)?;

        let event_log_chunk_size = parse_or("EVENT_LOG_CHUNK_SIZE", DEFAULT_EVENT_LOG_CHUNK_SIZE)?;
        if event_log_chunk_size == 0 {
            return Err(ConfigError::Invalid {
                key: "EVENT_LOG_CHUNK_SIZE",
                value: "0".to_string(),
            });
        }

        let event_log_timeout = Duration::from_secs(parse_or("EVENT_LOG_TIMEOUT_SECS", 10u64)?);

        Ok(Self {
            database_url,
            rust_log,
            bind_addr,
            cors_origins,
            db_max_connections,
            event_log_chunk_size,
            event_log_timeout,
        })
    }

    /// Configuration for tests and local runs that never touch Postgres.
    pub fn for_tests() -> Self {
        Self {
            database_url: String::new(),
            rust_log: "error".to_string(),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            cors_origins: vec!["http://localhost:3000".to_string()],
            db_max_connections: 1,
            event_log_chunk_size: DEFAULT_EVENT_LOG_CHUNK_SIZE,
            event_log_timeout: Duration::from_secs(5),
        }
    }
}

fn parse_or<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        Err(_) => Ok(default),
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
