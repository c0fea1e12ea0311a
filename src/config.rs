use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::manager::DEFAULT_TTL_SECONDS;
use crate::notify::DEFAULT_POLL_INTERVAL_MS;
use crate::token::DEFAULT_TOKEN_LENGTH;
use crate::validator::DEFAULT_LATE_THRESHOLD_MS;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub attendance: AttendanceConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub requests_per_minute: u32,
}

/// Typed knobs for the session core. Everything arrives from the
/// environment as strings and is parsed (or defaulted) here, before any of
/// it reaches the manager or validator.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AttendanceConfig {
    pub default_ttl_seconds: u32,
    pub late_threshold_ms: i64,
    pub token_length: usize,
    pub poll_interval_ms: u64,
    pub snapshot_path: Option<PathBuf>,
    pub snapshot_interval_secs: u64,
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let default_ttl = match env_parsed("DEFAULT_TTL_SECONDS", DEFAULT_TTL_SECONDS) {
            0 => DEFAULT_TTL_SECONDS,
            ttl => ttl,
        };

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .or_else(|_| env::var("SERVER_PORT"))
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .unwrap_or(8080),
                cors_origins: env::var("CORS_ORIGINS")
                    .unwrap_or_else(|_| "http://localhost:3000".to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .collect(),
                requests_per_minute: env_parsed("REQUESTS_PER_MINUTE", 600),
            },
            attendance: AttendanceConfig {
                default_ttl_seconds: default_ttl,
                late_threshold_ms: env_parsed("LATE_THRESHOLD_MS", DEFAULT_LATE_THRESHOLD_MS),
                token_length: env_parsed("TOKEN_LENGTH", DEFAULT_TOKEN_LENGTH),
                poll_interval_ms: env_parsed("POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS),
                snapshot_path: env::var("SNAPSHOT_PATH").ok().map(PathBuf::from),
                snapshot_interval_secs: env_parsed("SNAPSHOT_INTERVAL_SECS", 30),
            },
        })
    }
}

impl Default for AttendanceConfig {
    fn default() -> Self {
        Self {
            default_ttl_seconds: DEFAULT_TTL_SECONDS,
            late_threshold_ms: DEFAULT_LATE_THRESHOLD_MS,
            token_length: DEFAULT_TOKEN_LENGTH,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            snapshot_path: None,
            snapshot_interval_secs: 30,
        }
    }
}
