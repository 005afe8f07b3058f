use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{AppError, Result};

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-pro";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Clone)]
pub struct Config {
    pub server_addr: SocketAddr,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub rate_limit_max_requests: usize,
    pub rate_limit_window: Duration,
    /// Backoff applied after a quota error that carries no retry delay.
    pub rate_limit_backoff: Duration,
    pub content_cache_ttl: Duration,
    /// Keep successfully extracted pages beyond the TTL for the life of the process.
    pub content_cache_persistent: bool,
    pub session_idle_timeout: Duration,
    pub fetch_timeout: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load environment variables from .env file if it exists
        dotenv::dotenv().ok();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let gemini_api_key = lookup("GEMINI_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| AppError::ConfigError("GEMINI_API_KEY is not set".to_string()))?;

        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parse_or(&lookup, "PORT", 5000u16)?;
        let ip = IpAddr::from_str(&host)
            .map_err(|e| AppError::ConfigError(format!("Invalid host address: {}", e)))?;

        let rate_limit_max_requests = parse_or(&lookup, "RATE_LIMIT_MAX_REQUESTS", 60usize)?;
        if rate_limit_max_requests == 0 {
            return Err(AppError::ConfigError(
                "RATE_LIMIT_MAX_REQUESTS must be at least 1".to_string(),
            ));
        }

        Ok(Config {
            server_addr: SocketAddr::new(ip, port),
            gemini_api_key,
            gemini_model: lookup("GEMINI_MODEL")
                .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            gemini_base_url: lookup("GEMINI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
            rate_limit_max_requests,
            rate_limit_window: secs_or(&lookup, "RATE_LIMIT_WINDOW_SECS", 60)?,
            rate_limit_backoff: secs_or(&lookup, "RATE_LIMIT_BACKOFF_SECS", 30)?,
            content_cache_ttl: secs_or(&lookup, "CONTENT_CACHE_TTL_SECS", 600)?,
            content_cache_persistent: parse_or(&lookup, "CONTENT_CACHE_PERSISTENT", true)?,
            session_idle_timeout: secs_or(&lookup, "SESSION_IDLE_SECS", 3600)?,
            fetch_timeout: secs_or(&lookup, "FETCH_TIMEOUT_SECS", 15)?,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| AppError::ConfigError(format!("Invalid {}: {}", key, e))),
        None => Ok(default),
    }
}

fn secs_or<F>(lookup: &F, key: &str, default: u64) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    parse_or(lookup, key, default).map(Duration::from_secs)
}
