use std::env;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub jwt_secret: String,
    pub jwt_issuer: Option<String>,
    pub jwt_leeway_secs: u64,
    pub feed_buffer_size: usize,
    pub chat_buffer_size: usize,
    /// Per-key history retention; `None` keeps every sample.
    pub location_history_limit: Option<usize>,
    pub store_timeout_ms: u64,
    pub seed_file: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Compact,
            jwt_secret: String::new(),
            jwt_issuer: None,
            jwt_leeway_secs: 30,
            feed_buffer_size: 1024,
            chat_buffer_size: 256,
            location_history_limit: None,
            store_timeout_ms: 2000,
            seed_file: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        let jwt_secret = env::var("JWT_SECRET")
            .ok()
            .filter(|secret| !secret.trim().is_empty())
            .ok_or_else(|| AppError::Internal("JWT_SECRET must be set".to_string()))?;

        let log_format = match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("compact") | Err(_) => LogFormat::Compact,
            Ok(other) => {
                return Err(AppError::Internal(format!(
                    "invalid LOG_FORMAT: {other}, expected compact/json"
                )));
            }
        };

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", defaults.http_port)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_format,
            jwt_secret,
            jwt_issuer: env::var("JWT_ISSUER").ok().filter(|v| !v.is_empty()),
            jwt_leeway_secs: parse_or_default("JWT_LEEWAY_SECS", defaults.jwt_leeway_secs)?,
            feed_buffer_size: parse_or_default("FEED_BUFFER_SIZE", defaults.feed_buffer_size)?,
            chat_buffer_size: parse_or_default("CHAT_BUFFER_SIZE", defaults.chat_buffer_size)?,
            location_history_limit: parse_optional("LOCATION_HISTORY_LIMIT")?,
            store_timeout_ms: parse_or_default("STORE_TIMEOUT_MS", defaults.store_timeout_ms)?,
            seed_file: env::var("SEED_FILE").ok().filter(|v| !v.is_empty()),
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    Ok(parse_optional(key)?.unwrap_or(default))
}

fn parse_optional<T>(key: &str) -> Result<Option<T>, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(None),
    }
}
