use std::{env, fmt::Display, net::SocketAddr, path::PathBuf, str::FromStr};

use thiserror::Error;

const DEVELOPMENT_SECRET: &str = "insecure-development-secret";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid {key} value {value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub database_wait_attempts: u32,
    pub jwt_secret: String,
    pub token_lifetime_hours: i64,
    pub media_root: PathBuf,
    pub media_url: String,
    pub max_upload_bytes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 8000)),
            database_url: None,
            database_max_connections: 5,
            database_wait_attempts: 30,
            jwt_secret: DEVELOPMENT_SECRET.to_string(),
            token_lifetime_hours: 24,
            media_root: PathBuf::from("media"),
            media_url: String::from("/media/"),
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            bind_address: try_load("BIND_ADDRESS", defaults.bind_address)?,
            database_url: var("DATABASE_URL"),
            database_max_connections: try_load(
                "DATABASE_MAX_CONNECTIONS",
                defaults.database_max_connections,
            )?,
            database_wait_attempts: try_load(
                "DATABASE_WAIT_ATTEMPTS",
                defaults.database_wait_attempts,
            )?,
            jwt_secret: var("JWT_SECRET").unwrap_or_else(|| {
                log::warn!("JWT_SECRET not set, using an insecure development secret");
                defaults.jwt_secret
            }),
            token_lifetime_hours: try_load("TOKEN_LIFETIME_HOURS", defaults.token_lifetime_hours)?,
            media_root: var("MEDIA_ROOT").map(PathBuf::from).unwrap_or(defaults.media_root),
            media_url: var("MEDIA_URL")
                .map(normalize_media_url)
                .unwrap_or(defaults.media_url),
            max_upload_bytes: try_load("MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?,
        };

        if config.token_lifetime_hours <= 0 {
            return Err(ConfigError::Invalid {
                key: "TOKEN_LIFETIME_HOURS",
                value: config.token_lifetime_hours.to_string(),
                reason: String::from("must be positive"),
            });
        }

        Ok(config)
    }

    /// Path segment uploads are served under, e.g. `media` for `/media/`.
    pub fn media_mount(&self) -> &str {
        self.media_url.trim_matches('/')
    }
}

fn normalize_media_url(url: String) -> String {
    let trimmed = url.trim_matches('/');
    if trimmed.is_empty() {
        return String::from("/");
    }
    format!("/{trimmed}/")
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn try_load<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + Display,
    T::Err: Display,
{
    match var(key) {
        Some(value) => {
            let parsed = value.trim().parse::<T>();
            parsed.map_err(|e| ConfigError::Invalid {
                key,
                reason: e.to_string(),
                value,
            })
        }
        None => {
            log::info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}
