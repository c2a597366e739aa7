use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::decoder::remote::{DEFAULT_REMOTE_DECODER_URL, DEFAULT_REMOTE_TIMEOUT_SECS};
use crate::services::barcode::DEFAULT_BARCODE_LENGTH;
use crate::services::issuance::DEFAULT_MAX_TICKETS_PER_USER;
use crate::services::redemption::DEFAULT_TICKET_TTL_HOURS;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::create_security_headers_layer;

const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} has an invalid value '{value}'")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    /// `None` runs the server on the in-memory store.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub host: IpAddr,
    pub port: u16,
    pub cors_allowed_origins: Option<String>,
    pub production: bool,
    pub tickets: TicketConfig,
    pub decoder: DecoderConfig,
}

#[derive(Debug, Clone)]
pub struct TicketConfig {
    pub max_per_user: i64,
    pub barcode_length: usize,
    pub ttl_hours: i64,
}

#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Remote fallback endpoint; `None` disables the fallback.
    pub remote_url: Option<String>,
    pub remote_timeout: Duration,
    pub max_upload_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            database_max_connections: 5,
            host: IpAddr::from([0, 0, 0, 0]),
            port: 3001,
            cors_allowed_origins: None,
            production: false,
            tickets: TicketConfig {
                max_per_user: DEFAULT_MAX_TICKETS_PER_USER,
                barcode_length: DEFAULT_BARCODE_LENGTH,
                ttl_hours: DEFAULT_TICKET_TTL_HOURS,
            },
            decoder: DecoderConfig {
                remote_url: Some(DEFAULT_REMOTE_DECODER_URL.to_string()),
                remote_timeout: Duration::from_secs(DEFAULT_REMOTE_TIMEOUT_SECS),
                max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            database_url: non_empty_var("DATABASE_URL"),
            database_max_connections: parse_var(
                "DATABASE_MAX_CONNECTIONS",
                defaults.database_max_connections,
            )?,
            host: parse_var("HOST", defaults.host)?,
            port: parse_var("PORT", defaults.port)?,
            cors_allowed_origins: non_empty_var("CORS_ALLOWED_ORIGINS"),
            production: env::var("RUST_ENV")
                .map(|v| v.to_lowercase() == "production")
                .unwrap_or(false),
            tickets: TicketConfig {
                max_per_user: parse_positive("MAX_TICKETS_PER_USER", defaults.tickets.max_per_user)?,
                barcode_length: parse_positive("BARCODE_LENGTH", defaults.tickets.barcode_length)?,
                ttl_hours: parse_positive("TICKET_TTL_HOURS", defaults.tickets.ttl_hours)?,
            },
            decoder: DecoderConfig {
                // Set but empty disables the fallback.
                remote_url: match env::var("REMOTE_DECODER_URL") {
                    Ok(url) if url.trim().is_empty() => None,
                    Ok(url) => Some(url.trim().to_string()),
                    Err(_) => defaults.decoder.remote_url,
                },
                remote_timeout: Duration::from_secs(parse_positive(
                    "REMOTE_DECODER_TIMEOUT_SECS",
                    DEFAULT_REMOTE_TIMEOUT_SECS,
                )?),
                max_upload_bytes: parse_positive(
                    "MAX_UPLOAD_BYTES",
                    defaults.decoder.max_upload_bytes,
                )?,
            },
        })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
        Err(_) => Ok(default),
    }
}

fn parse_positive<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default + ToString,
{
    let value = parse_var(key, default)?;
    if value <= T::default() {
        return Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        });
    }
    Ok(value)
}
