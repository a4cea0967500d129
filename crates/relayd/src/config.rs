//! Runtime configuration.
//!
//! Every setting can be given as a flag or through its environment variable.
//! The admin API key has no default; starting without one is fatal.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use clap::Parser;
use thiserror::Error;

use crate::hub::{HubConfig, DEFAULT_EVENT_CAPACITY, DEFAULT_OUTBOUND_CAPACITY};
use crate::server::ServerConfig;

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 8081;

/// Default maximum inbound WebSocket message size (512 KiB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 512 * 1024;

/// Relay daemon - routes messages to WebSocket clients by user or session
#[derive(Parser, Clone)]
#[command(name = "relayd", version, about)]
pub struct Config {
    /// Address to bind
    #[arg(long, env = "HUB_HOST", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub host: IpAddr,

    /// Port to listen on
    #[arg(long, short = 'p', env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Shared secret required in the X-API-Key header of admin requests
    #[arg(long, env = "HUB_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Idle read deadline per connection (e.g. 60s, 1m30s)
    #[arg(long, env = "READ_TIMEOUT", default_value = "60s", value_parser = parse_duration)]
    pub read_timeout: Duration,

    /// Deadline for each outbound write
    #[arg(long, env = "WRITE_TIMEOUT", default_value = "10s", value_parser = parse_duration)]
    pub write_timeout: Duration,

    /// Maximum inbound WebSocket message size in bytes
    #[arg(long, env = "MAX_MESSAGE_SIZE", default_value_t = DEFAULT_MAX_MESSAGE_SIZE)]
    pub max_message_size: usize,

    /// Per-connection outbound queue capacity
    #[arg(long, env = "OUTBOUND_CAPACITY", default_value_t = DEFAULT_OUTBOUND_CAPACITY)]
    pub outbound_capacity: usize,
}

impl Config {
    /// Checks the settings that clap cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self
            .api_key
            .as_deref()
            .map_or(true, |key| key.trim().is_empty())
        {
            return Err(ConfigError::MissingApiKey);
        }
        if self.read_timeout.is_zero() {
            return Err(ConfigError::Zero { field: "read_timeout" });
        }
        if self.write_timeout.is_zero() {
            return Err(ConfigError::Zero { field: "write_timeout" });
        }
        if self.max_message_size == 0 {
            return Err(ConfigError::Zero { field: "max_message_size" });
        }
        if self.outbound_capacity == 0 {
            return Err(ConfigError::Zero { field: "outbound_capacity" });
        }
        Ok(())
    }

    /// Socket address the server binds to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            event_capacity: DEFAULT_EVENT_CAPACITY,
            outbound_capacity: self.outbound_capacity,
        }
    }

    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            api_key: self.api_key.clone().unwrap_or_default(),
            read_timeout: self.read_timeout,
            write_timeout: self.write_timeout,
            max_message_size: self.max_message_size,
        }
    }
}

/// Errors raised while loading configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("HUB_API_KEY environment variable is required")]
    MissingApiKey,

    #[error("invalid duration {0:?} (expected e.g. 500ms, 10s, 1m30s)")]
    InvalidDuration(String),

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
}

/// Parses durations such as `500ms`, `10s`, `1m30s` or `2h`.
///
/// A bare integer is taken as seconds.
pub fn parse_duration(input: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidDuration(input.to_string());
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(invalid());
    }
    if let Ok(secs) = trimmed.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut rest = trimmed;

    while !rest.is_empty() {
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        if digits_end == 0 {
            return Err(invalid());
        }
        let (number, tail) = rest.split_at(digits_end);
        let value: u64 = number.parse().map_err(|_| invalid())?;

        let unit_end = tail.find(|c: char| c.is_ascii_digit()).unwrap_or(tail.len());
        let (unit, next) = tail.split_at(unit_end);

        let part = match unit {
            "ms" => Some(Duration::from_millis(value)),
            "s" => Some(Duration::from_secs(value)),
            "m" => value.checked_mul(60).map(Duration::from_secs),
            "h" => value.checked_mul(3600).map(Duration::from_secs),
            _ => None,
        }
        .ok_or_else(invalid)?;

        total = total.checked_add(part).ok_or_else(invalid)?;
        rest = next;
    }

    Ok(total)
}
