//! Server configuration from environment variables.
//!
//! | Variable                   | Default          |
//! |----------------------------|------------------|
//! | `CANCO_BIND_ADDR`          | `127.0.0.1:9090` |
//! | `CANCO_OUTBOUND_CAPACITY`  | `256`            |
//! | `CANCO_WRITE_TIMEOUT_MS`   | `5000`           |
//! | `CANCO_MAX_USERS_PER_ROOM` | `100`            |
//!
//! Without `CANCO_BIND_ADDR`, `HOST` and `PORT` are used when set.

use std::str::FromStr;

use canco_collab::ServerConfig;
use thiserror::Error;

pub const BIND_ADDR: &str = "CANCO_BIND_ADDR";
pub const OUTBOUND_CAPACITY: &str = "CANCO_OUTBOUND_CAPACITY";
pub const WRITE_TIMEOUT_MS: &str = "CANCO_WRITE_TIMEOUT_MS";
pub const MAX_USERS_PER_ROOM: &str = "CANCO_MAX_USERS_PER_ROOM";

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: &str = "9090";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name}={value:?} is not a valid number")]
    InvalidNumber { name: &'static str, value: String },
    #[error("{name} must be greater than zero")]
    Zero { name: &'static str },
}

/// Build a [`ServerConfig`] from the process environment.
pub fn from_env() -> Result<ServerConfig, ConfigError> {
    from_lookup(|name| std::env::var(name).ok())
}

/// Build a [`ServerConfig`] from any variable source.
pub fn from_lookup<F>(lookup: F) -> Result<ServerConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let defaults = ServerConfig::default();

    let bind_addr = match lookup(BIND_ADDR) {
        Some(addr) => addr,
        None => match (lookup("HOST"), lookup("PORT")) {
            (None, None) => defaults.bind_addr,
            (host, port) => format!(
                "{}:{}",
                host.as_deref().unwrap_or(DEFAULT_HOST),
                port.as_deref().unwrap_or(DEFAULT_PORT)
            ),
        },
    };

    Ok(ServerConfig {
        bind_addr,
        outbound_capacity: positive(&lookup, OUTBOUND_CAPACITY, defaults.outbound_capacity)?,
        write_timeout_ms: positive(&lookup, WRITE_TIMEOUT_MS, defaults.write_timeout_ms)?,
        max_users_per_room: positive(&lookup, MAX_USERS_PER_ROOM, defaults.max_users_per_room)?,
    })
}

fn positive<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + PartialEq + Default,
{
    let Some(raw) = lookup(name) else {
        return Ok(default);
    };

    let value = raw
        .trim()
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidNumber { name, value: raw.clone() })?;
    if value == T::default() {
        return Err(ConfigError::Zero { name });
    }
    Ok(value)
}
