//! services/relay/src/config.rs
//!
//! Defines the relay's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use chrono::{FixedOffset, Offset, Utc};
use std::net::SocketAddr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    /// Offset whose calendar decides which day section a message lands in.
    pub day_offset: FixedOffset,
    /// Capacity of each conversation's plan broadcast channel.
    pub plan_channel_capacity: usize,
    pub cors_origin: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], 3000)),
            log_level: Level::INFO,
            day_offset: Utc.fix(),
            plan_channel_capacity: 64,
            cors_origin: "http://localhost:3000".to_string(),
        }
    }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        // --- Server Settings ---
        let bind_address = match lookup("BIND_ADDRESS") {
            Some(value) => value.parse::<SocketAddr>().map_err(|e| {
                ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
            })?,
            None => defaults.bind_address,
        };

        let log_level = match lookup("RUST_LOG") {
            Some(value) => value.parse::<Level>().map_err(|_| {
                ConfigError::InvalidValue(
                    "RUST_LOG".to_string(),
                    format!("'{}' is not a valid log level", value),
                )
            })?,
            None => defaults.log_level,
        };

        let cors_origin = lookup("CORS_ORIGIN").unwrap_or(defaults.cors_origin);

        // --- Transcript Settings ---
        let day_offset = match lookup("DAY_OFFSET_MINUTES") {
            Some(value) => {
                let minutes = value.parse::<i32>().map_err(|e| {
                    ConfigError::InvalidValue("DAY_OFFSET_MINUTES".to_string(), e.to_string())
                })?;
                minutes
                    .checked_mul(60)
                    .and_then(FixedOffset::east_opt)
                    .ok_or_else(|| {
                        ConfigError::InvalidValue(
                            "DAY_OFFSET_MINUTES".to_string(),
                            format!("{} minutes is outside of +/-24h", minutes),
                        )
                    })?
            }
            None => defaults.day_offset,
        };

        let plan_channel_capacity = match lookup("PLAN_CHANNEL_CAPACITY") {
            Some(value) => match value.parse::<usize>() {
                Ok(capacity) if capacity > 0 => capacity,
                _ => {
                    return Err(ConfigError::InvalidValue(
                        "PLAN_CHANNEL_CAPACITY".to_string(),
                        format!("'{}' is not a positive integer", value),
                    ))
                }
            },
            None => defaults.plan_channel_capacity,
        };

        Ok(Self {
            bind_address,
            log_level,
            day_offset,
            plan_channel_capacity,
            cors_origin,
        })
    }
}
