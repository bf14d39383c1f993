//! services/relay/src/error.rs
//!
//! Defines the primary error type for the relay service.

use crate::config::ConfigError;

/// The primary error type for the `relay` service.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error related to a renderer's WebSocket connection.
    #[error("WebSocket Error: {0}")]
    Websocket(#[from] axum::Error),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}
