// Error types for tunnelmon

use thiserror::Error;

/// Result type alias using anyhow::Error
pub type Result<T> = anyhow::Result<T>;

/// Tunnelmon-specific error types
#[derive(Error, Debug)]
pub enum TunnelmonError {
    #[error("Failed to connect to systemd D-Bus: {0}")]
    SystemdConnection(String),

    #[error("Failed to query unit information: {0}")]
    UnitQuery(String),

    #[error("Failed to control unit '{unit}': {message}")]
    UnitControl { unit: String, message: String },

    #[error("Failed to read journal logs: {0}")]
    Journal(String),

    #[error("Unknown tunnel unit: {0}")]
    UnknownTunnel(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
