//! Error types for tapvolt
//!
//! Provides a unified error type used across the tapvolt crates. Engine
//! failures never cross the façade as `Err` (they become observer
//! notifications); this type covers the collaborators around it.

use std::path::PathBuf;

/// Main error type for tapvolt operations
#[derive(Debug, thiserror::Error)]
pub enum TapvoltError {
    // === IO Errors ===

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    // === Connection Errors ===

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    // === Collaborator Errors ===

    #[error("Identity error: {0}")]
    Identity(String),

    #[error("Settings error: {0}")]
    Settings(String),

    // === Configuration Errors ===

    #[error("Configuration error: {0}")]
    Config(String),

    // === Internal Errors ===

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TapvoltError {
    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create an identity error
    pub fn identity(msg: impl Into<String>) -> Self {
        Self::Identity(msg.into())
    }

    /// Create a settings error
    pub fn settings(msg: impl Into<String>) -> Self {
        Self::Settings(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Result type alias using TapvoltError
pub type Result<T> = std::result::Result<T, TapvoltError>;
