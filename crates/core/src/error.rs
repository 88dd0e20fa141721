//! Error types shared by the application-facing crates.

use thiserror::Error;

/// Errors raised outside the Vulkan layer.
#[derive(Error, Debug)]
pub enum Error {
    /// Window creation or event loop failure.
    #[error("Window error: {0}")]
    Window(String),

    /// Asset loading failure.
    #[error("Resource error: {0}")]
    Resource(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed or inconsistent run configuration.
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
