//! Configuration-level error types

use thiserror::Error;

/// Errors raised while loading configuration or resolving paths.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("config I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("config is not valid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("no per-user data directory available on this platform")]
    NoDataDir,
}

/// Result alias using common Error
pub type Result<T> = std::result::Result<T, Error>;
