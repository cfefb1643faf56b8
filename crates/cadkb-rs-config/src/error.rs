//! Error types for knowledge store configuration.

use thiserror::Error;

/// Errors returned while loading, validating, or resolving config.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A config file could not be read.
    #[error("failed to read config: {0}")]
    ReadFailed(#[from] std::io::Error),
    /// A config file is not valid JSON5.
    #[error("failed to parse config: {0}")]
    ParseFailed(#[from] json5::Error),
    /// The merged document does not match the config types.
    #[error("failed to decode config: {0}")]
    DecodeFailed(#[from] serde_json::Error),
    /// A field failed schema validation; `path` is `layer:dotted.key`.
    #[error("invalid config at {path}: {message}")]
    InvalidField { path: String, message: String },
    /// A cross-field invariant does not hold.
    #[error("invalid config: {0}")]
    Invalid(String),
    /// No storage directory could be derived from config or environment.
    #[error("cannot resolve storage directory: {0}")]
    UnresolvedStorage(String),
}
