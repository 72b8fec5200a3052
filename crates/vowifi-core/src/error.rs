//! Error types for network session operations

use thiserror::Error;

/// Result type for network session operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while resolving, connecting or opening HTTP
/// connections on a VoWiFi network session
#[derive(Debug, Error)]
pub enum Error {
    /// The host has no usable address on the session's network
    #[error("Unknown host: {host}")]
    UnknownHost { host: String },

    /// Socket bind/connect failure from the underlying transport
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client construction or request failure
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL is not an http(s) URL
    #[error("Malformed URL: {0}")]
    MalformedUrl(String),

    /// Parcel could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create an unknown host error
    pub fn unknown_host(host: impl Into<String>) -> Self {
        Self::UnknownHost { host: host.into() }
    }

    /// Create a malformed URL error
    pub fn malformed_url(message: impl Into<String>) -> Self {
        Self::MalformedUrl(message.into())
    }

    /// Create a decode error
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    /// Whether this error means the host could not be resolved
    pub fn is_unknown_host(&self) -> bool {
        matches!(self, Self::UnknownHost { .. })
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
