//! Error types for phone number handling

use thiserror::Error;

/// Result type for phone number operations
pub type Result<T> = std::result::Result<T, PhoneError>;

/// Errors raised by the phone number collaborators
///
/// The normalizer and the carrier probe never return these to callers; they
/// log them and fall back to a safe value.
#[derive(Debug, Error)]
pub enum PhoneError {
    /// The grammar could not parse the input
    #[error("Parse error: {0}")]
    Parse(String),

    /// The input parsed but is not a valid number for the region
    #[error("Invalid number for region {region}")]
    InvalidNumber { region: String },

    /// Content provider query failed
    #[error("Provider error: {0}")]
    Provider(String),
}

impl PhoneError {
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider(message.into())
    }
}
