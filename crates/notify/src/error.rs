//! Channel Error Types

use thiserror::Error;

/// Errors returned by channel operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// Network trouble or a 5xx-equivalent, worth retrying
    #[error("Transient channel failure: {0}")]
    Transient(String),

    /// Auth failure, bad request, or anything retrying cannot fix
    #[error("Permanent channel failure: {0}")]
    Permanent(String),

    /// Caller gave up while waiting to retry
    #[error("Channel operation cancelled")]
    Cancelled,
}

impl ChannelError {
    /// Classify an HTTP-style status code returned by a channel API
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = format!("status {}: {}", status, message.into());
        match status {
            408 | 425 | 429 | 500..=599 => ChannelError::Transient(message),
            _ => ChannelError::Permanent(message),
        }
    }

    /// Whether another attempt may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, ChannelError::Transient(_))
    }
}
