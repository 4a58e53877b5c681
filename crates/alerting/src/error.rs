//! Alerting Error Types

use std::time::Duration;
use storage::StorageError;
use thiserror::Error;

/// Errors surfaced by the alerting engines.
///
/// Per-channel delivery failures are not errors here; they are reported
/// in the operation's notification results.
#[derive(Debug, Error)]
pub enum AlertError {
    /// Malformed input, never retried
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Unknown alert or silence id
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Backing store failure, fatal to the operation
    #[error("Repository error during {op}: {source}")]
    Repository {
        op: &'static str,
        #[source]
        source: StorageError,
    },

    /// Caller cancelled while a channel retry was pending
    #[error("Operation cancelled")]
    Cancelled,
}

impl AlertError {
    pub(crate) fn not_found(kind: &'static str, id: impl ToString) -> Self {
        AlertError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

/// Wrap a storage error with the name of the failing operation
pub(crate) fn repo(op: &'static str) -> impl FnOnce(StorageError) -> AlertError {
    move |source| AlertError::Repository { op, source }
}

/// Parse a human duration such as `30m`, `2h` or `1h 30m`
pub fn parse_duration(raw: &str) -> Result<Duration, AlertError> {
    let duration = humantime::parse_duration(raw.trim())
        .map_err(|e| AlertError::Validation(format!("invalid duration '{}': {}", raw, e)))?;
    if duration.is_zero() {
        return Err(AlertError::Validation(format!(
            "duration '{}' must be positive",
            raw
        )));
    }
    Ok(duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30m").unwrap(), Duration::from_secs(1800));
        assert_eq!(parse_duration(" 1h 30m ").unwrap(), Duration::from_secs(5400));
        assert!(matches!(
            parse_duration("soon"),
            Err(AlertError::Validation(_))
        ));
        assert!(matches!(parse_duration("0s"), Err(AlertError::Validation(_))));
        assert!(matches!(parse_duration(""), Err(AlertError::Validation(_))));
    }
}
