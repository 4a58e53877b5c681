//! Model Error Types

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised while constructing model values
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// Severity string did not name a known level
    #[error("Unknown severity: {0}")]
    UnknownSeverity(String),

    /// Silence window end is not after its start
    #[error("Silence window end {end} must be after start {start}")]
    InvalidWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}
