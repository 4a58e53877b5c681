//! Storage Layer
//!
//! Alert and silence persistence behind repository traits, with an
//! in-memory store and a SQLite store.

mod memory;
mod repository;
mod sqlite;

pub use memory::{InMemoryAlertRepository, InMemorySilenceRepository};
pub use repository::{AlertRepository, SilenceRepository};
pub use sqlite::SqliteStore;

use thiserror::Error;
use uuid::Uuid;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Record not found")]
    NotFound,
    /// Another open alert already holds this fingerprint
    #[error("Fingerprint {fingerprint} already has open alert {existing}")]
    Conflict { fingerprint: String, existing: Uuid },
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StorageError::NotFound,
            other => StorageError::DatabaseError(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::SerializationError(err.to_string())
    }
}
