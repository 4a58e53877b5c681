//! Repository Contracts

use crate::StorageError;
use alert_model::{Alert, Severity, SilenceMark};
use async_trait::async_trait;
use uuid::Uuid;

/// Persistence for alert records.
///
/// Implementations must refuse to `save` a second open (firing or
/// acknowledged) alert for a fingerprint, answering
/// [`StorageError::Conflict`] so callers can fold the race into the
/// "already exists" branch.
#[async_trait]
pub trait AlertRepository: Send + Sync {
    /// All alerts for a fingerprint, newest first
    async fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Vec<Alert>, StorageError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Alert>, StorageError>;

    /// Alert whose notification on `channel` carries `external_id`
    async fn find_by_channel_external_id(
        &self,
        channel: &str,
        external_id: &str,
    ) -> Result<Option<Alert>, StorageError>;

    /// Insert a new alert
    async fn save(&self, alert: &Alert) -> Result<(), StorageError>;

    /// Overwrite an existing alert, `NotFound` if it was never saved
    async fn update(&self, alert: &Alert) -> Result<(), StorageError>;

    /// Non-resolved alerts, newest first, optionally of one severity
    async fn get_active_alerts(&self, severity: Option<Severity>)
        -> Result<Vec<Alert>, StorageError>;
}

/// Persistence for silence marks
#[async_trait]
pub trait SilenceRepository: Send + Sync {
    /// Currently active silences that suppress `alert`
    async fn find_matching(&self, alert: &Alert) -> Result<Vec<SilenceMark>, StorageError>;

    async fn save(&self, silence: &SilenceMark) -> Result<(), StorageError>;

    /// Silences whose window contains the current instant
    async fn find_active(&self) -> Result<Vec<SilenceMark>, StorageError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<SilenceMark>, StorageError>;

    /// Remove a silence, `NotFound` if absent
    async fn delete(&self, id: Uuid) -> Result<(), StorageError>;
}
