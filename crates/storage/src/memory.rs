//! In-Memory Repository Implementation

use crate::{AlertRepository, SilenceRepository, StorageError};
use alert_model::{Alert, Severity, SilenceMark};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StorageError> {
    mutex
        .lock()
        .map_err(|e| StorageError::DatabaseError(format!("Lock error: {}", e)))
}

/// Alert repository kept in process memory.
///
/// The fingerprint check and the insert run under one lock, so two
/// concurrent `save` calls for the same fingerprint cannot both succeed.
pub struct InMemoryAlertRepository {
    /// Alerts in insertion order
    alerts: Mutex<Vec<Alert>>,
}

impl InMemoryAlertRepository {
    /// Create an empty repository
    pub fn new() -> Self {
        info!("Creating in-memory alert repository");
        Self {
            alerts: Mutex::new(Vec::with_capacity(1000)),
        }
    }

    /// Total stored alerts, any state
    pub fn alert_count(&self) -> usize {
        self.alerts.lock().map(|a| a.len()).unwrap_or(0)
    }
}

impl Default for InMemoryAlertRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AlertRepository for InMemoryAlertRepository {
    async fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Vec<Alert>, StorageError> {
        let alerts = lock(&self.alerts)?;
        Ok(alerts
            .iter()
            .rev()
            .filter(|a| a.fingerprint == fingerprint)
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Alert>, StorageError> {
        let alerts = lock(&self.alerts)?;
        Ok(alerts.iter().find(|a| a.id == id).cloned())
    }

    async fn find_by_channel_external_id(
        &self,
        channel: &str,
        external_id: &str,
    ) -> Result<Option<Alert>, StorageError> {
        let alerts = lock(&self.alerts)?;
        Ok(alerts
            .iter()
            .rev()
            .find(|a| a.external_id(channel) == Some(external_id))
            .cloned())
    }

    async fn save(&self, alert: &Alert) -> Result<(), StorageError> {
        let mut alerts = lock(&self.alerts)?;

        if alert.is_open() {
            if let Some(existing) = alerts
                .iter()
                .find(|a| a.fingerprint == alert.fingerprint && a.is_open())
            {
                return Err(StorageError::Conflict {
                    fingerprint: alert.fingerprint.clone(),
                    existing: existing.id,
                });
            }
        }

        alerts.push(alert.clone());
        debug!("Saved alert {} ({})", alert.id, alert.fingerprint);
        Ok(())
    }

    async fn update(&self, alert: &Alert) -> Result<(), StorageError> {
        let mut alerts = lock(&self.alerts)?;
        let slot = alerts
            .iter_mut()
            .find(|a| a.id == alert.id)
            .ok_or(StorageError::NotFound)?;
        *slot = alert.clone();
        Ok(())
    }

    async fn get_active_alerts(
        &self,
        severity: Option<Severity>,
    ) -> Result<Vec<Alert>, StorageError> {
        let alerts = lock(&self.alerts)?;
        Ok(alerts
            .iter()
            .rev()
            .filter(|a| a.is_open())
            .filter(|a| severity.map_or(true, |s| a.severity == s))
            .cloned()
            .collect())
    }
}

/// Silence repository kept in process memory
pub struct InMemorySilenceRepository {
    silences: Mutex<Vec<SilenceMark>>,
}

impl InMemorySilenceRepository {
    /// Create an empty repository
    pub fn new() -> Self {
        info!("Creating in-memory silence repository");
        Self {
            silences: Mutex::new(Vec::new()),
        }
    }
}

impl Default for InMemorySilenceRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SilenceRepository for InMemorySilenceRepository {
    async fn find_matching(&self, alert: &Alert) -> Result<Vec<SilenceMark>, StorageError> {
        let now = Utc::now();
        let silences = lock(&self.silences)?;
        Ok(silences
            .iter()
            .filter(|s| s.matches(alert, now))
            .cloned()
            .collect())
    }

    async fn save(&self, silence: &SilenceMark) -> Result<(), StorageError> {
        let mut silences = lock(&self.silences)?;
        silences.retain(|s| s.id != silence.id);
        silences.push(silence.clone());
        Ok(())
    }

    async fn find_active(&self) -> Result<Vec<SilenceMark>, StorageError> {
        let now = Utc::now();
        let silences = lock(&self.silences)?;
        Ok(silences.iter().filter(|s| s.is_active(now)).cloned().collect())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<SilenceMark>, StorageError> {
        let silences = lock(&self.silences)?;
        Ok(silences.iter().find(|s| s.id == id).cloned())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StorageError> {
        let mut silences = lock(&self.silences)?;
        let before = silences.len();
        silences.retain(|s| s.id != id);
        if silences.len() == before {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn alert(fingerprint: &str, severity: Severity) -> Alert {
        Alert::new(fingerprint, "DiskFull", severity, Utc::now())
    }

    #[tokio::test]
    async fn test_save_and_find() {
        let repo = InMemoryAlertRepository::new();
        let a = alert("abc123", Severity::Critical);
        repo.save(&a).await.unwrap();

        assert_eq!(repo.find_by_id(a.id).await.unwrap(), Some(a.clone()));
        assert_eq!(repo.find_by_fingerprint("abc123").await.unwrap().len(), 1);
        assert!(repo.find_by_id(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_second_open_alert_conflicts() {
        let repo = InMemoryAlertRepository::new();
        let first = alert("abc123", Severity::Critical);
        repo.save(&first).await.unwrap();

        let err = repo.save(&alert("abc123", Severity::Critical)).await.unwrap_err();
        match err {
            StorageError::Conflict { existing, .. } => assert_eq!(existing, first.id),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_resolved_history_allows_new_alert() {
        let repo = InMemoryAlertRepository::new();
        let mut first = alert("abc123", Severity::Critical);
        repo.save(&first).await.unwrap();
        first.resolve(Utc::now());
        repo.update(&first).await.unwrap();

        let second = alert("abc123", Severity::Critical);
        repo.save(&second).await.unwrap();

        let history = repo.find_by_fingerprint("abc123").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, second.id);
    }

    #[tokio::test]
    async fn test_concurrent_saves_admit_one() {
        let repo = Arc::new(InMemoryAlertRepository::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let repo = repo.clone();
            handles.push(tokio::spawn(async move {
                repo.save(&alert("storm", Severity::Warning)).await.is_ok()
            }));
        }

        let mut ok = 0;
        for h in handles {
            if h.await.unwrap() {
                ok += 1;
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(repo.alert_count(), 1);
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let repo = InMemoryAlertRepository::new();
        let err = repo.update(&alert("abc123", Severity::Info)).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound));
    }

    #[tokio::test]
    async fn test_find_by_channel_external_id() {
        let repo = InMemoryAlertRepository::new();
        let mut a = alert("abc123", Severity::Critical);
        a.set_external_id("slack", "C01:1712.0042");
        repo.save(&a).await.unwrap();

        let found = repo
            .find_by_channel_external_id("slack", "C01:1712.0042")
            .await
            .unwrap();
        assert_eq!(found.map(|f| f.id), Some(a.id));
        assert!(repo
            .find_by_channel_external_id("pagerduty", "C01:1712.0042")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_active_alerts_filter() {
        let repo = InMemoryAlertRepository::new();
        repo.save(&alert("a", Severity::Critical)).await.unwrap();
        repo.save(&alert("b", Severity::Warning)).await.unwrap();
        let mut done = alert("c", Severity::Critical);
        done.resolve(Utc::now());
        repo.save(&done).await.unwrap();

        assert_eq!(repo.get_active_alerts(None).await.unwrap().len(), 2);
        let critical = repo.get_active_alerts(Some(Severity::Critical)).await.unwrap();
        assert_eq!(critical.len(), 1);
        assert_eq!(critical[0].fingerprint, "a");
    }

    #[tokio::test]
    async fn test_silence_lifecycle() {
        let repo = InMemorySilenceRepository::new();
        let now = Utc::now();
        let mut matchers = BTreeMap::new();
        matchers.insert("service".to_string(), "api".to_string());
        let active = SilenceMark::new(
            "alice",
            "slack",
            matchers.clone(),
            "deploy",
            now - Duration::minutes(1),
            now + Duration::hours(1),
        )
        .unwrap();
        let expired = SilenceMark::new(
            "alice",
            "slack",
            matchers,
            "old",
            now - Duration::hours(2),
            now - Duration::hours(1),
        )
        .unwrap();
        repo.save(&active).await.unwrap();
        repo.save(&expired).await.unwrap();

        let mut a = alert("abc123", Severity::Warning);
        a.labels.insert("service".to_string(), "api".to_string());

        let matching = repo.find_matching(&a).await.unwrap();
        assert_eq!(matching.len(), 1);
        assert_eq!(matching[0].id, active.id);
        assert_eq!(repo.find_active().await.unwrap().len(), 1);

        repo.delete(active.id).await.unwrap();
        assert!(repo.find_by_id(active.id).await.unwrap().is_none());
        assert!(matches!(
            repo.delete(active.id).await.unwrap_err(),
            StorageError::NotFound
        ));
    }
}
