//! Shared fixtures for engine tests

use crate::{AlertEvent, AlertManager, EventStatus};
use alert_model::{Alert, SilenceMark};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use notify::{CancellationToken, Channel, MockChannel, RetryPolicy};
use std::sync::Arc;
use storage::{
    InMemoryAlertRepository, InMemorySilenceRepository, SilenceRepository, StorageError,
};
use uuid::Uuid;

pub(crate) struct Harness {
    pub manager: AlertManager,
    pub alerts: Arc<InMemoryAlertRepository>,
    pub silences: Arc<InMemorySilenceRepository>,
    pub slack: Arc<MockChannel>,
    pub pagerduty: Arc<MockChannel>,
    pub cancel: CancellationToken,
}

impl Harness {
    pub fn new() -> Self {
        let silences = Arc::new(InMemorySilenceRepository::new());
        Self::build(silences.clone(), silences)
    }

    pub fn with_silences(override_repo: Arc<dyn SilenceRepository>) -> Self {
        Self::build(Arc::new(InMemorySilenceRepository::new()), override_repo)
    }

    fn build(
        silences: Arc<InMemorySilenceRepository>,
        manager_silences: Arc<dyn SilenceRepository>,
    ) -> Self {
        let alerts = Arc::new(InMemoryAlertRepository::new());
        let slack = Arc::new(MockChannel::new("slack"));
        let pagerduty = Arc::new(MockChannel::new("pagerduty"));

        let manager = AlertManager::new(
            alerts.clone(),
            manager_silences,
            vec![
                slack.clone() as Arc<dyn Channel>,
                pagerduty.clone() as Arc<dyn Channel>,
            ],
            RetryPolicy::no_retry(),
        );

        Self {
            manager,
            alerts,
            silences,
            slack,
            pagerduty,
            cancel: CancellationToken::new(),
        }
    }

    /// Save an hour-long silence with the given matchers
    pub async fn silence(&self, matchers: &[(&str, &str)]) -> SilenceMark {
        let now = Utc::now();
        let silence = SilenceMark::new(
            "alice",
            "slack",
            matchers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            "maintenance",
            now - Duration::minutes(1),
            now + Duration::hours(1),
        )
        .unwrap();
        self.silences.save(&silence).await.unwrap();
        silence
    }
}

pub(crate) fn event(fingerprint: &str, status: EventStatus, severity: &str) -> AlertEvent {
    AlertEvent {
        fingerprint: fingerprint.to_string(),
        status,
        name: "HighLatency".to_string(),
        instance: "api-1:9100".to_string(),
        target: "api".to_string(),
        summary: "p99 latency above 2s".to_string(),
        description: String::new(),
        severity: severity.to_string(),
        labels: Default::default(),
        annotations: Default::default(),
        fired_at: Utc::now(),
    }
}

/// Silence repository whose every call fails
pub(crate) struct BrokenSilences;

#[async_trait]
impl SilenceRepository for BrokenSilences {
    async fn find_matching(&self, _alert: &Alert) -> Result<Vec<SilenceMark>, StorageError> {
        Err(StorageError::DatabaseError("connection refused".into()))
    }

    async fn save(&self, _silence: &SilenceMark) -> Result<(), StorageError> {
        Err(StorageError::DatabaseError("connection refused".into()))
    }

    async fn find_active(&self) -> Result<Vec<SilenceMark>, StorageError> {
        Err(StorageError::DatabaseError("connection refused".into()))
    }

    async fn find_by_id(&self, _id: Uuid) -> Result<Option<SilenceMark>, StorageError> {
        Err(StorageError::DatabaseError("connection refused".into()))
    }

    async fn delete(&self, _id: Uuid) -> Result<(), StorageError> {
        Err(StorageError::DatabaseError("connection refused".into()))
    }
}
