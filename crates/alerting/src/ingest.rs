//! Dedup and Ingestion

use crate::error::repo;
use crate::{AlertError, AlertManager};
use alert_model::{Alert, Severity};
use chrono::{DateTime, Utc};
use notify::{CancellationToken, NotificationResult, NotificationStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use storage::StorageError;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Status reported by the alert source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Firing,
    Resolved,
}

/// One inbound firing or resolved notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    pub fingerprint: String,
    pub status: EventStatus,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub instance: String,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub description: String,
    /// Free-form severity label, normalized on ingest
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    pub fired_at: DateTime<Utc>,
}

impl AlertEvent {
    /// Build a new firing alert from this event
    fn into_alert(self) -> Alert {
        let mut alert = Alert::new(
            self.fingerprint,
            self.name,
            Severity::normalize(&self.severity),
            self.fired_at,
        );
        alert.instance = self.instance;
        alert.target = self.target;
        alert.summary = self.summary;
        alert.description = self.description;
        alert.labels = self.labels;
        alert.annotations = self.annotations;
        alert
    }
}

/// What ingestion did with an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestAction {
    /// New alert created (and notified unless silenced)
    Created,
    /// An open alert already covers this fingerprint
    Deduplicated,
    /// Open alert resolved and channels updated
    Resolved,
    /// Resolve for a fingerprint with nothing open
    Skipped,
}

impl IngestAction {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestAction::Created => "created",
            IngestAction::Deduplicated => "deduplicated",
            IngestAction::Resolved => "resolved",
            IngestAction::Skipped => "skipped",
        }
    }
}

/// Result of ingesting one event
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub alert_id: Option<Uuid>,
    pub action: IngestAction,
    pub is_new: bool,
    pub is_silenced: bool,
    pub notifications: Vec<NotificationResult>,
}

impl IngestOutcome {
    fn new(action: IngestAction, alert_id: Option<Uuid>) -> Self {
        Self {
            alert_id,
            action,
            is_new: action == IngestAction::Created,
            is_silenced: false,
            notifications: Vec::new(),
        }
    }

    /// Channels that failed during this ingest
    pub fn failed_channels(&self) -> Vec<&str> {
        self.notifications
            .iter()
            .filter(|n| !n.is_success())
            .map(|n| n.channel.as_str())
            .collect()
    }
}

fn was_cancelled(results: &[NotificationResult]) -> bool {
    results
        .iter()
        .any(|r| r.status == NotificationStatus::Cancelled)
}

impl AlertManager {
    /// Turn an inbound event into a create, dedup, resolve, or no-op.
    ///
    /// Repository errors abort the call. Channel failures are recorded in
    /// the outcome and never stop the remaining channels. Cancellation
    /// during a retry wait surfaces as [`AlertError::Cancelled`] after any
    /// external ids gathered so far have been stored.
    pub async fn ingest(
        &self,
        event: AlertEvent,
        cancel: &CancellationToken,
    ) -> Result<IngestOutcome, AlertError> {
        if event.fingerprint.trim().is_empty() {
            return Err(AlertError::Validation("fingerprint is required".to_string()));
        }

        let current = self.current_alert(&event.fingerprint).await?;
        let outcome = match (event.status, current) {
            (EventStatus::Resolved, None) => {
                debug!("Resolve for {} with no open alert, skipping", event.fingerprint);
                IngestOutcome::new(IngestAction::Skipped, None)
            }
            (EventStatus::Resolved, Some(alert)) => self.resolve_open(alert.id, cancel).await?,
            (EventStatus::Firing, Some(existing)) => {
                debug!(
                    "Alert {} already open for {}, deduplicating",
                    existing.id, existing.fingerprint
                );
                IngestOutcome::new(IngestAction::Deduplicated, Some(existing.id))
            }
            (EventStatus::Firing, None) => self.create(event.into_alert(), cancel).await?,
        };

        metrics::counter!("alerts_ingested_total", "outcome" => outcome.action.as_str())
            .increment(1);
        Ok(outcome)
    }

    async fn create(
        &self,
        alert: Alert,
        cancel: &CancellationToken,
    ) -> Result<IngestOutcome, AlertError> {
        let silenced = self.is_silenced(&alert).await;

        match self.alerts.save(&alert).await {
            Ok(()) => {}
            Err(StorageError::Conflict { existing, .. }) => {
                debug!(
                    "Concurrent ingest already opened {} for {}",
                    existing, alert.fingerprint
                );
                return Ok(IngestOutcome::new(IngestAction::Deduplicated, Some(existing)));
            }
            Err(err) => return Err(repo("save")(err)),
        }

        let mut outcome = IngestOutcome::new(IngestAction::Created, Some(alert.id));
        if silenced {
            info!(
                "Alert {} ({}) created silenced, no notifications sent",
                alert.id, alert.fingerprint
            );
            outcome.is_silenced = true;
            return Ok(outcome);
        }

        info!(
            "Alert {} ({}) firing with severity {}",
            alert.id, alert.fingerprint, alert.severity
        );
        let results = self.notifier.deliver_all(&alert, cancel).await;

        let external_ids: BTreeMap<String, String> = results
            .iter()
            .filter_map(|r| Some((r.channel.clone(), r.external_id.clone()?)))
            .collect();
        if !external_ids.is_empty() {
            self.record_external_ids(alert.id, external_ids).await?;
        }

        if was_cancelled(&results) {
            return Err(AlertError::Cancelled);
        }
        outcome.notifications = results;
        Ok(outcome)
    }

    async fn resolve_open(
        &self,
        alert_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<IngestOutcome, AlertError> {
        // Re-read so an ack that landed after the fingerprint lookup is kept
        let mut alert = self.get_alert(alert_id).await?;
        if !alert.resolve(Utc::now()) {
            debug!("Alert {} already resolved, skipping", alert.id);
            return Ok(IngestOutcome::new(IngestAction::Skipped, Some(alert.id)));
        }
        self.alerts.update(&alert).await.map_err(repo("update"))?;
        info!("Alert {} ({}) resolved", alert.id, alert.fingerprint);

        let results = self.notifier.update_all(&alert, |_| true, cancel).await;
        if was_cancelled(&results) {
            return Err(AlertError::Cancelled);
        }

        let mut outcome = IngestOutcome::new(IngestAction::Resolved, Some(alert.id));
        outcome.notifications = results;
        Ok(outcome)
    }

    /// Whether an active silence covers `alert`.
    ///
    /// A failing silence lookup counts as "not silenced" so delivery is
    /// never blocked by it.
    async fn is_silenced(&self, alert: &Alert) -> bool {
        match self.silences.find_matching(alert).await {
            Ok(matching) if matching.is_empty() => false,
            Ok(matching) => {
                let ids: Vec<String> = matching.iter().map(|s| s.id.to_string()).collect();
                debug!("Alert {} matched silences {:?}", alert.fingerprint, ids);
                true
            }
            Err(err) => {
                warn!(
                    "Silence lookup failed for {}, delivering anyway: {}",
                    alert.fingerprint, err
                );
                false
            }
        }
    }
}
