//! Alertmanager Webhook

use alerting::{AlertError, AlertEvent, EventStatus, IngestOutcome};
use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::AppState;

/// Alertmanager webhook payload (version 4)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertmanagerPayload {
    #[serde(default)]
    pub receiver: String,
    #[serde(default)]
    pub group_key: String,
    #[serde(default)]
    pub alerts: Vec<AlertmanagerAlert>,
}

/// One alert inside an Alertmanager notification
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertmanagerAlert {
    pub status: String,
    #[serde(default)]
    pub fingerprint: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    pub starts_at: Option<DateTime<Utc>>,
}

impl AlertmanagerAlert {
    fn into_event(self) -> AlertEvent {
        let label = |key: &str| self.labels.get(key).cloned().unwrap_or_default();
        let annotation = |key: &str| self.annotations.get(key).cloned().unwrap_or_default();

        let status = if self.status.eq_ignore_ascii_case("resolved") {
            EventStatus::Resolved
        } else {
            EventStatus::Firing
        };
        let target = self
            .labels
            .get("service")
            .or_else(|| self.labels.get("job"))
            .cloned()
            .unwrap_or_default();

        AlertEvent {
            fingerprint: self.fingerprint.clone(),
            status,
            name: label("alertname"),
            instance: label("instance"),
            target,
            summary: annotation("summary"),
            description: annotation("description"),
            severity: label("severity"),
            labels: self.labels.clone(),
            annotations: self.annotations.clone(),
            fired_at: self.starts_at.unwrap_or_else(Utc::now),
        }
    }
}

/// Per-alert processing result
#[derive(Debug, Serialize)]
pub struct WebhookResult {
    pub fingerprint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    pub is_new: bool,
    pub is_silenced: bool,
    pub failed_channels: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WebhookResult {
    fn processed(fingerprint: String, outcome: &IngestOutcome) -> Self {
        Self {
            fingerprint,
            alert_id: outcome.alert_id,
            action: Some(outcome.action.as_str().to_string()),
            is_new: outcome.is_new,
            is_silenced: outcome.is_silenced,
            failed_channels: outcome
                .failed_channels()
                .into_iter()
                .map(str::to_string)
                .collect(),
            error: None,
        }
    }

    fn failed(fingerprint: String, err: &AlertError) -> Self {
        Self {
            fingerprint,
            alert_id: None,
            action: None,
            is_new: false,
            is_silenced: false,
            failed_channels: Vec::new(),
            error: Some(err.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub processed: usize,
    pub results: Vec<WebhookResult>,
}

/// Ingest every alert in an Alertmanager notification.
///
/// Answers 500 when any alert hit a storage failure or was cancelled so
/// Alertmanager redelivers the batch; redelivered firing alerts dedup.
/// Answers 400 only when every alert was malformed.
pub async fn alertmanager(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<AlertmanagerPayload>,
) -> (StatusCode, Json<WebhookResponse>) {
    info!(
        "Alertmanager notification for {} with {} alerts (group {})",
        payload.receiver,
        payload.alerts.len(),
        payload.group_key
    );

    let mut results = Vec::with_capacity(payload.alerts.len());
    let mut processed = 0;
    let mut retryable = false;

    for alert in payload.alerts {
        let fingerprint = alert.fingerprint.clone();
        match state.manager.ingest(alert.into_event(), &state.shutdown).await {
            Ok(outcome) => {
                processed += 1;
                results.push(WebhookResult::processed(fingerprint, &outcome));
            }
            Err(e) => {
                warn!("Failed to ingest alert {:?}: {}", fingerprint, e);
                retryable |= !matches!(e, AlertError::Validation(_));
                results.push(WebhookResult::failed(fingerprint, &e));
            }
        }
    }

    let status = if retryable {
        StatusCode::INTERNAL_SERVER_ERROR
    } else if processed == 0 && !results.is_empty() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::OK
    };
    (status, Json(WebhookResponse { processed, results }))
}
