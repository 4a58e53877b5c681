//! Alert Routes

use alert_model::{Alert, Severity};
use alerting::{parse_duration, AckOutcome, AckTransition};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::{ApiError, AppState};

/// Query parameters for alerts endpoint
#[derive(Debug, Deserialize)]
pub struct AlertQuery {
    /// Filter by severity
    pub severity: Option<String>,
}

/// Response for alerts endpoint
#[derive(Debug, Serialize)]
pub struct AlertResponse {
    pub data: Vec<Alert>,
    pub count: usize,
    pub unacknowledged_count: usize,
}

/// Ack issued through the API or a channel callback
#[derive(Debug, Deserialize)]
pub struct AckRequest {
    pub actor: String,
    /// Channel the ack came from, skipped when propagating
    #[serde(default = "default_source")]
    pub source: String,
    /// Keep the fingerprint silenced for this long, e.g. `4h`
    pub duration: Option<String>,
}

fn default_source() -> String {
    "api".to_string()
}

/// Ack state change reported by a channel for one of its messages
#[derive(Debug, Deserialize)]
pub struct ChannelAckRequest {
    pub external_id: String,
    pub actor: String,
    #[serde(default = "default_transition")]
    pub transition: AckTransition,
    pub duration: Option<String>,
}

fn default_transition() -> AckTransition {
    AckTransition::Acknowledged
}

fn ack_ttl(duration: Option<&str>) -> Result<Option<std::time::Duration>, ApiError> {
    Ok(duration.map(parse_duration).transpose()?)
}

/// Get active alerts
pub async fn list_alerts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AlertQuery>,
) -> Result<Json<AlertResponse>, ApiError> {
    let severity = params
        .severity
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(str::parse::<Severity>)
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let alerts = state.manager.query_active(severity).await?;
    let unacknowledged_count = alerts.iter().filter(|a| a.acked_at.is_none()).count();

    Ok(Json(AlertResponse {
        count: alerts.len(),
        unacknowledged_count,
        data: alerts,
    }))
}

pub async fn get_alert(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Alert>, ApiError> {
    Ok(Json(state.manager.get_alert(id).await?))
}

/// Acknowledge an alert and propagate to the other channels
pub async fn ack_alert(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<AckRequest>,
) -> Result<Json<AckOutcome>, ApiError> {
    let ttl = ack_ttl(request.duration.as_deref())?;
    let outcome = state
        .manager
        .sync_ack(id, &request.source, &request.actor, ttl, &state.shutdown)
        .await?;
    Ok(Json(outcome))
}

/// Apply an ack reported by `channel`, located by its external id
pub async fn channel_ack(
    State(state): State<Arc<AppState>>,
    Path(channel): Path<String>,
    Json(request): Json<ChannelAckRequest>,
) -> Result<Json<AckOutcome>, ApiError> {
    let ttl = ack_ttl(request.duration.as_deref())?;
    let outcome = state
        .manager
        .sync_ack_external(
            &channel,
            &request.external_id,
            request.transition,
            &request.actor,
            ttl,
            &state.shutdown,
        )
        .await?;
    Ok(Json(outcome))
}
