//! Summary Route

use alerting::{parse_duration, AlertSummary};
use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    /// Look-back window such as `1h`; absent or `0` counts every open alert
    pub period: Option<String>,
}

pub async fn get_summary(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SummaryQuery>,
) -> Result<Json<AlertSummary>, ApiError> {
    let period = match params.period.as_deref().map(str::trim) {
        None | Some("") | Some("0") => Duration::ZERO,
        Some(raw) => parse_duration(raw)?,
    };
    Ok(Json(state.manager.summarize(period).await?))
}
