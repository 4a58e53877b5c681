//! Silence Routes

use alert_model::SilenceMark;
use alerting::{SilenceAction, SilenceRequest, SilenceResult};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::{ApiError, AppState};

#[derive(Debug, Serialize)]
pub struct SilenceListResponse {
    pub data: Vec<SilenceMark>,
    pub count: usize,
}

fn unexpected(result: SilenceResult) -> ApiError {
    ApiError::Internal(format!("unexpected silence result: {:?}", result))
}

/// Active silences
pub async fn list_silences(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SilenceListResponse>, ApiError> {
    match state.manager.manage_silence(SilenceAction::List).await? {
        SilenceResult::Listed(data) => Ok(Json(SilenceListResponse {
            count: data.len(),
            data,
        })),
        other => Err(unexpected(other)),
    }
}

pub async fn create_silence(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SilenceRequest>,
) -> Result<(StatusCode, Json<SilenceMark>), ApiError> {
    match state
        .manager
        .manage_silence(SilenceAction::Create(request))
        .await?
    {
        SilenceResult::Created(silence) => Ok((StatusCode::CREATED, Json(silence))),
        other => Err(unexpected(other)),
    }
}

pub async fn get_silence(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SilenceMark>, ApiError> {
    match state.manager.manage_silence(SilenceAction::Get(id)).await? {
        SilenceResult::Found(silence) => Ok(Json(silence)),
        other => Err(unexpected(other)),
    }
}

pub async fn delete_silence(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state
        .manager
        .manage_silence(SilenceAction::Delete(id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
