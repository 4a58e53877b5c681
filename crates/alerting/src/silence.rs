//! Silence Management

use crate::error::{parse_duration, repo};
use crate::{AlertError, AlertManager};
use alert_model::{SilenceMark, FINGERPRINT_KEY};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;
use uuid::Uuid;

/// Parameters for creating a silence
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SilenceRequest {
    /// Label key → required value
    #[serde(default)]
    pub matchers: BTreeMap<String, String>,
    /// Limit the silence to a single fingerprint
    #[serde(default)]
    pub fingerprint: Option<String>,
    /// How long the silence lasts, e.g. `30m` or `2h`
    pub duration: String,
    #[serde(default)]
    pub reason: String,
    pub created_by: String,
    /// Channel the request came from
    #[serde(default)]
    pub source: String,
}

/// Silence management command
#[derive(Debug, Clone)]
pub enum SilenceAction {
    Create(SilenceRequest),
    /// Currently active silences
    List,
    Get(Uuid),
    Delete(Uuid),
}

/// Result of a silence management command
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", content = "data", rename_all = "lowercase")]
pub enum SilenceResult {
    Created(SilenceMark),
    Listed(Vec<SilenceMark>),
    Found(SilenceMark),
    Deleted(Uuid),
}

impl AlertManager {
    /// Create, list, look up, or delete silences.
    ///
    /// Silences only apply to alerts ingested after they start; alerts that
    /// already notified are not retroactively suppressed.
    pub async fn manage_silence(&self, action: SilenceAction) -> Result<SilenceResult, AlertError> {
        match action {
            SilenceAction::Create(request) => self.create_silence(request).await,
            SilenceAction::List => {
                let active = self
                    .silences
                    .find_active()
                    .await
                    .map_err(repo("find_active_silences"))?;
                Ok(SilenceResult::Listed(active))
            }
            SilenceAction::Get(id) => Ok(SilenceResult::Found(self.get_silence(id).await?)),
            SilenceAction::Delete(id) => {
                self.get_silence(id).await?;
                self.silences
                    .delete(id)
                    .await
                    .map_err(repo("delete_silence"))?;
                info!("Silence {} deleted", id);
                Ok(SilenceResult::Deleted(id))
            }
        }
    }

    async fn get_silence(&self, id: Uuid) -> Result<SilenceMark, AlertError> {
        self.silences
            .find_by_id(id)
            .await
            .map_err(repo("find_silence"))?
            .ok_or_else(|| AlertError::not_found("silence", id))
    }

    async fn create_silence(&self, request: SilenceRequest) -> Result<SilenceResult, AlertError> {
        if request.created_by.trim().is_empty() {
            return Err(AlertError::Validation("created_by is required".to_string()));
        }
        let duration = parse_duration(&request.duration)?;
        let duration = chrono::Duration::from_std(duration).map_err(|_| {
            AlertError::Validation(format!("duration '{}' is too long", request.duration))
        })?;

        let mut matchers = request.matchers;
        if let Some(fingerprint) = request.fingerprint.filter(|f| !f.trim().is_empty()) {
            matchers.insert(FINGERPRINT_KEY.to_string(), fingerprint);
        }
        if matchers.is_empty() {
            return Err(AlertError::Validation(
                "a silence needs at least one matcher or a fingerprint".to_string(),
            ));
        }
        if matchers.keys().any(|k| k.trim().is_empty()) {
            return Err(AlertError::Validation("matcher keys must not be empty".to_string()));
        }

        let now = Utc::now();
        let end_at = now
            .checked_add_signed(duration)
            .ok_or_else(|| AlertError::Validation("silence ends too far in the future".into()))?;
        let silence = SilenceMark::new(
            request.created_by,
            request.source,
            matchers,
            request.reason,
            now,
            end_at,
        )
        .map_err(|e| AlertError::Validation(e.to_string()))?;

        self.silences
            .save(&silence)
            .await
            .map_err(repo("save_silence"))?;
        info!(
            "Silence {} created by {} until {} for {:?}",
            silence.id, silence.created_by, silence.end_at, silence.matchers
        );
        Ok(SilenceResult::Created(silence))
    }
}
