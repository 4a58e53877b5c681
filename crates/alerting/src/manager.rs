//! Alert Manager Implementation

use crate::error::repo;
use crate::{AckPolicy, AlertError};
use alert_model::{Alert, Severity};
use notify::{Channel, Notifier, RetryPolicy};
use std::collections::BTreeMap;
use std::sync::Arc;
use storage::{AlertRepository, SilenceRepository};
use tracing::{debug, info};
use uuid::Uuid;

/// Default length of the top acknowledgers list
const DEFAULT_TOP_N: usize = 5;

/// Canonical alert record keeper and entry point for every adapter.
///
/// Each inbound webhook or command is one independent call; there is no
/// internal queue and no global lock. The at-most-one-open-alert rule per
/// fingerprint is enforced by the alert repository.
pub struct AlertManager {
    pub(crate) alerts: Arc<dyn AlertRepository>,
    pub(crate) silences: Arc<dyn SilenceRepository>,
    pub(crate) notifier: Notifier,
    pub(crate) ack_policy: AckPolicy,
    pub(crate) top_n: usize,
}

impl AlertManager {
    /// Create a new alert manager fanning out to `channels` in order
    pub fn new(
        alerts: Arc<dyn AlertRepository>,
        silences: Arc<dyn SilenceRepository>,
        channels: Vec<Arc<dyn Channel>>,
        retry_policy: RetryPolicy,
    ) -> Self {
        info!("Creating alert manager");
        Self {
            alerts,
            silences,
            notifier: Notifier::new(channels, retry_policy),
            ack_policy: AckPolicy::default(),
            top_n: DEFAULT_TOP_N,
        }
    }

    /// Replace the acknowledgment propagation policy
    pub fn with_ack_policy(mut self, policy: AckPolicy) -> Self {
        self.ack_policy = policy;
        self
    }

    /// Set how many acknowledgers a summary ranks
    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    /// Configured channel names in fan-out order
    pub fn channel_names(&self) -> Vec<String> {
        self.notifier.channel_names()
    }

    /// Non-resolved alerts, newest first, optionally of one severity
    pub async fn query_active(&self, severity: Option<Severity>) -> Result<Vec<Alert>, AlertError> {
        self.alerts
            .get_active_alerts(severity)
            .await
            .map_err(repo("get_active_alerts"))
    }

    /// Load one alert by id
    pub async fn get_alert(&self, id: Uuid) -> Result<Alert, AlertError> {
        self.alerts
            .find_by_id(id)
            .await
            .map_err(repo("find_by_id"))?
            .ok_or_else(|| AlertError::not_found("alert", id))
    }

    /// The open (firing or acknowledged) alert for a fingerprint, if any
    pub(crate) async fn current_alert(&self, fingerprint: &str) -> Result<Option<Alert>, AlertError> {
        let history = self
            .alerts
            .find_by_fingerprint(fingerprint)
            .await
            .map_err(repo("find_by_fingerprint"))?;
        Ok(history.into_iter().find(Alert::is_open))
    }

    /// Merge freshly returned external ids into the stored record.
    ///
    /// The record is re-read first so a concurrent ack or resolve that
    /// landed during delivery is not overwritten.
    pub(crate) async fn record_external_ids(
        &self,
        alert_id: Uuid,
        external_ids: BTreeMap<String, String>,
    ) -> Result<Alert, AlertError> {
        let mut stored = self.get_alert(alert_id).await?;
        for (channel, external_id) in external_ids {
            stored.set_external_id(channel, external_id);
        }
        self.alerts
            .update(&stored)
            .await
            .map_err(repo("update_external_ids"))?;
        debug!("Stored {} external ids for alert {}", stored.external_ids.len(), alert_id);
        Ok(stored)
    }
}
