//! Acknowledgment Synchronization

use crate::error::repo;
use crate::{AlertError, AlertManager};
use alert_model::{Alert, SilenceMark};
use chrono::Utc;
use notify::{CancellationToken, NotificationResult, NotificationStatus};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Acknowledgment transition reported by a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckTransition {
    /// A human took the alert
    Acknowledged,
    /// The channel reverted its ack, e.g. a paging ack timeout
    Unacknowledged,
}

/// Rules deciding where an observed acknowledgment travels
#[derive(Debug, Clone, Default)]
pub struct AckPolicy;

impl AckPolicy {
    /// Whether a transition reported by a channel changes the canonical
    /// record. Timeout-driven reverts would cancel a human ack that is
    /// still valid elsewhere, so they stay local to their channel.
    pub fn propagates(&self, transition: AckTransition) -> bool {
        matches!(transition, AckTransition::Acknowledged)
    }

    /// Whether an ack that arrived from `source` is pushed to `channel`.
    /// The originating channel already shows the action.
    pub fn targets(&self, source: &str, channel: &str) -> bool {
        source != channel
    }
}

/// Result of an acknowledgment sync
#[derive(Debug, Clone, Serialize)]
pub struct AckOutcome {
    pub alert: Alert,
    /// False when the alert was already acknowledged or resolved, or the
    /// transition is not propagated
    pub applied: bool,
    pub notifications: Vec<NotificationResult>,
    /// Companion silence created for a time-limited ack
    pub expiry_silence: Option<SilenceMark>,
}

impl AckOutcome {
    fn unchanged(alert: Alert) -> Self {
        Self {
            alert,
            applied: false,
            notifications: Vec::new(),
            expiry_silence: None,
        }
    }
}

fn require(field: &str, value: &str) -> Result<(), AlertError> {
    if value.trim().is_empty() {
        return Err(AlertError::Validation(format!("{} is required", field)));
    }
    Ok(())
}

impl AlertManager {
    /// Acknowledge alert `alert_id` on behalf of `actor`, as observed on
    /// channel `source`, and mirror it to every other channel.
    ///
    /// Already acknowledged or resolved alerts are returned unchanged with
    /// no channel traffic. With `ttl`, a silence scoped to the alert's
    /// fingerprint is created for that long.
    pub async fn sync_ack(
        &self,
        alert_id: Uuid,
        source: &str,
        actor: &str,
        ttl: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<AckOutcome, AlertError> {
        require("source", source)?;
        require("actor", actor)?;
        let ttl = ttl
            .map(|ttl| {
                chrono::Duration::from_std(ttl)
                    .ok()
                    .filter(|d| *d > chrono::Duration::zero())
                    .ok_or_else(|| {
                        AlertError::Validation(format!("invalid ack duration {:?}", ttl))
                    })
            })
            .transpose()?;

        let mut alert = self.get_alert(alert_id).await?;
        let now = Utc::now();

        if !alert.acknowledge(actor, now) {
            debug!(
                "Alert {} already {}, ignoring ack from {} via {}",
                alert.id, alert.state, actor, source
            );
            metrics::counter!("acks_synced_total", "outcome" => "noop").increment(1);
            return Ok(AckOutcome::unchanged(alert));
        }

        // Expiry silence goes first; if it fails the alert stays firing
        let expiry_silence = match ttl {
            Some(ttl) => {
                let end_at = now.checked_add_signed(ttl).ok_or_else(|| {
                    AlertError::Validation("ack expiry is too far in the future".to_string())
                })?;
                let silence = SilenceMark::for_fingerprint(
                    &alert.fingerprint,
                    actor,
                    source,
                    format!("acknowledged by {}", actor),
                    now,
                    end_at,
                )
                .map_err(|e| AlertError::Validation(e.to_string()))?;
                self.silences
                    .save(&silence)
                    .await
                    .map_err(repo("save_silence"))?;
                debug!("Ack on {} expires at {}", alert.fingerprint, silence.end_at);
                Some(silence)
            }
            None => None,
        };

        if let Err(err) = self.alerts.update(&alert).await {
            if let Some(silence) = &expiry_silence {
                if let Err(cleanup) = self.silences.delete(silence.id).await {
                    warn!("Failed to remove expiry silence {}: {}", silence.id, cleanup);
                }
            }
            return Err(repo("update")(err));
        }
        info!("Alert {} acknowledged by {} via {}", alert.id, actor, source);

        let policy = &self.ack_policy;
        let notifications = self
            .notifier
            .update_all(&alert, |channel| policy.targets(source, channel), cancel)
            .await;
        if notifications
            .iter()
            .any(|n| n.status == NotificationStatus::Cancelled)
        {
            return Err(AlertError::Cancelled);
        }

        metrics::counter!("acks_synced_total", "outcome" => "applied").increment(1);
        Ok(AckOutcome {
            alert,
            applied: true,
            notifications,
            expiry_silence,
        })
    }

    /// Handle an ack transition reported by `channel` for its message or
    /// incident `external_id`.
    pub async fn sync_ack_external(
        &self,
        channel: &str,
        external_id: &str,
        transition: AckTransition,
        actor: &str,
        ttl: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<AckOutcome, AlertError> {
        let alert = self
            .alerts
            .find_by_channel_external_id(channel, external_id)
            .await
            .map_err(repo("find_by_channel_external_id"))?
            .ok_or_else(|| AlertError::not_found("alert", format!("{}:{}", channel, external_id)))?;

        if !self.ack_policy.propagates(transition) {
            info!(
                "Ignoring {:?} of alert {} reported by {}",
                transition, alert.id, channel
            );
            metrics::counter!("acks_synced_total", "outcome" => "suppressed").increment(1);
            return Ok(AckOutcome::unchanged(alert));
        }

        self.sync_ack(alert.id, channel, actor, ttl, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{event, BrokenSilences, Harness};
    use crate::EventStatus;
    use alert_model::{AlertState, FINGERPRINT_KEY};
    use std::sync::Arc;
    use notify::ChannelError;
    use storage::SilenceRepository;

    async fn firing(h: &Harness, fingerprint: &str) -> Uuid {
        h.manager
            .ingest(event(fingerprint, EventStatus::Firing, "critical"), &h.cancel)
            .await
            .unwrap()
            .alert_id
            .unwrap()
    }

    #[test]
    fn test_policy_predicates() {
        let policy = AckPolicy;
        assert!(policy.propagates(AckTransition::Acknowledged));
        assert!(!policy.propagates(AckTransition::Unacknowledged));
        assert!(!policy.targets("slack", "slack"));
        assert!(policy.targets("slack", "pagerduty"));
    }

    #[tokio::test]
    async fn test_ack_updates_other_channels_only() {
        let h = Harness::new();
        let id = firing(&h, "abc123").await;

        let outcome = h
            .manager
            .sync_ack(id, "slack", "alice", None, &h.cancel)
            .await
            .unwrap();
        assert!(outcome.applied);
        assert_eq!(outcome.alert.state, AlertState::Acknowledged);
        assert_eq!(outcome.notifications.len(), 1);
        assert_eq!(outcome.notifications[0].channel, "pagerduty");
        assert_eq!(h.slack.updates(), 0);
        assert_eq!(h.pagerduty.updates(), 1);

        let stored = h.manager.get_alert(id).await.unwrap();
        assert_eq!(stored.acked_by.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_second_ack_is_idempotent() {
        let h = Harness::new();
        let id = firing(&h, "abc123").await;

        let first = h
            .manager
            .sync_ack(id, "slack", "alice", None, &h.cancel)
            .await
            .unwrap();
        let updates_after_first = h.slack.updates() + h.pagerduty.updates();

        let second = h
            .manager
            .sync_ack(id, "pagerduty", "bob", None, &h.cancel)
            .await
            .unwrap();
        assert!(!second.applied);
        assert!(second.notifications.is_empty());
        assert_eq!(second.alert.acked_by, first.alert.acked_by);
        assert_eq!(second.alert.acked_at, first.alert.acked_at);
        assert_eq!(h.slack.updates() + h.pagerduty.updates(), updates_after_first);
    }

    #[tokio::test]
    async fn test_ack_resolved_alert_is_noop() {
        let h = Harness::new();
        let id = firing(&h, "abc123").await;
        h.manager
            .ingest(event("abc123", EventStatus::Resolved, "critical"), &h.cancel)
            .await
            .unwrap();
        let updates = h.slack.updates() + h.pagerduty.updates();

        let outcome = h
            .manager
            .sync_ack(id, "slack", "alice", None, &h.cancel)
            .await
            .unwrap();
        assert!(!outcome.applied);
        assert_eq!(outcome.alert.state, AlertState::Resolved);
        assert!(outcome.alert.acked_by.is_none());
        assert_eq!(h.slack.updates() + h.pagerduty.updates(), updates);
    }

    #[tokio::test]
    async fn test_unknown_alert_is_not_found() {
        let h = Harness::new();
        let err = h
            .manager
            .sync_ack(Uuid::new_v4(), "slack", "alice", None, &h.cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, AlertError::NotFound { kind: "alert", .. }));
    }

    #[tokio::test]
    async fn test_blank_actor_rejected() {
        let h = Harness::new();
        let id = firing(&h, "abc123").await;
        let err = h
            .manager
            .sync_ack(id, "slack", " ", None, &h.cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, AlertError::Validation(_)));
        assert_eq!(
            h.manager.get_alert(id).await.unwrap().state,
            AlertState::Firing
        );
    }

    #[tokio::test]
    async fn test_ack_via_external_id() {
        let h = Harness::new();
        let id = firing(&h, "abc123").await;

        let outcome = h
            .manager
            .sync_ack_external(
                "pagerduty",
                "pagerduty-1",
                AckTransition::Acknowledged,
                "carol",
                None,
                &h.cancel,
            )
            .await
            .unwrap();
        assert_eq!(outcome.alert.id, id);
        assert!(outcome.applied);
        assert_eq!(h.slack.updates(), 1);
        assert_eq!(h.pagerduty.updates(), 0);
    }

    #[tokio::test]
    async fn test_unacknowledge_is_not_propagated() {
        let h = Harness::new();
        let id = firing(&h, "abc123").await;
        h.manager
            .sync_ack(id, "slack", "alice", None, &h.cancel)
            .await
            .unwrap();
        let updates = h.slack.updates() + h.pagerduty.updates();

        let outcome = h
            .manager
            .sync_ack_external(
                "pagerduty",
                "pagerduty-1",
                AckTransition::Unacknowledged,
                "pagerduty",
                None,
                &h.cancel,
            )
            .await
            .unwrap();
        assert!(!outcome.applied);
        assert_eq!(outcome.alert.state, AlertState::Acknowledged);
        assert_eq!(h.slack.updates() + h.pagerduty.updates(), updates);
    }

    #[tokio::test]
    async fn test_unknown_external_id_is_not_found() {
        let h = Harness::new();
        let err = h
            .manager
            .sync_ack_external(
                "slack",
                "nope",
                AckTransition::Acknowledged,
                "alice",
                None,
                &h.cancel,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AlertError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_ack_with_ttl_creates_fingerprint_silence() {
        let h = Harness::new();
        let id = firing(&h, "abc123").await;

        let outcome = h
            .manager
            .sync_ack(
                id,
                "slack",
                "alice",
                Some(Duration::from_secs(2 * 3600)),
                &h.cancel,
            )
            .await
            .unwrap();
        let silence = outcome.expiry_silence.unwrap();
        assert_eq!(
            silence.matchers.get(FINGERPRINT_KEY).map(String::as_str),
            Some("abc123")
        );
        assert_eq!(silence.created_by, "alice");
        assert_eq!(silence.source, "slack");
        assert_eq!(silence.end_at - silence.start_at, chrono::Duration::hours(2));
        assert!(h.silences.find_by_id(silence.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_ack_with_unrepresentable_ttl_is_rejected() {
        let h = Harness::new();
        let id = firing(&h, "abc123").await;
        let ttl = crate::parse_duration("1000000years").unwrap();

        let err = h
            .manager
            .sync_ack(id, "slack", "alice", Some(ttl), &h.cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, AlertError::Validation(_)));
        assert_eq!(
            h.manager.get_alert(id).await.unwrap().state,
            AlertState::Firing
        );
        assert_eq!(h.pagerduty.updates(), 0);
        assert!(h.silences.find_active().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_expiry_silence_leaves_alert_firing() {
        let h = Harness::with_silences(Arc::new(BrokenSilences));
        let id = firing(&h, "abc123").await;

        let err = h
            .manager
            .sync_ack(id, "slack", "alice", Some(Duration::from_secs(3600)), &h.cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, AlertError::Repository { op: "save_silence", .. }));
        assert_eq!(
            h.manager.get_alert(id).await.unwrap().state,
            AlertState::Firing
        );
        assert_eq!(h.pagerduty.updates(), 0);

        // Retrying without the expiry applies the ack and reaches the other channel
        let retried = h
            .manager
            .sync_ack(id, "slack", "alice", None, &h.cancel)
            .await
            .unwrap();
        assert!(retried.applied);
        assert_eq!(h.pagerduty.updates(), 1);
    }

    #[tokio::test]
    async fn test_ack_survives_channel_failure() {
        let h = Harness::new();
        let id = firing(&h, "abc123").await;
        h.pagerduty
            .fail_next(ChannelError::Transient("502 bad gateway".into()));

        let outcome = h
            .manager
            .sync_ack(id, "slack", "alice", None, &h.cancel)
            .await
            .unwrap();
        assert!(outcome.applied);
        assert!(!outcome.notifications[0].is_success());
        assert_eq!(
            h.manager.get_alert(id).await.unwrap().state,
            AlertState::Acknowledged
        );
    }
}
