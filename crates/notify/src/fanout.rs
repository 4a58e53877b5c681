//! Notification Fan-out

use crate::{Channel, ChannelError, RetryPolicy, RetryReport, RetryingChannel};
use alert_model::Alert;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Which channel operation a result refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationOp {
    Deliver,
    Update,
}

/// Per-channel outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Delivered,
    Updated,
    Failed,
    Cancelled,
}

impl NotificationStatus {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Delivered => "delivered",
            NotificationStatus::Updated => "updated",
            NotificationStatus::Failed => "failed",
            NotificationStatus::Cancelled => "cancelled",
        }
    }
}

/// Result of one channel operation within a fan-out
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationResult {
    pub channel: String,
    pub operation: NotificationOp,
    pub status: NotificationStatus,
    /// Message/incident id returned by a successful delivery
    pub external_id: Option<String>,
    pub error: Option<String>,
    pub attempts: u32,
}

impl NotificationResult {
    fn from_report<T>(
        channel: &str,
        operation: NotificationOp,
        report: RetryReport<T>,
        external_id: impl FnOnce(T) -> Option<String>,
    ) -> Self {
        let (status, external_id, error) = match report.result {
            Ok(value) => {
                let status = match operation {
                    NotificationOp::Deliver => NotificationStatus::Delivered,
                    NotificationOp::Update => NotificationStatus::Updated,
                };
                (status, external_id(value), None)
            }
            Err(ChannelError::Cancelled) => (
                NotificationStatus::Cancelled,
                None,
                Some(ChannelError::Cancelled.to_string()),
            ),
            Err(err) => (NotificationStatus::Failed, None, Some(err.to_string())),
        };

        metrics::counter!(
            "notifications_total",
            "channel" => channel.to_string(),
            "outcome" => status.as_str()
        )
        .increment(1);

        Self {
            channel: channel.to_string(),
            operation,
            status,
            external_id,
            error,
            attempts: report.attempts,
        }
    }

    /// Whether the channel accepted the operation
    pub fn is_success(&self) -> bool {
        matches!(
            self.status,
            NotificationStatus::Delivered | NotificationStatus::Updated
        )
    }
}

/// Sequential fan-out over an ordered list of retrying channels
pub struct Notifier {
    channels: Vec<RetryingChannel<Arc<dyn Channel>>>,
}

impl Notifier {
    /// Wrap every channel in a retry decorator sharing `policy`
    pub fn new(channels: Vec<Arc<dyn Channel>>, policy: RetryPolicy) -> Self {
        info!(
            "Creating notifier with {} channels and {:?}",
            channels.len(),
            policy
        );
        Self {
            channels: channels
                .into_iter()
                .map(|c| RetryingChannel::new(c, policy.clone()))
                .collect(),
        }
    }

    /// Channel names in fan-out order
    pub fn channel_names(&self) -> Vec<String> {
        self.channels
            .iter()
            .map(|c| c.identify().to_string())
            .collect()
    }

    /// Deliver `alert` to every channel in order.
    ///
    /// A failed channel is recorded and the next one is still attempted.
    /// Cancellation stops the fan-out after the channel that observed it.
    pub async fn deliver_all(
        &self,
        alert: &Alert,
        cancel: &CancellationToken,
    ) -> Vec<NotificationResult> {
        let mut results = Vec::with_capacity(self.channels.len());

        for channel in &self.channels {
            let name = channel.identify();
            let report = channel.deliver_with(alert, cancel).await;
            let result =
                NotificationResult::from_report(name, NotificationOp::Deliver, report, Some);
            log_result(alert, &result);

            let cancelled = result.status == NotificationStatus::Cancelled;
            results.push(result);
            if cancelled {
                break;
            }
        }

        results
    }

    /// Push the current state of `alert` to every channel holding an
    /// external id for it and accepted by `target`.
    pub async fn update_all<F>(
        &self,
        alert: &Alert,
        target: F,
        cancel: &CancellationToken,
    ) -> Vec<NotificationResult>
    where
        F: Fn(&str) -> bool,
    {
        let mut results = Vec::new();

        for channel in &self.channels {
            let name = channel.identify();
            let Some(external_id) = alert.external_id(name) else {
                debug!("Alert {} has no message on {}, skipping update", alert.id, name);
                continue;
            };
            if !target(name) {
                debug!("Update of alert {} on {} suppressed by policy", alert.id, name);
                continue;
            }

            let report = channel.update_with(external_id, alert, cancel).await;
            let result =
                NotificationResult::from_report(name, NotificationOp::Update, report, |_| None);
            log_result(alert, &result);

            let cancelled = result.status == NotificationStatus::Cancelled;
            results.push(result);
            if cancelled {
                break;
            }
        }

        results
    }
}

fn log_result(alert: &Alert, result: &NotificationResult) {
    match &result.error {
        None => debug!(
            "{:?} of alert {} on {} succeeded after {} attempt(s)",
            result.operation, alert.id, result.channel, result.attempts
        ),
        Some(error) => warn!(
            "{:?} of alert {} on {} failed after {} attempt(s): {}",
            result.operation, alert.id, result.channel, result.attempts, error
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MockChannel;
    use alert_model::Severity;
    use chrono::Utc;

    fn channels() -> (Arc<MockChannel>, Arc<MockChannel>) {
        (
            Arc::new(MockChannel::new("slack")),
            Arc::new(MockChannel::new("pagerduty")),
        )
    }

    fn notifier(slack: &Arc<MockChannel>, pagerduty: &Arc<MockChannel>) -> Notifier {
        Notifier::new(
            vec![
                slack.clone() as Arc<dyn Channel>,
                pagerduty.clone() as Arc<dyn Channel>,
            ],
            RetryPolicy::no_retry(),
        )
    }

    fn alert() -> Alert {
        Alert::new("abc123", "HighLatency", Severity::Critical, Utc::now())
    }

    #[tokio::test]
    async fn test_deliver_all_in_order() {
        let (slack, pagerduty) = channels();
        let notifier = notifier(&slack, &pagerduty);
        assert_eq!(notifier.channel_names(), vec!["slack", "pagerduty"]);

        let results = notifier.deliver_all(&alert(), &CancellationToken::new()).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].channel, "slack");
        assert_eq!(results[0].external_id.as_deref(), Some("slack-1"));
        assert_eq!(results[1].external_id.as_deref(), Some("pagerduty-1"));
        assert!(results.iter().all(NotificationResult::is_success));
    }

    #[tokio::test]
    async fn test_failure_does_not_block_other_channels() {
        let (slack, pagerduty) = channels();
        slack.fail_next(ChannelError::Permanent("channel_not_found".into()));
        let notifier = notifier(&slack, &pagerduty);

        let results = notifier.deliver_all(&alert(), &CancellationToken::new()).await;
        assert_eq!(results[0].status, NotificationStatus::Failed);
        assert!(results[0].error.as_deref().unwrap().contains("channel_not_found"));
        assert_eq!(results[1].status, NotificationStatus::Delivered);
        assert_eq!(pagerduty.deliveries(), 1);
    }

    #[tokio::test]
    async fn test_update_only_targets_known_messages() {
        let (slack, pagerduty) = channels();
        let notifier = notifier(&slack, &pagerduty);
        let mut a = alert();
        a.set_external_id("pagerduty", "PD123");

        let results = notifier
            .update_all(&a, |_| true, &CancellationToken::new())
            .await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].channel, "pagerduty");
        assert_eq!(results[0].status, NotificationStatus::Updated);
        assert_eq!(slack.updates(), 0);
    }

    #[tokio::test]
    async fn test_update_respects_target_predicate() {
        let (slack, pagerduty) = channels();
        let notifier = notifier(&slack, &pagerduty);
        let mut a = alert();
        a.set_external_id("slack", "C01:1");
        a.set_external_id("pagerduty", "PD123");

        let results = notifier
            .update_all(&a, |name| name != "slack", &CancellationToken::new())
            .await;
        assert_eq!(results.len(), 1);
        assert_eq!(slack.updates(), 0);
        assert_eq!(pagerduty.updates(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_fanout_stops() {
        let (slack, pagerduty) = channels();
        let notifier = notifier(&slack, &pagerduty);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let results = notifier.deliver_all(&alert(), &cancel).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, NotificationStatus::Cancelled);
        assert_eq!(slack.deliveries() + pagerduty.deliveries(), 0);
    }
}
