//! Summary Aggregator

use crate::error::repo;
use crate::{AlertError, AlertManager};
use alert_model::{Alert, AlertState, Severity};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::debug;

/// Number of acknowledgments made by one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AckCount {
    pub user: String,
    pub count: usize,
}

/// Point-in-time statistics over open alerts
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertSummary {
    pub total: usize,
    pub by_severity: BTreeMap<Severity, usize>,
    pub by_state: BTreeMap<AlertState, usize>,
    pub by_instance: BTreeMap<String, usize>,
    /// Highest count first, ties by user name
    pub top_acknowledgers: Vec<AckCount>,
    /// Look-back window, `None` when every open alert was counted
    pub period_secs: Option<u64>,
    pub generated_at: DateTime<Utc>,
}

impl AlertSummary {
    /// Aggregate `alerts` as of `now`.
    ///
    /// A non-zero `period` keeps only alerts fired at or after `now - period`.
    pub fn from_alerts(
        alerts: &[Alert],
        now: DateTime<Utc>,
        period: Duration,
        top_n: usize,
    ) -> Self {
        let cutoff = if period.is_zero() {
            None
        } else {
            // An unrepresentable window reaches back before any alert
            Some(
                chrono::Duration::from_std(period)
                    .ok()
                    .and_then(|p| now.checked_sub_signed(p))
                    .unwrap_or(DateTime::<Utc>::MIN_UTC),
            )
        };

        let mut summary = Self {
            total: 0,
            by_severity: Severity::ALL.iter().map(|s| (*s, 0)).collect(),
            by_state: [AlertState::Firing, AlertState::Acknowledged, AlertState::Resolved]
                .into_iter()
                .map(|s| (s, 0))
                .collect(),
            by_instance: BTreeMap::new(),
            top_acknowledgers: Vec::new(),
            period_secs: cutoff.map(|_| period.as_secs()),
            generated_at: now,
        };

        let mut acks: HashMap<&str, usize> = HashMap::new();
        for alert in alerts {
            if cutoff.is_some_and(|c| alert.fired_at < c) {
                continue;
            }
            summary.total += 1;
            *summary.by_severity.entry(alert.severity).or_default() += 1;
            *summary.by_state.entry(alert.state).or_default() += 1;
            *summary.by_instance.entry(alert.instance.clone()).or_default() += 1;
            if let Some(user) = alert.acked_by.as_deref() {
                *acks.entry(user).or_default() += 1;
            }
        }

        let mut ranked: Vec<AckCount> = acks
            .into_iter()
            .map(|(user, count)| AckCount {
                user: user.to_string(),
                count,
            })
            .collect();
        ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.user.cmp(&b.user)));
        ranked.truncate(top_n);
        summary.top_acknowledgers = ranked;

        summary
    }
}

impl AlertManager {
    /// Summarize open alerts fired within `period` (zero for all of them)
    pub async fn summarize(&self, period: Duration) -> Result<AlertSummary, AlertError> {
        let alerts = self
            .alerts
            .get_active_alerts(None)
            .await
            .map_err(repo("get_active_alerts"))?;
        let summary = AlertSummary::from_alerts(&alerts, Utc::now(), period, self.top_n);
        debug!(
            "Summarized {} of {} open alerts",
            summary.total,
            alerts.len()
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{event, Harness};
    use crate::EventStatus;
    use proptest::prelude::*;

    fn alert(fp: &str, severity: Severity, instance: &str, fired_at: DateTime<Utc>) -> Alert {
        let mut alert = Alert::new(fp, "DiskFull", severity, fired_at);
        alert.instance = instance.to_string();
        alert
    }

    fn acked(mut alert: Alert, user: &str) -> Alert {
        alert.acknowledge(user, alert.fired_at);
        alert
    }

    #[test]
    fn test_counts() {
        let now = Utc::now();
        let alerts = vec![
            alert("a", Severity::Critical, "db-1", now),
            acked(alert("b", Severity::Critical, "db-1", now), "bob"),
            alert("c", Severity::Warning, "web-1", now),
        ];

        let summary = AlertSummary::from_alerts(&alerts, now, Duration::ZERO, 5);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.by_severity[&Severity::Critical], 2);
        assert_eq!(summary.by_severity[&Severity::Warning], 1);
        assert_eq!(summary.by_severity[&Severity::Info], 0);
        assert_eq!(summary.by_state[&AlertState::Firing], 2);
        assert_eq!(summary.by_state[&AlertState::Acknowledged], 1);
        assert_eq!(summary.by_instance["db-1"], 2);
        assert_eq!(summary.period_secs, None);
        assert_eq!(
            summary.top_acknowledgers,
            vec![AckCount {
                user: "bob".into(),
                count: 1
            }]
        );
    }

    #[test]
    fn test_period_filter() {
        let now = Utc::now();
        let alerts = vec![
            alert("recent", Severity::Info, "a", now - chrono::Duration::minutes(10)),
            alert("edge", Severity::Info, "a", now - chrono::Duration::hours(1)),
            alert("old", Severity::Info, "a", now - chrono::Duration::hours(3)),
        ];

        let summary = AlertSummary::from_alerts(&alerts, now, Duration::from_secs(3600), 5);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.period_secs, Some(3600));
    }

    #[test]
    fn test_acknowledger_ties_break_by_name() {
        let now = Utc::now();
        let mut alerts = Vec::new();
        for (i, user) in ["zoe", "adam", "mia", "adam", "zoe", "carl"].iter().enumerate() {
            alerts.push(acked(
                alert(&format!("fp-{i}"), Severity::Warning, "x", now),
                user,
            ));
        }

        let summary = AlertSummary::from_alerts(&alerts, now, Duration::ZERO, 3);
        let ranked: Vec<(&str, usize)> = summary
            .top_acknowledgers
            .iter()
            .map(|a| (a.user.as_str(), a.count))
            .collect();
        assert_eq!(ranked, vec![("adam", 2), ("zoe", 2), ("carl", 1)]);
    }

    #[tokio::test]
    async fn test_summarize_skips_resolved() {
        let h = Harness::new();
        h.manager
            .ingest(event("one", EventStatus::Firing, "critical"), &h.cancel)
            .await
            .unwrap();
        h.manager
            .ingest(event("two", EventStatus::Firing, "warning"), &h.cancel)
            .await
            .unwrap();
        h.manager
            .ingest(event("two", EventStatus::Resolved, "warning"), &h.cancel)
            .await
            .unwrap();

        let summary = h.manager.summarize(Duration::from_secs(3600)).await.unwrap();
        assert_eq!(summary.total, 1);
        assert_eq!(summary.by_severity[&Severity::Critical], 1);
        assert_eq!(summary.by_state[&AlertState::Resolved], 0);
    }

    proptest! {
        #[test]
        fn prop_ranking_is_sorted_and_bounded(
            users in proptest::collection::vec("[a-e]", 0..40),
            top_n in 0usize..8,
        ) {
            let now = Utc::now();
            let alerts: Vec<Alert> = users
                .iter()
                .enumerate()
                .map(|(i, u)| acked(alert(&i.to_string(), Severity::Info, "x", now), u))
                .collect();

            let summary = AlertSummary::from_alerts(&alerts, now, Duration::ZERO, top_n);
            prop_assert_eq!(summary.total, users.len());
            prop_assert!(summary.top_acknowledgers.len() <= top_n);
            for pair in summary.top_acknowledgers.windows(2) {
                prop_assert!(
                    pair[0].count > pair[1].count
                        || (pair[0].count == pair[1].count && pair[0].user < pair[1].user)
                );
            }
        }
    }
}
