//! Channel Contract and Built-in Channels

use crate::ChannelError;
use alert_model::{Alert, AlertState};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::info;
use uuid::Uuid;

/// An external notification target such as a chat workspace or a paging
/// service
#[async_trait]
pub trait Channel: Send + Sync {
    /// Stable channel name, used as the key for stored external ids
    fn identify(&self) -> &str;

    /// Post a new notification, returning the message/incident id
    async fn deliver(&self, alert: &Alert) -> Result<String, ChannelError>;

    /// Rewrite a previously delivered notification to reflect `alert`
    async fn update_existing(&self, external_id: &str, alert: &Alert) -> Result<(), ChannelError>;
}

#[async_trait]
impl<C: Channel + ?Sized> Channel for Arc<C> {
    fn identify(&self) -> &str {
        (**self).identify()
    }

    async fn deliver(&self, alert: &Alert) -> Result<String, ChannelError> {
        (**self).deliver(alert).await
    }

    async fn update_existing(&self, external_id: &str, alert: &Alert) -> Result<(), ChannelError> {
        (**self).update_existing(external_id, alert).await
    }
}

/// Channel that writes notifications to the tracing log
pub struct LogChannel {
    name: String,
}

impl LogChannel {
    /// Create a log channel named `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Channel for LogChannel {
    fn identify(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, alert: &Alert) -> Result<String, ChannelError> {
        let external_id = Uuid::new_v4().to_string();
        info!(
            channel = %self.name,
            external_id = %external_id,
            fingerprint = %alert.fingerprint,
            severity = %alert.severity,
            "[{}] {}: {}",
            alert.state,
            alert.name,
            alert.summary
        );
        Ok(external_id)
    }

    async fn update_existing(&self, external_id: &str, alert: &Alert) -> Result<(), ChannelError> {
        info!(
            channel = %self.name,
            external_id = %external_id,
            fingerprint = %alert.fingerprint,
            acked_by = alert.acked_by.as_deref().unwrap_or(""),
            "[{}] {} updated",
            alert.state,
            alert.name
        );
        Ok(())
    }
}

/// A call observed by [`MockChannel`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Deliver {
        alert_id: Uuid,
    },
    Update {
        external_id: String,
        alert_id: Uuid,
        state: AlertState,
    },
}

/// Scriptable in-process channel for testing.
///
/// Every invocation is recorded, including failed ones. Errors queued
/// with [`MockChannel::fail_next`] are returned in order before normal
/// behaviour resumes.
pub struct MockChannel {
    name: String,
    failures: Mutex<VecDeque<ChannelError>>,
    calls: Mutex<Vec<MockCall>>,
    next_id: AtomicU64,
}

impl MockChannel {
    /// Create a mock channel named `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            failures: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Fail the next invocation with `err`
    pub fn fail_next(&self, err: ChannelError) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push_back(err);
        }
    }

    /// All recorded calls, oldest first
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of deliver invocations
    pub fn deliveries(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, MockCall::Deliver { .. }))
            .count()
    }

    /// Number of update invocations
    pub fn updates(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, MockCall::Update { .. }))
            .count()
    }

    fn record(&self, call: MockCall) -> Result<(), ChannelError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
        match self.failures.lock().ok().and_then(|mut f| f.pop_front()) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Channel for MockChannel {
    fn identify(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, alert: &Alert) -> Result<String, ChannelError> {
        self.record(MockCall::Deliver { alert_id: alert.id })?;
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        Ok(format!("{}-{}", self.name, n))
    }

    async fn update_existing(&self, external_id: &str, alert: &Alert) -> Result<(), ChannelError> {
        self.record(MockCall::Update {
            external_id: external_id.to_string(),
            alert_id: alert.id,
            state: alert.state,
        })
    }
}
