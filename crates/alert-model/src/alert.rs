//! Alert Entity and Lifecycle

use crate::ModelError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Alert severity, ordered from lowest to highest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    /// All severities, lowest first
    pub const ALL: [Severity; 3] = [Severity::Info, Severity::Warning, Severity::Critical];

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }

    /// Map a free-form severity label onto a known level.
    ///
    /// Unknown values fall back to `Info` instead of being rejected, so an
    /// upstream rule with a typo still gets delivered.
    pub fn normalize(raw: &str) -> Self {
        raw.parse().unwrap_or(Severity::Info)
    }
}

impl FromStr for Severity {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" | "informational" | "low" | "none" => Ok(Severity::Info),
            "warning" | "warn" | "medium" => Ok(Severity::Warning),
            "critical" | "crit" | "error" | "high" | "page" => Ok(Severity::Critical),
            _ => Err(ModelError::UnknownSeverity(s.to_string())),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertState {
    /// Initial state, nobody has taken the alert yet
    Firing,
    /// A human took ownership
    Acknowledged,
    /// Terminal
    Resolved,
}

impl AlertState {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertState::Firing => "firing",
            AlertState::Acknowledged => "acknowledged",
            AlertState::Resolved => "resolved",
        }
    }

    /// Whether the alert still needs attention
    pub fn is_open(&self) -> bool {
        !matches!(self, AlertState::Resolved)
    }
}

impl fmt::Display for AlertState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One alert lifecycle instance, mirrored to every notification channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    /// Dedup key, stable across the firing/resolved pair of one condition
    pub fingerprint: String,
    pub name: String,
    pub instance: String,
    pub target: String,
    pub summary: String,
    pub description: String,
    pub severity: Severity,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub state: AlertState,
    pub fired_at: DateTime<Utc>,
    pub acked_at: Option<DateTime<Utc>>,
    pub acked_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    /// Message or incident id per channel name, used to target updates
    #[serde(default)]
    pub external_ids: BTreeMap<String, String>,
}

impl Alert {
    /// Create a new firing alert with a fresh id
    pub fn new(
        fingerprint: impl Into<String>,
        name: impl Into<String>,
        severity: Severity,
        fired_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            fingerprint: fingerprint.into(),
            name: name.into(),
            instance: String::new(),
            target: String::new(),
            summary: String::new(),
            description: String::new(),
            severity,
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            state: AlertState::Firing,
            fired_at,
            acked_at: None,
            acked_by: None,
            resolved_at: None,
            external_ids: BTreeMap::new(),
        }
    }

    /// Acknowledge the alert on behalf of `actor`.
    ///
    /// Only legal from `Firing`. Any other state is left untouched and
    /// `false` is returned, which makes repeated acks idempotent.
    pub fn acknowledge(&mut self, actor: &str, at: DateTime<Utc>) -> bool {
        if self.state != AlertState::Firing {
            return false;
        }
        self.state = AlertState::Acknowledged;
        self.acked_by = Some(actor.to_string());
        self.acked_at = Some(at);
        true
    }

    /// Resolve the alert. Returns `false` if it was already resolved.
    pub fn resolve(&mut self, at: DateTime<Utc>) -> bool {
        if self.state == AlertState::Resolved {
            return false;
        }
        self.state = AlertState::Resolved;
        self.resolved_at = Some(at);
        true
    }

    /// Whether the alert still needs attention
    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }

    /// Stored external id for a channel
    pub fn external_id(&self, channel: &str) -> Option<&str> {
        self.external_ids.get(channel).map(String::as_str)
    }

    /// Remember the message/incident id a channel returned on delivery
    pub fn set_external_id(&mut self, channel: impl Into<String>, external_id: impl Into<String>) {
        self.external_ids.insert(channel.into(), external_id.into());
    }
}
