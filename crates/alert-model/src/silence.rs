//! Silence Marks and Matching

use crate::{Alert, ModelError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Matcher key that scopes a silence to one fingerprint
pub const FINGERPRINT_KEY: &str = "fingerprint";

/// A temporary suppression rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SilenceMark {
    pub id: Uuid,
    pub created_by: String,
    /// Channel the silence was created from
    pub source: String,
    /// Label key → required value
    pub matchers: BTreeMap<String, String>,
    pub reason: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
}

impl SilenceMark {
    /// Create a silence over `[start_at, end_at)`
    pub fn new(
        created_by: impl Into<String>,
        source: impl Into<String>,
        matchers: BTreeMap<String, String>,
        reason: impl Into<String>,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
    ) -> Result<Self, ModelError> {
        if end_at <= start_at {
            return Err(ModelError::InvalidWindow {
                start: start_at,
                end: end_at,
            });
        }

        Ok(Self {
            id: Uuid::new_v4(),
            created_by: created_by.into(),
            source: source.into(),
            matchers,
            reason: reason.into(),
            start_at,
            end_at,
        })
    }

    /// Create a silence that only covers one fingerprint
    pub fn for_fingerprint(
        fingerprint: &str,
        created_by: impl Into<String>,
        source: impl Into<String>,
        reason: impl Into<String>,
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
    ) -> Result<Self, ModelError> {
        let matchers = BTreeMap::from([(FINGERPRINT_KEY.to_string(), fingerprint.to_string())]);
        Self::new(created_by, source, matchers, reason, start_at, end_at)
    }

    /// Whether `now` lies in `[start_at, end_at)`
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.start_at <= now && now < self.end_at
    }

    /// Whether this silence suppresses `alert` at `now`.
    ///
    /// Every matcher must equal the alert's label of the same key. The
    /// `fingerprint` key falls back to the alert's own fingerprint when
    /// the alert carries no such label. An empty matcher set never
    /// matches.
    pub fn matches(&self, alert: &Alert, now: DateTime<Utc>) -> bool {
        if self.matchers.is_empty() || !self.is_active(now) {
            return false;
        }

        self.matchers.iter().all(|(key, want)| {
            match alert.labels.get(key) {
                Some(have) => have == want,
                None if key == FINGERPRINT_KEY => &alert.fingerprint == want,
                None => false,
            }
        })
    }
}
