//! SQLite Repository Implementation
//!
//! Alerts, their per-channel external ids, and silences live in three
//! tables. A partial unique index on `alerts(fingerprint)` over
//! non-resolved rows closes the find-then-create race between concurrent
//! webhook deliveries.

use crate::{AlertRepository, SilenceRepository, StorageError};
use alert_model::{Alert, AlertState, Severity, SilenceMark};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::collections::BTreeMap;
use tracing::{debug, info};
use uuid::Uuid;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS alerts (
        id TEXT PRIMARY KEY,
        fingerprint TEXT NOT NULL,
        name TEXT NOT NULL,
        instance TEXT NOT NULL,
        target TEXT NOT NULL,
        summary TEXT NOT NULL,
        description TEXT NOT NULL,
        severity TEXT NOT NULL,
        labels TEXT NOT NULL,
        annotations TEXT NOT NULL,
        state TEXT NOT NULL,
        fired_at INTEGER NOT NULL,
        acked_at INTEGER,
        acked_by TEXT,
        resolved_at INTEGER
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS alerts_open_fingerprint
        ON alerts(fingerprint) WHERE state != 'resolved'",
    "CREATE TABLE IF NOT EXISTS alert_channel_ids (
        alert_id TEXT NOT NULL REFERENCES alerts(id),
        channel TEXT NOT NULL,
        external_id TEXT NOT NULL,
        PRIMARY KEY (alert_id, channel)
    )",
    "CREATE INDEX IF NOT EXISTS alert_channel_ids_lookup
        ON alert_channel_ids(channel, external_id)",
    "CREATE TABLE IF NOT EXISTS silences (
        id TEXT PRIMARY KEY,
        created_by TEXT NOT NULL,
        source TEXT NOT NULL,
        matchers TEXT NOT NULL,
        reason TEXT NOT NULL,
        start_at INTEGER NOT NULL,
        end_at INTEGER NOT NULL
    )",
];

/// Insert attempts when the conflicting open alert vanishes mid-save
const SAVE_ATTEMPTS: usize = 3;

const ALERT_COLUMNS: &str = "id, fingerprint, name, instance, target, summary, description, \
     severity, labels, annotations, state, fired_at, acked_at, acked_by, resolved_at";

/// SQLite-backed alert and silence store
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect to `url` (e.g. `sqlite://alerts.db?mode=rwc`) and create
    /// the schema if missing
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        info!("Opening SQLite store at {}", url);
        let pool = SqlitePoolOptions::new()
            .max_connections(if url.contains(":memory:") { 1 } else { 5 })
            .connect(url)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StorageError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("SQLite schema ready");
        Ok(())
    }

    async fn external_ids(&self, alert_id: &str) -> Result<BTreeMap<String, String>, StorageError> {
        let rows = sqlx::query(
            "SELECT channel, external_id FROM alert_channel_ids WHERE alert_id = ?",
        )
        .bind(alert_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<(String, String), StorageError> {
                Ok((row.try_get("channel")?, row.try_get("external_id")?))
            })
            .collect()
    }

    async fn hydrate(&self, rows: Vec<SqliteRow>) -> Result<Vec<Alert>, StorageError> {
        let mut alerts = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.try_get("id")?;
            let external_ids = self.external_ids(&id).await?;
            alerts.push(alert_from_row(&row, external_ids)?);
        }
        Ok(alerts)
    }

    async fn open_alert_id(&self, fingerprint: &str) -> Result<Option<Uuid>, StorageError> {
        let id: Option<String> = sqlx::query_scalar(
            "SELECT id FROM alerts WHERE fingerprint = ? AND state != 'resolved'",
        )
        .bind(fingerprint)
        .fetch_optional(&self.pool)
        .await?;
        id.as_deref().map(parse_uuid).transpose()
    }

    /// Insert `alert` and its external ids. `Ok(false)` means another open
    /// alert holds the fingerprint.
    async fn insert_alert(&self, alert: &Alert) -> Result<bool, StorageError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(&format!(
            "INSERT INTO alerts ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            ALERT_COLUMNS
        ))
        .bind(alert.id.to_string())
        .bind(&alert.fingerprint)
        .bind(&alert.name)
        .bind(&alert.instance)
        .bind(&alert.target)
        .bind(&alert.summary)
        .bind(&alert.description)
        .bind(alert.severity.as_str())
        .bind(serde_json::to_string(&alert.labels)?)
        .bind(serde_json::to_string(&alert.annotations)?)
        .bind(alert.state.as_str())
        .bind(alert.fired_at.timestamp_millis())
        .bind(alert.acked_at.map(|t| t.timestamp_millis()))
        .bind(alert.acked_by.as_deref())
        .bind(alert.resolved_at.map(|t| t.timestamp_millis()))
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => return Ok(false),
            Err(err) => return Err(err.into()),
        }

        for (channel, external_id) in &alert.external_ids {
            sqlx::query(
                "INSERT INTO alert_channel_ids (alert_id, channel, external_id) VALUES (?, ?, ?)",
            )
            .bind(alert.id.to_string())
            .bind(channel)
            .bind(external_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }
}

fn parse_uuid(raw: &str) -> Result<Uuid, StorageError> {
    Uuid::parse_str(raw).map_err(|e| StorageError::SerializationError(e.to_string()))
}

fn parse_state(raw: &str) -> Result<AlertState, StorageError> {
    match raw {
        "firing" => Ok(AlertState::Firing),
        "acknowledged" => Ok(AlertState::Acknowledged),
        "resolved" => Ok(AlertState::Resolved),
        other => Err(StorageError::SerializationError(format!(
            "unknown alert state: {}",
            other
        ))),
    }
}

fn timestamp(millis: i64) -> Result<DateTime<Utc>, StorageError> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| StorageError::SerializationError(format!("bad timestamp: {}", millis)))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn alert_from_row(
    row: &SqliteRow,
    external_ids: BTreeMap<String, String>,
) -> Result<Alert, StorageError> {
    let severity: String = row.try_get("severity")?;
    let labels: String = row.try_get("labels")?;
    let annotations: String = row.try_get("annotations")?;
    let state: String = row.try_get("state")?;
    let id: String = row.try_get("id")?;

    Ok(Alert {
        id: parse_uuid(&id)?,
        fingerprint: row.try_get("fingerprint")?,
        name: row.try_get("name")?,
        instance: row.try_get("instance")?,
        target: row.try_get("target")?,
        summary: row.try_get("summary")?,
        description: row.try_get("description")?,
        severity: Severity::normalize(&severity),
        labels: serde_json::from_str(&labels)?,
        annotations: serde_json::from_str(&annotations)?,
        state: parse_state(&state)?,
        fired_at: timestamp(row.try_get("fired_at")?)?,
        acked_at: row
            .try_get::<Option<i64>, _>("acked_at")?
            .map(timestamp)
            .transpose()?,
        acked_by: row.try_get("acked_by")?,
        resolved_at: row
            .try_get::<Option<i64>, _>("resolved_at")?
            .map(timestamp)
            .transpose()?,
        external_ids,
    })
}

fn silence_from_row(row: &SqliteRow) -> Result<SilenceMark, StorageError> {
    let id: String = row.try_get("id")?;
    let matchers: String = row.try_get("matchers")?;

    Ok(SilenceMark {
        id: parse_uuid(&id)?,
        created_by: row.try_get("created_by")?,
        source: row.try_get("source")?,
        matchers: serde_json::from_str(&matchers)?,
        reason: row.try_get("reason")?,
        start_at: timestamp(row.try_get("start_at")?)?,
        end_at: timestamp(row.try_get("end_at")?)?,
    })
}

#[async_trait]
impl AlertRepository for SqliteStore {
    async fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Vec<Alert>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM alerts WHERE fingerprint = ? ORDER BY rowid DESC",
            ALERT_COLUMNS
        ))
        .bind(fingerprint)
        .fetch_all(&self.pool)
        .await?;
        self.hydrate(rows).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Alert>, StorageError> {
        let rows = sqlx::query(&format!("SELECT {} FROM alerts WHERE id = ?", ALERT_COLUMNS))
            .bind(id.to_string())
            .fetch_all(&self.pool)
            .await?;
        Ok(self.hydrate(rows).await?.into_iter().next())
    }

    async fn find_by_channel_external_id(
        &self,
        channel: &str,
        external_id: &str,
    ) -> Result<Option<Alert>, StorageError> {
        let alert_id: Option<String> = sqlx::query_scalar(
            "SELECT alert_id FROM alert_channel_ids
             WHERE channel = ? AND external_id = ?
             ORDER BY rowid DESC LIMIT 1",
        )
        .bind(channel)
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        match alert_id {
            Some(id) => AlertRepository::find_by_id(self, parse_uuid(&id)?).await,
            None => Ok(None),
        }
    }

    async fn save(&self, alert: &Alert) -> Result<(), StorageError> {
        for _ in 0..SAVE_ATTEMPTS {
            if self.insert_alert(alert).await? {
                debug!("Saved alert {} ({})", alert.id, alert.fingerprint);
                return Ok(());
            }
            // The blocking alert may be resolved before it can be read back
            match self.open_alert_id(&alert.fingerprint).await? {
                Some(existing) => {
                    return Err(StorageError::Conflict {
                        fingerprint: alert.fingerprint.clone(),
                        existing,
                    })
                }
                None => debug!(
                    "Open alert for {} resolved during insert, retrying",
                    alert.fingerprint
                ),
            }
        }
        Err(StorageError::DatabaseError(format!(
            "open alert for {} kept changing during insert",
            alert.fingerprint
        )))
    }

    async fn update(&self, alert: &Alert) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        let id = alert.id.to_string();

        let result = sqlx::query(
            "UPDATE alerts SET name = ?, instance = ?, target = ?, summary = ?,
                description = ?, severity = ?, labels = ?, annotations = ?, state = ?,
                fired_at = ?, acked_at = ?, acked_by = ?, resolved_at = ?
             WHERE id = ?",
        )
        .bind(&alert.name)
        .bind(&alert.instance)
        .bind(&alert.target)
        .bind(&alert.summary)
        .bind(&alert.description)
        .bind(alert.severity.as_str())
        .bind(serde_json::to_string(&alert.labels)?)
        .bind(serde_json::to_string(&alert.annotations)?)
        .bind(alert.state.as_str())
        .bind(alert.fired_at.timestamp_millis())
        .bind(alert.acked_at.map(|t| t.timestamp_millis()))
        .bind(alert.acked_by.as_deref())
        .bind(alert.resolved_at.map(|t| t.timestamp_millis()))
        .bind(&id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }

        sqlx::query("DELETE FROM alert_channel_ids WHERE alert_id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;
        for (channel, external_id) in &alert.external_ids {
            sqlx::query(
                "INSERT INTO alert_channel_ids (alert_id, channel, external_id) VALUES (?, ?, ?)",
            )
            .bind(&id)
            .bind(channel)
            .bind(external_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_active_alerts(
        &self,
        severity: Option<Severity>,
    ) -> Result<Vec<Alert>, StorageError> {
        let rows = match severity {
            Some(severity) => {
                sqlx::query(&format!(
                    "SELECT {} FROM alerts WHERE state != 'resolved' AND severity = ?
                     ORDER BY rowid DESC",
                    ALERT_COLUMNS
                ))
                .bind(severity.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {} FROM alerts WHERE state != 'resolved' ORDER BY rowid DESC",
                    ALERT_COLUMNS
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };
        self.hydrate(rows).await
    }
}

#[async_trait]
impl SilenceRepository for SqliteStore {
    async fn find_matching(&self, alert: &Alert) -> Result<Vec<SilenceMark>, StorageError> {
        let now = Utc::now();
        Ok(self
            .find_active()
            .await?
            .into_iter()
            .filter(|s| s.matches(alert, now))
            .collect())
    }

    async fn save(&self, silence: &SilenceMark) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT OR REPLACE INTO silences
                (id, created_by, source, matchers, reason, start_at, end_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(silence.id.to_string())
        .bind(&silence.created_by)
        .bind(&silence.source)
        .bind(serde_json::to_string(&silence.matchers)?)
        .bind(&silence.reason)
        .bind(silence.start_at.timestamp_millis())
        .bind(silence.end_at.timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_active(&self) -> Result<Vec<SilenceMark>, StorageError> {
        let now = Utc::now().timestamp_millis();
        let rows = sqlx::query(
            "SELECT id, created_by, source, matchers, reason, start_at, end_at
             FROM silences WHERE start_at <= ? AND end_at > ? ORDER BY start_at",
        )
        .bind(now)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(silence_from_row).collect()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<SilenceMark>, StorageError> {
        let row = sqlx::query(
            "SELECT id, created_by, source, matchers, reason, start_at, end_at
             FROM silences WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(silence_from_row).transpose()
    }

    async fn delete(&self, id: Uuid) -> Result<(), StorageError> {
        let result = sqlx::query("DELETE FROM silences WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }
}
