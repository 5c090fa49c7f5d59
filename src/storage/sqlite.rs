//! SQLite history and alert backend.

use super::schema::init_schema;
use super::{AlertStore, HistoryStore};
use crate::error::StoreError;
use crate::model::{
    Alert, AlertId, AlertQuery, AlertStats, AlertStatus, CheckStatus, Observation, ObservationId,
    TargetId, Timestamp,
};
use log::debug;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, ToSql};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const ALERT_COLUMNS: &str =
    "id, target_id, message, status, triggered_at, resolved_at, last_alert_sent, alert_count";

/// SQLite-backed store for check history and alerts.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        debug!("Opening SQLite store at {}", path.display());
        Self::with_connection(Connection::open(path)?)
    }

    /// Create a new in-memory database.
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

impl ToSql for CheckStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for CheckStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        CheckStatus::parse(text)
            .ok_or_else(|| FromSqlError::Other(format!("unknown check status: {}", text).into()))
    }
}

impl ToSql for AlertStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for AlertStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        AlertStatus::parse(text)
            .ok_or_else(|| FromSqlError::Other(format!("unknown alert status: {}", text).into()))
    }
}

fn alert_from_row(row: &Row<'_>) -> rusqlite::Result<Alert> {
    Ok(Alert {
        id: row.get(0)?,
        target_id: row.get(1)?,
        message: row.get(2)?,
        status: row.get(3)?,
        triggered_at: row.get(4)?,
        resolved_at: row.get(5)?,
        last_alert_sent: row.get(6)?,
        alert_count: row.get(7)?,
    })
}

fn observation_from_row(row: &Row<'_>) -> rusqlite::Result<Observation> {
    let response_time: Option<i64> = row.get(3)?;
    Ok(Observation {
        id: row.get(0)?,
        target_id: row.get(1)?,
        status: row.get(2)?,
        response_time: response_time.map(|ms| ms.max(0) as u64),
        checked_at: row.get(4)?,
    })
}

impl HistoryStore for SqliteStore {
    fn append_observation(
        &self,
        target_id: TargetId,
        status: CheckStatus,
        response_time: Option<u64>,
        checked_at: Timestamp,
    ) -> Result<ObservationId, StoreError> {
        let conn = self.lock()?;
        let response_time = response_time.map(|ms| i64::try_from(ms).unwrap_or(i64::MAX));
        conn.execute(
            "INSERT INTO health_checks (target_id, status, response_time, checked_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![target_id, status, response_time, checked_at],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn recent_observations(
        &self,
        target_id: Option<TargetId>,
        limit: usize,
    ) -> Result<Vec<Observation>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, target_id, status, response_time, checked_at
             FROM health_checks
             WHERE (?1 IS NULL OR target_id = ?1)
             ORDER BY checked_at DESC, id DESC
             LIMIT ?2",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![target_id, limit], observation_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn latest_observation(&self, target_id: TargetId) -> Result<Option<Observation>, StoreError> {
        Ok(self
            .recent_observations(Some(target_id), 1)?
            .into_iter()
            .next())
    }
}

impl AlertStore for SqliteStore {
    fn get_active_alert(&self, target_id: TargetId) -> Result<Option<Alert>, StoreError> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM alerts WHERE target_id = ?1 AND status = 'active'",
            ALERT_COLUMNS
        );
        Ok(conn
            .query_row(&sql, params![target_id], alert_from_row)
            .optional()?)
    }

    fn create_alert(
        &self,
        target_id: TargetId,
        message: &str,
        now: Timestamp,
    ) -> Result<Alert, StoreError> {
        let conn = self.lock()?;
        let inserted = conn.execute(
            "INSERT INTO alerts (target_id, message, status, triggered_at, last_alert_sent, alert_count)
             VALUES (?1, ?2, ?3, ?4, ?4, 1)",
            params![target_id, message, AlertStatus::Active, now],
        );
        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                return Err(StoreError::ActiveAlertExists(target_id));
            }
            Err(e) => return Err(e.into()),
        }

        Ok(Alert {
            id: conn.last_insert_rowid(),
            target_id,
            message: message.to_string(),
            status: AlertStatus::Active,
            triggered_at: now,
            resolved_at: None,
            last_alert_sent: Some(now),
            alert_count: 1,
        })
    }

    fn touch_alert(
        &self,
        alert_id: AlertId,
        message: &str,
        sent_at: Option<Timestamp>,
    ) -> Result<Alert, StoreError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE alerts
             SET message = ?1,
                 alert_count = alert_count + 1,
                 last_alert_sent = COALESCE(?2, last_alert_sent)
             WHERE id = ?3 AND status = 'active'",
            params![message, sent_at, alert_id],
        )?;
        if changed == 0 {
            return Err(StoreError::AlertNotFound(alert_id));
        }

        let sql = format!("SELECT {} FROM alerts WHERE id = ?1", ALERT_COLUMNS);
        Ok(conn.query_row(&sql, params![alert_id], alert_from_row)?)
    }

    fn resolve_alert(&self, target_id: TargetId, now: Timestamp) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE alerts SET status = ?1, resolved_at = ?2
             WHERE target_id = ?3 AND status = 'active'",
            params![AlertStatus::Resolved, now, target_id],
        )?;
        Ok(changed > 0)
    }

    fn list_alerts(&self, query: AlertQuery) -> Result<Vec<Alert>, StoreError> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM alerts
             WHERE (?1 IS NULL OR target_id = ?1)
               AND (?2 = 0 OR status = 'active')
             ORDER BY triggered_at DESC, id DESC
             LIMIT ?3",
            ALERT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let limit = i64::try_from(query.limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(
            params![query.target_id, query.active_only, limit],
            alert_from_row,
        )?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn alert_stats(&self) -> Result<AlertStats, StoreError> {
        let conn = self.lock()?;
        let (total, active, resolved, avg): (i64, Option<i64>, Option<i64>, Option<f64>) = conn
            .query_row(
                "SELECT COUNT(*),
                        SUM(CASE WHEN status = 'active' THEN 1 ELSE 0 END),
                        SUM(CASE WHEN status = 'resolved' THEN 1 ELSE 0 END),
                        AVG(alert_count)
                 FROM alerts",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )?;

        Ok(AlertStats {
            total: total.max(0) as u64,
            active: active.unwrap_or(0).max(0) as u64,
            resolved: resolved.unwrap_or(0).max(0) as u64,
            avg_alert_count: avg.unwrap_or(0.0),
        })
    }
}
