//! SQLite session store

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use super::migrations::Migrator;
use super::{SessionRecord, SessionStore};
use crate::error::StoreError;
use crate::session::{EndReason, SessionStatus};
use crate::violation::{EvidenceRef, Severity, Violation, ViolationKind};

/// SQLite-backed [`SessionStore`]
///
/// rusqlite is synchronous, so every call runs on the blocking pool.
#[derive(Clone)]
pub struct SqliteSessionStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSessionStore {
    /// Open or create database at path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::init(Connection::open(path)?)
    }

    /// Open in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Migrator::new(&conn).migrate()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| StoreError::Worker("connection mutex poisoned".to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Worker(e.to_string()))?
    }
}

// Full precision and fixed width, so text ordering matches time ordering
fn format_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_time(value: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn parse_optional_time(value: Option<String>) -> Result<Option<DateTime<Utc>>, rusqlite::Error> {
    value.as_deref().map(parse_time).transpose()
}

fn invalid_text(column: &str, value: &str) -> rusqlite::Error {
    rusqlite::Error::InvalidColumnType(0, format!("{column}={value}"), rusqlite::types::Type::Text)
}

fn row_to_violation(row: &rusqlite::Row) -> Result<Violation, rusqlite::Error> {
    let id: String = row.get(0)?;
    let kind: String = row.get(2)?;
    let severity: String = row.get(3)?;
    let activated_at: String = row.get(4)?;
    Ok(Violation {
        id: Uuid::parse_str(&id).map_err(|_| invalid_text("id", &id))?,
        session_id: row.get(1)?,
        kind: ViolationKind::parse(&kind).ok_or_else(|| invalid_text("kind", &kind))?,
        severity: Severity::parse(&severity).ok_or_else(|| invalid_text("severity", &severity))?,
        activated_at: parse_time(&activated_at)?,
        deactivated_at: parse_optional_time(row.get(5)?)?,
        evidence_ref: row.get::<_, Option<String>>(6)?.map(EvidenceRef::new),
    })
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn save_session(&self, record: &SessionRecord) -> Result<(), StoreError> {
        let record = record.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT OR REPLACE INTO sessions (id, status, started_at, ended_at, end_reason, risk_score, dropped_samples)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.session_id,
                    record.status.as_str(),
                    format_time(record.started_at),
                    record.ended_at.map(format_time),
                    record.end_reason.map(|r| r.as_str()),
                    record.risk_score,
                    record.dropped_samples as i64,
                ],
            )?;
            tx.execute(
                "DELETE FROM violations WHERE session_id = ?1",
                params![record.session_id],
            )?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO violations (id, session_id, seq, kind, description, severity, activated_at, deactivated_at, evidence_ref)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                )?;
                for (seq, v) in record.violations.iter().enumerate() {
                    stmt.execute(params![
                        v.id.to_string(),
                        record.session_id,
                        seq as i64,
                        v.kind.as_str(),
                        v.kind.description(),
                        v.severity.as_str(),
                        format_time(v.activated_at),
                        v.deactivated_at.map(format_time),
                        v.evidence_ref.as_ref().map(|e| e.as_str().to_string()),
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn load_session(&self, session_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        let session_id = session_id.to_string();
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT status, started_at, ended_at, end_reason, risk_score, dropped_samples
                     FROM sessions WHERE id = ?1",
                    params![session_id],
                    |row| {
                        let status: String = row.get(0)?;
                        let started_at: String = row.get(1)?;
                        let end_reason: Option<String> = row.get(3)?;
                        let dropped: i64 = row.get(5)?;
                        Ok(SessionRecord {
                            session_id: session_id.clone(),
                            status: SessionStatus::parse(&status)
                                .ok_or_else(|| invalid_text("status", &status))?,
                            started_at: parse_time(&started_at)?,
                            ended_at: parse_optional_time(row.get(2)?)?,
                            end_reason: end_reason
                                .as_deref()
                                .map(|r| {
                                    EndReason::parse(r)
                                        .ok_or_else(|| invalid_text("end_reason", r))
                                })
                                .transpose()?,
                            risk_score: row.get(4)?,
                            dropped_samples: dropped.max(0) as u64,
                            violations: Vec::new(),
                        })
                    },
                )
                .optional()?;

            let Some(mut record) = row else {
                return Ok(None);
            };

            let mut stmt = conn.prepare(
                "SELECT id, session_id, kind, severity, activated_at, deactivated_at, evidence_ref
                 FROM violations WHERE session_id = ?1 ORDER BY seq",
            )?;
            record.violations = stmt
                .query_map(params![record.session_id], row_to_violation)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Some(record))
        })
        .await
    }

    async fn attach_evidence(
        &self,
        session_id: &str,
        violation_id: Uuid,
        evidence: &EvidenceRef,
    ) -> Result<bool, StoreError> {
        let session_id = session_id.to_string();
        let evidence = evidence.as_str().to_string();
        self.with_conn(move |conn| {
            let updated = conn.execute(
                "UPDATE violations SET evidence_ref = ?1
                 WHERE id = ?2 AND session_id = ?3 AND evidence_ref IS NULL",
                params![evidence, violation_id.to_string(), session_id],
            )?;
            Ok(updated > 0)
        })
        .await
    }
}
