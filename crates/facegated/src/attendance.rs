//! Attendance log: door decisions persisted to SQLite.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use facegate_core::MatchResult;
use rusqlite::types::Type;
use rusqlite::{params, Row};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio_rusqlite::Connection;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS attendance (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        confidence REAL NOT NULL,
        timestamp TEXT NOT NULL,
        status TEXT NOT NULL,
        created_at TEXT DEFAULT CURRENT_TIMESTAMP
    );
    CREATE INDEX IF NOT EXISTS idx_attendance_timestamp ON attendance(timestamp DESC);
    CREATE INDEX IF NOT EXISTS idx_attendance_name ON attendance(name);
    CREATE INDEX IF NOT EXISTS idx_attendance_status ON attendance(status);
";

#[derive(Error, Debug)]
pub enum AttendanceError {
    #[error("database: {0}")]
    Db(#[from] tokio_rusqlite::Error),
    #[error("creating {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Authorized,
    Unauthorized,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Authorized => "authorized",
            Status::Unauthorized => "unauthorized",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "authorized" => Some(Status::Authorized),
            "unauthorized" => Some(Status::Unauthorized),
            _ => None,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the door controller should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DoorAction {
    OpenDoor,
    KeepClosed,
}

/// A persisted attendance event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: String,
    pub name: String,
    pub confidence: f32,
    pub timestamp: DateTime<Utc>,
    pub status: Status,
}

impl AttendanceRecord {
    /// A fresh record for the face that decided an attendance check.
    pub fn new(face: &MatchResult) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: face.name().to_string(),
            confidence: face.confidence,
            // Stored with microsecond precision.
            timestamp: Utc::now().trunc_subsecs(6),
            status: if face.is_match() {
                Status::Authorized
            } else {
                Status::Unauthorized
            },
        }
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let raw_ts: String = row.get(3)?;
        let timestamp = DateTime::parse_from_rfc3339(&raw_ts)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?
            .with_timezone(&Utc);
        let raw_status: String = row.get(4)?;
        let status = Status::parse(&raw_status).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                4,
                Type::Text,
                format!("unknown status {raw_status:?}").into(),
            )
        })?;
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            confidence: row.get::<_, f64>(2)? as f32,
            timestamp,
            status,
        })
    }
}

/// Reply to a door controller after an attendance check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceDecision {
    pub success: bool,
    pub authorized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    pub message: String,
    pub action: DoorAction,
}

impl AttendanceDecision {
    pub fn no_face() -> Self {
        Self {
            success: true,
            authorized: false,
            name: None,
            confidence: None,
            message: "No face detected".into(),
            action: DoorAction::KeepClosed,
        }
    }

    pub fn from_record(record: &AttendanceRecord) -> Self {
        let authorized = record.status == Status::Authorized;
        Self {
            success: true,
            authorized,
            name: Some(record.name.clone()),
            confidence: Some(record.confidence),
            message: if authorized {
                format!("Welcome, {}", record.name)
            } else {
                "Unknown person".into()
            },
            action: if authorized {
                DoorAction::OpenDoor
            } else {
                DoorAction::KeepClosed
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AttendanceStats {
    pub total: u64,
    pub authorized: u64,
    pub unauthorized: u64,
    /// Distinct names among authorized records.
    pub unique_people: u64,
}

/// Handle to the attendance database. Clones share one connection.
#[derive(Clone)]
pub struct AttendanceLog {
    conn: Connection,
}

impl AttendanceLog {
    /// Open (creating if needed) the database at `path`.
    pub async fn open(path: &Path) -> Result<Self, AttendanceError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| AttendanceError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(path).await?;
        tracing::info!(path = %path.display(), "attendance database opened");
        Self::init(conn).await
    }

    pub async fn open_in_memory() -> Result<Self, AttendanceError> {
        Self::init(Connection::open_in_memory().await?).await
    }

    async fn init(conn: Connection) -> Result<Self, AttendanceError> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }

    pub async fn insert(&self, record: AttendanceRecord) -> Result<(), AttendanceError> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO attendance (id, name, confidence, timestamp, status)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        record.id,
                        record.name,
                        record.confidence as f64,
                        record.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
                        record.status.as_str(),
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Most recent records first.
    pub async fn recent(&self, limit: u32) -> Result<Vec<AttendanceRecord>, AttendanceError> {
        let records = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, name, confidence, timestamp, status FROM attendance
                     ORDER BY timestamp DESC, rowid DESC LIMIT ?1",
                )?;
                let rows = stmt.query_map(params![limit], AttendanceRecord::from_row)?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            })
            .await?;
        Ok(records)
    }

    /// Most recent records for one name first.
    pub async fn by_name(
        &self,
        name: &str,
        limit: u32,
    ) -> Result<Vec<AttendanceRecord>, AttendanceError> {
        let name = name.to_string();
        let records = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, name, confidence, timestamp, status FROM attendance
                     WHERE name = ?1 ORDER BY timestamp DESC, rowid DESC LIMIT ?2",
                )?;
                let rows = stmt.query_map(params![name, limit], AttendanceRecord::from_row)?;
                Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
            })
            .await?;
        Ok(records)
    }

    pub async fn stats(&self) -> Result<AttendanceStats, AttendanceError> {
        let stats = self
            .conn
            .call(|conn| {
                let stats = conn.query_row(
                    "SELECT
                        COUNT(*),
                        COALESCE(SUM(status = 'authorized'), 0),
                        COALESCE(SUM(status = 'unauthorized'), 0),
                        (SELECT COUNT(DISTINCT name) FROM attendance WHERE status = 'authorized')
                     FROM attendance",
                    [],
                    |row| {
                        Ok(AttendanceStats {
                            total: row.get::<_, i64>(0)? as u64,
                            authorized: row.get::<_, i64>(1)? as u64,
                            unauthorized: row.get::<_, i64>(2)? as u64,
                            unique_people: row.get::<_, i64>(3)? as u64,
                        })
                    },
                )?;
                Ok(stats)
            })
            .await?;
        Ok(stats)
    }
}
